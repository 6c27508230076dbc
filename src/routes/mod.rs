pub mod accounts;
pub mod admin;
pub mod auth;
pub mod customer;
pub mod transfer;
