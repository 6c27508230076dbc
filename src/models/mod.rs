pub mod money;
pub mod customer;
pub mod request;
pub mod admin;
pub mod ledger;
pub mod transfer;
pub mod credential;

pub use money::*;
pub use customer::*;
pub use request::*;
pub use admin::*;
pub use ledger::*;
pub use transfer::*;
pub use credential::*;
