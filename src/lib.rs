#[macro_use]
extern crate rocket;

pub mod bank;
pub mod config;
pub mod db;
pub mod guards;
pub mod models;
pub mod routes;
pub mod services;
pub mod store;
pub mod utils;

use rocket::fairing::{Fairing, Info, Kind};
use rocket::http::Header;
use rocket::{Build, Request, Response, Rocket};
use rocket_okapi::openapi_get_routes;
use rocket_okapi::swagger_ui::{SwaggerUIConfig, make_swagger_ui};

use crate::bank::Bank;

/* ----------------------------- CORS ----------------------------- */

pub struct CORS;

#[rocket::async_trait]
impl Fairing for CORS {
    fn info(&self) -> Info {
        Info {
            name: "CORS",
            kind: Kind::Response,
        }
    }

    async fn on_response<'r>(&self, request: &'r Request<'_>, response: &mut Response<'r>) {
        if let Some(origin) = request.headers().get_one("Origin") {
            response.set_header(Header::new("Access-Control-Allow-Origin", origin));
        }

        response.set_header(Header::new(
            "Access-Control-Allow-Methods",
            "GET, POST, PUT, DELETE, OPTIONS",
        ));

        response.set_header(Header::new(
            "Access-Control-Allow-Headers",
            "Content-Type, Authorization",
        ));

        response.set_header(Header::new("Access-Control-Allow-Credentials", "true"));
    }
}

/* ----------------------------- OPTIONS ----------------------------- */

#[options("/<_..>")]
fn options_handler() {}

/* ----------------------------- ERRORS ----------------------------- */

fn envelope(message: &str) -> rocket::serde::json::Value {
    rocket::serde::json::json!({
        "success": false,
        "message": message
    })
}

#[catch(400)]
fn bad_request() -> rocket::serde::json::Value {
    envelope("Malformed request")
}

#[catch(401)]
fn unauthorized() -> rocket::serde::json::Value {
    envelope("Missing or invalid access token")
}

#[catch(403)]
fn forbidden() -> rocket::serde::json::Value {
    envelope("Administrator access required")
}

#[catch(404)]
fn not_found() -> rocket::serde::json::Value {
    envelope("Resource not found (check /api/v1 prefix)")
}

#[catch(422)]
fn unprocessable() -> rocket::serde::json::Value {
    envelope("Request body does not match the expected shape (amounts are integer minor units)")
}

#[catch(500)]
fn internal_error() -> rocket::serde::json::Value {
    envelope("Internal server error")
}

/* ----------------------------- SWAGGER ----------------------------- */

fn swagger_config() -> SwaggerUIConfig {
    SwaggerUIConfig {
        url: "/api/v1/openapi.json".to_string(),
        ..Default::default()
    }
}

/* ----------------------------- LAUNCH ----------------------------- */

fn base() -> Rocket<Build> {
    rocket::build()
        .attach(CORS)
        .mount("/", routes![options_handler])
        .mount(
            "/api/v1",
            openapi_get_routes![
                // Auth
                routes::auth::login,
                routes::auth::refresh_token,
                // Signup
                routes::accounts::submit_account_request,
                // Customer
                routes::customer::get_profile,
                routes::customer::update_profile,
                routes::customer::get_balances,
                routes::customer::deactivate_account,
                routes::customer::request_loan,
                // Transfers
                routes::transfer::self_transfer,
                routes::transfer::send_money,
                routes::transfer::get_transaction_limit,
                // Admin Routes - Requests
                routes::admin::list_account_requests,
                routes::admin::approve_account_request,
                routes::admin::reject_account_request,
                // Admin Routes - Loans
                routes::admin::list_loan_requests,
                routes::admin::approve_loan,
                routes::admin::deny_loan,
                // Admin Routes - Configuration
                routes::admin::get_config,
                routes::admin::set_transaction_limit,
                // Admin Routes - Settlement & audit
                routes::admin::run_settlement,
                routes::admin::list_transfers,
            ],
        )
        .mount("/api/docs", make_swagger_ui(&swagger_config()))
        .register(
            "/",
            catchers![bad_request, unauthorized, forbidden, not_found, unprocessable, internal_error],
        )
}

/// The server with stores, bank and periodic settlement taken from configuration.
pub fn rocket() -> Rocket<Build> {
    base().attach(db::init()).attach(db::settlement())
}

/// The server around an already prepared bank.
pub fn rocket_with(bank: Bank) -> Rocket<Build> {
    base().manage(bank)
}
