mod common;

use rocket::http::Status;
use serde_json::json;

use common::{ADMIN_EMAIL, ROUTING_CODE, app};

#[rocket::async_test]
async fn signup_approval_and_login() {
    let app = app().await;
    let customer = app.open_account("asha@example.com").await;

    assert_eq!(customer["email"], "asha@example.com");
    assert_eq!(customer["accounts"][0]["balance"], 100000);
    assert_eq!(customer["accounts"][0]["kind"], "savings");
    assert_eq!(*app.outbox.sent.lock().unwrap(), vec!["asha@example.com".to_string()]);

    let token = app.login("asha@example.com", "s3cret-pass").await;
    let (status, body) = app.get("/api/v1/customer/balances", Some(&token)).await;
    assert_eq!(status, Status::Ok);
    assert_eq!(body["data"]["total"], 100000);

    let admin = app.admin_token().await;
    let (_, queue) = app.get("/api/v1/admin/requests", Some(&admin)).await;
    assert_eq!(queue["data"].as_array().unwrap().len(), 0);
}

#[rocket::async_test]
async fn wrong_password_is_unauthorized() {
    let app = app().await;
    let (status, body) = app
        .post(
            "/api/v1/auth/login",
            None,
            json!({ "email": ADMIN_EMAIL, "password": "not-the-password" }),
        )
        .await;
    assert_eq!(status, Status::Unauthorized);
    assert_eq!(body["success"], false);
}

#[rocket::async_test]
async fn refresh_issues_a_working_access_token() {
    let app = app().await;
    let (_, body) = app
        .post(
            "/api/v1/auth/login",
            None,
            json!({ "email": ADMIN_EMAIL, "password": common::ADMIN_PASSWORD }),
        )
        .await;
    let refresh = body["data"]["refreshToken"].as_str().unwrap().to_string();

    let (status, body) = app
        .post("/api/v1/auth/refresh", None, json!({ "refresh_token": refresh }))
        .await;
    assert_eq!(status, Status::Ok);
    let access = body["data"]["accessToken"].as_str().unwrap();
    let (status, _) = app.get("/api/v1/admin/config", Some(access)).await;
    assert_eq!(status, Status::Ok);

    // An access token is not accepted as a refresh token.
    let (status, _) = app
        .post("/api/v1/auth/refresh", None, json!({ "refresh_token": access }))
        .await;
    assert_eq!(status, Status::Unauthorized);
}

#[rocket::async_test]
async fn admin_routes_require_the_admin_role() {
    let app = app().await;
    app.open_account("asha@example.com").await;
    let token = app.login("asha@example.com", "s3cret-pass").await;

    let (status, body) = app.get("/api/v1/admin/requests", Some(&token)).await;
    assert_eq!(status, Status::Forbidden);
    assert_eq!(body["success"], false);

    let (status, _) = app.get("/api/v1/admin/requests", None).await;
    assert_eq!(status, Status::Unauthorized);

    let (status, _) = app
        .put("/api/v1/admin/config", &token, json!({ "transaction_limit": 1 }))
        .await;
    assert_eq!(status, Status::Forbidden);
}

#[rocket::async_test]
async fn self_transfer_between_two_approved_accounts() {
    let app = app().await;
    let first = app.open_account("asha@example.com").await;
    let second = app.open_account("asha@example.com").await;
    let from = first["accounts"][0]["accountNumber"].as_str().unwrap().to_string();
    let accounts = second["accounts"].as_array().unwrap();
    assert_eq!(accounts.len(), 2);
    let to = accounts[1]["accountNumber"].as_str().unwrap().to_string();

    let token = app.login("asha@example.com", "s3cret-pass").await;
    let (status, body) = app
        .post(
            "/api/v1/transfers/self",
            Some(&token),
            json!({ "fromAccount": from, "toAccount": to, "amount": 25000 }),
        )
        .await;
    assert_eq!(status, Status::Ok, "{}", body);
    assert_eq!(body["data"]["senderBalance"], 75000);

    let (_, balances) = app.get("/api/v1/customer/balances", Some(&token)).await;
    assert_eq!(balances["data"]["accounts"][0]["balance"], 75000);
    assert_eq!(balances["data"]["accounts"][1]["balance"], 125000);
    assert_eq!(balances["data"]["total"], 200000);
}

#[rocket::async_test]
async fn transfers_over_the_limit_are_rejected() {
    let app = app().await;
    let asha = app.open_account("asha@example.com").await;
    let chen = app.open_account("chen@example.com").await;
    let from = asha["accounts"][0]["accountNumber"].as_str().unwrap().to_string();
    let to = chen["accounts"][0]["accountNumber"].as_str().unwrap().to_string();
    let token = app.login("asha@example.com", "s3cret-pass").await;

    let (status, body) = app
        .post(
            "/api/v1/transfers",
            Some(&token),
            json!({ "fromAccount": from, "routingCode": ROUTING_CODE, "toAccount": to, "amount": 200000 }),
        )
        .await;
    assert_eq!(status, Status::BadRequest);
    assert_eq!(body["success"], false);

    let (_, balances) = app.get("/api/v1/customer/balances", Some(&token)).await;
    assert_eq!(balances["data"]["total"], 100000);

    // Raising the limit lets a transfer within the balance through.
    let admin = app.admin_token().await;
    let (status, _) = app
        .put("/api/v1/admin/config", &admin, json!({ "transaction_limit": 500000 }))
        .await;
    assert_eq!(status, Status::Ok);
    let (status, body) = app
        .post(
            "/api/v1/transfers",
            Some(&token),
            json!({ "fromAccount": from, "routingCode": ROUTING_CODE, "toAccount": to, "amount": 60000 }),
        )
        .await;
    assert_eq!(status, Status::Ok, "{}", body);

    let (_, journal) = app.get("/api/v1/admin/transfers", Some(&admin)).await;
    assert_eq!(journal["data"][0]["status"], "completed");
    assert_eq!(journal["data"][0]["amount"], 60000);
}

#[rocket::async_test]
async fn fractional_amounts_are_refused() {
    let app = app().await;
    let asha = app.open_account("asha@example.com").await;
    let from = asha["accounts"][0]["accountNumber"].as_str().unwrap().to_string();
    let token = app.login("asha@example.com", "s3cret-pass").await;

    let (status, _) = app
        .post(
            "/api/v1/transfers",
            Some(&token),
            json!({ "fromAccount": from, "routingCode": "OTHR0000002", "toAccount": "123456", "amount": 10.5 }),
        )
        .await;
    assert_eq!(status, Status::UnprocessableEntity);
}

#[rocket::async_test]
async fn loan_request_and_approval() {
    let app = app().await;
    let asha = app.open_account("asha@example.com").await;
    let customer_id = asha["customerId"].as_str().unwrap().to_string();
    let token = app.login("asha@example.com", "s3cret-pass").await;

    let (status, body) = app
        .post(
            "/api/v1/customer/loans",
            Some(&token),
            json!({ "loanAmount": 50000, "loanPurpose": "Home repair" }),
        )
        .await;
    assert_eq!(status, Status::Ok, "{}", body);

    let admin = app.admin_token().await;
    let (_, loans) = app.get("/api/v1/admin/loans", Some(&admin)).await;
    assert_eq!(loans["data"][0]["customerId"], customer_id.as_str());
    assert_eq!(loans["data"][0]["loanAmount"], 50000);

    let (status, body) = app
        .post(
            &format!("/api/v1/admin/loans/{}/approve", customer_id),
            Some(&admin),
            json!({}),
        )
        .await;
    assert_eq!(status, Status::Ok, "{}", body);
    let accounts = body["data"]["accounts"].as_array().unwrap();
    assert_eq!(accounts.len(), 2);
    assert_eq!(accounts[1]["kind"], "loan");
    assert_eq!(accounts[1]["balance"], 50000);

    let (_, loans) = app.get("/api/v1/admin/loans", Some(&admin)).await;
    assert!(loans["data"].as_array().unwrap().is_empty());
}

#[rocket::async_test]
async fn profile_update_and_deactivation() {
    let app = app().await;
    let asha = app.open_account("asha@example.com").await;
    let account = asha["accounts"][0]["accountNumber"].as_str().unwrap().to_string();
    let token = app.login("asha@example.com", "s3cret-pass").await;

    let (status, body) = app
        .put("/api/v1/customer/profile", &token, json!({ "name": "Asha K", "mobile": "9123456780" }))
        .await;
    assert_eq!(status, Status::Ok, "{}", body);
    assert_eq!(body["data"]["name"], "Asha K");
    assert_eq!(body["data"]["email"], "asha@example.com");

    let (status, _) = app
        .put("/api/v1/customer/profile", &token, json!({ "mobile": "12" }))
        .await;
    assert_eq!(status, Status::BadRequest);

    let (status, body) = app
        .post(
            &format!("/api/v1/customer/accounts/{}/deactivate", account),
            Some(&token),
            json!({}),
        )
        .await;
    assert_eq!(status, Status::Ok, "{}", body);
    assert_eq!(body["data"]["accounts"][0]["status"], false);
}

#[rocket::async_test]
async fn settlement_with_an_empty_ledger_reports_nothing() {
    let app = app().await;
    let admin = app.admin_token().await;
    let (status, body) = app.post("/api/v1/admin/settlements", Some(&admin), json!({})).await;
    assert_eq!(status, Status::Ok);
    assert_eq!(body["data"]["creditsApplied"], 0);
}

#[rocket::async_test]
async fn openapi_document_is_served() {
    let app = app().await;
    let (status, body) = app.get("/api/v1/openapi.json", None).await;
    assert_eq!(status, Status::Ok);
    let paths = body["paths"].as_object().unwrap();
    assert!(paths.keys().any(|p| p.ends_with("/transfers/self")));
    assert!(paths.keys().any(|p| p.ends_with("/admin/settlements")));
}
