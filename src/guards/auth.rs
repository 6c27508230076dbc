use log::warn;
use rocket::http::Status;
use rocket::request::{self, FromRequest, Outcome, Request};

use rocket_okapi::okapi::openapi3::{Object, SecurityRequirement, SecurityScheme, SecuritySchemeData};
use rocket_okapi::request::{OpenApiFromRequest, RequestHeaderInput};
use rocket_okapi::r#gen::OpenApiGenerator;

use crate::bank::Session;
use crate::services::JwtService;

/// JWT-based authentication guard
pub struct AuthGuard {
    pub session: Session,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AuthGuard {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let token = req.headers().get_one("Authorization");

        match token.and_then(|t| t.strip_prefix("Bearer ")) {
            Some(token) => match JwtService::verify_token(token.trim(), false) {
                Ok(claims) => Outcome::Success(AuthGuard {
                    session: claims.session(),
                }),
                Err(_) => Outcome::Error((Status::Unauthorized, ())),
            },
            None => Outcome::Error((Status::Unauthorized, ())),
        }
    }
}

/// An authenticated session carrying the admin role claim.
pub struct AdminGuard {
    pub session: Session,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AdminGuard {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        match req.guard::<AuthGuard>().await {
            Outcome::Success(auth) if auth.session.is_admin() => Outcome::Success(AdminGuard {
                session: auth.session,
            }),
            Outcome::Success(auth) => {
                warn!("Admin route refused for {}", auth.session.email);
                Outcome::Error((Status::Forbidden, ()))
            }
            Outcome::Error(e) => Outcome::Error(e),
            Outcome::Forward(f) => Outcome::Forward(f),
        }
    }
}

fn bearer_security() -> RequestHeaderInput {
    let scheme = SecurityScheme {
        description: Some("Access token from /auth/login".to_owned()),
        data: SecuritySchemeData::Http {
            scheme: "bearer".to_owned(),
            bearer_format: Some("JWT".to_owned()),
        },
        extensions: Object::default(),
    };
    let mut requirement = SecurityRequirement::new();
    requirement.insert("BearerAuth".to_owned(), Vec::new());
    RequestHeaderInput::Security("BearerAuth".to_owned(), scheme, requirement)
}

impl<'a> OpenApiFromRequest<'a> for AuthGuard {
    fn from_request_input(
        _gen: &mut OpenApiGenerator,
        _name: String,
        _required: bool,
    ) -> rocket_okapi::Result<RequestHeaderInput> {
        Ok(bearer_security())
    }
}

impl<'a> OpenApiFromRequest<'a> for AdminGuard {
    fn from_request_input(
        _gen: &mut OpenApiGenerator,
        _name: String,
        _required: bool,
    ) -> rocket_okapi::Result<RequestHeaderInput> {
        Ok(bearer_security())
    }
}
