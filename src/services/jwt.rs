use jsonwebtoken::{encode, decode, Header, Validation, EncodingKey, DecodingKey};
use serde::{Deserialize, Serialize};

use crate::bank::Session;
use crate::models::Role;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,  // Login email
    pub role: Role,
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    pub fn session(&self) -> Session {
        Session {
            email: self.sub.clone(),
            role: self.role,
        }
    }
}

pub struct JwtService;

impl JwtService {
    fn sign(session: &Session, expiry: i64, secret: String) -> Result<String, jsonwebtoken::errors::Error> {
        let now = chrono::Utc::now().timestamp();

        let claims = Claims {
            sub: session.email.clone(),
            role: session.role,
            exp: now + expiry,
            iat: now,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
    }

    pub fn generate_access_token(session: &Session) -> Result<String, jsonwebtoken::errors::Error> {
        Self::sign(
            session,
            crate::config::Config::jwt_expiry(),
            crate::config::Config::jwt_secret(),
        )
    }

    pub fn generate_refresh_token(session: &Session) -> Result<String, jsonwebtoken::errors::Error> {
        Self::sign(
            session,
            crate::config::Config::jwt_refresh_expiry(),
            crate::config::Config::jwt_refresh_secret(),
        )
    }

    pub fn verify_token(token: &str, is_refresh: bool) -> Result<Claims, jsonwebtoken::errors::Error> {
        let secret = if is_refresh {
            crate::config::Config::jwt_refresh_secret()
        } else {
            crate::config::Config::jwt_secret()
        };

        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::default(),
        )?;

        Ok(token_data.claims)
    }
}
