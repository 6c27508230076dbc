pub mod email;
pub mod identity;
pub mod jwt;

pub use email::{EmailService, Notifier};
pub use identity::{AuthTokens, CredentialStore, IdentityProvider};
pub use jwt::JwtService;
