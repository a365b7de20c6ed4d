//! Authentication core
//!
//! This crate provides signing key loading, ES256 access tokens, refresh and
//! account verification token stores, bearer authentication and the
//! signup/login/refresh/logout session flow.

pub mod db;
pub mod error;
pub mod filter;
pub mod keys;
pub mod mail;
pub mod password;
pub mod refresh;
pub mod session;
pub mod token;
pub mod users;
pub mod verification;

pub use error::{AuthError, AuthResult, KeyLoadError, MailDispatchError, TokenError};
pub use filter::Authenticator;
pub use keys::KeyMaterial;
pub use mail::{MailQueue, MailTransport, NotificationEmail};
pub use refresh::RefreshTokenStore;
pub use session::{AuthenticationResponse, SessionService, SignupOutcome};
pub use token::{Claims, TokenCodec};
pub use users::{AuthenticatedPrincipal, User, UserStore};
pub use verification::VerificationTokenStore;
