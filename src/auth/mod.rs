//! Identity, session tokens and request authentication.

pub mod engine;
pub mod middleware;
pub mod password;
pub mod session;
pub mod sms;
pub mod token;

pub use engine::AuthService;
pub use middleware::{AdminSession, AppState, AuthSession};
pub use session::generate_code;
pub use sms::{ConsoleSender, SendError, Sender};
pub use token::{SessionClaims, TokenError, TokenSigner};
