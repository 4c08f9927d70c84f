//! Auth handlers and supporting modules.
//!
//! This module coordinates CSRF protection, identity-provider grants, and
//! server-side session management.
//!
//! ## Cookies
//!
//! Three independent cookies ride a logged-in browser: the opaque session id
//! (`agora_session`), the short-lived provider access token (`agora_token`),
//! and the CSRF double-submit value (`agora_csrf`). Logout expires all
//! three, always.
//!
//! ## Ordering
//!
//! CSRF and token checks run before any session mutation. The one deliberate
//! exception is logout, which proceeds best-effort even when CSRF fails:
//! refusing to end a session would be the worse security outcome.

pub(crate) mod backoff;
pub(crate) mod csrf;
pub(crate) mod error;
pub(crate) mod keycloak;
pub(crate) mod login;
pub(crate) mod refresh;
pub(crate) mod session;
mod state;
pub(crate) mod storage;
pub(crate) mod types;
mod utils;

pub use state::{AuthConfig, AuthState};
pub use types::AuthType;
