//! Auth Module
//!
//! Identity resolution and login gating. Sessions are issued by the identity
//! provider elsewhere; this module only turns a session token (cookie or
//! bearer header) back into a user id.
//!
//! - `require_login` is router-wide middleware: pages without a session are
//!   redirected to the login page, API calls get a 401.
//! - `CurrentUser` / `MaybeUser` are the extractors handlers use.

mod gate;
mod handler;
mod routes;
mod session;

pub use gate::{LoginGate, require_login};
pub use routes::routes;
pub use session::{CurrentUser, Identity, MaybeUser, resolve_identity, session_token};
