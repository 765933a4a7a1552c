//! Authentication for Gatehouse
//!
//! Provides:
//! - Passcode issuing and verification with Argon2
//! - Signed identity cookie encoding/decoding

pub mod cookie;
pub mod passcode;

pub use cookie::{CookieCodec, TeamIdentity, COOKIE_NAME};
pub use passcode::{issue_passcode, verify_passcode};
