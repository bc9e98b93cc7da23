//! Error codes shared by every error type in the crate.
//!
//! Each module owns its own `thiserror` enum. This trait gives the session a
//! uniform way to turn any of them into a user-visible notification.

/// Grepable error code and retryable flag.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    fn retryable(&self) -> bool {
        false
    }
}
