//! Authentication system
//!
//! Handles credential validation for `<auth>` messages.

pub mod credentials;
pub mod validator;

pub use validator::validate_credentials;
