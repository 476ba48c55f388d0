//! Authentication validator
//!
//! Checks the credentials carried by an `<auth>` message against the static
//! credential store.

use super::credentials::CREDENTIALS;
use crate::error::AuthError;

const MAX_CREDENTIAL_LENGTH: usize = 128;

/// Performs basic input sanitation to check for malicious or malformed usernames/passwords.
fn is_valid_input(input: &str) -> bool {
    !input.trim().is_empty()
        && input.len() <= MAX_CREDENTIAL_LENGTH
        && !input.contains(['\r', '\n', '\0'])
}

/// Validates that the username exists and the password matches the stored one.
pub fn validate_credentials(username: &str, password: &str) -> Result<(), AuthError> {
    if !is_valid_input(username) {
        return Err(AuthError::MalformedInput("Invalid username format".into()));
    }

    if !is_valid_input(password) {
        return Err(AuthError::MalformedInput("Invalid password format".into()));
    }

    match CREDENTIALS.get(username) {
        Some(stored) if *stored == password => Ok(()),
        Some(_) => Err(AuthError::InvalidPassword(username.to_string())),
        None => Err(AuthError::UserNotFound(username.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_known_user() {
        assert!(validate_credentials("piotr", "password").is_ok());
    }

    #[test]
    fn rejects_wrong_password() {
        assert!(matches!(
            validate_credentials("piotr", "wrongpassword"),
            Err(AuthError::InvalidPassword(user)) if user == "piotr"
        ));
    }

    #[test]
    fn rejects_unknown_user() {
        assert!(matches!(
            validate_credentials("mallory", "password"),
            Err(AuthError::UserNotFound(_))
        ));
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(matches!(
            validate_credentials("", "password"),
            Err(AuthError::MalformedInput(_))
        ));
        assert!(matches!(
            validate_credentials("piotr", "pass\nword"),
            Err(AuthError::MalformedInput(_))
        ));
    }
}
