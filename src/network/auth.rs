//! Credentials
//!
//! Account name/password rules and the password digest stored by the
//! persistence layer. The server never keeps plaintext passwords.

use sha2::{Digest, Sha256};
use thiserror::Error;

/// Shortest allowed username (characters).
pub const MIN_USERNAME_LEN: usize = 3;
/// Longest allowed username (characters).
pub const MAX_USERNAME_LEN: usize = 12;
/// Shortest allowed password (characters).
pub const MIN_PASSWORD_LEN: usize = 5;

/// Registration rule violations. Display text is sent to clients verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CredentialError {
    /// Username outside 3-12 characters.
    #[error("Username must be 3-12 characters")]
    UsernameLength,
    /// Password under 5 characters.
    #[error("Password must be at least 5 characters")]
    PasswordLength,
}

/// Check a new account's username and password.
pub fn validate_registration(username: &str, password: &str) -> Result<(), CredentialError> {
    let name_len = username.chars().count();
    if !(MIN_USERNAME_LEN..=MAX_USERNAME_LEN).contains(&name_len) {
        return Err(CredentialError::UsernameLength);
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(CredentialError::PasswordLength);
    }
    Ok(())
}

/// Lowercase hex SHA-256 of a password.
pub fn hash_password(password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_username_bounds() {
        assert_eq!(validate_registration("ab", "secret"), Err(CredentialError::UsernameLength));
        assert_eq!(validate_registration("abc", "secret"), Ok(()));
        assert_eq!(validate_registration("abcdefghijkl", "secret"), Ok(()));
        assert_eq!(validate_registration("abcdefghijklm", "secret"), Err(CredentialError::UsernameLength));
    }

    #[test]
    fn test_username_counts_characters() {
        // 4 characters, 12 bytes
        assert_eq!(validate_registration("용사용사", "secret"), Ok(()));
    }

    #[test]
    fn test_password_minimum() {
        assert_eq!(validate_registration("bob", "1234"), Err(CredentialError::PasswordLength));
        assert_eq!(validate_registration("bob", "12345"), Ok(()));
    }

    #[test]
    fn test_hash_password() {
        assert_eq!(
            hash_password("password"),
            "5e884898da28047151d0e56f8dc6292773603d0d6aabbdd62a11ef721d1542d8"
        );
        assert_ne!(hash_password("secret1"), hash_password("secret2"));
    }
}
