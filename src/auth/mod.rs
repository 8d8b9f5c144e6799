//! Authentication layer
//!
//! PIN login issues HMAC-signed JWTs; every other API route authenticates the
//! caller through the `AuthUser` extractor and checks role permissions.

pub mod extractor;
pub mod permissions;
pub mod tokens;

pub use extractor::AuthUser;
pub use permissions::{permissions_for, Role};
pub use tokens::{issue_tokens, verify_access_token, Claims, IssuedTokens};

/// PINs are 4 to 6 ASCII digits
pub fn is_valid_pin(pin: &str) -> bool {
    (4..=6).contains(&pin.len()) && pin.bytes().all(|b| b.is_ascii_digit())
}

/// Random 4-digit PIN for users created without one
pub fn generate_pin() -> String {
    use rand::Rng;
    rand::thread_rng().gen_range(1000..10000).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pin_must_be_four_to_six_digits() {
        assert!(is_valid_pin("1234"));
        assert!(is_valid_pin("123456"));
        assert!(!is_valid_pin("123"));
        assert!(!is_valid_pin("1234567"));
        assert!(!is_valid_pin("12a4"));
        assert!(!is_valid_pin("１２３４"));
    }

    #[test]
    fn generated_pin_is_valid() {
        for _ in 0..50 {
            assert!(is_valid_pin(&generate_pin()));
        }
    }
}
