//! Validation helpers for DTOs.

use validator::ValidationError;

/// Longest accepted session token, in bytes.
pub const SESSION_TOKEN_MAX_LEN: usize = 128;
/// Longest accepted display name, counted in characters after trimming.
pub const DISPLAY_NAME_MAX_CHARS: usize = 24;

/// Validates that a session token is present and at most 128 bytes long.
///
/// Tokens are opaque: any content is accepted, only the length is bounded.
///
/// # Examples
///
/// ```ignore
/// validate_session_token("3f9a1c0e-44b2") // Ok
/// validate_session_token("a b!")          // Ok
/// validate_session_token("")              // Err - empty
/// ```
pub fn validate_session_token(token: &str) -> Result<(), ValidationError> {
    if token.is_empty() || token.len() > SESSION_TOKEN_MAX_LEN {
        let mut err = ValidationError::new("session_token_length");
        err.message = Some(
            format!(
                "Session token must be between 1 and {SESSION_TOKEN_MAX_LEN} bytes (got {})",
                token.len()
            )
            .into(),
        );
        return Err(err);
    }

    Ok(())
}

/// Validates that a display name has 1 to 24 characters once trimmed.
pub fn validate_display_name(name: &str) -> Result<(), ValidationError> {
    let count = name.trim().chars().count();
    if count == 0 || count > DISPLAY_NAME_MAX_CHARS {
        let mut err = ValidationError::new("display_name_length");
        err.message = Some(
            format!("Display name must be between 1 and {DISPLAY_NAME_MAX_CHARS} characters")
                .into(),
        );
        return Err(err);
    }

    if name.chars().any(char::is_control) {
        let mut err = ValidationError::new("display_name_format");
        err.message = Some("Display name must not contain control characters".into());
        return Err(err);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_session_token_is_opaque() {
        assert!(validate_session_token("a").is_ok());
        assert!(validate_session_token("3f9a1c0e-44b2_XYZ").is_ok());
        assert!(validate_session_token("abc def!").is_ok());
        assert!(validate_session_token("abcdéfghi").is_ok());
        assert!(validate_session_token(&"a".repeat(128)).is_ok());
    }

    #[test]
    fn test_validate_session_token_invalid_length() {
        assert!(validate_session_token("").is_err());
        assert!(validate_session_token(&"a".repeat(129)).is_err());
    }

    #[test]
    fn test_validate_display_name() {
        assert!(validate_display_name("Lovecraft").is_ok());
        assert!(validate_display_name("  Ada  ").is_ok());
        assert!(validate_display_name("   ").is_err());
        assert!(validate_display_name(&"x".repeat(25)).is_err());
        assert!(validate_display_name("bad\nname").is_err());
    }
}
