use super::ApiError;

pub const MAX_USERNAME_LENGTH: usize = 64;
pub const MAX_PAGE_NAME_LENGTH: usize = 200;
pub const MAX_COMMENT_LENGTH: usize = 10_000;
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Validate a username: non-empty, bounded, and limited to a safe charset.
pub fn validate_username(username: &str) -> Result<(), ApiError> {
    if username.trim().is_empty() {
        return Err(ApiError::validation("Username is required"));
    }
    if username.len() > MAX_USERNAME_LENGTH {
        return Err(ApiError::validation(format!(
            "Username must be at most {MAX_USERNAME_LENGTH} characters"
        )));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
    {
        return Err(ApiError::validation(
            "Username may only contain letters, digits, '_', '-' and '.'",
        ));
    }
    Ok(())
}

/// Minimal email shape check. Full RFC validation is out of scope;
/// the address only feeds login identity and avatar hashing.
pub fn validate_email(email: &str) -> Result<(), ApiError> {
    let trimmed = email.trim();
    if trimmed.is_empty() {
        return Err(ApiError::validation("Email is required"));
    }
    let Some((local, domain)) = trimmed.split_once('@') else {
        return Err(ApiError::validation("Email must contain '@'"));
    };
    if local.is_empty() || domain.is_empty() || !domain.contains('.') {
        return Err(ApiError::validation("Email address is not valid"));
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), ApiError> {
    if password.len() < MIN_PASSWORD_LENGTH {
        return Err(ApiError::validation(format!(
            "Password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    Ok(())
}

pub fn validate_page_name(name: &str) -> Result<(), ApiError> {
    if name.trim().is_empty() {
        return Err(ApiError::validation("Page name is required"));
    }
    if name.len() > MAX_PAGE_NAME_LENGTH {
        return Err(ApiError::validation(format!(
            "Page name must be at most {MAX_PAGE_NAME_LENGTH} characters"
        )));
    }
    Ok(())
}

pub fn validate_comment_text(text: &str) -> Result<(), ApiError> {
    if text.trim().is_empty() {
        return Err(ApiError::validation("Comment text is required"));
    }
    if text.len() > MAX_COMMENT_LENGTH {
        return Err(ApiError::validation(format!(
            "Comment text must be at most {MAX_COMMENT_LENGTH} characters"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_username() {
        assert!(validate_username("alice").is_ok());
        assert!(validate_username("alice.b-2_c").is_ok());
        assert!(validate_username("").is_err());
        assert!(validate_username("   ").is_err());
        assert!(validate_username("has space").is_err());
        assert!(validate_username(&"x".repeat(MAX_USERNAME_LENGTH + 1)).is_err());
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email("alice@example.com").is_ok());
        assert!(validate_email("  alice@example.com  ").is_ok());
        assert!(validate_email("").is_err());
        assert!(validate_email("no-at-sign").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("alice@nodot").is_err());
    }

    #[test]
    fn test_validate_password() {
        assert!(validate_password("longenough").is_ok());
        assert!(validate_password("short").is_err());
    }

    #[test]
    fn test_validate_page_name() {
        assert!(validate_page_name("My Blog").is_ok());
        assert!(validate_page_name("").is_err());
        assert!(validate_page_name(&"x".repeat(MAX_PAGE_NAME_LENGTH + 1)).is_err());
    }

    #[test]
    fn test_validate_comment_text() {
        assert!(validate_comment_text("hello").is_ok());
        assert!(validate_comment_text("  \n ").is_err());
        assert!(validate_comment_text(&"x".repeat(MAX_COMMENT_LENGTH + 1)).is_err());
    }
}
