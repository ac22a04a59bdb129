use crate::error::{AppError, Result};
use once_cell::sync::Lazy;
use regex::Regex;

static USERNAME_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9_-]+$").unwrap_or_else(|e| panic!("invalid username pattern: {}", e))
});

pub const USERNAME_MIN_LENGTH: usize = 6;
pub const USERNAME_MAX_LENGTH: usize = 30;

/// 验证邮箱并返回详细错误信息
pub fn validate_email_format(email: &str) -> Result<()> {
    if email.trim().is_empty() {
        return Err(AppError::InvalidEmail);
    }

    if email.len() > 254 || !validator::validate_email(email) {
        return Err(AppError::InvalidEmail);
    }

    Ok(())
}

/// 验证用户名格式
///
/// Usernames are case-insensitively unique, so only the character set and
/// length are checked here; availability is a store lookup.
pub fn validate_username(username: &str, min_length: usize, max_length: usize) -> Result<()> {
    if username.trim().is_empty() {
        return Err(AppError::validation("Username is required"));
    }

    let length = username.chars().count();
    if length < min_length {
        return Err(AppError::Validation(format!(
            "Username must be at least {} characters",
            min_length
        )));
    }

    if length > max_length {
        return Err(AppError::Validation(format!(
            "Username must be at most {} characters",
            max_length
        )));
    }

    // 用户名只能包含字母、数字、下划线和连字符
    if !USERNAME_REGEX.is_match(username) {
        return Err(AppError::validation(
            "Username may only contain letters, digits, underscores and hyphens",
        ));
    }

    Ok(())
}

/// Comment bodies: trimmed, non-empty, bounded.
pub fn validate_comment_content(content: &str, max_length: usize) -> Result<String> {
    let content = content.trim();
    if content.is_empty() {
        return Err(AppError::validation("Comment cannot be empty"));
    }
    if content.chars().count() > max_length {
        return Err(AppError::Validation(format!(
            "Comment must be at most {} characters",
            max_length
        )));
    }
    Ok(content.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_email_format() {
        assert!(validate_email_format("alice@x.com").is_ok());
        assert!(matches!(validate_email_format(""), Err(AppError::InvalidEmail)));
        assert!(matches!(validate_email_format("not-an-email"), Err(AppError::InvalidEmail)));
    }

    #[test]
    fn test_validate_username() {
        assert!(validate_username("alice_01", USERNAME_MIN_LENGTH, USERNAME_MAX_LENGTH).is_ok());
        assert!(validate_username("mr-bob", USERNAME_MIN_LENGTH, USERNAME_MAX_LENGTH).is_ok());

        assert!(validate_username("", USERNAME_MIN_LENGTH, USERNAME_MAX_LENGTH).is_err());
        assert!(validate_username("bob", USERNAME_MIN_LENGTH, USERNAME_MAX_LENGTH).is_err());
        assert!(validate_username(&"a".repeat(31), USERNAME_MIN_LENGTH, USERNAME_MAX_LENGTH).is_err());
        assert!(validate_username("alice smith", USERNAME_MIN_LENGTH, USERNAME_MAX_LENGTH).is_err());
        assert!(validate_username("alice@home", USERNAME_MIN_LENGTH, USERNAME_MAX_LENGTH).is_err());
    }

    #[test]
    fn test_validate_comment_content() {
        assert_eq!(validate_comment_content("  great list ", 2000).unwrap(), "great list");
        assert!(validate_comment_content("   ", 2000).is_err());
        assert!(validate_comment_content("abc", 2).is_err());
    }
}
