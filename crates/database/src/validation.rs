//! Input validation for tenant and profile fields.

use std::fmt;

/// Validation error types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Invalid email format.
    InvalidEmail(String),
    /// Business name contains characters that cannot be routed on.
    InvalidBusinessName(String),
    /// Webhook URL is not an absolute http(s) URL.
    InvalidWebhookUrl(String),
    /// Currency is not a three-letter code.
    InvalidCurrency(String),
    /// Value too long.
    TooLong { field: String, max: usize, actual: usize },
    /// Empty value where one is required.
    Empty(String),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::InvalidEmail(msg) => write!(f, "Invalid email: {}", msg),
            ValidationError::InvalidBusinessName(msg) => write!(f, "Invalid business name: {}", msg),
            ValidationError::InvalidWebhookUrl(msg) => write!(f, "Invalid webhook URL: {}", msg),
            ValidationError::InvalidCurrency(code) => write!(f, "Invalid currency code: {}", code),
            ValidationError::TooLong { field, max, actual } => {
                write!(f, "{} is too long ({} chars, max {})", field, actual, max)
            }
            ValidationError::Empty(field) => write!(f, "{} cannot be empty", field),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Maximum allowed length for email addresses.
pub const MAX_EMAIL_LENGTH: usize = 254;

/// Maximum allowed length for business names.
pub const MAX_BUSINESS_NAME_LENGTH: usize = 64;

/// Maximum allowed length for webhook URLs.
pub const MAX_WEBHOOK_URL_LENGTH: usize = 2048;

/// Maximum allowed length for API key labels and group names.
pub const MAX_LABEL_LENGTH: usize = 100;

/// Maximum allowed length for an outbound message body.
pub const MAX_MESSAGE_LENGTH: usize = 1600;

fn check_length(field: &str, value: &str, max: usize) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::Empty(field.to_string()));
    }
    let actual = value.chars().count();
    if actual > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
            actual,
        });
    }
    Ok(())
}

/// Validate an email address (local@domain.tld shape only).
pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    let email = email.trim();
    check_length("email", email, MAX_EMAIL_LENGTH)?;

    let Some((local, domain)) = email.split_once('@') else {
        return Err(ValidationError::InvalidEmail("must contain an @ symbol".to_string()));
    };
    if domain.contains('@') {
        return Err(ValidationError::InvalidEmail(
            "must contain exactly one @ symbol".to_string(),
        ));
    }
    if local.is_empty() {
        return Err(ValidationError::InvalidEmail("missing local part".to_string()));
    }
    if !domain.contains('.') || domain.starts_with('.') || domain.ends_with('.') || domain.contains("..") {
        return Err(ValidationError::InvalidEmail(format!("malformed domain '{}'", domain)));
    }

    Ok(())
}

/// Validate a business name used as an inbound routing key.
///
/// Letters, digits, space, `-`, `_` and `.` are allowed.
pub fn validate_business_name(name: &str) -> Result<(), ValidationError> {
    let name = name.trim();
    check_length("business name", name, MAX_BUSINESS_NAME_LENGTH)?;

    if let Some(c) = name
        .chars()
        .find(|c| !(c.is_alphanumeric() || matches!(c, ' ' | '-' | '_' | '.')))
    {
        return Err(ValidationError::InvalidBusinessName(format!(
            "invalid character '{}'",
            c
        )));
    }

    Ok(())
}

/// Validate a push-delivery webhook URL.
pub fn validate_webhook_url(url: &str) -> Result<(), ValidationError> {
    let url = url.trim();
    check_length("webhook URL", url, MAX_WEBHOOK_URL_LENGTH)?;

    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .ok_or_else(|| ValidationError::InvalidWebhookUrl("must start with http:// or https://".to_string()))?;

    let host = rest.split(['/', '?', '#']).next().unwrap_or_default();
    if host.is_empty() {
        return Err(ValidationError::InvalidWebhookUrl("missing host".to_string()));
    }
    if url.chars().any(char::is_whitespace) {
        return Err(ValidationError::InvalidWebhookUrl("contains whitespace".to_string()));
    }

    Ok(())
}

/// Validate an ISO 4217-shaped currency code.
pub fn validate_currency(code: &str) -> Result<(), ValidationError> {
    if code.len() == 3 && code.chars().all(|c| c.is_ascii_uppercase()) {
        Ok(())
    } else {
        Err(ValidationError::InvalidCurrency(code.to_string()))
    }
}

/// Validate a short free-text label.
pub fn validate_label(field: &str, label: &str) -> Result<(), ValidationError> {
    check_length(field, label.trim(), MAX_LABEL_LENGTH)
}

/// Validate an outbound message body.
pub fn validate_message(body: &str) -> Result<(), ValidationError> {
    if body.trim().is_empty() {
        return Err(ValidationError::Empty("message".to_string()));
    }
    check_length("message", body, MAX_MESSAGE_LENGTH)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_email() {
        assert!(validate_email("ops@example.com").is_ok());
        assert!(validate_email(" user.name@domain.co.uk ").is_ok());

        assert!(matches!(validate_email(""), Err(ValidationError::Empty(_))));
        assert!(matches!(validate_email("ops.example.com"), Err(ValidationError::InvalidEmail(_))));
        assert!(matches!(validate_email("a@b@c.com"), Err(ValidationError::InvalidEmail(_))));
        assert!(matches!(validate_email("@example.com"), Err(ValidationError::InvalidEmail(_))));
        assert!(matches!(validate_email("ops@localhost"), Err(ValidationError::InvalidEmail(_))));
        assert!(matches!(validate_email("ops@example..com"), Err(ValidationError::InvalidEmail(_))));

        let long = format!("{}@example.com", "a".repeat(250));
        assert!(matches!(validate_email(&long), Err(ValidationError::TooLong { .. })));
    }

    #[test]
    fn test_validate_business_name() {
        assert!(validate_business_name("Acme Dental").is_ok());
        assert!(validate_business_name("acme_2.0-east").is_ok());

        assert!(matches!(validate_business_name("  "), Err(ValidationError::Empty(_))));
        assert!(matches!(
            validate_business_name("acme/west"),
            Err(ValidationError::InvalidBusinessName(_))
        ));
        assert!(matches!(
            validate_business_name(&"x".repeat(65)),
            Err(ValidationError::TooLong { .. })
        ));
    }

    #[test]
    fn test_validate_webhook_url() {
        assert!(validate_webhook_url("https://hooks.example.com/sms").is_ok());
        assert!(validate_webhook_url("http://10.0.0.5:8080").is_ok());

        assert!(validate_webhook_url("ftp://example.com").is_err());
        assert!(validate_webhook_url("https:///path").is_err());
        assert!(validate_webhook_url("https://exa mple.com").is_err());
    }

    #[test]
    fn test_validate_currency_and_message() {
        assert!(validate_currency("USD").is_ok());
        assert!(validate_currency("usd").is_err());
        assert!(validate_currency("EURO").is_err());

        assert!(validate_message("hello").is_ok());
        assert!(matches!(validate_message("   "), Err(ValidationError::Empty(_))));
        assert!(matches!(
            validate_message(&"a".repeat(MAX_MESSAGE_LENGTH + 1)),
            Err(ValidationError::TooLong { .. })
        ));
    }

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::InvalidCurrency("usd".to_string());
        assert_eq!(err.to_string(), "Invalid currency code: usd");

        let err = ValidationError::TooLong {
            field: "business name".to_string(),
            max: 64,
            actual: 70,
        };
        assert_eq!(err.to_string(), "business name is too long (70 chars, max 64)");
    }
}
