use crate::{error::ValidationError, storage::UNKNOWN_SOURCE_ADDRESS};

/// Upper bound on identifier length (the practical maximum for an email address).
pub const MAX_IDENTIFIER_LEN: usize = 254;

/// Normalizes an account identifier before it is counted or stored.
///
/// Identifiers are trimmed and ASCII-lowercased so `A@X.com ` and `a@x.com`
/// share one failure streak. No format check is applied: attempts against
/// identifiers that cannot be accounts are still recorded.
///
/// # Examples
///
/// ```rust
/// use recouply_core::validation::normalize_identifier;
///
/// assert_eq!(normalize_identifier(" A@X.com ").unwrap(), "a@x.com");
/// assert!(normalize_identifier("   ").is_err());
/// ```
pub fn normalize_identifier(identifier: &str) -> Result<String, ValidationError> {
    let trimmed = identifier.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::MissingField(
            "email is required".to_string(),
        ));
    }

    if trimmed.len() > MAX_IDENTIFIER_LEN {
        return Err(ValidationError::InvalidIdentifier(
            "email is too long".to_string(),
        ));
    }

    Ok(trimmed.to_ascii_lowercase())
}

/// Normalizes a source address, falling back to `"unknown"` when absent or blank.
pub fn normalize_source_address(source_address: Option<&str>) -> String {
    source_address
        .map(str::trim)
        .filter(|addr| !addr.is_empty())
        .unwrap_or(UNKNOWN_SOURCE_ADDRESS)
        .to_string()
}
