//! Run identity sanitization.
//!
//! A run identity is derived from the requirement document's file stem and is
//! used in state file names and log fields, so it is restricted to
//! `[A-Za-z0-9._-]`.

use std::path::Path;

use unicode_normalization::UnicodeNormalization;

use crate::error::{ErrorCategory, UserFriendlyError};

/// Error type for identity validation failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    #[error("Run identity is empty after sanitization")]
    Empty,

    #[error("Run identity contains only invalid characters")]
    OnlyInvalidCharacters,
}

impl UserFriendlyError for IdentityError {
    fn user_message(&self) -> String {
        match self {
            Self::Empty => "The run identity is empty".to_string(),
            Self::OnlyInvalidCharacters => {
                "The document name contains no letters, digits, dots, or dashes".to_string()
            }
        }
    }

    fn context(&self) -> Option<String> {
        Some("Only ASCII alphanumerics, dots, dashes, and underscores are kept; anything else becomes an underscore.".to_string())
    }

    fn suggestions(&self) -> Vec<String> {
        vec![
            "Rename the document, e.g. payments-requirements.pdf".to_string(),
        ]
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Input
    }
}

/// Sanitize a raw name into a run identity.
///
/// - Normalizes with NFKC so full-width and compatibility forms collapse to ASCII
/// - Replaces everything outside `[A-Za-z0-9._-]` with `_`
/// - Replaces `..` with `__`
///
/// ```
/// use hldflow_utils::identity::sanitize_identity;
///
/// assert_eq!(sanitize_identity("payments-v2").unwrap(), "payments-v2");
/// assert_eq!(sanitize_identity("Payments HLD").unwrap(), "Payments_HLD");
/// ```
///
/// # Errors
///
/// Returns [`IdentityError`] when nothing meaningful is left after sanitization.
pub fn sanitize_identity(raw: &str) -> Result<String, IdentityError> {
    let normalized: String = raw.nfkc().collect();

    let mut sanitized: String = normalized
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();

    while sanitized.contains("..") {
        sanitized = sanitized.replace("..", "__");
    }

    if sanitized.is_empty() {
        return Err(IdentityError::Empty);
    }

    let has_meaningful_content = sanitized
        .chars()
        .any(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-');
    if !has_meaningful_content {
        return Err(IdentityError::OnlyInvalidCharacters);
    }

    if sanitized != raw {
        tracing::debug!(original = %raw, sanitized = %sanitized, "Run identity sanitized");
    }

    Ok(sanitized)
}

/// Derive a run identity from a document path (its file stem).
///
/// Returns `None` when the path has no file stem.
///
/// # Errors
///
/// Propagates [`IdentityError`] from [`sanitize_identity`].
pub fn identity_from_path(path: &Path) -> Result<Option<String>, IdentityError> {
    match path.file_stem().and_then(|s| s.to_str()) {
        Some(stem) => sanitize_identity(stem).map(Some),
        None => Ok(None),
    }
}
