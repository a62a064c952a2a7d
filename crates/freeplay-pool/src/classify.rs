//! Classification of failed completion attempts
//!
//! A failed attempt either disables the account (its project is gone or its
//! session was rejected) or is transient (the retry loop moves on without
//! touching the account).

use freeplay_client::PATH_NOT_FOUND_MARKER;
use provider::ErrorClassification;

/// Classify a non-200 completion response by status and body.
///
/// The missing-resource marker wins regardless of status; 401 and 404 are
/// disabling; everything else, including 403 and 5xx, is transient.
pub fn classify_status(status: u16, body: &str) -> ErrorClassification {
    if body.contains(PATH_NOT_FOUND_MARKER) {
        return ErrorClassification::Disabling;
    }
    match status {
        401 | 404 => ErrorClassification::Disabling,
        _ => ErrorClassification::Transient,
    }
}
