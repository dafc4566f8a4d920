//! # Path Validation
//!
//! Render-target paths are resolved inside a git checkout, so they must stay
//! relative and must not climb out of it.

/// Why a render-target path was rejected
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field} cannot be empty")]
    Empty { field: &'static str },
    #[error("{field} '{path}' must be relative to the repository root")]
    Absolute { field: &'static str, path: String },
    #[error("{field} '{path}' must not contain '..'")]
    ParentTraversal { field: &'static str, path: String },
    #[error("{field} '{path}' contains control characters")]
    ControlCharacters { field: &'static str, path: String },
    #[error("{field} exceeds maximum length of 4096 characters (got {len})")]
    TooLong { field: &'static str, len: usize },
}

/// Normalise a repository-relative path
///
/// Leading `./`, repeated or trailing slashes and `.` segments are dropped.
/// The repository root normalises to the empty string, which is only accepted
/// when `allow_root` is set (Kustomize overlays may live at the root, values
/// files may not).
pub fn normalize_repo_path(
    path: &str,
    field: &'static str,
    allow_root: bool,
) -> Result<String, ValidationError> {
    let trimmed = path.trim();

    if trimmed.len() > 4096 {
        return Err(ValidationError::TooLong {
            field,
            len: trimmed.len(),
        });
    }
    if trimmed.chars().any(char::is_control) {
        return Err(ValidationError::ControlCharacters {
            field,
            path: trimmed.to_string(),
        });
    }
    if trimmed.starts_with('/') || trimmed.starts_with('\\') {
        return Err(ValidationError::Absolute {
            field,
            path: trimmed.to_string(),
        });
    }

    let mut segments = Vec::new();
    for segment in trimmed.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                return Err(ValidationError::ParentTraversal {
                    field,
                    path: trimmed.to_string(),
                })
            }
            other => segments.push(other),
        }
    }

    let normalized = segments.join("/");
    if normalized.is_empty() && !allow_root {
        return Err(ValidationError::Empty { field });
    }
    Ok(normalized)
}
