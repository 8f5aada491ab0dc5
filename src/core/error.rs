//! Stable error kinds returned by the public API.
//!
//! These discriminants stay stable across versions since UI toasts and
//! save-file readers match on them.

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum CoreError {
    #[error("no territory or guild named '{0}'")]
    NotFound(String),

    #[error("field '{field}' value {value} is outside its documented domain")]
    OutOfRange { field: String, value: String },

    #[error("guild '{guild}' already has a headquarters at '{existing}'")]
    HqConflict { guild: String, existing: String },

    #[error("border closed at '{0}'")]
    BorderClosed(String),

    #[error("an undo/redo/jump operation is already in flight")]
    Busy,

    #[error("plugin pathfinder '{provider}' returned a route violating policy")]
    InvalidRoute { provider: String },

    #[error("save payload version {found} is newer than supported version {max_supported}")]
    VersionUnsupported { found: u16, max_supported: u16 },

    #[error("save payload failed structural decode: {0}")]
    CorruptPayload(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    /// Stable discriminant name, used when relaying errors over the
    /// `on_error` channel so callers can match without depending on message text.
    pub fn discriminant(&self) -> &'static str {
        match self {
            CoreError::NotFound(_) => "not_found",
            CoreError::OutOfRange { .. } => "out_of_range",
            CoreError::HqConflict { .. } => "hq_conflict",
            CoreError::BorderClosed(_) => "border_closed",
            CoreError::Busy => "busy",
            CoreError::InvalidRoute { .. } => "invalid_route",
            CoreError::VersionUnsupported { .. } => "version_unsupported",
            CoreError::CorruptPayload(_) => "corrupt_payload",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discriminants_are_stable_strings() {
        assert_eq!(CoreError::NotFound("x".into()).discriminant(), "not_found");
        assert_eq!(CoreError::Busy.discriminant(), "busy");
        assert_eq!(
            CoreError::VersionUnsupported {
                found: 9,
                max_supported: 1
            }
            .discriminant(),
            "version_unsupported"
        );
    }
}
