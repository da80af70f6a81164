//! # Error Types
//!
//! Domain-specific error types for depot-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  depot-core errors (this file)                                          │
//! │  └── CoreError   - Change event validation failures                     │
//! │                                                                         │
//! │  depot-cache errors (separate crate)                                    │
//! │  └── CacheError  - Storage and envelope failures (degrade to miss)      │
//! │                                                                         │
//! │  depot-index errors (separate crate)                                    │
//! │  └── IndexError  - Backend, feed, and engine failures                   │
//! │                                                                         │
//! │  Flow: CoreError → IndexError → IndexStatus.error → Frontend            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (event kind, id, etc.)
//! 3. Errors are enum variants, never String

use thiserror::Error;

use crate::change::ChangeKind;

// =============================================================================
// Core Error
// =============================================================================

/// Validation failures at the change-event boundary plus the JSON codec
/// errors the wire helpers surface.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A frame arrived without the row image its kind requires.
    ///
    /// ## When This Occurs
    /// - An insert or update frame with no `after` image
    /// - A truncated or hand-built frame from a misbehaving feed
    #[error("{} change event carries no row image", kind.as_str())]
    MissingPayload { kind: ChangeKind },

    /// The row image does not deserialize into the module's record type.
    ///
    /// ## When This Occurs
    /// - Backend schema drifted ahead of the client build
    /// - A frame for another table leaked onto this subscription
    #[error("{} change event has a malformed record: {source}", kind.as_str())]
    MalformedRecord {
        kind: ChangeKind,
        #[source]
        source: serde_json::Error,
    },

    /// A delete frame with no extractable string `id` in either image.
    #[error("delete change event carries no identifier")]
    MissingIdentifier,

    /// Serializing a record or frame to JSON failed.
    #[error("failed to encode JSON: {0}")]
    Encode(#[source] serde_json::Error),

    /// Parsing a wire frame from JSON text failed.
    #[error("failed to decode JSON: {0}")]
    Decode(#[source] serde_json::Error),
}

impl CoreError {
    pub fn encode(source: serde_json::Error) -> Self {
        CoreError::Encode(source)
    }

    pub fn decode(source: serde_json::Error) -> Self {
        CoreError::Decode(source)
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::MissingPayload {
            kind: ChangeKind::Update,
        };
        assert_eq!(err.to_string(), "update change event carries no row image");

        let err = CoreError::MissingIdentifier;
        assert_eq!(err.to_string(), "delete change event carries no identifier");
    }

    #[test]
    fn test_decode_error_carries_source() {
        let err = crate::change::RawChange::from_json("not json").unwrap_err();
        assert!(matches!(err, CoreError::Decode(_)));
        assert!(err.to_string().starts_with("failed to decode JSON"));
    }
}
