//! Error types for the property engine.
//!
//! Every fallible operation returns [`Result`]. Nothing in the engine panics
//! on bad input: a failed mutation leaves the property graph exactly as it
//! was before the call, so callers can absorb the error and carry on.

/// Result type alias for property operations.
pub type Result<T> = std::result::Result<T, PropertyError>;

/// Errors that can occur while reading or mutating properties.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PropertyError {
    /// A value, bind source or modifier does not fit the target's type.
    #[error("Incompatible types: expected {expected}, got {got}")]
    IncompatibleTypes {
        /// What the target accepts.
        expected: String,
        /// What was offered.
        got: String,
    },

    /// The operation would make a property depend on itself.
    #[error("Recursive call on property '{name}'")]
    RecursiveCall {
        /// The property whose evaluation would recurse.
        name: String,
    },

    /// A modifier vetoed the operation.
    #[error("Operation on property '{name}' rejected by modifier")]
    Rejected {
        /// The property whose modifier rejected the operation.
        name: String,
    },

    /// An argument was out of range or otherwise unusable.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The property handle refers to a property that has been removed.
    #[error("Property has been removed from the graph")]
    Expired,

    /// No property with the given name exists.
    #[error("Property '{name}' not found")]
    NotFound {
        /// The name that was looked up.
        name: String,
    },

    /// The property is read-only and cannot be written directly.
    #[error("Property '{name}' is read-only")]
    ReadOnly {
        /// The name of the read-only property.
        name: String,
    },
}

impl PropertyError {
    /// Create an incompatible types error.
    pub fn incompatible(expected: impl ToString, got: impl ToString) -> Self {
        Self::IncompatibleTypes {
            expected: expected.to_string(),
            got: got.to_string(),
        }
    }

    /// Create a recursive call error.
    pub fn recursive(name: impl Into<String>) -> Self {
        Self::RecursiveCall { name: name.into() }
    }

    /// Create a rejected error.
    pub fn rejected(name: impl Into<String>) -> Self {
        Self::Rejected { name: name.into() }
    }

    /// Create an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }
}

/// The successful outcome of a write.
///
/// `NothingToDo` means the write was accepted but did not change anything
/// observable, so no change notification was sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The value changed.
    Success,
    /// The new value equals the old one.
    NothingToDo,
}

impl Outcome {
    /// Whether the write changed the observable value.
    pub fn changed(self) -> bool {
        matches!(self, Self::Success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PropertyError::incompatible("i32", "string");
        assert_eq!(err.to_string(), "Incompatible types: expected i32, got string");

        let err = PropertyError::recursive("width");
        assert_eq!(err.to_string(), "Recursive call on property 'width'");

        let err = PropertyError::invalid_argument("index 4 out of range for length 3");
        assert_eq!(
            err.to_string(),
            "Invalid argument: index 4 out of range for length 3"
        );
    }

    #[test]
    fn test_outcome_changed() {
        assert!(Outcome::Success.changed());
        assert!(!Outcome::NothingToDo.changed());
    }
}
