//! Error taxonomy for boundary crossings
//!
//! Every failed crossing surfaces exactly one `BridgeError`. Conversion and
//! origin errors are ordinary results for the caller; `BridgingFault` marks a
//! broken internal invariant and aborts only the crossing that hit it.

use std::fmt;
use thiserror::Error;

/// Which runtime an error or object originated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Guest,
    Host,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Guest => f.write_str("guest"),
            Side::Host => f.write_str("host"),
        }
    }
}

/// Coarse tag carried by every `BridgeError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Conversion,
    UnsupportedType,
    BridgingFault,
    OriginRuntime,
}

/// A value could not be converted faithfully.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversionError {
    #[error("text is not valid UTF-8: {0}")]
    InvalidText(String),

    #[error("guest value of type {found} cannot be read as {expected}")]
    UnexpectedType {
        expected: &'static str,
        found: String,
    },
}

/// An internal invariant of the bridge was violated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgingFault {
    #[error("integer buffer holds {actual} bytes, expected {expected}")]
    IntegerBuffer { expected: usize, actual: usize },

    #[error("handle {id} was used after release")]
    UseAfterRelease { id: u64 },

    #[error("execution lock is held by another thread; re-entry refused")]
    LockReentry,

    #[error("no active guest context on this thread")]
    MissingContext,

    #[error("bridge has been torn down")]
    TornDown,

    #[error("guest engine failure: {0}")]
    Guest(String),
}

/// An error raised by the origin runtime itself, surfaced verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginError {
    pub side: Side,
    /// Class or category name of the origin error, when one exists.
    pub type_name: Option<String>,
    pub message: String,
}

impl OriginError {
    pub fn new(side: Side, type_name: Option<String>, message: impl Into<String>) -> Self {
        Self {
            side,
            type_name,
            message: message.into(),
        }
    }
}

impl fmt::Display for OriginError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.type_name {
            Some(name) => write!(f, "{} {}: {}", self.side, name, self.message),
            None => write!(f, "{} error: {}", self.side, self.message),
        }
    }
}

/// The structured error returned by every bridge entry point.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    #[error("conversion failed: {0}")]
    Conversion(#[from] ConversionError),

    #[error("{type_name} has no value mapping and cannot be wrapped {context}")]
    UnsupportedType {
        type_name: String,
        context: &'static str,
    },

    #[error("bridging fault: {0}")]
    Fault(#[from] BridgingFault),

    #[error("{0}")]
    Origin(OriginError),
}

impl BridgeError {
    /// Shorthand for an error raised by the origin runtime.
    pub fn origin(side: Side, type_name: impl Into<String>, message: impl Into<String>) -> Self {
        BridgeError::Origin(OriginError::new(side, Some(type_name.into()), message))
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            BridgeError::Conversion(_) => ErrorKind::Conversion,
            BridgeError::UnsupportedType { .. } => ErrorKind::UnsupportedType,
            BridgeError::Fault(_) => ErrorKind::BridgingFault,
            BridgeError::Origin(_) => ErrorKind::OriginRuntime,
        }
    }

    /// Category name carried across the boundary.
    ///
    /// Origin errors keep their own class name; bridge-generated errors use
    /// a fixed name per kind.
    pub fn category(&self) -> &str {
        match self {
            BridgeError::Origin(origin) => origin.type_name.as_deref().unwrap_or("Error"),
            BridgeError::Conversion(_) => "ConversionError",
            BridgeError::UnsupportedType { .. } => "UnsupportedTypeError",
            BridgeError::Fault(_) => "BridgingFault",
        }
    }

    /// Human readable message without the kind prefix.
    pub fn message(&self) -> String {
        match self {
            BridgeError::Origin(origin) => origin.message.clone(),
            BridgeError::Conversion(err) => err.to_string(),
            BridgeError::Fault(fault) => fault.to_string(),
            other => other.to_string(),
        }
    }

    pub fn is_fault(&self) -> bool {
        matches!(self, BridgeError::Fault(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_error_keeps_category_and_message() {
        let err = BridgeError::origin(Side::Guest, "ValueError", "boom");
        assert_eq!(err.kind(), ErrorKind::OriginRuntime);
        assert_eq!(err.category(), "ValueError");
        assert_eq!(err.message(), "boom");
        assert_eq!(err.to_string(), "guest ValueError: boom");
    }

    #[test]
    fn test_origin_error_without_type_name() {
        let err = BridgeError::Origin(OriginError::new(Side::Host, None, "lost"));
        assert_eq!(err.category(), "Error");
        assert_eq!(err.to_string(), "host error: lost");
    }

    #[test]
    fn test_faults_convert_and_report_kind() {
        let err: BridgeError = BridgingFault::IntegerBuffer {
            expected: 8,
            actual: 7,
        }
        .into();
        assert!(err.is_fault());
        assert_eq!(err.kind(), ErrorKind::BridgingFault);
        assert_eq!(err.category(), "BridgingFault");
        assert_eq!(err.message(), "integer buffer holds 7 bytes, expected 8");
    }

    #[test]
    fn test_unsupported_type_message() {
        let err = BridgeError::UnsupportedType {
            type_name: "Map".into(),
            context: "while wrapping is disabled",
        };
        assert_eq!(err.kind(), ErrorKind::UnsupportedType);
        assert_eq!(
            err.to_string(),
            "Map has no value mapping and cannot be wrapped while wrapping is disabled"
        );
    }
}
