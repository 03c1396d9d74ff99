// Error types for the codec, one enum per failure tier
use std::fmt;

use thiserror::Error;

use crate::model::soap::MessageType;

// Raised by value-object constructors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid date range: {start} is after {end}")]
    InvalidDateRange { start: String, end: String },

    #[error("Value out of range for {field}: {value}")]
    OutOfRange { field: String, value: String },

    #[error("Invalid code for {field}: {value}")]
    InvalidCode { field: String, value: String },

    #[error("Inconsistent data: {0}")]
    Inconsistent(String),
}

// A single business-rule breach found while validating a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub rule: &'static str,
    pub message: String,
}

impl Violation {
    pub fn new(rule: &'static str, message: impl Into<String>) -> Self {
        Self {
            rule,
            message: message.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.rule, self.message)
    }
}

// Every violation collected in one validation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Violations(Vec<Violation>);

impl Violations {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, rule: &'static str, message: impl Into<String>) {
        self.0.push(Violation::new(rule, message));
    }

    pub fn extend(&mut self, other: Violations) {
        self.0.extend(other.0);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Violation> {
        self.0.iter()
    }

    pub fn has_rule(&self, rule: &str) -> bool {
        self.0.iter().any(|v| v.rule == rule)
    }

    // `Ok(())` when nothing was collected, otherwise the whole set as an error.
    pub fn into_result(self) -> Result<(), CodecError> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(CodecError::Validation(self))
        }
    }
}

impl fmt::Display for Violations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self
            .0
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        write!(f, "{} violation(s): {}", self.0.len(), joined)
    }
}

// Raised by builders before any XML is emitted
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Validation failed: {0}")]
    Validation(Violations),

    #[error("Invalid value: {0}")]
    Model(#[from] ModelError),

    #[error("XML serialization error: {0}")]
    Serialization(String),

    #[error("Schema validation failed for {message_type:?}: {}", .errors.join("; "))]
    Schema {
        message_type: MessageType,
        errors: Vec<String>,
    },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl CodecError {
    pub fn violations(&self) -> Option<&Violations> {
        match self {
            CodecError::Validation(v) => Some(v),
            _ => None,
        }
    }
}

impl From<regex::Error> for CodecError {
    fn from(e: regex::Error) -> Self {
        CodecError::Config(e.to_string())
    }
}

// Why a response could not be turned into a successful result.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseFailure {
    #[error("Response is not well-formed XML: {0}")]
    Unparsable(String),

    #[error("Response has no SOAP envelope or body")]
    MissingEnvelope,

    #[error("Expected root element {0} not found")]
    MissingRoot(String),

    #[error("SOAP fault {code}: {message}")]
    SoapFault { code: String, message: String },

    #[error("Remote system reported errors: {code} - {message}")]
    ProtocolErrors { code: String, message: String },
}

impl ParseFailure {
    // Stable reason code copied into `SoapResponse::error_code`.
    pub fn code(&self) -> String {
        match self {
            ParseFailure::Unparsable(_) => "XML_PARSE_ERROR".to_string(),
            ParseFailure::MissingEnvelope => "MISSING_ENVELOPE".to_string(),
            ParseFailure::MissingRoot(_) => "MISSING_ROOT".to_string(),
            ParseFailure::SoapFault { code, .. } => code.clone(),
            ParseFailure::ProtocolErrors { code, .. } => code.clone(),
        }
    }

    pub fn message(&self) -> String {
        match self {
            ParseFailure::SoapFault { message, .. }
            | ParseFailure::ProtocolErrors { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

// Transport-side failures surfaced by the dispatcher
#[derive(Error, Debug, Clone)]
pub enum DispatchError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    #[error("Hub returned HTTP {status_code}: {message}")]
    HttpStatus {
        status_code: u16,
        message: String,
        is_retryable: bool,
    },

    #[error("Retries exhausted for message {message_id} after {attempts} attempt(s): {last_error}")]
    RetriesExhausted {
        message_id: String,
        attempts: u32,
        last_error: String,
    },
}

impl DispatchError {
    pub fn is_retryable(&self) -> bool {
        match self {
            DispatchError::Network(_) | DispatchError::Timeout(_) => true,
            DispatchError::HttpStatus { is_retryable, .. } => *is_retryable,
            DispatchError::RetriesExhausted { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_violations_aggregate_into_single_error() {
        let mut violations = Violations::new();
        violations.push("inventory.batch_size", "too many records");
        violations.push("inventory.hotel_mismatch", "mixed hotels");

        let err = violations.into_result().unwrap_err();
        let collected = err.violations().unwrap();
        assert_eq!(collected.len(), 2);
        assert!(collected.has_rule("inventory.batch_size"));
        assert!(err.to_string().contains("2 violation(s)"));
    }

    #[test]
    fn test_empty_violations_are_ok() {
        assert!(Violations::new().into_result().is_ok());
    }

    #[test]
    fn test_parse_failure_codes() {
        assert_eq!(
            ParseFailure::Unparsable("eof".into()).code(),
            "XML_PARSE_ERROR"
        );
        let fault = ParseFailure::SoapFault {
            code: "soap:Server".into(),
            message: "boom".into(),
        };
        assert_eq!(fault.code(), "soap:Server");
        assert_eq!(fault.message(), "boom");
    }

    #[test]
    fn test_dispatch_error_retryability() {
        assert!(DispatchError::Network("reset".into()).is_retryable());
        assert!(!DispatchError::HttpStatus {
            status_code: 400,
            message: "bad".into(),
            is_retryable: false
        }
        .is_retryable());
    }
}
