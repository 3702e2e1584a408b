//! Failures of single calls and of whole signing operations.

use std::{error, fmt};

use openssl::error::ErrorStack;

use crate::constants::{
    RESULT_CONFIG_ERROR, RESULT_GENERIC_FAILURE, RESULT_PROTOCOL_ERROR, RESULT_TIMEOUT,
};

//------------ RpcError ------------------------------------------------------

/// The failure of a single remote operation against a single endpoint.
///
/// The variant decides what the failover logic does next: a [`Timeout`]
/// always moves on to the next signing server, a [`Failed`] moves on only
/// for operations that may be served by any server, all other variants are
/// terminal for the operation at hand.
///
/// [`Timeout`]: RpcError::Timeout
/// [`Failed`]: RpcError::Failed
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RpcError {
    /// The server could not be reached in time. The connection must not be
    /// reused.
    Timeout(String),

    /// The operation failed with the given non-zero result code.
    Failed { code: i32, reason: String },

    /// A successful response lacked the named payload field.
    MissingPayload(&'static str),

    /// A successful response carried a payload that could not be decoded.
    InvalidPayload(String),

    /// The endpoint configuration is unusable, e.g. its port is malformed.
    Config(String),
}

impl RpcError {
    pub fn timeout(reason: impl fmt::Display) -> Self {
        RpcError::Timeout(reason.to_string())
    }

    pub fn failed(code: i32, reason: impl fmt::Display) -> Self {
        RpcError::Failed {
            code,
            reason: reason.to_string(),
        }
    }

    pub fn generic(reason: impl fmt::Display) -> Self {
        Self::failed(RESULT_GENERIC_FAILURE, reason)
    }

    pub fn invalid_payload(reason: impl fmt::Display) -> Self {
        RpcError::InvalidPayload(reason.to_string())
    }

    pub fn config(reason: impl fmt::Display) -> Self {
        RpcError::Config(reason.to_string())
    }

    /// Returns the numeric result code of this failure.
    pub fn code(&self) -> i32 {
        match self {
            RpcError::Timeout(_) => RESULT_TIMEOUT,
            RpcError::Failed { code, .. } => *code,
            RpcError::MissingPayload(_) | RpcError::InvalidPayload(_) => RESULT_PROTOCOL_ERROR,
            RpcError::Config(_) => RESULT_CONFIG_ERROR,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, RpcError::Timeout(_))
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RpcError::Timeout(reason) => write!(f, "connection timed out: {}", reason),
            RpcError::Failed { code, reason } => write!(f, "failed with code {}: {}", code, reason),
            RpcError::MissingPayload(field) => {
                write!(
                    f,
                    "response lacks the '{}' payload, has the certificate for this key been uploaded?",
                    field
                )
            }
            RpcError::InvalidPayload(reason) => write!(f, "invalid response payload: {}", reason),
            RpcError::Config(reason) => write!(f, "unusable endpoint configuration: {}", reason),
        }
    }
}

impl error::Error for RpcError {}

//------------ SignerError ---------------------------------------------------

/// An error returned by the [`RemoteSigner`] operations.
///
/// [`RemoteSigner`]: crate::signing::RemoteSigner
#[derive(Debug)]
pub enum SignerError {
    /// Every configured signing server was tried and none of them could
    /// complete the operation.
    NoServerAvailable {
        operation: &'static str,
        attempted: usize,
        last: Option<RpcError>,
    },

    /// A remote operation failed in a way that another server cannot fix.
    Remote {
        operation: &'static str,
        endpoint: String,
        label: String,
        error: RpcError,
    },

    /// The signing server refused to store the certificate.
    CertificateRejected { endpoint: String, label: String },

    /// The certificate request returned by the server cannot be used.
    InvalidCsr(String),

    /// The certificate handed to us for upload cannot be used.
    InvalidCertificate(String),

    OpenSslError(ErrorStack),
}

impl SignerError {
    pub fn remote(
        operation: &'static str,
        endpoint: impl fmt::Display,
        label: impl fmt::Display,
        error: RpcError,
    ) -> Self {
        SignerError::Remote {
            operation,
            endpoint: endpoint.to_string(),
            label: label.to_string(),
            error,
        }
    }

    /// Returns the numeric result code of the underlying remote failure, if
    /// there was one.
    pub fn code(&self) -> Option<i32> {
        match self {
            SignerError::NoServerAvailable { last, .. } => last.as_ref().map(RpcError::code),
            SignerError::Remote { error, .. } => Some(error.code()),
            SignerError::CertificateRejected { .. } => Some(RESULT_GENERIC_FAILURE),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, SignerError::Remote { error, .. } if error.is_timeout())
    }
}

impl fmt::Display for SignerError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SignerError::NoServerAvailable {
                operation,
                attempted,
                last,
            } => {
                write!(
                    f,
                    "No signing server available for {} after trying {} server(s)",
                    operation, attempted
                )?;
                match last {
                    Some(err) => write!(f, ", last error: {}", err),
                    None => Ok(()),
                }
            }
            SignerError::Remote {
                operation,
                endpoint,
                label,
                error,
            } => write!(f, "{} failed at {} for key '{}': {}", operation, endpoint, label, error),
            SignerError::CertificateRejected { endpoint, label } => {
                write!(f, "Signing server {} rejected the certificate for key '{}'", endpoint, label)
            }
            SignerError::InvalidCsr(e) => write!(f, "Invalid certificate request: {}", e),
            SignerError::InvalidCertificate(e) => write!(f, "Invalid certificate: {}", e),
            SignerError::OpenSslError(e) => write!(f, "OpenSsl Error: {}", e),
        }
    }
}

impl error::Error for SignerError {}

impl From<ErrorStack> for SignerError {
    fn from(e: ErrorStack) -> Self {
        SignerError::OpenSslError(e)
    }
}

//------------ Tests ---------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_codes_follow_the_failure_class() {
        assert_eq!(RESULT_TIMEOUT, RpcError::timeout("dial").code());
        assert_eq!(42, RpcError::failed(42, "nope").code());
        assert_eq!(RESULT_PROTOCOL_ERROR, RpcError::MissingPayload("data").code());
        assert_eq!(RESULT_CONFIG_ERROR, RpcError::config("port").code());
        assert!(RpcError::timeout("dial").is_timeout());
        assert!(!RpcError::generic("refused").is_timeout());
    }

    #[test]
    fn remote_error_carries_context() {
        let error = RpcError::failed(7, "key unknown");
        let err = SignerError::remote("sign", "site-a/10.0.0.1:8080", "signproxy-1", error);
        let msg = err.to_string();
        assert!(msg.contains("site-a/10.0.0.1:8080"));
        assert!(msg.contains("signproxy-1"));
        assert!(msg.contains("code 7"));
        assert_eq!(Some(7), err.code());
        assert!(!err.is_timeout());
    }

    #[test]
    fn exhaustion_reports_the_last_failure() {
        let err = SignerError::NoServerAvailable {
            operation: "verify",
            attempted: 3,
            last: Some(RpcError::timeout("10.0.0.3:8080")),
        };
        assert!(err.to_string().starts_with("No signing server available for verify after trying 3"));
        assert_eq!(Some(RESULT_TIMEOUT), err.code());
    }
}
