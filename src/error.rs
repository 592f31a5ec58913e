//! Error types for lifecycle operations
//!
//! Validation and grammar errors are raised before any network call.
//! Protocol and transport errors come back from peers and orderers and are
//! never downgraded to log lines.

use std::fmt;

use crate::collection::CollectionConfigError;

/// Main error type for lifecycle operations
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    PolicyParse(#[from] PolicyParseError),

    #[error(transparent)]
    Collection(#[from] CollectionConfigError),

    #[error("credentials not set, bind a wallet identity before calling the network")]
    MissingCredential,

    #[error("identity '{0}' not found in wallet")]
    IdentityNotFound(String),

    #[error("{kind} '{name}' not found")]
    NotFound { kind: EndpointKind, name: String },

    #[error("failed to install smart contract package: {0}")]
    Install(String),

    #[error("{message} (status {status})")]
    Protocol { status: i32, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("failed to decode response: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("{operation} failed: {source}")]
    Operation {
        operation: &'static str,
        #[source]
        source: Box<LifecycleError>,
    },
}

/// Which kind of registered endpoint a lookup was for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointKind {
    Peer,
    Orderer,
}

impl fmt::Display for EndpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Peer => write!(f, "peer"),
            Self::Orderer => write!(f, "orderer"),
        }
    }
}

impl LifecycleError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Wrap this error as the cause of a failed named operation.
    pub fn during(self, operation: &'static str) -> Self {
        Self::Operation {
            operation,
            source: Box::new(self),
        }
    }

    /// True for errors detected locally, before touching the network.
    pub fn is_validation(&self) -> bool {
        match self {
            Self::Validation(_)
            | Self::PolicyParse(_)
            | Self::Collection(_)
            | Self::MissingCredential
            | Self::NotFound { .. } => true,
            Self::Operation { source, .. } => source.is_validation(),
            _ => false,
        }
    }

    /// True for connection failures and timeouts.
    pub fn is_transport(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout(_) => true,
            Self::Operation { source, .. } => source.is_transport(),
            _ => false,
        }
    }

    /// The innermost error, skipping `Operation` wrappers.
    pub fn root_cause(&self) -> &LifecycleError {
        match self {
            Self::Operation { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

/// Position-aware error for malformed policy expressions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyParseError {
    /// Byte offset of the offending token in the expression
    pub position: usize,
    /// Text of the offending token, `None` at end of input
    pub found: Option<String>,
    /// Tokens that would have been accepted at this position
    pub expected: Vec<&'static str>,
}

impl PolicyParseError {
    pub(crate) fn new(
        position: usize,
        found: Option<String>,
        expected: impl Into<Vec<&'static str>>,
    ) -> Self {
        Self {
            position,
            found,
            expected: expected.into(),
        }
    }
}

impl fmt::Display for PolicyParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.found {
            Some(token) => write!(f, "unexpected token '{}' at position {}", token, self.position)?,
            None => write!(f, "unexpected end of policy at position {}", self.position)?,
        }
        if !self.expected.is_empty() {
            write!(f, ", expected one of: {}", self.expected.join(", "))?;
        }
        Ok(())
    }
}

impl std::error::Error for PolicyParseError {}

#[cfg(feature = "grpc")]
impl From<tonic::Status> for LifecycleError {
    fn from(status: tonic::Status) -> Self {
        match status.code() {
            tonic::Code::DeadlineExceeded => Self::Timeout(status.message().to_string()),
            _ => Self::Transport(format!("{}: {}", status.code(), status.message())),
        }
    }
}

#[cfg(feature = "grpc")]
impl From<tonic::transport::Error> for LifecycleError {
    fn from(err: tonic::transport::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

/// Result type alias for lifecycle operations
pub type Result<T> = std::result::Result<T, LifecycleError>;
