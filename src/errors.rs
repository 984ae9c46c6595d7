//! Topology Controller Error Hierarchy
//!
//! Defines the error types of the clusterwide topology controller, grouped by
//! the layer that produced them. Operator-facing errors (`Validation`,
//! `Replication`, `Routing`) display the exact text shown to API callers.

use std::path::PathBuf;
use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A mutation was rejected by topology validation. No state was changed.
    #[error("{0}")]
    Validation(String),

    /// Two-phase config replication failures
    #[error(transparent)]
    Replication(#[from] ReplicationError),

    /// Request carried no valid credential while auth is enabled
    #[error("Unauthorized")]
    Unauthorized,

    /// RPC routing failures reported as data, not transport errors
    #[error(transparent)]
    Routing(#[from] RoutingError),

    /// Membership probe failures
    #[error(transparent)]
    Membership(#[from] MembershipError),

    /// Infrastructure-level failures (network, storage, serialization)
    #[error(transparent)]
    System(#[from] SystemError),

    /// Node-local settings failures
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl Error {
    /// Short error class used by the HTTP surface
    pub fn class_name(&self) -> &'static str {
        match self {
            Error::Validation(_) => "ValidationError",
            Error::Replication(_) => "ReplicationError",
            Error::Unauthorized => "Unauthorized",
            Error::Routing(_) => "RoutingError",
            Error::Membership(_) => "ProbeError",
            Error::System(SystemError::Serialization(_)) => "DecodeError",
            Error::System(_) => "SystemError",
            Error::Config(_) => "ConfigError",
        }
    }

    /// Text of the innermost cause, without the layer prefixes that
    /// [`SystemError`] adds. This is what a node reports to the coordinator
    /// of a clusterwide change, so the caller sees the failing node's own
    /// message.
    pub fn root_message(&self) -> String {
        match self {
            Error::System(SystemError::Network(e)) => e.to_string(),
            Error::System(SystemError::Storage(e)) => e.to_string(),
            Error::System(SystemError::Serialization(e)) => e.to_string(),
            Error::System(SystemError::Signal(message)) => message.clone(),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReplicationError {
    /// Another clusterwide mutation is already in flight on this node
    #[error("Clusterwide config is already being patched")]
    AlreadyPatching,

    /// The recipient already holds a staged document
    #[error("Two-phase commit is locked")]
    TwoPhaseLocked,

    /// Incoming document is not newer than the active one
    #[error("Config version {incoming} is not newer than active version {active}")]
    StaleVersion { incoming: u64, active: u64 },

    /// Commit/abort for a version this node never staged
    #[error("No config staged for version {version}")]
    NotStaged { version: u64 },

    /// Mutation attempted before the cluster was bootstrapped
    #[error("Not bootstrapped yet")]
    NotBootstrapped,

    /// Raw error text of the node that failed, coordinator included
    #[error("{message}")]
    Peer { uri: String, message: String },
}

/// Routing failures of the role RPC router.
///
/// Serializable so that a remote node can hand the failure back verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum RoutingError {
    #[error("No remotes with role \"{role}\" available")]
    NoRemotes { role: String },

    #[error("Role \"{role}\" has no method \"{method}\"")]
    MethodNotFound { role: String, method: String },

    #[error("Role \"{role}\" is not running")]
    RoleNotRunning { role: String },

    /// The remote method itself failed
    #[error("{message}")]
    Remote { message: String },
}

#[derive(Debug, thiserror::Error)]
pub enum MembershipError {
    #[error("Probe \"{uri}\" failed: {reason}")]
    ProbeFailed { uri: String, reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    /// Peer communication timeout
    #[error("Request to {uri} timed out after {duration:?}")]
    Timeout { uri: String, duration: Duration },

    /// Peer unreachable or refused the connection
    #[error("Peer {uri} unreachable: {reason}")]
    Unreachable { uri: String, reason: String },

    /// HTTP client failures
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// HTTP server could not be started
    #[error("Failed to bind server: {0}")]
    ServerBind(String),

    #[error("{0}")]
    TaskBackoffFailed(String),

    #[error("Retry timeout after {0:?}")]
    RetryTimeoutError(Duration),
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Disk I/O failures while persisting config documents
    #[error(transparent)]
    IoError(#[from] std::io::Error),

    #[error("Error occurred at path: {path}")]
    PathError {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Config storage backend failures, raw text
    #[error("{0}")]
    ConfigStorage(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SystemError {
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Storage operation failed: {0}")]
    Storage(#[from] StorageError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] SerializationError),

    /// Process signal handlers could not be installed or the stop signal
    /// had no receiver
    #[error("Signal handling failed: {0}")]
    Signal(String),
}

// Serialization is classified separately (config documents and peer envelopes)
#[derive(Debug, thiserror::Error)]
pub enum SerializationError {
    #[error("Bincode serialization failed: {0}")]
    Bincode(#[from] bincode::Error),

    #[error("{0}")]
    Json(#[from] serde_json::Error),
}

// ============== Conversion Implementations ============== //
impl From<NetworkError> for Error {
    fn from(e: NetworkError) -> Self {
        Error::System(SystemError::Network(e))
    }
}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Error::System(SystemError::Storage(e))
    }
}

impl From<SerializationError> for Error {
    fn from(e: SerializationError) -> Self {
        Error::System(SystemError::Serialization(e))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::System(SystemError::Serialization(SerializationError::Json(e)))
    }
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Error::System(SystemError::Serialization(SerializationError::Bincode(e)))
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::System(SystemError::Storage(StorageError::IoError(e)))
    }
}
