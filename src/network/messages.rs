use serde::Deserialize;
use serde::Serialize;

use crate::RoutingError;

/// Reply envelope of every peer route: the handler's value or its error text
pub type WireReply<T> = std::result::Result<T, String>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRequest {
    pub version: u64,
    /// Encoded clusterwide document
    pub document: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionRequest {
    pub version: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    pub role: String,
    pub method: String,
    /// JSON encoded arguments
    pub args: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RpcResponse {
    /// JSON encoded result
    Ok(Vec<u8>),
    Failed(RoutingError),
}
