//! Message-channel protocol types
//!
//! Method names match the ones the mobile application layer already calls.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Methods exposed on the method channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Method {
    #[serde(rename = "isGoProConnected")]
    IsGoProConnected,
    #[serde(rename = "discoverGoProIP")]
    DiscoverGoProIp,
    #[serde(rename = "bindToGoProNetwork")]
    BindToGoProNetwork,
}

impl Method {
    pub const ALL: [Method; 3] = [
        Method::IsGoProConnected,
        Method::DiscoverGoProIp,
        Method::BindToGoProNetwork,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::IsGoProConnected => "isGoProConnected",
            Method::DiscoverGoProIp => "discoverGoProIP",
            Method::BindToGoProNetwork => "bindToGoProNetwork",
        }
    }
}

impl std::str::FromStr for Method {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Method::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| format!("Unknown method: {}", s))
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Response to a method call
///
/// Failures never surface here; they are reported as `false` or `null` results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MethodResponse {
    Success { result: Value },
    NotImplemented { method: String },
}

impl MethodResponse {
    pub fn success(result: impl Into<Value>) -> Self {
        MethodResponse::Success {
            result: result.into(),
        }
    }

    pub fn not_implemented(method: impl Into<String>) -> Self {
        MethodResponse::NotImplemented {
            method: method.into(),
        }
    }

    /// Result value, `None` for unimplemented methods
    pub fn result(&self) -> Option<&Value> {
        match self {
            MethodResponse::Success { result } => Some(result),
            MethodResponse::NotImplemented { .. } => None,
        }
    }
}

/// A method call sent over the WebSocket method channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodRequest {
    /// Caller-chosen id echoed in the reply
    pub id: u64,
    pub method: String,
}

/// Reply to a [`MethodRequest`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodReply {
    pub id: u64,
    #[serde(flatten)]
    pub response: MethodResponse,
}
