//! Capability RPC channel
//!
//! Requests are `{ method, params }` with positional params. Responses are
//! tuples: `[result]` on success, `[null, reason]` on failure. Failures are
//! data so that plugin code can handle them.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Capability methods exposed to plugins
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RpcMethod {
    LocalStorageGet,
    LocalStoragePut,
    WindowOpen,
    SolanaSignTransaction,
    SolanaSignAllTransactions,
    SolanaSignAndSendTransaction,
    SolanaSignMessage,
    SolanaSimulate,
    EthereumSignTransaction,
    EthereumSignAndSendTransaction,
    EthereumSignMessage,
}

impl RpcMethod {
    pub const ALL: [RpcMethod; 11] = [
        Self::LocalStorageGet,
        Self::LocalStoragePut,
        Self::WindowOpen,
        Self::SolanaSignTransaction,
        Self::SolanaSignAllTransactions,
        Self::SolanaSignAndSendTransaction,
        Self::SolanaSignMessage,
        Self::SolanaSimulate,
        Self::EthereumSignTransaction,
        Self::EthereumSignAndSendTransaction,
        Self::EthereumSignMessage,
    ];

    /// Wire name of this method
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LocalStorageGet => "plugin-local-storage-get",
            Self::LocalStoragePut => "plugin-local-storage-put",
            Self::WindowOpen => "plugin-window-open",
            Self::SolanaSignTransaction => "solana-sign-tx",
            Self::SolanaSignAllTransactions => "solana-sign-all-txs",
            Self::SolanaSignAndSendTransaction => "solana-sign-and-send-tx",
            Self::SolanaSignMessage => "solana-sign-message",
            Self::SolanaSimulate => "solana-simulate",
            Self::EthereumSignTransaction => "ethereum-sign-tx",
            Self::EthereumSignAndSendTransaction => "ethereum-sign-and-send-tx",
            Self::EthereumSignMessage => "ethereum-sign-message",
        }
    }
}

impl fmt::Display for RpcMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RpcMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|method| method.as_str() == s)
            .ok_or_else(|| s.to_string())
    }
}

/// Inbound capability call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    pub method: String,

    #[serde(default)]
    pub params: Vec<Value>,
}

impl RpcRequest {
    pub fn new(method: RpcMethod, params: Vec<Value>) -> Self {
        Self {
            method: method.as_str().to_string(),
            params,
        }
    }
}

/// Outcome of a capability call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Value>", into = "Vec<Value>")]
pub enum RpcResponse {
    /// Encoded as `[result]`
    Success(Value),
    /// Encoded as `[null, reason]`
    Failure(String),
}

impl RpcResponse {
    pub fn success(value: impl Into<Value>) -> Self {
        Self::Success(value.into())
    }

    pub fn failure(reason: impl Into<String>) -> Self {
        Self::Failure(reason.into())
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// The result, if successful
    pub fn result(&self) -> Option<&Value> {
        match self {
            Self::Success(value) => Some(value),
            Self::Failure(_) => None,
        }
    }

    /// The failure reason, if any
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Success(_) => None,
            Self::Failure(reason) => Some(reason),
        }
    }
}

impl From<RpcResponse> for Vec<Value> {
    fn from(response: RpcResponse) -> Self {
        match response {
            RpcResponse::Success(value) => vec![value],
            RpcResponse::Failure(reason) => vec![Value::Null, Value::String(reason)],
        }
    }
}

impl TryFrom<Vec<Value>> for RpcResponse {
    type Error = String;

    fn try_from(mut tuple: Vec<Value>) -> Result<Self, Self::Error> {
        match tuple.len() {
            1 => Ok(Self::Success(tuple.remove(0))),
            2 => match (&tuple[0], &tuple[1]) {
                (Value::Null, Value::String(reason)) => Ok(Self::Failure(reason.clone())),
                _ => Err("malformed rpc failure tuple".to_string()),
            },
            n => Err(format!("rpc response tuple of length {}", n)),
        }
    }
}
