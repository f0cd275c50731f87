//! Approval requests handed to the host's signing UI
//!
//! Each gated RPC becomes exactly one [`ApprovalRequest`]. The request owns
//! the reply channel, so it can be resolved or rejected once at most.
//! Dropping it without answering is reported as
//! [`ApprovalError::Abandoned`](crate::error::ApprovalError::Abandoned).

use std::fmt;
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use xnft_bridge_api::Blockchain;

/// What the plugin asks the user to approve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalKind {
    SolanaSignTransaction,
    SolanaSignAllTransactions,
    SolanaSignAndSendTransaction,
    SolanaSignMessage,
    EthereumSignTransaction,
    EthereumSignAndSendTransaction,
    EthereumSignMessage,
}

impl ApprovalKind {
    pub fn chain(&self) -> Blockchain {
        match self {
            Self::SolanaSignTransaction
            | Self::SolanaSignAllTransactions
            | Self::SolanaSignAndSendTransaction
            | Self::SolanaSignMessage => Blockchain::Solana,
            Self::EthereumSignTransaction
            | Self::EthereumSignAndSendTransaction
            | Self::EthereumSignMessage => Blockchain::Ethereum,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SolanaSignTransaction => "solana_sign_transaction",
            Self::SolanaSignAllTransactions => "solana_sign_all_transactions",
            Self::SolanaSignAndSendTransaction => "solana_sign_and_send_transaction",
            Self::SolanaSignMessage => "solana_sign_message",
            Self::EthereumSignTransaction => "ethereum_sign_transaction",
            Self::EthereumSignAndSendTransaction => "ethereum_sign_and_send_transaction",
            Self::EthereumSignMessage => "ethereum_sign_message",
        }
    }
}

impl fmt::Display for ApprovalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Encoded transaction(s) or message to sign
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ApprovalPayload {
    Single(String),
    Batch(Vec<String>),
}

/// One in-flight sensitive request
pub struct ApprovalRequest {
    pub kind: ApprovalKind,
    pub payload: ApprovalPayload,
    /// Identity of the requesting plugin
    pub identity: String,
    /// URL the plugin was loaded from
    pub source_url: String,
    pub public_key: String,
    responder: oneshot::Sender<Result<String, String>>,
}

impl ApprovalRequest {
    /// Create a request and the receiver its answer arrives on
    pub fn new(
        kind: ApprovalKind,
        payload: ApprovalPayload,
        identity: impl Into<String>,
        source_url: impl Into<String>,
        public_key: impl Into<String>,
    ) -> (Self, oneshot::Receiver<Result<String, String>>) {
        let (responder, receiver) = oneshot::channel();
        let request = Self {
            kind,
            payload,
            identity: identity.into(),
            source_url: source_url.into(),
            public_key: public_key.into(),
            responder,
        };
        (request, receiver)
    }

    /// Approve with the resulting signature
    pub fn resolve(self, signature: impl Into<String>) {
        if self.responder.send(Ok(signature.into())).is_err() {
            tracing::debug!(kind = %self.kind, "Approval resolved after requester went away");
        }
    }

    /// Refuse with a reason relayed to the plugin
    pub fn reject(self, reason: impl Into<String>) {
        if self.responder.send(Err(reason.into())).is_err() {
            tracing::debug!(kind = %self.kind, "Approval rejected after requester went away");
        }
    }
}

impl fmt::Debug for ApprovalRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApprovalRequest")
            .field("kind", &self.kind)
            .field("payload", &self.payload)
            .field("identity", &self.identity)
            .field("source_url", &self.source_url)
            .field("public_key", &self.public_key)
            .finish()
    }
}

/// Host UI that presents approval requests to the user
///
/// Implementations take ownership of the request and answer it whenever the
/// user decides, on any thread.
///
/// # Example
///
/// ```rust
/// use xnft_bridge_host::approval::{ApprovalProvider, ApprovalRequest};
///
/// struct AutoReject;
///
/// impl ApprovalProvider for AutoReject {
///     fn request_approval(&self, request: ApprovalRequest) {
///         request.reject("signing disabled");
///     }
/// }
/// ```
pub trait ApprovalProvider: Send + Sync {
    fn request_approval(&self, request: ApprovalRequest);
}

/// How a [`RecordingApprovalProvider`] answers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalMode {
    Approve(String),
    Reject(String),
    /// Hold requests until [`RecordingApprovalProvider::take_deferred`]
    Defer,
}

/// A snapshot of a request the provider saw
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedApproval {
    pub kind: ApprovalKind,
    pub payload: ApprovalPayload,
    pub identity: String,
    pub source_url: String,
    pub public_key: String,
}

/// Provider that records every request, for testing
pub struct RecordingApprovalProvider {
    mode: ApprovalMode,
    seen: Mutex<Vec<RecordedApproval>>,
    deferred: Mutex<Vec<ApprovalRequest>>,
}

impl RecordingApprovalProvider {
    pub fn new(mode: ApprovalMode) -> Self {
        Self {
            mode,
            seen: Mutex::new(Vec::new()),
            deferred: Mutex::new(Vec::new()),
        }
    }

    pub fn approving(signature: impl Into<String>) -> Self {
        Self::new(ApprovalMode::Approve(signature.into()))
    }

    pub fn rejecting(reason: impl Into<String>) -> Self {
        Self::new(ApprovalMode::Reject(reason.into()))
    }

    pub fn deferring() -> Self {
        Self::new(ApprovalMode::Defer)
    }

    pub fn requests(&self) -> Vec<RecordedApproval> {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn count(&self) -> usize {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Take the requests held in [`ApprovalMode::Defer`]
    pub fn take_deferred(&self) -> Vec<ApprovalRequest> {
        std::mem::take(&mut *self.deferred.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl ApprovalProvider for RecordingApprovalProvider {
    fn request_approval(&self, request: ApprovalRequest) {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedApproval {
                kind: request.kind,
                payload: request.payload.clone(),
                identity: request.identity.clone(),
                source_url: request.source_url.clone(),
                public_key: request.public_key.clone(),
            });

        match &self.mode {
            ApprovalMode::Approve(signature) => request.resolve(signature.clone()),
            ApprovalMode::Reject(reason) => request.reject(reason.clone()),
            ApprovalMode::Defer => self
                .deferred
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(request),
        }
    }
}

impl fmt::Debug for RecordingApprovalProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordingApprovalProvider")
            .field("mode", &self.mode)
            .field("count", &self.count())
            .finish()
    }
}

/// Provider that forwards requests to an async consumer
///
/// Requests that cannot be queued are rejected on the spot.
#[derive(Debug, Clone)]
pub struct ChannelApprovalProvider {
    tx: mpsc::Sender<ApprovalRequest>,
}

impl ChannelApprovalProvider {
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<ApprovalRequest>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self { tx }, rx)
    }
}

impl ApprovalProvider for ChannelApprovalProvider {
    fn request_approval(&self, request: ApprovalRequest) {
        match self.tx.try_send(request) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(request)) => {
                tracing::warn!(kind = %request.kind, "Approval queue full, rejecting request");
                request.reject("approval queue full");
            }
            Err(mpsc::error::TrySendError::Closed(request)) => {
                tracing::warn!(kind = %request.kind, "Approval consumer gone, rejecting request");
                request.reject("approval unavailable");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(kind: ApprovalKind) -> (ApprovalRequest, oneshot::Receiver<Result<String, String>>) {
        ApprovalRequest::new(
            kind,
            ApprovalPayload::Single("tx".into()),
            "plugin-1",
            "https://plugin.example",
            "pk",
        )
    }

    #[test]
    fn test_kind_chain() {
        assert_eq!(ApprovalKind::SolanaSignMessage.chain(), Blockchain::Solana);
        assert_eq!(
            ApprovalKind::EthereumSignAndSendTransaction.chain(),
            Blockchain::Ethereum
        );
    }

    #[tokio::test]
    async fn test_resolve_once() {
        let (request, rx) = request(ApprovalKind::SolanaSignTransaction);
        request.resolve("sig");
        assert_eq!(rx.await.unwrap(), Ok("sig".to_string()));
    }

    #[tokio::test]
    async fn test_drop_is_abandoned() {
        let (request, rx) = request(ApprovalKind::SolanaSignTransaction);
        drop(request);
        assert!(rx.await.is_err());
    }

    #[tokio::test]
    async fn test_recording_provider_defers() {
        let provider = RecordingApprovalProvider::deferring();
        let (request, rx) = request(ApprovalKind::EthereumSignMessage);
        provider.request_approval(request);

        assert_eq!(provider.count(), 1);
        assert_eq!(provider.requests()[0].public_key, "pk");

        let mut deferred = provider.take_deferred();
        assert_eq!(deferred.len(), 1);
        deferred.remove(0).reject("no");
        assert_eq!(rx.await.unwrap(), Err("no".to_string()));
    }

    #[tokio::test]
    async fn test_channel_provider_rejects_when_closed() {
        let (provider, consumer) = ChannelApprovalProvider::new(1);
        drop(consumer);

        let (request, rx) = request(ApprovalKind::SolanaSignTransaction);
        provider.request_approval(request);
        assert_eq!(rx.await.unwrap(), Err("approval unavailable".to_string()));
    }

    #[tokio::test]
    async fn test_channel_provider_forwards() {
        let (provider, mut consumer) = ChannelApprovalProvider::new(4);
        let (request, rx) = request(ApprovalKind::SolanaSignAllTransactions);
        provider.request_approval(request);

        let received = consumer.recv().await.unwrap();
        assert_eq!(received.kind, ApprovalKind::SolanaSignAllTransactions);
        received.resolve("sig");
        assert_eq!(rx.await.unwrap(), Ok("sig".to_string()));
    }
}
