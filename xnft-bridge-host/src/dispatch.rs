//! Capability RPC dispatch
//!
//! Every recognised call produces an [`RpcResponse`]; storage, window and
//! approval failures become `[null, reason]`. Only protocol errors (unknown
//! method, wrong params) are returned as `Err`, and they end the handling of
//! that single request.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use xnft_bridge_api::{RpcMethod, RpcRequest, RpcResponse};

use crate::approval::{ApprovalKind, ApprovalPayload, ApprovalRequest};
use crate::audit;
use crate::config::HostApi;
use crate::error::{ApprovalError, ProtocolError};
use crate::gate::ApprovalGate;

/// Response body for calls that only acknowledge
const SUCCESS: &str = "success";

/// A decoded capability call
#[derive(Debug, Clone, PartialEq)]
enum RpcCall {
    StorageGet {
        key: String,
    },
    StoragePut {
        key: String,
        value: Value,
    },
    WindowOpen {
        url: String,
    },
    Sign {
        kind: ApprovalKind,
        payload: ApprovalPayload,
        public_key: String,
    },
    Simulate,
}

impl RpcCall {
    fn parse(method: RpcMethod, params: Vec<Value>) -> Result<Self, ProtocolError> {
        let mut params = Positional::new(method, params)?;
        let call = match method {
            RpcMethod::LocalStorageGet => Self::StorageGet { key: params.next()? },
            RpcMethod::LocalStoragePut => Self::StoragePut {
                key: params.next()?,
                value: params.next()?,
            },
            RpcMethod::WindowOpen => Self::WindowOpen { url: params.next()? },
            RpcMethod::SolanaSignAllTransactions => Self::Sign {
                kind: ApprovalKind::SolanaSignAllTransactions,
                payload: ApprovalPayload::Batch(params.next()?),
                public_key: params.next()?,
            },
            RpcMethod::SolanaSimulate => {
                let _transaction: String = params.next()?;
                let _public_key: String = params.next()?;
                Self::Simulate
            }
            single => Self::Sign {
                kind: signing_kind(single)?,
                payload: ApprovalPayload::Single(params.next()?),
                public_key: params.next()?,
            },
        };
        Ok(call)
    }
}

fn signing_kind(method: RpcMethod) -> Result<ApprovalKind, ProtocolError> {
    let kind = match method {
        RpcMethod::SolanaSignTransaction => ApprovalKind::SolanaSignTransaction,
        RpcMethod::SolanaSignAllTransactions => ApprovalKind::SolanaSignAllTransactions,
        RpcMethod::SolanaSignAndSendTransaction => ApprovalKind::SolanaSignAndSendTransaction,
        RpcMethod::SolanaSignMessage => ApprovalKind::SolanaSignMessage,
        RpcMethod::EthereumSignTransaction => ApprovalKind::EthereumSignTransaction,
        RpcMethod::EthereumSignAndSendTransaction => ApprovalKind::EthereumSignAndSendTransaction,
        RpcMethod::EthereumSignMessage => ApprovalKind::EthereumSignMessage,
        other => return Err(ProtocolError::UnknownMethod(other.to_string())),
    };
    Ok(kind)
}

fn arity(method: RpcMethod) -> usize {
    match method {
        RpcMethod::LocalStorageGet | RpcMethod::WindowOpen => 1,
        _ => 2,
    }
}

struct Positional {
    method: RpcMethod,
    values: std::vec::IntoIter<Value>,
    position: usize,
}

impl Positional {
    fn new(method: RpcMethod, values: Vec<Value>) -> Result<Self, ProtocolError> {
        let expected = arity(method);
        if values.len() != expected {
            return Err(ProtocolError::invalid_params(
                method.as_str(),
                format!("expected {} params, got {}", expected, values.len()),
            ));
        }
        Ok(Self {
            method,
            values: values.into_iter(),
            position: 0,
        })
    }

    fn next<T: DeserializeOwned>(&mut self) -> Result<T, ProtocolError> {
        let position = self.position;
        self.position += 1;
        let value = self.values.next().ok_or_else(|| {
            ProtocolError::invalid_params(self.method.as_str(), format!("missing param {}", position))
        })?;
        serde_json::from_value(value).map_err(|e| {
            ProtocolError::invalid_params(self.method.as_str(), format!("param {}: {}", position, e))
        })
    }
}

/// Routes capability calls for one plugin
#[derive(Debug)]
pub struct RpcDispatcher {
    identity: String,
    source_url: String,
    gate: Arc<ApprovalGate>,
    host: HostApi,
}

impl RpcDispatcher {
    /// Create a dispatcher serving the plugin `identity` loaded from `source_url`
    pub fn new(
        identity: impl Into<String>,
        source_url: impl Into<String>,
        gate: Arc<ApprovalGate>,
        host: HostApi,
    ) -> Self {
        Self {
            identity: identity.into(),
            source_url: source_url.into(),
            gate,
            host,
        }
    }

    pub fn gate(&self) -> &Arc<ApprovalGate> {
        &self.gate
    }

    /// Serve one capability call
    ///
    /// Capability failures and refused approvals come back as
    /// `[null, reason]` responses. `Err` is reserved for requests the host
    /// cannot interpret: an unknown method or malformed params.
    pub async fn dispatch(&self, request: RpcRequest) -> Result<RpcResponse, ProtocolError> {
        tracing::debug!(method = %request.method, params = request.params.len(), "Plugin RPC");

        let method: RpcMethod = match request.method.parse() {
            Ok(method) => method,
            Err(method) => {
                tracing::error!(method = %method, "Unknown plugin RPC method");
                return Err(ProtocolError::UnknownMethod(method));
            }
        };
        let call = RpcCall::parse(method, request.params).inspect_err(|e| {
            tracing::error!(method = %method, error = %e, "Malformed plugin RPC");
        })?;

        let response = match call {
            RpcCall::StorageGet { key } => self.storage_get(key).await,
            RpcCall::StoragePut { key, value } => self.storage_put(key, value).await,
            RpcCall::WindowOpen { url } => self.window_open(url),
            RpcCall::Sign {
                kind,
                payload,
                public_key,
            } => self.sign(kind, payload, public_key).await,
            RpcCall::Simulate => RpcResponse::success(SUCCESS),
        };
        Ok(response)
    }

    async fn storage_get(&self, key: String) -> RpcResponse {
        self.host.record(audit::storage_read(&self.identity, &key));
        match self.host.storage.get(&self.identity, &key).await {
            Ok(value) => RpcResponse::success(value),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Storage read failed");
                RpcResponse::failure(e.to_string())
            }
        }
    }

    async fn storage_put(&self, key: String, value: Value) -> RpcResponse {
        self.host.record(audit::storage_written(&self.identity, &key));
        match self.host.storage.put(&self.identity, &key, value).await {
            Ok(()) => RpcResponse::success(Value::Null),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Storage write failed");
                RpcResponse::failure(e.to_string())
            }
        }
    }

    fn window_open(&self, url: String) -> RpcResponse {
        match self.host.window.open(&url) {
            Ok(()) => {
                self.host.record(audit::window_opened(&self.identity, &url));
                RpcResponse::success(SUCCESS)
            }
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "Window open refused");
                RpcResponse::failure(e.to_string())
            }
        }
    }

    async fn sign(
        &self,
        kind: ApprovalKind,
        payload: ApprovalPayload,
        public_key: String,
    ) -> RpcResponse {
        match self.request_approval(kind, payload, &public_key).await {
            Ok(signature) => {
                self.host
                    .record(audit::approval_granted(&self.identity, kind, &public_key));
                RpcResponse::success(signature)
            }
            Err(e) => {
                let reason = e.to_string();
                self.host.record(audit::approval_denied(
                    &self.identity,
                    kind,
                    &public_key,
                    &reason,
                ));
                RpcResponse::failure(reason)
            }
        }
    }

    async fn request_approval(
        &self,
        kind: ApprovalKind,
        payload: ApprovalPayload,
        public_key: &str,
    ) -> Result<String, ApprovalError> {
        if let Err(e) = self.gate.check() {
            tracing::warn!(kind = %kind, "Signing request without recent user interaction");
            return Err(e);
        }

        self.host
            .record(audit::approval_requested(&self.identity, kind, public_key));
        let (request, answer) =
            ApprovalRequest::new(kind, payload, &self.identity, &self.source_url, public_key);
        self.host.approval.request_approval(request);

        match answer.await {
            Ok(Ok(signature)) => Ok(signature),
            Ok(Err(reason)) => Err(ApprovalError::Rejected(reason)),
            Err(_) => Err(ApprovalError::Abandoned),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::RecordingApprovalProvider;
    use crate::audit::{AuditEventType, MemoryAuditSink};
    use crate::storage::{MemoryStorageProvider, ReadOnlyStorageProvider};
    use crate::window::RecordingWindowOpener;
    use serde_json::json;

    struct Fixture {
        dispatcher: RpcDispatcher,
        approval: Arc<RecordingApprovalProvider>,
        window: Arc<RecordingWindowOpener>,
        audit: Arc<MemoryAuditSink>,
    }

    fn fixture(approval: RecordingApprovalProvider) -> Fixture {
        let approval = Arc::new(approval);
        let window = Arc::new(RecordingWindowOpener::new());
        let audit = Arc::new(MemoryAuditSink::new());
        let host = HostApi::builder()
            .approval(approval.clone())
            .storage(Arc::new(MemoryStorageProvider::new()))
            .window(window.clone())
            .audit(audit.clone())
            .build()
            .unwrap();
        Fixture {
            dispatcher: RpcDispatcher::new(
                "plugin-a",
                "https://plugin.example",
                Arc::new(ApprovalGate::default()),
                host,
            ),
            approval,
            window,
            audit,
        }
    }

    fn request(method: RpcMethod, params: Vec<Value>) -> RpcRequest {
        RpcRequest::new(method, params)
    }

    #[tokio::test]
    async fn test_storage_round_trip_and_missing_key() {
        let f = fixture(RecordingApprovalProvider::approving("sig"));
        let put = request(RpcMethod::LocalStoragePut, vec![json!("k"), json!({ "n": 1 })]);
        assert_eq!(
            f.dispatcher.dispatch(put).await.unwrap(),
            RpcResponse::success(Value::Null)
        );

        let get = request(RpcMethod::LocalStorageGet, vec![json!("k")]);
        assert_eq!(
            f.dispatcher.dispatch(get).await.unwrap(),
            RpcResponse::success(json!({ "n": 1 }))
        );

        let missing = request(RpcMethod::LocalStorageGet, vec![json!("nope")]);
        assert_eq!(
            f.dispatcher.dispatch(missing).await.unwrap(),
            RpcResponse::success(Value::Null)
        );
        assert_eq!(f.audit.find_by_type(AuditEventType::StorageWritten).len(), 1);
    }

    #[tokio::test]
    async fn test_storage_failure_is_data() {
        let host = HostApi::builder()
            .approval(Arc::new(RecordingApprovalProvider::approving("sig")))
            .storage(Arc::new(ReadOnlyStorageProvider::new(MemoryStorageProvider::new())))
            .build()
            .unwrap();
        let dispatcher =
            RpcDispatcher::new("p", "https://p", Arc::new(ApprovalGate::default()), host);

        let put = request(RpcMethod::LocalStoragePut, vec![json!("k"), json!(1)]);
        assert_eq!(
            dispatcher.dispatch(put).await.unwrap(),
            RpcResponse::failure("Storage is read-only")
        );
    }

    #[tokio::test]
    async fn test_window_open() {
        let f = fixture(RecordingApprovalProvider::approving("sig"));
        let open = request(RpcMethod::WindowOpen, vec![json!("https://docs.example")]);

        assert_eq!(
            f.dispatcher.dispatch(open).await.unwrap(),
            RpcResponse::success("success")
        );
        assert_eq!(f.window.urls(), vec!["https://docs.example"]);
    }

    #[tokio::test]
    async fn test_window_open_refused_is_data() {
        let audit = Arc::new(MemoryAuditSink::new());
        let host = HostApi::builder()
            .approval(Arc::new(RecordingApprovalProvider::approving("sig")))
            .storage(Arc::new(MemoryStorageProvider::new()))
            .audit(audit.clone())
            .build()
            .unwrap();
        let dispatcher = RpcDispatcher::new(
            "plugin-a",
            "https://plugin.example",
            Arc::new(ApprovalGate::default()),
            host,
        );
        let open = request(RpcMethod::WindowOpen, vec![json!("https://docs.example")]);

        assert_eq!(
            dispatcher.dispatch(open).await.unwrap(),
            RpcResponse::failure("window open not supported")
        );
        assert!(audit.find_by_type(AuditEventType::WindowOpened).is_empty());
    }

    #[tokio::test]
    async fn test_unknown_method_is_err() {
        let f = fixture(RecordingApprovalProvider::approving("sig"));
        let req = RpcRequest {
            method: "solana-drain-wallet".into(),
            params: vec![],
        };
        assert!(matches!(
            f.dispatcher.dispatch(req).await,
            Err(ProtocolError::UnknownMethod(m)) if m == "solana-drain-wallet"
        ));
    }

    #[tokio::test]
    async fn test_wrong_params_is_err() {
        let f = fixture(RecordingApprovalProvider::approving("sig"));
        let req = request(RpcMethod::SolanaSignTransaction, vec![json!("tx")]);
        assert!(matches!(
            f.dispatcher.dispatch(req).await,
            Err(ProtocolError::InvalidParams { .. })
        ));
    }

    #[tokio::test]
    async fn test_sign_without_interaction_skips_provider() {
        let f = fixture(RecordingApprovalProvider::approving("sig"));
        let req = request(RpcMethod::SolanaSignTransaction, vec![json!("tx"), json!("pk")]);

        assert_eq!(
            f.dispatcher.dispatch(req).await.unwrap(),
            RpcResponse::failure("error")
        );
        assert_eq!(f.approval.count(), 0);
        assert_eq!(f.audit.find_by_type(AuditEventType::ApprovalDenied).len(), 1);
    }

    #[tokio::test]
    async fn test_sign_forwarded_after_interaction() {
        let f = fixture(RecordingApprovalProvider::approving("sig-1"));
        f.dispatcher.gate().record_interaction();

        let req = request(
            RpcMethod::SolanaSignAllTransactions,
            vec![json!(["tx1", "tx2"]), json!("pk")],
        );
        assert_eq!(
            f.dispatcher.dispatch(req).await.unwrap(),
            RpcResponse::success("sig-1")
        );

        let seen = f.approval.requests();
        assert_eq!(seen[0].kind, ApprovalKind::SolanaSignAllTransactions);
        assert_eq!(
            seen[0].payload,
            ApprovalPayload::Batch(vec!["tx1".into(), "tx2".into()])
        );
        assert_eq!(seen[0].identity, "plugin-a");
        assert_eq!(seen[0].source_url, "https://plugin.example");
    }

    #[tokio::test]
    async fn test_provider_rejection_relayed() {
        let f = fixture(RecordingApprovalProvider::rejecting("user declined"));
        f.dispatcher.gate().record_interaction();

        let req = request(RpcMethod::EthereumSignMessage, vec![json!("hello"), json!("0xabc")]);
        assert_eq!(
            f.dispatcher.dispatch(req).await.unwrap(),
            RpcResponse::failure("user declined")
        );
    }

    #[tokio::test]
    async fn test_abandoned_request() {
        let f = fixture(RecordingApprovalProvider::deferring());
        f.dispatcher.gate().record_interaction();

        let req = request(RpcMethod::SolanaSignMessage, vec![json!("m"), json!("pk")]);
        let approval = f.approval.clone();
        let pending = f.dispatcher.dispatch(req);
        let dropper = async move {
            tokio::task::yield_now().await;
            drop(approval.take_deferred());
        };

        let (response, ()) = tokio::join!(pending, dropper);
        assert_eq!(
            response.unwrap(),
            RpcResponse::failure("approval request abandoned")
        );
    }

    #[tokio::test]
    async fn test_simulate_is_ungated() {
        let f = fixture(RecordingApprovalProvider::approving("sig"));
        let req = request(RpcMethod::SolanaSimulate, vec![json!("tx"), json!("pk")]);

        assert_eq!(
            f.dispatcher.dispatch(req).await.unwrap(),
            RpcResponse::success("success")
        );
        assert_eq!(f.approval.count(), 0);
    }
}
