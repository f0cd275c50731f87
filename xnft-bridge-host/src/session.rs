//! Plugin session lifecycle
//!
//! A [`PluginSession`] owns everything hosted for one plugin: the mirrored
//! UI tree, the renderId buffer, the notification routes and the RPC
//! dispatcher. Its state machine is
//!
//! ```text
//! Unloaded --mount--> Loading --on_loaded--> Ready --unmount--> Destroyed
//!                        |                                          |
//!                        +-------------unmount----------------------+
//! Destroyed --mount--> Loading
//! ```
//!
//! Bridge traffic, RPC calls, render callback wiring and input events are
//! only accepted in `Ready`. Callers that need to wait for `Ready` use
//! [`PluginSession::when_ready`], which resolves on the loaded signal and
//! fails with [`StateError::Unmounted`] if the session is torn down first.
//!
//! Render callbacks run while the session is locked and must not call back
//! into the session.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{oneshot, Mutex};
use xnft_bridge_api::{
    codec, Blockchain, BridgeMessage, ConnectPayload, Element, NodeId, RpcRequest, RpcResponse,
};

use crate::audit::{self, AuditEventType};
use crate::config::{HostApi, PluginManifest, SessionConfig};
use crate::dispatch::RpcDispatcher;
use crate::error::{BridgeError, ProtocolError, SessionError, StateError};
use crate::gate::ApprovalGate;
use crate::mutation::Mutation;
use crate::notify::{ContextId, NotificationEmitter, NotificationSink};
use crate::reorder::{ReorderBuffer, Stall};
use crate::tree::{RenderFn, RenderRootFn, VirtualTree};

/// Lifecycle state of a [`PluginSession`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
    #[default]
    Unloaded,
    Loading,
    Ready,
    Destroyed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unloaded => f.write_str("unloaded"),
            Self::Loading => f.write_str("loading"),
            Self::Ready => f.write_str("ready"),
            Self::Destroyed => f.write_str("destroyed"),
        }
    }
}

/// Wallet keys and endpoints per chain
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Connections {
    pub wallets: BTreeMap<Blockchain, String>,
    pub urls: BTreeMap<Blockchain, Option<String>>,
}

impl Connections {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connected wallet
    pub fn with_wallet(mut self, chain: Blockchain, public_key: impl Into<String>) -> Self {
        self.wallets.insert(chain, public_key.into());
        self
    }

    pub fn with_url(mut self, chain: Blockchain, url: Option<String>) -> Self {
        self.urls.insert(chain, url);
        self
    }

    pub fn payload(&self) -> ConnectPayload {
        ConnectPayload::new(self.wallets.clone(), self.urls.clone())
    }
}

/// Outcome of feeding one bridge message into the session
#[derive(Debug, Default)]
pub struct DrainReport {
    /// renderIds applied by this call, in order
    pub applied: Vec<u64>,
    /// renderIds released by this call that failed to apply
    pub failed: Vec<(u64, BridgeError)>,
    /// Messages still waiting for a missing predecessor
    pub pending: usize,
}

impl DrainReport {
    /// Number of messages released from the buffer
    pub fn released(&self) -> usize {
        self.applied.len() + self.failed.len()
    }
}

struct SessionInner {
    state: SessionState,
    tree: VirtualTree,
    buffer: ReorderBuffer<BridgeMessage>,
    emitter: NotificationEmitter,
    connections: Connections,
    next_context: u64,
    waiters: Vec<oneshot::Sender<Result<(), StateError>>>,
}

impl SessionInner {
    fn ensure_ready(&self) -> Result<(), StateError> {
        match self.state {
            SessionState::Ready => Ok(()),
            state => Err(StateError::NotReady { state }),
        }
    }

    fn transition(
        &mut self,
        allowed: &[SessionState],
        to: SessionState,
    ) -> Result<SessionState, StateError> {
        let from = self.state;
        if !allowed.contains(&from) {
            return Err(StateError::InvalidTransition { from, to });
        }
        tracing::debug!(from = %from, to = %to, "Session transition");
        self.state = to;
        Ok(from)
    }

    fn allocate_context(&mut self) -> ContextId {
        let id = ContextId(self.next_context);
        self.next_context += 1;
        id
    }
}

/// Handle to one hosted plugin; clones share the same session
#[derive(Clone)]
pub struct PluginSession {
    manifest: Arc<PluginManifest>,
    host: HostApi,
    gate: Arc<ApprovalGate>,
    dispatcher: Arc<RpcDispatcher>,
    inner: Arc<Mutex<SessionInner>>,
}

impl PluginSession {
    /// Create an `Unloaded` session for `manifest`
    ///
    /// `connections` seeds the wallet keys and endpoints sent with the
    /// connect notification once the plugin has loaded.
    pub fn new(
        manifest: PluginManifest,
        host: HostApi,
        connections: Connections,
        config: SessionConfig,
    ) -> Self {
        let gate = Arc::new(ApprovalGate::new(config.interaction_window));
        let dispatcher = Arc::new(RpcDispatcher::new(
            manifest.identity.clone(),
            manifest.url.clone(),
            gate.clone(),
            host.clone(),
        ));
        let inner = SessionInner {
            state: SessionState::Unloaded,
            tree: VirtualTree::new(),
            buffer: ReorderBuffer::with_limits(
                config.max_pending_mutations,
                config.stall_warn_threshold,
            ),
            emitter: NotificationEmitter::new(),
            connections,
            next_context: 0,
            waiters: Vec::new(),
        };
        Self {
            manifest: Arc::new(manifest),
            host,
            gate,
            dispatcher,
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    /// The plugin this session hosts
    pub fn manifest(&self) -> &PluginManifest {
        &self.manifest
    }

    /// The interaction gate guarding signing requests
    pub fn gate(&self) -> &ApprovalGate {
        &self.gate
    }

    /// Current lifecycle state
    pub async fn state(&self) -> SessionState {
        self.inner.lock().await.state
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Start loading the plugin into a fresh root context
    ///
    /// Returns the root context's id. Mutation numbering restarts at 0.
    pub async fn mount(&self, sink: Arc<dyn NotificationSink>) -> Result<ContextId, StateError> {
        let mut inner = self.inner.lock().await;
        inner.transition(
            &[SessionState::Unloaded, SessionState::Destroyed],
            SessionState::Loading,
        )?;

        inner.tree.clear();
        inner.buffer.reset();
        self.gate.reset();
        let context = inner.allocate_context();
        inner.emitter.attach_root(context, sink);

        tracing::info!(plugin = %self.manifest.identity, context = %context, "Mounting plugin");
        self.host.record(audit::lifecycle(
            AuditEventType::SessionMounted,
            &self.manifest.identity,
            &self.manifest.url,
            Some(context.0),
        ));
        Ok(context)
    }

    /// The root context finished loading
    pub async fn on_loaded(&self) -> Result<(), StateError> {
        let mut inner = self.inner.lock().await;
        inner.transition(&[SessionState::Loading], SessionState::Ready)?;

        let payload = inner.connections.payload();
        inner.emitter.connect(payload);
        inner.emitter.mount();

        for waiter in inner.waiters.drain(..) {
            let _ = waiter.send(Ok(()));
        }
        tracing::info!(plugin = %self.manifest.identity, "Plugin ready");
        Ok(())
    }

    /// Wait until the session is ready
    pub async fn when_ready(&self) -> Result<(), StateError> {
        let waiter = {
            let mut inner = self.inner.lock().await;
            match inner.state {
                SessionState::Ready => return Ok(()),
                SessionState::Loading => {
                    let (tx, rx) = oneshot::channel();
                    inner.waiters.push(tx);
                    rx
                }
                state => return Err(StateError::NotReady { state }),
            }
        };
        waiter.await.unwrap_or(Err(StateError::Unmounted))
    }

    /// Tear down the plugin's contexts and mirrored tree
    ///
    /// Requests already handed to the approval or storage provider are not
    /// cancelled.
    pub async fn unmount(&self) -> Result<(), StateError> {
        let mut inner = self.inner.lock().await;
        inner.transition(
            &[SessionState::Loading, SessionState::Ready],
            SessionState::Destroyed,
        )?;

        inner.emitter.unmount();
        inner.emitter.detach();
        inner.tree.clear();
        inner.buffer.reset();
        self.gate.reset();
        for waiter in inner.waiters.drain(..) {
            let _ = waiter.send(Err(StateError::Unmounted));
        }

        tracing::info!(plugin = %self.manifest.identity, "Plugin unmounted");
        self.host.record(audit::lifecycle(
            AuditEventType::SessionUnmounted,
            &self.manifest.identity,
            &self.manifest.url,
            None,
        ));
        Ok(())
    }

    /// Make another rendering context the active one
    ///
    /// The new context receives a connect notification and from now on is
    /// the only one whose RPC calls are served. The previous context is not
    /// notified.
    pub async fn activate_context(
        &self,
        sink: Arc<dyn NotificationSink>,
    ) -> Result<ContextId, StateError> {
        let mut inner = self.inner.lock().await;
        inner.ensure_ready()?;

        let context = inner.allocate_context();
        inner.emitter.set_active(context, sink);
        let payload = inner.connections.payload();
        inner.emitter.connect(payload);

        tracing::debug!(plugin = %self.manifest.identity, context = %context, "Context activated");
        self.host.record(audit::lifecycle(
            AuditEventType::ContextActivated,
            &self.manifest.identity,
            &self.manifest.url,
            Some(context.0),
        ));
        Ok(context)
    }

    /// The context allowed to issue RPC calls
    pub async fn active_context(&self) -> Option<ContextId> {
        self.inner.lock().await.emitter.active_id()
    }

    // ========================================================================
    // Rendering
    // ========================================================================

    /// Register the callback that re-renders the root child list
    pub async fn on_render_root(&self, f: RenderRootFn) -> Result<(), StateError> {
        let mut inner = self.inner.lock().await;
        inner.ensure_ready()?;
        inner.tree.on_render_root(f);
        Ok(())
    }

    /// Register the callback that re-renders node `id`
    pub async fn on_render(&self, id: NodeId, f: RenderFn) -> Result<(), StateError> {
        let mut inner = self.inner.lock().await;
        inner.ensure_ready()?;
        inner.tree.on_render(id, f);
        Ok(())
    }

    /// Feed one bridge message and apply every message now in sequence
    ///
    /// `Err` means the message itself was refused (wrong state, duplicate or
    /// stale renderId, full buffer). Messages that were released but failed
    /// to apply are listed in the report; each still consumed its renderId.
    pub async fn handle_bridge(&self, message: BridgeMessage) -> Result<DrainReport, BridgeError> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        inner.ensure_ready()?;

        let render_id = message.render_id;
        inner.buffer.insert(render_id, message).inspect_err(|e| {
            tracing::warn!(render_id, error = %e, "Bridge message refused");
        })?;

        let mut report = DrainReport::default();
        while let Some((render_id, message)) = inner.buffer.pop_ready() {
            let method = message.method.clone();
            let result = Mutation::from_message(message)
                .map_err(BridgeError::from)
                .and_then(|mutation| inner.tree.apply(mutation));
            match result {
                Ok(()) => {
                    tracing::debug!(render_id, op = %method, "Applied bridge mutation");
                    report.applied.push(render_id);
                }
                Err(e) => {
                    tracing::warn!(render_id, op = %method, error = %e, "Bridge mutation failed");
                    report.failed.push((render_id, e));
                }
            }
        }
        report.pending = inner.buffer.pending_len();
        Ok(report)
    }

    /// Decode a MessagePack bridge frame and feed it to [`Self::handle_bridge`]
    ///
    /// A frame that does not decode carries no renderId, so it is refused
    /// without touching the buffer.
    pub async fn handle_bridge_frame(&self, frame: &[u8]) -> Result<DrainReport, BridgeError> {
        let message: BridgeMessage = codec::decode(frame)
            .map_err(ProtocolError::from)
            .inspect_err(|e| tracing::warn!(error = %e, "Undecodable bridge frame"))?;
        self.handle_bridge(message).await
    }

    /// Report a gap the renderId buffer is waiting on
    pub async fn stall(&self) -> Option<Stall> {
        self.inner.lock().await.buffer.stall()
    }

    /// Snapshot of the mirrored tree
    pub async fn root_elements(&self) -> Vec<Element> {
        self.inner.lock().await.tree.root_elements()
    }

    pub async fn with_tree<R>(&self, f: impl FnOnce(&VirtualTree) -> R) -> R {
        f(&self.inner.lock().await.tree)
    }

    // ========================================================================
    // RPC
    // ========================================================================

    /// Serve a capability call issued from `context`
    pub async fn handle_rpc(
        &self,
        context: ContextId,
        request: RpcRequest,
    ) -> Result<RpcResponse, SessionError> {
        {
            let inner = self.inner.lock().await;
            inner.ensure_ready()?;
            if inner.emitter.active_id() != Some(context) {
                tracing::warn!(context = %context, method = %request.method, "RPC from inactive context");
                return Err(StateError::InactiveContext(context).into());
            }
        }
        Ok(self.dispatcher.dispatch(request).await?)
    }

    /// [`Self::handle_rpc`] over MessagePack frames
    pub async fn handle_rpc_frame(
        &self,
        context: ContextId,
        frame: &[u8],
    ) -> Result<Vec<u8>, SessionError> {
        let request: RpcRequest = codec::decode(frame).map_err(ProtocolError::from)?;
        let response = self.handle_rpc(context, request).await?;
        Ok(codec::encode(&response).map_err(ProtocolError::from)?)
    }

    // ========================================================================
    // Notifications
    // ========================================================================

    /// Deliver a click; a delivered click opens the approval window
    pub async fn push_click(&self, view_id: NodeId) -> Result<bool, StateError> {
        let inner = self.inner.lock().await;
        inner.ensure_ready()?;
        let delivered = inner.emitter.click(view_id);
        if delivered {
            self.gate.record_interaction();
        }
        Ok(delivered)
    }

    /// Deliver a value change; a delivered change opens the approval window
    pub async fn push_change(&self, view_id: NodeId, value: Value) -> Result<bool, StateError> {
        let inner = self.inner.lock().await;
        inner.ensure_ready()?;
        let delivered = inner.emitter.change(view_id, value);
        if delivered {
            self.gate.record_interaction();
        }
        Ok(delivered)
    }

    /// Record a new RPC endpoint for `chain` and tell the active context
    pub async fn update_connection_url(&self, chain: Blockchain, url: impl Into<String>) {
        let url = url.into();
        let mut inner = self.inner.lock().await;
        inner.connections.urls.insert(chain, Some(url.clone()));
        inner.emitter.connection_url_updated(chain, url);
    }

    /// Record a new wallet key for `chain` and tell the active context
    pub async fn update_public_key(&self, chain: Blockchain, public_key: impl Into<String>) {
        let public_key = public_key.into();
        let mut inner = self.inner.lock().await;
        inner.connections.wallets.insert(chain, public_key.clone());
        inner.emitter.public_key_updated(chain, public_key);
    }

    pub async fn connections(&self) -> Connections {
        self.inner.lock().await.connections.clone()
    }
}

impl fmt::Debug for PluginSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginSession")
            .field("manifest", &self.manifest)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::RecordingApprovalProvider;
    use crate::notify::RecordingSink;
    use crate::storage::MemoryStorageProvider;

    fn session() -> PluginSession {
        let host = HostApi::builder()
            .approval(Arc::new(RecordingApprovalProvider::approving("sig")))
            .storage(Arc::new(MemoryStorageProvider::new()))
            .build()
            .unwrap();
        PluginSession::new(
            PluginManifest::new("plugin-a", "https://plugin.example"),
            host,
            Connections::new().with_wallet(Blockchain::Solana, "sol-pk"),
            SessionConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_lifecycle_transitions() {
        let session = session();
        assert_eq!(session.state().await, SessionState::Unloaded);
        assert!(matches!(
            session.on_loaded().await,
            Err(StateError::InvalidTransition {
                from: SessionState::Unloaded,
                to: SessionState::Ready
            })
        ));

        session.mount(Arc::new(RecordingSink::new())).await.unwrap();
        session.on_loaded().await.unwrap();
        assert_eq!(session.state().await, SessionState::Ready);

        session.unmount().await.unwrap();
        assert_eq!(session.state().await, SessionState::Destroyed);
        assert!(session.unmount().await.is_err());

        session.mount(Arc::new(RecordingSink::new())).await.unwrap();
        assert_eq!(session.state().await, SessionState::Loading);
    }

    #[tokio::test]
    async fn test_connect_precedes_mount() {
        let session = session();
        let sink = Arc::new(RecordingSink::new());
        session.mount(sink.clone()).await.unwrap();
        session.on_loaded().await.unwrap();

        assert_eq!(sink.names(), vec!["connect", "mount"]);
    }

    #[tokio::test]
    async fn test_bridge_requires_ready() {
        let session = session();
        session.mount(Arc::new(RecordingSink::new())).await.unwrap();

        let element = Element::new(1, xnft_bridge_api::NodeKind::Container);
        let err = session
            .handle_bridge(BridgeMessage::append_to_root(0, &element).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BridgeError::State(StateError::NotReady {
                state: SessionState::Loading
            })
        ));
    }

    #[tokio::test]
    async fn test_click_requires_ready() {
        let session = session();
        assert!(matches!(
            session.push_click(1).await,
            Err(StateError::NotReady { .. })
        ));
        assert!(session.gate().last_interaction().is_none());
    }
}
