//! Outbound notifications
//!
//! Lifecycle and input events go to the root context the plugin was mounted
//! in. Wallet events go to whichever context is active. A context that
//! cannot be reached is logged and skipped; notifications never fail the
//! operation that produced them.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use xnft_bridge_api::{Blockchain, ConnectPayload, NodeId, Notification, PluginEvent};

/// Identifies one rendering context of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(pub u64);

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx-{}", self.0)
    }
}

/// Why a notification could not be delivered
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Rendering context is closed")]
    Closed,

    #[error("Delivery failed: {0}")]
    Failed(String),
}

/// Delivery endpoint for one rendering context
pub trait NotificationSink: Send + Sync {
    fn post(&self, event: &PluginEvent) -> Result<(), TransportError>;
}

impl NotificationSink for mpsc::UnboundedSender<PluginEvent> {
    fn post(&self, event: &PluginEvent) -> Result<(), TransportError> {
        self.send(event.clone()).map_err(|_| TransportError::Closed)
    }
}

/// Sink that keeps every event, for testing
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<PluginEvent>>,
    failure: Option<String>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose every delivery fails with `reason`
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            events: Mutex::default(),
            failure: Some(reason.into()),
        }
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|event| event.detail.clone())
            .collect()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|event| event.detail.name())
            .collect()
    }

    pub fn clear(&self) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl NotificationSink for RecordingSink {
    fn post(&self, event: &PluginEvent) -> Result<(), TransportError> {
        if let Some(reason) = &self.failure {
            return Err(TransportError::Failed(reason.clone()));
        }
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
        Ok(())
    }
}

#[derive(Clone)]
struct Attached {
    id: ContextId,
    sink: Arc<dyn NotificationSink>,
}

/// Formats and routes notifications to the session's contexts
#[derive(Default)]
pub struct NotificationEmitter {
    root: Option<Attached>,
    active: Option<Attached>,
}

impl NotificationEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the root context; it also becomes the active one
    pub fn attach_root(&mut self, id: ContextId, sink: Arc<dyn NotificationSink>) {
        let attached = Attached { id, sink };
        self.active = Some(attached.clone());
        self.root = Some(attached);
    }

    /// Redirect wallet events and RPC authority to another context
    ///
    /// The superseded context is not told.
    pub fn set_active(&mut self, id: ContextId, sink: Arc<dyn NotificationSink>) {
        self.active = Some(Attached { id, sink });
    }

    /// Drop every context; later notifications go nowhere
    pub fn detach(&mut self) {
        self.root = None;
        self.active = None;
    }

    pub fn root_id(&self) -> Option<ContextId> {
        self.root.as_ref().map(|attached| attached.id)
    }

    pub fn active_id(&self) -> Option<ContextId> {
        self.active.as_ref().map(|attached| attached.id)
    }

    /// Tell the root context the plugin was mounted
    pub fn mount(&self) -> bool {
        Self::push(self.root.as_ref(), Notification::Mount {})
    }

    pub fn unmount(&self) -> bool {
        Self::push(self.root.as_ref(), Notification::Unmount {})
    }

    /// Deliver a click on `view_id` to the root context
    pub fn click(&self, view_id: NodeId) -> bool {
        Self::push(self.root.as_ref(), Notification::Click { view_id })
    }

    pub fn change(&self, view_id: NodeId, value: Value) -> bool {
        Self::push(self.root.as_ref(), Notification::Change { view_id, value })
    }

    /// Send the wallet connection to the active context
    pub fn connect(&self, payload: ConnectPayload) -> bool {
        Self::push(self.active.as_ref(), Notification::Connect(payload))
    }

    pub fn connection_url_updated(&self, chain: Blockchain, url: String) -> bool {
        Self::push(
            self.active.as_ref(),
            Notification::ConnectionUrlUpdated { chain, url },
        )
    }

    pub fn public_key_updated(&self, chain: Blockchain, public_key: String) -> bool {
        Self::push(
            self.active.as_ref(),
            Notification::PublicKeyUpdated { chain, public_key },
        )
    }

    fn push(target: Option<&Attached>, notification: Notification) -> bool {
        let name = notification.name();
        let Some(target) = target else {
            tracing::debug!(notification = name, "No context attached, dropping notification");
            return false;
        };
        match target.sink.post(&PluginEvent::from(notification)) {
            Ok(()) => {
                tracing::trace!(notification = name, context = %target.id, "Notification posted");
                true
            }
            Err(e) => {
                tracing::warn!(
                    notification = name,
                    context = %target.id,
                    error = %e,
                    "Failed to post notification"
                );
                false
            }
        }
    }
}

impl fmt::Debug for NotificationEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationEmitter")
            .field("root", &self.root_id())
            .field("active", &self.active_id())
            .finish()
    }
}
