//! Session configuration and host collaborators

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::approval::ApprovalProvider;
use crate::audit::{AuditEvent, AuditSink, NullAuditSink};
use crate::gate::DEFAULT_INTERACTION_WINDOW;
use crate::storage::StorageProvider;
use crate::window::{DenyWindowOpener, WindowOpener};

/// Default number of buffered mutations that triggers a stall warning
pub const DEFAULT_STALL_WARN_THRESHOLD: usize = 64;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing host collaborator: {0}")]
    Missing(&'static str),
}

/// Describes the hosted plugin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginManifest {
    /// Stable identity, used to scope storage
    pub identity: String,
    /// URL the plugin bundle is loaded from
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl PluginManifest {
    pub fn new(identity: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            url: url.into(),
            icon_url: None,
            title: None,
        }
    }

    pub fn with_icon_url(mut self, icon_url: impl Into<String>) -> Self {
        self.icon_url = Some(icon_url.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

/// Per-session tunables
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// How long a delivered click or change keeps signing available
    pub interaction_window: Duration,
    /// Cap on out-of-order mutations held at once; `None` is unbounded
    pub max_pending_mutations: Option<usize>,
    /// Buffered count at which a stall is logged; 0 disables the warning
    pub stall_warn_threshold: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            interaction_window: DEFAULT_INTERACTION_WINDOW,
            max_pending_mutations: None,
            stall_warn_threshold: DEFAULT_STALL_WARN_THRESHOLD,
        }
    }
}

impl SessionConfig {
    pub fn with_interaction_window(mut self, window: Duration) -> Self {
        self.interaction_window = window;
        self
    }

    pub fn with_max_pending_mutations(mut self, max: usize) -> Self {
        self.max_pending_mutations = Some(max);
        self
    }

    pub fn with_stall_warn_threshold(mut self, threshold: usize) -> Self {
        self.stall_warn_threshold = threshold;
        self
    }
}

/// Capabilities the host lends to its plugins
#[derive(Clone)]
pub struct HostApi {
    pub approval: Arc<dyn ApprovalProvider>,
    pub storage: Arc<dyn StorageProvider>,
    pub window: Arc<dyn WindowOpener>,
    pub audit: Arc<dyn AuditSink>,
}

impl HostApi {
    /// Start building; approval and storage are required
    pub fn builder() -> HostApiBuilder {
        HostApiBuilder::default()
    }

    /// Record an audit event; sink failures are logged, not propagated
    pub(crate) fn record(&self, event: AuditEvent) {
        if let Err(e) = self.audit.record(event) {
            tracing::warn!(error = %e, "Failed to record audit event");
        }
    }
}

impl fmt::Debug for HostApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostApi").finish_non_exhaustive()
    }
}

#[derive(Default)]
pub struct HostApiBuilder {
    approval: Option<Arc<dyn ApprovalProvider>>,
    storage: Option<Arc<dyn StorageProvider>>,
    window: Option<Arc<dyn WindowOpener>>,
    audit: Option<Arc<dyn AuditSink>>,
}

impl HostApiBuilder {
    pub fn approval(mut self, provider: Arc<dyn ApprovalProvider>) -> Self {
        self.approval = Some(provider);
        self
    }

    pub fn storage(mut self, provider: Arc<dyn StorageProvider>) -> Self {
        self.storage = Some(provider);
        self
    }

    pub fn window(mut self, opener: Arc<dyn WindowOpener>) -> Self {
        self.window = Some(opener);
        self
    }

    pub fn audit(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    /// Finish, defaulting the window opener to deny and the audit sink to discard
    pub fn build(self) -> Result<HostApi, ConfigError> {
        Ok(HostApi {
            approval: self.approval.ok_or(ConfigError::Missing("approval provider"))?,
            storage: self.storage.ok_or(ConfigError::Missing("storage provider"))?,
            window: self.window.unwrap_or_else(|| Arc::new(DenyWindowOpener)),
            audit: self.audit.unwrap_or_else(|| Arc::new(NullAuditSink)),
        })
    }
}
