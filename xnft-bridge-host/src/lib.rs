//! xnft-bridge-host: Host runtime for sandboxed xNFT plugins
//!
//! A [`PluginSession`] mediates between one untrusted plugin and the host:
//!
//! - bridge messages are reordered by renderId and applied to a
//!   [`VirtualTree`], which calls the host's render callbacks,
//! - capability calls go through the [`RpcDispatcher`]; signing requests are
//!   only forwarded to the host's [`ApprovalProvider`] shortly after a real
//!   click or change was delivered to the plugin,
//! - lifecycle, input and wallet events are posted back through a
//!   [`NotificationSink`].
//!
//! The transport, the signing UI and storage persistence are supplied by the
//! host through [`HostApi`].

pub mod approval;
pub mod audit;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod gate;
pub mod mutation;
pub mod notify;
pub mod reorder;
pub mod session;
pub mod storage;
pub mod tree;
pub mod window;

#[cfg(feature = "subscriber")]
pub mod tracing_support;

pub use approval::{
    ApprovalKind, ApprovalPayload, ApprovalProvider, ApprovalRequest, ChannelApprovalProvider,
    RecordingApprovalProvider,
};
pub use audit::{
    AuditError, AuditEvent, AuditEventType, AuditSink, JsonLinesAuditSink, MemoryAuditSink,
    NullAuditSink,
};
pub use config::{ConfigError, HostApi, HostApiBuilder, PluginManifest, SessionConfig};
pub use dispatch::RpcDispatcher;
pub use error::{
    ApprovalError, BridgeError, InvariantViolation, ProtocolError, SessionError, StateError,
};
pub use gate::{ApprovalGate, DEFAULT_INTERACTION_WINDOW};
pub use mutation::Mutation;
pub use notify::{ContextId, NotificationEmitter, NotificationSink, RecordingSink, TransportError};
pub use reorder::{ReorderBuffer, Stall};
pub use session::{Connections, DrainReport, PluginSession, SessionState};
pub use storage::{MemoryStorageProvider, StorageError, StorageProvider};
pub use tree::{Node, Parent, RenderFn, RenderRootFn, VirtualTree};
pub use window::{DenyWindowOpener, RecordingWindowOpener, WindowError, WindowOpener};
pub use xnft_bridge_api as api;
