//! Error taxonomy for the bridge host
//!
//! - [`ProtocolError`]: the plugin sent something the host does not speak.
//! - [`StateError`]: the request is well formed but arrived at the wrong
//!   time, or names a node/callback the host does not have.
//! - [`InvariantViolation`]: applying the mutation would break the tree.
//! - [`ApprovalError`]: a sensitive request was not approved. Never raised
//!   across the RPC boundary; the dispatcher turns it into `[null, reason]`.

use thiserror::Error;
use xnft_bridge_api::{CodecError, NodeId, UnknownKind};

use crate::notify::ContextId;
use crate::session::SessionState;

/// Malformed or unsupported traffic
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Unknown RPC method: {0}")]
    UnknownMethod(String),

    #[error("Unknown bridge operation: {0}")]
    UnknownOp(String),

    #[error("Invalid params for {method}: {reason}")]
    InvalidParams { method: String, reason: String },

    #[error("Duplicate renderId {0}")]
    DuplicateRenderId(u64),

    #[error("renderId {render_id} was already applied (next expected {expected})")]
    StaleRenderId { render_id: u64, expected: u64 },

    #[error("Reorder buffer full ({capacity} pending mutations)")]
    BufferFull { capacity: usize },

    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl ProtocolError {
    pub fn invalid_params(method: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidParams {
            method: method.into(),
            reason: reason.to_string(),
        }
    }
}

/// Operation attempted in the wrong lifecycle state or against a missing target
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("Session is {state}, expected ready")]
    NotReady { state: SessionState },

    #[error("Invalid session transition: {from} -> {to}")]
    InvalidTransition {
        from: SessionState,
        to: SessionState,
    },

    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("Render callback not found for node {0}")]
    RenderCallbackNotFound(NodeId),

    #[error("Rendering context {0} is not active")]
    InactiveContext(ContextId),

    #[error("Session was unmounted")]
    Unmounted,
}

/// Producer/consumer mismatch detected while applying a mutation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    #[error("invariant violation: {0}")]
    UnknownKind(#[from] UnknownKind),

    #[error("invariant violation: node {0} is already attached")]
    DuplicateNode(NodeId),

    #[error("invariant violation: attaching node {id} under {parent} creates a cycle")]
    Cycle { id: NodeId, parent: NodeId },
}

/// Why a sensitive request did not reach a signature
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApprovalError {
    /// No click or change was delivered within the interaction window
    #[error("error")]
    InteractionRequired,

    #[error("{0}")]
    Rejected(String),

    #[error("approval request abandoned")]
    Abandoned,
}

/// Failure of a single bridge message
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Invariant(#[from] InvariantViolation),
}

/// Failure of a session entry point other than the bridge
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    State(#[from] StateError),
}
