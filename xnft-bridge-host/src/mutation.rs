//! Typed view of bridge messages
//!
//! Messages are parsed only when their turn comes in the drain loop, so a
//! malformed message still occupies its renderId and fails on its own.

use serde::de::DeserializeOwned;
use serde_json::Value;
use xnft_bridge_api::{BridgeMessage, BridgeOp, Element, NodeId, UpdateDiff};

use crate::error::ProtocolError;

/// One commit-phase mutation
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    AppendToRoot {
        element: Element,
    },
    AppendChild {
        parent: NodeId,
        element: Element,
    },
    InsertInRootBefore {
        element: Element,
        before: NodeId,
    },
    InsertBefore {
        parent: NodeId,
        element: Element,
        before: NodeId,
    },
    RemoveFromRoot {
        id: NodeId,
    },
    RemoveChild {
        parent: NodeId,
        id: NodeId,
    },
    CommitUpdate {
        id: NodeId,
        diff: UpdateDiff,
    },
    CommitTextUpdate {
        id: NodeId,
        text: String,
    },
}

impl Mutation {
    /// Parse a bridge message into a mutation
    pub fn from_message(message: BridgeMessage) -> Result<Self, ProtocolError> {
        let op: BridgeOp = message.op().map_err(ProtocolError::UnknownOp)?;
        let mut params = Params::new(op, message.params)?;

        let mutation = match op {
            BridgeOp::AppendToRoot => Self::AppendToRoot {
                element: params.next()?,
            },
            BridgeOp::AppendChild => Self::AppendChild {
                parent: params.next()?,
                element: params.next()?,
            },
            BridgeOp::InsertInRootBefore => Self::InsertInRootBefore {
                element: params.next()?,
                before: params.next()?,
            },
            BridgeOp::InsertBefore => Self::InsertBefore {
                parent: params.next()?,
                element: params.next()?,
                before: params.next()?,
            },
            BridgeOp::RemoveFromRoot => Self::RemoveFromRoot {
                id: params.next()?,
            },
            BridgeOp::RemoveChild => Self::RemoveChild {
                parent: params.next()?,
                id: params.next()?,
            },
            BridgeOp::CommitUpdate => Self::CommitUpdate {
                id: params.next()?,
                diff: params.next()?,
            },
            BridgeOp::CommitTextUpdate => Self::CommitTextUpdate {
                id: params.next()?,
                text: params.next()?,
            },
        };
        Ok(mutation)
    }

    pub fn op(&self) -> BridgeOp {
        match self {
            Self::AppendToRoot { .. } => BridgeOp::AppendToRoot,
            Self::AppendChild { .. } => BridgeOp::AppendChild,
            Self::InsertInRootBefore { .. } => BridgeOp::InsertInRootBefore,
            Self::InsertBefore { .. } => BridgeOp::InsertBefore,
            Self::RemoveFromRoot { .. } => BridgeOp::RemoveFromRoot,
            Self::RemoveChild { .. } => BridgeOp::RemoveChild,
            Self::CommitUpdate { .. } => BridgeOp::CommitUpdate,
            Self::CommitTextUpdate { .. } => BridgeOp::CommitTextUpdate,
        }
    }

}

/// Positional params consumed left to right
struct Params {
    op: BridgeOp,
    values: std::vec::IntoIter<Value>,
    position: usize,
}

impl Params {
    fn new(op: BridgeOp, values: Vec<Value>) -> Result<Self, ProtocolError> {
        if values.len() != op.arity() {
            return Err(ProtocolError::invalid_params(
                op.as_str(),
                format!("expected {} params, got {}", op.arity(), values.len()),
            ));
        }
        Ok(Self {
            op,
            values: values.into_iter(),
            position: 0,
        })
    }

    fn next<T: DeserializeOwned>(&mut self) -> Result<T, ProtocolError> {
        let position = self.position;
        self.position += 1;
        let value = self.values.next().ok_or_else(|| {
            ProtocolError::invalid_params(self.op.as_str(), format!("missing param {}", position))
        })?;
        serde_json::from_value(value).map_err(|e| {
            ProtocolError::invalid_params(self.op.as_str(), format!("param {}: {}", position, e))
        })
    }
}
