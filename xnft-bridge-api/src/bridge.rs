//! Reconciler bridge messages
//!
//! Every UI mutation the plugin's reconciler commits is sent as a
//! [`BridgeMessage`] carrying the operation name, positional params and the
//! `renderId` assigned when the mutation was produced. The transport may
//! reorder messages; the host restores the order from `renderId`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::element::{Element, NodeId, UpdateDiff};

/// Mutation operations of the commit phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BridgeOp {
    /// `[element]`
    AppendToRoot,
    /// `[parentId, element]`
    AppendChild,
    /// `[element, beforeId]`
    InsertInRootBefore,
    /// `[parentId, element, beforeId]`
    InsertBefore,
    /// `[id]`
    RemoveFromRoot,
    /// `[parentId, id]`
    RemoveChild,
    /// `[id, diff]`
    CommitUpdate,
    /// `[id, text]`
    CommitTextUpdate,
}

impl BridgeOp {
    pub const ALL: [BridgeOp; 8] = [
        Self::AppendToRoot,
        Self::AppendChild,
        Self::InsertInRootBefore,
        Self::InsertBefore,
        Self::RemoveFromRoot,
        Self::RemoveChild,
        Self::CommitUpdate,
        Self::CommitTextUpdate,
    ];

    /// Wire name of this operation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AppendToRoot => "append-to-root",
            Self::AppendChild => "append-child",
            Self::InsertInRootBefore => "insert-in-root-before",
            Self::InsertBefore => "insert-before",
            Self::RemoveFromRoot => "remove-from-root",
            Self::RemoveChild => "remove-child",
            Self::CommitUpdate => "commit-update",
            Self::CommitTextUpdate => "commit-text-update",
        }
    }

    /// Number of positional params the operation takes
    pub fn arity(&self) -> usize {
        match self {
            Self::AppendToRoot | Self::RemoveFromRoot => 1,
            Self::AppendChild
            | Self::InsertInRootBefore
            | Self::RemoveChild
            | Self::CommitUpdate
            | Self::CommitTextUpdate => 2,
            Self::InsertBefore => 3,
        }
    }
}

impl fmt::Display for BridgeOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BridgeOp {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| s.to_string())
    }
}

/// A single mutation as sent over the bridge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeMessage {
    /// Operation name, see [`BridgeOp`]
    pub method: String,

    #[serde(default)]
    pub params: Vec<Value>,

    #[serde(rename = "renderId")]
    pub render_id: u64,
}

impl BridgeMessage {
    /// Create a message for a known operation
    pub fn new(op: BridgeOp, params: Vec<Value>, render_id: u64) -> Self {
        Self {
            method: op.as_str().to_string(),
            params,
            render_id,
        }
    }

    // Constructors embedding an element or diff serialize it through serde,
    // so they share the wire field names of the derives.

    pub fn append_to_root(render_id: u64, element: &Element) -> Result<Self, serde_json::Error> {
        Ok(Self::new(
            BridgeOp::AppendToRoot,
            vec![serde_json::to_value(element)?],
            render_id,
        ))
    }

    pub fn append_child(
        render_id: u64,
        parent: NodeId,
        element: &Element,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(
            BridgeOp::AppendChild,
            vec![parent.into(), serde_json::to_value(element)?],
            render_id,
        ))
    }

    pub fn insert_in_root_before(
        render_id: u64,
        element: &Element,
        before: NodeId,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(
            BridgeOp::InsertInRootBefore,
            vec![serde_json::to_value(element)?, before.into()],
            render_id,
        ))
    }

    pub fn insert_before(
        render_id: u64,
        parent: NodeId,
        element: &Element,
        before: NodeId,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(
            BridgeOp::InsertBefore,
            vec![parent.into(), serde_json::to_value(element)?, before.into()],
            render_id,
        ))
    }

    pub fn remove_from_root(render_id: u64, id: NodeId) -> Self {
        Self::new(BridgeOp::RemoveFromRoot, vec![id.into()], render_id)
    }

    pub fn remove_child(render_id: u64, parent: NodeId, id: NodeId) -> Self {
        Self::new(
            BridgeOp::RemoveChild,
            vec![parent.into(), id.into()],
            render_id,
        )
    }

    pub fn commit_update(
        render_id: u64,
        id: NodeId,
        diff: &UpdateDiff,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(
            BridgeOp::CommitUpdate,
            vec![id.into(), serde_json::to_value(diff)?],
            render_id,
        ))
    }

    pub fn commit_text_update(render_id: u64, id: NodeId, text: impl Into<String>) -> Self {
        Self::new(
            BridgeOp::CommitTextUpdate,
            vec![id.into(), Value::String(text.into())],
            render_id,
        )
    }

    /// Parse the operation name
    pub fn op(&self) -> Result<BridgeOp, String> {
        self.method.parse()
    }
}
