//! Serialized UI nodes as they travel over the reconciler bridge

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Node identity assigned by the plugin side
pub type NodeId = u64;

/// Opaque visual attributes
pub type Style = Map<String, Value>;

/// Kind-specific key/value bag
pub type Props = Map<String, Value>;

/// The closed set of node kinds the host knows how to render
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeKind {
    Container,
    Text,
    TextField,
    NavAnimation,
    Path,
    Button,
    Image,
}

impl NodeKind {
    /// All kinds, in declaration order
    pub const ALL: [NodeKind; 7] = [
        Self::Container,
        Self::Text,
        Self::TextField,
        Self::NavAnimation,
        Self::Path,
        Self::Button,
        Self::Image,
    ];

    /// Wire name of this kind
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Container => "container",
            Self::Text => "text",
            Self::TextField => "textField",
            Self::NavAnimation => "navAnimation",
            Self::Path => "path",
            Self::Button => "button",
            Self::Image => "image",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A `kind` string outside the closed set
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown node kind: {0}")]
pub struct UnknownKind(pub String);

impl FromStr for NodeKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownKind(s.to_string()))
    }
}

/// A node and its subtree, serialized by the plugin
///
/// `kind` stays a plain string on the wire so that a host receiving a kind
/// it does not know can reject that single mutation instead of failing to
/// decode the whole message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub id: NodeId,

    pub kind: String,

    #[serde(default)]
    pub props: Props,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<Style>,

    /// Literal text content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    #[serde(default)]
    pub children: Vec<Element>,
}

impl Element {
    /// Create a childless element of the given kind
    pub fn new(id: NodeId, kind: NodeKind) -> Self {
        Self {
            id,
            kind: kind.as_str().to_string(),
            props: Props::new(),
            style: None,
            text: None,
            children: Vec::new(),
        }
    }

    /// Parse the kind tag
    pub fn node_kind(&self) -> Result<NodeKind, UnknownKind> {
        self.kind.parse()
    }

    /// Set a prop
    pub fn prop(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.props.insert(key.into(), value.into());
        self
    }

    /// Set the style
    pub fn style(mut self, style: Style) -> Self {
        self.style = Some(style);
        self
    }

    /// Set the text content
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Append a child
    pub fn child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }
}

/// Partial update produced by the plugin's reconciler
///
/// Which fields the host honours depends on the target node's kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateDiff {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<Style>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,

    #[serde(
        rename = "routeName",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub route_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,
}

impl UpdateDiff {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_style(mut self, style: Style) -> Self {
        self.style = Some(style);
        self
    }

    pub fn with_value(mut self, value: impl Into<Value>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_route_name(mut self, route_name: impl Into<String>) -> Self {
        self.route_name = Some(route_name.into());
        self
    }

    pub fn with_fill(mut self, fill: impl Into<String>) -> Self {
        self.fill = Some(fill.into());
        self
    }

    pub fn with_src(mut self, src: impl Into<String>) -> Self {
        self.src = Some(src.into());
        self
    }
}
