//! xnft-bridge-api: Shared types for the xNFT plugin bridge
//!
//! This crate defines the protocol between the host and a sandboxed plugin.
//! Three channels cross the isolation boundary:
//!
//! - the reconciler bridge ([`BridgeMessage`]), carrying UI tree mutations
//!   stamped with a `renderId`,
//! - the RPC channel ([`RpcRequest`] / [`RpcResponse`]), carrying capability
//!   calls such as storage access and signing requests,
//! - the notification channel ([`PluginEvent`]), carrying one-way events from
//!   the host to the plugin.
//!
//! Transports that need bytes use the MessagePack [`codec`].

pub mod bridge;
pub mod codec;
pub mod element;
pub mod notification;
pub mod rpc;

pub use bridge::{BridgeMessage, BridgeOp};
pub use codec::{decode, encode, CodecError};
pub use element::{Element, NodeId, NodeKind, Props, Style, UnknownKind, UpdateDiff};
pub use notification::{
    Blockchain, ConnectPayload, Notification, PluginEvent, CHANNEL_PLUGIN_NOTIFICATION,
};
pub use rpc::{RpcMethod, RpcRequest, RpcResponse};

/// API version for compatibility checking
pub const API_VERSION: u32 = 1;
