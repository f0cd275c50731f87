//! One-way events pushed from the host to the plugin

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

use crate::element::NodeId;

/// Channel tag carried by every notification envelope
pub const CHANNEL_PLUGIN_NOTIFICATION: &str = "xnft-plugin-notification";

/// Chains a plugin can hold a wallet connection for
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Blockchain {
    Solana,
    Ethereum,
}

impl fmt::Display for Blockchain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Solana => f.write_str("solana"),
            Self::Ethereum => f.write_str("ethereum"),
        }
    }
}

/// Wallet and endpoint state sent on connect
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectPayload {
    /// Solana key, kept for plugins predating `publicKeys`
    #[serde(rename = "publicKey")]
    pub public_key: Option<String>,

    #[serde(rename = "publicKeys")]
    pub public_keys: BTreeMap<Blockchain, String>,

    /// Solana endpoint, kept for plugins predating `connectionUrls`
    #[serde(rename = "connectionUrl")]
    pub connection_url: Option<String>,

    #[serde(rename = "connectionUrls")]
    pub connection_urls: BTreeMap<Blockchain, Option<String>>,
}

impl ConnectPayload {
    /// Build the payload, deriving the legacy single-chain fields
    pub fn new(
        public_keys: BTreeMap<Blockchain, String>,
        connection_urls: BTreeMap<Blockchain, Option<String>>,
    ) -> Self {
        Self {
            public_key: public_keys.get(&Blockchain::Solana).cloned(),
            connection_url: connection_urls.get(&Blockchain::Solana).cloned().flatten(),
            public_keys,
            connection_urls,
        }
    }
}

/// Notification body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", content = "data", rename_all = "kebab-case")]
pub enum Notification {
    Mount {},
    Unmount {},
    Connect(ConnectPayload),
    Click {
        #[serde(rename = "viewId")]
        view_id: NodeId,
    },
    Change {
        #[serde(rename = "viewId")]
        view_id: NodeId,
        value: Value,
    },
    ConnectionUrlUpdated {
        chain: Blockchain,
        url: String,
    },
    PublicKeyUpdated {
        chain: Blockchain,
        #[serde(rename = "publicKey")]
        public_key: String,
    },
}

impl Notification {
    /// Wire name of the notification
    pub fn name(&self) -> &'static str {
        match self {
            Self::Mount {} => "mount",
            Self::Unmount {} => "unmount",
            Self::Connect(_) => "connect",
            Self::Click { .. } => "click",
            Self::Change { .. } => "change",
            Self::ConnectionUrlUpdated { .. } => "connection-url-updated",
            Self::PublicKeyUpdated { .. } => "public-key-updated",
        }
    }

    /// Whether delivering this notification counts as user interaction
    pub fn is_interaction(&self) -> bool {
        matches!(self, Self::Click { .. } | Self::Change { .. })
    }
}

/// Envelope posted into the plugin's rendering context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginEvent {
    #[serde(rename = "type")]
    pub channel: String,

    pub detail: Notification,
}

impl From<Notification> for PluginEvent {
    fn from(detail: Notification) -> Self {
        Self {
            channel: CHANNEL_PLUGIN_NOTIFICATION.to_string(),
            detail,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_wire_shape() {
        let event = PluginEvent::from(Notification::Click { view_id: 4 });
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            json!({
                "type": CHANNEL_PLUGIN_NOTIFICATION,
                "detail": { "name": "click", "data": { "viewId": 4 } }
            })
        );

        let mount = serde_json::to_value(PluginEvent::from(Notification::Mount {})).unwrap();
        assert_eq!(mount["detail"], json!({ "name": "mount", "data": {} }));
    }

    #[test]
    fn test_names_match_serde_tags() {
        let samples = [
            Notification::Mount {},
            Notification::Unmount {},
            Notification::Connect(ConnectPayload::default()),
            Notification::Click { view_id: 1 },
            Notification::Change {
                view_id: 1,
                value: json!("x"),
            },
            Notification::ConnectionUrlUpdated {
                chain: Blockchain::Ethereum,
                url: "https://eth.example".into(),
            },
            Notification::PublicKeyUpdated {
                chain: Blockchain::Solana,
                public_key: "key".into(),
            },
        ];
        for notification in samples {
            let value = serde_json::to_value(&notification).unwrap();
            assert_eq!(value["name"], notification.name());
        }
    }

    #[test]
    fn test_connect_payload_legacy_fields() {
        let keys = BTreeMap::from([
            (Blockchain::Solana, "sol-key".to_string()),
            (Blockchain::Ethereum, "0xabc".to_string()),
        ]);
        let urls = BTreeMap::from([
            (Blockchain::Solana, Some("https://sol.example".to_string())),
            (Blockchain::Ethereum, None),
        ]);
        let payload = ConnectPayload::new(keys, urls);

        assert_eq!(payload.public_key.as_deref(), Some("sol-key"));
        assert_eq!(payload.connection_url.as_deref(), Some("https://sol.example"));

        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["publicKeys"]["ethereum"], "0xabc");
        assert_eq!(value["connectionUrls"]["ethereum"], Value::Null);
    }
}
