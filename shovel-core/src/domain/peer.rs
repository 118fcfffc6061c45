//! Peer domain types

use serde::{Deserialize, Serialize};

/// One known node in the discovery mesh, including the local node itself.
///
/// Serialized as `{"name": "...", "id": 0, "port": 5001}` on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerRecord {
    pub name: String,
    #[serde(default)]
    pub id: u64,
    pub port: u16,
}

impl PeerRecord {
    pub fn new(name: impl Into<String>, id: u64, port: u16) -> Self {
        Self {
            name: name.into(),
            id,
            port,
        }
    }
}
