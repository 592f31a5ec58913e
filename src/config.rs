//! Endpoint configuration handed over by the host application

use serde::{Deserialize, Serialize};

use crate::lifecycle::{OrdererDescriptor, PeerDescriptor};

/// Peers and orderers to register, see [`crate::Lifecycle::from_config`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub peers: Vec<PeerDescriptor>,
    pub orderers: Vec<OrdererDescriptor>,
}
