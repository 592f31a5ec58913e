//! Lifecycle registry
//!
//! Maps peer and orderer names to their endpoint descriptors and hands out
//! [`LifecyclePeer`] and [`LifecycleChannel`] handles bound to a credential.
//!
//! ## Thread Safety
//!
//! Descriptors live in DashMaps, so registration and lookups may happen
//! concurrently. Re-registering a name replaces the previous descriptor.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::channel::LifecycleChannel;
use crate::config::NetworkConfig;
use crate::error::{EndpointKind, LifecycleError, Result};
use crate::identity::Credential;
use crate::peer::LifecyclePeer;
use crate::transport::{ConnectionOptions, TlsOptions, Transport};

/// Endorsing peer endpoint
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PeerDescriptor {
    pub name: String,
    /// `grpc://host:port` or `grpcs://host:port`
    pub url: String,
    /// Organization the peer belongs to
    #[serde(rename = "mspid")]
    pub msp_id: String,
    #[serde(flatten)]
    pub tls: TlsOptions,
    /// Request timeout in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_timeout: Option<u64>,
}

impl PeerDescriptor {
    pub fn new(name: impl Into<String>, url: impl Into<String>, msp_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            msp_id: msp_id.into(),
            ..Default::default()
        }
    }

    pub fn with_tls(mut self, tls: TlsOptions) -> Self {
        self.tls = tls;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout.as_millis() as u64);
        self
    }

    pub fn validate(&self) -> Result<()> {
        require(&self.name, "name")?;
        require(&self.url, "url")?;
        require(&self.msp_id, "mspid")
    }

    pub fn connection_options(&self) -> ConnectionOptions {
        ConnectionOptions {
            name: self.name.clone(),
            url: self.url.clone(),
            tls: self.tls.clone(),
            request_timeout: self.request_timeout.map(Duration::from_millis),
        }
    }
}

/// Ordering node endpoint
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OrdererDescriptor {
    pub name: String,
    pub url: String,
    #[serde(flatten)]
    pub tls: TlsOptions,
    /// Request timeout in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_timeout: Option<u64>,
}

impl OrdererDescriptor {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_tls(mut self, tls: TlsOptions) -> Self {
        self.tls = tls;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout.as_millis() as u64);
        self
    }

    pub fn validate(&self) -> Result<()> {
        require(&self.name, "name")?;
        require(&self.url, "url")
    }

    pub fn connection_options(&self) -> ConnectionOptions {
        ConnectionOptions {
            name: self.name.clone(),
            url: self.url.clone(),
            tls: self.tls.clone(),
            request_timeout: self.request_timeout.map(Duration::from_millis),
        }
    }
}

fn require(value: &str, option: &str) -> Result<()> {
    if value.is_empty() {
        return Err(LifecycleError::validation(format!("missing option {}", option)));
    }
    Ok(())
}

struct Registry {
    peers: DashMap<String, PeerDescriptor>,
    orderers: DashMap<String, OrdererDescriptor>,
    transport: Arc<dyn Transport>,
}

/// Entry point: endpoint registry and handle factory
///
/// Cloning is cheap and clones share the same registry.
#[derive(Clone)]
pub struct Lifecycle {
    inner: Arc<Registry>,
}

impl Lifecycle {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            inner: Arc::new(Registry {
                peers: DashMap::new(),
                orderers: DashMap::new(),
                transport,
            }),
        }
    }

    /// Registry using the bundled gRPC transport with its default timeout.
    #[cfg(feature = "grpc")]
    pub fn with_grpc() -> Self {
        Self::new(Arc::new(crate::transport::GrpcTransport::new()))
    }

    /// Build a registry and register every endpoint in `config`.
    pub fn from_config(config: NetworkConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        let lifecycle = Self::new(transport);
        for peer in config.peers {
            lifecycle.add_peer(peer)?;
        }
        for orderer in config.orderers {
            lifecycle.add_orderer(orderer)?;
        }
        Ok(lifecycle)
    }

    pub fn transport(&self) -> Arc<dyn Transport> {
        Arc::clone(&self.inner.transport)
    }

    /// Register a peer, replacing any peer with the same name.
    pub fn add_peer(&self, descriptor: PeerDescriptor) -> Result<()> {
        descriptor.validate()?;
        info!(
            peer = %descriptor.name,
            url = %descriptor.url,
            msp_id = %descriptor.msp_id,
            "Registered peer"
        );
        self.inner.peers.insert(descriptor.name.clone(), descriptor);
        Ok(())
    }

    /// Register an orderer, replacing any orderer with the same name.
    pub fn add_orderer(&self, descriptor: OrdererDescriptor) -> Result<()> {
        descriptor.validate()?;
        info!(orderer = %descriptor.name, url = %descriptor.url, "Registered orderer");
        self.inner.orderers.insert(descriptor.name.clone(), descriptor);
        Ok(())
    }

    pub fn peer_descriptor(&self, name: &str) -> Result<PeerDescriptor> {
        self.inner
            .peers
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| LifecycleError::NotFound {
                kind: EndpointKind::Peer,
                name: name.to_string(),
            })
    }

    pub fn orderer_descriptor(&self, name: &str) -> Result<OrdererDescriptor> {
        self.inner
            .orderers
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| LifecycleError::NotFound {
                kind: EndpointKind::Orderer,
                name: name.to_string(),
            })
    }

    /// Handle for a registered peer, bound to `credential`.
    pub fn get_peer(&self, name: &str, credential: Credential) -> Result<LifecyclePeer> {
        let descriptor = self.peer_descriptor(name)?;
        Ok(LifecyclePeer::new(
            descriptor.connection_options(),
            descriptor.msp_id,
            self.transport(),
        )
        .with_credential(credential))
    }

    /// Handle for a channel, bound to `credential`.
    pub fn get_channel(&self, channel_name: &str, credential: Credential) -> Result<LifecycleChannel> {
        if channel_name.is_empty() {
            return Err(LifecycleError::validation("parameter channelName is missing"));
        }
        Ok(LifecycleChannel::new(self.clone(), channel_name, credential))
    }

    pub fn list_peer_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.peers.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn list_peer_names_for_org(&self, msp_id: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .inner
            .peers
            .iter()
            .filter(|e| e.value().msp_id == msp_id)
            .map(|e| e.key().clone())
            .collect();
        names.sort();
        names
    }

    pub fn list_orderer_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.orderers.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}
