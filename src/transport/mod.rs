//! Transport collaborator
//!
//! Opens endorser and committer connections. Every lifecycle call opens its
//! own clients and closes them before returning; there is no connection
//! pool.

#[cfg(feature = "grpc")]
mod grpc;

#[cfg(feature = "grpc")]
pub use grpc::GrpcTransport;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{LifecycleError, Result};
use crate::protos::common::Envelope;
use crate::protos::orderer::BroadcastResponse;
use crate::protos::peer::{ProposalResponse, SignedProposal};

/// Used when neither the call nor the endpoint descriptor sets a timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// TLS material for `grpcs://` endpoints
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TlsOptions {
    /// PEM root certificate(s) trusted for the server
    #[serde(rename = "pem", default, skip_serializing_if = "Option::is_none")]
    pub root_certificate: Option<String>,

    /// Expected server name when it differs from the URL host
    #[serde(
        rename = "sslTargetNameOverride",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub server_name_override: Option<String>,

    /// PEM client certificate for mutual TLS
    #[serde(rename = "clientCertKey", default, skip_serializing_if = "Option::is_none")]
    pub client_certificate: Option<String>,

    /// PEM client private key for mutual TLS
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_key: Option<String>,
}

impl TlsOptions {
    pub fn is_empty(&self) -> bool {
        self.root_certificate.is_none()
            && self.server_name_override.is_none()
            && self.client_certificate.is_none()
            && self.client_key.is_none()
    }
}

/// Where and how to reach one peer or orderer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionOptions {
    /// Registry name, used in logs and errors
    pub name: String,
    pub url: String,
    pub tls: TlsOptions,
    /// Endpoint-level request timeout
    pub request_timeout: Option<Duration>,
}

impl ConnectionOptions {
    pub fn is_tls(&self) -> bool {
        self.url.starts_with("grpcs://")
    }

    /// Host and port with the scheme removed.
    pub fn authority(&self) -> &str {
        self.url
            .strip_prefix("grpcs://")
            .or_else(|| self.url.strip_prefix("grpc://"))
            .unwrap_or(&self.url)
    }
}

/// Connection to one endorsing peer
#[async_trait::async_trait]
pub trait EndorserClient: Send + Sync {
    async fn process_proposal(&self, proposal: SignedProposal) -> Result<ProposalResponse>;

    async fn close(&self) -> Result<()>;
}

/// Connection to one ordering node
#[async_trait::async_trait]
pub trait CommitterClient: Send + Sync {
    async fn broadcast(&self, envelope: Envelope) -> Result<BroadcastResponse>;

    async fn close(&self) -> Result<()>;
}

/// Factory for endorser and committer connections
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn connect_endorser(&self, options: &ConnectionOptions) -> Result<Box<dyn EndorserClient>>;

    async fn connect_committer(&self, options: &ConnectionOptions) -> Result<Box<dyn CommitterClient>>;

    /// Timeout applied when no other timeout is configured.
    fn default_timeout(&self) -> Duration {
        DEFAULT_TIMEOUT
    }
}

/// Run a network step under a deadline, mapping expiry to `Timeout`.
pub(crate) async fn with_deadline<T, F>(timeout: Duration, what: &str, step: F) -> Result<T>
where
    F: std::future::Future<Output = Result<T>>,
{
    tokio::time::timeout(timeout, step)
        .await
        .map_err(|_| LifecycleError::Timeout(format!("{} after {:?}", what, timeout)))?
}
