//! gRPC transport over tonic
//!
//! Endorsement goes through `protos.Endorser/ProcessProposal`; ordering
//! goes through the bidirectional `orderer.AtomicBroadcast/Broadcast`
//! stream, sending one envelope and reading one response.

use std::time::Duration;

use tokio::sync::Mutex;
use tonic::codec::ProstCodec;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::{Certificate, Channel, ClientTlsConfig, Endpoint};
use tracing::debug;

use super::{CommitterClient, ConnectionOptions, EndorserClient, Transport, DEFAULT_TIMEOUT};
use crate::error::{LifecycleError, Result};
use crate::protos::common::Envelope;
use crate::protos::orderer::BroadcastResponse;
use crate::protos::peer::{ProposalResponse, SignedProposal};

const PROCESS_PROPOSAL: &str = "/protos.Endorser/ProcessProposal";
const BROADCAST: &str = "/orderer.AtomicBroadcast/Broadcast";

/// Transport that dials peers and orderers with tonic
#[derive(Debug, Clone)]
pub struct GrpcTransport {
    timeout: Duration,
}

impl GrpcTransport {
    pub fn new() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Set the timeout used when neither the call nor the endpoint sets one.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn dial(&self, options: &ConnectionOptions) -> Result<Channel> {
        // Request deadlines are enforced by the caller, only the dial is bounded here
        let connect_timeout = options.request_timeout.unwrap_or(self.timeout);
        let scheme = if options.is_tls() { "https" } else { "http" };
        let uri = format!("{}://{}", scheme, options.authority());

        let mut endpoint = Endpoint::from_shared(uri)?.connect_timeout(connect_timeout);

        if options.is_tls() {
            endpoint = endpoint.tls_config(tls_config(options))?;
        }

        debug!(endpoint = %options.name, url = %options.url, "Dialing");
        endpoint.connect().await.map_err(|e| {
            LifecycleError::Transport(format!("failed to connect to {} at {}: {}", options.name, options.url, e))
        })
    }
}

impl Default for GrpcTransport {
    fn default() -> Self {
        Self::new()
    }
}

fn tls_config(options: &ConnectionOptions) -> ClientTlsConfig {
    let tls = &options.tls;
    let mut config = ClientTlsConfig::new();
    if let Some(pem) = &tls.root_certificate {
        config = config.ca_certificate(Certificate::from_pem(pem));
    }
    if let Some(name) = &tls.server_name_override {
        config = config.domain_name(name.clone());
    }
    if let (Some(cert), Some(key)) = (&tls.client_certificate, &tls.client_key) {
        config = config.identity(tonic::transport::Identity::from_pem(cert, key));
    }
    config
}

async fn ready(name: &str, channel: Channel) -> Result<tonic::client::Grpc<Channel>> {
    let mut grpc = tonic::client::Grpc::new(channel);
    grpc.ready()
        .await
        .map_err(|e| LifecycleError::Transport(format!("{} not ready: {}", name, e)))?;
    Ok(grpc)
}

/// Take a clone of the live channel, failing once the client is closed.
async fn live(name: &str, channel: &Mutex<Option<Channel>>) -> Result<Channel> {
    channel
        .lock()
        .await
        .clone()
        .ok_or_else(|| LifecycleError::Transport(format!("connection to {} is closed", name)))
}

#[async_trait::async_trait]
impl Transport for GrpcTransport {
    async fn connect_endorser(&self, options: &ConnectionOptions) -> Result<Box<dyn EndorserClient>> {
        let channel = self.dial(options).await?;
        Ok(Box::new(GrpcEndorser {
            name: options.name.clone(),
            channel: Mutex::new(Some(channel)),
        }))
    }

    async fn connect_committer(&self, options: &ConnectionOptions) -> Result<Box<dyn CommitterClient>> {
        let channel = self.dial(options).await?;
        Ok(Box::new(GrpcCommitter {
            name: options.name.clone(),
            channel: Mutex::new(Some(channel)),
        }))
    }

    fn default_timeout(&self) -> Duration {
        self.timeout
    }
}

struct GrpcEndorser {
    name: String,
    channel: Mutex<Option<Channel>>,
}

#[async_trait::async_trait]
impl EndorserClient for GrpcEndorser {
    async fn process_proposal(&self, proposal: SignedProposal) -> Result<ProposalResponse> {
        let channel = live(&self.name, &self.channel).await?;
        let mut grpc = ready(&self.name, channel).await?;
        let codec: ProstCodec<SignedProposal, ProposalResponse> = ProstCodec::default();

        let response = grpc
            .unary(
                tonic::Request::new(proposal),
                PathAndQuery::from_static(PROCESS_PROPOSAL),
                codec,
            )
            .await?;
        Ok(response.into_inner())
    }

    async fn close(&self) -> Result<()> {
        self.channel.lock().await.take();
        debug!(peer = %self.name, "Endorser connection closed");
        Ok(())
    }
}

struct GrpcCommitter {
    name: String,
    channel: Mutex<Option<Channel>>,
}

#[async_trait::async_trait]
impl CommitterClient for GrpcCommitter {
    async fn broadcast(&self, envelope: Envelope) -> Result<BroadcastResponse> {
        let channel = live(&self.name, &self.channel).await?;
        let mut grpc = ready(&self.name, channel).await?;
        let codec: ProstCodec<Envelope, BroadcastResponse> = ProstCodec::default();

        let outbound = futures::stream::iter(vec![envelope]);
        let response = grpc
            .streaming(
                tonic::Request::new(outbound),
                PathAndQuery::from_static(BROADCAST),
                codec,
            )
            .await?;

        response.into_inner().message().await?.ok_or_else(|| {
            LifecycleError::Transport(format!("{} closed the broadcast stream without a response", self.name))
        })
    }

    async fn close(&self) -> Result<()> {
        self.channel.lock().await.take();
        debug!(orderer = %self.name, "Committer connection closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TlsOptions;

    #[test]
    fn test_grpc_transport_timeout() {
        let transport = GrpcTransport::new();
        assert_eq!(transport.default_timeout(), DEFAULT_TIMEOUT);

        let transport = transport.with_timeout(Duration::from_secs(30));
        assert_eq!(transport.default_timeout(), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_closed_client_rejects_calls() {
        let endorser = GrpcEndorser {
            name: "peer0".to_string(),
            channel: Mutex::new(None),
        };
        let err = endorser
            .process_proposal(SignedProposal::default())
            .await
            .unwrap_err();
        assert!(err.is_transport());
        assert!(endorser.close().await.is_ok());
    }

    #[tokio::test]
    async fn test_dial_rejects_malformed_url() {
        let options = ConnectionOptions {
            name: "peer0".to_string(),
            url: "grpc://bad host:7051".to_string(),
            tls: TlsOptions::default(),
            request_timeout: Some(Duration::from_millis(50)),
        };
        let err = GrpcTransport::new().connect_endorser(&options).await.err().unwrap();
        assert!(err.is_transport());
    }
}
