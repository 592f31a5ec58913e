//! Shared fixtures: scripted transport, fixed signer and a small network

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use fabric_lifecycle::error::Result;
use fabric_lifecycle::protos::common::{Envelope, Status};
use fabric_lifecycle::protos::orderer::BroadcastResponse;
use fabric_lifecycle::protos::peer::{
    ChaincodeInvocationSpec, ChaincodeProposalPayload, Endorsement, Proposal, ProposalResponse,
    Response, SignedProposal,
};
use fabric_lifecycle::{
    CommitterClient, ConnectionOptions, Credential, EndorserClient, Identity, IdentityProvider,
    InMemoryWallet, Lifecycle, LifecycleError, OrdererDescriptor, PeerDescriptor, Signer,
    SigningContext, Transport,
};
use prost::Message;

/// Everything the mock saw, plus what it was told to answer
#[derive(Default)]
pub struct MockState {
    pub opened: Vec<String>,
    pub closed: Vec<String>,
    /// (endpoint, request timeout) handed to each connect call
    pub connect_timeouts: Vec<(String, Option<Duration>)>,
    /// (peer, proposal) in arrival order
    pub proposals: Vec<(String, SignedProposal)>,
    /// (orderer, envelope) in arrival order
    pub envelopes: Vec<(String, Envelope)>,
    /// Chaincode status and result per peer; peers without one answer 200 with an empty result
    pub results: HashMap<String, (i32, String, Vec<u8>)>,
    /// Endpoints whose connection attempt fails
    pub unreachable: HashSet<String>,
    /// Endpoints that never answer
    pub silent: HashSet<String>,
    /// Peers that answer after a delay
    pub delays: HashMap<String, Duration>,
    /// Overrides the transport default timeout
    pub default_timeout: Option<Duration>,
    /// Proposal response payload per peer, defaults to `prp`
    pub response_payloads: HashMap<String, Vec<u8>>,
    pub broadcast_status: Option<i32>,
}

#[derive(Clone, Default)]
pub struct MockTransport {
    pub state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, peer: &str, payload: Vec<u8>) {
        self.state
            .lock()
            .unwrap()
            .results
            .insert(peer.to_string(), (200, String::new(), payload));
    }

    pub fn fail(&self, peer: &str, status: i32, message: &str) {
        self.state
            .lock()
            .unwrap()
            .results
            .insert(peer.to_string(), (status, message.to_string(), Vec::new()));
    }

    pub fn unreachable(&self, endpoint: &str) {
        self.state.lock().unwrap().unreachable.insert(endpoint.to_string());
    }

    pub fn silent(&self, endpoint: &str) {
        self.state.lock().unwrap().silent.insert(endpoint.to_string());
    }

    pub fn delay(&self, peer: &str, delay: Duration) {
        self.state.lock().unwrap().delays.insert(peer.to_string(), delay);
    }

    pub fn set_default_timeout(&self, timeout: Duration) {
        self.state.lock().unwrap().default_timeout = Some(timeout);
    }

    pub fn connect_timeouts(&self) -> Vec<(String, Option<Duration>)> {
        self.state.lock().unwrap().connect_timeouts.clone()
    }

    pub fn response_payload(&self, peer: &str, payload: &[u8]) {
        self.state
            .lock()
            .unwrap()
            .response_payloads
            .insert(peer.to_string(), payload.to_vec());
    }

    pub fn broadcast_status(&self, status: Status) {
        self.state.lock().unwrap().broadcast_status = Some(status as i32);
    }

    pub fn opened(&self) -> Vec<String> {
        self.state.lock().unwrap().opened.clone()
    }

    pub fn closed(&self) -> Vec<String> {
        self.state.lock().unwrap().closed.clone()
    }

    pub fn proposals(&self) -> Vec<(String, SignedProposal)> {
        self.state.lock().unwrap().proposals.clone()
    }

    pub fn envelopes(&self) -> Vec<(String, Envelope)> {
        self.state.lock().unwrap().envelopes.clone()
    }

    /// Wait for connections released on a background task.
    pub async fn wait_all_closed(&self) -> bool {
        for _ in 0..100 {
            if self.all_closed() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        self.all_closed()
    }

    /// True when every opened connection was closed again.
    pub fn all_closed(&self) -> bool {
        let state = self.state.lock().unwrap();
        let mut opened = state.opened.clone();
        let mut closed = state.closed.clone();
        opened.sort();
        closed.sort();
        opened == closed
    }

    fn connect(&self, options: &ConnectionOptions) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.unreachable.contains(&options.name) {
            return Err(LifecycleError::Transport(format!("connection refused: {}", options.url)));
        }
        state.opened.push(options.name.clone());
        state
            .connect_timeouts
            .push((options.name.clone(), options.request_timeout));
        Ok(())
    }
}

#[async_trait::async_trait]
impl Transport for MockTransport {
    async fn connect_endorser(&self, options: &ConnectionOptions) -> Result<Box<dyn EndorserClient>> {
        self.connect(options)?;
        Ok(Box::new(MockEndorser {
            name: options.name.clone(),
            state: Arc::clone(&self.state),
        }))
    }

    async fn connect_committer(&self, options: &ConnectionOptions) -> Result<Box<dyn CommitterClient>> {
        self.connect(options)?;
        Ok(Box::new(MockCommitter {
            name: options.name.clone(),
            state: Arc::clone(&self.state),
        }))
    }

    fn default_timeout(&self) -> Duration {
        self.state
            .lock()
            .unwrap()
            .default_timeout
            .unwrap_or(Duration::from_secs(2))
    }
}

struct MockEndorser {
    name: String,
    state: Arc<Mutex<MockState>>,
}

#[async_trait::async_trait]
impl EndorserClient for MockEndorser {
    async fn process_proposal(&self, proposal: SignedProposal) -> Result<ProposalResponse> {
        let (silent, delay) = {
            let mut state = self.state.lock().unwrap();
            state.proposals.push((self.name.clone(), proposal));
            (state.silent.contains(&self.name), state.delays.get(&self.name).copied())
        };
        if silent {
            tokio::time::sleep(Duration::from_secs(60)).await;
        }
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let state = self.state.lock().unwrap();
        let (status, message, payload) = state
            .results
            .get(&self.name)
            .cloned()
            .unwrap_or((200, String::new(), Vec::new()));
        let response_payload = state
            .response_payloads
            .get(&self.name)
            .cloned()
            .unwrap_or_else(|| b"prp".to_vec());

        Ok(ProposalResponse {
            version: 1,
            response: Some(Response {
                status,
                message,
                payload,
            }),
            payload: response_payload,
            endorsement: Some(Endorsement {
                endorser: self.name.as_bytes().to_vec(),
                signature: b"endorsed".to_vec(),
            }),
            ..Default::default()
        })
    }

    async fn close(&self) -> Result<()> {
        self.state.lock().unwrap().closed.push(self.name.clone());
        Ok(())
    }
}

struct MockCommitter {
    name: String,
    state: Arc<Mutex<MockState>>,
}

#[async_trait::async_trait]
impl CommitterClient for MockCommitter {
    async fn broadcast(&self, envelope: Envelope) -> Result<BroadcastResponse> {
        let silent = {
            let mut state = self.state.lock().unwrap();
            state.envelopes.push((self.name.clone(), envelope));
            state.silent.contains(&self.name)
        };
        if silent {
            tokio::time::sleep(Duration::from_secs(60)).await;
        }

        let state = self.state.lock().unwrap();
        Ok(BroadcastResponse {
            status: state.broadcast_status.unwrap_or(Status::Success as i32),
            info: String::new(),
        })
    }

    async fn close(&self) -> Result<()> {
        self.state.lock().unwrap().closed.push(self.name.clone());
        Ok(())
    }
}

pub struct FixedSigner;

impl Signer for FixedSigner {
    fn sign(&self, _message: &[u8]) -> Result<Vec<u8>> {
        Ok(b"signature".to_vec())
    }
}

pub struct FixedProvider;

impl IdentityProvider for FixedProvider {
    fn signing_context(&self, identity: &Identity) -> Result<SigningContext> {
        Ok(SigningContext::new(
            identity.msp_id.clone(),
            identity.certificate.as_bytes().to_vec(),
            Arc::new(FixedSigner),
        ))
    }
}

/// Route library logs to the test output, filtered by `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Credential for the `admin` identity of Org1MSP
pub async fn credential() -> Credential {
    let wallet = InMemoryWallet::new().with_provider("X.509", Arc::new(FixedProvider));
    wallet.put("admin", Identity::x509("Org1MSP", "CERT", "KEY")).await;
    Credential::new(Arc::new(wallet), "admin")
}

/// Two orgs with two peers and one orderer
pub fn network(transport: &MockTransport) -> Lifecycle {
    let lifecycle = Lifecycle::new(Arc::new(transport.clone()));
    lifecycle
        .add_peer(PeerDescriptor::new("peer0.org1", "grpc://localhost:7051", "Org1MSP"))
        .unwrap();
    lifecycle
        .add_peer(PeerDescriptor::new("peer0.org2", "grpc://localhost:9051", "Org2MSP"))
        .unwrap();
    lifecycle
        .add_orderer(OrdererDescriptor::new("orderer0", "grpc://localhost:7050"))
        .unwrap();
    lifecycle
}

/// Chaincode arguments of a recorded proposal: function name first.
pub fn proposal_args(signed: &SignedProposal) -> Vec<Vec<u8>> {
    let proposal = Proposal::decode(signed.proposal_bytes.as_slice()).unwrap();
    let payload = ChaincodeProposalPayload::decode(proposal.payload.as_slice()).unwrap();
    ChaincodeInvocationSpec::decode(payload.input.as_slice())
        .unwrap()
        .chaincode_spec
        .unwrap()
        .input
        .unwrap()
        .args
}

/// Name of the chaincode a recorded proposal targets.
pub fn proposal_chaincode(signed: &SignedProposal) -> String {
    let proposal = Proposal::decode(signed.proposal_bytes.as_slice()).unwrap();
    let payload = ChaincodeProposalPayload::decode(proposal.payload.as_slice()).unwrap();
    ChaincodeInvocationSpec::decode(payload.input.as_slice())
        .unwrap()
        .chaincode_spec
        .unwrap()
        .chaincode_id
        .unwrap()
        .name
}
