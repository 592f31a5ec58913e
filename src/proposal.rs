//! Signed proposals and endorser transactions
//!
//! A proposal invokes one function of a system chaincode (`_lifecycle` or
//! `cscc`) with the function name as the first argument. Endorsed responses
//! are folded into a signed transaction envelope for the orderer.

use std::time::SystemTime;

use prost::Message;
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::error::{LifecycleError, Result};
use crate::identity::SigningContext;
use crate::protos::common::{ChannelHeader, Envelope, Header, HeaderType, Payload, SignatureHeader};
use crate::protos::peer::{
    ChaincodeActionPayload, ChaincodeEndorsedAction, ChaincodeHeaderExtension, ChaincodeId,
    ChaincodeInput, ChaincodeInvocationSpec, ChaincodeProposalPayload, ChaincodeSpec,
    ChaincodeType, Proposal, ProposalResponse, SignedProposal, Transaction, TransactionAction,
};

pub const LIFECYCLE_CHAINCODE: &str = "_lifecycle";
pub const CONFIG_CHAINCODE: &str = "cscc";

/// Status code of a successful chaincode response
pub const STATUS_OK: i32 = 200;

const NONCE_LEN: usize = 24;

/// A proposal ready to send, plus what is needed to turn its endorsements
/// into a transaction.
#[derive(Debug, Clone)]
pub struct PreparedProposal {
    pub tx_id: String,
    pub channel: String,
    pub function: String,
    header: Header,
    proposal: Proposal,
    signed: SignedProposal,
}

impl PreparedProposal {
    pub fn signed(&self) -> &SignedProposal {
        &self.signed
    }

    pub fn proposal(&self) -> &Proposal {
        &self.proposal
    }
}

/// Transaction id: hex SHA-256 of nonce followed by creator.
pub fn transaction_id(nonce: &[u8], creator: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(nonce);
    hasher.update(creator);
    hex::encode(hasher.finalize())
}

fn nonce() -> Vec<u8> {
    let mut nonce = vec![0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce);
    nonce
}

/// Build and sign a proposal for `chaincode.function(args...)`.
///
/// `channel` is empty for peer-scoped calls such as install.
pub fn prepare(
    ctx: &SigningContext,
    channel: &str,
    chaincode: &str,
    function: &str,
    args: Vec<Vec<u8>>,
) -> Result<PreparedProposal> {
    let creator = ctx.creator();
    let nonce = nonce();
    let tx_id = transaction_id(&nonce, &creator);

    let chaincode_id = ChaincodeId {
        name: chaincode.to_string(),
        ..Default::default()
    };

    let channel_header = ChannelHeader {
        r#type: HeaderType::EndorserTransaction as i32,
        version: 0,
        timestamp: Some(prost_types::Timestamp::from(SystemTime::now())),
        channel_id: channel.to_string(),
        tx_id: tx_id.clone(),
        epoch: 0,
        extension: ChaincodeHeaderExtension {
            chaincode_id: Some(chaincode_id.clone()),
        }
        .encode_to_vec(),
        tls_cert_hash: Vec::new(),
    };
    let header = Header {
        channel_header: channel_header.encode_to_vec(),
        signature_header: SignatureHeader { creator, nonce }.encode_to_vec(),
    };

    let mut input = Vec::with_capacity(args.len() + 1);
    input.push(function.as_bytes().to_vec());
    input.extend(args);

    let invocation = ChaincodeInvocationSpec {
        chaincode_spec: Some(ChaincodeSpec {
            r#type: ChaincodeType::Golang as i32,
            chaincode_id: Some(chaincode_id),
            input: Some(ChaincodeInput {
                args: input,
                ..Default::default()
            }),
            timeout: 0,
        }),
    };

    let proposal = Proposal {
        header: header.encode_to_vec(),
        payload: ChaincodeProposalPayload {
            input: invocation.encode_to_vec(),
            ..Default::default()
        }
        .encode_to_vec(),
        extension: Vec::new(),
    };

    let proposal_bytes = proposal.encode_to_vec();
    let signature = ctx.sign(&proposal_bytes)?;

    Ok(PreparedProposal {
        tx_id,
        channel: channel.to_string(),
        function: function.to_string(),
        header,
        proposal,
        signed: SignedProposal {
            proposal_bytes,
            signature,
        },
    })
}

/// Unwrap the chaincode result of one response, failing on non-200 status.
pub fn response_payload(endpoint: &str, response: &ProposalResponse) -> Result<Vec<u8>> {
    let inner = response.response.as_ref().ok_or_else(|| LifecycleError::Protocol {
        status: 0,
        message: format!("{} returned a proposal response without a response", endpoint),
    })?;

    if inner.status != STATUS_OK {
        return Err(LifecycleError::Protocol {
            status: inner.status,
            message: format!("{} rejected the proposal: {}", endpoint, inner.message),
        });
    }

    Ok(inner.payload.clone())
}

/// Check that every endorsement succeeded and that all endorsers agree.
pub fn check_endorsements(responses: &[(String, ProposalResponse)]) -> Result<()> {
    let (first_peer, first) = responses.first().ok_or_else(|| {
        LifecycleError::Protocol {
            status: 0,
            message: "no endorsements received".to_string(),
        }
    })?;

    for (peer, response) in responses {
        response_payload(peer, response)?;
        if response.endorsement.is_none() {
            return Err(LifecycleError::Protocol {
                status: 0,
                message: format!("{} returned a response without an endorsement", peer),
            });
        }
        if response.payload != first.payload {
            return Err(LifecycleError::Protocol {
                status: 0,
                message: format!(
                    "endorsement payload mismatch between {} and {}",
                    first_peer, peer
                ),
            });
        }
    }

    Ok(())
}

/// Assemble the signed transaction envelope from validated endorsements.
pub fn transaction_envelope(
    ctx: &SigningContext,
    prepared: &PreparedProposal,
    responses: &[(String, ProposalResponse)],
) -> Result<Envelope> {
    check_endorsements(responses)?;

    let payload = ChaincodeProposalPayload::decode(prepared.proposal.payload.as_slice())?;
    let proposal_payload = ChaincodeProposalPayload {
        input: payload.input,
        transient_map: Default::default(),
    };

    let endorsed_action = ChaincodeEndorsedAction {
        proposal_response_payload: responses[0].1.payload.clone(),
        endorsements: responses
            .iter()
            .filter_map(|(_, response)| response.endorsement.clone())
            .collect(),
    };

    let transaction = Transaction {
        actions: vec![TransactionAction {
            header: prepared.header.signature_header.clone(),
            payload: ChaincodeActionPayload {
                chaincode_proposal_payload: proposal_payload.encode_to_vec(),
                action: Some(endorsed_action),
            }
            .encode_to_vec(),
        }],
    };

    let payload = Payload {
        header: Some(prepared.header.clone()),
        data: transaction.encode_to_vec(),
    }
    .encode_to_vec();
    let signature = ctx.sign(&payload)?;

    Ok(Envelope { payload, signature })
}
