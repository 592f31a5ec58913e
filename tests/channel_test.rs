//! LifecycleChannel approve, commit and queries against the scripted transport

mod support;

use std::collections::BTreeMap;
use std::time::Duration;

use fabric_lifecycle::protos::common::{Payload, Status};
use fabric_lifecycle::protos::lifecycle::{
    chaincode_source, ApproveChaincodeDefinitionForMyOrgArgs, ChaincodeDefinition,
    CheckCommitReadinessArgs, CheckCommitReadinessResult, CommitChaincodeDefinitionArgs,
    QueryChaincodeDefinitionArgs, QueryChaincodeDefinitionResult, QueryChaincodeDefinitionsResult,
};
use fabric_lifecycle::protos::peer::{ChaincodeActionPayload, Transaction};
use fabric_lifecycle::{
    CollectionDescriptor, EndpointKind, LifecycleChannel, LifecycleError,
    SmartContractDefinitionOptions,
};
use prost::Message;
use support::{credential, network, proposal_args, MockTransport};

const PEERS: [&str; 2] = ["peer0.org1", "peer0.org2"];

async fn channel(transport: &MockTransport) -> LifecycleChannel {
    support::init_tracing();
    network(transport)
        .get_channel("mychannel", credential().await)
        .unwrap()
}

fn options() -> SmartContractDefinitionOptions {
    SmartContractDefinitionOptions::new("basic", "1.0", 1)
        .with_package_id("basic_1.0:4ec1")
        .with_endorsement_policy("AND('Org1MSP.peer', 'Org2MSP.peer')")
}

#[tokio::test]
async fn test_approve_endorses_on_every_named_peer() {
    let transport = MockTransport::new();
    channel(&transport)
        .await
        .approve_smart_contract_definition(&PEERS, "orderer0", &options(), None)
        .await
        .unwrap();

    let proposals = transport.proposals();
    let mut endorsers: Vec<&str> = proposals.iter().map(|(peer, _)| peer.as_str()).collect();
    endorsers.sort();
    assert_eq!(endorsers, PEERS.to_vec());

    let args = proposal_args(&proposals[0].1);
    assert_eq!(args[0], b"ApproveChaincodeDefinitionForMyOrg".to_vec());
    let approve = ApproveChaincodeDefinitionForMyOrgArgs::decode(args[1].as_slice()).unwrap();
    assert_eq!(approve.name, "basic");
    assert_eq!(approve.version, "1.0");
    assert_eq!(approve.sequence, 1);
    assert_eq!(
        approve.source.and_then(|s| s.r#type),
        Some(chaincode_source::Type::LocalPackage(chaincode_source::Local {
            package_id: "basic_1.0:4ec1".to_string(),
        }))
    );
    assert_eq!(
        approve.validation_parameter,
        LifecycleChannel::endorsement_policy_bytes("AND('Org1MSP.peer', 'Org2MSP.peer')").unwrap()
    );

    let envelopes = transport.envelopes();
    assert_eq!(envelopes.len(), 1);
    assert_eq!(envelopes[0].0, "orderer0");
    let payload = Payload::decode(envelopes[0].1.payload.as_slice()).unwrap();
    let transaction = Transaction::decode(payload.data.as_slice()).unwrap();
    let action = ChaincodeActionPayload::decode(transaction.actions[0].payload.as_slice()).unwrap();
    assert_eq!(action.action.unwrap().endorsements.len(), 2);

    assert_eq!(transport.opened().len(), 3);
    assert!(transport.all_closed());
}

#[tokio::test]
async fn test_approve_without_package_marks_source_unavailable() {
    let transport = MockTransport::new();
    let mut options = options();
    options.package_id = None;

    channel(&transport)
        .await
        .approve_smart_contract_definition(&PEERS[..1], "orderer0", &options, None)
        .await
        .unwrap();

    let args = proposal_args(&transport.proposals()[0].1);
    let approve = ApproveChaincodeDefinitionForMyOrgArgs::decode(args[1].as_slice()).unwrap();
    assert_eq!(
        approve.source.and_then(|s| s.r#type),
        Some(chaincode_source::Type::Unavailable(chaincode_source::Unavailable {}))
    );
}

#[tokio::test]
async fn test_approve_with_no_peers_fails_before_network() {
    let transport = MockTransport::new();
    let err = channel(&transport)
        .await
        .approve_smart_contract_definition(&[], "orderer0", &options(), None)
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "parameter peerNames is missing");
    assert!(err.is_validation());
    assert!(transport.opened().is_empty());
}

#[tokio::test]
async fn test_approve_validates_options_before_network() {
    let transport = MockTransport::new();
    let mut options = options();
    options.smart_contract_name.clear();

    let err = channel(&transport)
        .await
        .approve_smart_contract_definition(&PEERS, "orderer0", &options, None)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "missing option smartContractName");
    assert!(transport.opened().is_empty());
}

#[tokio::test]
async fn test_approve_bad_policy_fails_before_network() {
    let transport = MockTransport::new();
    let options = options().with_endorsement_policy("AND('Org1MSP.peer'");

    let err = channel(&transport)
        .await
        .approve_smart_contract_definition(&PEERS, "orderer0", &options, None)
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::PolicyParse(_)));
    assert!(transport.opened().is_empty());
}

#[tokio::test]
async fn test_approve_unknown_orderer() {
    let transport = MockTransport::new();
    let err = channel(&transport)
        .await
        .approve_smart_contract_definition(&PEERS, "orderer9", &options(), None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        LifecycleError::NotFound {
            kind: EndpointKind::Orderer,
            ..
        }
    ));
    assert!(transport.opened().is_empty());
}

#[tokio::test]
async fn test_approve_failure_is_wrapped_and_connections_released() {
    let transport = MockTransport::new();
    transport.unreachable("peer0.org2");

    let err = channel(&transport)
        .await
        .approve_smart_contract_definition(&PEERS, "orderer0", &options(), None)
        .await
        .unwrap_err();

    assert!(err
        .to_string()
        .starts_with("ApproveChaincodeDefinitionForMyOrg failed: "));
    assert!(matches!(err.root_cause(), LifecycleError::Transport(_)));
    assert_eq!(transport.opened(), vec!["peer0.org1"]);
    assert!(transport.all_closed());
    assert!(transport.envelopes().is_empty());
}

#[tokio::test]
async fn test_one_failed_endorsement_fails_the_submission() {
    let transport = MockTransport::new();
    transport.fail("peer0.org2", 500, "failed to invoke backing implementation");

    let err = channel(&transport)
        .await
        .approve_smart_contract_definition(&PEERS, "orderer0", &options(), None)
        .await
        .unwrap_err();

    match err.root_cause() {
        LifecycleError::Protocol { status, message } => {
            assert_eq!(*status, 500);
            assert!(message.contains("failed to invoke backing implementation"));
        }
        other => panic!("unexpected cause: {:?}", other),
    }
    assert!(transport.envelopes().is_empty());
    assert!(transport.all_closed());
}

#[tokio::test]
async fn test_mismatched_endorsements_fail() {
    let transport = MockTransport::new();
    transport.response_payload("peer0.org2", b"different");

    let err = channel(&transport)
        .await
        .commit_smart_contract_definition(&PEERS, "orderer0", &options(), None)
        .await
        .unwrap_err();
    assert!(err.to_string().starts_with("CommitChaincodeDefinition failed: "));
    assert!(err.to_string().contains("mismatch"));
    assert!(transport.all_closed());
}

#[tokio::test]
async fn test_orderer_rejection_fails_commit() {
    let transport = MockTransport::new();
    transport.broadcast_status(Status::Forbidden);

    let err = channel(&transport)
        .await
        .commit_smart_contract_definition(&PEERS, "orderer0", &options(), None)
        .await
        .unwrap_err();
    assert!(matches!(
        err.root_cause(),
        LifecycleError::Protocol { status: 403, .. }
    ));
    assert!(transport.all_closed());
}

#[tokio::test]
async fn test_approve_endorsement_timeout_is_wrapped() {
    let transport = MockTransport::new();
    transport.silent("peer0.org2");

    let err = channel(&transport)
        .await
        .approve_smart_contract_definition(&PEERS, "orderer0", &options(), Some(Duration::from_millis(100)))
        .await
        .unwrap_err();

    assert!(err
        .to_string()
        .starts_with("ApproveChaincodeDefinitionForMyOrg failed: "));
    assert!(matches!(err.root_cause(), LifecycleError::Timeout(_)));
    assert!(err.is_transport());
    assert!(transport.envelopes().is_empty());
    assert!(transport.all_closed());
}

#[tokio::test]
async fn test_commit_broadcast_timeout_is_wrapped() {
    let transport = MockTransport::new();
    transport.silent("orderer0");

    let err = channel(&transport)
        .await
        .commit_smart_contract_definition(&PEERS, "orderer0", &options(), Some(Duration::from_millis(100)))
        .await
        .unwrap_err();

    assert!(err.to_string().starts_with("CommitChaincodeDefinition failed: "));
    assert!(matches!(err.root_cause(), LifecycleError::Timeout(m) if m.contains("orderer0")));
    assert_eq!(transport.envelopes().len(), 1);
    assert!(transport.all_closed());
}

#[tokio::test]
async fn test_call_timeout_reaches_every_connection() {
    let transport = MockTransport::new();
    channel(&transport)
        .await
        .approve_smart_contract_definition(&PEERS, "orderer0", &options(), Some(Duration::from_secs(30)))
        .await
        .unwrap();

    let timeouts = transport.connect_timeouts();
    assert_eq!(timeouts.len(), 3);
    assert!(timeouts
        .iter()
        .all(|(_, timeout)| *timeout == Some(Duration::from_secs(30))));
}

#[tokio::test]
async fn test_cancelled_approve_releases_connections() {
    let transport = MockTransport::new();
    transport.silent("peer0.org2");
    let channel = channel(&transport).await;

    let outcome = tokio::time::timeout(
        Duration::from_millis(100),
        channel.approve_smart_contract_definition(&PEERS, "orderer0", &options(), None),
    )
    .await;

    assert!(outcome.is_err());
    assert_eq!(transport.opened(), vec!["peer0.org1", "peer0.org2", "orderer0"]);
    assert!(transport.wait_all_closed().await);
    assert!(transport.envelopes().is_empty());
}

#[tokio::test]
async fn test_commit_arguments() {
    let transport = MockTransport::new();
    let options = options()
        .with_init_required(true)
        .with_collections(vec![CollectionDescriptor::new("c1", "OR('Org1MSP.member')").with_peer_counts(0, 1)]);

    channel(&transport)
        .await
        .commit_smart_contract_definition(&PEERS, "orderer0", &options, None)
        .await
        .unwrap();

    let args = proposal_args(&transport.proposals()[0].1);
    assert_eq!(args[0], b"CommitChaincodeDefinition".to_vec());
    let commit = CommitChaincodeDefinitionArgs::decode(args[1].as_slice()).unwrap();
    assert!(commit.init_required);
    assert_eq!(commit.collections.unwrap().config.len(), 1);
    assert_eq!(transport.envelopes().len(), 1);
}

#[tokio::test]
async fn test_commit_with_no_orderer_name() {
    let transport = MockTransport::new();
    let err = channel(&transport)
        .await
        .commit_smart_contract_definition(&PEERS, "", &options(), None)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "parameter ordererName is missing");
}

#[tokio::test]
async fn test_commit_readiness_decodes_approvals() {
    let transport = MockTransport::new();
    let mut approvals = BTreeMap::new();
    approvals.insert("org1".to_string(), true);
    approvals.insert("org2".to_string(), false);
    transport.respond(
        "peer0.org1",
        CheckCommitReadinessResult { approvals }.encode_to_vec(),
    );

    let readiness = channel(&transport)
        .await
        .get_commit_readiness("peer0.org1", &options(), None)
        .await
        .unwrap();

    assert_eq!(readiness.len(), 2);
    assert_eq!(readiness.get("org1"), Some(&true));
    assert_eq!(readiness.get("org2"), Some(&false));

    let args = proposal_args(&transport.proposals()[0].1);
    assert_eq!(args[0], b"CheckCommitReadiness".to_vec());
    let check = CheckCommitReadinessArgs::decode(args[1].as_slice()).unwrap();
    assert_eq!(check.sequence, 1);
    assert!(transport.envelopes().is_empty());
    assert_eq!(transport.opened(), vec!["peer0.org1"]);
}

#[tokio::test]
async fn test_committed_smart_contract() {
    let transport = MockTransport::new();
    let mut approvals = BTreeMap::new();
    approvals.insert("Org1MSP".to_string(), true);
    approvals.insert("Org2MSP".to_string(), true);
    transport.respond(
        "peer0.org2",
        QueryChaincodeDefinitionResult {
            sequence: 3,
            version: "1.2".to_string(),
            endorsement_plugin: "escc".to_string(),
            validation_plugin: "vscc".to_string(),
            approvals,
            ..Default::default()
        }
        .encode_to_vec(),
    );

    let defined = channel(&transport)
        .await
        .get_committed_smart_contract("peer0.org2", "basic", None)
        .await
        .unwrap();
    assert_eq!(defined.smart_contract_name, "basic");
    assert_eq!(defined.smart_contract_version, "1.2");
    assert_eq!(defined.sequence, 3);
    assert_eq!(defined.approvals.len(), 2);

    let args = proposal_args(&transport.proposals()[0].1);
    let query = QueryChaincodeDefinitionArgs::decode(args[1].as_slice()).unwrap();
    assert_eq!(query.name, "basic");
}

#[tokio::test]
async fn test_all_committed_smart_contracts() {
    let transport = MockTransport::new();
    transport.respond(
        "peer0.org1",
        QueryChaincodeDefinitionsResult {
            chaincode_definitions: vec![
                ChaincodeDefinition {
                    name: "basic".to_string(),
                    sequence: 1,
                    version: "1.0".to_string(),
                    ..Default::default()
                },
                ChaincodeDefinition {
                    name: "marbles".to_string(),
                    sequence: 4,
                    version: "2.1".to_string(),
                    init_required: true,
                    ..Default::default()
                },
            ],
        }
        .encode_to_vec(),
    );

    let defined = channel(&transport)
        .await
        .get_all_committed_smart_contracts("peer0.org1", None)
        .await
        .unwrap();
    let names: Vec<&str> = defined.iter().map(|d| d.smart_contract_name.as_str()).collect();
    assert_eq!(names, vec!["basic", "marbles"]);
    assert!(defined[1].init_required);
    assert!(defined[1].approvals.is_empty());
}

#[tokio::test]
async fn test_query_unknown_peer() {
    let transport = MockTransport::new();
    let err = channel(&transport)
        .await
        .get_all_committed_smart_contracts("peer9", None)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "peer 'peer9' not found");
}

#[test]
fn test_static_helpers() {
    assert!(LifecycleChannel::collection_config(&[]).is_err());
    let bytes = LifecycleChannel::collection_config(&[
        CollectionDescriptor::new("c1", "OR('Org1MSP.member')").with_peer_counts(0, 1)
    ])
    .unwrap();
    assert!(!bytes.is_empty());

    let err = LifecycleChannel::endorsement_policy_bytes("OR(").unwrap_err();
    assert!(matches!(err, LifecycleError::PolicyParse(_)));
}
