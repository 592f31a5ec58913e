//! Channel-scoped lifecycle operations
//!
//! Approve and commit are endorsed by exactly the named peers and ordered by
//! the named orderer. Readiness and definition queries go to a single peer.
//! Nothing is cached between calls; each call reads the network again.

use std::collections::BTreeMap;
use std::time::Duration;

use prost::Message;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::collection::{self, CollectionDescriptor};
use crate::error::{LifecycleError, Result};
use crate::identity::Credential;
use crate::lifecycle::Lifecycle;
use crate::policy::EndorsementPolicy;
use crate::proposal::{self, LIFECYCLE_CHAINCODE};
use crate::protos::collection::CollectionConfigPackage;
use crate::protos::lifecycle::{
    chaincode_source, ApproveChaincodeDefinitionForMyOrgArgs, ChaincodeDefinition, ChaincodeSource,
    CheckCommitReadinessArgs, CheckCommitReadinessResult, CommitChaincodeDefinitionArgs,
    QueryChaincodeDefinitionArgs, QueryChaincodeDefinitionResult, QueryChaincodeDefinitionsArgs,
    QueryChaincodeDefinitionsResult,
};
use crate::session::Session;

const APPROVE: &str = "ApproveChaincodeDefinitionForMyOrg";
const COMMIT: &str = "CommitChaincodeDefinition";
const CHECK_COMMIT_READINESS: &str = "CheckCommitReadiness";
const QUERY_DEFINITION: &str = "QueryChaincodeDefinition";
const QUERY_DEFINITIONS: &str = "QueryChaincodeDefinitions";

/// Smart contract definition to approve, commit or check
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SmartContractDefinitionOptions {
    pub sequence: i64,
    pub smart_contract_name: String,
    pub smart_contract_version: String,
    /// Installed package to run; absent approves with the package unavailable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package_id: Option<String>,
    /// Policy expression or channel policy name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endorsement_policy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endorsement_plugin: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation_plugin: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection_config: Option<Vec<CollectionDescriptor>>,
    pub init_required: bool,
}

impl SmartContractDefinitionOptions {
    pub fn new(name: impl Into<String>, version: impl Into<String>, sequence: i64) -> Self {
        Self {
            sequence,
            smart_contract_name: name.into(),
            smart_contract_version: version.into(),
            ..Default::default()
        }
    }

    pub fn with_package_id(mut self, package_id: impl Into<String>) -> Self {
        self.package_id = Some(package_id.into());
        self
    }

    pub fn with_endorsement_policy(mut self, policy: impl Into<String>) -> Self {
        self.endorsement_policy = Some(policy.into());
        self
    }

    pub fn with_collections(mut self, collections: Vec<CollectionDescriptor>) -> Self {
        self.collection_config = Some(collections);
        self
    }

    pub fn with_init_required(mut self, init_required: bool) -> Self {
        self.init_required = init_required;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.sequence <= 0 {
            return Err(LifecycleError::validation("missing option sequence"));
        }
        if self.smart_contract_name.is_empty() {
            return Err(LifecycleError::validation("missing option smartContractName"));
        }
        if self.smart_contract_version.is_empty() {
            return Err(LifecycleError::validation("missing option smartContractVersion"));
        }
        Ok(())
    }

    /// Validate and encode the fields shared by every definition argument.
    fn definition(&self) -> Result<Definition> {
        self.validate()?;
        let validation_parameter = match &self.endorsement_policy {
            Some(policy) => LifecycleChannel::endorsement_policy_bytes(policy)?,
            None => Vec::new(),
        };
        let collections = match &self.collection_config {
            Some(descriptors) => Some(collection::build(descriptors)?),
            None => None,
        };

        Ok(Definition {
            sequence: self.sequence,
            name: self.smart_contract_name.clone(),
            version: self.smart_contract_version.clone(),
            endorsement_plugin: self.endorsement_plugin.clone().unwrap_or_default(),
            validation_plugin: self.validation_plugin.clone().unwrap_or_default(),
            validation_parameter,
            collections,
            init_required: self.init_required,
        })
    }
}

#[derive(Debug)]
struct Definition {
    sequence: i64,
    name: String,
    version: String,
    endorsement_plugin: String,
    validation_plugin: String,
    validation_parameter: Vec<u8>,
    collections: Option<CollectionConfigPackage>,
    init_required: bool,
}

/// Committed smart contract definition as reported by a peer
#[derive(Debug, Clone, PartialEq)]
pub struct DefinedSmartContract {
    pub smart_contract_name: String,
    pub smart_contract_version: String,
    pub sequence: i64,
    pub endorsement_plugin: String,
    pub validation_plugin: String,
    /// Encoded `ApplicationPolicy`
    pub endorsement_policy: Vec<u8>,
    pub collection_config: Option<CollectionConfigPackage>,
    pub init_required: bool,
    /// Organization to approval state; only filled for single-definition queries
    pub approvals: BTreeMap<String, bool>,
}

impl DefinedSmartContract {
    fn from_query(name: &str, result: QueryChaincodeDefinitionResult) -> Self {
        Self {
            smart_contract_name: name.to_string(),
            smart_contract_version: result.version,
            sequence: result.sequence,
            endorsement_plugin: result.endorsement_plugin,
            validation_plugin: result.validation_plugin,
            endorsement_policy: result.validation_parameter,
            collection_config: result.collections,
            init_required: result.init_required,
            approvals: result.approvals,
        }
    }
}

impl From<ChaincodeDefinition> for DefinedSmartContract {
    fn from(definition: ChaincodeDefinition) -> Self {
        Self {
            smart_contract_name: definition.name,
            smart_contract_version: definition.version,
            sequence: definition.sequence,
            endorsement_plugin: definition.endorsement_plugin,
            validation_plugin: definition.validation_plugin,
            endorsement_policy: definition.validation_parameter,
            collection_config: definition.collections,
            init_required: definition.init_required,
            approvals: BTreeMap::new(),
        }
    }
}

/// One channel bound to one credential
pub struct LifecycleChannel {
    lifecycle: Lifecycle,
    name: String,
    credential: Credential,
}

impl LifecycleChannel {
    pub(crate) fn new(lifecycle: Lifecycle, name: impl Into<String>, credential: Credential) -> Self {
        Self {
            lifecycle,
            name: name.into(),
            credential,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Encoded `ApplicationPolicy` for an expression or channel policy name.
    pub fn endorsement_policy_bytes(policy: &str) -> Result<Vec<u8>> {
        Ok(EndorsementPolicy::parse(policy)?.to_bytes())
    }

    /// Encoded `CollectionConfigPackage` for a list of collections.
    pub fn collection_config(descriptors: &[CollectionDescriptor]) -> Result<Vec<u8>> {
        Ok(collection::build_bytes(descriptors)?)
    }

    /// Approve a definition for the credential's organization.
    pub async fn approve_smart_contract_definition(
        &self,
        peer_names: &[&str],
        orderer_name: &str,
        options: &SmartContractDefinitionOptions,
        timeout: Option<Duration>,
    ) -> Result<()> {
        check_submit_targets(peer_names, orderer_name)?;
        let definition = options.definition()?;

        let source = match options.package_id.as_deref() {
            Some(package_id) if !package_id.is_empty() => {
                chaincode_source::Type::LocalPackage(chaincode_source::Local {
                    package_id: package_id.to_string(),
                })
            }
            _ => chaincode_source::Type::Unavailable(chaincode_source::Unavailable {}),
        };

        let args = ApproveChaincodeDefinitionForMyOrgArgs {
            sequence: definition.sequence,
            name: definition.name,
            version: definition.version,
            endorsement_plugin: definition.endorsement_plugin,
            validation_plugin: definition.validation_plugin,
            validation_parameter: definition.validation_parameter,
            collections: definition.collections,
            init_required: definition.init_required,
            source: Some(ChaincodeSource {
                r#type: Some(source),
            }),
        };

        self.submit(APPROVE, args.encode_to_vec(), peer_names, orderer_name, options, timeout)
            .await
    }

    /// Commit a definition once enough organizations have approved it.
    pub async fn commit_smart_contract_definition(
        &self,
        peer_names: &[&str],
        orderer_name: &str,
        options: &SmartContractDefinitionOptions,
        timeout: Option<Duration>,
    ) -> Result<()> {
        check_submit_targets(peer_names, orderer_name)?;
        let definition = options.definition()?;

        let args = CommitChaincodeDefinitionArgs {
            sequence: definition.sequence,
            name: definition.name,
            version: definition.version,
            endorsement_plugin: definition.endorsement_plugin,
            validation_plugin: definition.validation_plugin,
            validation_parameter: definition.validation_parameter,
            collections: definition.collections,
            init_required: definition.init_required,
        };

        self.submit(COMMIT, args.encode_to_vec(), peer_names, orderer_name, options, timeout)
            .await
    }

    /// Approval state of every organization for a definition.
    pub async fn get_commit_readiness(
        &self,
        peer_name: &str,
        options: &SmartContractDefinitionOptions,
        timeout: Option<Duration>,
    ) -> Result<BTreeMap<String, bool>> {
        let definition = options.definition()?;
        let args = CheckCommitReadinessArgs {
            sequence: definition.sequence,
            name: definition.name,
            version: definition.version,
            endorsement_plugin: definition.endorsement_plugin,
            validation_plugin: definition.validation_plugin,
            validation_parameter: definition.validation_parameter,
            collections: definition.collections,
            init_required: definition.init_required,
        };

        let payload = self
            .evaluate(peer_name, CHECK_COMMIT_READINESS, args.encode_to_vec(), timeout)
            .await?;
        Ok(CheckCommitReadinessResult::decode(payload.as_slice())?.approvals)
    }

    pub async fn get_all_committed_smart_contracts(
        &self,
        peer_name: &str,
        timeout: Option<Duration>,
    ) -> Result<Vec<DefinedSmartContract>> {
        let args = QueryChaincodeDefinitionsArgs {};
        let payload = self
            .evaluate(peer_name, QUERY_DEFINITIONS, args.encode_to_vec(), timeout)
            .await?;

        let result = QueryChaincodeDefinitionsResult::decode(payload.as_slice())?;
        Ok(result
            .chaincode_definitions
            .into_iter()
            .map(DefinedSmartContract::from)
            .collect())
    }

    /// Committed definition of one smart contract, with its approvals.
    pub async fn get_committed_smart_contract(
        &self,
        peer_name: &str,
        smart_contract_name: &str,
        timeout: Option<Duration>,
    ) -> Result<DefinedSmartContract> {
        if smart_contract_name.is_empty() {
            return Err(LifecycleError::validation("parameter smartContractName is missing"));
        }

        let args = QueryChaincodeDefinitionArgs {
            name: smart_contract_name.to_string(),
        };
        let payload = self
            .evaluate(peer_name, QUERY_DEFINITION, args.encode_to_vec(), timeout)
            .await?;

        let result = QueryChaincodeDefinitionResult::decode(payload.as_slice())?;
        Ok(DefinedSmartContract::from_query(smart_contract_name, result))
    }

    async fn evaluate(
        &self,
        peer_name: &str,
        function: &str,
        args: Vec<u8>,
        timeout: Option<Duration>,
    ) -> Result<Vec<u8>> {
        if peer_name.is_empty() {
            return Err(LifecycleError::validation("parameter peerName is missing"));
        }
        let peer = self.lifecycle.peer_descriptor(peer_name)?.connection_options();
        let ctx = self.credential.signing_context().await?;
        let prepared = proposal::prepare(&ctx, &self.name, LIFECYCLE_CHAINCODE, function, vec![args])?;

        let mut session = Session::new(self.lifecycle.transport(), timeout);
        let result = async {
            session.add_endorser(&peer).await?;
            session.evaluate(&prepared).await
        }
        .await;
        session.close().await;
        result
    }

    /// Endorse on every named peer and order through the named orderer.
    ///
    /// Failures after validation are reported as `<function> failed: <cause>`.
    async fn submit(
        &self,
        function: &'static str,
        args: Vec<u8>,
        peer_names: &[&str],
        orderer_name: &str,
        options: &SmartContractDefinitionOptions,
        timeout: Option<Duration>,
    ) -> Result<()> {
        let peers = peer_names
            .iter()
            .map(|name| self.lifecycle.peer_descriptor(name).map(|d| d.connection_options()))
            .collect::<Result<Vec<_>>>()?;
        let orderer = self.lifecycle.orderer_descriptor(orderer_name)?.connection_options();

        let ctx = self
            .credential
            .signing_context()
            .await
            .map_err(|e| e.during(function))?;
        let prepared = proposal::prepare(&ctx, &self.name, LIFECYCLE_CHAINCODE, function, vec![args])
            .map_err(|e| e.during(function))?;

        info!(
            channel = %self.name,
            smart_contract = %options.smart_contract_name,
            sequence = options.sequence,
            peers = ?peer_names,
            orderer = %orderer_name,
            tx_id = %prepared.tx_id,
            "Submitting {}", function
        );

        let mut session = Session::new(self.lifecycle.transport(), timeout);
        let result = async {
            for peer in &peers {
                session.add_endorser(peer).await?;
            }
            session.set_committer(&orderer).await?;
            session.submit(&ctx, &prepared).await
        }
        .await;
        session.close().await;

        match result {
            Ok(()) => {
                info!(
                    channel = %self.name,
                    smart_contract = %options.smart_contract_name,
                    sequence = options.sequence,
                    tx_id = %prepared.tx_id,
                    "{} submitted", function
                );
                Ok(())
            }
            Err(e) => {
                warn!(
                    channel = %self.name,
                    smart_contract = %options.smart_contract_name,
                    tx_id = %prepared.tx_id,
                    error = %e,
                    "{} failed", function
                );
                Err(e.during(function))
            }
        }
    }
}

fn check_submit_targets(peer_names: &[&str], orderer_name: &str) -> Result<()> {
    if peer_names.is_empty() {
        return Err(LifecycleError::validation("parameter peerNames is missing"));
    }
    if orderer_name.is_empty() {
        return Err(LifecycleError::validation("parameter ordererName is missing"));
    }
    Ok(())
}
