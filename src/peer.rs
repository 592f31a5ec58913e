//! Peer-scoped lifecycle operations
//!
//! Each operation opens a connection to the peer, sends one signed
//! proposal, decodes the result and closes the connection.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use prost::Message;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{LifecycleError, Result};
use crate::identity::Credential;
use crate::proposal::{self, CONFIG_CHAINCODE, LIFECYCLE_CHAINCODE};
use crate::protos::common::{Capabilities, Config};
use crate::protos::lifecycle::{
    GetInstalledChaincodePackageArgs, GetInstalledChaincodePackageResult, InstallChaincodeArgs,
    InstallChaincodeResult, InstalledChaincode, QueryInstalledChaincodeArgs,
    QueryInstalledChaincodeResult, QueryInstalledChaincodesArgs, QueryInstalledChaincodesResult,
    References,
};
use crate::protos::peer::ChannelQueryResponse;
use crate::session::Session;
use crate::transport::{ConnectionOptions, Transport};

/// Smart contract definition on a channel that uses an installed package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmartContractReference {
    pub name: String,
    pub version: String,
}

/// Package installed on a peer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstalledSmartContract {
    pub package_id: String,
    pub label: String,
    /// Channel name to the definitions referencing this package
    pub references: BTreeMap<String, Vec<SmartContractReference>>,
}

fn references(references: BTreeMap<String, References>) -> BTreeMap<String, Vec<SmartContractReference>> {
    references
        .into_iter()
        .map(|(channel, refs)| {
            let contracts = refs
                .chaincodes
                .into_iter()
                .map(|cc| SmartContractReference {
                    name: cc.name,
                    version: cc.version,
                })
                .collect();
            (channel, contracts)
        })
        .collect()
}

impl From<InstalledChaincode> for InstalledSmartContract {
    fn from(cc: InstalledChaincode) -> Self {
        Self {
            package_id: cc.package_id,
            label: cc.label,
            references: references(cc.references),
        }
    }
}

impl From<QueryInstalledChaincodeResult> for InstalledSmartContract {
    fn from(cc: QueryInstalledChaincodeResult) -> Self {
        Self {
            package_id: cc.package_id,
            label: cc.label,
            references: references(cc.references),
        }
    }
}

/// One endorsing peer bound to one credential
pub struct LifecyclePeer {
    options: ConnectionOptions,
    msp_id: String,
    transport: Arc<dyn Transport>,
    credential: Option<Credential>,
}

impl LifecyclePeer {
    /// Create an unbound handle; bind a credential before calling the peer.
    pub fn new(options: ConnectionOptions, msp_id: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        Self {
            options,
            msp_id: msp_id.into(),
            transport,
            credential: None,
        }
    }

    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.credential = Some(credential);
        self
    }

    pub fn set_credential(&mut self, credential: Credential) {
        self.credential = Some(credential);
    }

    pub fn name(&self) -> &str {
        &self.options.name
    }

    pub fn msp_id(&self) -> &str {
        &self.msp_id
    }

    pub fn connection_options(&self) -> &ConnectionOptions {
        &self.options
    }

    fn credential(&self) -> Result<&Credential> {
        self.credential.as_ref().ok_or(LifecycleError::MissingCredential)
    }

    /// Send one proposal to this peer and return the chaincode result bytes.
    async fn evaluate(
        &self,
        channel: &str,
        chaincode: &str,
        function: &str,
        args: Vec<Vec<u8>>,
        timeout: Option<Duration>,
    ) -> Result<Vec<u8>> {
        let ctx = self.credential()?.signing_context().await?;
        let prepared = proposal::prepare(&ctx, channel, chaincode, function, args)?;
        debug!(peer = %self.options.name, tx_id = %prepared.tx_id, function, "Evaluating on peer");

        let mut session = Session::new(Arc::clone(&self.transport), timeout);
        let result = async {
            session.add_endorser(&self.options).await?;
            session.evaluate(&prepared).await
        }
        .await;
        session.close().await;
        result
    }

    /// Install a chaincode package and return its package id.
    pub async fn install_smart_contract_package(&self, package: &[u8], timeout: Option<Duration>) -> Result<String> {
        if package.is_empty() {
            return Err(LifecycleError::validation("parameter contractPackage is missing"));
        }
        self.credential()?;

        info!(peer = %self.options.name, size = package.len(), "Installing smart contract package");
        let args = InstallChaincodeArgs {
            chaincode_install_package: package.to_vec(),
        };

        let payload = self
            .evaluate(
                "",
                LIFECYCLE_CHAINCODE,
                "InstallChaincode",
                vec![args.encode_to_vec()],
                timeout,
            )
            .await
            .map_err(|e| {
                warn!(peer = %self.options.name, error = %e, "Smart contract install failed");
                match e {
                    LifecycleError::MissingCredential | LifecycleError::IdentityNotFound(_) => e,
                    other => LifecycleError::Install(other.to_string()),
                }
            })?;

        let result = InstallChaincodeResult::decode(payload.as_slice())
            .map_err(|e| LifecycleError::Install(format!("invalid install response: {}", e)))?;
        info!(
            peer = %self.options.name,
            package_id = %result.package_id,
            label = %result.label,
            "Smart contract package installed"
        );
        Ok(result.package_id)
    }

    /// Every package installed on this peer, regardless of channel.
    pub async fn get_all_installed_smart_contracts(&self, timeout: Option<Duration>) -> Result<Vec<InstalledSmartContract>> {
        let args = QueryInstalledChaincodesArgs {};
        let payload = self
            .evaluate(
                "",
                LIFECYCLE_CHAINCODE,
                "QueryInstalledChaincodes",
                vec![args.encode_to_vec()],
                timeout,
            )
            .await?;

        let result = QueryInstalledChaincodesResult::decode(payload.as_slice())?;
        Ok(result
            .installed_chaincodes
            .into_iter()
            .map(InstalledSmartContract::from)
            .collect())
    }

    pub async fn get_installed_smart_contract(&self, package_id: &str, timeout: Option<Duration>) -> Result<InstalledSmartContract> {
        if package_id.is_empty() {
            return Err(LifecycleError::validation("parameter packageId is missing"));
        }

        let args = QueryInstalledChaincodeArgs {
            package_id: package_id.to_string(),
        };
        let payload = self
            .evaluate(
                "",
                LIFECYCLE_CHAINCODE,
                "QueryInstalledChaincode",
                vec![args.encode_to_vec()],
                timeout,
            )
            .await?;

        Ok(QueryInstalledChaincodeResult::decode(payload.as_slice())?.into())
    }

    /// Raw bytes of a previously installed package.
    pub async fn get_installed_smart_contract_package(&self, package_id: &str, timeout: Option<Duration>) -> Result<Vec<u8>> {
        if package_id.is_empty() {
            return Err(LifecycleError::validation("parameter packageId is missing"));
        }

        let args = GetInstalledChaincodePackageArgs {
            package_id: package_id.to_string(),
        };
        let payload = self
            .evaluate(
                "",
                LIFECYCLE_CHAINCODE,
                "GetInstalledChaincodePackage",
                vec![args.encode_to_vec()],
                timeout,
            )
            .await?;

        let result = GetInstalledChaincodePackageResult::decode(payload.as_slice())?;
        Ok(result.chaincode_install_package)
    }

    /// Names of the channels this peer has joined.
    pub async fn get_all_channel_names(&self, timeout: Option<Duration>) -> Result<Vec<String>> {
        let payload = self
            .evaluate("", CONFIG_CHAINCODE, "GetChannels", vec![], timeout)
            .await?;

        let result = ChannelQueryResponse::decode(payload.as_slice())?;
        Ok(result.channels.into_iter().map(|c| c.channel_id).collect())
    }

    /// Application capabilities enabled on a channel, e.g. `V2_0`.
    pub async fn get_channel_capabilities(&self, channel_name: &str, timeout: Option<Duration>) -> Result<Vec<String>> {
        if channel_name.is_empty() {
            return Err(LifecycleError::validation("parameter channelName is missing"));
        }

        let payload = self
            .evaluate(
                "",
                CONFIG_CHAINCODE,
                "GetChannelConfig",
                vec![channel_name.as_bytes().to_vec()],
                timeout,
            )
            .await?;

        application_capabilities(&payload)
    }
}

/// Capability names under `Application/Capabilities` in a channel config.
fn application_capabilities(config: &[u8]) -> Result<Vec<String>> {
    let config = Config::decode(config)?;
    let value = config
        .channel_group
        .as_ref()
        .and_then(|group| group.groups.get("Application"))
        .and_then(|application| application.values.get("Capabilities"));

    match value {
        Some(value) => {
            let capabilities = Capabilities::decode(value.value.as_slice())?;
            Ok(capabilities.capabilities.into_keys().collect())
        }
        None => Ok(Vec::new()),
    }
}
