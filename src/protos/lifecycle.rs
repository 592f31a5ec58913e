//! `lifecycle` package: arguments and results of the `_lifecycle` system chaincode

use std::collections::BTreeMap;

use super::collection::CollectionConfigPackage;

#[derive(Clone, PartialEq, prost::Message)]
pub struct InstallChaincodeArgs {
    #[prost(bytes = "vec", tag = "1")]
    pub chaincode_install_package: Vec<u8>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct InstallChaincodeResult {
    #[prost(string, tag = "1")]
    pub package_id: String,
    #[prost(string, tag = "2")]
    pub label: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct QueryInstalledChaincodeArgs {
    #[prost(string, tag = "1")]
    pub package_id: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct QueryInstalledChaincodeResult {
    #[prost(string, tag = "1")]
    pub package_id: String,
    #[prost(string, tag = "2")]
    pub label: String,
    #[prost(btree_map = "string, message", tag = "3")]
    pub references: BTreeMap<String, References>,
}

/// Chaincodes on one channel that reference an installed package
#[derive(Clone, PartialEq, prost::Message)]
pub struct References {
    #[prost(message, repeated, tag = "1")]
    pub chaincodes: Vec<ChaincodeReference>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ChaincodeReference {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(string, tag = "2")]
    pub version: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct GetInstalledChaincodePackageArgs {
    #[prost(string, tag = "1")]
    pub package_id: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct GetInstalledChaincodePackageResult {
    #[prost(bytes = "vec", tag = "1")]
    pub chaincode_install_package: Vec<u8>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct QueryInstalledChaincodesArgs {}

#[derive(Clone, PartialEq, prost::Message)]
pub struct QueryInstalledChaincodesResult {
    #[prost(message, repeated, tag = "1")]
    pub installed_chaincodes: Vec<InstalledChaincode>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct InstalledChaincode {
    #[prost(string, tag = "1")]
    pub package_id: String,
    #[prost(string, tag = "2")]
    pub label: String,
    #[prost(btree_map = "string, message", tag = "3")]
    pub references: BTreeMap<String, References>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ApproveChaincodeDefinitionForMyOrgArgs {
    #[prost(int64, tag = "1")]
    pub sequence: i64,
    #[prost(string, tag = "2")]
    pub name: String,
    #[prost(string, tag = "3")]
    pub version: String,
    #[prost(string, tag = "4")]
    pub endorsement_plugin: String,
    #[prost(string, tag = "5")]
    pub validation_plugin: String,
    #[prost(bytes = "vec", tag = "6")]
    pub validation_parameter: Vec<u8>,
    #[prost(message, optional, tag = "7")]
    pub collections: Option<CollectionConfigPackage>,
    #[prost(bool, tag = "8")]
    pub init_required: bool,
    #[prost(message, optional, tag = "9")]
    pub source: Option<ChaincodeSource>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ChaincodeSource {
    #[prost(oneof = "chaincode_source::Type", tags = "1, 2")]
    pub r#type: Option<chaincode_source::Type>,
}

pub mod chaincode_source {
    #[derive(Clone, PartialEq, prost::Message)]
    pub struct Unavailable {}

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct Local {
        #[prost(string, tag = "1")]
        pub package_id: String,
    }

    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Type {
        #[prost(message, tag = "1")]
        Unavailable(Unavailable),
        #[prost(message, tag = "2")]
        LocalPackage(Local),
    }
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct CommitChaincodeDefinitionArgs {
    #[prost(int64, tag = "1")]
    pub sequence: i64,
    #[prost(string, tag = "2")]
    pub name: String,
    #[prost(string, tag = "3")]
    pub version: String,
    #[prost(string, tag = "4")]
    pub endorsement_plugin: String,
    #[prost(string, tag = "5")]
    pub validation_plugin: String,
    #[prost(bytes = "vec", tag = "6")]
    pub validation_parameter: Vec<u8>,
    #[prost(message, optional, tag = "7")]
    pub collections: Option<CollectionConfigPackage>,
    #[prost(bool, tag = "8")]
    pub init_required: bool,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct CheckCommitReadinessArgs {
    #[prost(int64, tag = "1")]
    pub sequence: i64,
    #[prost(string, tag = "2")]
    pub name: String,
    #[prost(string, tag = "3")]
    pub version: String,
    #[prost(string, tag = "4")]
    pub endorsement_plugin: String,
    #[prost(string, tag = "5")]
    pub validation_plugin: String,
    #[prost(bytes = "vec", tag = "6")]
    pub validation_parameter: Vec<u8>,
    #[prost(message, optional, tag = "7")]
    pub collections: Option<CollectionConfigPackage>,
    #[prost(bool, tag = "8")]
    pub init_required: bool,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct CheckCommitReadinessResult {
    #[prost(btree_map = "string, bool", tag = "1")]
    pub approvals: BTreeMap<String, bool>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct QueryChaincodeDefinitionArgs {
    #[prost(string, tag = "1")]
    pub name: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct QueryChaincodeDefinitionResult {
    #[prost(int64, tag = "1")]
    pub sequence: i64,
    #[prost(string, tag = "2")]
    pub version: String,
    #[prost(string, tag = "3")]
    pub endorsement_plugin: String,
    #[prost(string, tag = "4")]
    pub validation_plugin: String,
    #[prost(bytes = "vec", tag = "5")]
    pub validation_parameter: Vec<u8>,
    #[prost(message, optional, tag = "6")]
    pub collections: Option<CollectionConfigPackage>,
    #[prost(bool, tag = "7")]
    pub init_required: bool,
    #[prost(btree_map = "string, bool", tag = "8")]
    pub approvals: BTreeMap<String, bool>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct QueryChaincodeDefinitionsArgs {}

#[derive(Clone, PartialEq, prost::Message)]
pub struct QueryChaincodeDefinitionsResult {
    #[prost(message, repeated, tag = "1")]
    pub chaincode_definitions: Vec<ChaincodeDefinition>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ChaincodeDefinition {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(int64, tag = "2")]
    pub sequence: i64,
    #[prost(string, tag = "3")]
    pub version: String,
    #[prost(string, tag = "4")]
    pub endorsement_plugin: String,
    #[prost(string, tag = "5")]
    pub validation_plugin: String,
    #[prost(bytes = "vec", tag = "6")]
    pub validation_parameter: Vec<u8>,
    #[prost(message, optional, tag = "7")]
    pub collections: Option<CollectionConfigPackage>,
    #[prost(bool, tag = "8")]
    pub init_required: bool,
}
