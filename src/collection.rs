//! Private data collection configuration
//!
//! Validates collection descriptors and assembles the
//! `CollectionConfigPackage` carried by approve, commit and commit-readiness
//! arguments.

use std::collections::HashSet;

use prost::Message;
use serde::{Deserialize, Serialize};

use crate::error::PolicyParseError;
use crate::policy::{self, CompiledPolicy, EndorsementPolicy};
use crate::protos::collection::{
    collection_config, collection_policy_config, CollectionConfig, CollectionConfigPackage,
    CollectionPolicyConfig, StaticCollectionConfig,
};

/// Collection descriptor as supplied by the caller
///
/// Every field is optional so that missing input is reported by
/// [`validate`] with a field-specific message instead of a generic
/// deserialization error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionDescriptor {
    pub name: Option<String>,
    /// Member read/write policy expression
    pub policy: Option<String>,
    pub required_peer_count: Option<i64>,
    pub max_peer_count: Option<i64>,
    /// Blocks to retain private data for, 0 keeps it forever
    pub block_to_live: Option<i64>,
    pub member_only_read: Option<bool>,
    pub member_only_write: Option<bool>,
    /// Collection-level endorsement policy: expression or channel policy name
    pub endorsement_policy: Option<String>,
}

impl CollectionDescriptor {
    pub fn new(name: impl Into<String>, policy: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            policy: Some(policy.into()),
            ..Default::default()
        }
    }

    pub fn with_peer_counts(mut self, required: i64, max: i64) -> Self {
        self.required_peer_count = Some(required);
        self.max_peer_count = Some(max);
        self
    }

    pub fn with_block_to_live(mut self, blocks: i64) -> Self {
        self.block_to_live = Some(blocks);
        self
    }

    pub fn with_member_only(mut self, read: bool, write: bool) -> Self {
        self.member_only_read = Some(read);
        self.member_only_write = Some(write);
        self
    }

    pub fn with_endorsement_policy(mut self, policy: impl Into<String>) -> Self {
        self.endorsement_policy = Some(policy.into());
        self
    }
}

/// A descriptor that passed validation, with defaults applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedCollection {
    pub name: String,
    pub policy: String,
    pub required_peer_count: i32,
    pub max_peer_count: i32,
    pub block_to_live: u64,
    pub member_only_read: bool,
    pub member_only_write: bool,
    pub endorsement_policy: Option<String>,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CollectionConfigError {
    #[error("collection config is empty")]
    EmptyCollectionConfig,

    #[error("collection config requires param \"name\" of type non-empty string")]
    MissingName,

    #[error("collection config \"{collection}\" requires param \"policy\"")]
    MissingPolicy { collection: String },

    #[error("collection config \"{collection}\" requires param \"maxPeerCount\" of type non-negative int32")]
    InvalidMaxPeerCount { collection: String },

    #[error("collection config \"{collection}\" requires param \"requiredPeerCount\" of type non-negative int32")]
    InvalidRequiredPeerCount { collection: String },

    #[error("collection config \"{collection}\" requires param \"maxPeerCount\" bigger than \"requiredPeerCount\", found maxPeerCount=={max}, requiredPeerCount=={required}")]
    MaxBelowRequired {
        collection: String,
        max: i64,
        required: i64,
    },

    #[error("collection config \"{collection}\" requires param \"blockToLive\" of type non-negative integer, found {found}")]
    InvalidBlockToLive { collection: String, found: String },

    #[error("collection config \"{collection}\" requires param \"memberOnlyRead\" of type boolean")]
    InvalidMemberOnlyRead { collection: String },

    #[error("collection config \"{collection}\" requires param \"memberOnlyWrite\" of type boolean")]
    InvalidMemberOnlyWrite { collection: String },

    #[error("collection config \"{collection}\" requires param \"endorsementPolicy\" of type string")]
    InvalidEndorsementPolicy { collection: String },

    #[error("collection names must be unique, found \"{0}\" more than once")]
    DuplicateName(String),

    #[error("collection config \"{collection}\" has an invalid policy: {source}")]
    Policy {
        collection: String,
        #[source]
        source: PolicyParseError,
    },
}

fn peer_count(value: Option<i64>) -> Option<i32> {
    value.and_then(|v| i32::try_from(v).ok()).filter(|v| *v >= 0)
}

/// Check a descriptor field by field; the first failing rule wins.
pub fn validate(descriptor: &CollectionDescriptor) -> Result<ValidatedCollection, CollectionConfigError> {
    let name = match descriptor.name.as_deref() {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => return Err(CollectionConfigError::MissingName),
    };

    let policy = match descriptor.policy.as_deref() {
        Some(policy) if !policy.trim().is_empty() => policy.to_string(),
        _ => return Err(CollectionConfigError::MissingPolicy { collection: name }),
    };

    let max_peer_count = peer_count(descriptor.max_peer_count).ok_or_else(|| {
        CollectionConfigError::InvalidMaxPeerCount {
            collection: name.clone(),
        }
    })?;

    let required_peer_count = peer_count(descriptor.required_peer_count).ok_or_else(|| {
        CollectionConfigError::InvalidRequiredPeerCount {
            collection: name.clone(),
        }
    })?;

    if max_peer_count < required_peer_count {
        return Err(CollectionConfigError::MaxBelowRequired {
            collection: name,
            max: max_peer_count.into(),
            required: required_peer_count.into(),
        });
    }

    let block_to_live = match descriptor.block_to_live {
        None => 0,
        Some(blocks) if blocks >= 0 => blocks as u64,
        Some(found) => {
            return Err(CollectionConfigError::InvalidBlockToLive {
                collection: name,
                found: found.to_string(),
            })
        }
    };

    Ok(ValidatedCollection {
        name,
        policy,
        required_peer_count,
        max_peer_count,
        block_to_live,
        member_only_read: descriptor.member_only_read.unwrap_or(false),
        member_only_write: descriptor.member_only_write.unwrap_or(false),
        endorsement_policy: descriptor.endorsement_policy.clone(),
    })
}

/// Validate loosely-typed JSON input, reporting type mismatches with the
/// same field-specific errors and the same rule order as [`validate`].
pub fn validate_json(value: &serde_json::Value) -> Result<ValidatedCollection, CollectionConfigError> {
    let field = |key: &str| value.get(key).filter(|v| !v.is_null());
    let name = field("name").and_then(|v| v.as_str()).unwrap_or_default().to_string();
    let collection = || name.clone();

    let mut descriptor = CollectionDescriptor {
        name: Some(name.clone()),
        policy: field("policy").and_then(|v| v.as_str()).map(str::to_string),
        ..Default::default()
    };
    if name.is_empty() {
        return Err(CollectionConfigError::MissingName);
    }
    if descriptor.policy.is_none() {
        return Err(CollectionConfigError::MissingPolicy {
            collection: collection(),
        });
    }

    descriptor.max_peer_count = Some(field("maxPeerCount").and_then(|v| v.as_i64()).ok_or_else(|| {
        CollectionConfigError::InvalidMaxPeerCount {
            collection: collection(),
        }
    })?);
    descriptor.required_peer_count =
        Some(field("requiredPeerCount").and_then(|v| v.as_i64()).ok_or_else(|| {
            CollectionConfigError::InvalidRequiredPeerCount {
                collection: collection(),
            }
        })?);

    // Count bounds are checked before the remaining fields are type-checked
    validate(&descriptor)?;

    descriptor.block_to_live = match field("blockToLive") {
        None => None,
        Some(v) => Some(v.as_i64().ok_or_else(|| CollectionConfigError::InvalidBlockToLive {
            collection: collection(),
            found: v.to_string(),
        })?),
    };
    descriptor.member_only_read = match field("memberOnlyRead") {
        None => None,
        Some(v) => Some(v.as_bool().ok_or_else(|| CollectionConfigError::InvalidMemberOnlyRead {
            collection: collection(),
        })?),
    };
    descriptor.member_only_write = match field("memberOnlyWrite") {
        None => None,
        Some(v) => Some(v.as_bool().ok_or_else(|| CollectionConfigError::InvalidMemberOnlyWrite {
            collection: collection(),
        })?),
    };
    descriptor.endorsement_policy = match field("endorsementPolicy") {
        None => None,
        Some(v) => Some(
            v.as_str()
                .ok_or_else(|| CollectionConfigError::InvalidEndorsementPolicy {
                    collection: collection(),
                })?
                .to_string(),
        ),
    };

    validate(&descriptor)
}

impl ValidatedCollection {
    /// Compile policies and produce the wire form of this collection.
    pub fn to_static_config(&self) -> Result<StaticCollectionConfig, CollectionConfigError> {
        let member_policy = self.compile(&self.policy)?;
        let endorsement_policy = self
            .endorsement_policy
            .as_deref()
            .map(|policy| {
                EndorsementPolicy::parse(policy).map_err(|source| CollectionConfigError::Policy {
                    collection: self.name.clone(),
                    source,
                })
            })
            .transpose()?;

        Ok(StaticCollectionConfig {
            name: self.name.clone(),
            member_orgs_policy: Some(CollectionPolicyConfig {
                payload: Some(collection_policy_config::Payload::SignaturePolicy(
                    member_policy.to_envelope(),
                )),
            }),
            required_peer_count: self.required_peer_count,
            maximum_peer_count: self.max_peer_count,
            block_to_live: self.block_to_live,
            member_only_read: self.member_only_read,
            member_only_write: self.member_only_write,
            endorsement_policy: endorsement_policy.map(|p| p.to_application_policy()),
        })
    }

    fn compile(&self, expression: &str) -> Result<CompiledPolicy, CollectionConfigError> {
        policy::compile(expression).map_err(|source| CollectionConfigError::Policy {
            collection: self.name.clone(),
            source,
        })
    }
}

/// Validate every descriptor and assemble the collection package.
///
/// At least one collection is required whenever a package is built.
pub fn build(descriptors: &[CollectionDescriptor]) -> Result<CollectionConfigPackage, CollectionConfigError> {
    if descriptors.is_empty() {
        return Err(CollectionConfigError::EmptyCollectionConfig);
    }

    let mut seen = HashSet::new();
    let mut config = Vec::with_capacity(descriptors.len());
    for descriptor in descriptors {
        let validated = validate(descriptor)?;
        if !seen.insert(validated.name.clone()) {
            return Err(CollectionConfigError::DuplicateName(validated.name));
        }
        config.push(CollectionConfig {
            payload: Some(collection_config::Payload::StaticCollectionConfig(
                validated.to_static_config()?,
            )),
        });
    }

    Ok(CollectionConfigPackage { config })
}

/// [`build`] followed by protobuf encoding.
pub fn build_bytes(descriptors: &[CollectionDescriptor]) -> Result<Vec<u8>, CollectionConfigError> {
    build(descriptors).map(|package| package.encode_to_vec())
}
