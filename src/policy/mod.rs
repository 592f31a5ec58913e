//! Endorsement policy compiler
//!
//! Turns expressions such as `OR('Org1MSP.member', AND('Org2MSP.peer', 'Org3MSP.admin'))`
//! into a signature policy tree plus the list of MSP principals its leaves
//! refer to.
//!
//! Principal indices are assigned in order of first appearance (depth-first,
//! left to right) and repeated identities reuse the earlier index, so the
//! same expression always encodes to the same bytes.

mod lexer;
mod parser;

use std::fmt;

use prost::Message;
use serde::{Deserialize, Serialize};

use crate::error::PolicyParseError;
use crate::protos::msp::{Classification, MspPrincipal, MspRole, MspRoleType};
use crate::protos::policies::{
    application_policy, signature_policy, ApplicationPolicy, SignaturePolicy,
    SignaturePolicyEnvelope,
};

pub use parser::parse;

/// MSP role named in a quoted identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Member,
    Admin,
    Peer,
    Orderer,
    Client,
}

impl Role {
    pub const KEYWORDS: [&'static str; 5] = ["member", "admin", "peer", "orderer", "client"];

    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "member" => Some(Self::Member),
            "admin" => Some(Self::Admin),
            "peer" => Some(Self::Peer),
            "orderer" => Some(Self::Orderer),
            "client" => Some(Self::Client),
            _ => None,
        }
    }

    pub fn keyword(&self) -> &'static str {
        match self {
            Self::Member => "member",
            Self::Admin => "admin",
            Self::Peer => "peer",
            Self::Orderer => "orderer",
            Self::Client => "client",
        }
    }

    fn msp_role_type(&self) -> MspRoleType {
        match self {
            Self::Member => MspRoleType::Member,
            Self::Admin => MspRoleType::Admin,
            Self::Peer => MspRoleType::Peer,
            Self::Orderer => MspRoleType::Orderer,
            Self::Client => MspRoleType::Client,
        }
    }
}

/// An (organization, role) pair a policy leaf refers to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Principal {
    pub msp_id: String,
    pub role: Role,
}

impl Principal {
    pub fn new(msp_id: impl Into<String>, role: Role) -> Self {
        Self {
            msp_id: msp_id.into(),
            role,
        }
    }

    /// Encode as a role-classified `MSPPrincipal`.
    pub fn to_msp_principal(&self) -> MspPrincipal {
        let role = MspRole {
            msp_identifier: self.msp_id.clone(),
            role: self.role.msp_role_type() as i32,
        };
        MspPrincipal {
            principal_classification: Classification::Role as i32,
            principal: role.encode_to_vec(),
        }
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}.{}'", self.msp_id, self.role.keyword())
    }
}

/// Parsed policy expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyExpr {
    Identity(Principal),
    And(Vec<PolicyExpr>),
    Or(Vec<PolicyExpr>),
    OutOf(u32, Vec<PolicyExpr>),
}

/// Compiled signature policy rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignaturePolicyTree {
    /// Satisfied when at least `n` of `rules` are satisfied
    NOutOf {
        n: u32,
        rules: Vec<SignaturePolicyTree>,
    },
    /// Signature by the principal at this index
    SignedBy(usize),
}

impl SignaturePolicyTree {
    fn to_proto(&self) -> SignaturePolicy {
        let policy = match self {
            Self::SignedBy(index) => signature_policy::Type::SignedBy(*index as i32),
            Self::NOutOf { n, rules } => signature_policy::Type::NOutOf(signature_policy::NOutOf {
                n: *n as i32,
                rules: rules.iter().map(Self::to_proto).collect(),
            }),
        };
        SignaturePolicy {
            r#type: Some(policy),
        }
    }
}

/// Output of [`compile`]: the rule and the principals its leaves index into
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledPolicy {
    pub rule: SignaturePolicyTree,
    pub identities: Vec<Principal>,
}

impl CompiledPolicy {
    pub fn to_envelope(&self) -> SignaturePolicyEnvelope {
        SignaturePolicyEnvelope {
            version: 0,
            rule: Some(self.rule.to_proto()),
            identities: self
                .identities
                .iter()
                .map(Principal::to_msp_principal)
                .collect(),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_envelope().encode_to_vec()
    }
}

/// Compile a policy expression into a signature policy.
///
/// `OutOf(k, ...)` accepts any `k`, including one larger than the number of
/// terms; such a rule can never be satisfied but is still a valid policy.
pub fn compile(expression: &str) -> Result<CompiledPolicy, PolicyParseError> {
    let expr = parse(expression)?;
    let mut identities = Vec::new();
    let rule = lower(&expr, &mut identities);
    Ok(CompiledPolicy { rule, identities })
}

fn lower(expr: &PolicyExpr, identities: &mut Vec<Principal>) -> SignaturePolicyTree {
    let (n, terms) = match expr {
        PolicyExpr::Identity(principal) => {
            let index = match identities.iter().position(|p| p == principal) {
                Some(index) => index,
                None => {
                    identities.push(principal.clone());
                    identities.len() - 1
                }
            };
            return SignaturePolicyTree::SignedBy(index);
        }
        PolicyExpr::And(terms) => (terms.len() as u32, terms),
        PolicyExpr::Or(terms) => (1, terms),
        PolicyExpr::OutOf(n, terms) => (*n, terms),
    };

    SignaturePolicyTree::NOutOf {
        n,
        rules: terms.iter().map(|t| lower(t, identities)).collect(),
    }
}

/// Endorsement policy for a definition or collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndorsementPolicy {
    Signature(CompiledPolicy),
    /// Name of a policy in the channel configuration, e.g. `/Channel/Application/Endorsement`
    ChannelReference(String),
}

impl EndorsementPolicy {
    /// Compile a literal expression, or pass anything else through as a
    /// channel policy reference.
    ///
    /// Literal expressions are recognised by prefix: `AND`, `OR` or `OutOf`.
    pub fn parse(policy: &str) -> Result<Self, PolicyParseError> {
        if is_policy_expression(policy) {
            compile(policy).map(Self::Signature)
        } else {
            Ok(Self::ChannelReference(policy.to_string()))
        }
    }

    pub fn to_application_policy(&self) -> ApplicationPolicy {
        let policy = match self {
            Self::Signature(compiled) => {
                application_policy::Type::SignaturePolicy(compiled.to_envelope())
            }
            Self::ChannelReference(name) => {
                application_policy::Type::ChannelConfigPolicyReference(name.clone())
            }
        };
        ApplicationPolicy {
            r#type: Some(policy),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_application_policy().encode_to_vec()
    }
}

pub fn is_policy_expression(policy: &str) -> bool {
    policy.starts_with("AND") || policy.starts_with("OR") || policy.starts_with("OutOf")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signed(index: usize) -> SignaturePolicyTree {
        SignaturePolicyTree::SignedBy(index)
    }

    #[test]
    fn test_compile_repeated_identity_reuses_index() {
        let compiled = compile("AND('A.member', 'A.member')").unwrap();
        assert_eq!(compiled.identities, vec![Principal::new("A", Role::Member)]);
        assert_eq!(
            compiled.rule,
            SignaturePolicyTree::NOutOf {
                n: 2,
                rules: vec![signed(0), signed(0)],
            }
        );
    }

    #[test]
    fn test_compile_same_org_different_roles_are_distinct() {
        let compiled = compile("OR('A.member', 'A.admin')").unwrap();
        assert_eq!(compiled.identities.len(), 2);
        assert_eq!(compiled.identities[1], Principal::new("A", Role::Admin));
    }

    #[test]
    fn test_compile_out_of_threshold_above_term_count_is_kept() {
        let compiled = compile("OutOf(3, 'A.member', 'B.member')").unwrap();
        match compiled.rule {
            SignaturePolicyTree::NOutOf { n, rules } => {
                assert_eq!(n, 3);
                assert_eq!(rules.len(), 2);
            }
            other => panic!("unexpected rule: {:?}", other),
        }
    }

    #[test]
    fn test_envelope_encoding() {
        let compiled = compile("OR('Org1MSP.peer')").unwrap();
        let envelope = compiled.to_envelope();
        assert_eq!(envelope.version, 0);
        assert_eq!(envelope.identities.len(), 1);

        let principal = &envelope.identities[0];
        assert_eq!(principal.principal_classification, Classification::Role as i32);
        let role = MspRole::decode(principal.principal.as_slice()).unwrap();
        assert_eq!(role.msp_identifier, "Org1MSP");
        assert_eq!(role.role, MspRoleType::Peer as i32);

        match envelope.rule.and_then(|r| r.r#type) {
            Some(signature_policy::Type::NOutOf(n_out_of)) => {
                assert_eq!(n_out_of.n, 1);
                assert_eq!(
                    n_out_of.rules[0].r#type,
                    Some(signature_policy::Type::SignedBy(0))
                );
            }
            other => panic!("unexpected rule: {:?}", other),
        }
    }

    #[test]
    fn test_endorsement_policy_sniffing() {
        assert!(matches!(
            EndorsementPolicy::parse("AND('A.member')").unwrap(),
            EndorsementPolicy::Signature(_)
        ));
        assert_eq!(
            EndorsementPolicy::parse("/Channel/Application/Endorsement").unwrap(),
            EndorsementPolicy::ChannelReference("/Channel/Application/Endorsement".to_string())
        );
        // Prefix match only; a malformed literal is still compiled and rejected
        assert!(EndorsementPolicy::parse("ORG_POLICY").is_err());
    }

    #[test]
    fn test_channel_reference_encoding() {
        let bytes = EndorsementPolicy::ChannelReference("MyPolicy".to_string()).to_bytes();
        let decoded = ApplicationPolicy::decode(bytes.as_slice()).unwrap();
        assert_eq!(
            decoded.r#type,
            Some(application_policy::Type::ChannelConfigPolicyReference(
                "MyPolicy".to_string()
            ))
        );
    }

    #[test]
    fn test_principal_display() {
        assert_eq!(Principal::new("Org1MSP", Role::Admin).to_string(), "'Org1MSP.admin'");
    }
}
