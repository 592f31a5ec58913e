//! Credential collaborator
//!
//! The lifecycle handles never hold key material themselves. A [`Credential`]
//! names a wallet and a label; at call time the wallet yields an
//! [`Identity`], the wallet's [`IdentityProvider`] for that identity type
//! turns it into a [`SigningContext`], and the context signs proposals and
//! transaction envelopes.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use prost::Message;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::{LifecycleError, Result};
use crate::protos::msp::SerializedIdentity;

/// Identity type used by X.509 wallets
pub const X509_IDENTITY: &str = "X.509";

/// Wallet entry
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub msp_id: String,
    /// Selects the provider used to build a signing context
    #[serde(rename = "type")]
    pub identity_type: String,
    /// PEM-encoded certificate
    pub certificate: String,
    /// Provider-specific private key material
    pub private_key: String,
}

impl Identity {
    pub fn x509(msp_id: impl Into<String>, certificate: impl Into<String>, private_key: impl Into<String>) -> Self {
        Self {
            msp_id: msp_id.into(),
            identity_type: X509_IDENTITY.to_string(),
            certificate: certificate.into(),
            private_key: private_key.into(),
        }
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("msp_id", &self.msp_id)
            .field("identity_type", &self.identity_type)
            .field("private_key", &"<redacted>")
            .finish_non_exhaustive()
    }
}

/// Produces signatures over proposal and envelope bytes
pub trait Signer: Send + Sync {
    fn sign(&self, message: &[u8]) -> Result<Vec<u8>>;
}

/// Builds signing contexts for one identity type
pub trait IdentityProvider: Send + Sync {
    fn signing_context(&self, identity: &Identity) -> Result<SigningContext>;
}

/// Identity lookup by label
#[async_trait::async_trait]
pub trait Wallet: Send + Sync {
    async fn get(&self, label: &str) -> Result<Option<Identity>>;

    /// Provider for identities of the given type
    fn provider(&self, identity_type: &str) -> Result<Arc<dyn IdentityProvider>>;
}

/// Everything needed to act as the submitter of a proposal
#[derive(Clone)]
pub struct SigningContext {
    pub msp_id: String,
    pub certificate: Vec<u8>,
    signer: Arc<dyn Signer>,
}

impl SigningContext {
    pub fn new(msp_id: impl Into<String>, certificate: impl Into<Vec<u8>>, signer: Arc<dyn Signer>) -> Self {
        Self {
            msp_id: msp_id.into(),
            certificate: certificate.into(),
            signer,
        }
    }

    /// Serialized `SerializedIdentity`, used as the creator in signature headers.
    pub fn creator(&self) -> Vec<u8> {
        SerializedIdentity {
            mspid: self.msp_id.clone(),
            id_bytes: self.certificate.clone(),
        }
        .encode_to_vec()
    }

    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        self.signer.sign(message)
    }
}

impl fmt::Debug for SigningContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningContext")
            .field("msp_id", &self.msp_id)
            .finish_non_exhaustive()
    }
}

/// A wallet plus the label of the identity to act as
#[derive(Clone)]
pub struct Credential {
    wallet: Arc<dyn Wallet>,
    label: String,
}

impl Credential {
    pub fn new(wallet: Arc<dyn Wallet>, label: impl Into<String>) -> Self {
        Self {
            wallet,
            label: label.into(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Look up the identity and build its signing context.
    pub async fn signing_context(&self) -> Result<SigningContext> {
        let identity = self
            .wallet
            .get(&self.label)
            .await?
            .ok_or_else(|| LifecycleError::IdentityNotFound(self.label.clone()))?;
        let provider = self.wallet.provider(&identity.identity_type)?;
        provider.signing_context(&identity)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

/// Wallet backed by process memory
pub struct InMemoryWallet {
    identities: Arc<RwLock<HashMap<String, Identity>>>,
    providers: HashMap<String, Arc<dyn IdentityProvider>>,
}

impl InMemoryWallet {
    pub fn new() -> Self {
        Self {
            identities: Arc::new(RwLock::new(HashMap::new())),
            providers: HashMap::new(),
        }
    }

    pub fn with_provider(mut self, identity_type: impl Into<String>, provider: Arc<dyn IdentityProvider>) -> Self {
        self.providers.insert(identity_type.into(), provider);
        self
    }

    pub async fn put(&self, label: impl Into<String>, identity: Identity) {
        self.identities.write().await.insert(label.into(), identity);
    }

    pub async fn remove(&self, label: &str) -> Option<Identity> {
        self.identities.write().await.remove(label)
    }

    pub async fn labels(&self) -> Vec<String> {
        let mut labels: Vec<String> = self.identities.read().await.keys().cloned().collect();
        labels.sort();
        labels
    }
}

impl Default for InMemoryWallet {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Wallet for InMemoryWallet {
    async fn get(&self, label: &str) -> Result<Option<Identity>> {
        Ok(self.identities.read().await.get(label).cloned())
    }

    fn provider(&self, identity_type: &str) -> Result<Arc<dyn IdentityProvider>> {
        self.providers.get(identity_type).cloned().ok_or_else(|| {
            LifecycleError::Signing(format!("no identity provider for type '{}'", identity_type))
        })
    }
}
