//! Fabric Lifecycle - smart contract lifecycle client
//!
//! Installs chaincode packages on peers and drives chaincode definitions
//! through approve, commit-readiness and commit on a channel.
//!
//! ## Components
//!
//! - **Policy**: compiles `AND`/`OR`/`OutOf` expressions into signature policies
//! - **Collection**: validates private data collections and builds their package
//! - **Peer**: install and query packages, list channels and capabilities
//! - **Channel**: approve, commit and query chaincode definitions
//! - **Lifecycle**: registry of named peers and orderers, handle factory
//!
//! Network access goes through the [`Transport`] seam; the `grpc` feature
//! provides a tonic implementation.

pub mod channel;
pub mod collection;
pub mod config;
pub mod error;
pub mod identity;
pub mod lifecycle;
pub mod peer;
pub mod policy;
pub mod proposal;
pub mod protos;
mod session;
pub mod transport;

pub use channel::{DefinedSmartContract, LifecycleChannel, SmartContractDefinitionOptions};
pub use collection::{CollectionConfigError, CollectionDescriptor};
pub use config::NetworkConfig;
pub use error::{EndpointKind, LifecycleError, PolicyParseError, Result};
pub use identity::{Credential, Identity, IdentityProvider, InMemoryWallet, Signer, SigningContext, Wallet};
pub use lifecycle::{Lifecycle, OrdererDescriptor, PeerDescriptor};
pub use peer::{InstalledSmartContract, LifecyclePeer, SmartContractReference};
pub use policy::{compile, CompiledPolicy, EndorsementPolicy, Principal, Role, SignaturePolicyTree};
pub use transport::{CommitterClient, ConnectionOptions, EndorserClient, TlsOptions, Transport};

#[cfg(feature = "grpc")]
pub use transport::GrpcTransport;
