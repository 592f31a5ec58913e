//! Protocol buffer messages for the lifecycle protocol
//!
//! Hand-written `prost` definitions mirroring the peer, orderer and common
//! protos. Field tags are fixed by the network and must not change: peers
//! reject arguments whose encoding differs from their own definitions.

pub mod collection;
pub mod common;
pub mod lifecycle;
pub mod msp;
pub mod orderer;
pub mod peer;
pub mod policies;
