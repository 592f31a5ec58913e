//! `orderer` package: broadcast responses

#[derive(Clone, PartialEq, prost::Message)]
pub struct BroadcastResponse {
    #[prost(enumeration = "super::common::Status", tag = "1")]
    pub status: i32,
    #[prost(string, tag = "2")]
    pub info: String,
}
