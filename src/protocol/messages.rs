//! Wire messages for the pb0 dialect
//!
//! Hand-written prost structs; the dialect is small enough that a build
//! script buys nothing. Fields are declared optional so that producers
//! control presence explicitly (the server expects every request field
//! on the wire, defaults included).

/// Operations defined by the wire dialect. This client only issues `Get`;
/// the remaining values are kept as wire constants.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum RequestType {
    Get = 0,
    GetAll = 1,
    Put = 2,
    Delete = 3,
    GetVersion = 4,
}

/// Top-level request envelope.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Request {
    #[prost(enumeration = "RequestType", optional, tag = "1")]
    pub request_type: ::core::option::Option<i32>,
    #[prost(bool, optional, tag = "2")]
    pub should_route: ::core::option::Option<bool>,
    #[prost(string, optional, tag = "3")]
    pub store: ::core::option::Option<::prost::alloc::string::String>,
    #[prost(message, optional, tag = "4")]
    pub get: ::core::option::Option<GetRequest>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetRequest {
    #[prost(bytes = "vec", optional, tag = "1")]
    pub key: ::core::option::Option<::prost::alloc::vec::Vec<u8>>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetResponse {
    #[prost(message, repeated, tag = "1")]
    pub versioned: ::prost::alloc::vec::Vec<Versioned>,
    #[prost(message, optional, tag = "2")]
    pub error: ::core::option::Option<RemoteError>,
}

/// A value together with the vector clock it was written under.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Versioned {
    #[prost(bytes = "vec", optional, tag = "1")]
    pub value: ::core::option::Option<::prost::alloc::vec::Vec<u8>>,
    #[prost(message, optional, tag = "2")]
    pub version: ::core::option::Option<VectorClock>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct VectorClock {
    #[prost(message, repeated, tag = "1")]
    pub entries: ::prost::alloc::vec::Vec<ClockEntry>,
    #[prost(int64, optional, tag = "2")]
    pub timestamp: ::core::option::Option<i64>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ClockEntry {
    #[prost(int32, optional, tag = "1")]
    pub node_id: ::core::option::Option<i32>,
    #[prost(int64, optional, tag = "2")]
    pub version: ::core::option::Option<i64>,
}

/// Server-side failure report embedded in a response.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RemoteError {
    #[prost(int32, optional, tag = "1")]
    pub error_code: ::core::option::Option<i32>,
    #[prost(string, optional, tag = "2")]
    pub error_message: ::core::option::Option<::prost::alloc::string::String>,
}
