//! Wire types for the `simple.Simple` service.

#![allow(missing_docs)]
#![allow(clippy::doc_markdown)]

/// The single request type: one scalar text field.
#[derive(Clone, PartialEq, prost::Message)]
pub struct SimpleMessage {
    #[prost(string, tag = "1")]
    pub text: String,
}

/// Empty acknowledgement.
#[derive(Clone, Copy, PartialEq, prost::Message)]
pub struct Empty {}

include!(concat!(env!("OUT_DIR"), "/simple.Simple.rs"));
