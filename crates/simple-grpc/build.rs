//! Generates the `Simple` service client and server.
//!
//! The two messages are plain `prost` structs in `src/proto.rs`, so the
//! service is described with the manual builder and no `protoc` is needed.

fn main() {
    let send = tonic_build::manual::Method::builder()
        .name("send")
        .route_name("Send")
        .input_type("crate::proto::SimpleMessage")
        .output_type("crate::proto::Empty")
        .codec_path("tonic::codec::ProstCodec")
        .build();

    let service = tonic_build::manual::Service::builder()
        .name("Simple")
        .package("simple")
        .comment("One unary call carrying a text message.")
        .method(send)
        .build();

    tonic_build::manual::Builder::new().compile(&[service]);
}
