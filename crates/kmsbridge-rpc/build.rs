//! Compiles the Kubernetes KMS plugin protos (v1beta1 and v2).
//!
//! protox parses the .proto files in-process, so no system `protoc` is needed.

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let protos = ["proto/v1beta1/api.proto", "proto/v2/api.proto"];
    for proto in protos {
        println!("cargo:rerun-if-changed={proto}");
    }

    let descriptors = protox::compile(protos, ["proto"])?;
    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_fds(descriptors)?;

    Ok(())
}
