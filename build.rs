fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Only rerun if the proto contract changes
    println!("cargo:rerun-if-changed=proto/eventsdb.proto");

    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_protos(&["proto/eventsdb.proto"], &["proto"])?;
    Ok(())
}
