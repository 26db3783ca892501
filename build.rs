use prost::Message;

fn main() -> anyhow::Result<()> {
	println!("cargo:rerun-if-changed=proto/ext_proc.proto");

	let file_descriptors = protox::compile(["proto/ext_proc.proto"], ["proto"])?;
	let out_dir = std::path::PathBuf::from(std::env::var("OUT_DIR")?);
	let descriptor_path = out_dir.join("ext_proc_descriptor.bin");
	std::fs::write(&descriptor_path, file_descriptors.encode_to_vec())?;

	tonic_prost_build::configure()
		.build_client(true)
		.build_server(true)
		.skip_protoc_run()
		.out_dir(&out_dir)
		.compile_fds(file_descriptors)?;

	Ok(())
}
