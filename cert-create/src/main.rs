use std::{fs, sync::Arc, time::Duration};

use anyhow::Context;
use cert_create::{ca::CaBuilder, logging, server, version, AppState};
use cert_issuance::{
	CaSigner, CertificateBuilder, HttpIdentityResolver, HttpSerialRegistry, IssuanceCoordinator,
	IssuanceMetadata,
};
use tokio::net::TcpListener;
use tracing::info;

mod args;

use args::{Cli, InitCaOptions, ServiceOptions};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let cli = args::cli().run();
	logging::init()?;

	match cli {
		Cli::Serve(opts) => serve(opts).await,
		Cli::InitCa(opts) => init_ca(opts),
	}
}

async fn serve(opts: ServiceOptions) -> anyhow::Result<()> {
	let cert_pem = fs::read_to_string(&opts.ca_files.cert)
		.with_context(|| format!("reading CA certificate {}", opts.ca_files.cert.display()))?;
	let key_pem = fs::read_to_string(&opts.ca_files.key)
		.with_context(|| format!("reading CA key {}", opts.ca_files.key.display()))?;
	let signer = CaSigner::from_pem(&cert_pem, &key_pem).context("loading CA key material")?;
	info!(
		cert = %opts.ca_files.cert.display(),
		fingerprint_algorithm = %signer.fingerprint_algorithm(),
		"CA loaded"
	);

	let client = reqwest::Client::builder()
		.timeout(Duration::from_secs(opts.request_timeout_secs))
		.build()
		.context("building http client")?;
	let identity = HttpIdentityResolver::new(client.clone(), &opts.user_admin_url)
		.context("invalid identity service url")?;
	let registry = HttpSerialRegistry::new(client, &opts.cert_admin_url)
		.context("invalid registry url")?;

	let code_version = version::code_version().context("formatting code version")?;
	info!(code_version = %code_version, "issuing as");
	let coordinator = IssuanceCoordinator::new(
		identity,
		registry,
		Arc::new(signer),
		CertificateBuilder::new(opts.validity_days),
		IssuanceMetadata { code_version },
	);

	let listener = TcpListener::bind(("0.0.0.0", opts.port))
		.await
		.with_context(|| format!("binding port {}", opts.port))?;
	info!(addr = %listener.local_addr()?, "listening");
	server::serve(listener, AppState::new(coordinator, opts.key_size)).await?;
	Ok(())
}

fn init_ca(opts: InitCaOptions) -> anyhow::Result<()> {
	let ca = CaBuilder::new(&opts.subject)
		.validity_days(opts.ca_validity_days)
		.build(&opts.sig_algo)?;
	ca.write(&opts.ca_files.cert, &opts.ca_files.key, opts.force)
		.with_context(|| {
			format!(
				"writing {} and {} (pass --force to replace existing files)",
				opts.ca_files.cert.display(),
				opts.ca_files.key.display()
			)
		})?;
	info!(
		cert = %opts.ca_files.cert.display(),
		key = %opts.ca_files.key.display(),
		algorithm = %opts.sig_algo,
		"development CA written"
	);
	Ok(())
}
