//! Command line arguments with environment fallbacks
#![allow(missing_docs)]

use std::path::PathBuf;

use bpaf::Bpaf;
use cert_create::ca::{ca_subject, CaSubject, KeypairAlgorithm, DEFAULT_CA_VALIDITY_DAYS};
use cert_issuance::{DEFAULT_VALIDITY_DAYS, MAX_VALIDITY_DAYS};

#[derive(Clone, Debug, Bpaf)]
#[bpaf(options, version)]
/// cert-create: issue client certificates from CSRs against a private CA
pub enum Cli {
	#[bpaf(command)]
	/// Run the issuance service
	Serve(#[bpaf(external(service_options))] ServiceOptions),
	#[bpaf(command("init-ca"))]
	/// Write a self-signed development CA
	InitCa(#[bpaf(external(init_ca_options))] InitCaOptions),
}

#[derive(Clone, Debug, Bpaf)]
pub struct ServiceOptions {
	/// Port to listen on
	#[bpaf(long, env("PORT"), argument("PORT"), fallback(3000), display_fallback)]
	pub port: u16,
	/// Base URL of the certificate registry
	#[bpaf(
		long,
		env("CERT_ADMIN_URL"),
		argument("URL"),
		fallback("http://localhost:3003".into()),
		display_fallback
	)]
	pub cert_admin_url: String,
	/// Base URL of the identity service
	#[bpaf(
		long,
		env("USER_ADMIN_URL"),
		argument("URL"),
		fallback("http://localhost:3004/api".into()),
		display_fallback
	)]
	pub user_admin_url: String,
	#[bpaf(external)]
	pub ca_files: CaFiles,
	/// Validity of issued certificates in days
	#[bpaf(
		long,
		env("CERT_VALIDITY_DAYS"),
		argument("DAYS"),
		guard(valid_days, "validity must be between 1 and 36500 days"),
		fallback(DEFAULT_VALIDITY_DAYS),
		display_fallback
	)]
	pub validity_days: u32,
	/// Key size hint advertised to clients generating their key pair
	#[bpaf(long, env("CERT_KEY_SIZE"), argument("BITS"), fallback(2048), display_fallback)]
	pub key_size: u32,
	/// Timeout for calls to the registry and identity service, in seconds
	#[bpaf(
		long,
		env("REQUEST_TIMEOUT_SECS"),
		argument("SECS"),
		guard(positive_secs, "timeout must be at least one second"),
		fallback(10),
		display_fallback
	)]
	pub request_timeout_secs: u64,
}

#[derive(Clone, Debug, Bpaf)]
pub struct InitCaOptions {
	#[bpaf(external)]
	pub ca_files: CaFiles,
	#[bpaf(external(ca_subject))]
	pub subject: CaSubject,
	/// Signature algorithm
	#[bpaf(short, long, argument("ALGO"), fallback(KeypairAlgorithm::EcdsaP256), display_fallback)]
	pub sig_algo: KeypairAlgorithm,
	/// Validity of the CA certificate in days
	#[bpaf(
		long,
		argument("DAYS"),
		guard(valid_days, "validity must be between 1 and 36500 days"),
		fallback(DEFAULT_CA_VALIDITY_DAYS),
		display_fallback
	)]
	pub ca_validity_days: u32,
	/// Replace existing CA files
	#[bpaf(long)]
	pub force: bool,
}

#[derive(Clone, Debug, Bpaf)]
pub struct CaFiles {
	/// CA certificate, PEM
	#[bpaf(
		long("ca-cert"),
		env("CA_CERT_PATH"),
		argument("PATH"),
		fallback("ca/ca-cert.pem".into()),
		debug_fallback
	)]
	pub cert: PathBuf,
	/// CA private key, PEM
	#[bpaf(
		long("ca-key"),
		env("CA_KEY_PATH"),
		argument("PATH"),
		fallback("ca/ca-key.pem".into()),
		debug_fallback
	)]
	pub key: PathBuf,
}

fn valid_days(days: &u32) -> bool {
	(1..=MAX_VALIDITY_DAYS).contains(days)
}

fn positive_secs(secs: &u64) -> bool {
	*secs > 0
}
