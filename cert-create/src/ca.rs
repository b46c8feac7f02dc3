//! Self-signed development CA.

use std::{
	fmt,
	fs::{self, OpenOptions},
	io::{self, Write},
	path::Path,
	str::FromStr,
};

use bpaf::Bpaf;
use rcgen::{
	BasicConstraints, CertificateParams, DistinguishedName, DnType, DnValue, IsCa, KeyPair,
	KeyUsagePurpose,
};
use time::{Duration, OffsetDateTime};

/// Default lifetime of a development CA.
pub const DEFAULT_CA_VALIDITY_DAYS: u32 = 3650;

#[derive(Debug, Clone)]
/// PEM serialized CA certificate and its private key
pub struct PemCertifiedKey {
	/// `CERTIFICATE` block.
	pub cert_pem: String,
	/// PKCS#8 `PRIVATE KEY` block.
	pub private_key_pem: String,
}

impl PemCertifiedKey {
	/// Write certificate and key to their paths, creating parent directories.
	///
	/// Existing files are left alone unless `overwrite` is set. The key file
	/// is created readable by its owner only.
	pub fn write(&self, cert_path: &Path, key_path: &Path, overwrite: bool) -> io::Result<()> {
		write_file(key_path, &self.private_key_pem, overwrite, 0o600)?;
		write_file(cert_path, &self.cert_pem, overwrite, 0o644)?;
		Ok(())
	}
}

fn write_file(path: &Path, contents: &str, overwrite: bool, _mode: u32) -> io::Result<()> {
	if let Some(dir) = path.parent() {
		fs::create_dir_all(dir)?;
	}
	let mut options = OpenOptions::new();
	options.write(true);
	if overwrite {
		options.create(true).truncate(true);
	} else {
		options.create_new(true);
	}
	#[cfg(unix)]
	{
		use std::os::unix::fs::OpenOptionsExt;
		options.mode(_mode);
	}
	let mut out = options.open(path)?;
	write!(out, "{contents}")
}

/// Subject attributes of the CA.
#[derive(Clone, Debug, PartialEq, Eq, Bpaf)]
pub struct CaSubject {
	/// Country
	#[bpaf(long, env("CERT_COUNTRY"), argument("CC"), fallback("US".into()), display_fallback)]
	pub country: String,
	/// State or province
	#[bpaf(long, env("CERT_STATE"), argument("STATE"), fallback("California".into()), display_fallback)]
	pub state: String,
	/// Locality
	#[bpaf(long, env("CERT_LOCALITY"), argument("CITY"), fallback("San Francisco".into()), display_fallback)]
	pub locality: String,
	/// Organization
	#[bpaf(long, env("CERT_ORGANIZATION"), argument("ORG"), fallback("OGT11 Inc".into()), display_fallback)]
	pub organization: String,
	/// Organizational unit
	#[bpaf(long, env("CERT_ORG_UNIT"), argument("UNIT"), fallback("IT".into()), display_fallback)]
	pub org_unit: String,
}

impl CaSubject {
	fn distinguished_name(&self) -> DistinguishedName {
		let mut dn = DistinguishedName::new();
		let country = self
			.country
			.as_str()
			.try_into()
			.map(DnValue::PrintableString)
			.unwrap_or_else(|_| DnValue::Utf8String(self.country.clone()));
		dn.push(DnType::CountryName, country);
		dn.push(DnType::StateOrProvinceName, self.state.as_str());
		dn.push(DnType::LocalityName, self.locality.as_str());
		dn.push(DnType::OrganizationName, self.organization.as_str());
		dn.push(DnType::OrganizationalUnitName, self.org_unit.as_str());
		dn.push(DnType::CommonName, format!("{} Root CA", self.organization));
		dn
	}
}

/// [CertificateParams] from which a self-signed CA is built
pub struct CaBuilder {
	params: CertificateParams,
}

impl CaBuilder {
	/// CA parameters for `subject`, valid from now for [`DEFAULT_CA_VALIDITY_DAYS`].
	pub fn new(subject: &CaSubject) -> Self {
		let mut params = CertificateParams::default();
		params.distinguished_name = subject.distinguished_name();
		params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
		params.key_usages.push(KeyUsagePurpose::DigitalSignature);
		params.key_usages.push(KeyUsagePurpose::KeyCertSign);
		params.key_usages.push(KeyUsagePurpose::CrlSign);
		Self { params }.validity_days(DEFAULT_CA_VALIDITY_DAYS)
	}

	/// Replace the validity window with `days` starting now.
	pub fn validity_days(mut self, days: u32) -> Self {
		let now = OffsetDateTime::now_utc();
		self.params.not_before = now;
		self.params.not_after = now + Duration::days(days.into());
		self
	}

	/// Generate a key for `alg` and self-sign.
	pub fn build(self, alg: &KeypairAlgorithm) -> Result<PemCertifiedKey, rcgen::Error> {
		let key_pair = alg.to_keypair()?;
		let cert = self.params.self_signed(&key_pair)?;
		Ok(PemCertifiedKey {
			cert_pem: cert.pem(),
			private_key_pem: key_pair.serialize_pem(),
		})
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// Supported CA keypair algorithms
pub enum KeypairAlgorithm {
	/// Ed25519
	Ed25519,
	/// ECDSA on P-256 with SHA-256
	EcdsaP256,
	/// ECDSA on P-384 with SHA-384
	EcdsaP384,
}

impl fmt::Display for KeypairAlgorithm {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			KeypairAlgorithm::Ed25519 => write!(f, "ed25519"),
			KeypairAlgorithm::EcdsaP256 => write!(f, "ecdsa_p256"),
			KeypairAlgorithm::EcdsaP384 => write!(f, "ecdsa_p384"),
		}
	}
}

impl FromStr for KeypairAlgorithm {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_lowercase().replace('-', "_").as_str() {
			"ed25519" => Ok(KeypairAlgorithm::Ed25519),
			"ecdsa_p256" => Ok(KeypairAlgorithm::EcdsaP256),
			"ecdsa_p384" => Ok(KeypairAlgorithm::EcdsaP384),
			other => Err(format!(
				"unsupported algorithm {other:?}, expected ecdsa_p256, ecdsa_p384 or ed25519"
			)),
		}
	}
}

impl KeypairAlgorithm {
	/// Return an `rcgen::KeyPair` for the given variant
	fn to_keypair(self) -> Result<KeyPair, rcgen::Error> {
		let alg = match self {
			KeypairAlgorithm::Ed25519 => &rcgen::PKCS_ED25519,
			KeypairAlgorithm::EcdsaP256 => &rcgen::PKCS_ECDSA_P256_SHA256,
			KeypairAlgorithm::EcdsaP384 => &rcgen::PKCS_ECDSA_P384_SHA384,
		};
		KeyPair::generate_for(alg)
	}
}
