use pki_types::CertificateDer;
use rcgen::{Issuer, KeyPair, PublicKeyData};
use thiserror::Error;
use x509_parser::prelude::{FromDer, X509Certificate};

use crate::{FingerprintAlgorithm, SerialNumber, UnsignedCertificate};

/// Why CA key material could not be loaded.
#[derive(Debug, Error)]
pub enum CaLoadError {
	/// Key or certificate rejected by rcgen.
	#[error(transparent)]
	Rcgen(#[from] rcgen::Error),
	/// The CA certificate does not decode.
	#[error("invalid CA certificate: {0}")]
	Certificate(String),
	/// The private key does not belong to the CA certificate.
	#[error("CA private key does not match the CA certificate's public key")]
	KeyMismatch,
}

/// The CA signing context.
///
/// Loaded once at startup and shared by reference between requests. It is
/// never mutated after construction.
pub struct CaSigner {
	issuer: Issuer<'static, KeyPair>,
	certificate: CertificateDer<'static>,
	public_key_info: Vec<u8>,
	fingerprint_algorithm: FingerprintAlgorithm,
}

impl CaSigner {
	/// Build the signing context from the CA certificate and its private key, both PEM.
	///
	/// Fails with [`CaLoadError::KeyMismatch`] unless the key is the one the
	/// certificate certifies.
	pub fn from_pem(ca_cert_pem: &str, ca_key_pem: &str) -> Result<Self, CaLoadError> {
		Self::load(ca_cert_pem, ca_key_pem, true)
	}

	#[cfg(test)]
	pub(crate) fn from_pem_unchecked(ca_cert_pem: &str, ca_key_pem: &str) -> Result<Self, CaLoadError> {
		Self::load(ca_cert_pem, ca_key_pem, false)
	}

	fn load(ca_cert_pem: &str, ca_key_pem: &str, check_key: bool) -> Result<Self, CaLoadError> {
		let key_pair = KeyPair::from_pem(ca_key_pem)?;
		let certificate = ::pem::parse(ca_cert_pem)
			.map(|p| CertificateDer::from(p.into_contents()))
			.map_err(|e| CaLoadError::Certificate(e.to_string()))?;
		let public_key_info = {
			let (_, cert) = X509Certificate::from_der(&certificate)
				.map_err(|e| CaLoadError::Certificate(e.to_string()))?;
			let spki = cert.public_key();
			if check_key && spki.subject_public_key.data.as_ref() != key_pair.der_bytes() {
				return Err(CaLoadError::KeyMismatch);
			}
			spki.raw.to_vec()
		};
		let fingerprint_algorithm =
			FingerprintAlgorithm::for_signature_algorithm(key_pair.algorithm());
		let issuer = Issuer::from_ca_cert_pem(ca_cert_pem, key_pair)?;
		Ok(Self {
			issuer,
			certificate,
			public_key_info,
			fingerprint_algorithm,
		})
	}

	/// DER of the CA certificate.
	pub fn ca_certificate(&self) -> &CertificateDer<'static> {
		&self.certificate
	}

	/// DER `SubjectPublicKeyInfo` of the CA certificate.
	pub fn public_key_info(&self) -> &[u8] {
		&self.public_key_info
	}

	/// Digest used for fingerprints of certificates this CA signs.
	pub fn fingerprint_algorithm(&self) -> FingerprintAlgorithm {
		self.fingerprint_algorithm
	}

	/// Sign `unsigned` with `serial` embedded.
	///
	/// The serial is part of the signed bytes; it is never patched into a
	/// certificate after the fact.
	pub fn sign(
		&self,
		unsigned: &UnsignedCertificate,
		serial: &SerialNumber,
	) -> Result<SignedCertificate, rcgen::Error> {
		let mut params = unsigned.params().clone();
		params.serial_number = Some(serial.into());
		let cert = params.signed_by(unsigned.public_key(), &self.issuer)?;
		Ok(SignedCertificate {
			der: cert.der().clone(),
			serial: serial.clone(),
		})
	}
}

/// A certificate signed by the CA.
///
/// Its fingerprint is not part of this value: binding the fingerprint is a
/// registry-side update keyed by the serial, not a change to these bytes.
#[derive(Debug, Clone)]
pub struct SignedCertificate {
	der: CertificateDer<'static>,
	serial: SerialNumber,
}

impl SignedCertificate {
	/// DER encoding of the certificate.
	pub fn der(&self) -> &CertificateDer<'static> {
		&self.der
	}

	/// Serial embedded in the certificate.
	pub fn serial_number(&self) -> &SerialNumber {
		&self.serial
	}
}
