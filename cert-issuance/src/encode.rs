//! PEM armor for issued certificates.

use ::pem::{EncodeConfig, LineEnding, Pem};
use x509_parser::prelude::{FromDer, SubjectPublicKeyInfo};

use crate::SerialNumber;

const CERTIFICATE_TAG: &str = "CERTIFICATE";

/// Wrap certificate DER in a `CERTIFICATE` PEM block.
///
/// LF line endings, base64 body wrapped at 64 columns.
pub fn encode_certificate(der: &[u8]) -> String {
	let p = Pem::new(CERTIFICATE_TAG, der.to_vec());
	let config = EncodeConfig::new().set_line_ending(LineEnding::LF);
	::pem::encode_config(&p, config)
}

/// Why a PEM round trip did not reproduce the signed certificate.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoundTripError {
	/// Output could not be parsed back.
	#[error("pem does not parse: {0}")]
	Unparseable(String),
	/// Block label is not `CERTIFICATE`.
	#[error("unexpected pem tag {0:?}")]
	WrongTag(String),
	/// Decoded bytes differ from the signed DER.
	#[error("decoded der differs from signed der")]
	ContentMismatch,
	/// The signature does not verify under the CA public key.
	#[error("signature does not verify under the CA public key")]
	BadSignature,
	/// The decoded certificate carries a different serial.
	#[error("serial number mismatch: expected {expected}, found {found}")]
	SerialMismatch {
		/// Serial the certificate was signed with.
		expected: String,
		/// Serial read back from the decoded certificate.
		found: String,
	},
}

/// Decode `pem` and confirm it reproduces `der`, carries `serial` and
/// verifies under the issuer key `issuer_spki` (DER `SubjectPublicKeyInfo`).
pub fn check_round_trip(
	pem: &str,
	der: &[u8],
	serial: &SerialNumber,
	issuer_spki: &[u8],
) -> Result<(), RoundTripError> {
	let parsed = ::pem::parse(pem).map_err(|e| RoundTripError::Unparseable(e.to_string()))?;
	if parsed.tag() != CERTIFICATE_TAG {
		return Err(RoundTripError::WrongTag(parsed.tag().to_owned()));
	}
	if parsed.contents() != der {
		return Err(RoundTripError::ContentMismatch);
	}
	let (_, cert) = x509_parser::parse_x509_certificate(parsed.contents())
		.map_err(|e| RoundTripError::Unparseable(e.to_string()))?;
	if !serial.matches_der_integer(cert.raw_serial()) {
		return Err(RoundTripError::SerialMismatch {
			expected: serial.to_string(),
			found: hex::encode(cert.raw_serial()),
		});
	}
	let (_, issuer) = SubjectPublicKeyInfo::from_der(issuer_spki)
		.map_err(|e| RoundTripError::Unparseable(e.to_string()))?;
	cert.verify_signature(Some(&issuer))
		.map_err(|_| RoundTripError::BadSignature)?;
	Ok(())
}
