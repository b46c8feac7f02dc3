//! Content fingerprints over signed certificates.

use std::fmt;

use rcgen::SignatureAlgorithm;
use ring::digest;

/// Digest used for certificate fingerprints.
///
/// Chosen from the hash family of the CA's signature algorithm so the
/// fingerprint and the signature share one audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FingerprintAlgorithm {
	/// SHA-256, 32 octets
	Sha256,
	/// SHA-384, 48 octets
	Sha384,
	/// SHA-512, 64 octets
	Sha512,
}

impl FingerprintAlgorithm {
	/// Digest matching the hash inside `alg`.
	///
	/// Ed25519 hashes with SHA-512 internally, so it maps to [`Self::Sha512`].
	/// Anything unrecognised falls back to SHA-256.
	pub fn for_signature_algorithm(alg: &SignatureAlgorithm) -> Self {
		if alg == &rcgen::PKCS_ECDSA_P384_SHA384 || alg == &rcgen::PKCS_RSA_SHA384 {
			FingerprintAlgorithm::Sha384
		} else if alg == &rcgen::PKCS_RSA_SHA512 || alg == &rcgen::PKCS_ED25519 {
			FingerprintAlgorithm::Sha512
		} else {
			FingerprintAlgorithm::Sha256
		}
	}

	/// Stable label, e.g. `sha256`.
	pub fn label(&self) -> &'static str {
		match self {
			FingerprintAlgorithm::Sha256 => "sha256",
			FingerprintAlgorithm::Sha384 => "sha384",
			FingerprintAlgorithm::Sha512 => "sha512",
		}
	}

	fn ring_algorithm(&self) -> &'static digest::Algorithm {
		match self {
			FingerprintAlgorithm::Sha256 => &digest::SHA256,
			FingerprintAlgorithm::Sha384 => &digest::SHA384,
			FingerprintAlgorithm::Sha512 => &digest::SHA512,
		}
	}
}

impl fmt::Display for FingerprintAlgorithm {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.label())
	}
}

/// Lower-case hex digest of a certificate's DER encoding.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint {
	algorithm: FingerprintAlgorithm,
	hex: String,
}

impl Fingerprint {
	/// Digest `der` with `algorithm`.
	pub fn compute(algorithm: FingerprintAlgorithm, der: &[u8]) -> Self {
		let digest = digest::digest(algorithm.ring_algorithm(), der);
		Self {
			algorithm,
			hex: hex::encode(digest.as_ref()),
		}
	}

	/// Algorithm the digest was computed with.
	pub fn algorithm(&self) -> FingerprintAlgorithm {
		self.algorithm
	}

	/// Hex-encoded digest.
	pub fn as_hex(&self) -> &str {
		&self.hex
	}

	/// Recompute over `der` and compare.
	pub fn matches(&self, der: &[u8]) -> bool {
		Self::compute(self.algorithm, der) == *self
	}
}

impl fmt::Display for Fingerprint {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.hex)
	}
}
