use rcgen::{DistinguishedName, DnType, DnValue, PublicKeyData, SignatureAlgorithm};
use x509_parser::certification_request::X509CertificationRequest;
use x509_parser::der_parser::asn1_rs::Tag;
use x509_parser::prelude::FromDer;
use x509_parser::x509::{SubjectPublicKeyInfo, X509Name};

use crate::IssueError;

const CSR_TAGS: [&str; 2] = ["CERTIFICATE REQUEST", "NEW CERTIFICATE REQUEST"];

const OID_EC_PUBLIC_KEY: &str = "1.2.840.10045.2.1";
const OID_SECP256R1: &str = "1.2.840.10045.3.1.7";
const OID_SECP384R1: &str = "1.3.132.0.34";
const OID_ED25519: &str = "1.3.101.112";
const OID_RSA_ENCRYPTION: &str = "1.2.840.113549.1.1.1";

/// A certificate signing request whose self-signature has been checked.
///
/// Only the subject and the public key are used downstream. Extensions
/// requested in the CSR are ignored; the issued certificate gets the
/// issuer's fixed extension policy instead.
pub struct VerifiedCsr {
	subject: DistinguishedName,
	subject_string: String,
	public_key: RequestedKey,
}

impl VerifiedCsr {
	/// Parse a PEM encoded PKCS#10 request and verify its self-signature.
	///
	/// Fails with [`IssueError::MalformedRequest`] when the PEM armor or the
	/// DER structure does not decode, or the key type cannot be carried into
	/// a certificate, and with [`IssueError::InvalidSignature`] when the
	/// signature does not verify against the embedded public key.
	pub fn from_pem(pem_str: &str) -> Result<Self, IssueError> {
		let block = ::pem::parse(pem_str.trim())
			.map_err(|e| malformed(format!("invalid pem: {e}")))?;
		if !CSR_TAGS.contains(&block.tag()) {
			return Err(malformed(format!(
				"expected a CERTIFICATE REQUEST block, found {:?}",
				block.tag()
			)));
		}

		let (rest, csr) = X509CertificationRequest::from_der(block.contents())
			.map_err(|e| malformed(format!("invalid der: {e}")))?;
		if !rest.is_empty() {
			return Err(malformed("trailing data after certification request"));
		}
		csr.verify_signature()
			.map_err(|_| IssueError::InvalidSignature)?;

		let info = &csr.certification_request_info;
		Ok(Self {
			subject: distinguished_name(&info.subject)?,
			subject_string: info.subject.to_string(),
			public_key: RequestedKey::from_spki(&info.subject_pki)?,
		})
	}

	/// Subject attributes as declared by the requester.
	pub fn subject(&self) -> &DistinguishedName {
		&self.subject
	}

	/// RFC 4514 rendering of the subject, for logs.
	pub fn subject_string(&self) -> &str {
		&self.subject_string
	}

	/// The requester's public key.
	pub fn public_key(&self) -> &RequestedKey {
		&self.public_key
	}

	/// Raw `subjectPublicKey` bits of the embedded public key.
	pub fn public_key_bits(&self) -> &[u8] {
		self.public_key.der_bytes()
	}

	pub(crate) fn into_parts(self) -> (DistinguishedName, RequestedKey) {
		(self.subject, self.public_key)
	}
}

/// Public key taken from a signing request.
///
/// The algorithm is chosen by key type and curve, never by the hash the
/// requester signed with, so the issued certificate describes the same key.
#[derive(Debug, Clone)]
pub struct RequestedKey {
	algorithm: &'static SignatureAlgorithm,
	bits: Vec<u8>,
	spki: Vec<u8>,
}

impl RequestedKey {
	fn from_spki(spki: &SubjectPublicKeyInfo<'_>) -> Result<Self, IssueError> {
		let key_type = spki.algorithm.algorithm.to_id_string();
		let curve = spki
			.algorithm
			.parameters
			.as_ref()
			.and_then(|params| params.as_oid().ok())
			.map(|oid| oid.to_id_string());
		let algorithm = match (key_type.as_str(), curve.as_deref()) {
			(OID_EC_PUBLIC_KEY, Some(OID_SECP256R1)) => &rcgen::PKCS_ECDSA_P256_SHA256,
			(OID_EC_PUBLIC_KEY, Some(OID_SECP384R1)) => &rcgen::PKCS_ECDSA_P384_SHA384,
			(OID_ED25519, _) => &rcgen::PKCS_ED25519,
			(OID_RSA_ENCRYPTION, _) => &rcgen::PKCS_RSA_SHA256,
			(key_type, Some(curve)) => {
				return Err(malformed(format!(
					"unsupported public key type {key_type} on curve {curve}"
				)))
			},
			(key_type, None) => {
				return Err(malformed(format!("unsupported public key type {key_type}")))
			},
		};
		Ok(Self {
			algorithm,
			bits: spki.subject_public_key.data.to_vec(),
			spki: spki.raw.to_vec(),
		})
	}

	/// DER `SubjectPublicKeyInfo` exactly as the request carried it.
	pub fn spki_der(&self) -> &[u8] {
		&self.spki
	}
}

impl PublicKeyData for RequestedKey {
	fn der_bytes(&self) -> &[u8] {
		&self.bits
	}

	fn algorithm(&self) -> &'static SignatureAlgorithm {
		self.algorithm
	}
}

// Attributes of a multi-valued RDN are flattened. A repeated attribute type
// keeps its last value.
fn distinguished_name(name: &X509Name<'_>) -> Result<DistinguishedName, IssueError> {
	let mut dn = DistinguishedName::new();
	for attr in name.iter_attributes() {
		let oid = attr
			.attr_type()
			.iter()
			.ok_or_else(|| malformed("subject attribute type is not a valid oid"))?
			.collect::<Vec<_>>();
		let value = attr.attr_value();
		let data = value.as_bytes();
		let text = || {
			std::str::from_utf8(data).map_err(|_| malformed("subject attribute is not valid text"))
		};
		let invalid = |e: rcgen::Error| malformed(format!("subject attribute: {e}"));
		let dn_value = match value.header.tag() {
			Tag::PrintableString => DnValue::PrintableString(text()?.try_into().map_err(invalid)?),
			Tag::Ia5String => DnValue::Ia5String(text()?.try_into().map_err(invalid)?),
			Tag::Utf8String => DnValue::Utf8String(text()?.to_owned()),
			Tag::BmpString => DnValue::Utf8String(
				decode_bmp(data).ok_or_else(|| malformed("subject attribute is not valid UCS-2"))?,
			),
			Tag::UniversalString => DnValue::Utf8String(
				decode_universal(data)
					.ok_or_else(|| malformed("subject attribute is not valid UCS-4"))?,
			),
			// Latin-1 is what T61 fields carry in practice
			Tag::T61String => DnValue::Utf8String(data.iter().map(|b| char::from(*b)).collect()),
			tag => return Err(malformed(format!("subject attribute has string type {tag:?}"))),
		};
		dn.push(DnType::from_oid(&oid), dn_value);
	}
	Ok(dn)
}

fn decode_bmp(data: &[u8]) -> Option<String> {
	if data.len() % 2 != 0 {
		return None;
	}
	let units = data
		.chunks_exact(2)
		.map(|unit| u16::from_be_bytes([unit[0], unit[1]]));
	char::decode_utf16(units).collect::<Result<_, _>>().ok()
}

fn decode_universal(data: &[u8]) -> Option<String> {
	if data.len() % 4 != 0 {
		return None;
	}
	data.chunks_exact(4)
		.map(|c| char::from_u32(u32::from_be_bytes([c[0], c[1], c[2], c[3]])))
		.collect()
}

fn malformed(reason: impl Into<String>) -> IssueError {
	IssueError::MalformedRequest(reason.into())
}
