use rcgen::{
	CertificateParams, DistinguishedName, ExtendedKeyUsagePurpose, IsCa, KeyUsagePurpose,
	PublicKeyData, SanType,
};
use time::{Duration, OffsetDateTime};

use crate::{IdentityRecord, IssueError, RequestedKey, VerifiedCsr};

/// Validity applied when none is configured.
pub const DEFAULT_VALIDITY_DAYS: u32 = 365;

/// Longest validity a builder should be configured with.
///
/// Windows past this risk running beyond the dates X.509 can express.
pub const MAX_VALIDITY_DAYS: u32 = 36_500;

/// Builds the to-be-signed certificate for an end-entity client.
///
/// The extension policy is fixed: a critical `basicConstraints` with
/// `cA:false`, a critical `keyUsage` of digitalSignature and
/// keyEncipherment, `extKeyUsage` of serverAuth, clientAuth and
/// emailProtection, and an `rfc822Name` subject alternative name holding
/// the identity's email.
#[derive(Debug, Clone)]
pub struct CertificateBuilder {
	validity: Duration,
}

impl Default for CertificateBuilder {
	fn default() -> Self {
		Self::new(DEFAULT_VALIDITY_DAYS)
	}
}

impl CertificateBuilder {
	/// Builder issuing certificates valid for `validity_days`, capped at
	/// [`MAX_VALIDITY_DAYS`].
	pub fn new(validity_days: u32) -> Self {
		Self {
			validity: Duration::days(validity_days.min(MAX_VALIDITY_DAYS).into()),
		}
	}

	/// Length of the validity window.
	pub fn validity(&self) -> Duration {
		self.validity
	}

	/// Combine a verified request with the resolved identity.
	///
	/// The subject is copied from the request as-is. The identity only
	/// contributes the email address. Deterministic apart from `now`.
	pub fn build(
		&self,
		csr: VerifiedCsr,
		identity: &IdentityRecord,
		now: OffsetDateTime,
	) -> Result<UnsignedCertificate, IssueError> {
		let invalid_identity = |reason: String| IssueError::InvalidIdentity {
			username: identity.username.clone(),
			reason,
		};
		if identity.email.is_empty() {
			return Err(invalid_identity("no email address on record".into()));
		}
		let email_san = identity
			.email
			.as_str()
			.try_into()
			.map(SanType::Rfc822Name)
			.map_err(|e: rcgen::Error| invalid_identity(format!("email is not an IA5 string: {e}")))?;
		let not_after = now
			.checked_add(self.validity)
			.ok_or_else(|| IssueError::MalformedRequest("validity window overflows".into()))?;

		let (subject, public_key) = csr.into_parts();

		let mut params = CertificateParams::default();
		params.distinguished_name = subject;
		params.not_before = now;
		params.not_after = not_after;
		params.is_ca = IsCa::ExplicitNoCa;
		params.key_usages = vec![
			KeyUsagePurpose::DigitalSignature,
			KeyUsagePurpose::KeyEncipherment,
		];
		params.extended_key_usages = vec![
			ExtendedKeyUsagePurpose::ServerAuth,
			ExtendedKeyUsagePurpose::ClientAuth,
			ExtendedKeyUsagePurpose::EmailProtection,
		];
		params.subject_alt_names = vec![email_san];

		Ok(UnsignedCertificate { params, public_key })
	}
}

/// A certificate that has everything but a serial number and a signature.
pub struct UnsignedCertificate {
	params: CertificateParams,
	public_key: RequestedKey,
}

impl UnsignedCertificate {
	/// Parameters that will be signed.
	pub fn params(&self) -> &CertificateParams {
		&self.params
	}

	/// Subject copied from the request.
	pub fn subject(&self) -> &DistinguishedName {
		&self.params.distinguished_name
	}

	/// Start of the validity window.
	pub fn not_before(&self) -> OffsetDateTime {
		self.params.not_before
	}

	/// End of the validity window.
	pub fn not_after(&self) -> OffsetDateTime {
		self.params.not_after
	}

	/// Public key taken from the request.
	pub fn public_key(&self) -> &RequestedKey {
		&self.public_key
	}

	/// Raw `subjectPublicKey` bits taken from the request.
	pub fn public_key_bits(&self) -> &[u8] {
		self.public_key.der_bytes()
	}
}
