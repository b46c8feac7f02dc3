use std::sync::Arc;

use pki_types::CertificateDer;
use time::OffsetDateTime;
use tracing::{debug, error, info, warn};

use crate::encode::{check_round_trip, encode_certificate};
use crate::registry::{IssuanceMetadata, RegistryRecord, ReservationRequest, SerialRegistry};
use crate::{
	CaSigner, CertificateBuilder, ClientError, ErrorKind, Fingerprint, IdentityRecord,
	IdentityResolver, IssueError, SerialNumber, VerifiedCsr,
};

/// Prefix of a submitted CSR that may appear in debug logs.
const CSR_LOG_PREFIX: usize = 64;

/// Where an issuance attempt currently is.
///
/// `Built` is entered once the to-be-signed certificate exists. From there
/// the attempt moves strictly forward; `Failed` is reachable from every
/// non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssuanceState {
	/// Certificate structure built, no serial yet.
	Built,
	/// Phase 1 request sent to the registry.
	SerialRequested,
	/// Signed with the reserved serial embedded.
	Signed,
	/// Phase 2 accepted by the registry.
	FingerprintBound,
	/// Certificate handed back to the caller.
	Complete,
	/// Terminal failure.
	Failed(ErrorKind),
}

impl IssuanceState {
	/// Whether `next` is a legal successor of `self`.
	pub fn can_advance_to(&self, next: &IssuanceState) -> bool {
		use IssuanceState::*;
		match (self, next) {
			(Complete | Failed(_), _) => false,
			(_, Failed(_)) => true,
			(Built, SerialRequested)
			| (SerialRequested, Signed)
			| (Signed, FingerprintBound)
			| (FingerprintBound, Complete) => true,
			_ => false,
		}
	}

	/// `Complete` or `Failed`.
	pub fn is_terminal(&self) -> bool {
		matches!(self, IssuanceState::Complete | IssuanceState::Failed(_))
	}
}

struct Attempt<'a> {
	username: &'a str,
	state: IssuanceState,
}

impl<'a> Attempt<'a> {
	fn new(username: &'a str) -> Self {
		debug!(username, state = ?IssuanceState::Built, "issuance started");
		Self {
			username,
			state: IssuanceState::Built,
		}
	}

	fn advance(&mut self, next: IssuanceState) {
		debug_assert!(
			self.state.can_advance_to(&next),
			"illegal issuance transition {:?} -> {:?}",
			self.state,
			next
		);
		debug!(username = self.username, from = ?self.state, to = ?next, "issuance state");
		self.state = next;
	}

	fn fail(&mut self, err: IssueError) -> IssueError {
		self.advance(IssuanceState::Failed(err.kind()));
		err
	}
}

/// A certificate that went through both registry phases.
#[derive(Debug, Clone)]
pub struct IssuedCertificate {
	pem: String,
	der: CertificateDer<'static>,
	serial_number: SerialNumber,
	fingerprint: Fingerprint,
}

impl IssuedCertificate {
	/// PEM encoding, 64 column lines.
	pub fn pem(&self) -> &str {
		&self.pem
	}

	/// DER encoding; the fingerprint is computed over these bytes.
	pub fn der(&self) -> &CertificateDer<'static> {
		&self.der
	}

	/// Serial reserved in Phase 1 and embedded in the certificate.
	pub fn serial_number(&self) -> &SerialNumber {
		&self.serial_number
	}

	/// Fingerprint bound to the serial in Phase 2.
	pub fn fingerprint(&self) -> &Fingerprint {
		&self.fingerprint
	}
}

/// Runs the two-phase issuance protocol.
///
/// Holds no mutable state. Concurrent calls to [`Self::issue`] share only the
/// signer and the collaborators; uniqueness of serials is the registry's job.
pub struct IssuanceCoordinator<I, R> {
	identity: I,
	registry: R,
	signer: Arc<CaSigner>,
	builder: CertificateBuilder,
	metadata: IssuanceMetadata,
}

impl<I, R> IssuanceCoordinator<I, R>
where
	I: IdentityResolver,
	R: SerialRegistry,
{
	/// Wire the coordinator to its collaborators.
	pub fn new(
		identity: I,
		registry: R,
		signer: Arc<CaSigner>,
		builder: CertificateBuilder,
		metadata: IssuanceMetadata,
	) -> Self {
		Self {
			identity,
			registry,
			signer,
			builder,
			metadata,
		}
	}

	/// The identity collaborator.
	pub fn identity(&self) -> &I {
		&self.identity
	}

	/// The registry collaborator.
	pub fn registry(&self) -> &R {
		&self.registry
	}

	/// The shared CA signing context.
	pub fn signer(&self) -> &CaSigner {
		&self.signer
	}

	/// Issue a certificate for `username` from a PEM encoded CSR.
	///
	/// Steps run strictly in order: identity, CSR verification, build,
	/// serial reservation, signing, fingerprint, self-check of the PEM output
	/// and of the signature under the CA key, fingerprint binding. Nothing
	/// reaches the registry unless the identity resolves and the CSR verifies. Once a serial has been reserved, any failure leaves
	/// the registry record without a fingerprint; the returned error carries
	/// that serial. A failed call is never resumed: retrying means a new
	/// call and a new serial.
	pub async fn issue(
		&self,
		csr_pem: &str,
		username: &str,
	) -> Result<IssuedCertificate, IssueError> {
		let identity = self.resolve_identity(username).await?;

		debug!(
			username,
			csr = %csr_pem.chars().take(CSR_LOG_PREFIX).collect::<String>(),
			"verifying csr"
		);
		let csr = VerifiedCsr::from_pem(csr_pem)?;
		debug!(username, subject = csr.subject_string(), "csr verified");

		let unsigned = self
			.builder
			.build(csr, &identity, OffsetDateTime::now_utc())?;
		let mut attempt = Attempt::new(username);

		// Phase 1
		let request = ReservationRequest {
			username: identity.username.clone(),
			email: identity.email.clone(),
			metadata: self.metadata.clone(),
		};
		attempt.advance(IssuanceState::SerialRequested);
		let serial = match self.registry.reserve(&request).await {
			Ok(serial) => serial,
			Err(e) => {
				warn!(username, error = ?e, "serial reservation failed");
				return Err(attempt.fail(IssueError::AllocationError(e.to_string())));
			},
		};
		debug!(username, serial = %serial, "serial reserved");

		let signed = match self.signer.sign(&unsigned, &serial) {
			Ok(signed) => signed,
			Err(e) => return Err(attempt.fail(signing_failed(&serial, e.to_string()))),
		};
		attempt.advance(IssuanceState::Signed);

		let der = signed.der();
		let fingerprint = Fingerprint::compute(self.signer.fingerprint_algorithm(), der);
		let pem = encode_certificate(der);
		if let Err(e) = check_round_trip(&pem, der, &serial, self.signer.public_key_info()) {
			return Err(attempt.fail(signing_failed(&serial, e.to_string())));
		}

		// Phase 2
		if let Err(e) = self.registry.bind_fingerprint(&serial, &fingerprint).await {
			error!(
				username,
				serial = %serial,
				fingerprint = %fingerprint,
				error = ?e,
				"fingerprint binding failed, registry record left incomplete"
			);
			return Err(attempt.fail(IssueError::BindingError {
				serial: serial.to_string(),
				reason: e.to_string(),
			}));
		}
		attempt.advance(IssuanceState::FingerprintBound);

		let issued = IssuedCertificate {
			pem,
			der: der.clone(),
			serial_number: serial,
			fingerprint,
		};
		attempt.advance(IssuanceState::Complete);
		info!(
			username,
			serial = %issued.serial_number,
			fingerprint = %issued.fingerprint,
			algorithm = issued.fingerprint.algorithm().label(),
			"certificate issued"
		);
		Ok(issued)
	}

	/// Fetch `username` from the identity service.
	pub async fn resolve_identity(&self, username: &str) -> Result<IdentityRecord, IssueError> {
		match self.identity.resolve(username).await {
			Ok(record) => Ok(record),
			Err(ClientError::NotFound) => {
				info!(username, "unknown username");
				Err(IssueError::IdentityNotFound(username.to_owned()))
			},
			Err(e) => {
				warn!(username, error = ?e, "identity lookup failed");
				Err(IssueError::IdentityUnavailable(e.to_string()))
			},
		}
	}

	/// Whether `username` is known to the identity service.
	pub async fn username_exists(&self, username: &str) -> Result<bool, IssueError> {
		self.identity.exists(username).await.map_err(|e| {
			warn!(username, error = ?e, "username check failed");
			IssueError::IdentityUnavailable(e.to_string())
		})
	}

	/// Registry records whose fingerprint was never bound.
	pub async fn incomplete_records(&self) -> Result<Vec<RegistryRecord>, ClientError> {
		self.registry.incomplete_records().await
	}
}

fn signing_failed(serial: &SerialNumber, reason: String) -> IssueError {
	error!(alert = true, serial = %serial, reason = %reason, "CA signing failed");
	IssueError::SigningError {
		serial: serial.to_string(),
		reason,
	}
}

#[cfg(test)]
mod tests {
	use std::sync::Mutex;

	use rcgen::{
		BasicConstraints, CertificateParams, DistinguishedName, DnType, KeyPair, KeyUsagePurpose,
	};

	use super::*;
	use IssuanceState::*;

	struct Alice;

	impl IdentityResolver for Alice {
		async fn resolve(&self, username: &str) -> Result<IdentityRecord, ClientError> {
			Ok(IdentityRecord {
				username: username.to_owned(),
				display_name: "Alice".into(),
				email: "alice@example.com".into(),
			})
		}

		async fn exists(&self, _username: &str) -> Result<bool, ClientError> {
			Ok(true)
		}
	}

	#[derive(Default)]
	struct Ledger {
		bound: Mutex<Vec<SerialNumber>>,
	}

	impl SerialRegistry for Ledger {
		async fn reserve(&self, _request: &ReservationRequest) -> Result<SerialNumber, ClientError> {
			Ok(SerialNumber::parse("5eed").unwrap())
		}

		async fn bind_fingerprint(
			&self,
			serial: &SerialNumber,
			_fingerprint: &Fingerprint,
		) -> Result<(), ClientError> {
			self.bound.lock().unwrap().push(serial.clone());
			Ok(())
		}

		async fn incomplete_records(&self) -> Result<Vec<RegistryRecord>, ClientError> {
			Ok(Vec::new())
		}
	}

	fn ca() -> (String, String) {
		let key = KeyPair::generate().unwrap();
		let mut params = CertificateParams::default();
		params.distinguished_name = DistinguishedName::new();
		params.distinguished_name.push(DnType::CommonName, "Test CA");
		params.is_ca = rcgen::IsCa::Ca(BasicConstraints::Unconstrained);
		params.key_usages = vec![KeyUsagePurpose::KeyCertSign];
		let cert = params.self_signed(&key).unwrap();
		(cert.pem(), key.serialize_pem())
	}

	fn coordinator(signer: CaSigner) -> IssuanceCoordinator<Alice, Ledger> {
		IssuanceCoordinator::new(
			Alice,
			Ledger::default(),
			Arc::new(signer),
			CertificateBuilder::default(),
			IssuanceMetadata {
				code_version: "test".into(),
			},
		)
	}

	fn csr() -> String {
		let key = KeyPair::generate().unwrap();
		let mut params = CertificateParams::new(vec![]).unwrap();
		params.distinguished_name = DistinguishedName::new();
		params.distinguished_name.push(DnType::CommonName, "alice");
		params.serialize_request(&key).unwrap().pem().unwrap()
	}

	#[tokio::test]
	async fn foreign_ca_key_is_a_signing_error() {
		let (cert_pem, _) = ca();
		let (_, other_key) = ca();
		let coordinator = coordinator(CaSigner::from_pem_unchecked(&cert_pem, &other_key).unwrap());

		let err = coordinator.issue(&csr(), "alice").await.unwrap_err();
		assert!(
			matches!(&err, IssueError::SigningError { serial, .. } if serial == "5eed"),
			"{err:?}"
		);
		assert_eq!(err.orphaned_serial(), Some("5eed"));
		assert!(coordinator.registry().bound.lock().unwrap().is_empty());
	}

	#[tokio::test]
	async fn matching_ca_key_issues() {
		let (cert_pem, key_pem) = ca();
		let coordinator = coordinator(CaSigner::from_pem(&cert_pem, &key_pem).unwrap());
		let issued = coordinator.issue(&csr(), "alice").await.unwrap();
		assert_eq!(
			coordinator.registry().bound.lock().unwrap().as_slice(),
			&[issued.serial_number().clone()]
		);
	}

	#[test]
	fn forward_path_is_legal() {
		let path = [Built, SerialRequested, Signed, FingerprintBound, Complete];
		for pair in path.windows(2) {
			assert!(pair[0].can_advance_to(&pair[1]), "{:?}", pair);
		}
	}

	#[test]
	fn no_skipping_or_going_back() {
		assert!(!Built.can_advance_to(&Signed));
		assert!(!SerialRequested.can_advance_to(&FingerprintBound));
		assert!(!Signed.can_advance_to(&SerialRequested));
		assert!(!FingerprintBound.can_advance_to(&Built));
	}

	#[test]
	fn failure_from_any_live_state() {
		let failed = Failed(ErrorKind::Binding);
		for state in [Built, SerialRequested, Signed, FingerprintBound] {
			assert!(state.can_advance_to(&failed));
			assert!(!state.is_terminal());
		}
		assert!(!Complete.can_advance_to(&failed));
		assert!(!failed.can_advance_to(&Failed(ErrorKind::Signing)));
		assert!(failed.is_terminal());
	}
}
