#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use cert_issuance::{
	CaSigner, CertificateBuilder, ClientError, Fingerprint, IdentityRecord, IdentityResolver,
	IssuanceCoordinator, IssuanceMetadata, RegistryRecord, ReservationRequest, SerialNumber,
	SerialRegistry,
};
use rcgen::{
	BasicConstraints, CertificateParams, DistinguishedName, DnType, IsCa, KeyPair,
	KeyUsagePurpose, SignatureAlgorithm,
};

pub const CODE_VERSION: &str = "cert-create-20260301120000000-0a1b2c3d";

pub type TestCoordinator = IssuanceCoordinator<FakeIdentity, FakeRegistry>;

/// Self-signed CA with the service's default subject.
pub fn ca_pem(alg: &'static SignatureAlgorithm) -> (String, String) {
	let key = KeyPair::generate_for(alg).unwrap();
	let mut params = CertificateParams::default();
	params.distinguished_name = DistinguishedName::new();
	params.distinguished_name.push(DnType::CountryName, "US");
	params
		.distinguished_name
		.push(DnType::StateOrProvinceName, "California");
	params
		.distinguished_name
		.push(DnType::LocalityName, "San Francisco");
	params
		.distinguished_name
		.push(DnType::OrganizationName, "OGT11 Inc");
	params
		.distinguished_name
		.push(DnType::OrganizationalUnitName, "IT");
	params.distinguished_name.push(DnType::CommonName, "OGT11 Test CA");
	params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
	params.key_usages = vec![
		KeyUsagePurpose::DigitalSignature,
		KeyUsagePurpose::KeyCertSign,
		KeyUsagePurpose::CrlSign,
	];
	let cert = params.self_signed(&key).unwrap();
	(cert.pem(), key.serialize_pem())
}

pub fn signer(alg: &'static SignatureAlgorithm) -> Arc<CaSigner> {
	let (cert_pem, key_pem) = ca_pem(alg);
	Arc::new(CaSigner::from_pem(&cert_pem, &key_pem).unwrap())
}

/// A CSR for `common_name` and the key that signed it.
pub fn csr(common_name: &str) -> (String, KeyPair) {
	let key = KeyPair::generate().unwrap();
	let mut params = CertificateParams::new(vec![]).unwrap();
	params.distinguished_name = DistinguishedName::new();
	params
		.distinguished_name
		.push(DnType::CommonName, common_name);
	params
		.distinguished_name
		.push(DnType::OrganizationName, "OGT11 Inc");
	let pem = params.serialize_request(&key).unwrap().pem().unwrap();
	(pem, key)
}

/// `pem` with one bit of the signature flipped.
pub fn tamper(pem: &str) -> String {
	let mut der = ::pem::parse(pem).unwrap().into_contents();
	let last = der.len() - 1;
	der[last] ^= 0x01;
	::pem::encode(&::pem::Pem::new("CERTIFICATE REQUEST", der))
}

pub fn alice() -> IdentityRecord {
	IdentityRecord {
		username: "alice".into(),
		display_name: "Alice Liddell".into(),
		email: "alice@example.com".into(),
	}
}

pub fn bob() -> IdentityRecord {
	IdentityRecord {
		username: "bob".into(),
		display_name: "Bob".into(),
		email: "bob@example.com".into(),
	}
}

pub fn coordinator(identity: FakeIdentity, registry: FakeRegistry) -> TestCoordinator {
	coordinator_with(identity, registry, signer(&rcgen::PKCS_ECDSA_P256_SHA256))
}

pub fn coordinator_with(
	identity: FakeIdentity,
	registry: FakeRegistry,
	signer: Arc<CaSigner>,
) -> TestCoordinator {
	IssuanceCoordinator::new(
		identity,
		registry,
		signer,
		CertificateBuilder::default(),
		IssuanceMetadata {
			code_version: CODE_VERSION.into(),
		},
	)
}

/// In-memory identity service.
#[derive(Default)]
pub struct FakeIdentity {
	users: HashMap<String, IdentityRecord>,
	pub calls: AtomicUsize,
	pub unavailable: AtomicBool,
}

impl FakeIdentity {
	pub fn with(users: impl IntoIterator<Item = IdentityRecord>) -> Self {
		Self {
			users: users
				.into_iter()
				.map(|u| (u.username.clone(), u))
				.collect(),
			..Default::default()
		}
	}

	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}
}

impl IdentityResolver for FakeIdentity {
	async fn resolve(&self, username: &str) -> Result<IdentityRecord, ClientError> {
		self.calls.fetch_add(1, Ordering::SeqCst);
		if self.unavailable.load(Ordering::SeqCst) {
			return Err(ClientError::Unavailable("connection refused".into()));
		}
		self.users.get(username).cloned().ok_or(ClientError::NotFound)
	}

	async fn exists(&self, username: &str) -> Result<bool, ClientError> {
		self.calls.fetch_add(1, Ordering::SeqCst);
		if self.unavailable.load(Ordering::SeqCst) {
			return Err(ClientError::Unavailable("connection refused".into()));
		}
		Ok(self.users.contains_key(username))
	}
}

/// In-memory registry handing out sequential serials.
#[derive(Default)]
pub struct FakeRegistry {
	next: AtomicU64,
	records: Mutex<HashMap<SerialNumber, RegistryRecord>>,
	pub reserve_calls: AtomicUsize,
	pub bind_calls: AtomicUsize,
	pub fail_reserve: AtomicBool,
	pub fail_bind: AtomicBool,
}

impl FakeRegistry {
	pub fn failing_reserve() -> Self {
		let registry = Self::default();
		registry.fail_reserve.store(true, Ordering::SeqCst);
		registry
	}

	pub fn failing_bind() -> Self {
		let registry = Self::default();
		registry.fail_bind.store(true, Ordering::SeqCst);
		registry
	}

	pub fn reserve_calls(&self) -> usize {
		self.reserve_calls.load(Ordering::SeqCst)
	}

	pub fn bind_calls(&self) -> usize {
		self.bind_calls.load(Ordering::SeqCst)
	}

	pub fn record(&self, serial: &SerialNumber) -> Option<RegistryRecord> {
		self.records.lock().unwrap().get(serial).cloned()
	}

	pub fn len(&self) -> usize {
		self.records.lock().unwrap().len()
	}
}

impl SerialRegistry for FakeRegistry {
	async fn reserve(&self, request: &ReservationRequest) -> Result<SerialNumber, ClientError> {
		self.reserve_calls.fetch_add(1, Ordering::SeqCst);
		tokio::task::yield_now().await;
		if self.fail_reserve.load(Ordering::SeqCst) {
			return Err(ClientError::Status {
				status: 500,
				body: "database unavailable at 10.0.0.7".into(),
			});
		}
		let n = self.next.fetch_add(1, Ordering::SeqCst) + 1;
		let serial = SerialNumber::parse(&format!("{:x}", 0x7f00_0000_u64 + n)).unwrap();
		let record = RegistryRecord {
			serial_number: serial.clone(),
			username: request.username.clone(),
			email: request.email.clone(),
			code_version: Some(request.metadata.code_version.clone()),
			fingerprint: None,
		};
		self.records.lock().unwrap().insert(serial.clone(), record);
		Ok(serial)
	}

	async fn bind_fingerprint(
		&self,
		serial: &SerialNumber,
		fingerprint: &Fingerprint,
	) -> Result<(), ClientError> {
		self.bind_calls.fetch_add(1, Ordering::SeqCst);
		tokio::task::yield_now().await;
		if self.fail_bind.load(Ordering::SeqCst) {
			return Err(ClientError::Status {
				status: 503,
				body: "registry overloaded".into(),
			});
		}
		let mut records = self.records.lock().unwrap();
		let record = records.get_mut(serial).ok_or(ClientError::NotFound)?;
		record.fingerprint = Some(fingerprint.as_hex().to_owned());
		Ok(())
	}

	async fn incomplete_records(&self) -> Result<Vec<RegistryRecord>, ClientError> {
		Ok(self
			.records
			.lock()
			.unwrap()
			.values()
			.filter(|r| r.is_incomplete())
			.cloned()
			.collect())
	}
}
