#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::http::{header, Request};
use cert_create::AppState;
use cert_issuance::{
	CaSigner, CertificateBuilder, ClientError, Fingerprint, IdentityRecord, IdentityResolver,
	IssuanceCoordinator, IssuanceMetadata, RegistryRecord, ReservationRequest, SerialNumber,
	SerialRegistry,
};
use rcgen::{
	BasicConstraints, CertificateParams, DistinguishedName, DnType, IsCa, KeyPair,
	KeyUsagePurpose,
};

pub type TestState = AppState<Users, Registry>;

pub fn ca() -> (String, String) {
	let key = KeyPair::generate_for(&rcgen::PKCS_ECDSA_P256_SHA256).unwrap();
	let mut params = CertificateParams::default();
	params.distinguished_name = DistinguishedName::new();
	params.distinguished_name.push(DnType::CountryName, "US");
	params
		.distinguished_name
		.push(DnType::OrganizationName, "OGT11 Inc");
	params
		.distinguished_name
		.push(DnType::CommonName, "OGT11 Inc Root CA");
	params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
	params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign];
	let cert = params.self_signed(&key).unwrap();
	(cert.pem(), key.serialize_pem())
}

pub fn csr(common_name: &str) -> String {
	let key = KeyPair::generate().unwrap();
	let mut params = CertificateParams::new(vec![]).unwrap();
	params.distinguished_name = DistinguishedName::new();
	params
		.distinguished_name
		.push(DnType::CommonName, common_name);
	params.serialize_request(&key).unwrap().pem().unwrap()
}

pub fn state(users: Users, registry: Registry) -> TestState {
	let (cert_pem, key_pem) = ca();
	let signer = CaSigner::from_pem(&cert_pem, &key_pem).unwrap();
	let coordinator = IssuanceCoordinator::new(
		users,
		registry,
		Arc::new(signer),
		CertificateBuilder::default(),
		IssuanceMetadata {
			code_version: "cert-create-test".into(),
		},
	);
	AppState::new(coordinator, 2048)
}

pub fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
	Request::builder()
		.method(method)
		.uri(uri)
		.header(header::CONTENT_TYPE, "application/json")
		.body(Body::from(body.to_string()))
		.unwrap()
}

pub fn get(uri: &str) -> Request<Body> {
	Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[derive(Default)]
pub struct Users {
	records: HashMap<String, IdentityRecord>,
	pub down: AtomicBool,
}

impl Users {
	pub fn with(records: impl IntoIterator<Item = IdentityRecord>) -> Self {
		Self {
			records: records
				.into_iter()
				.map(|r| (r.username.clone(), r))
				.collect(),
			..Default::default()
		}
	}

	pub fn alice() -> Self {
		Self::with([IdentityRecord {
			username: "alice".into(),
			display_name: "Alice Liddell".into(),
			email: "alice@example.com".into(),
		}])
	}
}

impl IdentityResolver for Users {
	async fn resolve(&self, username: &str) -> Result<IdentityRecord, ClientError> {
		if self.down.load(Ordering::SeqCst) {
			return Err(ClientError::Unavailable("connection refused".into()));
		}
		self.records.get(username).cloned().ok_or(ClientError::NotFound)
	}

	async fn exists(&self, username: &str) -> Result<bool, ClientError> {
		if self.down.load(Ordering::SeqCst) {
			return Err(ClientError::Unavailable("connection refused".into()));
		}
		Ok(self.records.contains_key(username))
	}
}

#[derive(Default)]
pub struct Registry {
	next: AtomicU64,
	records: Mutex<Vec<RegistryRecord>>,
	pub reserve_calls: AtomicUsize,
	pub fail_reserve: AtomicBool,
	pub fail_bind: AtomicBool,
}

impl Registry {
	pub fn reserve_calls(&self) -> usize {
		self.reserve_calls.load(Ordering::SeqCst)
	}
}

impl SerialRegistry for Registry {
	async fn reserve(&self, request: &ReservationRequest) -> Result<SerialNumber, ClientError> {
		self.reserve_calls.fetch_add(1, Ordering::SeqCst);
		if self.fail_reserve.load(Ordering::SeqCst) {
			return Err(ClientError::Status {
				status: 500,
				body: "duplicate key value violates unique constraint".into(),
			});
		}
		let serial = SerialNumber::from_u64(self.next.fetch_add(1, Ordering::SeqCst) + 1000).unwrap();
		self.records.lock().unwrap().push(RegistryRecord {
			serial_number: serial.clone(),
			username: request.username.clone(),
			email: request.email.clone(),
			code_version: Some(request.metadata.code_version.clone()),
			fingerprint: None,
		});
		Ok(serial)
	}

	async fn bind_fingerprint(
		&self,
		serial: &SerialNumber,
		fingerprint: &Fingerprint,
	) -> Result<(), ClientError> {
		if self.fail_bind.load(Ordering::SeqCst) {
			return Err(ClientError::Status {
				status: 502,
				body: "upstream timeout".into(),
			});
		}
		let mut records = self.records.lock().unwrap();
		let record = records
			.iter_mut()
			.find(|r| &r.serial_number == serial)
			.ok_or(ClientError::NotFound)?;
		record.fingerprint = Some(fingerprint.as_hex().to_owned());
		Ok(())
	}

	async fn incomplete_records(&self) -> Result<Vec<RegistryRecord>, ClientError> {
		Ok(self
			.records
			.lock()
			.unwrap()
			.iter()
			.filter(|r| r.is_incomplete())
			.cloned()
			.collect())
	}
}
