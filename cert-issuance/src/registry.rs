use std::future::Future;

use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::client::{check_status, endpoint, parse_base_url};
use crate::{ClientError, Fingerprint, SerialNumber};

/// Build metadata recorded with every reservation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuanceMetadata {
	/// Version stamp of the issuing service.
	pub code_version: String,
}

/// Phase 1 payload: who the serial is reserved for.
#[derive(Debug, Clone, Serialize)]
pub struct ReservationRequest {
	/// Username from the identity record.
	pub username: String,
	/// Email from the identity record.
	pub email: String,
	/// Issuance metadata, flattened into the request body.
	#[serde(flatten)]
	pub metadata: IssuanceMetadata,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReservationResponse {
	serial_number: SerialNumber,
}

#[derive(Serialize)]
struct BindingRequest<'a> {
	fingerprint: &'a str,
}

/// A certificate record held by the registry.
///
/// A record whose `fingerprint` is `None` is an incomplete issuance: its
/// serial was reserved but no fingerprint was ever bound to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryRecord {
	/// Serial the record is keyed by.
	pub serial_number: SerialNumber,
	/// User the serial was reserved for.
	pub username: String,
	/// Email the serial was reserved for.
	#[serde(default)]
	pub email: String,
	/// Version stamp of the service that reserved the serial.
	#[serde(default)]
	pub code_version: Option<String>,
	/// Bound fingerprint, if Phase 2 completed.
	#[serde(default)]
	pub fingerprint: Option<String>,
}

impl RegistryRecord {
	/// `true` when no fingerprint has been bound.
	pub fn is_incomplete(&self) -> bool {
		self.fingerprint.as_deref().map_or(true, str::is_empty)
	}
}

/// The external serial allocator and certificate registry.
///
/// The registry alone guarantees serial uniqueness; callers hold no locks.
pub trait SerialRegistry: Send + Sync {
	/// Phase 1: create a record and return its freshly allocated serial.
	fn reserve(
		&self,
		request: &ReservationRequest,
	) -> impl Future<Output = Result<SerialNumber, ClientError>> + Send;

	/// Phase 2: record the fingerprint of the certificate signed with `serial`.
	fn bind_fingerprint(
		&self,
		serial: &SerialNumber,
		fingerprint: &Fingerprint,
	) -> impl Future<Output = Result<(), ClientError>> + Send;

	/// Records without a fingerprint, for reconciliation.
	fn incomplete_records(
		&self,
	) -> impl Future<Output = Result<Vec<RegistryRecord>, ClientError>> + Send;
}

/// [`SerialRegistry`] backed by the cert-admin HTTP service.
///
/// * `POST {base}/certificates`
/// * `PATCH {base}/certificates/{serial}`
/// * `GET {base}/certificates`
#[derive(Debug, Clone)]
pub struct HttpSerialRegistry {
	client: Client,
	base_url: Url,
}

impl HttpSerialRegistry {
	/// Registry client against `base_url` using a shared `client`.
	pub fn new(client: Client, base_url: &str) -> Result<Self, ClientError> {
		Ok(Self {
			client,
			base_url: parse_base_url(base_url)?,
		})
	}
}

impl SerialRegistry for HttpSerialRegistry {
	async fn reserve(&self, request: &ReservationRequest) -> Result<SerialNumber, ClientError> {
		let url = endpoint(&self.base_url, &["certificates"])?;
		debug!(%url, username = %request.username, "reserving serial");
		let response = check_status(self.client.post(url).json(request).send().await?).await?;
		let body: ReservationResponse = response.json().await?;
		Ok(body.serial_number)
	}

	async fn bind_fingerprint(
		&self,
		serial: &SerialNumber,
		fingerprint: &Fingerprint,
	) -> Result<(), ClientError> {
		let url = endpoint(&self.base_url, &["certificates", serial.as_str()])?;
		debug!(%url, %fingerprint, "binding fingerprint");
		let body = BindingRequest {
			fingerprint: fingerprint.as_hex(),
		};
		check_status(self.client.patch(url).json(&body).send().await?).await?;
		Ok(())
	}

	async fn incomplete_records(&self) -> Result<Vec<RegistryRecord>, ClientError> {
		let url = endpoint(&self.base_url, &["certificates"])?;
		let response = check_status(self.client.get(url).send().await?).await?;
		let records: Vec<RegistryRecord> = response.json().await?;
		Ok(records.into_iter().filter(RegistryRecord::is_incomplete).collect())
	}
}
