//! HTTP surface of the issuance service.

use std::sync::Arc;

use axum::{
	extract::{rejection::JsonRejection, DefaultBodyLimit, Path, State},
	http::StatusCode,
	response::{IntoResponse, Response},
	routing::{get, post},
	Json, Router,
};
use cert_issuance::{
	ErrorKind, IdentityResolver, IssuanceCoordinator, IssueError, RegistryRecord, SerialNumber,
	SerialRegistry,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

/// Largest request body accepted, CSR included.
pub const BODY_LIMIT: usize = 1024 * 1024;

const ISSUANCE_FAILED: &str = "Failed to create or store certificate";

/// Shared handler state.
pub struct AppState<I, R> {
	coordinator: Arc<IssuanceCoordinator<I, R>>,
	key_size: u32,
}

impl<I, R> AppState<I, R> {
	/// State around `coordinator`; `key_size` is advertised to clients.
	pub fn new(coordinator: IssuanceCoordinator<I, R>, key_size: u32) -> Self {
		Self {
			coordinator: Arc::new(coordinator),
			key_size,
		}
	}

	/// The coordinator requests are served by.
	pub fn coordinator(&self) -> &IssuanceCoordinator<I, R> {
		&self.coordinator
	}
}

// Derived Clone would require I: Clone and R: Clone.
impl<I, R> Clone for AppState<I, R> {
	fn clone(&self) -> Self {
		Self {
			coordinator: self.coordinator.clone(),
			key_size: self.key_size,
		}
	}
}

/// Error returned by handlers.
#[derive(Debug)]
pub enum ApiError {
	/// Required field missing or empty.
	BadRequest(&'static str),
	/// Body is not the expected JSON, or too large.
	InvalidBody {
		/// Status chosen by the extractor.
		status: StatusCode,
		/// Extractor message.
		details: String,
	},
	/// Failure reported by the coordinator.
	Issue(IssueError),
	/// A collaborator failed outside of issuance.
	Upstream {
		/// Short message for the caller.
		error: &'static str,
		/// Safe summary of the cause.
		details: String,
	},
	/// The identity service could not answer a username check. The body
	/// still carries `valid: false`.
	UsernameCheck(String),
}

impl From<IssueError> for ApiError {
	fn from(err: IssueError) -> Self {
		ApiError::Issue(err)
	}
}

impl From<JsonRejection> for ApiError {
	fn from(rejection: JsonRejection) -> Self {
		ApiError::InvalidBody {
			status: rejection.status(),
			details: rejection.body_text(),
		}
	}
}

/// HTTP status for an issuance failure.
pub fn status_for(err: &IssueError) -> StatusCode {
	match err.kind() {
		ErrorKind::MalformedRequest | ErrorKind::InvalidSignature => StatusCode::BAD_REQUEST,
		ErrorKind::IdentityNotFound => StatusCode::NOT_FOUND,
		ErrorKind::InvalidIdentity => StatusCode::UNPROCESSABLE_ENTITY,
		ErrorKind::IdentityUnavailable | ErrorKind::Allocation | ErrorKind::Binding => {
			StatusCode::BAD_GATEWAY
		},
		ErrorKind::Signing => StatusCode::INTERNAL_SERVER_ERROR,
	}
}

fn client_message(kind: ErrorKind) -> &'static str {
	match kind {
		ErrorKind::MalformedRequest => "Invalid certificate signing request",
		ErrorKind::InvalidSignature => "Certificate signing request signature is invalid",
		ErrorKind::IdentityNotFound => "Unknown username",
		ErrorKind::InvalidIdentity => "User record cannot be used for a certificate",
		_ => ISSUANCE_FAILED,
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let (status, body) = match self {
			ApiError::BadRequest(error) => (StatusCode::BAD_REQUEST, json!({ "error": error })),
			ApiError::InvalidBody { status, details } => {
				(status, json!({ "error": "Invalid request body", "details": details }))
			},
			ApiError::Issue(err) => {
				let status = status_for(&err);
				let details = if err.is_client_error() {
					err.to_string()
				} else {
					err.safe_summary()
				};
				let mut body = json!({
					"error": client_message(err.kind()),
					"details": details,
				});
				if let Some(serial) = err.orphaned_serial() {
					body["serialNumber"] = serial.into();
				}
				(status, body)
			},
			ApiError::Upstream { error, details } => {
				(StatusCode::BAD_GATEWAY, json!({ "error": error, "details": details }))
			},
			ApiError::UsernameCheck(details) => (
				StatusCode::BAD_GATEWAY,
				json!({
					"valid": false,
					"error": "Username validation failed",
					"details": details,
				}),
			),
		};
		debug!(status = status.as_u16(), %body, "request failed");
		(status, Json(body)).into_response()
	}
}

/// Body of `POST /api/sign-certificate`.
#[derive(Debug, Deserialize)]
pub struct SignRequest {
	/// PEM encoded PKCS#10 request.
	#[serde(default)]
	pub csr: String,
	/// User the certificate is issued to.
	#[serde(default)]
	pub username: String,
}

/// Successful issuance.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignResponse {
	/// PEM encoded certificate.
	pub certificate: String,
	/// Serial as the registry returned it.
	pub serial_number: SerialNumber,
	/// Hex digest bound to the serial.
	pub fingerprint: String,
	/// Digest algorithm label, e.g. `sha256`.
	pub fingerprint_algorithm: &'static str,
}

/// Body of `POST /api/validate-username`.
#[derive(Debug, Deserialize)]
pub struct ValidateRequest {
	/// Username to look up.
	#[serde(default)]
	pub username: String,
}

/// Identity attributes as shown to the browser.
#[derive(Debug, Serialize)]
pub struct UserResponse {
	/// Display name.
	pub name: String,
	/// Email, empty when unknown.
	pub email: String,
	/// Login name.
	pub username: String,
}

/// Build the router.
pub fn router<I, R>(state: AppState<I, R>) -> Router
where
	I: IdentityResolver + 'static,
	R: SerialRegistry + 'static,
{
	Router::new()
		.route("/api/sign-certificate", post(sign_certificate::<I, R>))
		.route("/api/validate-username", post(validate_username::<I, R>))
		.route("/api/user/:username", get(get_user::<I, R>))
		.route("/api/certificates/incomplete", get(incomplete::<I, R>))
		.route("/api/health", get(health::<I, R>))
		.layer(DefaultBodyLimit::max(BODY_LIMIT))
		.with_state(state)
}

/// Serve `state` on `listener` until ctrl-c.
pub async fn serve<I, R>(listener: TcpListener, state: AppState<I, R>) -> std::io::Result<()>
where
	I: IdentityResolver + 'static,
	R: SerialRegistry + 'static,
{
	axum::serve(listener, router(state))
		.with_graceful_shutdown(shutdown_signal())
		.await
}

async fn shutdown_signal() {
	if let Err(e) = tokio::signal::ctrl_c().await {
		warn!(error = %e, "cannot listen for ctrl-c");
		std::future::pending::<()>().await;
	}
	info!("shutting down");
}

async fn sign_certificate<I, R>(
	State(state): State<AppState<I, R>>,
	payload: Result<Json<SignRequest>, JsonRejection>,
) -> Result<Json<SignResponse>, ApiError>
where
	I: IdentityResolver,
	R: SerialRegistry,
{
	let Json(request) = payload?;
	if request.csr.trim().is_empty() || request.username.trim().is_empty() {
		return Err(ApiError::BadRequest("Missing CSR or username"));
	}
	info!(username = %request.username, "certificate requested");

	let issued = state
		.coordinator
		.issue(&request.csr, &request.username)
		.await?;
	Ok(Json(SignResponse {
		certificate: issued.pem().to_owned(),
		serial_number: issued.serial_number().clone(),
		fingerprint: issued.fingerprint().as_hex().to_owned(),
		fingerprint_algorithm: issued.fingerprint().algorithm().label(),
	}))
}

async fn validate_username<I, R>(
	State(state): State<AppState<I, R>>,
	payload: Result<Json<ValidateRequest>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError>
where
	I: IdentityResolver,
	R: SerialRegistry,
{
	let Json(request) = payload?;
	if request.username.trim().is_empty() {
		return Err(ApiError::BadRequest("Username is required"));
	}
	match state.coordinator.username_exists(&request.username).await {
		Ok(valid) => Ok(Json(json!({ "valid": valid }))),
		Err(e) => Err(ApiError::UsernameCheck(e.safe_summary())),
	}
}

async fn get_user<I, R>(
	State(state): State<AppState<I, R>>,
	Path(username): Path<String>,
) -> Result<Json<UserResponse>, ApiError>
where
	I: IdentityResolver,
	R: SerialRegistry,
{
	match state.coordinator.resolve_identity(&username).await {
		Ok(record) => Ok(Json(UserResponse {
			name: record.display_name,
			email: record.email,
			username: record.username,
		})),
		Err(e) if e.is_client_error() => Err(e.into()),
		Err(e) => Err(ApiError::Upstream {
			error: "Failed to fetch user data",
			details: e.safe_summary(),
		}),
	}
}

async fn incomplete<I, R>(
	State(state): State<AppState<I, R>>,
) -> Result<Json<Vec<RegistryRecord>>, ApiError>
where
	I: IdentityResolver,
	R: SerialRegistry,
{
	match state.coordinator.incomplete_records().await {
		Ok(records) => {
			info!(count = records.len(), "incomplete issuances listed");
			Ok(Json(records))
		},
		Err(e) => {
			warn!(error = ?e, "registry query failed");
			Err(ApiError::Upstream {
				error: "Failed to query certificate registry",
				details: "certificate registry unavailable".into(),
			})
		},
	}
}

async fn health<I, R>(State(state): State<AppState<I, R>>) -> Json<serde_json::Value>
where
	I: IdentityResolver,
	R: SerialRegistry,
{
	// The signer cannot exist without loaded key material.
	Json(json!({
		"status": "ok",
		"caLoaded": true,
		"keySize": state.key_size,
	}))
}
