use std::future::Future;

use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::client::{check_status, endpoint, parse_base_url};
use crate::ClientError;

/// Identity attributes of a user, as the identity service knows them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityRecord {
	/// Login name.
	pub username: String,
	/// Human readable name.
	#[serde(default)]
	pub display_name: String,
	/// Email address; becomes the certificate's `rfc822Name`.
	#[serde(default)]
	pub email: String,
}

/// Resolves usernames to identity records.
///
/// Consulted fresh for every issuance; results are not cached.
pub trait IdentityResolver: Send + Sync {
	/// Look up `username`. A missing user is [`ClientError::NotFound`].
	fn resolve(
		&self,
		username: &str,
	) -> impl Future<Output = Result<IdentityRecord, ClientError>> + Send;

	/// Whether `username` exists.
	fn exists(&self, username: &str) -> impl Future<Output = Result<bool, ClientError>> + Send;
}

#[derive(Deserialize)]
struct ExistsResponse {
	exists: bool,
}

/// [`IdentityResolver`] backed by the user-admin HTTP service.
///
/// * `GET {base}/users/{username}`
/// * `GET {base}/users/check-username/{username}`
#[derive(Debug, Clone)]
pub struct HttpIdentityResolver {
	client: Client,
	base_url: Url,
}

impl HttpIdentityResolver {
	/// Resolver against `base_url` using a shared `client`.
	pub fn new(client: Client, base_url: &str) -> Result<Self, ClientError> {
		Ok(Self {
			client,
			base_url: parse_base_url(base_url)?,
		})
	}
}

impl IdentityResolver for HttpIdentityResolver {
	async fn resolve(&self, username: &str) -> Result<IdentityRecord, ClientError> {
		let url = endpoint(&self.base_url, &["users", username])?;
		debug!(%url, "resolving identity");
		let response = check_status(self.client.get(url).send().await?).await?;
		Ok(response.json().await?)
	}

	async fn exists(&self, username: &str) -> Result<bool, ClientError> {
		let url = endpoint(&self.base_url, &["users", "check-username", username])?;
		let response = check_status(self.client.get(url).send().await?).await?;
		let body: ExistsResponse = response.json().await?;
		Ok(body.exists)
	}
}
