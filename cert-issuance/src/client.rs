//! Shared plumbing for the HTTP adapters of the external collaborators.

use reqwest::{Response, StatusCode, Url};
use thiserror::Error;

/// Failure talking to an external collaborator.
#[derive(Debug, Error)]
pub enum ClientError {
	/// The collaborator answered 404.
	#[error("not found")]
	NotFound,
	/// Any other non-success status.
	#[error("upstream responded with status {status}")]
	Status {
		/// HTTP status code.
		status: u16,
		/// Response body, kept for local logging only.
		body: String,
	},
	/// Connection, timeout or body decoding failure.
	#[error(transparent)]
	Http(#[from] reqwest::Error),
	/// The configured base URL cannot be extended with a path.
	#[error("invalid endpoint: {0}")]
	Endpoint(String),
	/// Collaborator unreachable for a reason other than HTTP.
	#[error("unavailable: {0}")]
	Unavailable(String),
}

pub(crate) fn parse_base_url(base: &str) -> Result<Url, ClientError> {
	let url = Url::parse(base).map_err(|e| ClientError::Endpoint(format!("{base}: {e}")))?;
	if url.cannot_be_a_base() {
		return Err(ClientError::Endpoint(format!("{base}: cannot be a base url")));
	}
	Ok(url)
}

/// Append percent-encoded path segments to `base`.
pub(crate) fn endpoint(base: &Url, segments: &[&str]) -> Result<Url, ClientError> {
	let mut url = base.clone();
	{
		let mut path = url
			.path_segments_mut()
			.map_err(|_| ClientError::Endpoint(format!("{base}: cannot be a base url")))?;
		path.pop_if_empty().extend(segments);
	}
	Ok(url)
}

/// Split responses into success, 404 and everything else.
pub(crate) async fn check_status(response: Response) -> Result<Response, ClientError> {
	let status = response.status();
	if status.is_success() {
		return Ok(response);
	}
	if status == StatusCode::NOT_FOUND {
		return Err(ClientError::NotFound);
	}
	let body = response.text().await.unwrap_or_default();
	Err(ClientError::Status {
		status: status.as_u16(),
		body,
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn endpoint_appends_encoded_segments() {
		let base = parse_base_url("http://localhost:3004/api").unwrap();
		let url = endpoint(&base, &["users", "alice smith/../admin"]).unwrap();
		assert_eq!(
			url.as_str(),
			"http://localhost:3004/api/users/alice%20smith%2F..%2Fadmin"
		);
	}

	#[test]
	fn endpoint_on_bare_host_and_trailing_slash() {
		let base = parse_base_url("http://localhost:3003").unwrap();
		let url = endpoint(&base, &["certificates"]).unwrap();
		assert_eq!(url.as_str(), "http://localhost:3003/certificates");

		let base = parse_base_url("http://localhost:3004/api/").unwrap();
		let url = endpoint(&base, &["users", "bob"]).unwrap();
		assert_eq!(url.as_str(), "http://localhost:3004/api/users/bob");
	}

	#[test]
	fn rejects_unusable_base() {
		assert!(matches!(
			parse_base_url("mailto:ca@example.com"),
			Err(ClientError::Endpoint(_))
		));
		assert!(matches!(
			parse_base_url("not a url"),
			Err(ClientError::Endpoint(_))
		));
	}
}
