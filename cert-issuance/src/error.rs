use thiserror::Error;

/// Reasons an issuance attempt can fail.
///
/// Variants up to and including [`IssueError::IdentityUnavailable`] are
/// raised before the registry is contacted and leave no trace anywhere.
/// [`IssueError::AllocationError`] means Phase 1 itself failed. The variants
/// after it are raised once a serial has been reserved, so the registry holds
/// a record without a fingerprint for the serial the variant carries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum IssueError {
	/// The signing request could not be decoded.
	#[error("malformed certificate signing request: {0}")]
	MalformedRequest(String),
	/// The signing request's self-signature does not verify against its own public key.
	#[error("certificate signing request signature does not verify")]
	InvalidSignature,
	/// The identity service has no user with this name.
	#[error("unknown username: {0}")]
	IdentityNotFound(String),
	/// The identity record exists but cannot populate the certificate.
	#[error("identity record for {username} is unusable: {reason}")]
	InvalidIdentity {
		/// User the record belongs to.
		username: String,
		/// What is wrong with it.
		reason: String,
	},
	/// The identity service could not be reached or answered with an error.
	#[error("identity service unavailable: {0}")]
	IdentityUnavailable(String),
	/// Phase 1 failed: no serial number was obtained.
	#[error("serial allocation failed: {0}")]
	AllocationError(String),
	/// The CA could not produce a valid signed certificate.
	#[error("signing failed for serial {serial}: {reason}")]
	SigningError {
		/// Serial reserved for the failed attempt.
		serial: String,
		/// Underlying failure.
		reason: String,
	},
	/// Phase 2 failed: the fingerprint was not recorded against the serial.
	#[error("fingerprint binding failed for serial {serial}: {reason}")]
	BindingError {
		/// Serial whose registry record is left incomplete.
		serial: String,
		/// Underlying failure.
		reason: String,
	},
}

/// Discriminant of [`IssueError`], used as the `Failed` payload of
/// [`IssuanceState`](crate::IssuanceState) and as a stable error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
	#[allow(missing_docs)]
	MalformedRequest,
	#[allow(missing_docs)]
	InvalidSignature,
	#[allow(missing_docs)]
	IdentityNotFound,
	#[allow(missing_docs)]
	InvalidIdentity,
	#[allow(missing_docs)]
	IdentityUnavailable,
	#[allow(missing_docs)]
	Allocation,
	#[allow(missing_docs)]
	Signing,
	#[allow(missing_docs)]
	Binding,
}

impl ErrorKind {
	/// Stable snake_case code.
	pub fn as_str(&self) -> &'static str {
		match self {
			ErrorKind::MalformedRequest => "malformed_request",
			ErrorKind::InvalidSignature => "invalid_signature",
			ErrorKind::IdentityNotFound => "identity_not_found",
			ErrorKind::InvalidIdentity => "invalid_identity",
			ErrorKind::IdentityUnavailable => "identity_unavailable",
			ErrorKind::Allocation => "allocation_error",
			ErrorKind::Signing => "signing_error",
			ErrorKind::Binding => "binding_error",
		}
	}
}

impl IssueError {
	/// Returns the discriminant of this error.
	pub fn kind(&self) -> ErrorKind {
		match self {
			IssueError::MalformedRequest(_) => ErrorKind::MalformedRequest,
			IssueError::InvalidSignature => ErrorKind::InvalidSignature,
			IssueError::IdentityNotFound(_) => ErrorKind::IdentityNotFound,
			IssueError::InvalidIdentity { .. } => ErrorKind::InvalidIdentity,
			IssueError::IdentityUnavailable(_) => ErrorKind::IdentityUnavailable,
			IssueError::AllocationError(_) => ErrorKind::Allocation,
			IssueError::SigningError { .. } => ErrorKind::Signing,
			IssueError::BindingError { .. } => ErrorKind::Binding,
		}
	}

	/// `true` when the caller's input caused the failure and a corrected
	/// request may succeed.
	pub fn is_client_error(&self) -> bool {
		matches!(
			self,
			IssueError::MalformedRequest(_)
				| IssueError::InvalidSignature
				| IssueError::IdentityNotFound(_)
				| IssueError::InvalidIdentity { .. }
		)
	}

	/// Serial reserved before the failure, if any.
	pub fn orphaned_serial(&self) -> Option<&str> {
		match self {
			IssueError::SigningError { serial, .. } | IssueError::BindingError { serial, .. } => {
				Some(serial)
			},
			_ => None,
		}
	}

	/// Message that is safe to hand to an external caller.
	///
	/// Client errors are returned verbatim. Server-side failures are reduced
	/// to a summary without upstream bodies or internal error text.
	pub fn safe_summary(&self) -> String {
		match self {
			IssueError::IdentityUnavailable(_) => "identity service unavailable".into(),
			IssueError::AllocationError(_) => "serial number allocation failed".into(),
			IssueError::SigningError { .. } => "certificate signing failed".into(),
			IssueError::BindingError { serial, .. } => {
				format!("fingerprint binding failed; serial {serial} was not completed")
			},
			_ => self.to_string(),
		}
	}
}
