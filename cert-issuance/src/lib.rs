/*!
Two-phase X.509 client certificate issuance

A user submits a PKCS#10 signing request together with their username. The
[`IssuanceCoordinator`] checks the request's self-signature, looks the user
up, reserves a serial number with an external registry, signs the
certificate with that serial embedded, and finally binds the certificate's
fingerprint to the serial in the registry.

Registry records that never got a fingerprint mark incomplete issuances.
They are expected, not corrupt: the protocol trades the occasional burned
serial for the guarantee that no serial is ever embedded in two different
certificates. [`SerialRegistry::incomplete_records`] lists them.

## Example

```no_run
# async fn run() -> Result<(), Box<dyn std::error::Error>> {
use std::sync::Arc;
use cert_issuance::{
	CaSigner, CertificateBuilder, HttpIdentityResolver, HttpSerialRegistry, IssuanceCoordinator,
	IssuanceMetadata,
};

let client = reqwest::Client::new();
let signer = CaSigner::from_pem(
	&std::fs::read_to_string("ca/ca-cert.pem")?,
	&std::fs::read_to_string("ca/ca-key.pem")?,
)?;
let coordinator = IssuanceCoordinator::new(
	HttpIdentityResolver::new(client.clone(), "http://localhost:3004/api")?,
	HttpSerialRegistry::new(client, "http://localhost:3003")?,
	Arc::new(signer),
	CertificateBuilder::default(),
	IssuanceMetadata {
		code_version: "dev".into(),
	},
);
let csr = std::fs::read_to_string("alice.csr")?;
let issued = coordinator.issue(&csr, "alice").await?;
println!("{} {}", issued.serial_number(), issued.fingerprint());
# Ok(())
# }
```
*/
#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod builder;
mod client;
mod coordinator;
mod csr;
pub mod encode;
mod error;
mod fingerprint;
mod identity;
mod registry;
mod serial;
mod signer;

pub use crate::builder::{
	CertificateBuilder, UnsignedCertificate, DEFAULT_VALIDITY_DAYS, MAX_VALIDITY_DAYS,
};
pub use crate::client::ClientError;
pub use crate::coordinator::{IssuanceCoordinator, IssuanceState, IssuedCertificate};
pub use crate::csr::{RequestedKey, VerifiedCsr};
pub use crate::error::{ErrorKind, IssueError};
pub use crate::fingerprint::{Fingerprint, FingerprintAlgorithm};
pub use crate::identity::{HttpIdentityResolver, IdentityRecord, IdentityResolver};
pub use crate::registry::{
	HttpSerialRegistry, IssuanceMetadata, RegistryRecord, ReservationRequest, SerialRegistry,
};
pub use crate::serial::{SerialError, SerialNumber};
pub use crate::signer::{CaLoadError, CaSigner, SignedCertificate};
