//! Code version stamp sent with every serial reservation.

use rand::Rng;
use time::{macros::format_description, OffsetDateTime, UtcOffset};

const PREFIX: &str = "cert-create";

/// A fresh stamp such as `cert-create-20260301120000000-0a1b2c3d`.
///
/// Generated once per process; every certificate issued by the process
/// records the same value.
pub fn code_version() -> Result<String, time::error::Format> {
	stamp(OffsetDateTime::now_utc(), rand::thread_rng().gen())
}

fn stamp(now: OffsetDateTime, nonce: u32) -> Result<String, time::error::Format> {
	// YYYYMMDDhhmmssmmm
	let digits = now
		.to_offset(UtcOffset::UTC)
		.format(format_description!(
			"[year][month][day][hour][minute][second][subsecond digits:3]"
		))?;
	Ok(format!("{PREFIX}-{digits}-{nonce:08x}"))
}
