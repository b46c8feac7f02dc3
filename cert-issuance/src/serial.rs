use std::fmt;

use serde::{Deserialize, Serialize};

/// Largest serial RFC 5280 allows, in octets.
const MAX_SERIAL_LEN: usize = 20;

/// A serial number handed out by the registry.
///
/// Keeps the registry's own rendering for display and echoing back to
/// callers, next to the big-endian magnitude that is embedded in the
/// certificate. Leading zero octets are dropped from the magnitude, so two
/// serials compare equal whenever they denote the same integer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "WireSerial", into = "WireSerial")]
pub struct SerialNumber {
	text: String,
	bytes: Vec<u8>,
	// set when the registry sent a JSON number, so it is echoed back as one
	number: Option<u64>,
}

/// Errors for serials that cannot be embedded in a certificate.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SerialError {
	/// Not a hexadecimal string.
	#[error("serial {0:?} is not hexadecimal")]
	NotHex(String),
	/// Encodes to zero.
	#[error("serial must be a positive integer")]
	Zero,
	/// Needs more than 20 octets as a positive DER INTEGER.
	#[error("serial {0:?} is longer than 20 octets")]
	TooLong(String),
}

impl SerialNumber {
	/// Parse a hex serial. Accepts an optional `0x` prefix and `:` separators.
	pub fn parse(text: &str) -> Result<Self, SerialError> {
		let trimmed = text.trim();
		let digits = trimmed
			.strip_prefix("0x")
			.or_else(|| trimmed.strip_prefix("0X"))
			.unwrap_or(trimmed)
			.replace(':', "");
		if digits.is_empty() {
			return Err(SerialError::NotHex(text.to_owned()));
		}
		let padded = if digits.len() % 2 == 1 {
			format!("0{digits}")
		} else {
			digits
		};
		let bytes = hex::decode(&padded).map_err(|_| SerialError::NotHex(text.to_owned()))?;
		Self::from_parts(trimmed.to_owned(), bytes, None)
	}

	/// Serial for an integer the registry returned as a JSON number.
	pub fn from_u64(value: u64) -> Result<Self, SerialError> {
		Self::from_parts(value.to_string(), value.to_be_bytes().to_vec(), Some(value))
	}

	fn from_parts(text: String, bytes: Vec<u8>, number: Option<u64>) -> Result<Self, SerialError> {
		let bytes = strip_leading_zeros(&bytes).to_vec();
		if bytes.is_empty() {
			return Err(SerialError::Zero);
		}
		// a set high bit costs a leading zero octet in the DER INTEGER
		if bytes.len() > MAX_SERIAL_LEN || (bytes.len() == MAX_SERIAL_LEN && bytes[0] & 0x80 != 0) {
			return Err(SerialError::TooLong(text));
		}
		Ok(Self {
			text,
			bytes,
			number,
		})
	}

	/// The serial as the registry rendered it.
	pub fn as_str(&self) -> &str {
		&self.text
	}

	/// Big-endian magnitude without leading zero octets.
	pub fn as_bytes(&self) -> &[u8] {
		&self.bytes
	}

	/// Whether the content octets of a DER INTEGER denote this serial.
	pub fn matches_der_integer(&self, content: &[u8]) -> bool {
		strip_leading_zeros(content) == self.bytes.as_slice()
	}
}

fn strip_leading_zeros(bytes: &[u8]) -> &[u8] {
	let first = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
	&bytes[first..]
}

impl PartialEq for SerialNumber {
	fn eq(&self, other: &Self) -> bool {
		self.bytes == other.bytes
	}
}

impl Eq for SerialNumber {}

impl std::hash::Hash for SerialNumber {
	fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
		self.bytes.hash(state);
	}
}

impl fmt::Display for SerialNumber {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.text)
	}
}

impl From<&SerialNumber> for rcgen::SerialNumber {
	fn from(serial: &SerialNumber) -> Self {
		rcgen::SerialNumber::from_slice(&serial.bytes)
	}
}

/// Serial numbers arrive either as hex strings or as plain integers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum WireSerial {
	Number(u64),
	Text(String),
}

impl TryFrom<WireSerial> for SerialNumber {
	type Error = SerialError;

	fn try_from(wire: WireSerial) -> Result<Self, Self::Error> {
		match wire {
			WireSerial::Number(n) => Self::from_u64(n),
			WireSerial::Text(s) => Self::parse(&s),
		}
	}
}

impl From<SerialNumber> for WireSerial {
	fn from(serial: SerialNumber) -> Self {
		match serial.number {
			Some(n) => WireSerial::Number(n),
			None => WireSerial::Text(serial.text),
		}
	}
}
