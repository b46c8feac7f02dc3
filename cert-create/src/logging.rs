//! Tracing subscriber setup.

use anyhow::Context;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is unset or invalid.
pub const DEFAULT_FILTER: &str = "info";

/// Install the global subscriber: `RUST_LOG` filtering over the fmt layer.
///
/// Call once, before anything logs.
pub fn init() -> anyhow::Result<()> {
	tracing_subscriber::registry()
		.with(filter())
		.with(fmt::layer().with_target(false))
		.try_init()
		.context("failed to install tracing subscriber")
}

fn filter() -> EnvFilter {
	EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn default_filter_parses() {
		assert!(DEFAULT_FILTER.parse::<EnvFilter>().is_ok());
	}

	#[test]
	fn second_init_fails() {
		let _ = init();
		assert!(init().is_err());
	}
}
