//! Logging bootstrap for hosts that don't bring their own subscriber.
//!
//! The library itself only emits `tracing` events; initialization is the
//! host's choice. `init_logging` installs a structured JSON subscriber with
//! an env-filter, for embedded tools and tests that want output without
//! wiring one up themselves.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize structured JSON logging to stdout.
///
/// Filter resolution order: `RUST_LOG`, then the `default_level` argument,
/// then `info`. Returns an error when a subscriber is already installed.
pub fn init_logging(default_level: Option<&str>) -> anyhow::Result<()> {
	let fallback = default_level.unwrap_or("info");
	let env_filter = EnvFilter::try_from_default_env()
		.or_else(|_| EnvFilter::try_new(fallback))
		.unwrap_or_else(|_| EnvFilter::new("info"));

	let json_layer = tracing_subscriber::fmt::layer()
		.json()
		.with_current_span(true)
		.with_target(true)
		.with_level(true)
		.with_file(true)
		.with_line_number(true);

	tracing_subscriber::registry()
		.with(env_filter)
		.with(json_layer)
		.try_init()
		.map_err(|e| anyhow::anyhow!("failed to initialize logging: {e}"))?;

	Ok(())
}

#[cfg(test)]
#[cfg(feature = "unit-tests")]
mod tests {
	#[test]
	fn logging_initialization_is_idempotent_enough() {
		// Only one subscriber per process; the second call must error rather
		// than panic.
		let first = super::init_logging(Some("debug"));
		let second = super::init_logging(None);
		assert!(first.is_ok() || second.is_err());
	}
}
