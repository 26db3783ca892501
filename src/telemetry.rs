//! Tracing subscriber setup: structured JSON logs to stdout, level controlled by
//! `RUST_LOG` (falling back to a configured default), plus the per-request span factory
//! the processor module uses.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

/// Initialize the global tracing subscriber. Call once, at process startup, before any
/// other module emits a span or event.
pub fn init_logging(default_level: &str) {
	let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

	let fmt_layer = fmt::layer().json().with_target(true).with_current_span(true).with_span_list(true);

	Registry::default().with(env_filter).with(fmt_layer).init();
}

#[cfg(test)]
mod tests {
	// `init_logging` sets a process-global subscriber, which can only be installed once
	// per test binary; exercising it here would make test order-dependent, so this
	// module is intentionally left without a test for `init_logging` itself.
}
