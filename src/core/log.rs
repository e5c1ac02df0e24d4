//! Thin wrappers around `tracing`'s macros so call sites in this workspace
//! never reach for `::tracing` directly, keeping logging swappable behind
//! one seam.

pub use tracing::Level;

#[macro_export]
macro_rules! error {
	($($x:tt)+) => { ::tracing::error!($($x)+) };
}

#[macro_export]
macro_rules! warn {
	($($x:tt)+) => { ::tracing::warn!($($x)+) };
}

#[macro_export]
macro_rules! info {
	($($x:tt)+) => { ::tracing::info!($($x)+) };
}

#[macro_export]
macro_rules! debug {
	($($x:tt)+) => { ::tracing::debug!($($x)+) };
}

#[macro_export]
macro_rules! trace {
	($($x:tt)+) => { ::tracing::trace!($($x)+) };
}

#[macro_export]
macro_rules! debug_warn {
	($($x:tt)+) => { ::tracing::warn!($($x)+) };
}

/// Install a `tracing-subscriber` global default from the configured filter
/// directives. Call once, near process start.
pub fn init_tracing(filter: &str) {
	use tracing_subscriber::{fmt, EnvFilter};

	let env_filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));
	let _ = fmt().with_env_filter(env_filter).try_init();
}
