use figment::{
	providers::{Env, Format, Toml},
	Figment,
};
use ruma::OwnedServerName;
use serde::Deserialize;

use crate::Result;

/// All the config options for the backfill engine.
///
/// Loaded from a TOML file merged with environment variables, environment
/// taking precedence.
#[derive(Clone, Debug, Deserialize)]
pub struct Config {
	/// The server_name this engine acts as when it originates outbound
	/// federation requests as the local (non-virtual-host) server.
	pub server_name: OwnedServerName,

	/// Servers always tried first when selecting backfill candidates.
	#[serde(default)]
	pub trusted_servers: Vec<OwnedServerName>,

	/// Hard cap on the number of candidate servers kept for one request.
	#[serde(default = "default_max_backfill_servers")]
	pub max_backfill_servers: usize,

	/// Fixed page size used for the local-only federated backfill request,
	/// regardless of the caller's requested limit.
	#[serde(default = "default_federation_backfill_limit")]
	pub federation_backfill_limit: u32,

	/// Upper bound on how many prev-events the missing-event fetcher and
	/// outlier-walk machinery will chase down for a single incoming event.
	#[serde(default = "default_max_fetch_prev_events")]
	pub max_fetch_prev_events: usize,

	/// `tracing_subscriber::EnvFilter` directive string.
	#[serde(default = "default_log")]
	pub log: String,
}

const fn default_max_backfill_servers() -> usize { 5 }

const fn default_federation_backfill_limit() -> u32 { 100 }

const fn default_max_fetch_prev_events() -> usize { 100 }

fn default_log() -> String { String::from("info") }

impl Config {
	pub fn load(path: &str) -> Result<Self> {
		Figment::new()
			.merge(Toml::file(path))
			.merge(Env::prefixed("WAYBACK_"))
			.extract()
			.map_err(|e| crate::err!(Config("config", "{e}")))
	}
}
