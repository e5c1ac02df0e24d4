//! Thin process entry point. Loads configuration, starts logging, and wires
//! the engine to its collaborators. The RPC surface that would drive
//! `PerformBackfill` from incoming requests is an embedding server's
//! responsibility, not this crate's.

use std::sync::Arc;

use wayback_core::{Config, Result};
use wayback_engine::BackfillEngine;
use wayback_federation::MockFederationClient;
use wayback_store::InMemoryEventStore;

#[tokio::main]
async fn main() -> Result<()> {
	let config_path = std::env::args().nth(1).unwrap_or_else(|| "wayback.toml".to_owned());
	let config = Config::load(&config_path)?;

	wayback_core::log::init_tracing(&config.log);
	wayback_core::info!(server_name = %config.server_name, "starting up");

	let store: Arc<dyn wayback_store::EventStore> = Arc::new(InMemoryEventStore::new());
	let federation: Arc<dyn wayback_federation::FederationClient> = Arc::new(MockFederationClient::new());
	let _engine = BackfillEngine::new(store, federation, config);

	wayback_core::info!("engine ready; awaiting requests from the embedding server");
	Ok(())
}
