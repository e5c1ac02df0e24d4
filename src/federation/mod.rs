//! The federation client (HTTP transport, request signing) is an external
//! collaborator: this crate defines the trait the engine depends on plus an
//! in-memory mock used by tests. A real deployment backs this trait with an
//! XMatrix-signing HTTP client.

mod mock;

use async_trait::async_trait;
use ruma::{OwnedEventId, RoomId, RoomVersionId, ServerName};
use wayback_core::{Pdu, Result};

pub use mock::MockFederationClient;

/// Response shape of the federation `/backfill` endpoint.
#[derive(Clone, Debug, Default)]
pub struct BackfillResponse {
	pub pdus: Vec<Pdu>,
}

/// Response shape of the federation `/state_ids` endpoint.
#[derive(Clone, Debug, Default)]
pub struct StateIdsResponse {
	pub pdu_ids: Vec<OwnedEventId>,
	pub auth_chain_ids: Vec<OwnedEventId>,
}

/// `Backfill`, `GetEvent`, and the federated state provider
/// (`StateIDsBeforeEvent`, `StateBeforeEvent`), all addressed to a named
/// remote server on behalf of a named local (virtual) host.
#[async_trait]
pub trait FederationClient: Send + Sync {
	async fn backfill(
		&self,
		origin: &ServerName,
		server: &ServerName,
		room_id: &RoomId,
		limit: u32,
		from_event_ids: &[OwnedEventId],
	) -> Result<BackfillResponse>;

	async fn get_event(&self, origin: &ServerName, server: &ServerName, event_id: &ruma::EventId) -> Result<Pdu>;

	async fn state_ids_before_event(
		&self,
		origin: &ServerName,
		server: &ServerName,
		room_id: &RoomId,
		event_id: &ruma::EventId,
	) -> Result<StateIdsResponse>;

	async fn state_before_event(
		&self,
		origin: &ServerName,
		server: &ServerName,
		room_id: &RoomId,
		room_version: &RoomVersionId,
		event_id: &ruma::EventId,
	) -> Result<Vec<Pdu>>;
}
