//! The federation-requester composite: implements the capability set a
//! backfill driver needs (`StateIDsBeforeEvent`, `StateBeforeEvent`,
//! `ServersAtEvent`, `Backfill`, `ProvideEvents`) and owns the per-request
//! transient state. Constructed fresh for every `PerformBackfill` call;
//! nothing here is shared across requests or threads.

use std::collections::HashMap;

use ruma::{EventId, OwnedEventId, OwnedRoomId, OwnedServerName, ServerName};
use wayback_core::{ids::HistoryVisibility, Config, Pdu, Result};
use wayback_federation::{BackfillResponse, FederationClient};
use wayback_store::EventStore;

use crate::state_tracker;

/// Per-request transient state (discarded once the request returns).
pub struct Requester<'a> {
	pub store: &'a dyn EventStore,
	pub federation: &'a dyn FederationClient,
	pub config: &'a Config,
	pub room_id: OwnedRoomId,
	pub virtual_host: OwnedServerName,

	pub servers: Vec<OwnedServerName>,
	pub event_id_to_before_state_ids: HashMap<OwnedEventId, Vec<OwnedEventId>>,
	pub event_id_map: HashMap<OwnedEventId, Pdu>,
	pub history_visibility: HistoryVisibility,
	/// successor event ID -> the prev-event IDs that are backwards
	/// extremities, so an extremity's prev-event ID can be translated back
	/// into a real event we can look up.
	pub bw_extrems: HashMap<OwnedEventId, Vec<OwnedEventId>>,
}

impl<'a> Requester<'a> {
	pub fn new(
		store: &'a dyn EventStore,
		federation: &'a dyn FederationClient,
		config: &'a Config,
		room_id: OwnedRoomId,
		virtual_host: OwnedServerName,
		bw_extrems: HashMap<OwnedEventId, Vec<OwnedEventId>>,
	) -> Self {
		Self {
			store,
			federation,
			config,
			room_id,
			virtual_host,
			servers: Vec::new(),
			event_id_to_before_state_ids: HashMap::new(),
			event_id_map: HashMap::new(),
			history_visibility: HistoryVisibility::default(),
			bw_extrems,
		}
	}

	/// `StateIDsBeforeEvent`: the list of state-event IDs in effect before
	/// `target`, using the cache, the single-parent roll-forward fast path,
	/// or falling through to federation.
	#[tracing::instrument(skip_all, fields(room_id = %self.room_id, event_id = %target.event_id))]
	pub async fn state_ids_before_event(&mut self, target: &Pdu) -> Result<Vec<OwnedEventId>> {
		self.event_id_map
			.insert(target.event_id.clone(), target.clone());

		if let Some(cached) = self.event_id_to_before_state_ids.get(&target.event_id) {
			return Ok(cached.clone());
		}

		if target.prev_events.is_empty()
			&& target.kind.to_string() == "m.room.create"
			&& target.state_key.as_deref() == Some("")
		{
			self.event_id_to_before_state_ids
				.insert(target.event_id.clone(), Vec::new());
			return Ok(Vec::new());
		}

		if let [prev_id] = target.prev_events.as_slice() {
			if let (Some(prev), Some(prev_before)) = (
				self.event_id_map.get(prev_id).cloned(),
				self.event_id_to_before_state_ids.get(prev_id).cloned(),
			) {
				if let Some(rolled) =
					state_tracker::calculate_new_state_ids(&prev, &prev_before, &self.event_id_map)
				{
					self.event_id_to_before_state_ids
						.insert(target.event_id.clone(), rolled.clone());
					return Ok(rolled);
				}
			}
		}

		let mut last_error = None;
		let servers = self.servers.clone();
		for server in &servers {
			match self
				.federation
				.state_ids_before_event(&self.virtual_host, server, &self.room_id, &target.event_id)
				.await
			{
				| Ok(response) => {
					self.event_id_to_before_state_ids
						.insert(target.event_id.clone(), response.pdu_ids.clone());
					return Ok(response.pdu_ids);
				},
				| Err(error) => last_error = Some(error),
			}
		}

		Err(last_error.unwrap_or_else(|| {
			wayback_core::Error::NoServersAvailable(target.event_id.clone())
		}))
	}

	/// `StateBeforeEvent`: bulk-resolve state entries for `ids`, trying the
	/// local store first and only falling through to federation if any ID
	/// is not locally known.
	pub async fn state_before_event(&mut self, event_id: &EventId, ids: &[OwnedEventId]) -> Result<Vec<Pdu>> {
		let room_info = self
			.store
			.room_info(&self.room_id)
			.await?
			.ok_or_else(|| wayback_core::Error::MissingRoom(self.room_id.clone()))?;

		let lookup = self.store.state_entries_for_event_ids(ids, true).await?;
		if lookup.missing.is_empty() {
			let nids: Vec<_> = lookup.entries.iter().map(|entry| entry.event_nid).collect();
			return self.provide_events(&nids).await;
		}

		let mut last_error = None;
		let servers = self.servers.clone();
		for server in &servers {
			match self
				.federation
				.state_before_event(
					&self.virtual_host,
					server,
					&self.room_id,
					&room_info.room_version,
					event_id,
				)
				.await
			{
				| Ok(pdus) => return Ok(pdus),
				| Err(error) => last_error = Some(error),
			}
		}

		Err(last_error
			.unwrap_or_else(|| wayback_core::Error::NoServersAvailable(event_id.to_owned())))
	}

	/// `Backfill`: transparent pass-through to the federation client.
	pub async fn backfill(
		&self,
		server: &ServerName,
		limit: u32,
		from_event_ids: &[OwnedEventId],
	) -> Result<BackfillResponse> {
		self.federation
			.backfill(&self.virtual_host, server, &self.room_id, limit, from_event_ids)
			.await
	}

	/// `ProvideEvents`: local-only bulk event loader.
	pub async fn provide_events(&self, nids: &[wayback_core::ids::EventNid]) -> Result<Vec<Pdu>> {
		let room_info = self
			.store
			.room_info(&self.room_id)
			.await?
			.ok_or_else(|| wayback_core::Error::MissingRoom(self.room_id.clone()))?;
		self.store.events(&room_info, nids).await
	}

	/// `ServersAtEvent`: delegates to the server selector, recording the
	/// observed history visibility on the requester.
	pub async fn servers_at_event(&mut self, event_id: &EventId) -> Result<Vec<OwnedServerName>> {
		let (servers, visibility) = crate::selector::servers_at_event(self, event_id).await?;
		self.servers = servers.clone();
		self.history_visibility = visibility;
		Ok(servers)
	}
}
