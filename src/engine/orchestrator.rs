//! Backfill Orchestrator: the public entry point. Dispatches between the
//! local-only path (we want more history for ourselves) and the
//! serve-from-local path (a peer is asking us), and carries out the
//! persist-with-snapshot sub-procedure for whatever a federated backfill
//! call returns.

use std::{collections::HashMap, sync::Arc};

use ruma::{OwnedEventId, OwnedRoomId, OwnedServerName};
use wayback_core::{
	ids::{EventNid, HistoryVisibility, RoomNid},
	verify::{PduVerifier, PermissiveVerifier},
	Config, Error, Pdu, Result,
};
use wayback_federation::FederationClient;
use wayback_store::EventStore;

use crate::{
	missing_events::{fetch_missing_events, Ratelimiter},
	persist::persist_events,
	requester::Requester,
};

/// `request` of `PerformBackfill`.
pub struct BackfillRequest {
	pub room_id: OwnedRoomId,
	pub prev_event_ids: Vec<OwnedEventId>,
	pub limit: usize,
	pub requesting_server: OwnedServerName,
	pub virtual_host: OwnedServerName,
	/// successor event ID -> prev-event IDs that are backwards extremities.
	pub backwards_extremities: HashMap<OwnedEventId, Vec<OwnedEventId>>,
}

/// `response` of `PerformBackfill`. `history_visibility` is only populated
/// on the local-only path.
#[derive(Default)]
pub struct BackfillResponse {
	pub events: Vec<Pdu>,
	pub history_visibility: Option<HistoryVisibility>,
}

/// Owns the collaborators and the per-engine-instance ratelimiter; builds a
/// fresh `Requester` for every call. Long-lived, unlike the requester it
/// constructs.
pub struct BackfillEngine {
	store: Arc<dyn EventStore>,
	federation: Arc<dyn FederationClient>,
	config: Config,
	ratelimiter: Ratelimiter,
	verifier: Arc<dyn PduVerifier>,
}

impl BackfillEngine {
	pub fn new(store: Arc<dyn EventStore>, federation: Arc<dyn FederationClient>, config: Config) -> Self {
		Self {
			store,
			federation,
			config,
			ratelimiter: Ratelimiter::default(),
			verifier: Arc::new(PermissiveVerifier),
		}
	}

	pub fn with_verifier(mut self, verifier: Arc<dyn PduVerifier>) -> Self {
		self.verifier = verifier;
		self
	}

	fn is_local_server(&self, server: &OwnedServerName) -> bool { server == &self.config.server_name }

	#[tracing::instrument(skip_all, fields(room_id = %request.room_id, requesting_server = %request.requesting_server))]
	pub async fn perform_backfill(&self, request: BackfillRequest) -> Result<BackfillResponse> {
		if self.is_local_server(&request.requesting_server) {
			return self.local_only_path(&request).await;
		}

		match self.serve_from_local_path(&request).await {
			| Err(Error::MissingEvent(..)) => self.local_only_path(&request).await,
			| other => other,
		}
	}

	/// We ourselves want more history: ask federation directly, persist what
	/// comes back, and fail only if nothing at all was obtained.
	async fn local_only_path(&self, request: &BackfillRequest) -> Result<BackfillResponse> {
		let mut requester = Requester::new(
			self.store.as_ref(),
			self.federation.as_ref(),
			&self.config,
			request.room_id.clone(),
			request.virtual_host.clone(),
			request.backwards_extremities.clone(),
		);

		for prev_event_id in &request.prev_event_ids {
			let servers = requester.servers_at_event(prev_event_id).await?;
			if !servers.is_empty() {
				break;
			}
		}

		let Some(first_prev) = request.prev_event_ids.first() else {
			let room_id = &request.room_id;
			return Err(wayback_core::err!("PerformBackfill called with no prev_event_ids for room {room_id}"));
		};
		if requester.servers.is_empty() {
			return Err(Error::NoServersAvailable(first_prev.clone()));
		}

		let mut last_error = None;
		let mut pdus = Vec::new();
		for server in requester.servers.clone() {
			match requester
				.backfill(&server, self.config.federation_backfill_limit, &request.prev_event_ids)
				.await
			{
				| Ok(response) if !response.pdus.is_empty() => {
					pdus = response.pdus;
					break;
				},
				| Ok(_) => continue,
				| Err(error) => last_error = Some(error),
			}
		}

		if pdus.is_empty() {
			return Err(last_error.unwrap_or_else(|| {
				Error::FederationExhausted(request.room_id.clone(), "no peer returned any events".to_owned())
			}));
		}

		pdus.retain(|pdu| {
			let belongs = pdu.belongs_to_room(&request.room_id);
			if !belongs {
				wayback_core::warn!(
					event_id = %pdu.event_id,
					pdu_room_id = %pdu.room_id,
					requested_room_id = %request.room_id,
					"dropping event returned for the wrong room"
				);
			}
			belongs
		});

		let outcome = persist_events(self.store.as_ref(), &pdus).await;
		if let Some(room_nid) = outcome.room_nid {
			self.persist_federated_results(&mut requester, room_nid, &pdus, &outcome.nids)
				.await?;
		}

		let events = pdus
			.iter()
			.filter_map(|pdu| outcome.stored.get(&pdu.event_id).cloned())
			.collect();

		Ok(BackfillResponse { events, history_visibility: Some(requester.history_visibility) })
	}

	/// A peer wants history from us: walk our own DAG and answer locally,
	/// applying visibility redactions on the way out.
	async fn serve_from_local_path(&self, request: &BackfillRequest) -> Result<BackfillResponse> {
		let room_info = self
			.store
			.room_info(&request.room_id)
			.await?
			.filter(|info| !info.is_stub)
			.ok_or_else(|| Error::MissingRoom(request.room_id.clone()))?;

		let (nids, to_redact) = self
			.store
			.scan_event_tree(&room_info, &request.prev_event_ids, request.limit, &request.requesting_server)
			.await?;

		let events = self.store.events(&room_info, &nids).await?;

		let events = events
			.into_iter()
			.map(|event| {
				if to_redact.contains(&event.event_id) {
					event.redacted()
				} else {
					event
				}
			})
			.collect();

		Ok(BackfillResponse { events, history_visibility: None })
	}

	/// For each federated event, resolve its before-state and bind a
	/// snapshot NID to it. Events with no resolvable before-state are
	/// skipped with a warning; failures resolving state entries (after one
	/// retry through the Missing-Event Fetcher) or assigning the snapshot
	/// abort the whole call.
	async fn persist_federated_results(
		&self,
		requester: &mut Requester<'_>,
		room_nid: RoomNid,
		events: &[Pdu],
		persisted_nids: &HashMap<OwnedEventId, EventNid>,
	) -> Result<()> {
		for event in events {
			let Some(&event_nid) = persisted_nids.get(&event.event_id) else {
				continue;
			};

			let before_ids = match requester.state_ids_before_event(event).await {
				| Ok(ids) => ids,
				| Err(error) => {
					wayback_core::warn!(event_id = %event.event_id, %error, "no before-state available, skipping snapshot");
					continue;
				},
			};

			let mut lookup = self.store.state_entries_for_event_ids(&before_ids, true).await?;
			if !lookup.missing.is_empty() {
				let recovered = fetch_missing_events(
					requester,
					&self.ratelimiter,
					self.verifier.as_ref(),
					&lookup.missing,
				)
				.await;
				persist_events(self.store.as_ref(), &recovered).await;

				lookup = self
					.store
					.state_entries_for_event_ids(&before_ids, false)
					.await
					.map_err(|error| {
						Error::SnapshotAssignmentFailure(event.event_id.clone(), error.to_string())
					})?;
			}

			let snapshot_nid = self
				.store
				.add_state(room_nid, lookup.entries)
				.await
				.map_err(|error| Error::SnapshotAssignmentFailure(event.event_id.clone(), error.to_string()))?;
			self.store
				.set_state(event_nid, snapshot_nid)
				.await
				.map_err(|error| Error::SnapshotAssignmentFailure(event.event_id.clone(), error.to_string()))?;
		}

		Ok(())
	}
}

