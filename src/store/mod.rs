//! The event-database layer is an external collaborator: this crate defines
//! the facade the engine depends on (`EventStore`), plus an in-memory
//! implementation used by tests and by the demonstration binary. A real
//! deployment backs this trait with whatever storage engine the rest of the
//! server already uses.

mod in_memory;

use std::collections::HashSet;

use async_trait::async_trait;
use ruma::{OwnedEventId, RoomId, ServerName};
use wayback_core::{
	ids::{EventNid, RoomInfo, RoomNid, StateEntry, StateKeyNid, StateSnapshotNid, TypeNid},
	Pdu, Result,
};

pub use in_memory::InMemoryEventStore;

/// Result of resolving a batch of event IDs to state entries.
///
/// `allow_missing = false` callers get an error instead of this struct
/// whenever `missing` would be non-empty; `allow_missing = true` callers get
/// whatever was found plus the list the missing-event fetcher should chase.
#[derive(Clone, Debug, Default)]
pub struct StateEntriesLookup {
	pub entries: Vec<StateEntry>,
	pub missing: Vec<OwnedEventId>,
}

/// Read/write surface over events, state entries, and membership indexes,
/// addressed by stable numeric identifiers (NIDs).
#[async_trait]
pub trait EventStore: Send + Sync {
	async fn room_info(&self, room_id: &RoomId) -> Result<Option<RoomInfo>>;

	/// Resolve event IDs to NIDs. IDs with no known NID are simply absent
	/// from the returned map.
	async fn event_nids(
		&self,
		event_ids: &[OwnedEventId],
	) -> Result<std::collections::HashMap<OwnedEventId, EventNid>>;

	/// Load events by NID. Fails with `Error::MissingEvent` if any requested
	/// NID has no corresponding event, so callers on the serve-from-local
	/// path can fall back to federated backfill.
	async fn events(&self, room_info: &RoomInfo, nids: &[EventNid]) -> Result<Vec<Pdu>>;

	async fn state_entries_for_event_ids(
		&self,
		event_ids: &[OwnedEventId],
		allow_missing: bool,
	) -> Result<StateEntriesLookup>;

	/// Persist a new state snapshot and return its NID.
	async fn add_state(&self, room_nid: RoomNid, entries: Vec<StateEntry>) -> Result<StateSnapshotNid>;

	/// Bind an already-stored event to the snapshot that held before it.
	async fn set_state(&self, event_nid: EventNid, snapshot_nid: StateSnapshotNid) -> Result<()>;

	async fn get_or_create_room_info(&self, event: &Pdu) -> Result<RoomInfo>;

	async fn get_or_create_event_type_nid(&self, event_type: &str) -> Result<TypeNid>;

	/// `state_key` is `None` for non-state events, which are assigned the
	/// empty-state-key NID.
	async fn get_or_create_event_state_key_nid(&self, state_key: Option<&str>) -> Result<StateKeyNid>;

	async fn store_event(
		&self,
		event: &Pdu,
		room_info: &RoomInfo,
		type_nid: TypeNid,
		state_key_nid: StateKeyNid,
		auth_nids: &[EventNid],
		is_rejected: bool,
	) -> Result<EventNid>;

	/// If a stored redaction targets `event_nid`, return the redacted form
	/// of `event`; otherwise return `event` unchanged.
	async fn maybe_redact(&self, room_info: &RoomInfo, event_nid: EventNid, event: Pdu) -> Result<Pdu>;

	async fn get_membership_event_nids_for_room(
		&self,
		room_nid: RoomNid,
		joined_only: bool,
		local_only: bool,
	) -> Result<Vec<EventNid>>;

	/// Resolve state entries to the membership events they reference,
	/// optionally filtering to `join` membership only.
	async fn memberships_at_state(&self, entries: &[StateEntry], joined_only: bool) -> Result<Vec<Pdu>>;

	/// Walk the DAG backwards from `frontier`, collecting up to `limit`
	/// event NIDs in return order, plus the set of event IDs that must be
	/// redacted on the way out because `requesting_server` is not
	/// authorised to see them in full.
	async fn scan_event_tree(
		&self,
		room_info: &RoomInfo,
		frontier: &[OwnedEventId],
		limit: usize,
		requesting_server: &ServerName,
	) -> Result<(Vec<EventNid>, HashSet<OwnedEventId>)>;

	/// The state entries in effect immediately before `event_nid`, purely
	/// from local storage (no federation).
	async fn state_before_event(&self, room_info: &RoomInfo, event_nid: EventNid) -> Result<Vec<StateEntry>>;
}
