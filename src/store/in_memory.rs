use std::{
	collections::{HashMap, HashSet, VecDeque},
	sync::{
		atomic::{AtomicU64, Ordering},
		Mutex,
	},
};

use async_trait::async_trait;
use ruma::{
	events::room::member::RoomMemberEventContent, OwnedEventId, OwnedRoomId, RoomId, ServerName,
};
use wayback_core::{
	ids::{EventNid, RoomInfo, RoomNid, StateEntry, StateKeyNid, StateSnapshotNid, TypeNid},
	Pdu, Result,
};

use super::{EventStore, StateEntriesLookup};

/// Reference `EventStore` backed by in-process maps, guarded by a single
/// mutex (no concurrent-request contention to speak of in tests). NID
/// assignment uses one counter shared across every namespace rather than
/// one per namespace.
#[derive(Default)]
pub struct InMemoryEventStore {
	inner: Mutex<Inner>,
	next_nid: AtomicU64,
}

#[derive(Default)]
struct Inner {
	event_id_to_nid: HashMap<OwnedEventId, EventNid>,
	nid_to_event_id: HashMap<EventNid, OwnedEventId>,
	events: HashMap<EventNid, Pdu>,
	event_room: HashMap<EventNid, RoomNid>,
	room_id_to_nid: HashMap<OwnedRoomId, RoomNid>,
	room_nid_to_id: HashMap<RoomNid, OwnedRoomId>,
	room_infos: HashMap<RoomNid, RoomInfo>,
	type_nids: HashMap<String, TypeNid>,
	state_key_nids: HashMap<String, StateKeyNid>,
	snapshots: HashMap<StateSnapshotNid, Vec<StateEntry>>,
	state_before_event: HashMap<EventNid, StateSnapshotNid>,
	/// redacted target event ID -> true once a redaction for it is known.
	redacted: HashSet<OwnedEventId>,
	/// events an out-of-scope authorisation layer has decided must be
	/// redacted on the way out to at least one requesting server. Whichever
	/// component makes that call is external; this store only remembers the
	/// verdict for `scan_event_tree` to surface.
	egress_redact: HashSet<OwnedEventId>,
}

impl InMemoryEventStore {
	pub fn new() -> Self { Self::default() }

	fn next_count(&self) -> u64 { self.next_nid.fetch_add(1, Ordering::Relaxed) }

	/// Record that `event_id` must be returned in redacted form on
	/// `scan_event_tree`'s output. Exposed for tests and the demonstration
	/// binary standing in for a real authorisation layer.
	pub fn mark_for_egress_redaction(&self, event_id: OwnedEventId) {
		self.inner
			.lock()
			.expect("store mutex poisoned")
			.egress_redact
			.insert(event_id);
	}
}

fn is_join_membership(pdu: &Pdu) -> bool {
	serde_json::from_str::<RoomMemberEventContent>(pdu.content.get())
		.map(|content| content.membership == ruma::events::room::member::MembershipState::Join)
		.unwrap_or(false)
}

#[async_trait]
impl EventStore for InMemoryEventStore {
	async fn room_info(&self, room_id: &RoomId) -> Result<Option<RoomInfo>> {
		let inner = self.inner.lock().expect("store mutex poisoned");
		Ok(inner
			.room_id_to_nid
			.get(room_id)
			.and_then(|nid| inner.room_infos.get(nid))
			.cloned())
	}

	async fn event_nids(&self, event_ids: &[OwnedEventId]) -> Result<HashMap<OwnedEventId, EventNid>> {
		let inner = self.inner.lock().expect("store mutex poisoned");
		Ok(event_ids
			.iter()
			.filter_map(|id| inner.event_id_to_nid.get(id).map(|nid| (id.clone(), *nid)))
			.collect())
	}

	async fn events(&self, room_info: &RoomInfo, nids: &[EventNid]) -> Result<Vec<Pdu>> {
		let inner = self.inner.lock().expect("store mutex poisoned");
		let room_id = inner
			.room_nid_to_id
			.get(&room_info.room_nid)
			.cloned()
			.expect("room_info passed to the store always has a reverse id mapping");
		let mut out = Vec::with_capacity(nids.len());
		for nid in nids {
			let event = inner.events.get(nid).cloned().ok_or_else(|| {
				let event_id = inner
					.nid_to_event_id
					.get(nid)
					.cloned()
					.expect("event NID minted by this store always has a reverse id mapping");
				wayback_core::Error::MissingEvent(room_id.clone(), event_id)
			})?;
			out.push(event);
		}
		Ok(out)
	}

	async fn state_entries_for_event_ids(
		&self,
		event_ids: &[OwnedEventId],
		allow_missing: bool,
	) -> Result<StateEntriesLookup> {
		let inner = self.inner.lock().expect("store mutex poisoned");
		let mut lookup = StateEntriesLookup::default();
		for event_id in event_ids {
			let Some(event_nid) = inner.event_id_to_nid.get(event_id).copied() else {
				lookup.missing.push(event_id.clone());
				continue;
			};
			let Some(event) = inner.events.get(&event_nid) else {
				lookup.missing.push(event_id.clone());
				continue;
			};
			let Some((type_name, state_key)) = event.state_slot() else {
				continue;
			};
			let (Some(type_nid), Some(state_key_nid)) = (
				inner.type_nids.get(&type_name).copied(),
				inner.state_key_nids.get(&state_key).copied(),
			) else {
				lookup.missing.push(event_id.clone());
				continue;
			};
			lookup.entries.push(StateEntry { type_nid, state_key_nid, event_nid });
		}

		if !allow_missing && !lookup.missing.is_empty() {
			let first = lookup.missing[0].clone();
			return Err(wayback_core::err!(
				"state entries requested for unknown event {first}"
			));
		}

		Ok(lookup)
	}

	async fn add_state(&self, _room_nid: RoomNid, entries: Vec<StateEntry>) -> Result<StateSnapshotNid> {
		let mut inner = self.inner.lock().expect("store mutex poisoned");
		let nid = StateSnapshotNid(self.next_count());
		inner.snapshots.insert(nid, entries);
		Ok(nid)
	}

	async fn set_state(&self, event_nid: EventNid, snapshot_nid: StateSnapshotNid) -> Result<()> {
		let mut inner = self.inner.lock().expect("store mutex poisoned");
		inner.state_before_event.insert(event_nid, snapshot_nid);
		Ok(())
	}

	async fn get_or_create_room_info(&self, event: &Pdu) -> Result<RoomInfo> {
		let mut inner = self.inner.lock().expect("store mutex poisoned");
		if let Some(nid) = inner.room_id_to_nid.get(&event.room_id) {
			return Ok(inner.room_infos[nid].clone());
		}

		let room_nid = RoomNid(self.next_count());
		let info = RoomInfo { room_nid, room_version: ruma::RoomVersionId::V11, is_stub: false };
		inner.room_id_to_nid.insert(event.room_id.clone(), room_nid);
		inner.room_nid_to_id.insert(room_nid, event.room_id.clone());
		inner.room_infos.insert(room_nid, info.clone());
		Ok(info)
	}

	async fn get_or_create_event_type_nid(&self, event_type: &str) -> Result<TypeNid> {
		let mut inner = self.inner.lock().expect("store mutex poisoned");
		if let Some(nid) = inner.type_nids.get(event_type) {
			return Ok(*nid);
		}
		let nid = TypeNid(self.next_count());
		inner.type_nids.insert(event_type.to_owned(), nid);
		Ok(nid)
	}

	async fn get_or_create_event_state_key_nid(&self, state_key: Option<&str>) -> Result<StateKeyNid> {
		let key = state_key.unwrap_or_default();
		let mut inner = self.inner.lock().expect("store mutex poisoned");
		if let Some(nid) = inner.state_key_nids.get(key) {
			return Ok(*nid);
		}
		let nid = StateKeyNid(self.next_count());
		inner.state_key_nids.insert(key.to_owned(), nid);
		Ok(nid)
	}

	async fn store_event(
		&self,
		event: &Pdu,
		room_info: &RoomInfo,
		_type_nid: TypeNid,
		_state_key_nid: StateKeyNid,
		_auth_nids: &[EventNid],
		_is_rejected: bool,
	) -> Result<EventNid> {
		let mut inner = self.inner.lock().expect("store mutex poisoned");
		if let Some(nid) = inner.event_id_to_nid.get(&event.event_id) {
			return Ok(*nid);
		}

		let nid = EventNid(self.next_count());
		inner.event_id_to_nid.insert(event.event_id.clone(), nid);
		inner.nid_to_event_id.insert(nid, event.event_id.clone());
		inner.event_room.insert(nid, room_info.room_nid);
		inner.events.insert(nid, event.clone());
		if let Some(target) = &event.redacts {
			inner.redacted.insert(target.clone());
		}
		Ok(nid)
	}

	async fn maybe_redact(&self, _room_info: &RoomInfo, _event_nid: EventNid, event: Pdu) -> Result<Pdu> {
		let inner = self.inner.lock().expect("store mutex poisoned");
		if !inner.redacted.contains(&event.event_id) {
			return Ok(event);
		}
		Ok(event.redacted())
	}

	async fn get_membership_event_nids_for_room(
		&self,
		room_nid: RoomNid,
		joined_only: bool,
		_local_only: bool,
	) -> Result<Vec<EventNid>> {
		let inner = self.inner.lock().expect("store mutex poisoned");
		Ok(inner
			.events
			.iter()
			.filter(|(nid, _)| inner.event_room.get(nid) == Some(&room_nid))
			.filter(|(_, pdu)| pdu.kind.to_string() == "m.room.member")
			.filter(|(_, pdu)| !joined_only || is_join_membership(pdu))
			.map(|(nid, _)| *nid)
			.collect())
	}

	async fn memberships_at_state(&self, entries: &[StateEntry], joined_only: bool) -> Result<Vec<Pdu>> {
		let inner = self.inner.lock().expect("store mutex poisoned");
		Ok(entries
			.iter()
			.filter_map(|entry| inner.events.get(&entry.event_nid))
			.filter(|pdu| pdu.kind.to_string() == "m.room.member")
			.filter(|pdu| !joined_only || is_join_membership(pdu))
			.cloned()
			.collect())
	}

	async fn scan_event_tree(
		&self,
		room_info: &RoomInfo,
		frontier: &[OwnedEventId],
		limit: usize,
		_requesting_server: &ServerName,
	) -> Result<(Vec<EventNid>, HashSet<OwnedEventId>)> {
		let inner = self.inner.lock().expect("store mutex poisoned");
		let mut visited = HashSet::new();
		let mut queue: VecDeque<OwnedEventId> = frontier.iter().cloned().collect();
		let mut order = Vec::new();

		while let Some(event_id) = queue.pop_front() {
			if !visited.insert(event_id.clone()) {
				continue;
			}
			let Some(nid) = inner.event_id_to_nid.get(&event_id).copied() else { continue };
			if inner.event_room.get(&nid) != Some(&room_info.room_nid) {
				continue;
			}
			let Some(event) = inner.events.get(&nid) else { continue };
			order.push(nid);
			if order.len() >= limit {
				break;
			}
			for prev in &event.prev_events {
				queue.push_back(prev.clone());
			}
		}

		let to_redact = visited
			.into_iter()
			.filter(|event_id| inner.egress_redact.contains(event_id))
			.collect();

		Ok((order, to_redact))
	}

	async fn state_before_event(&self, _room_info: &RoomInfo, event_nid: EventNid) -> Result<Vec<StateEntry>> {
		let inner = self.inner.lock().expect("store mutex poisoned");
		Ok(inner
			.state_before_event
			.get(&event_nid)
			.and_then(|snapshot_nid| inner.snapshots.get(snapshot_nid))
			.cloned()
			.unwrap_or_default())
	}
}

#[cfg(test)]
mod tests {
	use ruma::{events::TimelineEventType, room_id, user_id, UInt};
	use wayback_core::pdu::EventHash;

	use super::*;

	fn message(event_id: &str, redacts: Option<OwnedEventId>) -> Pdu {
		Pdu {
			event_id: event_id.try_into().unwrap(),
			room_id: room_id!("!room:example.org").to_owned(),
			sender: user_id!("@alice:example.org").to_owned(),
			origin: None,
			origin_server_ts: UInt::new(0).unwrap(),
			kind: TimelineEventType::from("m.room.message"),
			content: serde_json::value::RawValue::from_string("{\"body\":\"hi\"}".to_owned()).unwrap(),
			state_key: None,
			prev_events: Vec::new(),
			depth: UInt::new(0).unwrap(),
			auth_events: Vec::new(),
			redacts,
			unsigned: None,
			hashes: EventHash { sha256: String::new() },
			signatures: None,
		}
	}

	#[tokio::test]
	async fn store_event_is_idempotent_on_repeated_event_id() {
		let store = InMemoryEventStore::new();
		let event = message("$a:example.org", None);
		let room_info = store.get_or_create_room_info(&event).await.unwrap();
		let type_nid = store.get_or_create_event_type_nid("m.room.message").await.unwrap();
		let state_key_nid = store.get_or_create_event_state_key_nid(None).await.unwrap();

		let first = store
			.store_event(&event, &room_info, type_nid, state_key_nid, &[], false)
			.await
			.unwrap();
		let second = store
			.store_event(&event, &room_info, type_nid, state_key_nid, &[], false)
			.await
			.unwrap();
		assert_eq!(first, second);
	}

	#[tokio::test]
	async fn maybe_redact_blanks_content_once_a_redaction_is_stored() {
		let store = InMemoryEventStore::new();
		let target = message("$target:example.org", None);
		let room_info = store.get_or_create_room_info(&target).await.unwrap();
		let type_nid = store.get_or_create_event_type_nid("m.room.message").await.unwrap();
		let state_key_nid = store.get_or_create_event_state_key_nid(None).await.unwrap();
		let target_nid = store
			.store_event(&target, &room_info, type_nid, state_key_nid, &[], false)
			.await
			.unwrap();

		let redaction = message("$redaction:example.org", Some(target.event_id.clone()));
		store
			.store_event(&redaction, &room_info, type_nid, state_key_nid, &[], false)
			.await
			.unwrap();

		let redacted = store.maybe_redact(&room_info, target_nid, target.clone()).await.unwrap();
		assert_eq!(redacted.content.get(), "{}");
		assert!(redacted.unsigned.is_none());
	}
}
