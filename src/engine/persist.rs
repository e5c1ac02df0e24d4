//! `persistEvents`: stores a batch of events, resolving auth events, room,
//! type and state-key NIDs along the way. Any step failure is logged and
//! that event alone is skipped; later events still process.

use std::collections::HashMap;

use ruma::OwnedEventId;
use wayback_core::{
	ids::{EventNid, RoomNid},
	Pdu,
};
use wayback_store::EventStore;

/// The stored (and possibly redacted) form of each successfully persisted
/// event, the NID it was assigned, and the room NID of the last one
/// processed.
pub struct PersistOutcome {
	pub room_nid: Option<RoomNid>,
	pub stored: HashMap<OwnedEventId, Pdu>,
	pub nids: HashMap<OwnedEventId, EventNid>,
}

pub async fn persist_events(store: &dyn EventStore, events: &[Pdu]) -> PersistOutcome {
	debug_assert!(
		events.windows(2).all(|pair| pair[0].room_id == pair[1].room_id),
		"persist_events called with events from more than one room"
	);

	let mut room_nid = None;
	let mut stored = HashMap::new();
	let mut nids = HashMap::new();

	for event in events {
		match persist_one(store, event).await {
			| Ok((room, event_nid, pdu)) => {
				room_nid = Some(room);
				nids.insert(event.event_id.clone(), event_nid);
				stored.insert(event.event_id.clone(), pdu);
			},
			| Err(error) => {
				wayback_core::warn!(event_id = %event.event_id, %error, "skipping event: persistence failed");
			},
		}
	}

	PersistOutcome { room_nid, stored, nids }
}

async fn persist_one(store: &dyn EventStore, event: &Pdu) -> wayback_core::Result<(RoomNid, EventNid, Pdu)> {
	let room_info = store.get_or_create_room_info(event).await?;

	let mut auth_nids = Vec::with_capacity(event.auth_events.len());
	let auth_nid_map = store.event_nids(&event.auth_events).await?;
	for auth_event_id in &event.auth_events {
		let Some(nid) = auth_nid_map.get(auth_event_id) else {
			return Err(wayback_core::Error::PersistenceFailure(
				event.event_id.clone(),
				format!("auth event {auth_event_id} is unresolved"),
			));
		};
		auth_nids.push(*nid);
	}

	let type_nid = store.get_or_create_event_type_nid(&event.kind.to_string()).await?;
	let state_key_nid = store
		.get_or_create_event_state_key_nid(event.state_key.as_deref())
		.await?;

	let event_nid = store
		.store_event(event, &room_info, type_nid, state_key_nid, &auth_nids, false)
		.await?;

	let stored_pdu = store.maybe_redact(&room_info, event_nid, event.clone()).await?;

	Ok((room_info.room_nid, event_nid, stored_pdu))
}
