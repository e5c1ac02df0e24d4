mod event;

use std::cmp::Ordering;

use ruma::{
	events::TimelineEventType, CanonicalJsonObject, CanonicalJsonValue, EventId, OwnedEventId,
	OwnedRoomId, OwnedUserId, RoomId, UInt,
};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue as RawJsonValue;

use crate::Result;

/// Persistent Data Unit (Event), the unit the backfill engine moves around.
///
/// A signed, content-addressed event. `state_key` being `Some` is what
/// distinguishes a state event from a message event.
#[derive(Clone, Deserialize, Serialize, Debug)]
pub struct Pdu {
	pub event_id: OwnedEventId,
	pub room_id: OwnedRoomId,
	pub sender: OwnedUserId,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub origin: Option<String>,
	pub origin_server_ts: UInt,
	#[serde(rename = "type")]
	pub kind: TimelineEventType,
	pub content: Box<RawJsonValue>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub state_key: Option<String>,
	pub prev_events: Vec<OwnedEventId>,
	pub depth: UInt,
	pub auth_events: Vec<OwnedEventId>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub redacts: Option<OwnedEventId>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub unsigned: Option<Box<RawJsonValue>>,
	pub hashes: EventHash,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub signatures: Option<Box<RawJsonValue>>,
}

/// Content hashes of a PDU.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct EventHash {
	pub sha256: String,
}

pub type PduEvent = Pdu;

impl Pdu {
	pub fn from_id_val(event_id: &EventId, mut json: CanonicalJsonObject) -> Result<Self> {
		let event_id = CanonicalJsonValue::String(event_id.into());
		json.insert("event_id".into(), event_id);
		serde_json::to_value(json)
			.and_then(serde_json::from_value)
			.map_err(|e| crate::err!(Database(error!("invalid PDU json: {e}"))))
	}

	/// Whether this event carries a state key, i.e. is a state event rather
	/// than a message event.
	pub fn is_state(&self) -> bool { self.state_key.is_some() }

	/// `(type, state_key)` slot this event occupies if it is a state event.
	pub fn state_slot(&self) -> Option<(String, String)> {
		self.state_key
			.as_ref()
			.map(|state_key| (self.kind.to_string(), state_key.clone()))
	}

	/// Whether this event actually belongs to `room_id`. A federation peer
	/// may return events for the wrong room, whether by bug or by malice;
	/// callers admitting externally-fetched events into a per-request map
	/// must check this before trusting `self.room_id`.
	pub fn belongs_to_room(&self, room_id: &RoomId) -> bool { self.room_id == room_id }

	/// The redacted form of this event: content blanked, unsigned data
	/// dropped. ID, hashes, and signatures are left as-is, since redaction
	/// preserves event identity.
	pub fn redacted(mut self) -> Self {
		self.content = RawJsonValue::from_string("{}".to_owned()).expect("\"{}\" is valid JSON");
		self.unsigned = None;
		self
	}
}

/// Equality/ordering determined by the event ID alone, never the memory
/// representation of the rest of the event.
impl Eq for Pdu {}

impl PartialEq for Pdu {
	fn eq(&self, other: &Self) -> bool { self.event_id == other.event_id }
}

impl PartialOrd for Pdu {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> { Some(self.cmp(other)) }
}

impl Ord for Pdu {
	fn cmp(&self, other: &Self) -> Ordering { self.event_id.cmp(&other.event_id) }
}
