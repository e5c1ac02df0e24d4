//! Internal numeric identifiers: event, room, type and state-key NIDs, each
//! minted from a single shared counter and assigned out of a single
//! namespace-agnostic sequence. Each kind gets its own newtype so the
//! compiler keeps them from being mixed up.

use std::fmt;

macro_rules! nid_type {
	($name:ident) => {
		#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
		pub struct $name(pub u64);

		impl fmt::Display for $name {
			fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
		}

		impl From<u64> for $name {
			fn from(value: u64) -> Self { Self(value) }
		}

		impl From<$name> for u64 {
			fn from(value: $name) -> Self { value.0 }
		}
	};
}

nid_type!(EventNid);
nid_type!(RoomNid);
nid_type!(TypeNid);
nid_type!(StateKeyNid);
nid_type!(StateSnapshotNid);

/// The triple `(type_nid, state_key_nid, event_nid)`, one entry per active
/// state slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StateEntry {
	pub type_nid: TypeNid,
	pub state_key_nid: StateKeyNid,
	pub event_nid: EventNid,
}

/// A stub room is a placeholder that was referenced but never populated and
/// must be treated as "unknown" for backfill purposes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoomInfo {
	pub room_nid: RoomNid,
	pub room_version: ruma::RoomVersionId,
	pub is_stub: bool,
}

/// History visibility, as defined by the room's `m.room.history_visibility`
/// state event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HistoryVisibility {
	WorldReadable,
	Shared,
	Invited,
	Joined,
}

impl Default for HistoryVisibility {
	fn default() -> Self { Self::Shared }
}

impl From<ruma::events::room::history_visibility::HistoryVisibility> for HistoryVisibility {
	fn from(value: ruma::events::room::history_visibility::HistoryVisibility) -> Self {
		use ruma::events::room::history_visibility::HistoryVisibility as Ruma;
		match value {
			| Ruma::WorldReadable => Self::WorldReadable,
			| Ruma::Invited => Self::Invited,
			| Ruma::Joined => Self::Joined,
			| _ => Self::Shared,
		}
	}
}
