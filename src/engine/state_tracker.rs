//! Pure roll-forward math for advancing a before-state list across a
//! single-parent edge of the event DAG, without talking to any server.

use std::collections::HashMap;

use ruma::OwnedEventId;
use wayback_core::Pdu;

/// Roll `prevBeforeIds` forward across `prev` to produce the before-state of
/// `target`, `target`'s only prev event being `prev`.
///
/// Returns `None` when the roll-forward cannot be done with full confidence
/// (some entries referenced from `prevBeforeIds` are not locally known and
/// none of the known ones matched `prev`'s state slot); callers must fall
/// back to asking a federation peer for `target`'s before-state in that case.
pub fn calculate_new_state_ids(
	prev: &Pdu,
	prev_before_ids: &[OwnedEventId],
	event_id_map: &HashMap<OwnedEventId, Pdu>,
) -> Option<Vec<OwnedEventId>> {
	let Some(prev_slot) = prev.state_slot() else {
		// prev is not a state event: the before-state of target is exactly
		// the before-state of prev.
		return Some(prev_before_ids.to_vec());
	};

	let mut new_before_ids = prev_before_ids.to_vec();
	let mut found_event = false;
	let mut missing_state = false;

	for id in prev_before_ids {
		let Some(known) = event_id_map.get(id) else {
			missing_state = true;
			continue;
		};
		if known.state_slot().as_ref() == Some(&prev_slot) {
			let slot = new_before_ids
				.iter_mut()
				.find(|existing| *existing == id)
				.expect("id came from new_before_ids");
			*slot = prev.event_id.clone();
			found_event = true;
			break;
		}
	}

	if !found_event {
		if missing_state {
			return None;
		}
		new_before_ids.push(prev.event_id.clone());
	}

	Some(new_before_ids)
}

#[cfg(test)]
mod tests {
	use ruma::{events::TimelineEventType, owned_event_id, room_id, user_id, UInt};

	use super::*;

	fn state_pdu(event_id: &str, event_type: &str, state_key: &str) -> Pdu {
		Pdu {
			event_id: event_id.try_into().unwrap(),
			room_id: room_id!("!room:example.org").to_owned(),
			sender: user_id!("@alice:example.org").to_owned(),
			origin: None,
			origin_server_ts: UInt::new(0).unwrap(),
			kind: TimelineEventType::from(event_type),
			content: serde_json::value::RawValue::from_string("{}".to_owned()).unwrap(),
			state_key: Some(state_key.to_owned()),
			prev_events: Vec::new(),
			depth: UInt::new(0).unwrap(),
			auth_events: Vec::new(),
			redacts: None,
			unsigned: None,
			hashes: wayback_core::pdu::EventHash { sha256: String::new() },
			signatures: None,
		}
	}

	fn message_pdu(event_id: &str) -> Pdu {
		let mut pdu = state_pdu(event_id, "m.room.message", "unused");
		pdu.state_key = None;
		pdu
	}

	#[test]
	fn non_state_prev_copies_before_state() {
		let prev = message_pdu("$prev:example.org");
		let before = vec![owned_event_id!("$s1:example.org")];
		let map = HashMap::new();

		let result = calculate_new_state_ids(&prev, &before, &map).unwrap();
		assert_eq!(result, before);
	}

	#[test]
	fn replaces_matching_slot() {
		let prev = state_pdu("$prev:example.org", "m.room.topic", "");
		let s1 = state_pdu("$s1:example.org", "m.room.topic", "");
		let s2 = state_pdu("$s2:example.org", "m.room.name", "");
		let before = vec![s1.event_id.clone(), s2.event_id.clone()];
		let mut map = HashMap::new();
		map.insert(s1.event_id.clone(), s1);
		map.insert(s2.event_id.clone(), s2.clone());

		let result = calculate_new_state_ids(&prev, &before, &map).unwrap();
		assert_eq!(result, vec![prev.event_id.clone(), s2.event_id]);
	}

	#[test]
	fn appends_new_slot_when_nothing_missing() {
		let prev = state_pdu("$prev:example.org", "m.room.topic", "");
		let s2 = state_pdu("$s2:example.org", "m.room.name", "");
		let before = vec![s2.event_id.clone()];
		let mut map = HashMap::new();
		map.insert(s2.event_id.clone(), s2.clone());

		let result = calculate_new_state_ids(&prev, &before, &map).unwrap();
		assert_eq!(result, vec![s2.event_id, prev.event_id.clone()]);
	}

	#[test]
	fn falls_back_when_blind_and_unmatched() {
		let prev = state_pdu("$prev:example.org", "m.room.topic", "");
		let s1 = owned_event_id!("$s1:example.org");
		let before = vec![s1];
		let map = HashMap::new();

		assert!(calculate_new_state_ids(&prev, &before, &map).is_none());
	}

	#[test]
	fn finding_a_non_matching_known_event_still_counts_as_missing_free() {
		// a known event that doesn't match prev's slot is neither a match nor
		// a "missing" entry; if every entry in prevBeforeIds is accounted for
		// this way, the slot is genuinely new and gets appended.
		let prev = state_pdu("$prev:example.org", "m.room.topic", "");
		let other = state_pdu("$other:example.org", "m.room.name", "");
		let before = vec![other.event_id.clone()];
		let mut map = HashMap::new();
		map.insert(other.event_id.clone(), other.clone());

		let result = calculate_new_state_ids(&prev, &before, &map).unwrap();
		assert_eq!(result, vec![other.event_id, prev.event_id.clone()]);
	}
}
