//! `ServersAtEvent`: given a room and an event ID that is a prev-event of a
//! backwards extremity (and therefore not in our store), produce a
//! plausible, ordered list of remote servers to ask for backfill.

use std::collections::HashSet;

use itertools::Itertools;
use ruma::{
	events::room::history_visibility::RoomHistoryVisibilityEventContent, EventId, OwnedEventId,
	OwnedServerName, UserId,
};
use wayback_core::{
	ids::{HistoryVisibility, RoomInfo, StateEntry},
	Pdu, Result,
};

use crate::requester::Requester;

/// Returns the ordered candidate server list and the history visibility
/// observed while computing it.
#[tracing::instrument(skip_all, fields(room_id = %requester.room_id, %event_id))]
pub async fn servers_at_event(
	requester: &Requester<'_>,
	event_id: &EventId,
) -> Result<(Vec<OwnedServerName>, HistoryVisibility)> {
	let Some(successor_id) = find_successor(requester, event_id) else {
		wayback_core::warn!(%event_id, "no backwards-extremity successor found, returning empty server list");
		return Ok((Vec::new(), HistoryVisibility::default()));
	};

	let room_info = requester
		.store
		.room_info(&requester.room_id)
		.await?
		.filter(|info| !info.is_stub)
		.ok_or_else(|| wayback_core::Error::MissingRoom(requester.room_id.clone()))?;

	let nids = requester.store.event_nids(&[successor_id.clone()]).await?;
	let Some(&successor_nid) = nids.get(&successor_id) else {
		return Err(wayback_core::Error::MissingEvent(requester.room_id.clone(), successor_id));
	};

	let entries = requester.store.state_before_event(&room_info, successor_nid).await?;

	let joined_at_state = requester.store.memberships_at_state(&entries, true).await?;
	let local_server = requester.virtual_host.as_str();
	let we_are_joined = member_servers(&joined_at_state).any(|server| server.as_str() == local_server);

	let (visible_members, visibility) =
		join_events_from_history_visibility(requester, &room_info, &entries, we_are_joined).await;

	let mut servers: Vec<OwnedServerName> = member_servers(&joined_at_state)
		.chain(member_servers(&visible_members))
		.filter(|server| server.as_str() != local_server)
		.unique()
		.collect();

	let preferred: HashSet<&str> = requester
		.config
		.trusted_servers
		.iter()
		.map(|server| server.as_str())
		.collect();
	servers.sort_by_key(|server| !preferred.contains(server.as_str()));
	servers.truncate(requester.config.max_backfill_servers);

	Ok((servers, visibility))
}

/// Extract each membership event's target user's server (the state key,
/// not the sender, since a membership event's sender may differ from its
/// subject, e.g. an invite).
fn member_servers(pdus: &[Pdu]) -> impl Iterator<Item = OwnedServerName> + '_ {
	pdus.iter().filter_map(|pdu| {
		let state_key = pdu.state_key.as_deref()?;
		UserId::parse(state_key)
			.ok()
			.map(|user_id| user_id.server_name().to_owned())
	})
}

fn find_successor(requester: &Requester<'_>, event_id: &EventId) -> Option<OwnedEventId> {
	requester
		.bw_extrems
		.iter()
		.find(|(_, prev_ids)| prev_ids.iter().any(|id| id == event_id))
		.map(|(successor, _)| successor.clone())
}

/// `joinEventsFromHistoryVisibility`: ask whether our server may see the
/// room's currently-joined member set at the successor's point in the DAG.
/// If allowed, return the currently-joined members plus the observed
/// visibility; otherwise an empty list and that same visibility (the
/// caller's join-at-state set keeps things conservative). On any internal
/// failure, `joined` is returned as the safe default.
async fn join_events_from_history_visibility(
	requester: &Requester<'_>,
	room_info: &RoomInfo,
	entries: &[StateEntry],
	we_are_joined: bool,
) -> (Vec<Pdu>, HistoryVisibility) {
	let visibility = history_visibility_at(requester, entries).await;

	if !is_server_allowed(visibility, we_are_joined) {
		return (Vec::new(), visibility);
	}

	let Ok(member_nids) = requester
		.store
		.get_membership_event_nids_for_room(room_info.room_nid, true, false)
		.await
	else {
		return (Vec::new(), HistoryVisibility::Joined);
	};

	match requester.provide_events(&member_nids).await {
		| Ok(pdus) => (pdus, visibility),
		| Err(_) => (Vec::new(), HistoryVisibility::Joined),
	}
}

/// Looks up the `m.room.history_visibility` state event (state key `""`)
/// among `entries` and parses its `history_visibility` field, defaulting to
/// `shared` per the data model when the event is absent or unparsable.
async fn history_visibility_at(requester: &Requester<'_>, entries: &[StateEntry]) -> HistoryVisibility {
	let Ok(type_nid) = requester.store.get_or_create_event_type_nid("m.room.history_visibility").await else {
		return HistoryVisibility::default();
	};
	let Ok(state_key_nid) = requester.store.get_or_create_event_state_key_nid(Some("")).await else {
		return HistoryVisibility::default();
	};
	let Some(entry) = entries
		.iter()
		.find(|entry| entry.type_nid == type_nid && entry.state_key_nid == state_key_nid)
	else {
		return HistoryVisibility::default();
	};

	let Ok(pdus) = requester.provide_events(&[entry.event_nid]).await else {
		return HistoryVisibility::default();
	};

	pdus.first()
		.and_then(|pdu| serde_json::from_str::<RoomHistoryVisibilityEventContent>(pdu.content.get()).ok())
		.map(|content| content.history_visibility.into())
		.unwrap_or_default()
}

fn is_server_allowed(visibility: HistoryVisibility, we_are_joined: bool) -> bool {
	match visibility {
		| HistoryVisibility::WorldReadable => true,
		| HistoryVisibility::Shared | HistoryVisibility::Invited | HistoryVisibility::Joined => we_are_joined,
	}
}

#[cfg(test)]
mod tests {
	use std::{collections::HashMap, sync::Arc};

	use ruma::{events::TimelineEventType, owned_server_name, room_id, user_id, UInt};
	use wayback_core::{pdu::EventHash, Config};
	use wayback_federation::MockFederationClient;
	use wayback_store::InMemoryEventStore;

	use super::*;
	use crate::{persist::persist_events, requester::Requester};

	fn config(trusted: Vec<OwnedServerName>) -> Config {
		Config {
			server_name: owned_server_name!("local.example.org"),
			trusted_servers: trusted,
			max_backfill_servers: 5,
			federation_backfill_limit: 100,
			max_fetch_prev_events: 100,
			log: "info".to_owned(),
		}
	}

	fn event(event_id: &str, kind: &str, state_key: Option<&str>, content: &str) -> Pdu {
		Pdu {
			event_id: event_id.try_into().unwrap(),
			room_id: room_id!("!room:example.org").to_owned(),
			sender: user_id!("@alice:example.org").to_owned(),
			origin: None,
			origin_server_ts: UInt::new(0).unwrap(),
			kind: TimelineEventType::from(kind),
			content: serde_json::value::RawValue::from_string(content.to_owned()).unwrap(),
			state_key: state_key.map(str::to_owned),
			prev_events: Vec::new(),
			depth: UInt::new(0).unwrap(),
			auth_events: Vec::new(),
			redacts: None,
			unsigned: None,
			hashes: EventHash { sha256: String::new() },
			signatures: None,
		}
	}

	#[tokio::test]
	async fn preference_and_visibility_orders_preferred_server_first_and_excludes_local() {
		let store = Arc::new(InMemoryEventStore::new());

		let successor = event("$succ:example.org", "m.room.message", None, "{}");
		let visibility = event(
			"$vis:example.org",
			"m.room.history_visibility",
			Some(""),
			"{\"history_visibility\":\"joined\"}",
		);
		let join_a = event("$ja:example.org", "m.room.member", Some("@u:a.example.org"), "{\"membership\":\"join\"}");
		let join_b = event("$jb:example.org", "m.room.member", Some("@u:b.example.org"), "{\"membership\":\"join\"}");
		let join_c = event("$jc:example.org", "m.room.member", Some("@u:c.example.org"), "{\"membership\":\"join\"}");
		let join_local = event(
			"$jl:example.org",
			"m.room.member",
			Some("@u:local.example.org"),
			"{\"membership\":\"join\"}",
		);

		let outcome = persist_events(store.as_ref(), &[
			successor.clone(),
			visibility.clone(),
			join_a.clone(),
			join_b.clone(),
			join_c.clone(),
			join_local.clone(),
		])
		.await;
		let room_nid = outcome.room_nid.unwrap();

		let mut entries = Vec::new();
		for (event_type, state_key, pdu) in [
			("m.room.history_visibility", "", &visibility),
			("m.room.member", "@u:a.example.org", &join_a),
			("m.room.member", "@u:b.example.org", &join_b),
			("m.room.member", "@u:c.example.org", &join_c),
			("m.room.member", "@u:local.example.org", &join_local),
		] {
			let type_nid = store.get_or_create_event_type_nid(event_type).await.unwrap();
			let state_key_nid = store.get_or_create_event_state_key_nid(Some(state_key)).await.unwrap();
			entries.push(wayback_core::ids::StateEntry {
				type_nid,
				state_key_nid,
				event_nid: outcome.nids[&pdu.event_id],
			});
		}
		let snapshot = store.add_state(room_nid, entries).await.unwrap();
		store.set_state(outcome.nids[&successor.event_id], snapshot).await.unwrap();

		let federation = MockFederationClient::new();
		let config = config(vec![owned_server_name!("c.example.org")]);
		let mut bw_extrems = HashMap::new();
		bw_extrems.insert(successor.event_id.clone(), vec![ruma::owned_event_id!("$x:example.org")]);
		let requester = Requester::new(
			store.as_ref(),
			&federation,
			&config,
			room_id!("!room:example.org").to_owned(),
			owned_server_name!("local.example.org"),
			bw_extrems,
		);

		let (servers, observed_visibility) =
			servers_at_event(&requester, ruma::event_id!("$x:example.org")).await.unwrap();

		assert_eq!(servers.len(), 3);
		assert_eq!(servers[0], owned_server_name!("c.example.org"));
		let set: std::collections::HashSet<_> = servers.iter().map(|server| server.as_str()).collect();
		assert_eq!(set, std::collections::HashSet::from(["a.example.org", "b.example.org", "c.example.org"]));
		assert_eq!(observed_visibility, HistoryVisibility::Joined);
	}
}
