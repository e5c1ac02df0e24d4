//! Missing-Event Fetcher: best-effort recovery of state events referenced
//! by IDs we do not yet have, iterating over candidate servers. Never
//! surfaces errors to its caller (only logs them); the caller re-queries
//! the store afterwards and fails only if still missing.

use std::{
	collections::{HashMap, HashSet},
	sync::Mutex,
	time::{Duration, Instant},
};

use futures::stream::{FuturesUnordered, StreamExt};
use ruma::OwnedEventId;
use wayback_core::{
	verify::{PduVerifier, VerifyOutcome},
	Pdu,
};

use crate::requester::Requester;

/// Per-engine-instance bookkeeping of recently-failed event fetches, so a
/// persistently-unreachable event doesn't get re-requested on every single
/// call within the backoff window. Not part of the per-request transient
/// state: it outlives any one `PerformBackfill` invocation.
pub struct Ratelimiter {
	state: Mutex<HashMap<OwnedEventId, (Instant, u32)>>,
	base_backoff: Duration,
}

impl Default for Ratelimiter {
	fn default() -> Self { Self::new(Duration::from_secs(5)) }
}

impl Ratelimiter {
	pub fn new(base_backoff: Duration) -> Self { Self { state: Mutex::new(HashMap::new()), base_backoff } }

	fn should_skip(&self, event_id: &OwnedEventId) -> bool {
		let state = self.state.lock().expect("ratelimiter mutex poisoned");
		let Some((last_attempt, failures)) = state.get(event_id) else {
			return false;
		};
		let backoff = self.base_backoff.saturating_mul((*failures).min(6));
		last_attempt.elapsed() < backoff
	}

	fn record_failure(&self, event_id: &OwnedEventId) {
		let mut state = self.state.lock().expect("ratelimiter mutex poisoned");
		let entry = state.entry(event_id.clone()).or_insert((Instant::now(), 0));
		entry.0 = Instant::now();
		entry.1 += 1;
	}

	fn record_success(&self, event_id: &OwnedEventId) {
		self.state.lock().expect("ratelimiter mutex poisoned").remove(event_id);
	}
}

/// Fetch whichever of `missing_ids` can be recovered from `requester`'s
/// candidate servers, running each through `verifier`'s classification
/// table. Returns the recovered, accepted events; never errors.
#[tracing::instrument(skip_all, fields(room_id = %requester.room_id, missing = missing_ids.len()))]
pub async fn fetch_missing_events(
	requester: &Requester<'_>,
	ratelimiter: &Ratelimiter,
	verifier: &dyn PduVerifier,
	missing_ids: &[OwnedEventId],
) -> Vec<Pdu> {
	let cap = requester.config.max_fetch_prev_events;
	let capped = missing_ids.len() > cap;
	if capped {
		wayback_core::warn!(
			missing = missing_ids.len(),
			cap,
			"missing-event count exceeds max_fetch_prev_events, chasing only the first {cap}"
		);
	}

	let mut unresolved: HashSet<OwnedEventId> = missing_ids
		.iter()
		.take(cap)
		.filter(|id| !ratelimiter.should_skip(id))
		.cloned()
		.collect();
	let mut recovered = Vec::new();

	for server in &requester.servers {
		if unresolved.is_empty() {
			break;
		}

		let mut fetches: FuturesUnordered<_> = unresolved
			.iter()
			.map(|event_id| async move {
				let result = requester
					.federation
					.get_event(&requester.virtual_host, server, event_id)
					.await;
				(event_id.clone(), result)
			})
			.collect();

		let mut resolved_this_server = Vec::new();
		while let Some((event_id, result)) = fetches.next().await {
			match result {
				| Ok(pdu) if !pdu.belongs_to_room(&requester.room_id) => {
					wayback_core::warn!(
						%event_id,
						%server,
						pdu_room_id = %pdu.room_id,
						requested_room_id = %requester.room_id,
						"dropping event returned for the wrong room"
					);
					resolved_this_server.push(event_id);
				},
				| Ok(pdu) => match verifier.verify(&pdu) {
					| VerifyOutcome::Accept => {
						ratelimiter.record_success(&event_id);
						recovered.push(pdu);
						resolved_this_server.push(event_id);
					},
					| VerifyOutcome::AcceptWithWarning => {
						wayback_core::warn!(%event_id, %server, "accepting event with recoverable verification warning");
						ratelimiter.record_success(&event_id);
						recovered.push(pdu);
						resolved_this_server.push(event_id);
					},
					| VerifyOutcome::RejectAuth => {
						wayback_core::warn!(%event_id, %server, "dropping event: auth-chain or auth-rules failure");
						resolved_this_server.push(event_id);
					},
					| VerifyOutcome::RejectOther => {
						wayback_core::warn!(%event_id, %server, "dropping event: verification failed");
						resolved_this_server.push(event_id);
					},
				},
				| Err(error) => {
					wayback_core::debug!(%event_id, %server, %error, "could not fetch event");
					ratelimiter.record_failure(&event_id);
				},
			}
		}

		for event_id in resolved_this_server {
			unresolved.remove(&event_id);
		}
	}

	recovered
}

#[cfg(test)]
mod tests {
	use std::time::Duration;

	use ruma::{events::TimelineEventType, owned_server_name, room_id, user_id, UInt};
	use wayback_core::{pdu::EventHash, verify::PermissiveVerifier, Config};
	use wayback_federation::MockFederationClient;
	use wayback_store::InMemoryEventStore;

	use super::*;

	fn config() -> Config {
		Config {
			server_name: owned_server_name!("local.example.org"),
			trusted_servers: Vec::new(),
			max_backfill_servers: 5,
			federation_backfill_limit: 100,
			max_fetch_prev_events: 100,
			log: "info".to_owned(),
		}
	}

	fn message(event_id: &str, room_id: &str) -> Pdu {
		Pdu {
			event_id: event_id.try_into().unwrap(),
			room_id: room_id.try_into().unwrap(),
			sender: user_id!("@alice:example.org").to_owned(),
			origin: None,
			origin_server_ts: UInt::new(0).unwrap(),
			kind: TimelineEventType::from("m.room.message"),
			content: serde_json::value::RawValue::from_string("{\"body\":\"hi\"}".to_owned()).unwrap(),
			state_key: None,
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
	async fn wrong_room_event_is_dropped_without_reaching_the_verifier() {
		let store = InMemoryEventStore::new();
		let federation = MockFederationClient::new();
		let config = config();
		let server = owned_server_name!("peer.example.org");
		let mut requester = Requester::new(
			&store,
			&federation,
			&config,
			room_id!("!room:example.org").to_owned(),
			owned_server_name!("local.example.org"),
			HashMap::new(),
		);
		requester.servers = vec![server.clone()];

		let foreign = message("$foreign:example.org", "!other:example.org");
		federation.with_event(&server, &foreign.event_id, foreign.clone());

		let recovered = fetch_missing_events(
			&requester,
			&Ratelimiter::default(),
			&PermissiveVerifier,
			&[foreign.event_id.clone()],
		)
		.await;

		assert!(recovered.is_empty());
	}

	#[tokio::test]
	async fn chase_count_is_capped_at_max_fetch_prev_events() {
		let store = InMemoryEventStore::new();
		let federation = MockFederationClient::new();
		let mut capped_config = config();
		capped_config.max_fetch_prev_events = 1;
		let server = owned_server_name!("peer2.example.org");
		let mut requester = Requester::new(
			&store,
			&federation,
			&capped_config,
			room_id!("!room:example.org").to_owned(),
			owned_server_name!("local.example.org"),
			HashMap::new(),
		);
		requester.servers = vec![server.clone()];

		let a = message("$a3:example.org", "!room:example.org");
		let b = message("$b3:example.org", "!room:example.org");
		federation.with_event(&server, &a.event_id, a.clone());
		federation.with_event(&server, &b.event_id, b.clone());

		let recovered = fetch_missing_events(
			&requester,
			&Ratelimiter::default(),
			&PermissiveVerifier,
			&[a.event_id.clone(), b.event_id.clone()],
		)
		.await;

		assert_eq!(recovered.len(), 1, "only the first max_fetch_prev_events IDs should be chased");
	}

	#[test]
	fn ratelimiter_skips_recently_failed_ids_within_the_backoff_window() {
		let ratelimiter = Ratelimiter::new(Duration::from_secs(60));
		let event_id = ruma::owned_event_id!("$a:example.org");

		assert!(!ratelimiter.should_skip(&event_id));
		ratelimiter.record_failure(&event_id);
		assert!(ratelimiter.should_skip(&event_id));
		ratelimiter.record_success(&event_id);
		assert!(!ratelimiter.should_skip(&event_id));
	}
}
