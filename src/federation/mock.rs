use std::{
	collections::{HashMap, HashSet},
	sync::Mutex,
};

use async_trait::async_trait;
use ruma::{EventId, OwnedEventId, OwnedServerName, RoomId, RoomVersionId, ServerName};
use wayback_core::{Error, Pdu, Result};

use super::{BackfillResponse, FederationClient, StateIdsResponse};

/// Scripted `FederationClient` for tests: callers register canned responses
/// per server before exercising the engine against it.
#[derive(Default)]
pub struct MockFederationClient {
	inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
	backfill: HashMap<OwnedServerName, BackfillResponse>,
	events: HashMap<(OwnedServerName, OwnedEventId), Pdu>,
	state_ids: HashMap<(OwnedServerName, OwnedEventId), StateIdsResponse>,
	state: HashMap<(OwnedServerName, OwnedEventId), Vec<Pdu>>,
	unreachable: HashSet<OwnedServerName>,
}

impl MockFederationClient {
	pub fn new() -> Self { Self::default() }

	pub fn with_backfill(&self, server: &ServerName, response: BackfillResponse) {
		self.inner
			.lock()
			.expect("mock mutex poisoned")
			.backfill
			.insert(server.to_owned(), response);
	}

	pub fn with_event(&self, server: &ServerName, event_id: &EventId, pdu: Pdu) {
		self.inner
			.lock()
			.expect("mock mutex poisoned")
			.events
			.insert((server.to_owned(), event_id.to_owned()), pdu);
	}

	pub fn with_state_ids(&self, server: &ServerName, event_id: &EventId, response: StateIdsResponse) {
		self.inner
			.lock()
			.expect("mock mutex poisoned")
			.state_ids
			.insert((server.to_owned(), event_id.to_owned()), response);
	}

	pub fn with_state(&self, server: &ServerName, event_id: &EventId, pdus: Vec<Pdu>) {
		self.inner
			.lock()
			.expect("mock mutex poisoned")
			.state
			.insert((server.to_owned(), event_id.to_owned()), pdus);
	}

	pub fn mark_unreachable(&self, server: &ServerName) {
		self.inner
			.lock()
			.expect("mock mutex poisoned")
			.unreachable
			.insert(server.to_owned());
	}
}

#[async_trait]
impl FederationClient for MockFederationClient {
	async fn backfill(
		&self,
		_origin: &ServerName,
		server: &ServerName,
		_room_id: &RoomId,
		_limit: u32,
		_from_event_ids: &[OwnedEventId],
	) -> Result<BackfillResponse> {
		let inner = self.inner.lock().expect("mock mutex poisoned");
		if inner.unreachable.contains(server) {
			return Err(Error::Federation(server.to_owned(), "server unreachable".to_owned()));
		}
		inner.backfill.get(server).cloned().ok_or_else(|| {
			Error::Federation(server.to_owned(), "no scripted backfill response".to_owned())
		})
	}

	async fn get_event(&self, _origin: &ServerName, server: &ServerName, event_id: &EventId) -> Result<Pdu> {
		let inner = self.inner.lock().expect("mock mutex poisoned");
		if inner.unreachable.contains(server) {
			return Err(Error::Federation(server.to_owned(), "server unreachable".to_owned()));
		}
		inner
			.events
			.get(&(server.to_owned(), event_id.to_owned()))
			.cloned()
			.ok_or_else(|| Error::Federation(server.to_owned(), format!("no event {event_id}")))
	}

	async fn state_ids_before_event(
		&self,
		_origin: &ServerName,
		server: &ServerName,
		_room_id: &RoomId,
		event_id: &EventId,
	) -> Result<StateIdsResponse> {
		let inner = self.inner.lock().expect("mock mutex poisoned");
		if inner.unreachable.contains(server) {
			return Err(Error::Federation(server.to_owned(), "server unreachable".to_owned()));
		}
		inner
			.state_ids
			.get(&(server.to_owned(), event_id.to_owned()))
			.cloned()
			.ok_or_else(|| Error::Federation(server.to_owned(), format!("no state_ids for {event_id}")))
	}

	async fn state_before_event(
		&self,
		_origin: &ServerName,
		server: &ServerName,
		_room_id: &RoomId,
		_room_version: &RoomVersionId,
		event_id: &EventId,
	) -> Result<Vec<Pdu>> {
		let inner = self.inner.lock().expect("mock mutex poisoned");
		if inner.unreachable.contains(server) {
			return Err(Error::Federation(server.to_owned(), "server unreachable".to_owned()));
		}
		inner
			.state
			.get(&(server.to_owned(), event_id.to_owned()))
			.cloned()
			.ok_or_else(|| Error::Federation(server.to_owned(), format!("no state for {event_id}")))
	}
}
