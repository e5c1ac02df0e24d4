mod err;

use std::fmt;

pub use err::*;
use ruma::{OwnedEventId, OwnedRoomId, OwnedServerName};

/// Errors produced anywhere in the backfill engine.
///
/// The typed variants correspond to the error kinds enumerated in the
/// component design (orchestrator, server selector, state tracker); `Err`
/// is the untyped escape hatch for ad hoc messages.
#[derive(thiserror::Error)]
pub enum Error {
	#[error("Room {0} is unknown or a stub")]
	MissingRoom(OwnedRoomId),

	#[error("Event {1} in room {0} could not be loaded")]
	MissingEvent(OwnedRoomId, OwnedEventId),

	#[error("All candidate servers failed for room {0}: {1}")]
	FederationExhausted(OwnedRoomId, String),

	#[error("Event {0} failed verification: {1}")]
	VerificationFailure(OwnedEventId, String),

	#[error("Failed to persist event {0}: {1}")]
	PersistenceFailure(OwnedEventId, String),

	#[error("Failed to assign a state snapshot to event {0}: {1}")]
	SnapshotAssignmentFailure(OwnedEventId, String),

	#[error("No server list could be produced for event {0}")]
	NoServersAvailable(OwnedEventId),

	#[error("There was a problem with the '{0}' directive in your configuration: {1}")]
	Config(&'static str, String),

	#[error("Remote server {0} responded with an error: {1}")]
	Federation(OwnedServerName, String),

	#[error("{0}")]
	Database(String),

	#[error("{0}")]
	Err(String),
}

impl Error {
	pub fn bad_database(message: &'static str) -> Self { crate::err!(Database(error!("{message}"))) }

	pub fn room_id(&self) -> Option<&OwnedRoomId> {
		match self {
			| Self::MissingRoom(room_id) | Self::MissingEvent(room_id, ..) => Some(room_id),
			| _ => None,
		}
	}
}

impl fmt::Debug for Error {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{self}") }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
