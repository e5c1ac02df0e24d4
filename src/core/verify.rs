//! Signature/auth verification is an external collaborator (crypto
//! primitives and full auth-rules evaluation live outside this crate); this
//! module only defines the seam the missing-event fetcher calls through, so
//! that its per-event error classification table has something concrete to
//! dispatch on.

use crate::Pdu;

/// Outcome of checking one fetched PDU against signatures and auth rules,
/// mirroring the classification table for the missing-event fetcher.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VerifyOutcome {
	/// No problems found.
	Accept,
	/// A recoverable signing-key mismatch (e.g. key reuse across rotation);
	/// the event is kept to preserve DAG connectivity, with a warning.
	AcceptWithWarning,
	/// Failed the auth chain or auth rules; the event must be dropped.
	RejectAuth,
	/// Any other verification failure; the event must be dropped.
	RejectOther,
}

pub trait PduVerifier: Send + Sync {
	fn verify(&self, pdu: &Pdu) -> VerifyOutcome;
}

/// Accepts everything. Useful where real signature/auth verification is
/// wired in elsewhere (or not yet available, as in tests).
#[derive(Clone, Copy, Debug, Default)]
pub struct PermissiveVerifier;

impl PduVerifier for PermissiveVerifier {
	fn verify(&self, _pdu: &Pdu) -> VerifyOutcome { VerifyOutcome::Accept }
}
