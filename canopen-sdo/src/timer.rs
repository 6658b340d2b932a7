//! The timeout collaborator a [`crate::SdoTransaction`] is generic over.

use std::time::Duration;

/// A single-shot countdown timer.
///
/// The transaction arms this timer whenever it sends a frame and expects a reply, and disarms
/// it the moment a reply (or a terminal event) arrives. Implementations are expected to call
/// back into [`crate::SdoTransaction::on_timeout`] when the duration passed to [`SdoTimer::arm`]
/// elapses without an intervening [`SdoTimer::disarm`] — this crate does not schedule that call
/// itself, since it has no event loop of its own.
pub trait SdoTimer {
	/// (Re-)arm the timer to fire after `duration`, replacing any previous deadline.
	fn arm(&mut self, duration: Duration);

	/// Cancel a pending deadline. A no-op if the timer isn't armed.
	fn disarm(&mut self);
}
