//! Shared plumbing for the `read-sdo` / `write-sdo` demo binaries.
//!
//! Neither binary is part of the published API; they exist to exercise [`canopen_sdo`] against
//! a real SocketCAN interface. The core crate has no event loop of its own, so these binaries
//! provide the simplest possible one: a blocking read with a short timeout, checked against a
//! deadline on every iteration.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use canopen_sdo::{CanFrame, FrameSink, SdoTimer};
use socketcan::{CanFrame as SocketCanFrame, EmbeddedFrame, Frame, Id, Socket, StandardId};

/// A CAN socket shared between a [`SocketSink`] (writer) and the binary's own receive loop
/// (reader). A raw CAN socket is perfectly fine to read and write from the same thread in
/// sequence; this just lets both halves hold a handle to it without duplicating the fd.
pub type SharedSocket = Rc<RefCell<socketcan::CanSocket>>;

/// Sends frames over a real [`socketcan::CanSocket`].
pub struct SocketSink {
	socket: SharedSocket,
}

impl SocketSink {
	pub fn new(socket: SharedSocket) -> Self {
		Self { socket }
	}
}

impl FrameSink for SocketSink {
	fn send(&mut self, frame: CanFrame) {
		let id = StandardId::new(frame.id).expect("SDO cob-ids always fit in 11 bits");
		let can_frame = SocketCanFrame::new(Id::Standard(id), &frame.data[..frame.dlc as usize])
			.expect("dlc is always <= 8");
		if let Err(err) = self.socket.borrow().write_frame(&can_frame) {
			log::error!("failed to write CAN frame: {err}");
		}
	}
}

/// Reads a frame from the socket, returning `None` on a read timeout (not an error: the caller
/// is expected to check its own deadline and call [`DeadlineTimer::is_expired`] in that case).
pub fn recv_filtered(socket: &SharedSocket, want_id: u16) -> Option<CanFrame> {
	match socket.borrow().read_frame() {
		Ok(frame) => {
			let id = match frame.id() {
				Id::Standard(id) => id.as_raw(),
				Id::Extended(_) => return None,
			};
			if id != want_id {
				return None;
			}
			let mut data = [0u8; 8];
			data[..frame.data().len()].copy_from_slice(frame.data());
			Some(CanFrame { id, data, dlc: frame.data().len() as u8 })
		}
		Err(err) if err.kind() == std::io::ErrorKind::WouldBlock || err.kind() == std::io::ErrorKind::TimedOut => None,
		Err(err) => {
			log::error!("failed to read CAN frame: {err}");
			None
		}
	}
}

/// A [`SdoTimer`] that records a deadline instead of scheduling a real timer. The blocking
/// main loop checks [`DeadlineTimer::is_expired`] on every iteration after a short socket read
/// timeout, since the core never owns a thread or event loop of its own.
#[derive(Debug, Default)]
pub struct DeadlineTimer {
	deadline: Option<Instant>,
}

impl DeadlineTimer {
	pub fn new() -> Self {
		Self::default()
	}

	/// Whether the armed deadline, if any, has passed.
	pub fn is_expired(&self) -> bool {
		self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
	}
}

impl SdoTimer for DeadlineTimer {
	fn arm(&mut self, duration: Duration) {
		self.deadline = Some(Instant::now() + duration);
	}

	fn disarm(&mut self) {
		self.deadline = None;
	}
}

/// Parse a number in decimal, or hex/octal/binary with a `0x`/`0o`/`0b` prefix, matching the
/// convenience most CANopen tooling offers for object indices and node ids.
pub fn parse_number<T>(text: &str) -> Result<T, String>
where
	T: TryFrom<u64>,
	T::Error: std::fmt::Display,
{
	let (text, radix) = if let Some(rest) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
		(rest, 16)
	} else if let Some(rest) = text.strip_prefix("0o").or_else(|| text.strip_prefix("0O")) {
		(rest, 8)
	} else if let Some(rest) = text.strip_prefix("0b").or_else(|| text.strip_prefix("0B")) {
		(rest, 2)
	} else {
		(text, 10)
	};
	let value = u64::from_str_radix(text, radix).map_err(|e| format!("invalid number {text:?}: {e}"))?;
	T::try_from(value).map_err(|e| format!("value {value} out of range: {e}"))
}

/// Parse a millisecond timeout into a [`Duration`].
pub fn parse_timeout(text: &str) -> Result<Duration, String> {
	let millis: u64 = text.parse().map_err(|e| format!("invalid timeout {text:?}: {e}"))?;
	Ok(Duration::from_millis(millis))
}

