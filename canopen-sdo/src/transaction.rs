//! The SDO transaction state machine.

use std::time::Duration;

use log::{debug, warn};

use crate::buffer::TransferBuffer;
use crate::error::{AbortCode, SdoOutcome, SdoStatus};
use crate::frame::{self, CanFrame, Quirks};

/// The direction of a transfer: which side originates the payload.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Direction {
	/// Client writes an object to the server.
	Download,
	/// Client reads an object from the server.
	Upload,
}

/// What a transaction is waiting on.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum Phase {
	AwaitingInitResponse(Direction),
	AwaitingSegmentResponse(Direction, bool),
}

/// A sink for outbound CAN frames. Implemented by a real transport, a loopback test double,
/// or anything else that can accept an 8-byte frame.
pub trait FrameSink {
	/// Send a frame. The sink owns delivery; the transaction does not retry or observe failure.
	fn send(&mut self, frame: CanFrame);
}

/// Parameters for [`SdoTransaction::start`].
pub struct SdoRequest<Sink, Timer> {
	/// Object index to read or write.
	pub index: u16,
	/// Object subindex.
	pub subindex: u8,
	/// How long to wait for each peer response before aborting with `Timeout`.
	pub timeout: Duration,
	/// Which way the data moves, and for `Download`, the bytes to send.
	pub transfer: TransferKind,
	/// Invoked exactly once when the transaction completes, successfully or not.
	pub on_done: Box<dyn FnOnce(&mut SdoTransaction<Sink, Timer>, SdoOutcome)>,
}

/// Selects upload vs. download and, for download, carries the payload.
pub enum TransferKind {
	Upload,
	Download(Vec<u8>),
}

/// Returned by [`SdoTransaction::start`] when a transaction is already running.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
#[error("an SDO transaction is already running")]
pub struct AlreadyRunning;

/// Returned by [`SdoTransaction::stop`] when no transaction is running.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
#[error("no SDO transaction is running")]
pub struct NotRunning;

struct Running<Sink, Timer> {
	index: u16,
	subindex: u8,
	pos: usize,
	phase: Phase,
	timeout: Duration,
	on_done: Box<dyn FnOnce(&mut SdoTransaction<Sink, Timer>, SdoOutcome)>,
}

/// Client-side SDO transaction engine for one remote node.
///
/// Generic over the frame sink and timer so tests can swap in recording/manual doubles without
/// any part of the state machine knowing the difference. See the crate root for the full
/// `start`/`feed`/`on_timeout` lifecycle.
pub struct SdoTransaction<Sink, Timer> {
	node_id: u8,
	sink: Sink,
	timer: Timer,
	quirks: Quirks,
	buffer: TransferBuffer,
	running: Option<Running<Sink, Timer>>,
	status: Option<SdoOutcome>,
}

impl<Sink, Timer> SdoTransaction<Sink, Timer>
where
	Sink: FrameSink,
	Timer: crate::timer::SdoTimer,
{
	/// Create a transaction bound to `node_id`, using `sink` to send frames and `timer` for
	/// timeouts. Construction never fails and never allocates; the payload buffer grows lazily.
	pub fn new(node_id: u8, sink: Sink, timer: Timer) -> Self {
		Self::with_quirks(node_id, sink, timer, Quirks::default())
	}

	/// As [`SdoTransaction::new`], but with non-default [`Quirks`] applied to every frame this
	/// transaction sends and every init response it validates.
	pub fn with_quirks(node_id: u8, sink: Sink, timer: Timer, quirks: Quirks) -> Self {
		Self {
			node_id,
			sink,
			timer,
			quirks,
			buffer: TransferBuffer::new(),
			running: None,
			status: None,
		}
	}

	/// Whether a transaction is currently in flight.
	pub fn is_running(&self) -> bool {
		self.running.is_some()
	}

	/// Borrow the frame sink, e.g. to inspect a `RecordingSink` in tests.
	pub fn sink(&self) -> &Sink {
		&self.sink
	}

	/// Borrow the timer, e.g. to inspect a `ManualTimer` in tests.
	pub fn timer(&self) -> &Timer {
		&self.timer
	}

	/// The payload of the most recently completed (or in-progress) transaction.
	///
	/// For a successful upload this is the bytes read from the server. Valid to call from
	/// within the completion closure.
	pub fn payload(&self) -> &[u8] {
		self.buffer.as_slice()
	}

	/// The terminal status of the most recently completed transaction, if any has completed yet.
	pub fn status(&self) -> Option<SdoStatus> {
		self.status.map(|outcome| outcome.status)
	}

	/// The abort code of the most recently completed transaction, if it ended in an abort.
	pub fn abort_code(&self) -> Option<u32> {
		self.status.and_then(|outcome| outcome.abort_code)
	}

	/// Begin a new transaction. Fails if one is already running.
	pub fn start(&mut self, request: SdoRequest<Sink, Timer>) -> Result<(), AlreadyRunning> {
		if self.running.is_some() {
			return Err(AlreadyRunning);
		}

		let direction = match &request.transfer {
			TransferKind::Download(_) => Direction::Download,
			TransferKind::Upload => Direction::Upload,
		};

		match request.transfer {
			TransferKind::Download(data) => self.buffer.assign(&data),
			TransferKind::Upload => self.buffer.reset(),
		}

		self.running = Some(Running {
			index: request.index,
			subindex: request.subindex,
			pos: 0,
			phase: Phase::AwaitingInitResponse(direction),
			timeout: request.timeout,
			on_done: request.on_done,
		});

		debug!("Starting SDO transaction");
		debug!("├─ Node ID: {}", self.node_id);
		debug!("├─ Object: index = 0x{:04X}, subindex = 0x{:02X}", request.index, request.subindex);
		debug!("├─ Direction: {direction:?}");
		debug!("└─ Timeout: {:?}", request.timeout);

		match direction {
			Direction::Download => self.send_init_download(),
			Direction::Upload => self.send_init_upload(),
		}

		Ok(())
	}

	/// Cancel a running transaction without invoking its completion closure.
	///
	/// Disarms the timer and drops whatever the closure captured. Does not emit a frame: this
	/// is a purely local cancel, not a protocol abort.
	pub fn stop(&mut self) -> Result<(), NotRunning> {
		if self.running.is_none() {
			return Err(NotRunning);
		}
		self.timer.disarm();
		self.running = None;
		debug!("sdo stop: node={}", self.node_id);
		Ok(())
	}

	/// Feed an inbound CAN frame addressed to this transaction (TSDO for `node_id`).
	///
	/// Frames for other nodes must be filtered out by the caller before reaching this method.
	pub fn feed(&mut self, frame: &CanFrame) {
		if self.running.is_none() {
			warn!("sdo feed while idle: node={}", self.node_id);
			return;
		}

		self.timer.disarm();

		if frame.dlc < 1 {
			self.local_abort(AbortCode::General);
			return;
		}

		let command = match frame::server_command(&frame.data) {
			Ok(command) => command,
			Err(_) => {
				self.local_abort(AbortCode::InvalidCommandSpecifier);
				return;
			}
		};

		if matches!(command, frame::ServerCommand::AbortTransfer) {
			let code = frame::parse_abort_code(&frame.data);
			debug!("sdo remote abort: node={} code=0x{:08X}", self.node_id, code);
			self.complete(SdoOutcome::remote_abort(code));
			return;
		}

		let phase = self.running.as_ref().unwrap().phase;
		let result = match phase {
			Phase::AwaitingInitResponse(Direction::Download) => self.feed_init_download_response(frame),
			Phase::AwaitingInitResponse(Direction::Upload) => self.feed_init_upload_response(frame),
			Phase::AwaitingSegmentResponse(Direction::Download, toggle) => self.feed_download_segment_response(frame, toggle),
			Phase::AwaitingSegmentResponse(Direction::Upload, toggle) => self.feed_upload_segment_response(frame, toggle),
		};

		if let Err(code) = result {
			self.local_abort(code);
		}
	}

	/// Called by the owner when its timer facility reports expiry for this transaction.
	///
	/// Ignored (with a warning) if no transaction is running; a caller whose timer outlives
	/// `stop`/completion is expected to discard stale expiry notifications itself, but a late
	/// one reaching here is tolerated rather than treated as a bug worth panicking over.
	pub fn on_timeout(&mut self) {
		if self.running.is_none() {
			warn!("sdo on_timeout while idle: node={}", self.node_id);
			return;
		}
		warn!("sdo timeout: node={}", self.node_id);
		self.local_abort(AbortCode::Timeout);
	}

	fn send_init_download(&mut self) {
		let running = self.running.as_ref().unwrap();
		let payload = self.buffer.as_slice();
		let (data, dlc) = if payload.len() <= 4 {
			frame::make_initiate_download_expedited(running.index, running.subindex, payload)
		} else {
			frame::make_initiate_download_segmented(running.index, running.subindex, payload.len() as u32)
		};
		self.send(data, dlc);
	}

	fn send_init_upload(&mut self) {
		let running = self.running.as_ref().unwrap();
		let (data, dlc) = frame::make_initiate_upload(running.index, running.subindex);
		self.send(data, dlc);
	}

	fn send_download_segment(&mut self) {
		let running = self.running.as_mut().unwrap();
		let Phase::AwaitingSegmentResponse(Direction::Download, toggle) = running.phase else {
			unreachable!("send_download_segment called outside a download segment phase");
		};
		let remaining = self.buffer.len() - running.pos;
		let size = remaining.min(7);
		let payload = &self.buffer.as_slice()[running.pos..running.pos + size];
		let last = running.pos + size >= self.buffer.len();
		let (data, dlc) = frame::make_download_segment(toggle, payload, last);
		running.pos += size;
		self.send(data, dlc);
	}

	fn send_upload_segment(&mut self, toggle: bool) {
		let (data, dlc) = frame::make_upload_segment(toggle);
		self.send(data, dlc);
	}

	fn send(&mut self, data: [u8; 8], dlc: u8) {
		let frame = self.quirks.apply(CanFrame { id: frame::rsdo_id(self.node_id), data, dlc });
		self.timer.arm(self.current_timeout());
		debug!("sdo tx: node={} id=0x{:03X} data={:02X?}", self.node_id, frame.id, &frame.data[..frame.dlc as usize]);
		self.sink.send(frame);
	}

	/// The timer is re-armed with the transaction's configured duration on every send, matching
	/// the C original re-starting (not merely extending) its single-shot timer on every request.
	fn current_timeout(&self) -> Duration {
		self.running.as_ref().unwrap().timeout
	}

	fn feed_init_download_response(&mut self, frame: &CanFrame) -> Result<(), AbortCode> {
		if frame.dlc < 4 {
			return Err(AbortCode::General);
		}
		let command = frame::server_command(&frame.data).map_err(|_| AbortCode::InvalidCommandSpecifier)?;
		if !matches!(command, frame::ServerCommand::InitiateDownload) {
			return Err(AbortCode::InvalidCommandSpecifier);
		}
		let response = frame::parse_initiate_download_response(&frame.data);
		let running = self.running.as_ref().unwrap();
		if !self.quirks.ignore_multiplexer && (response.index != running.index || response.subindex != running.subindex) {
			return Err(AbortCode::General);
		}

		if self.buffer.len() <= 4 {
			self.complete(SdoOutcome::ok());
		} else {
			self.running.as_mut().unwrap().phase = Phase::AwaitingSegmentResponse(Direction::Download, false);
			self.send_download_segment();
		}
		Ok(())
	}

	fn feed_init_upload_response(&mut self, frame: &CanFrame) -> Result<(), AbortCode> {
		if frame.dlc < 4 {
			return Err(AbortCode::General);
		}
		let command = frame::server_command(&frame.data).map_err(|_| AbortCode::InvalidCommandSpecifier)?;
		if !matches!(command, frame::ServerCommand::InitiateUpload) {
			return Err(AbortCode::InvalidCommandSpecifier);
		}
		let response = frame::parse_initiate_upload_response(&frame.data, frame.dlc).map_err(|_| AbortCode::General)?;

		match response {
			frame::InitiateUploadResponse::Expedited { index, subindex, data } => {
				if !self.quirks.ignore_multiplexer && (index != self.running.as_ref().unwrap().index || subindex != self.running.as_ref().unwrap().subindex) {
					return Err(AbortCode::General);
				}
				self.buffer.assign(&data);
				self.complete(SdoOutcome::ok());
			}
			frame::InitiateUploadResponse::Segmented { index, subindex, size } => {
				if !self.quirks.ignore_multiplexer && (index != self.running.as_ref().unwrap().index || subindex != self.running.as_ref().unwrap().subindex) {
					return Err(AbortCode::General);
				}
				if let Some(size) = size {
					self.buffer.reserve(size as usize);
				}
				self.running.as_mut().unwrap().phase = Phase::AwaitingSegmentResponse(Direction::Upload, false);
				self.send_upload_segment(false);
			}
		}
		Ok(())
	}

	fn feed_download_segment_response(&mut self, frame: &CanFrame, toggle: bool) -> Result<(), AbortCode> {
		if frame.dlc < 1 {
			return Err(AbortCode::General);
		}
		let command = frame::server_command(&frame.data).map_err(|_| AbortCode::InvalidCommandSpecifier)?;
		if !matches!(command, frame::ServerCommand::DownloadSegment) {
			return Err(AbortCode::InvalidCommandSpecifier);
		}

		let running = self.running.as_ref().unwrap();
		let at_end = running.pos >= self.buffer.len();
		let echoed_toggle = frame::parse_download_segment_response(&frame.data);
		if !at_end && echoed_toggle != toggle {
			return Err(AbortCode::ToggleNotAlternated);
		}

		let next_toggle = !toggle;
		if at_end {
			self.complete(SdoOutcome::ok());
		} else {
			self.running.as_mut().unwrap().phase = Phase::AwaitingSegmentResponse(Direction::Download, next_toggle);
			self.send_download_segment();
		}
		Ok(())
	}

	fn feed_upload_segment_response(&mut self, frame: &CanFrame, toggle: bool) -> Result<(), AbortCode> {
		if frame.dlc < 1 {
			return Err(AbortCode::General);
		}
		let command = frame::server_command(&frame.data).map_err(|_| AbortCode::InvalidCommandSpecifier)?;
		if !matches!(command, frame::ServerCommand::UploadSegment) {
			return Err(AbortCode::InvalidCommandSpecifier);
		}

		let parsed = frame::parse_upload_segment_response(&frame.data);
		if !parsed.last && parsed.toggle != toggle {
			return Err(AbortCode::ToggleNotAlternated);
		}

		let payload = &frame.data[1..1 + parsed.payload_len];
		self.buffer.append(payload);

		if parsed.last {
			self.complete(SdoOutcome::ok());
		} else {
			let next_toggle = !toggle;
			self.running.as_mut().unwrap().phase = Phase::AwaitingSegmentResponse(Direction::Upload, next_toggle);
			self.send_upload_segment(next_toggle);
		}
		Ok(())
	}

	fn local_abort(&mut self, code: AbortCode) {
		let (index, subindex) = {
			let running = self.running.as_ref().unwrap();
			(running.index, running.subindex)
		};
		let (data, dlc) = frame::make_abort(index, subindex, code.into());
		let frame = self.quirks.apply(CanFrame { id: frame::rsdo_id(self.node_id), data, dlc });
		self.timer.disarm();
		warn!("sdo local abort: node={} index=0x{:04X} subindex={} code={}", self.node_id, index, subindex, code);
		self.sink.send(frame);
		self.complete(SdoOutcome::local_abort(code));
	}

	fn complete(&mut self, outcome: SdoOutcome) {
		self.timer.disarm();
		let Some(running) = self.running.take() else {
			return;
		};
		self.status = Some(outcome);
		debug!("sdo done: node={} outcome={}", self.node_id, outcome);
		(running.on_done)(self, outcome);
	}
}
