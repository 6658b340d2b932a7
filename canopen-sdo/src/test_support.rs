//! Test doubles for [`crate::FrameSink`] and [`crate::SdoTimer`].

use std::time::Duration;

use crate::{CanFrame, FrameSink, SdoTimer};

/// A [`FrameSink`] that appends every sent frame to a `Vec` instead of transmitting anything.
#[derive(Debug, Default)]
pub struct RecordingSink {
	pub sent: Vec<CanFrame>,
}

impl RecordingSink {
	pub fn new() -> Self {
		Self::default()
	}
}

impl FrameSink for RecordingSink {
	fn send(&mut self, frame: CanFrame) {
		self.sent.push(frame);
	}
}

/// A [`SdoTimer`] that records arm/disarm calls instead of scheduling anything.
///
/// Tests drive timeouts explicitly by calling [`crate::SdoTransaction::on_timeout`] rather than
/// sleeping; this double only exists so assertions can confirm the transaction armed and
/// disarmed the timer at the expected points.
#[derive(Debug, Default)]
pub struct ManualTimer {
	pub armed: Option<Duration>,
	pub arm_count: usize,
	pub disarm_count: usize,
}

impl ManualTimer {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn is_armed(&self) -> bool {
		self.armed.is_some()
	}
}

impl SdoTimer for ManualTimer {
	fn arm(&mut self, duration: Duration) {
		self.armed = Some(duration);
		self.arm_count += 1;
	}

	fn disarm(&mut self) {
		self.armed = None;
		self.disarm_count += 1;
	}
}
