//! Client-side SDO (Service Data Object) transaction engine for CANopen.
//!
//! This crate drives a single in-flight SDO transaction against one remote CANopen node: it
//! serialises an outbound request, steps a protocol state machine in response to incoming CAN
//! frames, enforces CiA 301's framing and sequencing rules, arms a timeout, and reports a
//! completion event carrying either the transferred payload or an abort code.
//!
//! "Asynchronous" in the protocol sense used throughout this crate means event-driven, not
//! `async`/`await`: [`SdoTransaction`] is advanced entirely by its owner calling [`SdoTransaction::feed`]
//! with inbound frames and [`SdoTransaction::on_timeout`] when its [`SdoTimer`] expires. Nothing
//! in this crate blocks, spawns a thread, or awaits anything.
//!
//! ```no_run
//! use std::time::Duration;
//! use canopen_sdo::{FrameSink, SdoTransaction, SdoRequest, SdoTimer, TransferKind, CanFrame};
//!
//! struct StdoutSink;
//! impl FrameSink for StdoutSink {
//!     fn send(&mut self, frame: CanFrame) {
//!         println!("tx {:03X} {:02X?}", frame.id, &frame.data[..frame.dlc as usize]);
//!     }
//! }
//!
//! struct NoTimer;
//! impl SdoTimer for NoTimer {
//!     fn arm(&mut self, _duration: Duration) {}
//!     fn disarm(&mut self) {}
//! }
//!
//! let mut transaction = SdoTransaction::new(5, StdoutSink, NoTimer);
//! transaction.start(SdoRequest {
//!     index: 0x1017,
//!     subindex: 0,
//!     timeout: Duration::from_millis(500),
//!     transfer: TransferKind::Upload,
//!     on_done: Box::new(|txn, outcome| println!("{outcome}: {:02X?}", txn.payload())),
//! }).unwrap();
//! ```

mod buffer;
mod error;
mod frame;
mod timer;
mod transaction;

pub use buffer::TransferBuffer;
pub use error::{AbortCode, SdoOutcome, SdoStatus};
pub use frame::{CanFrame, ClientCommand, Quirks, ServerCommand, rsdo_id, tsdo_id};
pub use timer::SdoTimer;
pub use transaction::{AlreadyRunning, Direction, FrameSink, NotRunning, SdoRequest, SdoTransaction, TransferKind};

/// Test doubles (`RecordingSink`, `ManualTimer`) for exercising [`SdoTransaction`] without a
/// real CAN socket or event loop. Not behind `#[cfg(test)]` so integration tests in `tests/`
/// can use them too; not meant for production use.
pub mod test_support;
