use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use canopen_sdo::test_support::{ManualTimer, RecordingSink};
use canopen_sdo::{AbortCode, CanFrame, SdoOutcome, SdoRequest, SdoStatus, SdoTransaction, TransferKind};

const NODE_ID: u8 = 5;

fn frame(id: u16, data: [u8; 8], dlc: u8) -> CanFrame {
	CanFrame { id, data, dlc }
}

fn recorder() -> Rc<RefCell<Option<SdoOutcome>>> {
	Rc::new(RefCell::new(None))
}

#[test]
fn expedited_download_completes_ok() {
	let mut txn = SdoTransaction::new(NODE_ID, RecordingSink::new(), ManualTimer::new());
	let outcome = recorder();
	let outcome2 = outcome.clone();

	txn.start(SdoRequest {
		index: 0x1017,
		subindex: 0,
		timeout: Duration::from_millis(100),
		transfer: TransferKind::Download(vec![0xDE, 0xAD, 0xBE, 0xEF]),
		on_done: Box::new(move |_txn, out| *outcome2.borrow_mut() = Some(out)),
	})
	.unwrap();

	assert_eq!(txn.sink().sent.len(), 1);
	let sent = txn.sink().sent[0];
	assert_eq!(sent.id, 0x605);
	assert_eq!(sent.data, [0x23, 0x17, 0x10, 0x00, 0xDE, 0xAD, 0xBE, 0xEF]);
	assert_eq!(sent.dlc, 8);

	txn.feed(&frame(0x585, [0x60, 0x17, 0x10, 0x00, 0x00, 0x00, 0x00, 0x00], 8));

	assert_eq!(outcome.borrow().unwrap().status, SdoStatus::Ok);
	assert!(!txn.is_running());
}

#[test]
fn segmented_download_completes_ok() {
	let mut txn = SdoTransaction::new(NODE_ID, RecordingSink::new(), ManualTimer::new());
	let outcome = recorder();
	let outcome2 = outcome.clone();

	txn.start(SdoRequest {
		index: 0x2000,
		subindex: 1,
		timeout: Duration::from_millis(100),
		transfer: TransferKind::Download(vec![0x01, 0x02, 0x03, 0x04, 0x05]),
		on_done: Box::new(move |_txn, out| *outcome2.borrow_mut() = Some(out)),
	})
	.unwrap();

	let init = txn.sink().sent[0];
	assert_eq!(init.data, [0x21, 0x00, 0x20, 0x01, 0x05, 0x00, 0x00, 0x00]);

	txn.feed(&frame(0x585, [0x60, 0x00, 0x20, 0x01, 0x00, 0x00, 0x00, 0x00], 8));

	// toggle=0, c=1, n=7-5=2 -> command byte (0<<5)|(0<<4)|(2<<1)|1 = 0x05.
	let segment = txn.sink().sent[1];
	assert_eq!(segment.data, [0x05, 0x01, 0x02, 0x03, 0x04, 0x05, 0x00, 0x00]);
	assert_eq!(segment.dlc, 6);

	txn.feed(&frame(0x585, [0x20, 0, 0, 0, 0, 0, 0, 0], 8));

	assert_eq!(outcome.borrow().unwrap().status, SdoStatus::Ok);
}

#[test]
fn expedited_upload_completes_ok() {
	let mut txn = SdoTransaction::new(NODE_ID, RecordingSink::new(), ManualTimer::new());
	let outcome = recorder();
	let outcome2 = outcome.clone();
	let payload = Rc::new(RefCell::new(Vec::new()));
	let payload2 = payload.clone();

	txn.start(SdoRequest {
		index: 0x1018,
		subindex: 0,
		timeout: Duration::from_millis(100),
		transfer: TransferKind::Upload,
		on_done: Box::new(move |txn, out| {
			*outcome2.borrow_mut() = Some(out);
			*payload2.borrow_mut() = txn.payload().to_vec();
		}),
	})
	.unwrap();

	let init = txn.sink().sent[0];
	assert_eq!(init.data, [0x40, 0x18, 0x10, 0x00, 0, 0, 0, 0]);

	// e=1, s=1, n=4-3=1 -> command byte (2<<5)|(1<<2)|(1<<1)|1 = 0x47.
	txn.feed(&frame(0x585, [0x47, 0x18, 0x10, 0x00, 0xAA, 0xBB, 0xCC, 0x00], 8));

	assert_eq!(outcome.borrow().unwrap().status, SdoStatus::Ok);
	assert_eq!(&*payload.borrow(), &[0xAA, 0xBB, 0xCC]);
}

#[test]
fn timeout_sends_abort_and_locally_aborts() {
	let mut txn = SdoTransaction::new(NODE_ID, RecordingSink::new(), ManualTimer::new());
	let outcome = recorder();
	let outcome2 = outcome.clone();

	txn.start(SdoRequest {
		index: 0x1018,
		subindex: 0,
		timeout: Duration::from_millis(50),
		transfer: TransferKind::Upload,
		on_done: Box::new(move |_txn, out| *outcome2.borrow_mut() = Some(out)),
	})
	.unwrap();

	txn.on_timeout();

	let abort = txn.sink().sent[1];
	assert_eq!(abort.data, [0x80, 0x18, 0x10, 0x00, 0x00, 0x00, 0x04, 0x05]);

	let out = outcome.borrow().unwrap();
	assert_eq!(out.status, SdoStatus::LocalAbort);
	assert_eq!(out.abort_code, Some(AbortCode::Timeout.into()));
}

#[test]
fn remote_abort_during_segmented_upload() {
	let mut txn = SdoTransaction::new(NODE_ID, RecordingSink::new(), ManualTimer::new());
	let outcome = recorder();
	let outcome2 = outcome.clone();

	txn.start(SdoRequest {
		index: 0x1008,
		subindex: 0,
		timeout: Duration::from_millis(100),
		transfer: TransferKind::Upload,
		on_done: Box::new(move |_txn, out| *outcome2.borrow_mut() = Some(out)),
	})
	.unwrap();

	// Segmented init response: size-indicated, DLC=8, total size 10.
	txn.feed(&frame(0x585, [0x41, 0x08, 0x10, 0x00, 0x0A, 0x00, 0x00, 0x00], 8));
	assert_eq!(txn.sink().sent[1].data[0], 0x60);

	txn.feed(&frame(0x585, [0x80, 0x08, 0x10, 0x00, 0x00, 0x00, 0x02, 0x06], 8));

	let out = outcome.borrow().unwrap();
	assert_eq!(out.status, SdoStatus::RemoteAbort);
	assert_eq!(out.abort_code, Some(0x0602_0000));
	assert_eq!(txn.sink().sent.len(), 2, "remote abort must not emit an outbound abort frame");
}

#[test]
fn toggle_mismatch_on_download_segment_aborts_locally() {
	let mut txn = SdoTransaction::new(NODE_ID, RecordingSink::new(), ManualTimer::new());
	let outcome = recorder();
	let outcome2 = outcome.clone();

	// 10 bytes needs two segments, so the first segment response is not yet at end of buffer
	// and the toggle check actually applies.
	txn.start(SdoRequest {
		index: 0x2000,
		subindex: 1,
		timeout: Duration::from_millis(100),
		transfer: TransferKind::Download(vec![0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A]),
		on_done: Box::new(move |_txn, out| *outcome2.borrow_mut() = Some(out)),
	})
	.unwrap();

	txn.feed(&frame(0x585, [0x60, 0x00, 0x20, 0x01, 0, 0, 0, 0], 8));
	assert_eq!(txn.sink().sent[1].data[0] & 0x10, 0, "first segment toggle must be 0");

	// Server echoes toggle=1 instead of the expected 0 on a non-terminal segment ack.
	txn.feed(&frame(0x585, [0x30, 0, 0, 0, 0, 0, 0, 0], 1));

	let out = outcome.borrow().unwrap();
	assert_eq!(out.status, SdoStatus::LocalAbort);
	assert_eq!(out.abort_code, Some(AbortCode::ToggleNotAlternated.into()));
}

#[test]
fn upload_segment_toggle_mismatch_waived_on_terminal_segment() {
	let mut txn = SdoTransaction::new(NODE_ID, RecordingSink::new(), ManualTimer::new());
	let outcome = recorder();
	let outcome2 = outcome.clone();
	let payload = Rc::new(RefCell::new(Vec::new()));
	let payload2 = payload.clone();

	txn.start(SdoRequest {
		index: 0x1008,
		subindex: 0,
		timeout: Duration::from_millis(100),
		transfer: TransferKind::Upload,
		on_done: Box::new(move |txn, out| {
			*outcome2.borrow_mut() = Some(out);
			*payload2.borrow_mut() = txn.payload().to_vec();
		}),
	})
	.unwrap();

	// Segmented init response: size-indicated, DLC=8, total size 7.
	txn.feed(&frame(0x585, [0x41, 0x08, 0x10, 0x00, 0x07, 0x00, 0x00, 0x00], 8));

	// Final segment: t=1, n=7-6=1, c=1 -> command byte (0<<5)|(1<<4)|(1<<1)|1 = 0x13. The toggle
	// bit does not match the client's current toggle (0); the waiver must still accept it as
	// the last segment rather than aborting.
	txn.feed(&frame(0x585, [0x13, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x00], 8));

	assert_eq!(outcome.borrow().unwrap().status, SdoStatus::Ok);
	assert_eq!(&*payload.borrow(), &[0x01, 0x02, 0x03, 0x04, 0x05, 0x06]);
}

#[test]
fn stop_cancels_without_invoking_callback() {
	let mut txn = SdoTransaction::new(NODE_ID, RecordingSink::new(), ManualTimer::new());
	let outcome = recorder();
	let outcome2 = outcome.clone();

	txn.start(SdoRequest {
		index: 0x1018,
		subindex: 0,
		timeout: Duration::from_millis(100),
		transfer: TransferKind::Upload,
		on_done: Box::new(move |_txn, out| *outcome2.borrow_mut() = Some(out)),
	})
	.unwrap();

	txn.stop().unwrap();
	assert!(outcome.borrow().is_none());
	assert!(!txn.is_running());
	assert!(txn.stop().is_err());
}

#[test]
fn start_after_stop_succeeds() {
	let mut txn = SdoTransaction::new(NODE_ID, RecordingSink::new(), ManualTimer::new());

	txn.start(SdoRequest {
		index: 0x1018,
		subindex: 0,
		timeout: Duration::from_millis(100),
		transfer: TransferKind::Upload,
		on_done: Box::new(|_txn, _out| {}),
	})
	.unwrap();

	txn.stop().unwrap();

	let result = txn.start(SdoRequest {
		index: 0x1019,
		subindex: 0,
		timeout: Duration::from_millis(100),
		transfer: TransferKind::Upload,
		on_done: Box::new(|_txn, _out| {}),
	});
	assert!(result.is_ok());
}

#[test]
fn reentrant_start_from_completion_closure_works() {
	let mut txn = SdoTransaction::new(NODE_ID, RecordingSink::new(), ManualTimer::new());
	let second_outcome = recorder();
	let second_outcome2 = second_outcome.clone();

	txn.start(SdoRequest {
		index: 0x1017,
		subindex: 0,
		timeout: Duration::from_millis(100),
		transfer: TransferKind::Download(vec![1, 2, 3, 4]),
		on_done: Box::new(move |inner, _out| {
			inner
				.start(SdoRequest {
					index: 0x1018,
					subindex: 0,
					timeout: Duration::from_millis(100),
					transfer: TransferKind::Upload,
					on_done: Box::new(move |_inner2, out2| *second_outcome2.borrow_mut() = Some(out2)),
				})
				.unwrap();
		}),
	})
	.unwrap();

	txn.feed(&frame(0x585, [0x60, 0x17, 0x10, 0x00, 0, 0, 0, 0], 8));
	assert!(txn.is_running(), "reentrant start should leave a fresh transaction running");

	txn.feed(&frame(0x585, [0x4F, 0x18, 0x10, 0x00, 0xAA, 0, 0, 0], 8));
	assert_eq!(second_outcome.borrow().unwrap().status, SdoStatus::Ok);
}
