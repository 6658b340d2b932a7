//! Write a single object dictionary entry over SDO to a CANopen node.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use canopen_sdo::{SdoOutcome, SdoRequest, SdoStatus, SdoTransaction, TransferKind};
use canopen_sdo_demos::{parse_number, parse_timeout, recv_filtered, DeadlineTimer, SocketSink};
use clap::Parser;
use socketcan::Socket;

#[derive(Parser)]
#[command(about = "Write an object dictionary entry on a CANopen node over SDO")]
struct Options {
	/// CAN interface to use, e.g. can0.
	interface: String,

	/// Node ID of the target device.
	#[arg(value_parser = parse_number::<u8>)]
	node_id: u8,

	/// Object index to write.
	#[arg(value_parser = parse_number::<u16>)]
	index: u16,

	/// Object subindex to write.
	#[arg(value_parser = parse_number::<u8>, default_value = "0")]
	subindex: u8,

	/// Bytes to write, given as a hex string, e.g. deadbeef.
	#[arg(value_parser = parse_hex_bytes)]
	data: Vec<u8>,

	/// SDO response timeout in milliseconds.
	#[arg(long, value_parser = parse_timeout, default_value = "1000")]
	timeout: Duration,
}

fn parse_hex_bytes(text: &str) -> Result<Vec<u8>, String> {
	let text = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")).unwrap_or(text);
	if text.len() % 2 != 0 {
		return Err(format!("hex string {text:?} has an odd number of digits"));
	}
	(0..text.len())
		.step_by(2)
		.map(|i| u8::from_str_radix(&text[i..i + 2], 16).map_err(|e| format!("invalid hex byte {:?}: {e}", &text[i..i + 2])))
		.collect()
}

fn main() {
	env_logger::builder()
		.filter_module(module_path!(), log::LevelFilter::Info)
		.parse_default_env()
		.init();

	if do_main(&Options::parse()).is_err() {
		std::process::exit(1);
	}
}

fn do_main(options: &Options) -> Result<(), ()> {
	let socket = socketcan::CanSocket::open(&options.interface).map_err(|e| {
		log::error!("failed to open {}: {e}", options.interface);
	})?;
	socket.set_read_timeout(Duration::from_millis(20)).map_err(|e| {
		log::error!("failed to set read timeout: {e}");
	})?;
	let socket = Rc::new(RefCell::new(socket));

	let tsdo_id = canopen_sdo::tsdo_id(options.node_id);
	let mut transaction = SdoTransaction::new(options.node_id, SocketSink::new(socket.clone()), DeadlineTimer::new());

	let done: Rc<Cell<Option<SdoOutcome>>> = Rc::new(Cell::new(None));
	let done2 = done.clone();
	let index = options.index;
	let subindex = options.subindex;

	transaction
		.start(SdoRequest {
			index,
			subindex,
			timeout: options.timeout,
			transfer: TransferKind::Download(options.data.clone()),
			on_done: Box::new(move |_txn, outcome| {
				if outcome.status == SdoStatus::Ok {
					log::info!("0x{index:04X}:{subindex} written");
				}
				done2.set(Some(outcome));
			}),
		})
		.map_err(|e| log::error!("failed to start transaction: {e}"))?;

	loop {
		if let Some(outcome) = done.get() {
			return report(&outcome);
		}
		if let Some(frame) = recv_filtered(&socket, tsdo_id) {
			transaction.feed(&frame);
			continue;
		}
		if transaction.timer().is_expired() {
			transaction.on_timeout();
		}
	}
}

fn report(outcome: &SdoOutcome) -> Result<(), ()> {
	match outcome.status {
		SdoStatus::Ok => Ok(()),
		_ => {
			log::error!("{outcome}");
			Err(())
		}
	}
}
