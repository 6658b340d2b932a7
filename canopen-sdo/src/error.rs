//! Abort codes and transaction outcomes.
//!
//! The SDO protocol does not report failures as ordinary Rust errors: a transaction always
//! completes, and the completion carries a [`SdoStatus`] plus, for anything other than
//! [`SdoStatus::Ok`], an [`AbortCode`]. See the crate root for why `feed`/`on_timeout` return `()`.

/// Reason a client or server aborted an SDO transfer.
///
/// Values come from CiA 301 section 7.2.3.3.17 table 22. Only a handful of these are ever
/// produced locally by this crate (toggle mismatch, timeout, malformed response); the rest
/// exist so a [`SdoStatus::RemoteAbort`] received from a peer can be decoded into something
/// readable instead of a bare `u32`.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[derive(num_enum::IntoPrimitive, num_enum::TryFromPrimitive)]
#[repr(u32)]
pub enum AbortCode {
	/// Toggle bit not alternated.
	ToggleNotAlternated = 0x0503_0000,

	/// SDO protocol timed out.
	Timeout = 0x0504_0000,

	/// Client/server command specifier not valid or unknown.
	InvalidCommandSpecifier = 0x0504_0001,

	/// Invalid block size (block mode only).
	InvalidBlockSize = 0x0504_0002,

	/// Invalid sequence number (block mode only).
	InvalidSequenceNumber = 0x0504_0003,

	/// CRC error (block mode only).
	CrcError = 0x0504_0004,

	/// Out of memory.
	OutOfMemory = 0x0504_0005,

	/// Unsupported access to an object.
	UnsupportedObjectAccess = 0x0601_0000,

	/// Attempt to read a write-only object.
	ReadFromWriteOnlyObject = 0x0601_0001,

	/// Attempt to write a read-only object.
	WriteToReadOnlyObject = 0x0601_0002,

	/// Object does not exist in the object dictionary.
	ObjectDoesNotExist = 0x0602_0000,

	/// Object cannot be mapped to the PDO.
	ObjectCanNotBeMapped = 0x0604_0041,

	/// The number and length of the objects to be mapped would exceed PDO length.
	NumberAndLengthOfObjectsExceedPdoLength = 0x0604_0042,

	/// General parameter incompatibility reason.
	GeneralParameterError = 0x0604_0043,

	/// General internal incompatibility in the device.
	GeneralInternalError = 0x0604_0047,

	/// Access failed due to a hardware error.
	HardwareError = 0x0606_0000,

	/// Data type does not match, length of service parameter does not match.
	LengthMismatch = 0x0607_0010,

	/// Data type does not match, length of service parameter too high.
	LengthTooHigh = 0x0607_0012,

	/// Data type does not match, length of service parameter too low.
	LengthTooLow = 0x0607_0013,

	/// Sub-index does not exist.
	SubIndexDoesNotExist = 0x0609_0011,

	/// Invalid value for parameter (download only).
	ObjectValueInvalid = 0x0609_0030,

	/// Value of parameter written too high (download only).
	ObjectValueTooHigh = 0x0609_0031,

	/// Value of parameter written too low (download only).
	ObjectValueTooLow = 0x0609_0032,

	/// Maximum value is less than minimum value.
	MaximumBelowMinimum = 0x0609_0036,

	/// Resource not available: SDO connection.
	ResourceNotAvailable = 0x060A_0023,

	/// General error. Also used locally for malformed init responses.
	General = 0x0800_0000,

	/// Data cannot be transferred or stored to the application.
	CanNotTransferData = 0x0800_0020,

	/// Data cannot be transferred because of local control.
	LocalControlError = 0x0800_0021,

	/// Data cannot be transferred because of the present device state.
	InvalidDeviceStateForTransfer = 0x0800_0022,

	/// Object dictionary dynamic generation failed or no object dictionary is present.
	FailedToGenerateDynamicDictionary = 0x0800_0023,

	/// No data available.
	NoDataAvailable = 0x0800_0024,
}

impl AbortCode {
	/// Encode the abort code as the little-endian bytes placed at data offset 4 of an abort frame.
	pub fn to_le_bytes(self) -> [u8; 4] {
		u32::from(self).to_le_bytes()
	}
}

impl std::fmt::Display for AbortCode {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::ToggleNotAlternated => write!(f, "toggle bit not alternated"),
			Self::Timeout => write!(f, "SDO protocol timed out"),
			Self::InvalidCommandSpecifier => write!(f, "invalid or unknown SDO command"),
			Self::InvalidBlockSize => write!(f, "invalid block size"),
			Self::InvalidSequenceNumber => write!(f, "invalid sequence number"),
			Self::CrcError => write!(f, "CRC error"),
			Self::OutOfMemory => write!(f, "out of memory"),
			Self::UnsupportedObjectAccess => write!(f, "unsupported access to an object"),
			Self::ReadFromWriteOnlyObject => write!(f, "attempt to read a write only object"),
			Self::WriteToReadOnlyObject => write!(f, "attempt to write a read only object"),
			Self::ObjectDoesNotExist => write!(f, "object does not exist in the object dictionary"),
			Self::ObjectCanNotBeMapped => write!(f, "object cannot be mapped to the PDO"),
			Self::NumberAndLengthOfObjectsExceedPdoLength => write!(f, "the number and length of the objects to be mapped would exceed PDO length"),
			Self::GeneralParameterError => write!(f, "general parameter incompatibility reason"),
			Self::GeneralInternalError => write!(f, "general internal incompatibility in the device"),
			Self::HardwareError => write!(f, "access failed due to a hardware error"),
			Self::LengthMismatch => write!(f, "data type does not match, length of service parameter does not match"),
			Self::LengthTooHigh => write!(f, "data type does not match, length of service parameter too high"),
			Self::LengthTooLow => write!(f, "data type does not match, length of service parameter too low"),
			Self::SubIndexDoesNotExist => write!(f, "sub-index does not exist"),
			Self::ObjectValueInvalid => write!(f, "invalid value for parameter"),
			Self::ObjectValueTooHigh => write!(f, "value of parameter written is too high"),
			Self::ObjectValueTooLow => write!(f, "value of parameter written is too low"),
			Self::MaximumBelowMinimum => write!(f, "maximum value is less than minimum value"),
			Self::ResourceNotAvailable => write!(f, "resource not available: SDO connection"),
			Self::General => write!(f, "general error"),
			Self::CanNotTransferData => write!(f, "data cannot be transferred or stored to the application"),
			Self::LocalControlError => write!(f, "data cannot be transferred or stored to the application because of local control"),
			Self::InvalidDeviceStateForTransfer => write!(f, "data cannot be transferred or stored to the application because of the present device state"),
			Self::FailedToGenerateDynamicDictionary => write!(f, "dynamic object dictionary generation failed or no object dictionary is present"),
			Self::NoDataAvailable => write!(f, "no data available"),
		}
	}
}

/// The terminal state of an SDO transaction.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SdoStatus {
	/// The transfer completed successfully.
	Ok,

	/// The client aborted the transfer locally (protocol violation or timeout).
	LocalAbort,

	/// The server aborted the transfer.
	RemoteAbort,
}

/// The outcome delivered to the completion closure exactly once per [`crate::SdoTransaction::start`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct SdoOutcome {
	/// The terminal status of the transaction.
	pub status: SdoStatus,

	/// The abort code, valid when `status != SdoStatus::Ok`.
	///
	/// For [`SdoStatus::RemoteAbort`] this is whatever 32-bit value the peer sent; it may not
	/// decode to a known [`AbortCode`] variant.
	pub abort_code: Option<u32>,
}

impl SdoOutcome {
	pub(crate) fn ok() -> Self {
		Self { status: SdoStatus::Ok, abort_code: None }
	}

	pub(crate) fn local_abort(code: AbortCode) -> Self {
		Self { status: SdoStatus::LocalAbort, abort_code: Some(code.into()) }
	}

	pub(crate) fn remote_abort(code: u32) -> Self {
		Self { status: SdoStatus::RemoteAbort, abort_code: Some(code) }
	}

	/// Decode the abort code into a known [`AbortCode`], if it is one.
	pub fn abort_reason(&self) -> Option<Result<AbortCode, u32>> {
		self.abort_code.map(|code| AbortCode::try_from(code).map_err(|_| code))
	}
}

impl std::fmt::Display for SdoOutcome {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self.status {
			SdoStatus::Ok => write!(f, "ok"),
			SdoStatus::LocalAbort => match self.abort_reason() {
				Some(Ok(reason)) => write!(f, "local abort: {reason}"),
				Some(Err(code)) => write!(f, "local abort: unknown code 0x{code:08X}"),
				None => write!(f, "local abort"),
			},
			SdoStatus::RemoteAbort => match self.abort_reason() {
				Some(Ok(reason)) => write!(f, "remote abort: {reason}"),
				Some(Err(code)) => write!(f, "remote abort: unknown code 0x{code:08X}"),
				None => write!(f, "remote abort"),
			},
		}
	}
}
