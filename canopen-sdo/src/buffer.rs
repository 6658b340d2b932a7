//! Growable byte buffer used to accumulate a segmented transfer's payload.

/// Accumulates the payload of a segmented upload, or stages the payload of a segmented download.
///
/// A single instance is reused across transactions: [`TransferBuffer::reset`] clears it without
/// releasing the underlying allocation, so a long-lived [`crate::SdoTransaction`] doesn't churn
/// the heap between back-to-back transfers.
#[derive(Debug, Default, Clone)]
pub struct TransferBuffer {
	data: Vec<u8>,
}

impl TransferBuffer {
	/// Create an empty buffer.
	pub fn new() -> Self {
		Self { data: Vec::new() }
	}

	/// Clear the buffer, keeping its allocation.
	pub fn reset(&mut self) {
		self.data.clear();
	}

	/// Reserve space for at least `additional` more bytes without reallocating later.
	pub fn reserve(&mut self, additional: usize) {
		self.data.reserve(additional);
	}

	/// Append a slice to the buffer.
	pub fn append(&mut self, bytes: &[u8]) {
		self.data.extend_from_slice(bytes);
	}

	/// Replace the buffer's contents wholesale.
	pub fn assign(&mut self, bytes: &[u8]) {
		self.data.clear();
		self.data.extend_from_slice(bytes);
	}

	/// Number of bytes currently held.
	pub fn len(&self) -> usize {
		self.data.len()
	}

	/// Whether the buffer is empty.
	pub fn is_empty(&self) -> bool {
		self.data.is_empty()
	}

	/// Borrow the buffer's contents.
	pub fn as_slice(&self) -> &[u8] {
		&self.data
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use assert2::assert;

	#[test]
	fn reset_keeps_capacity() {
		let mut buf = TransferBuffer::new();
		buf.append(&[1, 2, 3, 4, 5, 6, 7, 8]);
		let cap = buf.data.capacity();
		buf.reset();
		assert!(buf.is_empty());
		assert!(buf.data.capacity() == cap);
	}

	#[test]
	fn append_accumulates_segments() {
		let mut buf = TransferBuffer::new();
		buf.append(&[1, 2, 3]);
		buf.append(&[4, 5]);
		assert!(buf.as_slice() == [1, 2, 3, 4, 5]);
	}
}
