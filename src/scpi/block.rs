
// Definite-length arbitrary block decoding, IEEE 488.2 section 8.7.9:
//
//   #<d><d ASCII digits giving L><L payload bytes>
//
// The length is always announced up front, so the payload is read by count and never by
// terminator or timeout.

use std::str;

use thiserror::Error;

use crate::transport::{Session, Stream, TransferError};

pub const BLOCK_MARKER:u8 = b'#';
pub const DEFAULT_CHUNK_SIZE:usize = 4096;

// Upper bound on what we reserve before any payload has arrived; the buffer grows past it if needed
const MAX_PREALLOC:usize = 16 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum FrameError {
	#[error("response does not start with a block marker (got byte {0:#04x})")]
	MissingMarker(u8),

	#[error("invalid length digit count (got byte {0:#04x})")]
	InvalidLengthDigit(u8),

	#[error("invalid block length {0:?}")]
	InvalidLength(String),

	#[error("transfer failed while reading block")]
	Transport(#[from] TransferError),
}

/// A decoded block.  The payload is always exactly `declared_length` bytes long.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockFrame {
	declared_length: usize,
	payload: Vec<u8>,
}

impl BlockFrame {
	pub fn declared_length(&self) -> usize { self.declared_length }
	pub fn payload(&self) -> &[u8] { &self.payload }
	pub fn into_payload(self) -> Vec<u8> { self.payload }
}

#[derive(Debug, Clone, Copy)]
pub struct BlockReader {
	chunk_size: usize,
}

impl Default for BlockReader {
	fn default() -> Self { Self{ chunk_size: DEFAULT_CHUNK_SIZE } }
}

impl BlockReader {

	pub fn with_chunk_size(chunk_size:usize) -> Self { Self{ chunk_size: chunk_size.max(1) } }

	pub fn read_frame<S: Stream>(&self, session:&mut Session<S>) -> Result<BlockFrame, FrameError> {
		self.read_frame_with_progress(session, |_, _| {})
	}

	/// Decode one block, calling `progress(received, declared_length)` once after the header and
	/// again after every receive call.
	pub fn read_frame_with_progress<S, F>(&self, session:&mut Session<S>, mut progress:F) -> Result<BlockFrame, FrameError>
	where S: Stream, F: FnMut(usize, usize) {

		let header:Vec<u8> = session.recv_exact(2)?;
		if header[0] != BLOCK_MARKER { return Err(FrameError::MissingMarker(header[0])); }

		let digit_count:usize = match header[1] {
			d @ b'1'..=b'9' => (d - b'0') as usize,
			d => return Err(FrameError::InvalidLengthDigit(d)),
		};

		let length_field:Vec<u8> = session.recv_exact(digit_count)?;
		let declared_length:usize = parse_length(&length_field)?;

		log::debug!("block header announces {} bytes", declared_length);
		progress(0, declared_length);

		let mut payload:Vec<u8> = Vec::with_capacity(declared_length.min(MAX_PREALLOC));
		let mut chunk:Vec<u8> = vec![0; self.chunk_size.min(declared_length.max(1))];

		while payload.len() < declared_length {
			let want:usize = (declared_length - payload.len()).min(chunk.len());
			let n:usize = match session.recv_some(&mut chunk[..want]) {
				Ok(n) => n,
				Err(TransferError::ConnectionClosed{ .. }) => {
					return Err(TransferError::ConnectionClosed{ received: payload.len(), expected: declared_length }.into());
				},
				Err(e) => return Err(e.into()),
			};

			payload.extend_from_slice(&chunk[..n]);
			progress(payload.len(), declared_length);
		}

		Ok(BlockFrame{ declared_length, payload })
	}

}

pub fn read_frame<S: Stream>(session:&mut Session<S>) -> Result<BlockFrame, FrameError> {
	BlockReader::default().read_frame(session)
}

fn parse_length(field:&[u8]) -> Result<usize, FrameError> {
	let invalid = || FrameError::InvalidLength(String::from_utf8_lossy(field).into_owned());

	// usize::from_str would also take a leading '+'
	if !field.iter().all(u8::is_ascii_digit) { return Err(invalid()); }

	str::from_utf8(field).ok()
		.and_then(|s| s.parse::<usize>().ok())
		.ok_or_else(invalid)
}

#[cfg(test)]
mod tests {
	use std::time::Duration;

	use super::*;
	use crate::transport::mock::MockStream;

	fn session(data:&[u8], chunk:usize) -> Session<MockStream> {
		let stream = MockStream::new(data.to_vec()).chunked(chunk);
		Session::from_stream(stream, "mock".to_owned(), Duration::from_secs(1))
	}

	fn encode(payload:&[u8]) -> Vec<u8> {
		let len = payload.len().to_string();
		let mut out = format!("#{}{}", len.len(), len).into_bytes();
		out.extend_from_slice(payload);
		out
	}

	#[test]
	fn decodes_independent_of_fragmentation() {
		let payload:Vec<u8> = (0..10_000u32).map(|i| (i * 7 % 251) as u8).collect();
		let wire = encode(&payload);

		let whole = read_frame(&mut session(&wire, usize::MAX)).unwrap();
		let bytewise = read_frame(&mut session(&wire, 1)).unwrap();
		let odd = BlockReader::with_chunk_size(333).read_frame(&mut session(&wire, 17)).unwrap();

		assert_eq!(whole.declared_length(), payload.len());
		assert_eq!(whole.payload(), &payload[..]);
		assert_eq!(whole, bytewise);
		assert_eq!(whole, odd);
	}

	#[test]
	fn zero_padded_length_field() {
		let frame = read_frame(&mut session(b"#800000010ABCDEFGHIJ", 3)).unwrap();
		assert_eq!(frame.declared_length(), 10);
		assert_eq!(frame.into_payload(), b"ABCDEFGHIJ");
	}

	#[test]
	fn empty_payload() {
		let frame = read_frame(&mut session(b"#10", 1)).unwrap();
		assert_eq!(frame.declared_length(), 0);
		assert!(frame.payload().is_empty());
	}

	#[test]
	fn payload_is_not_over_read() {
		let mut s = session(b"#13abcTRAILER", usize::MAX);
		let frame = read_frame(&mut s).unwrap();
		assert_eq!(frame.payload(), b"abc");
		assert_eq!(s.recv_exact(7).unwrap(), b"TRAILER");
	}

	#[test]
	fn missing_marker() {
		assert!(matches!(read_frame(&mut session(b"$800000010", 1)), Err(FrameError::MissingMarker(b'$'))));
	}

	#[test]
	fn zero_digit_count() {
		assert!(matches!(read_frame(&mut session(b"#0abc\n", 1)), Err(FrameError::InvalidLengthDigit(b'0'))));
	}

	#[test]
	fn non_digit_count() {
		assert!(matches!(read_frame(&mut session(b"#x12", 1)), Err(FrameError::InvalidLengthDigit(b'x'))));
	}

	#[test]
	fn non_numeric_length() {
		assert!(matches!(read_frame(&mut session(b"#3+12abc", 1)), Err(FrameError::InvalidLength(_))));
		assert!(matches!(read_frame(&mut session(b"#41a00", 1)), Err(FrameError::InvalidLength(_))));
	}

	#[test]
	fn truncated_payload_reports_close() {
		match read_frame(&mut session(b"#21012345", 2)) {
			Err(FrameError::Transport(TransferError::ConnectionClosed{ received, expected })) => {
				assert_eq!(received, 5);
				assert_eq!(expected, 10);
			},
			other => panic!("unexpected result {:?}", other),
		}
	}

	#[test]
	fn truncated_header_reports_close() {
		assert!(matches!(
			read_frame(&mut session(b"#", 1)),
			Err(FrameError::Transport(TransferError::ConnectionClosed{ .. }))
		));
	}

	#[test]
	fn progress_reaches_declared_length() {
		let wire = encode(&[0xAA; 9000]);
		let mut calls:Vec<(usize, usize)> = vec![];

		BlockReader::default()
			.read_frame_with_progress(&mut session(&wire, usize::MAX), |got, total| calls.push((got, total)))
			.unwrap();

		assert_eq!(calls.first(), Some(&(0, 9000)));
		assert_eq!(calls.last(), Some(&(9000, 9000)));
		assert!(calls.windows(2).all(|w| w[1].0 - w[0].0 <= DEFAULT_CHUNK_SIZE));
	}
}
