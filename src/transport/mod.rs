
use std::io::{self, ErrorKind, Read, Write};
use std::net::{Ipv4Addr, Shutdown, SocketAddr, SocketAddrV4, TcpStream};
use std::ops::{Deref, DerefMut};
use std::time::Duration;

use thiserror::Error;

#[cfg(test)]
pub(crate) mod mock;

pub const TERMINATOR:u8 = b'\n';

pub const DEFAULT_IO_TIMEOUT_MS:u64 = 10000;
pub const CAPTURE_TIMEOUT_MS:u64    = 15000;

// Longest text response we are willing to buffer while waiting for a terminator
pub const MAX_LINE_LEN:usize = 1024;

#[derive(Debug, Error)]
pub enum ConnectError {
	#[error("connection to {addr} refused")]
	Refused { addr: SocketAddr },

	#[error("timed out connecting to {addr}")]
	Timeout { addr: SocketAddr },

	#[error("unable to reach {addr}")]
	Unreachable { addr: SocketAddr, #[source] source: io::Error },

	#[error("unable to configure socket for {addr}")]
	Configure { addr: SocketAddr, #[source] source: io::Error },
}

#[derive(Debug, Error)]
pub enum TransferError {
	#[error("timed out waiting for the instrument")]
	Timeout,

	#[error("connection closed by the instrument after {received} of {expected} bytes")]
	ConnectionClosed { received: usize, expected: usize },

	#[error("response line exceeds {0} bytes")]
	LineTooLong(usize),

	#[error("session is closed")]
	NotConnected,

	#[error("I/O error on instrument connection")]
	Io(#[source] io::Error),
}

impl From<io::Error> for TransferError {
	fn from(e:io::Error) -> Self {
		match e.kind() {
			ErrorKind::WouldBlock | ErrorKind::TimedOut => TransferError::Timeout,
			_ => TransferError::Io(e),
		}
	}
}

// Anything a session can own: a byte stream whose timeouts can be adjusted and which can be shut down
pub trait Stream: Read + Write {
	fn set_io_timeout(&mut self, timeout:Option<Duration>) -> io::Result<()>;
	fn shutdown(&mut self) -> io::Result<()>;
}

impl Stream for TcpStream {
	fn set_io_timeout(&mut self, timeout:Option<Duration>) -> io::Result<()> {
		self.set_read_timeout(timeout)?;
		self.set_write_timeout(timeout)
	}

	fn shutdown(&mut self) -> io::Result<()> { TcpStream::shutdown(self, Shutdown::Both) }
}

/// One live connection to an instrument.
///
/// The session owns its stream exclusively. `close` releases it and may be called any number of times;
/// dropping the session closes it as well.
pub struct Session<S: Stream = TcpStream> {
	stream: Option<S>,
	peer: String,
	baseline: Duration,
}

impl Session<TcpStream> {

	pub fn open(address:Ipv4Addr, port:u16, timeout:Duration) -> Result<Self, ConnectError> {
		let addr = SocketAddr::V4(SocketAddrV4::new(address, port));

		let stream = TcpStream::connect_timeout(&addr, timeout).map_err(|source| match source.kind() {
			ErrorKind::ConnectionRefused                => ConnectError::Refused { addr },
			ErrorKind::TimedOut | ErrorKind::WouldBlock => ConnectError::Timeout { addr },
			_                                           => ConnectError::Unreachable { addr, source },
		})?;

		stream.set_nodelay(true).map_err(|source| ConnectError::Configure { addr, source })?;

		let mut session = Session::from_stream(stream, addr.to_string(), timeout);
		session.apply_timeout(timeout).map_err(|source| ConnectError::Configure { addr, source })?;

		log::debug!("opened session to {}", addr);
		Ok(session)
	}

}

impl<S: Stream> Session<S> {

	// Timeouts are not touched here; `open` applies them for TCP sessions
	pub fn from_stream(stream:S, peer:String, baseline:Duration) -> Self {
		Self{ stream: Some(stream), peer, baseline }
	}

	pub fn peer(&self) -> &str { &self.peer }
	pub fn baseline_timeout(&self) -> Duration { self.baseline }
	pub fn is_open(&self) -> bool { self.stream.is_some() }

	fn stream(&mut self) -> Result<&mut S, TransferError> {
		self.stream.as_mut().ok_or(TransferError::NotConnected)
	}

	fn apply_timeout(&mut self, timeout:Duration) -> io::Result<()> {
		match self.stream.as_mut() {
			// A zero duration is rejected by the socket layer, so treat it as "block forever"
			Some(stream) => stream.set_io_timeout(Some(timeout).filter(|t| !t.is_zero())),
			None         => Ok(()),
		}
	}

	pub fn send_command(&mut self, text:&str) -> Result<(), TransferError> {
		let mut line:Vec<u8> = Vec::with_capacity(text.len() + 1);
		line.extend_from_slice(text.as_bytes());
		if line.last() != Some(&TERMINATOR) { line.push(TERMINATOR); }

		log::trace!("{} <- {:?}", self.peer, text.trim_end());

		// write_all keeps going through partial writes and interrupts
		let stream = self.stream()?;
		stream.write_all(&line)?;
		stream.flush()?;
		Ok(())
	}

	// A single receive call.  Never returns Ok(0): a peer that hung up is reported as ConnectionClosed
	pub fn recv_some(&mut self, buf:&mut [u8]) -> Result<usize, TransferError> {
		if buf.is_empty() { return Ok(0); }

		let stream = self.stream()?;
		loop {
			match stream.read(buf) {
				Ok(0) => return Err(TransferError::ConnectionClosed{ received: 0, expected: buf.len() }),
				Ok(n) => return Ok(n),
				Err(e) if e.kind() == ErrorKind::Interrupted => continue,
				Err(e) => return Err(e.into()),
			}
		}
	}

	pub fn recv_exact(&mut self, n:usize) -> Result<Vec<u8>, TransferError> {
		let mut buf:Vec<u8> = vec![0; n];
		let mut received:usize = 0;

		while received < n {
			match self.recv_some(&mut buf[received..]) {
				Ok(k) => received += k,
				Err(TransferError::ConnectionClosed{ .. }) => {
					return Err(TransferError::ConnectionClosed{ received, expected: n });
				},
				Err(e) => return Err(e),
			}
		}

		Ok(buf)
	}

	// Newline-terminated text response.  Read a byte at a time so nothing past the terminator is consumed
	pub fn recv_line(&mut self, limit:usize) -> Result<String, TransferError> {
		let mut line:Vec<u8> = vec![];
		let mut byte:[u8; 1] = [0];

		loop {
			match self.recv_some(&mut byte) {
				Ok(_) => {},
				Err(TransferError::ConnectionClosed{ .. }) => {
					return Err(TransferError::ConnectionClosed{ received: line.len(), expected: line.len() + 1 });
				},
				Err(e) => return Err(e),
			}

			if byte[0] == TERMINATOR { break; }
			if line.len() >= limit {
				self.discard_line()?;
				return Err(TransferError::LineTooLong(limit));
			}
			line.push(byte[0]);
		}

		Ok(String::from_utf8_lossy(&line).trim().to_owned())
	}

	// Drop the rest of an oversized line so the next response starts on a clean boundary
	fn discard_line(&mut self) -> Result<(), TransferError> {
		let mut byte:[u8; 1] = [0];
		let mut dropped:usize = 0;
		while byte[0] != TERMINATOR {
			self.recv_some(&mut byte)?;
			dropped += 1;
		}
		log::debug!("{}: discarded {} bytes of an overlong line", self.peer, dropped);
		Ok(())
	}

	pub fn query(&mut self, text:&str) -> Result<String, TransferError> {
		self.send_command(text)?;
		let resp = self.recv_line(MAX_LINE_LEN)?;
		log::trace!("{} -> {:?}", self.peer, resp);
		Ok(resp)
	}

	// Raise the I/O timeout until the returned guard is dropped, then fall back to the baseline
	pub fn with_timeout(&mut self, timeout:Duration) -> Result<TimeoutGuard<'_, S>, TransferError> {
		if !self.is_open() { return Err(TransferError::NotConnected); }
		self.apply_timeout(timeout)?;
		log::debug!("{}: timeout raised to {:?}", self.peer, timeout);
		Ok(TimeoutGuard{ session: self })
	}

	pub fn close(&mut self) {
		if let Some(mut stream) = self.stream.take() {
			match stream.shutdown() {
				Ok(()) => {},
				Err(e) if e.kind() == ErrorKind::NotConnected => {},
				Err(e) => log::debug!("{}: shutdown failed: {}", self.peer, e),
			}
			log::debug!("closed session to {}", self.peer);
		}
	}

}

impl<S: Stream> Drop for Session<S> {

	fn drop(&mut self) { self.close(); }

}

pub struct TimeoutGuard<'a, S: Stream> {
	session: &'a mut Session<S>,
}

impl<'a, S: Stream> Deref for TimeoutGuard<'a, S> {
	type Target = Session<S>;
	fn deref(&self) -> &Session<S> { self.session }
}

impl<'a, S: Stream> DerefMut for TimeoutGuard<'a, S> {
	fn deref_mut(&mut self) -> &mut Session<S> { self.session }
}

impl<'a, S: Stream> Drop for TimeoutGuard<'a, S> {

	fn drop(&mut self) {
		let baseline = self.session.baseline;
		match self.session.apply_timeout(baseline) {
			Ok(()) => log::debug!("{}: timeout restored to {:?}", self.session.peer, baseline),
			Err(e) => log::warn!("{}: unable to restore timeout: {}", self.session.peer, e),
		}
	}

}
