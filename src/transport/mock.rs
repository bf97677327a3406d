
// In-memory stand-in for an instrument socket, used by unit tests

use std::cell::{Cell, RefCell};
use std::io::{self, Error, ErrorKind, Read, Write};
use std::rc::Rc;
use std::time::Duration;

use super::Stream;

pub struct MockStream {
	data: Vec<u8>,
	pos: usize,
	chunk: usize,
	time_out: bool,
	written: Rc<RefCell<Vec<u8>>>,
	shutdowns: Rc<Cell<usize>>,
	timeouts: Rc<RefCell<Vec<Option<Duration>>>>,
}

impl MockStream {

	pub fn new(data:Vec<u8>) -> Self {
		Self{
			data,
			pos: 0,
			chunk: usize::MAX,
			time_out: false,
			written: Rc::new(RefCell::new(vec![])),
			shutdowns: Rc::new(Cell::new(0)),
			timeouts: Rc::new(RefCell::new(vec![])),
		}
	}

	// Deliver at most `n` bytes per read call
	pub fn chunked(mut self, n:usize) -> Self {
		self.chunk = n.max(1);
		self
	}

	// Once the data runs out, fail reads with WouldBlock instead of reporting EOF
	pub fn timing_out(mut self) -> Self {
		self.time_out = true;
		self
	}

	pub fn written(&self) -> Rc<RefCell<Vec<u8>>> { self.written.clone() }
	pub fn shutdowns(&self) -> Rc<Cell<usize>> { self.shutdowns.clone() }
	pub fn timeouts(&self) -> Rc<RefCell<Vec<Option<Duration>>>> { self.timeouts.clone() }

}

impl Read for MockStream {

	fn read(&mut self, buf:&mut [u8]) -> io::Result<usize> {
		let remaining = self.data.len() - self.pos;
		if remaining == 0 && self.time_out {
			return Err(Error::new(ErrorKind::WouldBlock, "mock read timed out"));
		}

		let n = remaining.min(buf.len()).min(self.chunk);
		buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
		self.pos += n;
		Ok(n)
	}

}

impl Write for MockStream {

	fn write(&mut self, buf:&[u8]) -> io::Result<usize> {
		// Accept a few bytes at a time so callers have to cope with partial writes
		let n = buf.len().min(3);
		self.written.borrow_mut().extend_from_slice(&buf[..n]);
		Ok(n)
	}

	fn flush(&mut self) -> io::Result<()> { Ok(()) }

}

impl Stream for MockStream {

	fn set_io_timeout(&mut self, timeout:Option<Duration>) -> io::Result<()> {
		self.timeouts.borrow_mut().push(timeout);
		Ok(())
	}

	fn shutdown(&mut self) -> io::Result<()> {
		self.shutdowns.set(self.shutdowns.get() + 1);
		Ok(())
	}

}
