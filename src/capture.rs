
// One screenshot, start to finish:
//
//   Idle -> Connected -> Capturing -> Saved
//
// with any step able to drop into Failed.  Nothing is retried; the instrument may simply be switched off,
// and a broken transfer has to be started again from the top.  Whatever happens, the session is closed
// before `run` returns.

use std::fs;
use std::io;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::devices::{InstrumentProfile, Vendor};
use crate::naming::{self, NamingPolicy, PrefixFormat};
use crate::resolve::{self, ArpCommand, NeighborTable, ResolutionError};
use crate::scpi::{BlockFrame, BlockReader, FrameError, Identification, IDN_QUERY};
use crate::transport::{ConnectError, Session, Stream, TransferError, CAPTURE_TIMEOUT_MS};

#[derive(Debug, Error)]
pub enum CaptureError {
	#[error("unable to resolve instrument address")]
	Resolve(#[from] ResolutionError),

	#[error("unable to connect to instrument")]
	Connect(#[from] ConnectError),

	#[error("unable to send capture command")]
	Command(#[source] TransferError),

	#[error("unable to read screenshot data")]
	Frame(#[from] FrameError),

	#[error("unable to choose an output file in {}", .dir.display())]
	Allocate { dir: PathBuf, #[source] source: io::Error },

	#[error("unable to write {}", .path.display())]
	Write { path: PathBuf, #[source] source: io::Error },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CaptureState { Idle, Connected, Capturing, Saved, Failed }

/// Progress of a capture, in the order things happen.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureEvent {
	StateChanged(CaptureState),
	Resolved { address: Ipv4Addr },
	Connected { address: Ipv4Addr, port: u16 },
	Identified(String),
	IdentifyFailed(String),
	CommandSent(String),
	TransferStarted { bytes: usize },
	TransferProgress { received: usize, total: usize },
	Saved { path: PathBuf, bytes: usize },
	SessionClosed,
	Failed(String),
}

pub trait CaptureObserver {
	fn on_event(&mut self, event:&CaptureEvent);
}

impl<F: FnMut(&CaptureEvent)> CaptureObserver for F {
	fn on_event(&mut self, event:&CaptureEvent) { self(event) }
}

/// Forwards every event to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl CaptureObserver for LogObserver {

	fn on_event(&mut self, event:&CaptureEvent) {
		match event {
			CaptureEvent::StateChanged(state)            => log::debug!("capture state: {:?}", state),
			CaptureEvent::Resolved{ address }            => log::info!("instrument address: {}", address),
			CaptureEvent::Connected{ address, port }     => log::info!("connected to {}:{}", address, port),
			CaptureEvent::Identified(idn)                => log::info!("instrument info: {}", idn),
			CaptureEvent::IdentifyFailed(reason)         => log::warn!("identification query failed: {}", reason),
			CaptureEvent::CommandSent(cmd)               => log::debug!("sent {:?}", cmd),
			CaptureEvent::TransferStarted{ bytes }       => log::info!("receiving {} bytes of image data", bytes),
			CaptureEvent::TransferProgress{ received, total } => log::trace!("received {}/{} bytes", received, total),
			CaptureEvent::Saved{ path, bytes }           => log::info!("saved {} bytes to {}", bytes, path.display()),
			CaptureEvent::SessionClosed                  => log::debug!("disconnected from instrument"),
			CaptureEvent::Failed(reason)                 => log::error!("capture failed: {}", reason),
		}
	}

}

#[derive(Debug, Clone, Default)]
pub struct CaptureRequest {
	// Replaces the model name in generated filenames
	pub label: Option<String>,
	// Write here instead of allocating a name in the output directory
	pub output: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CaptureReport {
	pub path: PathBuf,
	pub bytes: usize,
	pub vendor: Vendor,
	pub model: String,
	pub address: Ipv4Addr,
	pub port: u16,
	pub identification: Option<String>,
}

pub struct ScreenshotCapture {
	profile: InstrumentProfile,
	output_dir: PathBuf,
	prefix: PrefixFormat,
	capture_timeout: Duration,
	identify: bool,
	reader: BlockReader,
	neighbors: Box<dyn NeighborTable>,
}

impl ScreenshotCapture {

	pub fn new(profile:InstrumentProfile, output_dir:&Path) -> Self {
		Self{
			profile,
			output_dir: output_dir.to_owned(),
			prefix: PrefixFormat::None,
			capture_timeout: Duration::from_millis(CAPTURE_TIMEOUT_MS),
			identify: true,
			reader: BlockReader::default(),
			neighbors: Box::new(ArpCommand),
		}
	}

	pub fn with_prefix(mut self, prefix:PrefixFormat) -> Self {
		self.prefix = prefix;
		self
	}

	pub fn with_capture_timeout(mut self, timeout:Duration) -> Self {
		self.capture_timeout = timeout;
		self
	}

	// Skip the `*IDN?` query before capturing
	pub fn without_identification(mut self) -> Self {
		self.identify = false;
		self
	}

	pub fn with_neighbor_table(mut self, table:Box<dyn NeighborTable>) -> Self {
		self.neighbors = table;
		self
	}

	pub fn profile(&self) -> &InstrumentProfile { &self.profile }

	pub fn run(&self, request:&CaptureRequest) -> Result<CaptureReport, CaptureError> {
		self.run_observed(request, &mut LogObserver)
	}

	pub fn run_observed(&self, request:&CaptureRequest, observer:&mut dyn CaptureObserver) -> Result<CaptureReport, CaptureError> {
		observer.on_event(&CaptureEvent::StateChanged(CaptureState::Idle));

		let result = self.drive(request, observer);
		if let Err(ref e) = result {
			observer.on_event(&CaptureEvent::StateChanged(CaptureState::Failed));
			observer.on_event(&CaptureEvent::Failed(error_chain(e)));
		}
		result
	}

	fn drive(&self, request:&CaptureRequest, observer:&mut dyn CaptureObserver) -> Result<CaptureReport, CaptureError> {
		let address:Ipv4Addr = resolve::resolve_with(&self.profile, self.neighbors.as_ref())?;
		observer.on_event(&CaptureEvent::Resolved{ address });

		let mut session = Session::open(address, self.profile.port, self.profile.io_timeout)?;
		observer.on_event(&CaptureEvent::Connected{ address, port: self.profile.port });
		observer.on_event(&CaptureEvent::StateChanged(CaptureState::Connected));

		let exchanged = self.exchange(&mut session, observer);
		session.close();
		observer.on_event(&CaptureEvent::SessionClosed);
		let (identification, frame) = exchanged?;

		let path:PathBuf = match &request.output {
			Some(path) => path.clone(),
			None => {
				let policy = NamingPolicy::new(self.prefix, self.profile.vendor.extension())
					.with_label(request.label.clone());
				naming::allocate(&self.output_dir, &policy, &self.profile.model)
					.map_err(|source| CaptureError::Allocate{ dir: self.output_dir.clone(), source })?
			},
		};

		write_payload(&path, frame.payload())?;

		let bytes:usize = frame.declared_length();
		observer.on_event(&CaptureEvent::Saved{ path: path.clone(), bytes });
		observer.on_event(&CaptureEvent::StateChanged(CaptureState::Saved));

		Ok(CaptureReport{
			path,
			bytes,
			vendor: self.profile.vendor,
			model: self.profile.model.clone(),
			address,
			port: self.profile.port,
			identification,
		})
	}

	/// The command/response part of a capture on an already open session: identify, send the vendor's
	/// capture command and read back the framed image.  The session is left open.
	pub fn exchange<S: Stream>(&self, session:&mut Session<S>, observer:&mut dyn CaptureObserver)
		-> Result<(Option<String>, BlockFrame), CaptureError> {

		let identification:Option<String> = if self.identify {
			match session.query(IDN_QUERY) {
				Ok(idn) => {
					if let Some(parsed) = Identification::parse(&idn) {
						if !parsed.model.eq_ignore_ascii_case(&self.profile.model) {
							log::warn!("instrument reports model {} but {} is configured", parsed.model, self.profile.model);
						}
					}
					observer.on_event(&CaptureEvent::Identified(idn.clone()));
					Some(idn)
				},
				Err(e) => {
					observer.on_event(&CaptureEvent::IdentifyFailed(e.to_string()));
					None
				},
			}
		} else {
			None
		};

		observer.on_event(&CaptureEvent::StateChanged(CaptureState::Capturing));

		let vendor:Vendor = self.profile.vendor;
		let mut session = session.with_timeout(self.capture_timeout).map_err(CaptureError::Command)?;

		let commands = vendor.capture_preamble().into_iter().chain(Some(vendor.capture_command()));
		for cmd in commands {
			session.send_command(cmd).map_err(CaptureError::Command)?;
			observer.on_event(&CaptureEvent::CommandSent(cmd.to_owned()));
		}

		let frame:BlockFrame = self.reader.read_frame_with_progress(&mut *session, |received, total| {
			if received == 0 { observer.on_event(&CaptureEvent::TransferStarted{ bytes: total }); }
			else { observer.on_event(&CaptureEvent::TransferProgress{ received, total }); }
		})?;

		Ok((identification, frame))
	}

}

fn write_payload(path:&Path, payload:&[u8]) -> Result<(), CaptureError> {
	let wrap = |source:io::Error| CaptureError::Write{ path: path.to_owned(), source };

	if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
		fs::create_dir_all(parent).map_err(wrap)?;
	}
	fs::write(path, payload).map_err(wrap)
}

/// `err: cause: cause ...`, for one-line reports.
pub fn error_chain(err:&dyn std::error::Error) -> String {
	let mut out:String = err.to_string();
	let mut source = err.source();
	while let Some(cause) = source {
		out.push_str(": ");
		out.push_str(&cause.to_string());
		source = cause.source();
	}
	out
}
