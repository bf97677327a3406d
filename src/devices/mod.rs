
// Vendors are kept as a closed set.  Each one knows how to ask for a screenshot, what kind of image comes
// back, and which port it listens on by default.

use std::fmt;
use std::net::Ipv4Addr;
use std::time::Duration;

use serde::Serialize;

use crate::resolve::MacAddress;
use crate::scpi::DISPLAY_DATA_QUERY;
use crate::transport::DEFAULT_IO_TIMEOUT_MS;

pub const DEFAULT_PORT:u16  = 5555;
pub const KEYSIGHT_PORT:u16 = 5025;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Vendor { Rigol, Keysight, Tektronix, Unknown }

impl Vendor {

	// Anything we don't recognise is driven like a Rigol
	pub fn from_name(name:&str) -> Self {
		match name.trim().to_lowercase().as_str() {
			"rigol"     => Vendor::Rigol,
			"keysight"  => Vendor::Keysight,
			"tektronix" => Vendor::Tektronix,
			_           => Vendor::Unknown,
		}
	}

	// Sent before the capture query, response not read
	pub fn capture_preamble(&self) -> Option<&'static str> { match self {
		Vendor::Tektronix => Some("HARDCopy:PORT ETHernet"),
		_                 => None,
	}}

	pub fn capture_command(&self) -> &'static str { match self {
		Vendor::Keysight => ":DISPlay:DATA? PNG",
		_                => DISPLAY_DATA_QUERY,
	}}

	pub fn extension(&self) -> &'static str { match self {
		Vendor::Keysight | Vendor::Tektronix => "png",
		Vendor::Rigol | Vendor::Unknown      => "bmp",
	}}

	pub fn default_port(&self) -> u16 { match self {
		Vendor::Keysight => KEYSIGHT_PORT,
		_                => DEFAULT_PORT,
	}}

}

impl fmt::Display for Vendor {
	fn fmt(&self, f:&mut fmt::Formatter) -> fmt::Result {
		let name = match self {
			Vendor::Rigol     => "Rigol",
			Vendor::Keysight  => "Keysight",
			Vendor::Tektronix => "Tektronix",
			Vendor::Unknown   => "Unknown",
		};
		f.write_str(name)
	}
}

/// Everything needed to reach one instrument.  Built from validated configuration and left alone once a
/// session has been opened.
#[derive(Debug, Clone)]
pub struct InstrumentProfile {
	pub vendor: Vendor,
	pub model: String,
	pub address: Option<Ipv4Addr>,
	pub hardware_address: Option<MacAddress>,
	pub port: u16,
	pub io_timeout: Duration,
}

impl InstrumentProfile {

	pub fn new(vendor:Vendor, model:&str) -> Self {
		Self{
			vendor,
			model: model.trim().to_owned(),
			address: None,
			hardware_address: None,
			port: vendor.default_port(),
			io_timeout: Duration::from_millis(DEFAULT_IO_TIMEOUT_MS),
		}
	}

	pub fn with_address(mut self, address:Ipv4Addr) -> Self {
		self.address = Some(address);
		self
	}

	pub fn with_hardware_address(mut self, mac:MacAddress) -> Self {
		self.hardware_address = Some(mac);
		self
	}

	pub fn with_port(mut self, port:u16) -> Self {
		self.port = port;
		self
	}

	pub fn with_io_timeout(mut self, timeout:Duration) -> Self {
		self.io_timeout = timeout;
		self
	}

	// Model as it appears in generated filenames
	pub fn model_label(&self) -> String { self.model.to_lowercase() }

}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn vendor_names_are_case_insensitive() {
		assert_eq!(Vendor::from_name("RIGOL"), Vendor::Rigol);
		assert_eq!(Vendor::from_name(" keysight "), Vendor::Keysight);
		assert_eq!(Vendor::from_name("Tektronix"), Vendor::Tektronix);
		assert_eq!(Vendor::from_name("Siglent"), Vendor::Unknown);
	}

	#[test]
	fn vendor_tables() {
		assert_eq!(Vendor::Rigol.capture_command(), ":DISPlay:DATA?");
		assert_eq!(Vendor::Unknown.capture_command(), ":DISPlay:DATA?");
		assert_eq!(Vendor::Keysight.capture_command(), ":DISPlay:DATA? PNG");
		assert_eq!(Vendor::Tektronix.capture_preamble(), Some("HARDCopy:PORT ETHernet"));
		assert_eq!(Vendor::Tektronix.capture_command(), ":DISPlay:DATA?");

		assert_eq!(Vendor::Rigol.extension(), "bmp");
		assert_eq!(Vendor::Unknown.extension(), "bmp");
		assert_eq!(Vendor::Keysight.extension(), "png");
		assert_eq!(Vendor::Tektronix.extension(), "png");
	}

	#[test]
	fn default_port_follows_vendor() {
		assert_eq!(InstrumentProfile::new(Vendor::Rigol, "DHO924").port, 5555);
		assert_eq!(InstrumentProfile::new(Vendor::Keysight, "DSOX1204G").port, 5025);
		assert_eq!(InstrumentProfile::new(Vendor::Keysight, "DSOX1204G").with_port(5555).port, 5555);
	}
}
