
// Finding the instrument on the network.  An explicit IP is used as-is; otherwise the hardware address is
// looked up in the neighbor (ARP) cache the OS already keeps.  No packets are sent to discover anything.
//
// Table scraping is best effort: the layout of `arp -a` differs between platforms, versions and locales,
// and an instrument that hasn't talked to this host recently won't be in the table at all.

use std::io::{self, ErrorKind};
use std::net::Ipv4Addr;
use std::process::Command;

use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;

use crate::devices::InstrumentProfile;

pub mod mac;

pub use mac::{MacAddress, MacParseError};

lazy_static! {
	static ref WINDOWS_MAC_RE: Regex = Regex::new("(?i)([0-9a-f]{2}-){5}[0-9a-f]{2}").unwrap();
	static ref WINDOWS_IP_RE: Regex  = Regex::new("^\\s*(\\d{1,3}\\.\\d{1,3}\\.\\d{1,3}\\.\\d{1,3})").unwrap();
	static ref UNIX_MAC_RE: Regex    = Regex::new("(?i)([0-9a-f]{1,2}[:-]){5}[0-9a-f]{1,2}").unwrap();
	static ref UNIX_IP_RE: Regex     = Regex::new("\\((\\d{1,3}\\.\\d{1,3}\\.\\d{1,3}\\.\\d{1,3})\\)").unwrap();
}

#[derive(Debug, Error)]
pub enum ResolutionError {
	#[error("no IP address or MAC address configured")]
	NoAddressSource,

	#[error("MAC address {0} not found in the neighbor table")]
	MacNotFound(MacAddress),

	#[error("unable to read the neighbor table")]
	LookupFailed(#[source] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFlavor {
	// `  192.168.1.50          aa-bb-cc-dd-ee-ff     dynamic`
	Windows,
	// `? (192.168.1.50) at aa:bb:cc:dd:ee:ff [ether] on eth0`
	Unix,
}

impl TableFlavor {
	pub fn native() -> Self {
		if cfg!(windows) { TableFlavor::Windows } else { TableFlavor::Unix }
	}
}

/// Source of the neighbor table text.
pub trait NeighborTable {
	fn flavor(&self) -> TableFlavor;
	fn list(&self) -> io::Result<String>;
}

/// Runs `arp -a` and hands back its output.
#[derive(Debug, Default, Clone, Copy)]
pub struct ArpCommand;

impl NeighborTable for ArpCommand {

	fn flavor(&self) -> TableFlavor { TableFlavor::native() }

	fn list(&self) -> io::Result<String> {
		let output = Command::new("arp").arg("-a").output()?;

		if !output.status.success() {
			return Err(io::Error::new(ErrorKind::Other, format!("arp -a exited with {}", output.status)));
		}

		String::from_utf8(output.stdout)
			.map_err(|_| io::Error::new(ErrorKind::InvalidData, "arp -a output is not valid UTF-8"))
	}

}

pub fn resolve(profile:&InstrumentProfile) -> Result<Ipv4Addr, ResolutionError> {
	resolve_with(profile, &ArpCommand)
}

pub fn resolve_with<T: NeighborTable + ?Sized>(profile:&InstrumentProfile, table:&T) -> Result<Ipv4Addr, ResolutionError> {
	if let Some(address) = profile.address {
		return Ok(address);
	}

	let target:MacAddress = profile.hardware_address.ok_or(ResolutionError::NoAddressSource)?;
	log::info!("searching neighbor table for {}", target);

	let text:String = table.list().map_err(|e| {
		log::warn!("neighbor table lookup failed: {}", e);
		ResolutionError::LookupFailed(e)
	})?;

	match scan_table(&text, table.flavor(), &target) {
		Some(address) => {
			log::info!("found {} at {}", target, address);
			Ok(address)
		},
		None => Err(ResolutionError::MacNotFound(target)),
	}
}

/// First row, top to bottom, whose hardware address equals `target`.
pub fn scan_table(text:&str, flavor:TableFlavor, target:&MacAddress) -> Option<Ipv4Addr> {
	text.lines().find_map(|line| scan_row(line, flavor, target))
}

fn scan_row(line:&str, flavor:TableFlavor, target:&MacAddress) -> Option<Ipv4Addr> {
	let lower:String = line.to_lowercase();

	let (mac_re, ip_re, marker):(&Regex, &Regex, &str) = match flavor {
		TableFlavor::Windows => (&*WINDOWS_MAC_RE, &*WINDOWS_IP_RE, "dynamic"),
		TableFlavor::Unix    => (&*UNIX_MAC_RE, &*UNIX_IP_RE, "ether"),
	};

	if !lower.contains(marker) { return None; }

	let found:MacAddress = mac_re.find(&lower)?.as_str().parse().ok()?;
	if found != *target { return None; }

	ip_re.captures(line)?.get(1)?.as_str().parse().ok()
}

#[cfg(test)]
mod tests {
	use std::cell::Cell;

	use super::*;
	use crate::devices::Vendor;

	const UNIX_TABLE:&str = "\
? (192.168.1.1) at 00:11:22:33:44:55 [ether] on eth0
? (192.168.1.20) at <incomplete> on eth0
? (192.168.1.50) at aa:bb:cc:dd:ee:ff [ether] on eth0
? (192.168.1.51) at aa:bb:cc:dd:ee:ff [ether] on eth1
";

	const MACOS_TABLE:&str = "\
? (10.0.0.1) at 0:1a:2b:3:4c:5d on en0 ifscope [ethernet]
? (10.0.0.7) at aa:bb:cc:dd:ee:ff on en0 ifscope [ethernet]
";

	const WINDOWS_TABLE:&str = "\
Interface: 192.168.1.10 --- 0x4
  Internet Address      Physical Address      Type
  192.168.1.1           00-11-22-33-44-55     dynamic
  192.168.1.49          aa-bb-cc-dd-ee-ff     static
  192.168.1.50          AA-BB-CC-DD-EE-FF     dynamic
  192.168.1.255         ff-ff-ff-ff-ff-ff     static
";

	struct FakeTable {
		flavor: TableFlavor,
		text: io::Result<String>,
		calls: Cell<usize>,
	}

	impl FakeTable {
		fn new(flavor:TableFlavor, text:&str) -> Self {
			Self{ flavor, text: Ok(text.to_owned()), calls: Cell::new(0) }
		}

		fn failing() -> Self {
			Self{ flavor: TableFlavor::Unix, text: Err(io::Error::new(ErrorKind::NotFound, "arp: not found")), calls: Cell::new(0) }
		}
	}

	impl NeighborTable for FakeTable {
		fn flavor(&self) -> TableFlavor { self.flavor }

		fn list(&self) -> io::Result<String> {
			self.calls.set(self.calls.get() + 1);
			match &self.text {
				Ok(text) => Ok(text.clone()),
				Err(e)   => Err(io::Error::new(e.kind(), e.to_string())),
			}
		}
	}

	fn mac(s:&str) -> MacAddress { s.parse().unwrap() }

	fn profile() -> InstrumentProfile { InstrumentProfile::new(Vendor::Rigol, "DHO924") }

	#[test]
	fn explicit_address_skips_table() {
		let table = FakeTable::new(TableFlavor::Unix, UNIX_TABLE);
		let p = profile()
			.with_address(Ipv4Addr::new(192, 168, 1, 77))
			.with_hardware_address(mac("aa:bb:cc:dd:ee:ff"));

		assert_eq!(resolve_with(&p, &table).unwrap(), Ipv4Addr::new(192, 168, 1, 77));
		assert_eq!(table.calls.get(), 0);
	}

	#[test]
	fn unix_table_first_match_wins() {
		let table = FakeTable::new(TableFlavor::Unix, UNIX_TABLE);
		let p = profile().with_hardware_address(mac("AA-BB-CC-DD-EE-FF"));

		assert_eq!(resolve_with(&p, &table).unwrap(), Ipv4Addr::new(192, 168, 1, 50));
	}

	#[test]
	fn bsd_table_with_short_groups() {
		let table = FakeTable::new(TableFlavor::Unix, MACOS_TABLE);
		let p = profile().with_hardware_address(mac("00:1a:2b:03:4c:5d"));

		assert_eq!(resolve_with(&p, &table).unwrap(), Ipv4Addr::new(10, 0, 0, 1));
	}

	#[test]
	fn windows_table_only_dynamic_rows() {
		let table = FakeTable::new(TableFlavor::Windows, WINDOWS_TABLE);
		let p = profile().with_hardware_address(mac("aabbccddeeff"));

		assert_eq!(resolve_with(&p, &table).unwrap(), Ipv4Addr::new(192, 168, 1, 50));
	}

	#[test]
	fn flavors_do_not_cross() {
		assert_eq!(scan_table(WINDOWS_TABLE, TableFlavor::Unix, &mac("aa:bb:cc:dd:ee:ff")), None);
		assert_eq!(scan_table(UNIX_TABLE, TableFlavor::Windows, &mac("aa:bb:cc:dd:ee:ff")), None);
	}

	#[test]
	fn missing_mac() {
		let table = FakeTable::new(TableFlavor::Unix, UNIX_TABLE);
		let p = profile().with_hardware_address(mac("01:02:03:04:05:06"));

		match resolve_with(&p, &table) {
			Err(ResolutionError::MacNotFound(m)) => assert_eq!(m, mac("01:02:03:04:05:06")),
			other => panic!("unexpected result {:?}", other),
		}
	}

	#[test]
	fn no_address_source() {
		let table = FakeTable::new(TableFlavor::Unix, UNIX_TABLE);
		assert!(matches!(resolve_with(&profile(), &table), Err(ResolutionError::NoAddressSource)));
		assert_eq!(table.calls.get(), 0);
	}

	#[test]
	fn command_failure_is_reported() {
		let p = profile().with_hardware_address(mac("aa:bb:cc:dd:ee:ff"));
		assert!(matches!(resolve_with(&p, &FakeTable::failing()), Err(ResolutionError::LookupFailed(_))));
	}
}
