
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid MAC address {0:?}")]
pub struct MacParseError(pub String);

/// A 48-bit hardware address.
///
/// Parses `aa:bb:cc:dd:ee:ff`, `AA-BB-CC-DD-EE-FF` and `aabbccddeeff`.  When separators are present a group
/// may be a single digit, as BSD `arp` prints it (`0:1a:2b:3:4c:5d`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MacAddress(pub [u8; 6]);

impl MacAddress {
	pub fn octets(&self) -> [u8; 6] { self.0 }
}

impl FromStr for MacAddress {
	type Err = MacParseError;

	fn from_str(s:&str) -> Result<Self, Self::Err> {
		let err = || MacParseError(s.to_owned());
		let text = s.trim();
		let mut octets:[u8; 6] = [0; 6];

		if text.contains(|c:char| c == ':' || c == '-') {
			let groups:Vec<&str> = text.split(|c:char| c == ':' || c == '-').collect();
			if groups.len() != 6 { return Err(err()); }

			for (octet, group) in octets.iter_mut().zip(groups) {
				if group.is_empty() || group.len() > 2 || !group.chars().all(|c| c.is_ascii_hexdigit()) {
					return Err(err());
				}
				*octet = u8::from_str_radix(group, 16).map_err(|_| err())?;
			}
		} else {
			if text.len() != 12 || !text.chars().all(|c| c.is_ascii_hexdigit()) { return Err(err()); }

			for (idx, octet) in octets.iter_mut().enumerate() {
				*octet = u8::from_str_radix(&text[2*idx..2*idx + 2], 16).map_err(|_| err())?;
			}
		}

		Ok(MacAddress(octets))
	}
}

impl fmt::Display for MacAddress {
	fn fmt(&self, f:&mut fmt::Formatter) -> fmt::Result {
		let [a, b, c, d, e, g] = self.0;
		write!(f, "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}", a, b, c, d, e, g)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const EXPECTED:MacAddress = MacAddress([0xaa, 0xbb, 0xcc, 0x01, 0x02, 0x0f]);

	#[test]
	fn accepts_common_spellings() {
		assert_eq!("aa:bb:cc:01:02:0f".parse::<MacAddress>().unwrap(), EXPECTED);
		assert_eq!("AA-BB-CC-01-02-0F".parse::<MacAddress>().unwrap(), EXPECTED);
		assert_eq!("aabbcc01020F".parse::<MacAddress>().unwrap(), EXPECTED);
		assert_eq!("aa:bb:cc:1:2:f".parse::<MacAddress>().unwrap(), EXPECTED);
	}

	#[test]
	fn rejects_garbage() {
		assert!("aa:bb:cc:dd:ee".parse::<MacAddress>().is_err());
		assert!("aa:bb:cc:dd:ee:fff".parse::<MacAddress>().is_err());
		assert!("aabbccddeeg0".parse::<MacAddress>().is_err());
		assert!("aa::cc:dd:ee:ff".parse::<MacAddress>().is_err());
		assert!("".parse::<MacAddress>().is_err());
	}

	#[test]
	fn displays_lowercase_colon_form() {
		assert_eq!(EXPECTED.to_string(), "aa:bb:cc:01:02:0f");
	}
}
