
// Common IEEE 488.2 / SCPI commands shared by every supported vendor
pub const IDN_QUERY:&str          = "*IDN?";
pub const DISPLAY_DATA_QUERY:&str = ":DISPlay:DATA?";

pub mod block;

pub use block::{BlockFrame, BlockReader, FrameError, read_frame};

/// Parsed `*IDN?` response: `<manufacturer>,<model>,<serial>,<firmware>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identification {
	pub manufacturer: String,
	pub model: String,
	pub serial_num: String,
	pub fw_version: String,
}

impl Identification {

	// Instruments that answer with fewer than four fields are reported as unparsed
	pub fn parse(resp:&str) -> Option<Self> {
		let mut fields = resp.trim().splitn(4, ',').map(|f| f.trim().to_owned());

		let manufacturer = fields.next().filter(|f| !f.is_empty())?;
		let model        = fields.next()?;
		let serial_num   = fields.next()?;
		let fw_version   = fields.next()?;

		Some(Self{ manufacturer, model, serial_num, fw_version })
	}

}
