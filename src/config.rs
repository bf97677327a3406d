
// `osc.cfg`: one `key=value` per line, `#` starts a comment.  A missing file is replaced by a commented
// sample so the user has something to edit.

use std::fs;
use std::io;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::devices::{InstrumentProfile, Vendor};
use crate::naming::PrefixFormat;
use crate::resolve::MacAddress;

pub const DEFAULT_CONFIG_FILE:&str = "osc.cfg";

pub const SAMPLE_CONFIG:&str = "\
# Oscilloscope Configuration
vendor=Rigol
model=DHO924

# Preferred: Direct IP address (fast, no ARP lookup)
ip=192.168.1.100

# Optional: MAC address (used only if IP not provided)
# mac=aa:bb:cc:dd:ee:ff

# Optional: Port number for TCP connection (default: 5555, Keysight: 5025)
# port=5025

# Optional: Change screenshot save directory (default: ~/Pictures/osc)
# output_dir=/path/to/save/screenshots

# Optional: Prefix format for saved screenshots.
# Can be \"yyyy-mm-dd\", \"yyyy-mm-dd-HH-MM-SS\", or left empty for no prefix.
# output_prefix=yyyy-mm-dd-HH-MM-SS
";

#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("configuration file {} not found; a sample was created, edit it with your oscilloscope details", .0.display())]
	Created(PathBuf),

	#[error("unable to access configuration file {}", .path.display())]
	Io { path: PathBuf, #[source] source: io::Error },

	#[error("missing required field '{0}'")]
	MissingField(&'static str),

	#[error("invalid value {value:?} for '{key}' on line {line}")]
	InvalidValue { line: usize, key: String, value: String },
}

/// Validated configuration, ready to build an instrument profile from.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
	pub vendor: Vendor,
	pub model: String,
	pub address: Option<Ipv4Addr>,
	pub hardware_address: Option<MacAddress>,
	pub port: u16,
	pub output_dir: PathBuf,
	pub output_prefix: PrefixFormat,
	pub verbose: bool,
}

impl Config {

	pub fn profile(&self) -> InstrumentProfile {
		let mut profile = InstrumentProfile::new(self.vendor, &self.model).with_port(self.port);
		profile.address = self.address;
		profile.hardware_address = self.hardware_address;
		profile
	}

	pub fn describe_scope(&self) -> String {
		let mut parts:Vec<String> = vec![self.vendor.to_string(), self.model.clone()];
		if let Some(ip) = self.address { parts.push(ip.to_string()); }
		if let Some(mac) = self.hardware_address { parts.push(mac.to_string()); }
		parts.push(self.port.to_string());
		parts.join(" / ")
	}

}

// Reads `path`, writing the sample configuration first if it does not exist
pub fn load_or_create(path:&Path) -> Result<Config, ConfigError> {
	if !path.exists() {
		fs::write(path, SAMPLE_CONFIG).map_err(|source| ConfigError::Io{ path: path.to_owned(), source })?;
		log::info!("created sample configuration at {}", path.display());
		return Err(ConfigError::Created(path.to_owned()));
	}
	load(path)
}

pub fn load(path:&Path) -> Result<Config, ConfigError> {
	let text:String = fs::read_to_string(path).map_err(|source| ConfigError::Io{ path: path.to_owned(), source })?;
	parse(&text)
}

pub fn parse(text:&str) -> Result<Config, ConfigError> {
	let mut vendor:Option<Vendor> = None;
	let mut model:Option<String> = None;
	let mut address:Option<Ipv4Addr> = None;
	let mut hardware_address:Option<MacAddress> = None;
	let mut port:Option<u16> = None;
	let mut output_dir:Option<PathBuf> = None;
	let mut output_prefix:PrefixFormat = PrefixFormat::None;

	for (idx, raw) in text.lines().enumerate() {
		let line_num:usize = idx + 1;
		let line:&str = raw.trim();
		if line.is_empty() || line.starts_with('#') { continue; }

		let (key, value) = match line.split_once('=') {
			Some((k, v)) => (k.trim().to_lowercase(), v.trim()),
			None => {
				log::warn!("ignoring line {} without '=': {:?}", line_num, line);
				continue;
			},
		};

		let invalid = || ConfigError::InvalidValue{ line: line_num, key: key.clone(), value: value.to_owned() };

		match key.as_str() {
			"vendor" => vendor = Some(Vendor::from_name(value)).filter(|_| !value.is_empty()),
			"model"  => model = Some(value.to_owned()).filter(|m| !m.is_empty()),
			"ip" if value.is_empty()  => address = None,
			"ip"     => address = Some(value.parse().map_err(|_| invalid())?),
			"mac" if value.is_empty() => hardware_address = None,
			"mac"    => hardware_address = Some(value.parse().map_err(|_| invalid())?),
			"port" if value.is_empty() => port = None,
			"port"   => port = Some(value.parse().map_err(|_| invalid())?),
			"output_dir" => output_dir = Some(expand_home(value)).filter(|_| !value.is_empty()),
			"output_prefix" => {
				output_prefix = value.parse().unwrap_or_else(|e| {
					log::warn!("{} on line {}, saving without a prefix", e, line_num);
					PrefixFormat::None
				});
			},
			_ => log::warn!("unknown config key '{}' on line {}", key, line_num),
		}
	}

	let vendor:Vendor = vendor.ok_or(ConfigError::MissingField("vendor"))?;
	let model:String = model.ok_or(ConfigError::MissingField("model"))?;

	if address.is_none() && hardware_address.is_none() {
		log::warn!("no ip or mac configured, connecting will fail until one is added");
	}

	Ok(Config{
		vendor,
		model,
		address,
		hardware_address,
		port: port.unwrap_or_else(|| vendor.default_port()),
		output_dir: output_dir.unwrap_or_else(default_output_dir),
		output_prefix,
		verbose: false,
	})
}

pub fn default_output_dir() -> PathBuf {
	match dirs::home_dir() {
		Some(home) => home.join("Pictures").join("osc"),
		None       => PathBuf::from("Pictures").join("osc"),
	}
}

// `~` and `~/...` are relative to the home directory
pub fn expand_home(raw:&str) -> PathBuf {
	let home = dirs::home_dir();
	match (raw, home) {
		("~", Some(home)) => home,
		(p, Some(home)) if p.starts_with("~/") || p.starts_with("~\\") => home.join(&p[2..]),
		(p, _) => PathBuf::from(p),
	}
}
