
// Output naming: `{date}_{label}_{NN}.{ext}`, where NN is the first two-digit counter that isn't taken yet.
//
// The existence check and the later write are separate steps, so two processes saving into the same
// directory at the same moment can still pick the same name.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{Local, NaiveDateTime};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PrefixFormat {
	#[default]
	None,
	// yyyy-mm-dd
	Date,
	// yyyy-mm-dd-HH-MM-SS
	DateTime,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown prefix format {0:?} (expected yyyy-mm-dd, yyyy-mm-dd-HH-MM-SS or nothing)")]
pub struct PrefixParseError(pub String);

impl FromStr for PrefixFormat {
	type Err = PrefixParseError;

	fn from_str(s:&str) -> Result<Self, Self::Err> {
		match s.trim().to_lowercase().as_str() {
			""                    => Ok(PrefixFormat::None),
			"yyyy-mm-dd"          => Ok(PrefixFormat::Date),
			"yyyy-mm-dd-hh-mm-ss" => Ok(PrefixFormat::DateTime),
			_                     => Err(PrefixParseError(s.to_owned())),
		}
	}
}

impl PrefixFormat {

	pub fn stamp(&self, now:&NaiveDateTime) -> Option<String> { match self {
		PrefixFormat::None     => None,
		PrefixFormat::Date     => Some(now.format("%Y-%m-%d").to_string()),
		PrefixFormat::DateTime => Some(now.format("%Y-%m-%d-%H-%M-%S").to_string()),
	}}

	pub fn describe(&self) -> &'static str { match self {
		PrefixFormat::None     => "(none)",
		PrefixFormat::Date     => "yyyy-mm-dd",
		PrefixFormat::DateTime => "yyyy-mm-dd-HH-MM-SS",
	}}

}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamingPolicy {
	pub prefix: PrefixFormat,
	pub label: Option<String>,
	pub extension: String,
}

impl NamingPolicy {

	pub fn new(prefix:PrefixFormat, extension:&str) -> Self {
		Self{ prefix, label: None, extension: extension.trim_start_matches('.').to_owned() }
	}

	pub fn with_label(mut self, label:Option<String>) -> Self {
		self.label = label.filter(|l| !l.is_empty());
		self
	}

	// Falls back to the lowercased model when there's no label
	pub fn base_name(&self, model:&str, now:&NaiveDateTime) -> String {
		let label:String = match &self.label {
			Some(label) => label.clone(),
			None        => model.trim().to_lowercase(),
		};

		match self.prefix.stamp(now) {
			Some(stamp) => format!("{}_{}", stamp, label),
			None        => label,
		}
	}

}

// Command line labels: trimmed, lowercased, spaces and path separators become underscores
pub fn normalize_label(raw:&str) -> Option<String> {
	let label:String = raw.trim().to_lowercase().replace([' ', '/', '\\'], "_");
	if label.is_empty() { None } else { Some(label) }
}

pub fn allocate(directory:&Path, policy:&NamingPolicy, model:&str) -> io::Result<PathBuf> {
	allocate_at(directory, policy, model, &Local::now().naive_local())
}

pub fn allocate_at(directory:&Path, policy:&NamingPolicy, model:&str, now:&NaiveDateTime) -> io::Result<PathBuf> {
	fs::create_dir_all(directory)?;

	let base:String = policy.base_name(model, now);
	let mut counter:u32 = 1;

	loop {
		let candidate:PathBuf = directory.join(format!("{}_{:02}.{}", base, counter, policy.extension));

		// symlink_metadata so a dangling link still counts as taken
		match fs::symlink_metadata(&candidate) {
			Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(candidate),
			Err(e) => return Err(e),
			Ok(_)  => {},
		}

		counter = counter.checked_add(1)
			.ok_or_else(|| io::Error::new(io::ErrorKind::Other, "ran out of numeric suffixes"))?;
	}
}
