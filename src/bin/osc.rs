
use std::error::Error;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{CommandFactory, FromArgMatches, Parser};

use osc_capture::capture::error_chain;
use osc_capture::config::{self, Config, DEFAULT_CONFIG_FILE};
use osc_capture::naming::normalize_label;
use osc_capture::{CaptureEvent, CaptureObserver, CaptureRequest, LogObserver, ScreenshotCapture};

#[derive(Parser, Debug)]
#[command(name = "osc", version, about = "Save a screenshot from a networked oscilloscope")]
struct Cli {
	/// Filename label used instead of the model name (spaces become underscores)
	label: Option<String>,

	/// Show detailed connection and capture info
	#[arg(short, long)]
	verbose: bool,

	/// Open the screenshot output directory without taking a screenshot
	#[arg(short, long)]
	open: bool,

	/// Configuration file, created with sample contents if missing
	#[arg(short, long, value_name = "PATH", default_value = DEFAULT_CONFIG_FILE)]
	config: PathBuf,

	/// Write the screenshot to this exact path
	#[arg(long, value_name = "PATH")]
	output: Option<PathBuf>,

	/// Print a JSON report of the capture to stdout
	#[arg(long)]
	json: bool,
}

// Console output for the user, everything also goes to the log
struct Console {
	scope: String,
	quiet: bool,
}

impl Console {

	fn message(&self, event:&CaptureEvent) -> Option<String> {
		match event {
			CaptureEvent::Connected{ address, port } => Some(format!("✓ Connected to {} at {}:{}", self.scope, address, port)),
			CaptureEvent::SessionClosed              => Some("✓ Disconnected from oscilloscope".to_owned()),
			CaptureEvent::Saved{ path, .. }          => Some(format!("✓ Screenshot saved as: {}", path.display())),
			_ => None,
		}
	}

}

impl CaptureObserver for Console {

	fn on_event(&mut self, event:&CaptureEvent) {
		// main() reports the failure itself
		if !matches!(event, CaptureEvent::Failed(_)) { LogObserver.on_event(event); }
		if self.quiet { return; }

		if let Some(msg) = self.message(event) { println!("{}", msg); }
	}

}

fn main() -> ExitCode {
	let cli:Cli = parse_args();
	init_logging(cli.verbose);

	match run(&cli) {
		Ok(()) => ExitCode::SUCCESS,
		Err(e) => {
			eprintln!("✗ {}", error_chain(e.as_ref()));
			ExitCode::FAILURE
		},
	}
}

fn parse_args() -> Cli {
	let matches = Cli::command()
		.after_help(help_details(Path::new(DEFAULT_CONFIG_FILE)))
		.get_matches();

	Cli::from_arg_matches(&matches).unwrap_or_else(|e| e.exit())
}

fn init_logging(verbose:bool) {
	let default_filter = if verbose { "debug" } else { "warn" };
	env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
		.format_timestamp(None)
		.init();
}

// Shown under --help; reads the default config without creating it
fn help_details(path:&Path) -> String {
	let cfg:Option<Config> = config::load(path).ok();

	let scope:String = cfg.as_ref()
		.map(Config::describe_scope)
		.unwrap_or_else(|| format!("(no valid {})", path.display()));
	let save_dir:PathBuf = cfg.as_ref()
		.map(|c| c.output_dir.clone())
		.unwrap_or_else(config::default_output_dir);
	let prefix = cfg.as_ref().map(|c| c.output_prefix).unwrap_or_default();

	format!(
		"Details:\n  Oscilloscope: {}\n  Save location: {}\n  Prefix format: {}\n\n\
		 Examples:\n  osc testlabel\n  osc -v mylabel\n  osc -o\n  osc",
		scope, save_dir.display(), prefix.describe())
}

fn run(cli:&Cli) -> Result<(), Box<dyn Error>> {
	let mut cfg:Config = config::load_or_create(&cli.config)?;
	cfg.verbose = cli.verbose;

	if cli.open { return open_output_dir(&cfg.output_dir); }

	log::info!("configuration loaded: {} {}", cfg.vendor, cfg.model);
	log::info!("output directory: {}", cfg.output_dir.display());
	log::info!("output prefix format: {}", cfg.output_prefix.describe());
	match (cfg.address, cfg.hardware_address) {
		(Some(ip), _)   => log::info!("using direct IP: {}", ip),
		(None, Some(m)) => log::info!("will search neighbor table for MAC: {}", m),
		(None, None)    => {},
	}
	log::info!("TCP port: {}", cfg.port);

	let capture = ScreenshotCapture::new(cfg.profile(), &cfg.output_dir).with_prefix(cfg.output_prefix);
	let request = CaptureRequest{
		label: cli.label.as_deref().and_then(normalize_label),
		output: cli.output.clone(),
	};

	let mut console = Console{ scope: format!("{} {}", cfg.vendor, cfg.model), quiet: cli.json };
	let report = capture.run_observed(&request, &mut console)?;

	if cli.json {
		println!("{}", serde_json::to_string_pretty(&report)?);
	}

	Ok(())
}

fn open_output_dir(dir:&Path) -> Result<(), Box<dyn Error>> {
	fs::create_dir_all(dir)?;
	log::info!("opening {}", dir.display());
	opener::open(dir)?;
	Ok(())
}
