
// Finding the instrument: explicit IPv4 address or a MAC looked up in the OS neighbor table
pub mod resolve;

// A single TCP connection to an instrument, with line-oriented send and exact-length receive
pub mod transport;

// SCPI commands and the IEEE 488.2 definite-length block framing used for binary responses
pub mod scpi;

// Supported vendors and the profile describing one instrument
pub mod devices;

// Collision-free output filenames
pub mod naming;

// The screenshot state machine tying everything together
pub mod capture;

// The `osc.cfg` key=value configuration file
pub mod config;

pub use capture::{CaptureError, CaptureEvent, CaptureObserver, CaptureReport, CaptureRequest, CaptureState, LogObserver, ScreenshotCapture};
pub use devices::{InstrumentProfile, Vendor};
pub use naming::{NamingPolicy, PrefixFormat};
