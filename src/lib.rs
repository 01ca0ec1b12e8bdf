//! retime - Rebuild wall-clock time for hardware-timestamped captures.
//!
//! Fusion-class network taps stamp each forwarded frame with a device
//! tick counter and periodically emit keyframes binding that counter
//! to UTC. This library reconstructs an absolute hardware time for
//! every captured frame and re-emits the stream as a retimed capture
//! file or as text records.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::atomic::AtomicBool;
//!
//! use retime::driver::{self, RunOptions};
//! use retime::process::{ProcessOptions, Processor};
//! use retime::sink::{Sink, WriteOptions};
//! use retime::source::{ReadOptions, Source};
//!
//! fn main() -> retime::Result<()> {
//!     let mut source = Source::open(&ReadOptions {
//!         source: "capture.pcap".to_string(),
//!         promiscuous: false,
//!     })?;
//!     let mut sink = Sink::open(&WriteOptions::default())?;
//!     let mut processor = Processor::new(ProcessOptions::default());
//!
//!     let stop = AtomicBool::new(false);
//!     if let Ok(stats) = driver::run(
//!         &mut source,
//!         &mut processor,
//!         &mut sink,
//!         &RunOptions::default(),
//!         &stop,
//!     ) {
//!         eprintln!("wrote {} packets", stats.packets_out);
//!     }
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod driver;
pub mod error;
pub mod fcs;
pub mod pcap;
pub mod process;
pub mod sink;
pub mod source;
pub mod time;

pub use error::{Error, Result};
pub use time::PsTime;
