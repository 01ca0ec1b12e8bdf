//! retime CLI entry point.

use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use retime::cli::Args;
use retime::driver::{self, RunOptions};
use retime::process::{ProcessOptions, Processor, TimestampFormat};
use retime::sink::{Sink, WriteOptions};
use retime::source::{ReadOptions, Source};

/// Exit code for failures before the record loop starts.
const EXIT_INITIALISATION: u8 = 1;

static STOP: AtomicBool = AtomicBool::new(false);

extern "C" fn on_signal(_signal: libc::c_int) {
    STOP.store(true, Ordering::Relaxed);
}

fn install_signal_handlers() {
    let signals = [
        libc::SIGHUP,
        libc::SIGINT,
        libc::SIGPIPE,
        libc::SIGALRM,
        libc::SIGTERM,
    ];
    for signal in signals {
        unsafe {
            libc::signal(signal, on_signal as libc::sighandler_t);
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    // Logs go to stderr so stdout stays clean for text output.
    let filter = match args.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with_writer(std::io::stderr)
        .init();

    let (format, offset) = match args.effective_format() {
        Ok(resolved) => resolved,
        Err(message) => {
            eprintln!("{message}");
            return ExitCode::from(EXIT_INITIALISATION);
        }
    };

    install_signal_handlers();

    let (mut source, mut processor, mut sink) = match build_pipeline(&args, format, offset) {
        Ok(stages) => stages,
        Err(e) => {
            tracing::error!("{e:#}");
            return ExitCode::from(EXIT_INITIALISATION);
        }
    };

    tracing::debug!(
        "reading {} ({}), writing {} ({})",
        args.read,
        source.kind(),
        args.write,
        sink.kind()
    );

    let run_options = RunOptions {
        count: args.count,
        write_all: args.all,
        verbose: args.verbose,
    };
    match driver::run(&mut source, &mut processor, &mut sink, &run_options, &STOP) {
        Ok(stats) => {
            tracing::info!(
                "packets: read {}, key frames {}, written {}, errors {}",
                stats.packets_in,
                stats.keyframes,
                stats.packets_out,
                stats.errors
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::from(e.exit_code())
        }
    }
}

fn build_pipeline(
    args: &Args,
    format: TimestampFormat,
    offset: Option<usize>,
) -> anyhow::Result<(Source, Processor, Sink)> {
    let source = Source::open(&ReadOptions {
        source: args.read.clone(),
        promiscuous: !args.no_promiscuous,
    })
    .with_context(|| format!("problem creating reader for {}", args.read))?;

    let sink = Sink::open(&WriteOptions {
        dest: args.write.clone(),
        write_keyframes: args.all,
        write_micros: args.micros,
        write_clock_times: !args.no_clock,
        write_payload: args.dump,
        date_format: args.date_format.clone(),
    })
    .with_context(|| format!("problem creating writer for {}", args.write))?;

    let processor = Processor::new(ProcessOptions {
        format,
        offset,
        fix_fcs: !args.ignore_fcs,
        use_clock_times: args.clock_times,
    });

    Ok((source, processor, sink))
}
