use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use keyscribe::{PortHandle, Recorder, RecorderConfig, SourceEnumerator};

/// Captures live MIDI performance data from an ALSA sequencer source and
/// persists it as a Standard MIDI File.
#[derive(Parser, Debug)]
#[command(name = "keyscribe", version, about)]
struct Cli {
    /// List available MIDI sources and exit.
    #[arg(short, long)]
    list: bool,

    /// Preferred source, as "client:port". Omit to auto-select the
    /// highest-ranked source.
    #[arg(short, long, value_name = "CLIENT:PORT")]
    port: Option<String>,

    /// Output path for the recorded Standard MIDI File. Required unless
    /// --list is given; the parent directory must already exist.
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Increase log verbosity. Repeatable.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn parse_port(spec: &str) -> Result<PortHandle, String> {
    let (client, port) = spec
        .split_once(':')
        .ok_or_else(|| format!("expected CLIENT:PORT, got {:?}", spec))?;
    let client: i32 = client
        .parse()
        .map_err(|_| format!("invalid client id in {:?}", spec))?;
    let port: i32 = port
        .parse()
        .map_err(|_| format!("invalid port id in {:?}", spec))?;
    let handle = PortHandle::new(client, port);
    if !handle.is_valid() {
        return Err(format!("{:?} is not a valid port address", spec));
    }
    Ok(handle)
}

fn init_logging(verbosity: u8) {
    let default_level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();
}

fn list_sources() -> ExitCode {
    match SourceEnumerator::enumerate() {
        Ok(sources) => {
            for source in &sources {
                println!("{}", source);
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("error: {}", err);
            ExitCode::FAILURE
        }
    }
}

fn run_recording(preferred_source: PortHandle, output_path: PathBuf) -> ExitCode {
    let config = RecorderConfig {
        preferred_source,
        output_path,
    };

    let mut recorder = match Recorder::new(config) {
        Ok(recorder) => recorder,
        Err(err) => {
            eprintln!("error: {}", err);
            return ExitCode::FAILURE;
        }
    };

    recorder.start();

    let term = Arc::new(AtomicBool::new(false));
    for signal in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
        if let Err(err) = signal_hook::flag::register(signal, Arc::clone(&term)) {
            log::warn!("keyscribe: could not register signal {}: {}", signal, err);
        }
    }

    while !term.load(Ordering::Relaxed) {
        std::thread::sleep(Duration::from_secs(1));
    }

    recorder.stop();
    ExitCode::SUCCESS
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if cli.list {
        return list_sources();
    }

    let output_path = match cli.output {
        Some(path) => path,
        None => {
            eprintln!("error: --output is required unless --list is given");
            return ExitCode::FAILURE;
        }
    };

    let preferred_source = match cli.port {
        Some(spec) => match parse_port(&spec) {
            Ok(handle) => handle,
            Err(err) => {
                eprintln!("error: {}", err);
                return ExitCode::FAILURE;
            }
        },
        None => PortHandle::invalid(),
    };

    run_recording(preferred_source, output_path)
}
