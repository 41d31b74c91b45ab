//! Entrypoint: wires the OSC buses and every component together.
//!
//! CLI argument plumbing and config-file parsing stay a hand-rolled
//! `std::env::args()` scan rather than pulling in a parser crate just for
//! the binary shell.

use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ppg_audio::AudioEngine;
use ppg_detect::Processor;
use ppg_lighting::{LightingRuntime, LoggingBackend, ThrottlingBackend};
use ppg_osc::OscBus;
use ppg_sequencer::{Sampler, Sequencer};
use ppg_types::config::ConfigFile;
use ppg_types::{EngineConfig, LightingProgramKind};

const DEFAULT_CONFIG: &str = include_str!("../corazonn.toml");

struct Args {
    verbose: bool,
    config_path: Option<PathBuf>,
    sample_dir: Option<PathBuf>,
}

fn parse_args() -> Result<Args, String> {
    let raw: Vec<String> = std::env::args().skip(1).collect();
    let mut verbose = false;
    let mut config_path = None;
    let mut sample_dir = None;

    let mut i = 0;
    while i < raw.len() {
        match raw[i].as_str() {
            "-v" | "--verbose" => verbose = true,
            "--config" => {
                i += 1;
                let value = raw.get(i).ok_or("--config requires a path argument")?;
                config_path = Some(PathBuf::from(value));
            }
            "--sample-dir" => {
                i += 1;
                let value = raw.get(i).ok_or("--sample-dir requires a path argument")?;
                sample_dir = Some(PathBuf::from(value));
            }
            "-h" | "--help" => {
                print_usage();
                std::process::exit(0);
            }
            other => return Err(format!("unrecognized argument: {other}")),
        }
        i += 1;
    }

    Ok(Args {
        verbose,
        config_path,
        sample_dir,
    })
}

fn print_usage() {
    println!(
        "usage: ppg-engine [--verbose] [--config PATH] [--sample-dir PATH]\n\n\
         --verbose       enable debug logging\n\
         --config PATH   override corazonn.toml lookup (default: $XDG_CONFIG_HOME/corazonn/config.toml)\n\
         --sample-dir PATH  override sample root (default: $CORAZONN_SAMPLE_DIR or platform data dir)"
    );
}

fn init_logging(verbose: bool) {
    use simplelog::*;

    let log_level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };

    let log_path = dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("corazonn")
        .join("corazonn.log");

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let log_file = std::fs::File::create(&log_path)
        .unwrap_or_else(|_| std::fs::File::create("/tmp/corazonn.log").expect("cannot create log file"));

    WriteLogger::init(log_level, Config::default(), log_file).expect("failed to initialize logger");

    log::info!("corazonn engine starting (log level: {log_level:?})");
}

fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("corazonn").join("config.toml"))
}

/// Embedded defaults merged with an optional override file. Returns an
/// error string (mapped to exit code 1) only for a malformed override that
/// would leave the engine in an inconsistent state.
fn load_config(override_path: Option<&Path>) -> Result<EngineConfig, String> {
    let base: ConfigFile = toml::from_str(DEFAULT_CONFIG).expect("failed to parse embedded corazonn.toml");
    let mut config = EngineConfig::default().merge(base)?;

    let path = override_path.map(PathBuf::from).or_else(user_config_path);
    if let Some(path) = path {
        if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(contents) => match toml::from_str::<ConfigFile>(&contents) {
                    Ok(file) => {
                        config = config.merge(file)?;
                        log::info!(target: "engine::config", "loaded override config from {}", path.display());
                    }
                    Err(e) => {
                        log::warn!(target: "engine::config", "ignoring malformed config {}: {e}", path.display());
                    }
                },
                Err(e) => {
                    log::warn!(target: "engine::config", "could not read config {}: {e}", path.display());
                }
            }
        }
    }

    Ok(config)
}

/// Block the main thread until the operator requests shutdown. No REPL;
/// this just recognizes a `quit`/`exit` line or EOF (Ctrl-D) on stdin so
/// the process can be run interactively or piped from a supervisor.
fn wait_for_shutdown() {
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        match line {
            Ok(line) if line.trim() == "quit" || line.trim() == "exit" => return,
            Ok(_) => continue,
            Err(_) => return,
        }
    }
}

fn run(args: Args) -> Result<(), String> {
    let config = load_config(args.config_path.as_deref())?;
    let sample_dir = args.sample_dir.unwrap_or_else(ppg_audio::samples::default_sample_dir);

    let ppg_bus = Arc::new(OscBus::open(config.ports.ppg).map_err(|e| e.to_string())?);
    let beat_bus = Arc::new(OscBus::open(config.ports.beat).map_err(|e| e.to_string())?);
    let control_bus = Arc::new(OscBus::open(config.ports.control).map_err(|e| e.to_string())?);
    // Reserved for future admin tooling; no addresses route through it
    // yet, but the port is held open so it's claimed.
    let _admin_bus = OscBus::open(config.ports.admin).map_err(|e| e.to_string())?;

    let _processor = Processor::spawn(&config, &ppg_bus, Arc::clone(&beat_bus)).map_err(|e| e.to_string())?;

    let _audio = AudioEngine::spawn(config.clone(), &sample_dir, &beat_bus, &control_bus)
        .map_err(|e| e.to_string())?;

    let backend = Box::new(ThrottlingBackend::new(
        LoggingBackend::new(&config.lighting),
        config.lighting.bulb_write_throttle_ms,
    ));
    let lighting = LightingRuntime::spawn(
        config.clone(),
        backend,
        LightingProgramKind::FastAttack,
        &beat_bus,
        &control_bus,
    )
    .map_err(|e| e.to_string())?;

    let _sequencer = Sequencer::spawn(Arc::clone(&control_bus)).map_err(|e| e.to_string())?;
    let _sampler =
        Sampler::spawn(&config, Arc::clone(&ppg_bus), Arc::clone(&control_bus)).map_err(|e| e.to_string())?;

    log::info!(
        target: "engine",
        "all subsystems running (ppg:{} beat:{} control:{} admin:{})",
        config.ports.ppg,
        config.ports.beat,
        config.ports.control,
        config.ports.admin,
    );

    wait_for_shutdown();

    log::info!(target: "engine", "shutdown requested, draining subsystems");
    let stats = lighting.shutdown();
    log::info!(target: "engine", "lighting backend shut down ({} writes)", stats.writes);

    Ok(())
}

fn main() {
    let args = match parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("error: {e}");
            print_usage();
            std::process::exit(2);
        }
    };

    init_logging(args.verbose);

    if let Err(e) = run(args) {
        log::error!(target: "engine", "fatal startup error: {e}");
        eprintln!("error: {e}");
        std::process::exit(1);
    }

    std::process::exit(0);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_args(raw: &[&str]) -> Result<Args, String> {
        // parse_args reads std::env::args(); exercise the parsing logic
        // directly against a synthetic slice instead so tests don't race
        // each other over process-global argv.
        let mut verbose = false;
        let mut config_path = None;
        let mut sample_dir = None;
        let mut i = 0;
        while i < raw.len() {
            match raw[i] {
                "-v" | "--verbose" => verbose = true,
                "--config" => {
                    i += 1;
                    let value = raw.get(i).ok_or("--config requires a path argument")?;
                    config_path = Some(PathBuf::from(value));
                }
                "--sample-dir" => {
                    i += 1;
                    let value = raw.get(i).ok_or("--sample-dir requires a path argument")?;
                    sample_dir = Some(PathBuf::from(value));
                }
                other => return Err(format!("unrecognized argument: {other}")),
            }
            i += 1;
        }
        Ok(Args {
            verbose,
            config_path,
            sample_dir,
        })
    }

    #[test]
    fn accepts_known_flags() {
        let args = with_args(&["--verbose", "--sample-dir", "/tmp/samples"]).expect("should parse");
        assert!(args.verbose);
        assert_eq!(args.sample_dir, Some(PathBuf::from("/tmp/samples")));
    }

    #[test]
    fn rejects_unknown_flags() {
        assert!(with_args(&["--bogus"]).is_err());
    }

    #[test]
    fn rejects_a_flag_missing_its_value() {
        assert!(with_args(&["--config"]).is_err());
    }

    #[test]
    fn load_config_falls_back_to_embedded_defaults_when_no_override_exists() {
        let missing = PathBuf::from("/nonexistent/corazonn-test-config.toml");
        let config = load_config(Some(&missing)).expect("embedded defaults always parse");
        assert_eq!(config.ports.ppg, 9000);
        assert_eq!(config.ports.admin, 9003);
    }

    #[test]
    fn load_config_applies_a_present_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[ports]\nppg = 9500\n").unwrap();
        let config = load_config(Some(&path)).expect("valid override should merge");
        assert_eq!(config.ports.ppg, 9500);
        assert_eq!(config.ports.beat, 9001);
    }

    #[test]
    fn load_config_rejects_a_malformed_zone_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[lighting]\nbulb_zone_table = [\"only-one\"]\n").unwrap();
        assert!(load_config(Some(&path)).is_err());
    }
}
