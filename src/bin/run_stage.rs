//! Thin bootstrapper that loads a stage file, drives `RhythmCore` with
//! a `NullTransport` and an optional scripted input file, and prints
//! the resulting event stream. Exists so the engine is exercisable
//! outside a test harness; pulls in no rendering or audio crate.

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;

use chordrush::input_bus::{InputEvent, InputSource};
use chordrush::{EventSink, RhythmCore, StageConfig};

#[derive(Parser, Debug)]
#[clap(author, version, about = "Drive a chordrush stage headlessly and print its event stream.")]
struct Cli {
    /// Path to a stage config JSON file.
    stage: PathBuf,

    /// Path to a scripted input JSON file (array of `ScriptedInput`).
    #[clap(short, long)]
    input: Option<PathBuf>,

    /// RNG seed for the run.
    #[clap(short, long, default_value_t = 1)]
    seed: u64,

    /// Tick size in seconds.
    #[clap(long, default_value_t = 1.0 / 120.0)]
    dt: f64,

    /// Total run duration in seconds.
    #[clap(long, default_value_t = 30.0)]
    duration: f64,
}

/// One scripted key press, at an absolute transport-seconds timestamp.
#[derive(Debug, Deserialize)]
struct ScriptedInput {
    at_seconds: f64,
    midi: u8,
    #[serde(default = "default_source")]
    source: InputSource,
}

fn default_source() -> InputSource {
    InputSource::Midi
}

struct PrintingSink;

impl EventSink for PrintingSink {
    fn emit(&mut self, event: chordrush::Event) {
        println!("{event:?}");
    }
}

fn load_stage(path: &PathBuf) -> Result<StageConfig> {
    let file = File::open(path).with_context(|| format!("opening stage file {}", path.display()))?;
    let stage: StageConfig =
        serde_json::from_reader(BufReader::new(file)).with_context(|| "parsing stage config")?;
    Ok(stage)
}

fn load_script(path: &PathBuf) -> Result<Vec<ScriptedInput>> {
    let file = File::open(path).with_context(|| format!("opening input script {}", path.display()))?;
    let script: Vec<ScriptedInput> =
        serde_json::from_reader(BufReader::new(file)).with_context(|| "parsing input script")?;
    Ok(script)
}

fn main() -> Result<()> {
    unsafe {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::init();

    let cli = Cli::parse();
    log::info!("run_stage: loading stage from {}", cli.stage.display());

    let stage = load_stage(&cli.stage)?;
    let mut script = match &cli.input {
        Some(path) => load_script(path)?,
        None => Vec::new(),
    };
    script.sort_by(|a, b| a.at_seconds.partial_cmp(&b.at_seconds).unwrap());

    let transport = chordrush::NullTransport::new();
    let (mut core, producer) =
        RhythmCore::start(stage, transport, cli.seed).context("starting run")?;

    let mut sink = PrintingSink;
    let mut t = 0.0;
    let mut next_event = 0;

    log::info!("run_stage: running for {:.1}s at dt={:.4}s", cli.duration, cli.dt);

    while t <= cli.duration && !core.is_finished() {
        while next_event < script.len() && script[next_event].at_seconds <= t {
            let entry = &script[next_event];
            producer.push(InputEvent::PitchDown { midi: entry.midi, ts_ms: t * 1000.0, source: entry.source });
            next_event += 1;
        }

        core.transport_mut().advance(cli.dt);
        core.tick(cli.dt, &mut sink);
        t += cli.dt;
    }

    log::info!("run_stage: done, metrics={:?}", core.metrics());
    Ok(())
}
