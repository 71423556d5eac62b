// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::error::Error;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use clap::{crate_version, Parser, Subcommand};
use tracing::{error, info};

use synthpump::audio::thread_priority::{
    configure_loop_thread_priority, loop_thread_priority, rt_enabled,
};
use synthpump::audio::transport::{self, simulator::I2sSimulator, wav::WavTransport};
use synthpump::audio::{DrainLoop, DrainStats, SampleSource, SynthSource, Transport};
use synthpump::config::{parse_duration, Pump};
use synthpump::synth::{Bank, Engine};

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "Pumps synthesized audio into a fixed-rate audio sink."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Runs the pump with the transport from the config.
    Run {
        /// The path to the pump config.
        config: PathBuf,
        /// Stop after this long, e.g. 30s. Runs forever when unset.
        #[arg(short, long)]
        duration: Option<String>,
    },
    /// Runs the pump against a real-time simulated I2S bus and reports dropouts.
    Simulate {
        /// The path to the pump config.
        config: PathBuf,
        /// Stop after this long (default: 5s).
        #[arg(short, long)]
        duration: Option<String>,
    },
    /// Renders the pump's output to a WAV file as fast as possible.
    Render {
        /// The path to the pump config.
        config: PathBuf,
        /// The WAV file to write.
        output: PathBuf,
        /// Length of audio to render, e.g. 10s.
        #[arg(short, long)]
        duration: String,
    },
    /// Lists the available audio output devices.
    Devices {},
    /// Lists the instruments in a bank file, or in the embedded bank.
    Bank {
        /// The path to the bank file.
        path: Option<PathBuf>,
    },
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run { config, duration } => run(&config, duration.as_deref()),
        Commands::Simulate { config, duration } => simulate(&config, duration.as_deref()),
        Commands::Render {
            config,
            output,
            duration,
        } => render(&config, output, &duration),
        Commands::Devices {} => {
            let devices = transport::cpal::list_devices()?;
            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
            Ok(())
        }
        Commands::Bank { path } => {
            let bank = match path {
                Some(path) => Bank::from_path(&path)?,
                None => Bank::embedded()?,
            };
            println!("Instruments (gain {}):", bank.gain());
            for (channel, instrument) in bank.instruments().iter().enumerate() {
                println!(
                    "- channel {}: {} ({:?}, attack {:?}, decay {:?}, sustain {}, release {:?}, gain {})",
                    channel,
                    instrument.name(),
                    instrument.waveform(),
                    instrument.attack(),
                    instrument.decay(),
                    instrument.sustain(),
                    instrument.release(),
                    instrument.gain(),
                );
            }
            Ok(())
        }
    };

    if let Err(e) = &result {
        error!(err = e.as_ref(), "synthpump halted");
    }
    result
}

fn load_config(path: &Path) -> Result<Pump, Box<dyn Error>> {
    let pump = Pump::load(path)?;
    pump.validate()?;
    Ok(pump)
}

/// Loads the bank and prepares the synth for mono output at the configured rate.
fn build_source(pump: &Pump) -> Result<SynthSource, Box<dyn Error>> {
    let bank = match pump.bank() {
        Some(path) => Bank::from_path(path)?,
        None => Bank::embedded()?,
    };
    let mut source = SynthSource::new(Engine::new(bank, pump.max_voices())?);
    source.set_output(1, pump.sample_rate())?;
    Ok(source)
}

/// Brings up the transport and drives the drain loop until `keep_running`
/// returns false.
fn pump_into<T, F>(
    pump: &Pump,
    mut transport: T,
    period: Duration,
    keep_running: F,
) -> Result<(DrainStats, T), Box<dyn Error>>
where
    T: Transport,
    F: FnMut(&DrainStats) -> bool,
{
    let source = build_source(pump)?;
    transport::bring_up(&mut transport, &pump.transport_config())?;

    let mut drain = DrainLoop::new(
        source,
        transport,
        pump.buffer().capacity(),
        pump.buffer().batch_threshold(),
        pump.layout(),
    );
    if let Some(sequencer) = pump.sequencer()? {
        drain = drain.with_sequencer(sequencer);
    }

    drain.run(period, keep_running)?;
    let stats = drain.finish()?;
    let (_, transport) = drain.into_parts();
    Ok((stats, transport))
}

/// Stops once `limit` has passed, or never when there is no limit.
fn deadline(limit: Option<Duration>) -> impl FnMut(&DrainStats) -> bool {
    let started = Instant::now();
    move |_| limit.map_or(true, |limit| started.elapsed() < limit)
}

fn run(config: &Path, duration: Option<&str>) -> Result<(), Box<dyn Error>> {
    let pump = load_config(config)?;
    pump.validate_transport()?;
    let limit = duration
        .map(|duration| parse_duration("duration", duration))
        .transpose()?;

    configure_loop_thread_priority(loop_thread_priority(), rt_enabled());
    let transport = transport::get_transport(&pump)?;
    let (stats, _) = pump_into(&pump, transport, pump.loop_period()?, deadline(limit))?;
    info!(
        written = stats.samples_written,
        empty_outs = stats.empty_outs,
        "Pump stopped."
    );
    Ok(())
}

fn simulate(config: &Path, duration: Option<&str>) -> Result<(), Box<dyn Error>> {
    let pump = load_config(config)?;
    let limit = parse_duration("duration", duration.unwrap_or("5s"))?;

    configure_loop_thread_priority(loop_thread_priority(), rt_enabled());
    let (stats, sim) = pump_into(
        &pump,
        I2sSimulator::realtime(),
        pump.loop_period()?,
        deadline(Some(limit)),
    )?;

    println!("Iterations:      {}", stats.iterations);
    println!("Samples written: {}", stats.samples_written);
    println!("Render calls:    {}", stats.renders);
    println!("Sink-full stops: {}", stats.sink_full_stops);
    println!("Buffer empties:  {}", stats.empty_outs);
    println!("Frames played:   {}", sim.played_frames());
    println!("Frames starved:  {}", sim.starved_frames());
    Ok(())
}

fn render(config: &Path, output: PathBuf, duration: &str) -> Result<(), Box<dyn Error>> {
    let pump = load_config(config)?;
    let length = parse_duration("duration", duration)?;
    let target = (length.as_secs_f64() * pump.sample_rate() as f64).round() as u64;

    let transport = WavTransport::new(&output).with_frame_limit(target);
    let (stats, wav) = pump_into(&pump, transport, Duration::ZERO, |stats| {
        stats.samples_written < target
    })?;
    info!(
        output = %output.display(),
        frames = wav.frames_written(),
        rendered = stats.samples_rendered,
        "Render complete."
    );
    Ok(())
}
