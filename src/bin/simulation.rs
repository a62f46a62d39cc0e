//! Production Line Simulation
//!
//! Generates synthetic line sensor messages for testing linewatch:
//! - A three-phase motor running pulse-synchronised machine cycles
//! - A temperature signal
//! - A three-axis vibration sensor
//! - A run-state signal that changes whenever the motor starts or stops
//!
//! Every `--spike-every` cycles the motor draws extra power and the
//! temperature and vibration readings jump, so each monitor has something
//! to flag.
//!
//! # Usage
//! ```bash
//! ./simulation --cycles 200 --seed 7 | ./linewatch --stdin
//! ```

use clap::Parser;
use rand::prelude::*;
use rand_distr::{Distribution, Normal};
use std::io::{self, Write};
use std::time::Duration;

use linewatch::types::{
    ElectricalData, ElectricalMessage, Message, PhaseData, SignalMessage, StateMessage,
    VibrationMessage,
};

// ============================================================================
// Line Constants
// ============================================================================

/// Phase voltage (V)
const PHASE_VOLTAGE: f64 = 230.0;
/// Motor power factor
const POWER_FACTOR: f64 = 0.85;
/// Steady-state phase current (A)
const BASE_CURRENT: f64 = 10.0;
/// Start-up current multiple on the first samples of a cycle
const INRUSH_FACTOR: f64 = 3.0;
/// Baseline process temperature (°C)
const BASE_TEMPERATURE: f64 = 60.0;
/// Baseline RMS acceleration per axis (g)
const BASE_VIBRATION: f64 = 0.3;
/// Load multiple applied during a spike cycle
const SPIKE_FACTOR: f64 = 1.8;

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "linewatch-simulation")]
#[command(about = "Synthetic production line data for linewatch testing")]
#[command(version)]
struct Args {
    /// Number of machine cycles to generate
    #[arg(short, long, default_value = "100")]
    cycles: u32,

    /// Samples per machine cycle
    #[arg(long, default_value = "20", value_parser = clap::value_parser!(u32).range(4..=10_000))]
    samples_per_cycle: u32,

    /// Simulated time between samples in milliseconds
    #[arg(long, default_value = "100")]
    interval_ms: u64,

    /// Time compression factor (1 = real-time, 0 = as fast as possible)
    #[arg(short, long, default_value = "0")]
    speed: u32,

    /// Inject a spike every N cycles (0 = never)
    #[arg(long, default_value = "10")]
    spike_every: u32,

    /// Stop the motor for a few samples every N cycles (0 = never)
    #[arg(long, default_value = "25")]
    stop_every: u32,

    /// Random seed for reproducibility
    #[arg(long)]
    seed: Option<u64>,

    /// Line name stamped on every message
    #[arg(long, default_value = "Line1")]
    line: String,

    /// Machine name stamped on every message
    #[arg(long, default_value = "Press1")]
    machine: String,

    /// Electrical device name
    #[arg(long, default_value = "motor")]
    device: String,

    /// Do not emit temperature messages
    #[arg(long)]
    no_signals: bool,

    /// Do not emit vibration messages
    #[arg(long)]
    no_vibration: bool,

    /// Suppress the mission log on stderr
    #[arg(short, long)]
    quiet: bool,
}

// ============================================================================
// Simulation State
// ============================================================================

struct SimulationState {
    rng: StdRng,
    timestamp_millis: u64,
    running: bool,
    messages_generated: u64,
    spike_cycles: u64,
    noise: Normal<f64>,
    temperature_noise: Normal<f64>,
    vibration_noise: Normal<f64>,
}

impl SimulationState {
    fn new(seed: Option<u64>, start_millis: u64) -> Result<Self, rand_distr::NormalError> {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            rng,
            timestamp_millis: start_millis,
            running: false,
            messages_generated: 0,
            spike_cycles: 0,
            noise: Normal::new(0.0, 0.02)?,
            temperature_noise: Normal::new(0.0, 0.5)?,
            vibration_noise: Normal::new(0.0, 0.01)?,
        })
    }

    /// Multiplicative noise around 1.0
    fn jitter(&mut self) -> f64 {
        1.0 + self.noise.sample(&mut self.rng)
    }

    fn electrical(&mut self, args: &Args, pulse: bool, load: f64, running: bool) -> Message {
        let mut phases: [PhaseData; 3] = Default::default();
        for phase in phases.iter_mut() {
            let current = if running { BASE_CURRENT * load * self.jitter() } else { 0.0 };
            let apparent = PHASE_VOLTAGE * current;
            phase.current = current;
            phase.voltage = PHASE_VOLTAGE * self.jitter();
            phase.power_factor = POWER_FACTOR;
            phase.apparent_power = apparent;
            phase.active_power = apparent * POWER_FACTOR;
            phase.reactive_power = apparent * (1.0 - POWER_FACTOR * POWER_FACTOR).sqrt();
        }
        let data = ElectricalData {
            active_power_total: phases.iter().map(|p| p.active_power).sum(),
            reactive_power_total: phases.iter().map(|p| p.reactive_power).sum(),
            apparent_power_total: phases.iter().map(|p| p.apparent_power).sum(),
            power_factor: POWER_FACTOR,
            power_quality_factor: 1.0,
            phases,
        };
        Message::Electrical(ElectricalMessage {
            line_name: args.line.clone(),
            machine_name: args.machine.clone(),
            device_name: args.device.clone(),
            device_state: running,
            synch_pulse: pulse,
            timestamp_millis: self.timestamp_millis,
            electrical_data: data,
        })
    }

    fn temperature(&mut self, args: &Args, spike: bool) -> Message {
        let offset = if spike { 8.0 } else { 0.0 };
        let value = BASE_TEMPERATURE + offset + self.temperature_noise.sample(&mut self.rng);
        Message::Signal(SignalMessage {
            line_name: args.line.clone(),
            machine_name: args.machine.clone(),
            signal_name: "temperature".to_string(),
            signal_value: value,
            timestamp_millis: self.timestamp_millis,
        })
    }

    fn vibration(&mut self, args: &Args, spike: bool) -> Message {
        let scale = if spike { 3.0 } else { 1.0 };
        let mut axis = || (BASE_VIBRATION * scale + self.vibration_noise.sample(&mut self.rng)).abs();
        let (x, y, z) = (axis(), axis(), axis());
        Message::Vibration(VibrationMessage {
            line_name: args.line.clone(),
            machine_name: args.machine.clone(),
            sensor_name: "vib1".to_string(),
            vib_accel_tot_rms_x: x,
            vib_accel_tot_rms_y: y,
            vib_accel_tot_rms_z: z,
            timestamp_millis: self.timestamp_millis,
        })
    }

    fn run_state(&self, args: &Args) -> Message {
        Message::State(StateMessage {
            line_name: args.line.clone(),
            machine_name: args.machine.clone(),
            state_name: "run_state".to_string(),
            state_value: i64::from(self.running),
            timestamp_millis: self.timestamp_millis,
        })
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn log_mission(timestamp_millis: u64, message: &str, quiet: bool) {
    if !quiet {
        let time = chrono::DateTime::from_timestamp_millis(timestamp_millis as i64)
            .map(|t| t.format("%H:%M:%S%.3f").to_string())
            .unwrap_or_else(|| timestamp_millis.to_string());
        eprintln!("[{}] {}", time, message);
    }
}

fn emit(out: &mut impl Write, state: &mut SimulationState, msg: &Message) -> io::Result<()> {
    serde_json::to_writer(&mut *out, msg)?;
    writeln!(out)?;
    state.messages_generated += 1;
    Ok(())
}

// ============================================================================
// Main Entry Point
// ============================================================================

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let start_millis = chrono::Utc::now().timestamp_millis().max(0) as u64;
    let mut state = SimulationState::new(args.seed, start_millis)?;
    let pacing = (args.speed > 0)
        .then(|| Duration::from_millis(args.interval_ms) / args.speed);

    log_mission(start_millis, &"=".repeat(70), args.quiet);
    log_mission(start_millis, "PRODUCTION LINE SIMULATION", args.quiet);
    log_mission(start_millis, &"=".repeat(70), args.quiet);
    log_mission(
        start_millis,
        &format!(
            "  {}/{}: {} cycles x {} samples, {} ms apart",
            args.line, args.machine, args.cycles, args.samples_per_cycle, args.interval_ms
        ),
        args.quiet,
    );
    log_mission(
        start_millis,
        &format!("  Spike every {} cycles, stop every {} cycles", args.spike_every, args.stop_every),
        args.quiet,
    );
    if let Some(seed) = args.seed {
        log_mission(start_millis, &format!("  Random seed: {}", seed), args.quiet);
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();

    for cycle in 0..args.cycles {
        let spike = args.spike_every > 0 && cycle > 0 && cycle % args.spike_every == 0;
        if spike {
            state.spike_cycles += 1;
            log_mission(state.timestamp_millis, &format!(">>> Cycle {}: SPIKE", cycle), args.quiet);
        }
        let load = if spike { SPIKE_FACTOR } else { 1.0 };

        if !state.running {
            state.running = true;
            let msg = state.run_state(&args);
            emit(&mut out, &mut state, &msg)?;
        }

        for sample in 0..args.samples_per_cycle {
            // Pulse high for the first two samples, start-up current on the first
            let pulse = sample < 2;
            let inrush = if sample == 1 { INRUSH_FACTOR } else { 1.0 };
            let msg = state.electrical(&args, pulse, load * inrush, true);
            emit(&mut out, &mut state, &msg)?;

            if !args.no_signals {
                let msg = state.temperature(&args, spike);
                emit(&mut out, &mut state, &msg)?;
            }
            if !args.no_vibration {
                let msg = state.vibration(&args, spike);
                emit(&mut out, &mut state, &msg)?;
            }

            state.timestamp_millis += args.interval_ms;
            if let Some(delay) = pacing {
                out.flush()?;
                std::thread::sleep(delay);
            }
        }

        if args.stop_every > 0 && (cycle + 1) % args.stop_every == 0 {
            log_mission(state.timestamp_millis, &format!("Cycle {}: motor stopped", cycle), args.quiet);
            state.running = false;
            let msg = state.run_state(&args);
            emit(&mut out, &mut state, &msg)?;
            for _ in 0..3 {
                let msg = state.electrical(&args, false, 0.0, false);
                emit(&mut out, &mut state, &msg)?;
                state.timestamp_millis += args.interval_ms;
            }
        }
    }

    // Closing pulse so the last full cycle is reported
    let msg = state.electrical(&args, true, 1.0, true);
    emit(&mut out, &mut state, &msg)?;
    out.flush()?;

    log_mission(state.timestamp_millis, &"=".repeat(70), args.quiet);
    log_mission(
        state.timestamp_millis,
        &format!(
            "SIMULATION COMPLETE: {} messages, {} spike cycles",
            state.messages_generated, state.spike_cycles
        ),
        args.quiet,
    );
    Ok(())
}
