//! Sapphire CLI: real-time player and offline renderer for the physics engines.

mod render;
mod stimulus;

use std::collections::VecDeque;
use std::error::Error;
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::{Parser, Subcommand};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use ftlog::{appender::FileAppender, LevelFilter, LoggerGuard};
use sapphire_engine::{EngineKind, Host, StereoEngine};

use crate::stimulus::{Stimulus, StimulusKind};

type BoxedEngine = Box<dyn StereoEngine + Send>;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Log level: off, error, warn, info, debug, trace.
    #[arg(long, default_value = "info")]
    log_level: LevelFilter,

    /// Write logs to this file instead of stderr.
    #[arg(long)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args, Debug, Clone)]
struct EngineArgs {
    /// elastika, nucleus or tubeunit.
    #[arg(short('e'), long, default_value = "elastika")]
    engine: EngineKind,

    /// Initial parameters as `name=value`, repeatable.
    #[arg(short('p'), long("param"), value_parser = parse_param)]
    params: Vec<(String, f32)>,

    /// Input signal fed to the engine.
    #[arg(long, value_enum, default_value = "impulse")]
    stimulus: StimulusKind,

    /// Stimulus amplitude.
    #[arg(long, default_value_t = 1.0)]
    level: f32,

    /// Repetition rate of the pulse and airflow stimuli.
    #[arg(long, default_value_t = 2.0)]
    pulse_hz: f32,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List output devices.
    Devices,

    /// Play an engine through an output device. Reads `<param> <value>` lines from stdin.
    Play {
        #[command(flatten)]
        engine: EngineArgs,

        #[arg(long)]
        device: Option<String>,

        #[arg(long)]
        sample_rate: Option<u32>,

        #[arg(long)]
        channels: Option<u16>,

        /// Stop after this many seconds instead of waiting for stdin to close.
        #[arg(long)]
        duration: Option<u64>,

        /// Output gain applied after the engine.
        #[arg(long, default_value_t = 0.5)]
        gain: f32,
    },

    /// Render an engine to a 32-bit float stereo WAV file.
    Render {
        #[command(flatten)]
        engine: EngineArgs,

        #[arg(short('o'), long)]
        out: PathBuf,

        #[arg(long, default_value_t = 48_000)]
        sample_rate: u32,

        #[arg(short('s'), long, default_value_t = 5.0)]
        seconds: f32,
    },
}

fn parse_param(s: &str) -> Result<(String, f32), String> {
    let (name, value) = s.split_once('=').ok_or_else(|| format!("expected name=value, got {s:?}"))?;
    let value = value.trim().parse::<f32>().map_err(|e| format!("{name}: {e}"))?;
    Ok((name.trim().to_string(), value))
}

/// Configures the logger. `None` writes to stderr.
fn configure_logger(level: LevelFilter, file: Option<&PathBuf>) -> Result<LoggerGuard, Box<dyn Error>> {
    let builder = ftlog::Builder::new().max_log_level(level);
    let builder = match file {
        Some(path) => builder.root(FileAppender::new(path)),
        None => builder.root(std::io::stderr()),
    };
    Ok(builder.try_init()?)
}

/// Build the engine, apply `--param`s and wrap it in a host.
fn make_host(args: &EngineArgs, sample_rate: f32) -> Result<Host<BoxedEngine>, Box<dyn Error>> {
    let mut host = Host::new(args.engine.build(sample_rate)?, sample_rate)?;
    for (name, value) in &args.params {
        if !host.set_param(name, *value) {
            let known = host.engine().param_names().join(", ");
            return Err(format!("{} has no parameter {name:?} (known: {known})", args.engine.name()).into());
        }
    }
    Ok(host)
}

// ---------------------------------- Live control ---------------------------------

/// One change handed from the stdin thread to the audio callback.
#[derive(Copy, Clone, Debug)]
enum Control {
    Param(&'static str, f32),
    Power(bool),
    Reset,
}

type ControlQueue = Arc<Mutex<VecDeque<Control>>>;

/// Parse one stdin line against the engine's parameter table.
fn parse_control(line: &str, names: &'static [&'static str]) -> Result<Option<Control>, String> {
    let mut words = line.split_whitespace();
    let Some(head) = words.next() else { return Ok(None) };
    match head {
        "reset" => return Ok(Some(Control::Reset)),
        "power" => {
            return match words.next() {
                Some("on") => Ok(Some(Control::Power(true))),
                Some("off") => Ok(Some(Control::Power(false))),
                other => Err(format!("power expects on/off, got {other:?}")),
            }
        }
        _ => {}
    }
    let name = names
        .iter()
        .copied()
        .find(|n| *n == head)
        .ok_or_else(|| format!("unknown parameter {head:?} (known: {})", names.join(", ")))?;
    let value = words
        .next()
        .ok_or_else(|| format!("{name}: missing value"))?
        .parse::<f32>()
        .map_err(|e| format!("{name}: {e}"))?;
    Ok(Some(Control::Param(name, value)))
}

fn apply_control(host: &mut Host<BoxedEngine>, control: Control) {
    match control {
        Control::Param(name, value) => {
            host.set_param(name, value);
        }
        Control::Power(on) => host.set_power(on),
        Control::Reset => host.reset(),
    }
}

/// Feed stdin lines into the queue until EOF or `quit`.
fn read_controls(queue: &ControlQueue, names: &'static [&'static str]) -> Result<(), Box<dyn Error>> {
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim() == "quit" {
            break;
        }
        match parse_control(&line, names) {
            Ok(Some(control)) => {
                ftlog::info!("control: {control:?}");
                if let Ok(mut q) = queue.lock() {
                    q.push_back(control);
                }
            }
            Ok(None) => {}
            Err(e) => ftlog::warn!("{e}"),
        }
    }
    Ok(())
}

// ----------------------------------- Devices -------------------------------------

fn list_output_devices() -> Result<(), Box<dyn Error>> {
    let host = cpal::default_host();
    println!("Available output devices:");
    for dev in host.output_devices()? {
        println!("- {}", dev.name()?);
    }
    Ok(())
}

fn pick_device(name: Option<&str>) -> Result<cpal::Device, Box<dyn Error>> {
    let host = cpal::default_host();
    if let Some(name) = name {
        for d in host.output_devices()? {
            if d.name()? == name {
                return Ok(d);
            }
        }
        return Err(format!("requested device not found: {name}").into());
    }
    host.default_output_device().ok_or_else(|| "no default output device".into())
}

fn choose_config(
    device: &cpal::Device,
    req_sr: Option<u32>,
    req_ch: Option<u16>,
) -> Result<cpal::SupportedStreamConfig, Box<dyn Error>> {
    // If nothing requested, default is already concrete.
    if req_sr.is_none() && req_ch.is_none() {
        return Ok(device.default_output_config()?);
    }

    // Pick a SupportedStreamConfigRange first.
    let mut best: Option<(u64, cpal::SupportedStreamConfigRange)> = None;
    for range in device.supported_output_configs()? {
        let ch = range.channels();
        let sr_min = range.min_sample_rate().0;
        let sr_max = range.max_sample_rate().0;

        let ch_pen = match req_ch {
            Some(c) => u64::from(ch.abs_diff(c)),
            None => 0,
        };
        let sr_pen = match req_sr {
            Some(sr) if (sr_min..=sr_max).contains(&sr) => 0,
            Some(sr) => u64::from(sr_min.abs_diff(sr).min(sr_max.abs_diff(sr))),
            None => 0,
        };

        let score = sr_pen.saturating_mul(1000) + ch_pen;
        if best.as_ref().map_or(true, |(s, _)| score < *s) {
            best = Some((score, range));
        }
    }

    let (_, range) = best.ok_or("no supported output configs")?;

    // Choose a concrete sample rate and convert the range into a concrete config.
    let pick_sr = match req_sr {
        Some(sr) => cpal::SampleRate(sr.clamp(range.min_sample_rate().0, range.max_sample_rate().0)),
        None => range.max_sample_rate(),
    };

    Ok(range.with_sample_rate(pick_sr))
}

fn build_stream<T>(
    device: &cpal::Device,
    cfg: &cpal::StreamConfig,
    mut host: Host<BoxedEngine>,
    stimulus: Stimulus,
    queue: ControlQueue,
    gain: f32,
) -> Result<cpal::Stream, Box<dyn Error>>
where
    T: cpal::Sample + cpal::FromSample<f32> + cpal::SizedSample + Send + 'static,
{
    let sr = cfg.sample_rate.0 as f32;
    let channels = usize::from(cfg.channels);

    // ~1 second meter at the stream rate
    let meter_interval = cfg.sample_rate.0.max(1) as usize;
    let mut meter_count: usize = 0;
    let mut meter_peak: f32 = 0.0;
    let mut last_crashes = 0;

    let err_fn = |e: cpal::StreamError| ftlog::error!("stream error: {e}");

    let stream = device.build_output_stream(
        cfg,
        move |output: &mut [T], _| {
            // never wait on the control thread
            if let Ok(mut q) = queue.try_lock() {
                while let Some(control) = q.pop_front() {
                    apply_control(&mut host, control);
                }
            }

            for frame in output.chunks_mut(channels) {
                let input = stimulus.sample(host.frames());
                let [l, r] = host.next_frame(sr, input);
                let l = (gain * l).clamp(-1.0, 1.0);
                let r = (gain * r).clamp(-1.0, 1.0);

                match frame {
                    [mono] => *mono = T::from_sample(0.5 * (l + r)),
                    [left, right, rest @ ..] => {
                        *left = T::from_sample(l);
                        *right = T::from_sample(r);
                        for ch in rest.iter_mut() {
                            *ch = T::from_sample(0.0);
                        }
                    }
                    [] => {}
                }

                meter_peak = meter_peak.max(l.abs()).max(r.abs());
                meter_count += 1;
                if meter_count >= meter_interval {
                    ftlog::debug!(
                        "peak ~ {:.3}, agc distortion {:.3}",
                        meter_peak,
                        host.engine().agc_distortion()
                    );
                    meter_peak = 0.0;
                    meter_count = 0;
                }
            }

            if host.crash_count() != last_crashes {
                last_crashes = host.crash_count();
                ftlog::warn!("engine recovered from a crash ({last_crashes} so far)");
            }
        },
        err_fn,
        None,
    )?;

    Ok(stream)
}

fn play(
    engine: &EngineArgs,
    device: Option<&str>,
    sample_rate: Option<u32>,
    channels: Option<u16>,
    duration: Option<u64>,
    gain: f32,
) -> Result<(), Box<dyn Error>> {
    let device = pick_device(device)?;
    let sup_cfg = choose_config(&device, sample_rate, channels)?;
    let sample_format = sup_cfg.sample_format();
    let mut cfg = sup_cfg.config();

    if let Some(sr) = sample_rate {
        cfg.sample_rate = cpal::SampleRate(sr);
    }
    if let Some(ch) = channels {
        cfg.channels = ch;
    }

    let sr = cfg.sample_rate.0 as f32;
    let host = make_host(engine, sr)?;
    let names = host.engine().param_names();
    let stimulus = Stimulus::new(engine.stimulus, engine.level, engine.pulse_hz, sr);
    let queue: ControlQueue = Arc::new(Mutex::new(VecDeque::new()));

    ftlog::info!("device: {}", device.name()?);
    ftlog::info!("stream config: {cfg:?} (sample_format: {sample_format:?})");
    ftlog::info!("engine: {} | stimulus: {:?} | gain: {gain:.2}", engine.engine.name(), engine.stimulus);
    ftlog::info!("parameters: {}", names.join(", "));

    let stream = match sample_format {
        cpal::SampleFormat::F32 => build_stream::<f32>(&device, &cfg, host, stimulus, queue.clone(), gain)?,
        cpal::SampleFormat::I16 => build_stream::<i16>(&device, &cfg, host, stimulus, queue.clone(), gain)?,
        cpal::SampleFormat::U16 => build_stream::<u16>(&device, &cfg, host, stimulus, queue.clone(), gain)?,
        other => return Err(format!("unsupported device sample format: {other:?}").into()),
    };

    stream.play()?;

    match duration {
        Some(d) => {
            ftlog::info!("auto-stop after {d} seconds");
            std::thread::sleep(Duration::from_secs(d));
        }
        None => {
            println!("Type `<param> <value>`, `power on|off`, `reset` or `quit`.");
            read_controls(&queue, names)?;
        }
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    let _guard = configure_logger(args.log_level, args.log_file.as_ref())?;

    match &args.command {
        Command::Devices => list_output_devices(),
        Command::Play { engine, device, sample_rate, channels, duration, gain } => {
            play(engine, device.as_deref(), *sample_rate, *channels, *duration, *gain)
        }
        Command::Render { engine, out, sample_rate, seconds } => {
            let sr = *sample_rate as f32;
            let mut host = make_host(engine, sr)?;
            let stimulus = Stimulus::new(engine.stimulus, engine.level, engine.pulse_hz, sr);
            ftlog::info!("rendering {seconds} s of {} to {out:?}", engine.engine.name());
            render::render_to_wav(&mut host, stimulus, *seconds, out)?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NAMES: &[&str] = &["friction", "gain"];

    #[test]
    fn controls_parse() {
        assert!(matches!(parse_control("gain 1.5", NAMES), Ok(Some(Control::Param("gain", v))) if v == 1.5));
        assert!(matches!(parse_control("power off", NAMES), Ok(Some(Control::Power(false)))));
        assert!(matches!(parse_control("   ", NAMES), Ok(None)));
        assert!(parse_control("warp 1", NAMES).is_err());
        assert!(parse_control("gain loud", NAMES).is_err());
    }

    #[test]
    fn params_parse() {
        assert_eq!(parse_param("decay=0.7").unwrap(), ("decay".to_string(), 0.7));
        assert!(parse_param("decay").is_err());
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }
}
