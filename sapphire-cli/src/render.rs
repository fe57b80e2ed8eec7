//! Offline rendering to WAV.
//!
//! Uses `hound` so engines can be auditioned without an audio device.

use std::error::Error;
use std::path::Path;

use hound::{SampleFormat, WavSpec, WavWriter};
use sapphire_engine::{Host, StereoEngine};

use crate::stimulus::Stimulus;

const BLOCK_FRAMES: usize = 512;

/// WAV output spec: 32-bit float, stereo.
fn wav_spec(sample_rate: u32) -> WavSpec {
    WavSpec { channels: 2, sample_rate, bits_per_sample: 32, sample_format: SampleFormat::Float }
}

/// Drive `host` for `seconds` and write the stereo output to `path`.
///
/// Returns the peak absolute sample written.
pub fn render_to_wav<E: StereoEngine>(
    host: &mut Host<E>,
    stimulus: Stimulus,
    seconds: f32,
    path: &Path,
) -> Result<f32, Box<dyn Error>> {
    let sample_rate = host.sample_rate().round() as u32;
    let total = (seconds.max(0.0) * host.sample_rate()).round() as usize;
    let mut writer = WavWriter::create(path, wav_spec(sample_rate))?;
    let mut block = vec![0.0_f32; 2 * BLOCK_FRAMES];
    let mut peak = 0.0_f32;

    let mut remaining = total;
    while remaining > 0 {
        let frames = remaining.min(BLOCK_FRAMES);
        let buf = &mut block[..2 * frames];
        host.render_interleaved(buf, 2, |n| stimulus.sample(n));
        for &s in buf.iter() {
            peak = peak.max(s.abs());
            writer.write_sample(s)?;
        }
        remaining -= frames;
    }
    writer.finalize()?;

    ftlog::info!("wrote {total} frames to {path:?}, peak {peak:.3}, {} crash(es)", host.crash_count());
    Ok(peak)
}
