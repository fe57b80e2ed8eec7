//! Test signals fed into an engine's stereo input.

use clap::ValueEnum;

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum StimulusKind {
    /// Silence.
    None,
    /// One unit sample at the very start.
    Impulse,
    /// Unit samples repeating at `--pulse-hz`.
    Pulse,
    /// A steady level switched on and off at `--pulse-hz`, like a breath.
    Airflow,
}

#[derive(Copy, Clone, Debug)]
pub struct Stimulus {
    kind: StimulusKind,
    level: f32,
    period: u64,
}

impl Stimulus {
    pub fn new(kind: StimulusKind, level: f32, pulse_hz: f32, sample_rate: f32) -> Self {
        let period = if pulse_hz > 0.0 { (sample_rate / pulse_hz).round().max(2.0) as u64 } else { u64::MAX };
        Self { kind, level, period }
    }

    pub fn sample(&self, frame: u64) -> [f32; 2] {
        let x = match self.kind {
            StimulusKind::None => 0.0,
            StimulusKind::Impulse => {
                if frame == 0 { self.level } else { 0.0 }
            }
            StimulusKind::Pulse => {
                if frame % self.period == 0 { self.level } else { 0.0 }
            }
            StimulusKind::Airflow => {
                if frame % self.period < self.period / 2 { self.level } else { 0.0 }
            }
        };
        [x, x]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pulse_train_spacing() {
        let s = Stimulus::new(StimulusKind::Pulse, 0.5, 1000.0, 48_000.0);
        let hits: Vec<u64> = (0..200).filter(|&n| s.sample(n)[0] != 0.0).collect();
        assert_eq!(hits, [0, 48, 96, 144, 192]);
    }

    #[test]
    fn airflow_is_half_duty() {
        let s = Stimulus::new(StimulusKind::Airflow, 1.0, 1.0, 100.0);
        let on = (0..100).filter(|&n| s.sample(n)[0] > 0.0).count();
        assert_eq!(on, 50);
    }

    #[test]
    fn impulse_only_once() {
        let s = Stimulus::new(StimulusKind::Impulse, 1.0, 0.0, 44_100.0);
        assert_eq!(s.sample(0), [1.0, 1.0]);
        assert_eq!(s.sample(1), [0.0, 0.0]);
    }
}
