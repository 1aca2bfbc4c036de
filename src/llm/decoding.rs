use serde::Serialize;

pub const MAX_LENGTH: usize = 512;
pub const DEFAULT_STRENGTH: u8 = 50;

const MIN_TEMPERATURE: f64 = 0.7;
const TEMPERATURE_SPAN: f64 = 0.8;
const SAMPLING_THRESHOLD: u8 = 30;
const WIDE_BEAM_LIMIT: u8 = 40;

/// User-facing diversity knob, always within 0..=100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Strength(u8);

impl Strength {
    pub const MIN: Strength = Strength(0);
    pub const MAX: Strength = Strength(100);

    /// Clamps any integer into the valid range.
    pub fn clamped(value: i64) -> Self {
        Self(value.clamp(0, 100) as u8)
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl Default for Strength {
    fn default() -> Self {
        Self(DEFAULT_STRENGTH)
    }
}

impl From<u8> for Strength {
    fn from(value: u8) -> Self {
        Self::clamped(value as i64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DecodingConfig {
    pub temperature: f64,
    pub num_beams: usize,
    pub do_sample: bool,
    pub max_length: usize,
    pub early_stopping: bool,
    pub num_return_sequences: usize,
}

impl DecodingConfig {
    /// Maps a strength onto temperature, beam width and sampling.
    ///
    /// Sampling switches on above 30 while the wide beam is kept below 40,
    /// so strengths 31..=39 sample across four beams.
    pub fn derive(strength: Strength) -> Self {
        let strength = strength.value().min(Strength::MAX.value());

        let temperature = MIN_TEMPERATURE + (strength as f64 / 100.0) * TEMPERATURE_SPAN;
        let num_beams = if strength < WIDE_BEAM_LIMIT { 4 } else { 2 };
        let do_sample = strength > SAMPLING_THRESHOLD;

        Self {
            temperature,
            num_beams,
            do_sample,
            max_length: MAX_LENGTH,
            early_stopping: true,
            num_return_sequences: 1,
        }
    }
}
