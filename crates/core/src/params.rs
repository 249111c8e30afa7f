use serde::{Deserialize, Serialize};

/// Lowest accepted token limit
pub const MIN_MAX_TOKENS: u32 = 10;
/// Highest accepted token limit
pub const MAX_MAX_TOKENS: u32 = 4096;
/// Lowest sampling temperature
pub const MIN_TEMPERATURE: f32 = 0.0;
/// Highest sampling temperature
pub const MAX_TEMPERATURE: f32 = 2.0;
/// Upper bound of the integer temperature slider (maps to `MAX_TEMPERATURE`)
pub const TEMPERATURE_SLIDER_MAX: u32 = 200;

pub const DEFAULT_MAX_TOKENS: u32 = 200;
pub const DEFAULT_TEMPERATURE_SLIDER: u32 = 10;

/// Per-session tunables, copied into each request at dispatch
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawParameters")]
pub struct RequestParameters {
    max_tokens: u32,
    temperature: f32,
}

/// Unchecked wire form; always converted through [`RequestParameters::new`]
#[derive(Deserialize)]
struct RawParameters {
    max_tokens: i64,
    temperature: f32,
}

impl From<RawParameters> for RequestParameters {
    fn from(raw: RawParameters) -> Self {
        Self::new(raw.max_tokens, raw.temperature)
    }
}

impl RequestParameters {
    /// Build parameters, clamping both values into their accepted ranges
    pub fn new(max_tokens: i64, temperature: f32) -> Self {
        Self { max_tokens: clamp_max_tokens(max_tokens), temperature: clamp_temperature(temperature) }
    }

    /// Build parameters from slider positions (`temperature_slider` in 0..=200)
    pub fn from_sliders(max_tokens: i64, temperature_slider: i64) -> Self {
        Self { max_tokens: clamp_max_tokens(max_tokens), temperature: temperature_from_slider(temperature_slider) }
    }

    pub fn max_tokens(&self) -> u32 {
        self.max_tokens
    }

    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    pub fn with_max_tokens(self, max_tokens: i64) -> Self {
        Self { max_tokens: clamp_max_tokens(max_tokens), ..self }
    }

    pub fn with_temperature(self, temperature: f32) -> Self {
        Self { temperature: clamp_temperature(temperature), ..self }
    }

    /// Slider position matching the current temperature
    pub fn temperature_slider(&self) -> u32 {
        (self.temperature * 100.0).round() as u32
    }
}

impl Default for RequestParameters {
    fn default() -> Self {
        Self::from_sliders(DEFAULT_MAX_TOKENS as i64, DEFAULT_TEMPERATURE_SLIDER as i64)
    }
}

fn clamp_max_tokens(value: i64) -> u32 {
    value.clamp(MIN_MAX_TOKENS as i64, MAX_MAX_TOKENS as i64) as u32
}

fn clamp_temperature(value: f32) -> f32 {
    if value.is_nan() {
        return MIN_TEMPERATURE;
    }
    let clamped = value.clamp(MIN_TEMPERATURE, MAX_TEMPERATURE);
    (clamped * 100.0).round() / 100.0
}

/// Map an integer slider position to a temperature with two decimals
pub fn temperature_from_slider(position: i64) -> f32 {
    let position = position.clamp(0, TEMPERATURE_SLIDER_MAX as i64);
    clamp_temperature(position as f32 / 100.0)
}
