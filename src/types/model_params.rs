use crate::error::{Error, Result};

const DEFAULT_TEMPERATURE: f64 = 0.7;
const DEFAULT_MAX_TOKENS: u32 = 512;
const DEFAULT_TOP_P: f64 = 0.9;

/// Sampling parameters for a completion request.
///
/// Instances are immutable.  Anything other than the defaults goes through
/// [`ModelParamsBuilder`], which rejects out-of-range values at build time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelParams {
    temperature: f64,
    top_p: f64,
    max_tokens: u32,
    frequency_penalty: f64,
    presence_penalty: f64,
    stream: bool,
}

impl ModelParams {
    /// Starts a builder seeded with the defaults.
    pub fn builder() -> ModelParamsBuilder {
        ModelParamsBuilder::new()
    }

    /// Sampling temperature in `[0, 1]`.
    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    /// Nucleus sampling mass in `[0, 1]`.
    pub fn top_p(&self) -> f64 {
        self.top_p
    }

    /// Maximum tokens to generate.
    pub fn max_tokens(&self) -> u32 {
        self.max_tokens
    }

    /// Frequency penalty in `[-2, 2]`.
    pub fn frequency_penalty(&self) -> f64 {
        self.frequency_penalty
    }

    /// Presence penalty in `[-2, 2]`.
    pub fn presence_penalty(&self) -> f64 {
        self.presence_penalty
    }

    /// Whether the caller prefers streamed responses.
    pub fn stream(&self) -> bool {
        self.stream
    }

    /// Returns a builder seeded from these parameters.
    pub fn to_builder(&self) -> ModelParamsBuilder {
        ModelParamsBuilder { params: *self }
    }
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            temperature: DEFAULT_TEMPERATURE,
            top_p: DEFAULT_TOP_P,
            max_tokens: DEFAULT_MAX_TOKENS,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
            stream: false,
        }
    }
}

/// Validating builder for [`ModelParams`].
#[derive(Debug, Clone, Default)]
pub struct ModelParamsBuilder {
    params: ModelParams,
}

impl ModelParamsBuilder {
    /// Creates a builder seeded with the defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the sampling temperature.
    pub fn temperature(mut self, temperature: f64) -> Self {
        self.params.temperature = temperature;
        self
    }

    /// Sets the nucleus sampling mass.
    pub fn top_p(mut self, top_p: f64) -> Self {
        self.params.top_p = top_p;
        self
    }

    /// Sets the maximum tokens to generate.
    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.params.max_tokens = max_tokens;
        self
    }

    /// Sets the frequency penalty.
    pub fn frequency_penalty(mut self, penalty: f64) -> Self {
        self.params.frequency_penalty = penalty;
        self
    }

    /// Sets the presence penalty.
    pub fn presence_penalty(mut self, penalty: f64) -> Self {
        self.params.presence_penalty = penalty;
        self
    }

    /// Sets the stream preference.
    pub fn stream(mut self, stream: bool) -> Self {
        self.params.stream = stream;
        self
    }

    /// Validates and returns the parameters.
    pub fn build(self) -> Result<ModelParams> {
        let p = self.params;
        check_range("temperature", p.temperature, 0.0, 1.0)?;
        check_range("top_p", p.top_p, 0.0, 1.0)?;
        check_range("frequency_penalty", p.frequency_penalty, -2.0, 2.0)?;
        check_range("presence_penalty", p.presence_penalty, -2.0, 2.0)?;
        if p.max_tokens == 0 {
            return Err(Error::validation(
                "max_tokens must be greater than 0",
                Some("max_tokens".to_string()),
            ));
        }
        Ok(p)
    }
}

fn check_range(name: &str, value: f64, min: f64, max: f64) -> Result<()> {
    // NaN fails both comparisons, so it is rejected here too.
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(Error::validation(
            format!("{name} must be between {min:.1} and {max:.1}, got {value}"),
            Some(name.to_string()),
        ))
    }
}
