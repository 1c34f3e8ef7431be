use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};

/// Inclusive upper bound for `warmup_iterations`.
pub const MAX_WARMUP_ITERATIONS: u32 = 100_000;
/// Inclusive bounds for `measured_iterations`.
pub const MIN_MEASURED_ITERATIONS: u32 = 1;
pub const MAX_MEASURED_ITERATIONS: u32 = 1_000_000;

/// Which build of the benchmark script to exercise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    Baseline,
    Optimized,
    Debug,
}

impl Variant {
    pub fn as_str(&self) -> &'static str {
        match self {
            Variant::Baseline => "baseline",
            Variant::Optimized => "optimized",
            Variant::Debug => "debug",
        }
    }
}

impl std::fmt::Display for Variant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tunables accepted alongside a submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunOptions {
    /// Enable runtime diagnostic flags on the script invocation.
    pub trace: bool,
    /// Capture a CPU profile alongside the run.
    pub profile: bool,
    pub warmup_iterations: u32,
    pub measured_iterations: u32,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            trace: false,
            profile: false,
            warmup_iterations: 0,
            measured_iterations: MIN_MEASURED_ITERATIONS,
        }
    }
}

/// Immutable, caller-supplied description of a benchmark run.
///
/// Whether `script` names a known catalog entry is checked at admission, not
/// here; the model only enforces the numeric bounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRequest {
    pub script: String,
    pub variant: Variant,
    #[serde(default)]
    pub options: RunOptions,
}

impl RunRequest {
    pub fn new(script: impl Into<String>, variant: Variant) -> Self {
        Self {
            script: script.into(),
            variant,
            options: RunOptions::default(),
        }
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    /// Validate the request's own fields against the recognized-options table.
    pub fn validate(&self) -> Result<()> {
        if self.script.is_empty() {
            return Err(ModelError::invalid("script", "must not be empty"));
        }
        if self.options.warmup_iterations > MAX_WARMUP_ITERATIONS {
            return Err(ModelError::invalid(
                "warmup_iterations",
                format!(
                    "{} exceeds maximum {}",
                    self.options.warmup_iterations, MAX_WARMUP_ITERATIONS
                ),
            ));
        }
        if self.options.measured_iterations < MIN_MEASURED_ITERATIONS {
            return Err(ModelError::invalid(
                "measured_iterations",
                format!("must be at least {MIN_MEASURED_ITERATIONS}"),
            ));
        }
        if self.options.measured_iterations > MAX_MEASURED_ITERATIONS {
            return Err(ModelError::invalid(
                "measured_iterations",
                format!(
                    "{} exceeds maximum {}",
                    self.options.measured_iterations, MAX_MEASURED_ITERATIONS
                ),
            ));
        }
        Ok(())
    }
}
