use crate::session::{EstimatorConfig, TrackingMode};

#[derive(Clone, Debug, clap::Parser)]
pub struct Config {
    /// features tracked at once, split among the staggered sets
    #[clap(long, default_value = "1000")]
    pub features: usize,

    #[clap(long, default_value = "10")]
    pub future_steps: usize,

    #[clap(long, default_value = "10")]
    pub non_correction_steps: usize,

    /// enable drift correction (overlapping mode only)
    #[clap(long)]
    pub correction: bool,

    #[clap(long, value_enum, default_value = "overlapping")]
    pub mode: TrackingMode,

    #[clap(long, default_value = "0")]
    pub seed: u64,
}

impl Default for Config {
    fn default() -> Self {
        let defaults = EstimatorConfig::default();
        Self {
            features: defaults.feature_count,
            future_steps: defaults.future_steps,
            non_correction_steps: defaults.non_correction_interval,
            correction: defaults.use_correction,
            mode: defaults.mode,
            seed: defaults.seed,
        }
    }
}

impl From<&Config> for EstimatorConfig {
    fn from(config: &Config) -> Self {
        EstimatorConfig {
            mode: config.mode,
            feature_count: config.features,
            future_steps: config.future_steps,
            use_correction: config.correction,
            non_correction_interval: config.non_correction_steps,
            seed: config.seed,
        }
    }
}
