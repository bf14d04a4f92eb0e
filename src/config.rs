//! Pipeline configuration

use crate::error::Error;

/// What the segmenter does when there are fewer distinct customer profiles
/// than requested segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SmallPopulationPolicy {
    /// Cluster into as many segments as there are distinct profiles and leave
    /// the remaining segment labels empty.
    #[default]
    Degrade,
    /// Fail with [`Error::TooFewCustomers`].
    Reject,
}

/// Parameters shared by every pipeline stage.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Number of segments (K)
    pub n_segments: usize,
    /// Seed for centroid initialisation
    pub seed: u64,
    /// Iteration cap for a single K-Means run
    pub max_iterations: u64,
    /// Convergence tolerance on centroid movement
    pub tolerance: f64,
    /// Number of K-Means restarts; the run with the lowest inertia wins
    pub n_runs: usize,
    /// Length of each per-segment product ranking
    pub top_n: usize,
    pub small_population: SmallPopulationPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            n_segments: 4,
            seed: 42,
            max_iterations: 300,
            tolerance: 1e-4,
            n_runs: 10,
            top_n: 10,
            small_population: SmallPopulationPolicy::Degrade,
        }
    }
}

impl PipelineConfig {
    /// Check parameter ranges before any computation starts.
    pub fn validate(&self) -> crate::Result<()> {
        if self.n_segments == 0 {
            return Err(Error::InvalidConfig(
                "number of segments must be at least 1".to_string(),
            ));
        }
        if self.max_iterations == 0 {
            return Err(Error::InvalidConfig(
                "max iterations must be at least 1".to_string(),
            ));
        }
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "tolerance must be a positive number, got {}",
                self.tolerance
            )));
        }
        if self.n_runs == 0 {
            return Err(Error::InvalidConfig("runs must be at least 1".to_string()));
        }
        if self.top_n == 0 {
            return Err(Error::InvalidConfig("top-n must be at least 1".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.n_segments, 4);
        assert_eq!(config.top_n, 10);
        assert_eq!(config.small_population, SmallPopulationPolicy::Degrade);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let zero_k = PipelineConfig {
            n_segments: 0,
            ..Default::default()
        };
        assert!(matches!(zero_k.validate(), Err(Error::InvalidConfig(_))));

        let bad_tolerance = PipelineConfig {
            tolerance: 0.0,
            ..Default::default()
        };
        assert!(bad_tolerance.validate().is_err());

        let nan_tolerance = PipelineConfig {
            tolerance: f64::NAN,
            ..Default::default()
        };
        assert!(nan_tolerance.validate().is_err());

        let zero_top = PipelineConfig {
            top_n: 0,
            ..Default::default()
        };
        assert!(zero_top.validate().is_err());
    }
}
