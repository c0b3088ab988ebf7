//! Engine configuration.

use std::f32::consts::FRAC_PI_2;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{MapperError, Result};
use crate::mapping::policy::UpdateCondition;

/// Full mapper configuration, loadable from YAML.
///
/// Every field has a default, so a partial file (or none at all) is
/// valid. Paths left unset mean "use library defaults": an empty filter
/// chain, or the default ICP configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MapperConfig {
    /// ICP configuration file; unset uses defaults.
    pub icp_config: Option<PathBuf>,
    /// Sensor-frame input filter chain file.
    pub input_filters_config: Option<PathBuf>,
    /// World-frame input filter chain file.
    pub input_filters_world_config: Option<PathBuf>,
    /// Map post-filter chain file.
    pub map_post_filters_config: Option<PathBuf>,

    /// One of "overlap", "delay", "distance".
    pub map_update_condition: String,
    /// Overlap below which the map is rebuilt, in [0, 1].
    pub map_update_overlap: f32,
    /// Seconds between rebuilds for the "delay" condition.
    pub map_update_delay: f32,
    /// Meters of travel between rebuilds for the "distance" condition.
    pub map_update_distance: f32,

    /// Minimum distance to the nearest map point for an input point to be
    /// added to the map.
    pub min_dist_new_point: f32,
    /// Sensor range; the ICP reference and novelty search are cropped to
    /// this radius around the sensor.
    pub sensor_max_range: f32,

    /// Initial dynamic probability of newly added points, in [0, 1].
    pub prior_dynamic: f32,
    /// Probability above which a point is pinned as dynamic, in [0, 1].
    pub threshold_dynamic: f32,
    /// Beam half-angle in radians, in [0, π/2].
    pub beam_half_angle: f32,
    /// Relative radial tolerance of the dynamic update.
    pub epsilon_a: f32,
    /// Absolute radial tolerance of the dynamic update, meters.
    pub epsilon_d: f32,
    /// Bayesian mixing weight for static evidence, in [0, 1].
    pub alpha: f32,
    /// Bayesian mixing weight for dynamic evidence, in [0, 1].
    pub beta: f32,

    /// 3D clouds when true, 2D otherwise.
    pub is_3d: bool,
    /// Spawn map builds on a worker thread instead of blocking the caller.
    pub is_online: bool,
    /// Maintain the per-point dynamic probability descriptor.
    pub compute_prob_dynamic: bool,
    /// Master switch: when false the map is never updated.
    pub is_mapping: bool,
}

impl Default for MapperConfig {
    fn default() -> Self {
        Self {
            icp_config: None,
            input_filters_config: None,
            input_filters_world_config: None,
            map_post_filters_config: None,
            map_update_condition: "overlap".to_string(),
            map_update_overlap: 0.9,
            map_update_delay: 1.0,
            map_update_distance: 0.5,
            min_dist_new_point: 0.03,
            sensor_max_range: 80.0,
            prior_dynamic: 0.6,
            threshold_dynamic: 0.9,
            beam_half_angle: 0.01,
            epsilon_a: 0.01,
            epsilon_d: 0.01,
            alpha: 0.8,
            beta: 0.99,
            is_3d: true,
            is_online: true,
            compute_prob_dynamic: false,
            is_mapping: true,
        }
    }
}

impl MapperConfig {
    /// Load a configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse a configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Euclidean dimension D implied by `is_3d`.
    pub fn euclidean_dim(&self) -> usize {
        if self.is_3d { 3 } else { 2 }
    }

    /// Check every parameter range.
    pub fn validate(&self) -> Result<()> {
        UpdateCondition::parse(&self.map_update_condition)?;

        if !(0.0..=1.0).contains(&self.map_update_overlap) {
            return Err(invalid("map update overlap", self.map_update_overlap));
        }
        if self.map_update_delay < 0.0 {
            return Err(invalid("map update delay", self.map_update_delay));
        }
        if self.map_update_distance < 0.0 {
            return Err(invalid("map update distance", self.map_update_distance));
        }
        if self.min_dist_new_point < 0.0 {
            return Err(invalid("minimum distance of new point", self.min_dist_new_point));
        }
        if self.sensor_max_range < 0.0 {
            return Err(invalid("sensor max range", self.sensor_max_range));
        }
        if !(0.0..=1.0).contains(&self.prior_dynamic) {
            return Err(invalid("prior dynamic", self.prior_dynamic));
        }
        if !(0.0..=1.0).contains(&self.threshold_dynamic) {
            return Err(invalid("threshold dynamic", self.threshold_dynamic));
        }
        if !(0.0..=FRAC_PI_2).contains(&self.beam_half_angle) {
            return Err(invalid("beam half angle", self.beam_half_angle));
        }
        if self.epsilon_a < 0.0 {
            return Err(invalid("epsilon a", self.epsilon_a));
        }
        if self.epsilon_d < 0.0 {
            return Err(invalid("epsilon d", self.epsilon_d));
        }
        if !(0.0..=1.0).contains(&self.alpha) {
            return Err(invalid("alpha", self.alpha));
        }
        if !(0.0..=1.0).contains(&self.beta) {
            return Err(invalid("beta", self.beta));
        }
        Ok(())
    }
}

fn invalid(name: &str, value: f32) -> MapperError {
    MapperError::Config(format!("invalid {name}: {value}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(MapperConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_overrides_defaults() {
        let config = MapperConfig::from_yaml(
            "map_update_condition: distance\nmap_update_distance: 1.5\nis_3d: false\n",
        )
        .unwrap();
        assert_eq!(config.map_update_condition, "distance");
        assert_eq!(config.map_update_distance, 1.5);
        assert_eq!(config.euclidean_dim(), 2);
        // Untouched fields keep their defaults.
        assert_eq!(config.sensor_max_range, 80.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_condition_rejected() {
        let config = MapperConfig {
            map_update_condition: "never".to_string(),
            ..MapperConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_out_of_range_probabilities_rejected() {
        for field in ["prior_dynamic", "threshold_dynamic", "alpha", "beta", "map_update_overlap"] {
            let mut config = MapperConfig::default();
            match field {
                "prior_dynamic" => config.prior_dynamic = 1.5,
                "threshold_dynamic" => config.threshold_dynamic = -0.1,
                "alpha" => config.alpha = 2.0,
                "beta" => config.beta = -1.0,
                _ => config.map_update_overlap = 1.1,
            }
            assert!(config.validate().is_err(), "{field} accepted out of range");
        }
    }

    #[test]
    fn test_negative_distances_rejected() {
        let config = MapperConfig {
            min_dist_new_point: -0.01,
            ..MapperConfig::default()
        };
        assert!(config.validate().is_err());

        let config = MapperConfig {
            sensor_max_range: -1.0,
            ..MapperConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_beam_half_angle_range() {
        let config = MapperConfig {
            beam_half_angle: 2.0,
            ..MapperConfig::default()
        };
        assert!(config.validate().is_err());

        let config = MapperConfig {
            beam_half_angle: FRAC_PI_2,
            ..MapperConfig::default()
        };
        assert!(config.validate().is_ok());
    }
}
