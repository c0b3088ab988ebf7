//! Map-update gating.

use std::time::{Duration, Instant};

use crate::core::types::RigidTransform;
use crate::error::{MapperError, Result};

/// When a registered observation should trigger a map rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateCondition {
    /// Rebuild when ICP overlap drops below a threshold.
    Overlap,
    /// Rebuild when enough time has passed since the last rebuild.
    Delay,
    /// Rebuild when the sensor has moved far enough since the last rebuild.
    Distance,
}

impl UpdateCondition {
    /// Parse the configuration string form.
    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "overlap" => Ok(UpdateCondition::Overlap),
            "delay" => Ok(UpdateCondition::Delay),
            "distance" => Ok(UpdateCondition::Distance),
            other => Err(MapperError::Config(format!(
                "invalid map update condition: {other}"
            ))),
        }
    }
}

/// The policy deciding whether a new observation rebuilds the map.
#[derive(Debug, Clone)]
pub(crate) struct UpdatePolicy {
    pub condition: UpdateCondition,
    pub overlap_threshold: f32,
    pub delay: Duration,
    pub distance: f32,
    pub is_mapping: bool,
    pub is_online: bool,
}

impl UpdatePolicy {
    /// Decide whether to rebuild.
    ///
    /// Always false while mapping is disabled, and — in online mode —
    /// while a previous build is still running: observations arriving
    /// under load contribute to registration only, bounding the build
    /// backlog to a single slot.
    pub fn should_update(
        &self,
        now: Instant,
        current_pose: &RigidTransform,
        overlap: f32,
        builder_busy: bool,
        last_update_time: Option<Instant>,
        last_update_pose: &RigidTransform,
    ) -> bool {
        if !self.is_mapping {
            return false;
        }
        if self.is_online && builder_busy {
            return false;
        }

        match self.condition {
            UpdateCondition::Overlap => overlap < self.overlap_threshold,
            UpdateCondition::Delay => match last_update_time {
                Some(last) => now.duration_since(last) > self.delay,
                None => true,
            },
            UpdateCondition::Distance => {
                let moved = current_pose.translation() - last_update_pose.translation();
                moved.norm().abs() > self.distance
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(condition: UpdateCondition) -> UpdatePolicy {
        UpdatePolicy {
            condition,
            overlap_threshold: 0.9,
            delay: Duration::from_secs_f32(1.0),
            distance: 0.5,
            is_mapping: true,
            is_online: false,
        }
    }

    fn pose_at(x: f32) -> RigidTransform {
        RigidTransform::from_translation(&[x, 0.0, 0.0])
    }

    #[test]
    fn test_parse_conditions() {
        assert_eq!(
            UpdateCondition::parse("overlap").unwrap(),
            UpdateCondition::Overlap
        );
        assert_eq!(
            UpdateCondition::parse("delay").unwrap(),
            UpdateCondition::Delay
        );
        assert_eq!(
            UpdateCondition::parse("distance").unwrap(),
            UpdateCondition::Distance
        );
        assert!(UpdateCondition::parse("sometimes").is_err());
    }

    #[test]
    fn test_not_mapping_never_updates() {
        let mut p = policy(UpdateCondition::Overlap);
        p.is_mapping = false;
        assert!(!p.should_update(
            Instant::now(),
            &pose_at(0.0),
            0.0,
            false,
            None,
            &pose_at(0.0)
        ));
    }

    #[test]
    fn test_online_busy_guard() {
        let mut p = policy(UpdateCondition::Overlap);
        p.is_online = true;
        let now = Instant::now();
        assert!(!p.should_update(now, &pose_at(0.0), 0.0, true, None, &pose_at(0.0)));
        assert!(p.should_update(now, &pose_at(0.0), 0.0, false, None, &pose_at(0.0)));
    }

    #[test]
    fn test_offline_ignores_busy_flag() {
        let p = policy(UpdateCondition::Overlap);
        assert!(p.should_update(
            Instant::now(),
            &pose_at(0.0),
            0.0,
            true,
            None,
            &pose_at(0.0)
        ));
    }

    #[test]
    fn test_overlap_threshold() {
        let p = policy(UpdateCondition::Overlap);
        let now = Instant::now();
        assert!(p.should_update(now, &pose_at(0.0), 0.89, false, None, &pose_at(0.0)));
        assert!(!p.should_update(now, &pose_at(0.0), 0.9, false, None, &pose_at(0.0)));
        assert!(!p.should_update(now, &pose_at(0.0), 1.0, false, None, &pose_at(0.0)));
    }

    #[test]
    fn test_delay_condition() {
        let p = policy(UpdateCondition::Delay);
        let start = Instant::now();
        let later = start + Duration::from_secs(2);
        let soon = start + Duration::from_millis(100);

        assert!(p.should_update(later, &pose_at(0.0), 1.0, false, Some(start), &pose_at(0.0)));
        assert!(!p.should_update(soon, &pose_at(0.0), 1.0, false, Some(start), &pose_at(0.0)));
        // No prior update: due immediately.
        assert!(p.should_update(soon, &pose_at(0.0), 1.0, false, None, &pose_at(0.0)));
    }

    #[test]
    fn test_distance_condition() {
        let p = policy(UpdateCondition::Distance);
        let now = Instant::now();
        assert!(p.should_update(now, &pose_at(1.0), 1.0, false, None, &pose_at(0.0)));
        assert!(!p.should_update(now, &pose_at(0.4), 1.0, false, None, &pose_at(0.0)));
        // Exactly at the threshold: strictly-greater rule says no.
        assert!(!p.should_update(now, &pose_at(0.5), 1.0, false, None, &pose_at(0.0)));
    }
}
