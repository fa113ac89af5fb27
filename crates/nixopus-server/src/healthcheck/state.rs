/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! Streak counters and the effective-state machine.
//!
//! ```text
//!   UP   --unhealthy/error-->  UP    (fails++)
//!   UP   --fails reaches threshold-->  DOWN
//!   DOWN --healthy-->  DOWN    (successes++)
//!   DOWN --successes reach success_threshold-->  UP   (fails = 0)
//! ```
//!
//! While a down check is recovering its failure streak is held, so
//! "down iff fails >= failure_threshold" stays exact.

use nixopus_models::models::{EffectiveState, HealthCheck, HealthStatus};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Counters {
    pub consecutive_fails: i32,
    pub consecutive_successes: i32,
}

impl Counters {
    pub fn of(check: &HealthCheck) -> Self {
        Self {
            consecutive_fails: check.consecutive_fails,
            consecutive_successes: check.consecutive_successes,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    pub failure: i32,
    pub success: i32,
}

impl Thresholds {
    pub fn of(check: &HealthCheck) -> Self {
        Self {
            failure: check.failure_threshold,
            success: check.success_threshold,
        }
    }
}

/// Folds one probe classification into the counters.
pub fn apply_outcome(counters: Counters, thresholds: Thresholds, status: HealthStatus) -> Counters {
    let successes = counters.consecutive_successes.saturating_add(1);
    match status {
        HealthStatus::Healthy if counters.consecutive_fails >= thresholds.failure => {
            if successes >= thresholds.success {
                Counters {
                    consecutive_fails: 0,
                    consecutive_successes: successes,
                }
            } else {
                Counters {
                    consecutive_fails: counters.consecutive_fails,
                    consecutive_successes: successes,
                }
            }
        }
        HealthStatus::Healthy => Counters {
            consecutive_fails: 0,
            consecutive_successes: successes,
        },
        HealthStatus::Unhealthy | HealthStatus::Error => Counters {
            consecutive_fails: counters.consecutive_fails.saturating_add(1),
            consecutive_successes: 0,
        },
    }
}

/// A change of effective state between two snapshots of a check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Transition {
    pub from: EffectiveState,
    pub to: EffectiveState,
}

impl Transition {
    pub fn between(before: &HealthCheck, after: &HealthCheck) -> Option<Self> {
        let from = before.effective_state();
        let to = after.effective_state();
        (from != to).then_some(Transition { from, to })
    }

    pub fn is_failure(&self) -> bool {
        self.to == EffectiveState::Down
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use nixopus_models::models::health_checks::effective_state;

    /// State of a check that has been probed at least once.
    fn state_after(counters: Counters, thresholds: Thresholds) -> EffectiveState {
        let probed_at = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).single();
        effective_state(probed_at, counters.consecutive_fails, thresholds.failure)
    }

    const T: Thresholds = Thresholds {
        failure: 3,
        success: 2,
    };

    fn run(statuses: &[HealthStatus]) -> Vec<(Counters, EffectiveState)> {
        let mut counters = Counters::default();
        statuses
            .iter()
            .map(|status| {
                counters = apply_outcome(counters, T, *status);
                (counters, state_after(counters, T))
            })
            .collect()
    }

    #[test]
    fn test_recovery_after_three_failures() {
        use HealthStatus::*;
        let steps = run(&[Unhealthy, Error, Unhealthy, Healthy, Healthy]);

        let fails: Vec<i32> = steps.iter().map(|(c, _)| c.consecutive_fails).collect();
        let successes: Vec<i32> = steps.iter().map(|(c, _)| c.consecutive_successes).collect();
        let states: Vec<EffectiveState> = steps.iter().map(|(_, s)| *s).collect();

        assert_eq!(fails, vec![1, 2, 3, 3, 0]);
        assert_eq!(successes, vec![0, 0, 0, 1, 2]);
        assert_eq!(
            states,
            vec![
                EffectiveState::Up,
                EffectiveState::Up,
                EffectiveState::Down,
                EffectiveState::Down,
                EffectiveState::Up
            ]
        );
    }

    #[test]
    fn test_failure_during_recovery_resets_success_run() {
        use HealthStatus::*;
        let steps = run(&[Error, Error, Error, Healthy, Error, Healthy]);
        let last = steps.last().unwrap();
        assert_eq!(last.0.consecutive_fails, 4);
        assert_eq!(last.0.consecutive_successes, 1);
        assert_eq!(last.1, EffectiveState::Down);
    }

    #[test]
    fn test_healthy_while_up_clears_partial_streak() {
        use HealthStatus::*;
        let steps = run(&[Unhealthy, Unhealthy, Healthy]);
        assert_eq!(steps[2].0.consecutive_fails, 0);
        assert_eq!(steps[2].1, EffectiveState::Up);
    }

    #[test]
    fn test_single_success_threshold_recovers_immediately() {
        let t = Thresholds {
            failure: 1,
            success: 1,
        };
        let down = apply_outcome(Counters::default(), t, HealthStatus::Error);
        assert_eq!(state_after(down, t), EffectiveState::Down);
        let up = apply_outcome(down, t, HealthStatus::Healthy);
        assert_eq!(up.consecutive_fails, 0);
        assert_eq!(state_after(up, t), EffectiveState::Up);
    }

    #[test]
    fn test_down_iff_streak_at_threshold() {
        use HealthStatus::*;
        for sequence in [
            vec![Error, Healthy, Error, Error, Error, Healthy, Healthy, Error],
            vec![Healthy, Unhealthy, Unhealthy, Unhealthy, Unhealthy, Healthy],
        ] {
            for (counters, state) in run(&sequence) {
                assert_eq!(
                    state == EffectiveState::Down,
                    counters.consecutive_fails >= T.failure
                );
            }
        }
    }

    #[test]
    fn test_never_probed_is_unknown() {
        let counters = Counters {
            consecutive_fails: 5,
            consecutive_successes: 0,
        };
        assert_eq!(
            effective_state(None, counters.consecutive_fails, T.failure),
            EffectiveState::Unknown
        );
    }
}
