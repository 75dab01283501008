//! Sport-specific scheduling defaults.

use serde_json::json;
use slate_core::Sport;

use crate::constraints::{
    SchedulingConstraints, MAX_CONSECUTIVE_AWAY, MIN_REST_DAYS, PREFERRED_DAYS, SERIES_LENGTH,
};

/// Defaults a league of this sport usually plays under. Callers layer their
/// own preferences on top with [`SchedulingConstraints::merged_over`].
pub fn augment_constraints(sport: Sport) -> SchedulingConstraints {
    let defaults = SchedulingConstraints::new();
    match sport {
        Sport::Football => defaults
            .with(MIN_REST_DAYS, json!(7))
            .with(PREFERRED_DAYS, json!(["saturday", "sunday"])),
        Sport::Basketball => defaults.with(MIN_REST_DAYS, json!(1)),
        Sport::Baseball => defaults.with(SERIES_LENGTH, json!(3)),
        Sport::Soccer => defaults.with(MIN_REST_DAYS, json!(3)),
        Sport::Hockey => defaults
            .with(MIN_REST_DAYS, json!(1))
            .with(MAX_CONSECUTIVE_AWAY, json!(4)),
        Sport::Volleyball | Sport::Other => defaults,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_football_rests_a_week_on_weekends() {
        let c = augment_constraints(Sport::Football);
        assert_eq!(c.u32(MIN_REST_DAYS), Some(7));
        assert_eq!(
            c.strings(PREFERRED_DAYS),
            Some(vec!["saturday".to_string(), "sunday".to_string()])
        );
    }

    #[test]
    fn test_hockey_caps_road_trips() {
        let c = augment_constraints(Sport::Hockey);
        assert_eq!(c.u32(MAX_CONSECUTIVE_AWAY), Some(4));
        assert_eq!(c.u32(MIN_REST_DAYS), Some(1));
    }

    #[test]
    fn test_unknown_sport_adds_nothing() {
        assert!(augment_constraints(Sport::Other).is_empty());
    }

    #[test]
    fn test_caller_overrides_sport_default() {
        let caller = SchedulingConstraints::new().with(MIN_REST_DAYS, json!(2));
        let merged = caller.merged_over(&augment_constraints(Sport::Soccer));
        assert_eq!(merged.u32(MIN_REST_DAYS), Some(2));
    }
}
