//! Rule registry and built-in rule catalogue.
//!
//! Constraint types are not an inheritance chain: each type string maps to a
//! factory that parses the definition's parameters into a [`Rule`]. Adding a
//! rule type is a [`RuleRegistry::register`] call.

mod balance;
mod booking;
mod rest;
mod streaks;
mod travel;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::constraint::{Rule, RuleOutcome};
use crate::domain::{ConstraintDefinition, DefinitionError, Schedule};

pub use balance::{GamesPerTeamRule, HomeAwayBalanceRule, UniqueMatchupsRule};
pub use booking::{BlackoutDatesRule, NoDoubleBookingRule, VenueConflictRule};
pub use rest::RestDaysRule;
pub use streaks::{ConsecutiveGamesRule, Side};
pub use travel::TravelDistanceRule;

/// Builds a rule from a validated definition.
pub type RuleFactory =
    Arc<dyn Fn(&ConstraintDefinition) -> Result<Arc<dyn Rule>, DefinitionError> + Send + Sync>;

/// Type-string keyed table of rule factories.
#[derive(Clone, Default)]
pub struct RuleRegistry {
    factories: BTreeMap<String, RuleFactory>,
}

impl fmt::Debug for RuleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}

impl RuleRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with every built-in rule type.
    pub fn with_builtin_rules() -> Self {
        let mut registry = Self::new();
        registry.register("rest_days", |d| Ok(Arc::new(RestDaysRule::from_definition(d)?)));
        registry.register("max_consecutive_home", |d| {
            Ok(Arc::new(ConsecutiveGamesRule::from_definition(d, Side::Home)?))
        });
        registry.register("max_consecutive_away", |d| {
            Ok(Arc::new(ConsecutiveGamesRule::from_definition(d, Side::Away)?))
        });
        registry.register("home_away_balance", |d| {
            Ok(Arc::new(HomeAwayBalanceRule::from_definition(d)?))
        });
        registry.register("games_per_team", |d| {
            Ok(Arc::new(GamesPerTeamRule::from_definition(d)?))
        });
        registry.register("unique_matchups", |d| {
            Ok(Arc::new(UniqueMatchupsRule::from_definition(d)?))
        });
        registry.register("no_double_booking", |_| Ok(Arc::new(NoDoubleBookingRule)));
        registry.register("venue_conflict", |_| Ok(Arc::new(VenueConflictRule)));
        registry.register("blackout_dates", |d| {
            Ok(Arc::new(BlackoutDatesRule::from_definition(d)?))
        });
        registry.register("travel_distance", |d| {
            Ok(Arc::new(TravelDistanceRule::from_definition(d)?))
        });
        registry
    }

    /// Register (or replace) the factory for `kind`.
    pub fn register<F>(&mut self, kind: impl Into<String>, factory: F)
    where
        F: Fn(&ConstraintDefinition) -> Result<Arc<dyn Rule>, DefinitionError> + Send + Sync + 'static,
    {
        self.factories.insert(kind.into(), Arc::new(factory));
    }

    pub fn with_rule<F>(mut self, kind: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&ConstraintDefinition) -> Result<Arc<dyn Rule>, DefinitionError> + Send + Sync + 'static,
    {
        self.register(kind, factory);
        self
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    pub fn kinds(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// Resolve the definition's type and build its rule.
    pub fn build(&self, definition: &ConstraintDefinition) -> Result<Arc<dyn Rule>, DefinitionError> {
        let factory = self
            .factories
            .get(&definition.kind)
            .ok_or_else(|| DefinitionError::UnknownType {
                id: definition.id.clone(),
                kind: definition.kind.clone(),
            })?;
        factory(definition)
    }
}

/// Shared guard: rules have nothing to check on an empty schedule.
pub(crate) fn require_games(schedule: &Schedule) -> Option<RuleOutcome> {
    if schedule.games.is_empty() {
        Some(RuleOutcome::not_applicable("schedule has no games"))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ConstraintCategory, ConstraintScope};

    #[test]
    fn test_builtin_catalogue() {
        let registry = RuleRegistry::with_builtin_rules();
        for kind in [
            "rest_days",
            "max_consecutive_home",
            "max_consecutive_away",
            "home_away_balance",
            "games_per_team",
            "unique_matchups",
            "no_double_booking",
            "venue_conflict",
            "blackout_dates",
            "travel_distance",
        ] {
            assert!(registry.contains(kind), "missing {kind}");
        }
    }

    #[test]
    fn test_unknown_type_fails_build() {
        let registry = RuleRegistry::with_builtin_rules();
        let def = ConstraintDefinition::new(
            "c",
            "lunar_cycle",
            ConstraintScope::Schedule,
            ConstraintCategory::Soft,
        );
        let err = registry.build(&def).unwrap_err();
        assert!(matches!(err, DefinitionError::UnknownType { .. }));
    }

    #[test]
    fn test_factory_rejects_bad_parameters() {
        let registry = RuleRegistry::with_builtin_rules();
        let def = ConstraintDefinition::new(
            "rest",
            "rest_days",
            ConstraintScope::Team,
            ConstraintCategory::Hard,
        )
        .with_param("minDays", serde_json::json!("a week"));
        assert!(matches!(
            registry.build(&def),
            Err(DefinitionError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_custom_registration() {
        let registry = RuleRegistry::new().with_rule("no_double_booking", |_| {
            Ok(Arc::new(NoDoubleBookingRule) as Arc<dyn Rule>)
        });
        assert_eq!(registry.kinds(), vec!["no_double_booking"]);
    }
}
