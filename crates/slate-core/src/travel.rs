//! Team travel distances over a schedule.
//!
//! Each team starts at its home location, travels to every game in date
//! order, and returns home after its last game. Home games are played at
//! the home venue, so a home stand costs nothing after the first leg back.

use std::collections::BTreeMap;

use crate::domain::{Location, Schedule};

/// Kilometres travelled by one team across the season.
pub fn team_travel_km(schedule: &Schedule, team_id: &str) -> f64 {
    let Some(home) = schedule.team(team_id).map(|t| t.location) else {
        return 0.0;
    };

    let mut current: Location = home;
    let mut total = 0.0;
    for game in schedule.games_for_team(team_id) {
        if let Some(location) = schedule.game_location(game) {
            total += current.distance_km(&location);
            current = location;
        }
    }
    total + current.distance_km(&home)
}

pub fn travel_by_team(schedule: &Schedule) -> BTreeMap<String, f64> {
    schedule
        .teams
        .iter()
        .map(|t| (t.id.clone(), team_travel_km(schedule, &t.id)))
        .collect()
}

pub fn total_travel_km(schedule: &Schedule) -> f64 {
    travel_by_team(schedule).values().sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Game, Sport, Team};
    use chrono::NaiveDate;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, d).unwrap()
    }

    fn line_schedule(games: Vec<Game>) -> Schedule {
        // Three teams on the equator, one degree of longitude apart (~111 km).
        let teams = vec![
            Team::new("a", "A", Location::new(0.0, 0.0)),
            Team::new("b", "B", Location::new(0.0, 1.0)),
            Team::new("c", "C", Location::new(0.0, 2.0)),
        ];
        Schedule::new(Sport::Other, teams).with_games(games)
    }

    #[test]
    fn test_home_games_cost_nothing() {
        let s = line_schedule(vec![Game::new("a", "b", day(1)), Game::new("a", "c", day(2))]);
        assert!(team_travel_km(&s, "a") < 1e-9);
    }

    #[test]
    fn test_road_trip_is_chained() {
        let s = line_schedule(vec![Game::new("b", "a", day(1)), Game::new("c", "a", day(2))]);
        // a -> b -> c -> a = 1 + 1 + 2 degrees
        let km = team_travel_km(&s, "a");
        assert!((km - 4.0 * 111.19).abs() < 1.0, "got {km}");
    }

    #[test]
    fn test_unknown_team_travels_nowhere() {
        let s = line_schedule(vec![]);
        assert_eq!(team_travel_km(&s, "zzz"), 0.0);
    }

    #[test]
    fn test_total_is_sum_of_teams() {
        let s = line_schedule(vec![Game::new("b", "a", day(1)), Game::new("c", "b", day(2))]);
        let by_team = travel_by_team(&s);
        let total: f64 = by_team.values().sum();
        assert!((total_travel_km(&s) - total).abs() < 1e-9);
        assert_eq!(by_team.len(), 3);
    }
}
