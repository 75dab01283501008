//! Post-optimization passes.
//!
//! A pass reads a schedule snapshot and returns a [`PassPatch`]: the games it
//! wants changed (matched by id, new ids appended) plus a metrics blob. Passes
//! never mutate their input, so the orchestrator can run several against the
//! same snapshot and apply the patches afterwards.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use chrono::{Datelike, Days, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use slate_core::{travel, Game, Schedule};

use crate::constraints::{
    SchedulingConstraints, MAX_CONSECUTIVE_AWAY, MIN_REST_DAYS, PREFERRED_DAYS, SERIES_LENGTH,
};
use crate::quality::{home_away_difference, max_home_away_imbalance};

const DEFAULT_MIN_REST_DAYS: u32 = 1;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PassPatch {
    pub games: Vec<Game>,
    pub metrics: Value,
}

/// What one pass did, as reported by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PassReport {
    pub name: String,
    pub changed_games: usize,
    pub metrics: Value,
}

pub trait PostPass: Send + Sync {
    fn name(&self) -> &'static str;

    fn apply(&self, schedule: &Schedule, constraints: &SchedulingConstraints) -> PassPatch;
}

/// Travel, home/away balance, rest days, then the sport-specific pass.
pub fn standard_passes() -> Vec<Arc<dyn PostPass>> {
    vec![
        Arc::new(TravelPass),
        Arc::new(HomeAwayBalancePass),
        Arc::new(RestDaysPass),
        Arc::new(SportSpecificPass),
    ]
}

/// Replace games by id and append the ones the schedule does not have yet.
/// Returns how many games changed or were added.
pub fn apply_patch(schedule: &mut Schedule, patch: &PassPatch) -> usize {
    let index: HashMap<String, usize> = schedule
        .games
        .iter()
        .enumerate()
        .map(|(i, g)| (g.id.clone(), i))
        .collect();

    let mut changed = 0;
    for game in &patch.games {
        match index.get(&game.id) {
            Some(&i) if schedule.games[i] == *game => {}
            Some(&i) => {
                schedule.games[i] = game.clone();
                changed += 1;
            }
            None => {
                schedule.games.push(game.clone());
                changed += 1;
            }
        }
    }
    changed
}

/// Games in date order; same-day games keep schedule order.
fn chronological(schedule: &Schedule) -> Vec<usize> {
    let mut order: Vec<usize> = (0..schedule.games.len()).collect();
    order.sort_by_key(|&i| schedule.games[i].date);
    order
}

fn changed_games(before: &Schedule, after: &Schedule) -> Vec<Game> {
    after
        .games
        .iter()
        .zip(&before.games)
        .filter(|(a, b)| a != b)
        .map(|(a, _)| a.clone())
        .collect()
}

// ---------------------------------------------------------------------------
// Travel
// ---------------------------------------------------------------------------

/// Flip games when it shortens the two teams' combined travel without
/// pushing either team's home/away difference past `max(old, 1)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TravelPass;

impl PostPass for TravelPass {
    fn name(&self) -> &'static str {
        "travel"
    }

    fn apply(&self, schedule: &Schedule, _constraints: &SchedulingConstraints) -> PassPatch {
        let mut working = schedule.clone();
        let mut diff = home_away_difference(&working);
        let before_km = travel::total_travel_km(&working);

        for i in 0..working.games.len() {
            let (home, away) = {
                let g = &working.games[i];
                (g.home_team_id.clone(), g.away_team_id.clone())
            };
            let (dh, da) = (diff[&home], diff[&away]);
            let balance_ok = (dh - 2).abs() <= dh.abs().max(1) && (da + 2).abs() <= da.abs().max(1);
            if !balance_ok {
                continue;
            }

            let pair_km = |s: &Schedule| travel::team_travel_km(s, &home) + travel::team_travel_km(s, &away);
            let current = pair_km(&working);
            let original = working.games[i].clone();
            working.games[i] = original.flipped();
            if pair_km(&working) + 1e-9 < current {
                diff.insert(home, dh - 2);
                diff.insert(away, da + 2);
            } else {
                working.games[i] = original;
            }
        }

        let games = changed_games(schedule, &working);
        let after_km = travel::total_travel_km(&working);
        PassPatch {
            metrics: json!({
                "flips": games.len(),
                "travelBeforeKm": before_km,
                "travelAfterKm": after_km,
            }),
            games,
        }
    }
}

// ---------------------------------------------------------------------------
// Home/away balance
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
pub struct HomeAwayBalancePass;

impl PostPass for HomeAwayBalancePass {
    fn name(&self) -> &'static str {
        "home_away_balance"
    }

    fn apply(&self, schedule: &Schedule, _constraints: &SchedulingConstraints) -> PassPatch {
        let mut diff = home_away_difference(schedule);
        let mut games = Vec::new();

        for game in &schedule.games {
            let h = diff[&game.home_team_id];
            let a = diff[&game.away_team_id];
            if (h - 2).abs() + (a + 2).abs() < h.abs() + a.abs() {
                diff.insert(game.home_team_id.clone(), h - 2);
                diff.insert(game.away_team_id.clone(), a + 2);
                games.push(game.flipped());
            }
        }

        let after = diff.values().map(|d| d.unsigned_abs()).max().unwrap_or(0);
        PassPatch {
            metrics: json!({
                "flips": games.len(),
                "maxImbalanceBefore": max_home_away_imbalance(schedule),
                "maxImbalanceAfter": after,
            }),
            games,
        }
    }
}

// ---------------------------------------------------------------------------
// Rest days
// ---------------------------------------------------------------------------

/// Push games later until both teams have `minRestDays` since their
/// previous game.
#[derive(Debug, Clone, Copy, Default)]
pub struct RestDaysPass;

impl PostPass for RestDaysPass {
    fn name(&self) -> &'static str {
        "rest_days"
    }

    fn apply(&self, schedule: &Schedule, constraints: &SchedulingConstraints) -> PassPatch {
        let min_rest = constraints.u32(MIN_REST_DAYS).unwrap_or(DEFAULT_MIN_REST_DAYS);
        let mut last_played: BTreeMap<&str, NaiveDate> = BTreeMap::new();
        let mut games = Vec::new();
        let mut days_added = 0i64;

        for i in chronological(schedule) {
            let game = &schedule.games[i];
            let earliest = [game.home_team_id.as_str(), game.away_team_id.as_str()]
                .iter()
                .filter_map(|team| last_played.get(team))
                .filter_map(|&d| d.checked_add_days(Days::new(u64::from(min_rest))))
                .max();

            let date = match earliest {
                Some(earliest) if earliest > game.date => {
                    let mut moved = game.clone();
                    moved.date = earliest;
                    days_added += (earliest - game.date).num_days();
                    games.push(moved);
                    earliest
                }
                _ => game.date,
            };
            last_played.insert(&game.home_team_id, date);
            last_played.insert(&game.away_team_id, date);
        }

        PassPatch {
            metrics: json!({
                "minRestDays": min_rest,
                "moved": games.len(),
                "daysAdded": days_added,
            }),
            games,
        }
    }
}

// ---------------------------------------------------------------------------
// Sport specific
// ---------------------------------------------------------------------------

/// Preferred weekdays, road-trip length and series expansion, each only
/// when the matching preference key is set.
#[derive(Debug, Clone, Copy, Default)]
pub struct SportSpecificPass;

impl PostPass for SportSpecificPass {
    fn name(&self) -> &'static str {
        "sport_specific"
    }

    fn apply(&self, schedule: &Schedule, constraints: &SchedulingConstraints) -> PassPatch {
        let mut working = schedule.clone();

        let day_shifts = constraints
            .strings(PREFERRED_DAYS)
            .map(|days| shift_to_preferred_days(&mut working, &days))
            .unwrap_or(0);
        let away_flips = constraints
            .u32(MAX_CONSECUTIVE_AWAY)
            .map(|limit| cap_road_trips(&mut working, limit.max(1)))
            .unwrap_or(0);

        let mut games = changed_games(schedule, &working);
        let series = match constraints.u32(SERIES_LENGTH) {
            Some(length) if length > 1 => series_games(&working, length),
            _ => Vec::new(),
        };
        let series_added = series.len();
        games.extend(series);

        PassPatch {
            metrics: json!({
                "sport": schedule.sport,
                "dayShifts": day_shifts,
                "awayStreakFlips": away_flips,
                "seriesGamesAdded": series_added,
            }),
            games,
        }
    }
}

fn shift_to_preferred_days(schedule: &mut Schedule, days: &[String]) -> usize {
    let preferred: HashSet<Weekday> = days.iter().filter_map(|d| d.parse().ok()).collect();
    if preferred.is_empty() {
        return 0;
    }
    let mut shifted = 0;
    for game in &mut schedule.games {
        let next = (0..7u64)
            .filter_map(|ahead| game.date.checked_add_days(Days::new(ahead)))
            .find(|d| preferred.contains(&d.weekday()));
        if let Some(date) = next.filter(|&d| d != game.date) {
            game.date = date;
            shifted += 1;
        }
    }
    shifted
}

/// Flip a game when it would extend the away team's road trip past `limit`
/// and hosting it would not do the same to the home team.
fn cap_road_trips(schedule: &mut Schedule, limit: u32) -> usize {
    let mut away_run: HashMap<String, u32> = HashMap::new();
    let mut flips = 0;
    for i in chronological(schedule) {
        let game = &schedule.games[i];
        let away_next = away_run.get(&game.away_team_id).copied().unwrap_or(0) + 1;
        let home_if_flipped = away_run.get(&game.home_team_id).copied().unwrap_or(0) + 1;
        if away_next > limit && home_if_flipped <= limit {
            schedule.games[i] = game.flipped();
            flips += 1;
        }
        let game = &schedule.games[i];
        away_run.insert(game.home_team_id.clone(), 0);
        *away_run.entry(game.away_team_id.clone()).or_default() += 1;
    }
    flips
}

/// Turn each game into a series of `length` games on consecutive days.
/// Extra games get ids `{id}-s2`, `{id}-s3`, ...; ids already present are
/// left alone.
fn series_games(schedule: &Schedule, length: u32) -> Vec<Game> {
    let existing: BTreeSet<&str> = schedule.games.iter().map(|g| g.id.as_str()).collect();
    schedule
        .games
        .iter()
        .filter(|g| !g.id.contains("-s"))
        .flat_map(|game| {
            (2..=length).filter_map(move |k| {
                let mut extra = game.clone();
                extra.id = format!("{}-s{k}", game.id);
                extra.date = game.date.checked_add_days(Days::new(u64::from(k - 1)))?;
                Some(extra)
            })
        })
        .filter(|g| !existing.contains(g.id.as_str()))
        .collect()
}
