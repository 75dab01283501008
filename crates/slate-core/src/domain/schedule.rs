//! Schedule value objects: sports, teams, venues, games.
//!
//! A [`Schedule`] is passed by reference (or `Arc`) into evaluation and is
//! never mutated there. Strategies and post-passes build new schedules.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::aggregate::AggregateSummary;
use crate::domain::error::{Result, SlateError};

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Sport a schedule is built for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Sport {
    Football,
    Basketball,
    Baseball,
    Soccer,
    Hockey,
    Volleyball,
    Other,
}

impl Sport {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sport::Football => "football",
            Sport::Basketball => "basketball",
            Sport::Baseball => "baseball",
            Sport::Soccer => "soccer",
            Sport::Hockey => "hockey",
            Sport::Volleyball => "volleyball",
            Sport::Other => "other",
        }
    }
}

impl fmt::Display for Sport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Sport {
    type Err = std::convert::Infallible;

    /// Unrecognised names map to [`Sport::Other`].
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "football" => Sport::Football,
            "basketball" => Sport::Basketball,
            "baseball" => Sport::Baseball,
            "soccer" => Sport::Soccer,
            "hockey" => Sport::Hockey,
            "volleyball" => Sport::Volleyball,
            _ => Sport::Other,
        })
    }
}

/// A point on the globe, in degrees.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

impl Location {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Great-circle (haversine) distance in kilometres.
    pub fn distance_km(&self, other: &Location) -> f64 {
        let (lat1, lat2) = (self.latitude.to_radians(), other.latitude.to_radians());
        let dlat = lat2 - lat1;
        let dlon = (other.longitude - self.longitude).to_radians();
        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_KM * a.sqrt().atan2((1.0 - a).sqrt())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Team {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub division: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home_venue_id: Option<String>,
    /// Home location used for travel-distance math.
    #[serde(default)]
    pub location: Location,
}

impl Team {
    pub fn new(id: impl Into<String>, name: impl Into<String>, location: Location) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            division: None,
            home_venue_id: None,
            location,
        }
    }

    pub fn with_division(mut self, division: impl Into<String>) -> Self {
        self.division = Some(division.into());
        self
    }

    pub fn with_home_venue(mut self, venue_id: impl Into<String>) -> Self {
        self.home_venue_id = Some(venue_id.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Venue {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub location: Location,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<u32>,
}

/// A single fixture.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Game {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub round: Option<u32>,
    pub home_team_id: String,
    pub away_team_id: String,
    pub date: NaiveDate,
    /// Defaults to the home team's venue when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venue_id: Option<String>,
}

impl Game {
    pub fn new(
        home_team_id: impl Into<String>,
        away_team_id: impl Into<String>,
        date: NaiveDate,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            round: None,
            home_team_id: home_team_id.into(),
            away_team_id: away_team_id.into(),
            date,
            venue_id: None,
        }
    }

    pub fn involves(&self, team_id: &str) -> bool {
        self.home_team_id == team_id || self.away_team_id == team_id
    }

    pub fn is_home(&self, team_id: &str) -> bool {
        self.home_team_id == team_id
    }

    /// The other team in this game, if `team_id` plays in it.
    pub fn opponent(&self, team_id: &str) -> Option<&str> {
        if self.home_team_id == team_id {
            Some(&self.away_team_id)
        } else if self.away_team_id == team_id {
            Some(&self.home_team_id)
        } else {
            None
        }
    }

    /// Swap home and away.
    pub fn flipped(&self) -> Self {
        let mut game = self.clone();
        std::mem::swap(&mut game.home_team_id, &mut game.away_team_id);
        game.venue_id = None;
        game
    }
}

/// Metrics stamped onto a schedule once optimization completes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleMetrics {
    pub total_travel_km: f64,
    pub travel_by_team: BTreeMap<String, f64>,
    pub max_home_away_imbalance: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_rest_days: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraint_summary: Option<AggregateSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<String>,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub pass_metrics: BTreeMap<String, serde_json::Value>,
}

/// Ordered collection of games plus the teams and venues they reference.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    pub id: String,
    pub sport: Sport,
    #[serde(default)]
    pub teams: Vec<Team>,
    #[serde(default)]
    pub venues: Vec<Venue>,
    #[serde(default)]
    pub games: Vec<Game>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<ScheduleMetrics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Schedule {
    pub fn new(sport: Sport, teams: Vec<Team>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            sport,
            teams,
            venues: Vec::new(),
            games: Vec::new(),
            metrics: None,
            completed_at: None,
        }
    }

    pub fn with_venues(mut self, venues: Vec<Venue>) -> Self {
        self.venues = venues;
        self
    }

    pub fn with_games(mut self, games: Vec<Game>) -> Self {
        self.games = games;
        self
    }

    pub fn team(&self, id: &str) -> Option<&Team> {
        self.teams.iter().find(|t| t.id == id)
    }

    pub fn venue(&self, id: &str) -> Option<&Venue> {
        self.venues.iter().find(|v| v.id == id)
    }

    /// Games involving `team_id`, ordered by date (stable for same-day games).
    pub fn games_for_team(&self, team_id: &str) -> Vec<&Game> {
        let mut games: Vec<&Game> = self.games.iter().filter(|g| g.involves(team_id)).collect();
        games.sort_by_key(|g| g.date);
        games
    }

    /// Venue id a game is played at: explicit venue, else the home team's venue.
    pub fn game_venue_id<'a>(&'a self, game: &'a Game) -> Option<&'a str> {
        game.venue_id.as_deref().or_else(|| {
            self.team(&game.home_team_id)
                .and_then(|t| t.home_venue_id.as_deref())
        })
    }

    /// Where a game is physically played.
    pub fn game_location(&self, game: &Game) -> Option<Location> {
        if let Some(venue) = self.game_venue_id(game).and_then(|id| self.venue(id)) {
            return Some(venue.location);
        }
        self.team(&game.home_team_id).map(|t| t.location)
    }

    pub fn dates(&self) -> BTreeSet<NaiveDate> {
        self.games.iter().map(|g| g.date).collect()
    }

    /// Check referential integrity: every game names two distinct known teams.
    pub fn validate(&self) -> Result<()> {
        for game in &self.games {
            if game.home_team_id == game.away_team_id {
                return Err(SlateError::InvalidSchedule(format!(
                    "game {} pairs team {} with itself",
                    game.id, game.home_team_id
                )));
            }
            for team_id in [&game.home_team_id, &game.away_team_id] {
                if self.team(team_id).is_none() {
                    return Err(SlateError::InvalidSchedule(format!(
                        "game {} references unknown team {}",
                        game.id, team_id
                    )));
                }
            }
        }
        Ok(())
    }
}
