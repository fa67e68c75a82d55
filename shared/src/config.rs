//! Match tunables. Defaults mirror the shipped game.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Anti-overlap search parameters for spawned trash
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlacementConfig {
    /// Minimum distance between any two items
    pub min_separation: f32,
    /// Search extends to five times this radius
    pub alternative_radius: f32,
    pub initial_points_per_ring: u32,
    pub points_per_ring_growth: u32,
    /// Random angular offset applied to each candidate, in degrees
    pub jitter_degrees: f32,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            min_separation: 3.0,
            alternative_radius: 5.0,
            initial_points_per_ring: 8,
            points_per_ring_growth: 4,
            jitter_degrees: 15.0,
        }
    }
}

impl PlacementConfig {
    pub fn max_search_radius(&self) -> f32 {
        self.alternative_radius * 5.0
    }

    pub fn fallback_distance(&self) -> f32 {
        self.max_search_radius() + self.min_separation * 2.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    /// Seconds of play once the match starts
    pub match_duration: f32,
    /// First number shown by the countdown
    pub countdown_seconds: u32,
    pub required_players: usize,
    pub placement: PlacementConfig,
    pub spawn_cooldown: f32,
    /// Random ("key") spawns may ignore the cooldown, targeted spawns never do
    pub allow_key_spawn_during_cooldown: bool,
    /// Random spawns land within this radius of the anchor
    pub spawn_radius: f32,
    pub min_spawn_height: f32,
    pub max_spawn_height: f32,
    pub grab_distance: f32,
    pub grab_cooldown: f32,
    pub target_trash: i32,
    /// Pre-placed collectibles the coordinator seeds after each restart
    pub scene_trash_count: usize,
    /// Scene collectibles are scattered within this radius of the origin
    pub arena_radius: f32,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            match_duration: 150.0,
            countdown_seconds: 3,
            required_players: 2,
            placement: PlacementConfig::default(),
            spawn_cooldown: 2.0,
            allow_key_spawn_during_cooldown: true,
            spawn_radius: 5.0,
            min_spawn_height: 0.0,
            max_spawn_height: 3.0,
            grab_distance: 5.0,
            grab_cooldown: 1.0,
            target_trash: 10,
            scene_trash_count: 0,
            arena_radius: 30.0,
        }
    }
}

impl MatchConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: MatchConfig =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.match_duration > 0.0) {
            return Err(ConfigError::InvalidMatchDuration(self.match_duration));
        }
        if self.required_players < 2 {
            return Err(ConfigError::InvalidRequiredPlayers(self.required_players));
        }

        positive("placement.min_separation", self.placement.min_separation)?;
        positive("placement.alternative_radius", self.placement.alternative_radius)?;
        positive("grab_distance", self.grab_distance)?;
        positive("arena_radius", self.arena_radius)?;
        non_negative("spawn_cooldown", self.spawn_cooldown)?;
        non_negative("grab_cooldown", self.grab_cooldown)?;
        non_negative("spawn_radius", self.spawn_radius)?;
        non_negative("placement.jitter_degrees", self.placement.jitter_degrees)?;

        if self.placement.initial_points_per_ring == 0 {
            return Err(ConfigError::EmptyRing);
        }
        if self.min_spawn_height > self.max_spawn_height {
            return Err(ConfigError::InvertedHeightRange {
                min: self.min_spawn_height,
                max: self.max_spawn_height,
            });
        }
        Ok(())
    }
}

fn positive(name: &'static str, value: f32) -> Result<(), ConfigError> {
    if value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NotPositive { name, value })
    }
}

fn non_negative(name: &'static str, value: f32) -> Result<(), ConfigError> {
    if value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Negative { name, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = MatchConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.match_duration, 150.0);
        assert_eq!(config.countdown_seconds, 3);
        assert_eq!(config.placement.max_search_radius(), 25.0);
        assert_eq!(config.placement.fallback_distance(), 31.0);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config =
            MatchConfig::from_json_str(r#"{"match_duration": 60.0, "placement": {"min_separation": 1.5}}"#)
                .unwrap();
        assert_eq!(config.match_duration, 60.0);
        assert_eq!(config.placement.min_separation, 1.5);
        assert_eq!(config.placement.initial_points_per_ring, 8);
        assert_eq!(config.spawn_cooldown, 2.0);
    }

    #[test]
    fn test_rejects_zero_duration() {
        let config = MatchConfig {
            match_duration: 0.0,
            ..MatchConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::InvalidMatchDuration(0.0)));
    }

    #[test]
    fn test_rejects_single_player_match() {
        let config = MatchConfig {
            required_players: 1,
            ..MatchConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::InvalidRequiredPlayers(1)));
    }

    #[test]
    fn test_rejects_inverted_heights() {
        let config = MatchConfig {
            min_spawn_height: 4.0,
            max_spawn_height: 1.0,
            ..MatchConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvertedHeightRange { .. })
        ));
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            MatchConfig::from_json_str("{ not json"),
            Err(ConfigError::Parse(_))
        ));
    }
}
