//! Server Configuration
//!
//! Loaded from a `confy`-managed YAML file and overlaid with environment
//! variables for secrets (never stored in the config file). All tunables
//! that govern matchmaking, the tick scheduler, transport, and the safe zone
//! live here so they can be changed without a rebuild.

use serde::{Deserialize, Serialize};

use crate::error::{FatalError, ServerError};

/// Application-wide configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Port the matchmaking/REST API listens on.
    pub api_port: u16,
    /// Port the game WebSocket listens on.
    pub game_port: u16,
    /// Simulation tick rate, Hz.
    pub tick_hz: u32,
    /// Minimum players to form a match.
    pub min_players: u32,
    /// Maximum players per match.
    pub max_players: u32,

    /// Matchmaking starting rating tolerance.
    pub base_tol: i32,
    /// Per-expansion-step growth added to the tolerance.
    pub growth_rate: i32,
    /// Seconds between tolerance growth steps.
    pub growth_step_sec: u64,
    /// Tolerance ceiling.
    pub max_tol: i32,
    /// Seconds a ticket may wait before it's failed outright.
    pub queue_timeout_sec: u64,
    /// Seconds after which a match is forced with however many players are queued,
    /// provided at least `min_players` are present.
    pub force_match_sec: u64,

    /// Interest radius, fixed-point world units, for per-client snapshot filtering.
    pub interest_radius: i32,
    /// Ticks between forced full keyframes.
    pub keyframe_interval_ticks: u32,
    /// Maximum lag-compensation rewind, milliseconds.
    pub lag_comp_ms: u64,

    /// Seconds of inbound silence before a session is force-closed.
    pub idle_timeout_sec: u64,
    /// Outbound per-session queue depth before backpressure policy kicks in.
    pub outbound_queue: usize,
    /// Milliseconds to wait on a store call before treating it as transient failure.
    pub store_timeout_ms: u64,
    /// Seconds given to in-flight sessions to drain on shutdown.
    pub drain_grace_sec: u64,

    /// Seconds the safe zone holds at full radius before the first shrink.
    pub zone_hold_sec: u64,
    /// Seconds each shrink phase takes to interpolate to its target radius.
    pub zone_shrink_sec: u64,
    /// Multiplier applied to the current radius at the start of each shrink phase.
    pub zone_shrink_factor: f64,
    /// Radius at which the zone stops shrinking.
    pub final_radius: f64,

    /// `tracing-subscriber` env-filter string.
    pub log_filter: String,
    /// Address the metrics exporter binds to.
    pub metrics_bind: String,

    /// Comma-separated ephemeral store connection URLs. Secret; set via
    /// `SKIRMISH_STORE_URLS`, never written to the config file.
    #[serde(skip)]
    pub store_urls: Vec<String>,
    /// Shared secret / key material used by the configured [`crate::network::auth::AuthProvider`].
    /// Secret; set via `SKIRMISH_TOKEN_SECRET`, never written to the config file.
    #[serde(skip)]
    pub token_secret: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_port: 8081,
            game_port: 8080,
            tick_hz: 30,
            min_players: 8,
            max_players: 16,

            base_tol: 100,
            growth_rate: 50,
            growth_step_sec: 30,
            max_tol: 500,
            queue_timeout_sec: 300,
            force_match_sec: 60,

            interest_radius: crate::core::fixed::to_fixed(800.0),
            keyframe_interval_ticks: 30,
            lag_comp_ms: 350,

            idle_timeout_sec: 20,
            outbound_queue: 64,
            store_timeout_ms: 2000,
            drain_grace_sec: 10,

            zone_hold_sec: 120,
            zone_shrink_sec: 180,
            zone_shrink_factor: 0.6,
            final_radius: 150.0,

            log_filter: "info".to_string(),
            metrics_bind: "0.0.0.0:9100".to_string(),

            store_urls: Vec::new(),
            token_secret: None,
        }
    }
}

impl AppConfig {
    /// Application name `confy` uses to locate the config file on disk.
    const APP_NAME: &'static str = "skirmish-arena-server";

    /// Load the file-backed config, then overlay secret fields from the
    /// environment (these are never persisted by `confy::store`).
    pub fn load() -> Result<Self, ServerError> {
        let mut config: AppConfig = confy::load(Self::APP_NAME, None)
            .map_err(|e| ServerError::Fatal(FatalError::Config(e.to_string())))?;

        if let Ok(urls) = std::env::var("SKIRMISH_STORE_URLS") {
            config.store_urls = urls.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect();
        }
        config.token_secret = std::env::var("SKIRMISH_TOKEN_SECRET").ok();

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the server cannot safely start with.
    pub fn validate(&self) -> Result<(), ServerError> {
        if self.min_players == 0 || self.min_players > self.max_players {
            return Err(ServerError::Fatal(FatalError::Config(format!(
                "min_players ({}) must be nonzero and <= max_players ({})",
                self.min_players, self.max_players
            ))));
        }
        if self.tick_hz == 0 {
            return Err(ServerError::Fatal(FatalError::Config("tick_hz must be nonzero".into())));
        }
        if self.base_tol > self.max_tol {
            return Err(ServerError::Fatal(FatalError::Config("base_tol must not exceed max_tol".into())));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_internally_consistent() {
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_min_players_above_max() {
        let config = AppConfig { min_players: 20, max_players: 16, ..Default::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_tick_rate() {
        let config = AppConfig { tick_hz: 0, ..Default::default() };
        assert!(config.validate().is_err());
    }
}
