//! Process-wide configuration, loaded from environment variables with
//! documented defaults (see §6 of the interaction-gateway spec).

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "d_port")]
    pub port: u16,
    #[serde(default = "d_frontend_url")]
    pub frontend_url: String,
    #[serde(default = "d_log_level")]
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: d_port(),
            frontend_url: d_frontend_url(),
            log_level: d_log_level(),
        }
    }
}

fn d_port() -> u16 {
    3000
}
fn d_frontend_url() -> String {
    "http://localhost:5173".into()
}
fn d_log_level() -> String {
    "info".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomConfig {
    #[serde(default = "d_max_rooms")]
    pub max_rooms_per_server: usize,
    #[serde(default = "d_turn_time_limit_ms")]
    pub turn_time_limit_ms: u64,
    #[serde(default = "d_room_inactivity_timeout_ms")]
    pub room_inactivity_timeout_ms: u64,
    /// Not independently configurable via env in §6; tracked here because
    /// RoomManager needs it and the spec names a concrete default (60s).
    #[serde(default = "d_reconnect_grace_ms")]
    pub reconnect_grace_ms: u64,
    /// Background snapshot cadence (spec default: 5s).
    #[serde(default = "d_snapshot_interval_ms")]
    pub snapshot_interval_ms: u64,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            max_rooms_per_server: d_max_rooms(),
            turn_time_limit_ms: d_turn_time_limit_ms(),
            room_inactivity_timeout_ms: d_room_inactivity_timeout_ms(),
            reconnect_grace_ms: d_reconnect_grace_ms(),
            snapshot_interval_ms: d_snapshot_interval_ms(),
        }
    }
}

fn d_max_rooms() -> usize {
    1_000
}
fn d_turn_time_limit_ms() -> u64 {
    90_000
}
fn d_room_inactivity_timeout_ms() -> u64 {
    1_800_000
}
fn d_reconnect_grace_ms() -> u64 {
    60_000
}
fn d_snapshot_interval_ms() -> u64 {
    5_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSocketConfig {
    #[serde(default = "d_ws_heartbeat_ms")]
    pub heartbeat_interval_ms: u64,
    #[serde(default = "d_ws_connection_timeout_ms")]
    pub connection_timeout_ms: u64,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: d_ws_heartbeat_ms(),
            connection_timeout_ms: d_ws_connection_timeout_ms(),
        }
    }
}

fn d_ws_heartbeat_ms() -> u64 {
    30_000
}
fn d_ws_connection_timeout_ms() -> u64 {
    60_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "d_rate_limit_window_ms")]
    pub window_ms: u64,
    #[serde(default = "d_rate_limit_max_requests")]
    pub max_requests: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_ms: d_rate_limit_window_ms(),
            max_requests: d_rate_limit_max_requests(),
        }
    }
}

fn d_rate_limit_window_ms() -> u64 {
    60_000
}
fn d_rate_limit_max_requests() -> u32 {
    100
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatcherConfig {
    #[serde(default = "d_batch_size")]
    pub max_batch_size: usize,
    #[serde(default = "d_batch_timeout_ms")]
    pub batch_delay_ms: u64,
    /// Not independently configurable via env in §6; spec default 100.
    #[serde(default = "d_max_queue_size")]
    pub max_queue_size: usize,
    /// Not independently configurable via env in §6; spec default 5.
    #[serde(default = "d_priority_threshold")]
    pub priority_threshold: i32,
}

impl Default for BatcherConfig {
    fn default() -> Self {
        Self {
            max_batch_size: d_batch_size(),
            batch_delay_ms: d_batch_timeout_ms(),
            max_queue_size: d_max_queue_size(),
            priority_threshold: d_priority_threshold(),
        }
    }
}

fn d_batch_size() -> usize {
    25
}
fn d_batch_timeout_ms() -> u64 {
    50
}
fn d_max_queue_size() -> usize {
    100
}
fn d_priority_threshold() -> i32 {
    5
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    #[serde(default = "d_health_check_timeout_ms")]
    pub check_timeout_ms: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            check_timeout_ms: d_health_check_timeout_ms(),
        }
    }
}

fn d_health_check_timeout_ms() -> u64 {
    5_000
}

/// Pluggable rule-system literals (§9: "the surrounding rule system is
/// treated as pluggable"). Not named in §6's env var list; exposed anyway
/// as a documented extension of the same env-driven config surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleConfig {
    #[serde(default = "d_movement_budget")]
    pub movement_budget: i64,
    #[serde(default = "d_attack_range")]
    pub attack_range: i64,
    #[serde(default = "d_healing_amount")]
    pub healing_amount: i64,
}

impl Default for RuleConfig {
    fn default() -> Self {
        Self {
            movement_budget: d_movement_budget(),
            attack_range: d_attack_range(),
            healing_amount: d_healing_amount(),
        }
    }
}

fn d_movement_budget() -> i64 {
    6
}
fn d_attack_range() -> i64 {
    5
}
fn d_healing_amount() -> i64 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionConfig {
    pub max_per_user: usize,
    pub ttl_ms: u64,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            max_per_user: 10,
            ttl_ms: 1_800_000,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub rooms: RoomConfig,
    #[serde(default)]
    pub websocket: WebSocketConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub batcher: BatcherConfig,
    #[serde(default)]
    pub health: HealthConfig,
    #[serde(default)]
    pub rules: RuleConfig,
    #[serde(default)]
    pub subscriptions: SubscriptionConfig,
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u32(name: &str, default: u32) -> u32 {
    std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_usize(name: &str, default: usize) -> usize {
    std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_string(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_owned())
}

impl Config {
    /// Build config from process environment variables, falling back to
    /// the documented defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        Self {
            server: ServerConfig {
                port: env_u64("PORT", d_port() as u64) as u16,
                frontend_url: env_string("FRONTEND_URL", &d_frontend_url()),
                log_level: env_string("LOG_LEVEL", &d_log_level()),
            },
            rooms: RoomConfig {
                max_rooms_per_server: env_usize("MAX_ROOMS_PER_SERVER", d_max_rooms()),
                turn_time_limit_ms: env_u64("TURN_TIME_LIMIT", d_turn_time_limit_ms()),
                room_inactivity_timeout_ms: env_u64(
                    "ROOM_INACTIVITY_TIMEOUT",
                    d_room_inactivity_timeout_ms(),
                ),
                ..RoomConfig::default()
            },
            websocket: WebSocketConfig {
                heartbeat_interval_ms: env_u64("WS_HEARTBEAT_INTERVAL", d_ws_heartbeat_ms()),
                connection_timeout_ms: env_u64(
                    "WS_CONNECTION_TIMEOUT",
                    d_ws_connection_timeout_ms(),
                ),
            },
            rate_limit: RateLimitConfig {
                window_ms: env_u64("RATE_LIMIT_WINDOW", d_rate_limit_window_ms()),
                max_requests: env_u32("RATE_LIMIT_MAX_REQUESTS", d_rate_limit_max_requests()),
            },
            batcher: BatcherConfig {
                max_batch_size: env_usize("MESSAGE_BATCH_SIZE", d_batch_size()),
                batch_delay_ms: env_u64("MESSAGE_BATCH_TIMEOUT", d_batch_timeout_ms()),
                ..BatcherConfig::default()
            },
            health: HealthConfig {
                check_timeout_ms: env_u64("HEALTH_CHECK_TIMEOUT", d_health_check_timeout_ms()),
            },
            rules: RuleConfig {
                movement_budget: env_u64("MOVEMENT_BUDGET", d_movement_budget() as u64) as i64,
                attack_range: env_u64("ATTACK_RANGE", d_attack_range() as u64) as i64,
                healing_amount: env_u64("HEALING_AMOUNT", d_healing_amount() as u64) as i64,
            },
            subscriptions: SubscriptionConfig::default(),
        }
    }

    /// Validate configured values, returning a list of issues. Errors
    /// should prevent startup; warnings are logged and ignored.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        if self.rooms.max_rooms_per_server == 0 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                message: "rooms.max_rooms_per_server must be > 0".into(),
            });
        }
        if self.rooms.turn_time_limit_ms == 0 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                message: "rooms.turn_time_limit_ms must be > 0".into(),
            });
        }
        if self.batcher.max_batch_size == 0 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                message: "batcher.max_batch_size must be > 0".into(),
            });
        }
        if self.batcher.priority_threshold < 0 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Warning,
                message: "batcher.priority_threshold is negative; every message will flush immediately".into(),
            });
        }
        if self.rate_limit.max_requests == 0 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Warning,
                message: "rate_limit.max_requests is 0; every request will be rate limited".into(),
            });
        }

        issues
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Warning,
    Error,
}

#[derive(Debug, Clone)]
pub struct ConfigIssue {
    pub severity: ConfigSeverity,
    pub message: String,
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_port_is_3000() {
        let config = Config::default();
        assert_eq!(config.server.port, 3000);
    }

    #[test]
    fn default_has_no_validation_errors() {
        let config = Config::default();
        let issues = config.validate();
        assert!(issues.iter().all(|i| i.severity != ConfigSeverity::Error));
    }

    #[test]
    fn zero_max_rooms_is_an_error() {
        let mut config = Config::default();
        config.rooms.max_rooms_per_server = 0;
        let issues = config.validate();
        assert!(issues.iter().any(|i| i.severity == ConfigSeverity::Error));
    }

    #[test]
    fn rule_defaults_match_spec_literals() {
        let config = Config::default();
        assert_eq!(config.rules.movement_budget, 6);
        assert_eq!(config.rules.attack_range, 5);
        assert_eq!(config.rules.healing_amount, 10);
    }
}
