use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::duration::parse_duration;
use crate::error::VigilError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u32(profile: &str, key: &str, default: u32) -> u32 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_f64(profile: &str, key: &str, default: f64) -> f64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_duration(profile: &str, key: &str, default: Duration) -> Duration {
    profiled_env_opt(profile, key)
        .and_then(|v| parse_duration(&v))
        .unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub escalation: EscalationConfig,
    pub thresholds: Thresholds,
    pub modem: ModemConfig,
    pub contacts: ContactsConfig,
    pub vitals: VitalsConfig,
    pub fall_feed: FallFeedConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `VIGIL_PROFILE`. When set (e.g. `PROD`), every key
    /// is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("VIGIL_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            escalation: EscalationConfig::from_env_profiled(p),
            thresholds: Thresholds::from_env_profiled(p),
            modem: ModemConfig::from_env_profiled(p),
            contacts: ContactsConfig::from_env_profiled(p),
            vitals: VitalsConfig::from_env_profiled(p),
            fall_feed: FallFeedConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<(), VigilError> {
        let t = &self.thresholds;
        if !(0.0..=1.0).contains(&t.fall_confidence) {
            return Err(VigilError::Config(format!(
                "FALL_CONFIDENCE_THRESHOLD must be within [0, 1], got {}",
                t.fall_confidence
            )));
        }
        if self.escalation.max_pending_runs == 0 {
            return Err(VigilError::Config(
                "ESCALATION_MAX_PENDING_RUNS must be at least 1".to_string(),
            ));
        }
        if self.escalation.command_timeout.is_zero() {
            return Err(VigilError::Config(
                "MODEM_COMMAND_TIMEOUT must be non-zero".to_string(),
            ));
        }
        if self.vitals.poll_interval.is_zero() {
            return Err(VigilError::Config(
                "VITALS_POLL_INTERVAL must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!(
            "  escalation:  cooldown={:?}, hold={:?}, settle={:?}, command_timeout={:?}, max_pending_runs={}",
            self.escalation.cooldown,
            self.escalation.hold,
            self.escalation.settle,
            self.escalation.command_timeout,
            self.escalation.max_pending_runs
        );
        tracing::info!(
            "  thresholds:  fall>{}, temp<{}, o2<{}, hr<{}",
            self.thresholds.fall_confidence,
            self.thresholds.min_temperature,
            self.thresholds.min_oxygen,
            self.thresholds.min_heart_rate
        );
        tracing::info!("  modem:       device={}, baud={}", self.modem.device.display(), self.modem.baud);
        tracing::info!("  contacts:    file={}", self.contacts.path.display());
        tracing::info!(
            "  vitals:      url={}, interval={:?}",
            self.vitals.url.as_deref().unwrap_or("(disabled)"),
            self.vitals.poll_interval
        );
        tracing::info!("  fall feed:   {}", self.fall_feed.source);
    }

    /// Return a redacted view safe for status output (no credentials in URLs).
    pub fn redacted_summary(&self) -> serde_json::Value {
        serde_json::json!({
            "profile": self.profile_label(),
            "escalation": {
                "cooldown_secs": self.escalation.cooldown.as_secs_f64(),
                "hold_secs": self.escalation.hold.as_secs_f64(),
                "settle_secs": self.escalation.settle.as_secs_f64(),
                "command_timeout_secs": self.escalation.command_timeout.as_secs_f64(),
                "max_pending_runs": self.escalation.max_pending_runs,
            },
            "thresholds": self.thresholds,
            "modem": { "device": self.modem.device, "baud": self.modem.baud },
            "contacts": { "path": self.contacts.path },
            "vitals": {
                "configured": self.vitals.is_configured(),
                "poll_interval_secs": self.vitals.poll_interval.as_secs_f64(),
                "has_token": self.vitals.auth_token.is_some(),
            },
            "fall_feed": { "source": self.fall_feed.source },
        })
    }
}

// ── Escalation ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationConfig {
    /// Minimum spacing between escalations for the same cooldown key.
    pub cooldown: Duration,
    /// How long the line stays open after a dial is accepted.
    pub hold: Duration,
    /// Post-hangup delay before the modem accepts the next dial.
    pub settle: Duration,
    /// Upper bound on waiting for a single command's response.
    pub command_timeout: Duration,
    /// Pending call runs kept before the oldest is dropped.
    pub max_pending_runs: usize,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_secs(30),
            hold: Duration::from_secs(10),
            settle: Duration::from_secs(5),
            command_timeout: Duration::from_secs(3),
            max_pending_runs: 32,
        }
    }
}

impl EscalationConfig {
    fn from_env_profiled(p: &str) -> Self {
        let d = Self::default();
        Self {
            cooldown: profiled_env_duration(p, "ESCALATION_COOLDOWN", d.cooldown),
            hold: profiled_env_duration(p, "CALL_HOLD", d.hold),
            settle: profiled_env_duration(p, "CALL_SETTLE", d.settle),
            command_timeout: profiled_env_duration(p, "MODEM_COMMAND_TIMEOUT", d.command_timeout),
            max_pending_runs: profiled_env_u32(p, "ESCALATION_MAX_PENDING_RUNS", d.max_pending_runs as u32)
                as usize,
        }
    }
}

// ── Thresholds ────────────────────────────────────────────────

/// Danger bounds. Fall confidence must exceed its bound; vitals must fall
/// below theirs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub fall_confidence: f64,
    /// °C
    pub min_temperature: f64,
    /// %
    pub min_oxygen: f64,
    /// BPM
    pub min_heart_rate: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            fall_confidence: 0.5,
            min_temperature: 36.0,
            min_oxygen: 92.0,
            min_heart_rate: 50.0,
        }
    }
}

impl Thresholds {
    fn from_env_profiled(p: &str) -> Self {
        let d = Self::default();
        Self {
            fall_confidence: profiled_env_f64(p, "FALL_CONFIDENCE_THRESHOLD", d.fall_confidence),
            min_temperature: profiled_env_f64(p, "MIN_TEMPERATURE_C", d.min_temperature),
            min_oxygen: profiled_env_f64(p, "MIN_OXYGEN_PCT", d.min_oxygen),
            min_heart_rate: profiled_env_f64(p, "MIN_HEART_RATE_BPM", d.min_heart_rate),
        }
    }
}

// ── Modem ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModemConfig {
    pub device: PathBuf,
    /// Line speed the device node is expected to be configured for.
    pub baud: u32,
}

impl ModemConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            device: PathBuf::from(profiled_env_or(p, "MODEM_DEVICE", "/dev/ttyAMA0")),
            baud: profiled_env_u32(p, "MODEM_BAUD", 115_200),
        }
    }
}

// ── Contacts ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactsConfig {
    pub path: PathBuf,
}

impl ContactsConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            path: PathBuf::from(profiled_env_or(p, "CONTACTS_FILE", "phone_num.txt")),
        }
    }
}

// ── Vital data store ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VitalsConfig {
    /// REST endpoint returning the per-subject records. Polling is disabled
    /// when unset.
    pub url: Option<String>,
    pub auth_token: Option<String>,
    pub poll_interval: Duration,
    /// Floor between fall-triggered confirmation polls.
    pub confirm_min_interval: Duration,
}

impl VitalsConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            url: profiled_env_opt(p, "VITALS_URL"),
            auth_token: profiled_env_opt(p, "VITALS_AUTH_TOKEN"),
            poll_interval: profiled_env_duration(p, "VITALS_POLL_INTERVAL", Duration::from_secs(5)),
            confirm_min_interval: profiled_env_duration(
                p,
                "VITALS_CONFIRM_MIN_INTERVAL",
                Duration::from_secs(1),
            ),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.url.is_some()
    }
}

// ── Fall feed ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallFeedConfig {
    /// Path of the detection feed, or `-` for stdin.
    pub source: String,
}

impl FallFeedConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            source: profiled_env_or(p, "FALL_FEED", "-"),
        }
    }

    pub fn is_stdin(&self) -> bool {
        self.source == "-"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Keys are namespaced with a unique profile so parallel tests never
    // observe each other's variables.

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::for_profile("VIGILTESTDEFAULTS");
        // Unprefixed keys may be set by the developer's shell; only assert on
        // keys nobody sets globally.
        assert_eq!(Thresholds::default().fall_confidence, 0.5);
        assert_eq!(EscalationConfig::default().cooldown, Duration::from_secs(30));
        assert_eq!(EscalationConfig::default().hold, Duration::from_secs(10));
        assert_eq!(EscalationConfig::default().settle, Duration::from_secs(5));
        assert_eq!(config.profile_label(), "VIGILTESTDEFAULTS");
    }

    #[test]
    fn profiled_keys_take_precedence() {
        env::set_var("VIGILTESTPREC_ESCALATION_COOLDOWN", "1m");
        env::set_var("VIGILTESTPREC_MIN_OXYGEN_PCT", "90.5");
        env::set_var("VIGILTESTPREC_MODEM_DEVICE", "/dev/ttyUSB2");

        let config = Config::for_profile("vigiltestprec");
        assert_eq!(config.profile, "VIGILTESTPREC");
        assert_eq!(config.escalation.cooldown, Duration::from_secs(60));
        assert_eq!(config.thresholds.min_oxygen, 90.5);
        assert_eq!(config.modem.device, PathBuf::from("/dev/ttyUSB2"));
    }

    #[test]
    fn unparseable_duration_falls_back_to_default() {
        env::set_var("VIGILTESTBAD_CALL_HOLD", "a while");
        let config = Config::for_profile("VIGILTESTBAD");
        assert_eq!(config.escalation.hold, Duration::from_secs(10));
    }

    #[test]
    fn validate_rejects_out_of_range_confidence() {
        let mut config = Config::for_profile("VIGILTESTVALIDATE");
        config.thresholds.fall_confidence = 1.5;
        assert!(matches!(config.validate(), Err(VigilError::Config(_))));

        config.thresholds.fall_confidence = 0.5;
        config.escalation.max_pending_runs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn redacted_summary_hides_token() {
        let mut config = Config::for_profile("VIGILTESTREDACT");
        config.vitals.auth_token = Some("secret-token".to_string());
        let summary = config.redacted_summary().to_string();
        assert!(!summary.contains("secret-token"));
        assert!(summary.contains("\"has_token\":true"));
    }
}
