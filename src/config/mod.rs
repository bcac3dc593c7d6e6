//! Configuration for the engine and its CLI.
//!
//! A single TOML file with two layers:
//!
//! - top-level runtime settings (backend URL, screen geometry, output format)
//! - a `[scenario]` table with the operational constants of the deployment:
//!   the special-object name, the downable-target name, path coordinates,
//!   overlay colors, border geometry and interception parameters.
//!
//! Every field has a default, so an absent file or an empty table yields a
//! fully working configuration. Precedence: CLI flag > config file > default.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::models::LatLng;
use crate::{Error, Result};

/// Output format for CLI commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Json,
    Human,
}

impl std::str::FromStr for OutputFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "human" => Ok(OutputFormat::Human),
            other => Err(Error::InvalidInput(format!(
                "unknown output format '{other}' (expected 'json' or 'human')"
            ))),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the backend serving chat, summaries and object mutations.
    pub api_base_url: String,
    /// Logical screen width, used to place the detached popup window.
    pub screen_width: f64,
    pub popup_width: f64,
    pub popup_height: f64,
    pub popup_margin_right: f64,
    pub popup_margin_top: f64,
    pub output_format: OutputFormat,
    pub scenario: ScenarioRules,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:3001".to_string(),
            screen_width: 1920.0,
            popup_width: 450.0,
            popup_height: 700.0,
            popup_margin_right: 100.0,
            popup_margin_top: 100.0,
            output_format: OutputFormat::default(),
            scenario: ScenarioRules::default(),
        }
    }
}

impl Config {
    /// Load from `path`, or return defaults when the file does not exist.
    pub fn load(path: Option<&Path>) -> Result<Config> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match Self::default_path() {
                Some(p) => p,
                None => return Ok(Config::default()),
            },
        };
        if !path.exists() {
            return Ok(Config::default());
        }
        let text = std::fs::read_to_string(&path)?;
        let config: Config = toml::from_str(&text)?;
        Ok(config)
    }

    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("skywatch").join("config.toml"))
    }
}

/// Operational constants that drive the scripted parts of a scenario.
///
/// These are deployment data, not code: a different theatre swaps this table
/// without touching the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioRules {
    /// Name of the object that triggers the synthetic approach-path overlay.
    pub special_object_name: String,
    /// Name of the target class that can be marked as downed.
    pub downable_object_name: String,
    /// Chat sender whose messages render without a sender prefix.
    pub classification_sender: String,
    /// Base path of the overlay, most recent point first. Stored as
    /// `(lat, lng)` pairs.
    pub special_path: Vec<(f64, f64)>,
    /// Offset applied to each base point to produce its companion point.
    pub companion_offset_deg: f64,
    /// Milliseconds between synthetic plot timestamps, newest to oldest.
    pub special_plot_spacing_ms: i64,
    /// Age of the oldest synthetic plot, in milliseconds before now.
    pub special_plot_base_age_ms: i64,
    pub special_point_color: String,
    pub special_path_color: String,
    /// Attempts to place the overlay before giving up (the surface may not
    /// be ready when the update arrives).
    pub special_retry_attempts: u32,
    pub special_retry_interval_ms: i64,
    /// Tracks with no update for this long are dropped.
    pub expiry_ms: i64,
    /// Smoothing window (samples) for rendered trails.
    pub smoothing_window: usize,
    /// Maximum number of concurrently open per-object chat sessions.
    pub max_object_chats: usize,
    /// Border polyline in WKT `LINESTRING` form, used for arrival countdowns.
    pub border_wkt: String,
    /// Fixed border countdown for the downable target, in seconds.
    pub fixed_border_countdown_secs: i64,
    /// Interception impact point.
    pub impact_point: LatLng,
    /// Interceptor speed in knots.
    pub interceptor_speed_knots: f64,
    /// Delay before the combined step answer is revealed, in milliseconds.
    pub step_reveal_delay_ms: i64,
    /// Delay before the interception briefing is appended, in milliseconds.
    pub briefing_delay_ms: i64,
    /// Poll interval for backend system messages while voice is active.
    pub system_message_poll_ms: i64,
    /// Number of trailing messages sent with a primary-chat question, per
    /// role.
    pub history_per_role: usize,
    /// Number of trailing messages sent with a popup-chat question.
    pub popup_history: usize,
    /// Number of trailing messages included in a summary request.
    pub summary_history: usize,
}

impl Default for ScenarioRules {
    fn default() -> Self {
        Self {
            special_object_name: "ב149".to_string(),
            downable_object_name: "טיל שיוט".to_string(),
            classification_sender: "Classification System".to_string(),
            special_path: vec![
                (33.236677, 35.430565),
                (33.244143, 35.432281),
                (33.252757, 35.445328),
                (33.260508, 35.445671),
            ],
            companion_offset_deg: 0.00045,
            special_plot_spacing_ms: 500,
            special_plot_base_age_ms: 8000,
            special_point_color: "#7ec8ff".to_string(),
            special_path_color: "#bfe5ff".to_string(),
            special_retry_attempts: 12,
            special_retry_interval_ms: 150,
            expiry_ms: 50_000,
            smoothing_window: 5,
            max_object_chats: 3,
            border_wkt: DEFAULT_BORDER_WKT.to_string(),
            fixed_border_countdown_secs: 105,
            impact_point: LatLng {
                lat: 32.176194,
                lng: 35.559311,
            },
            interceptor_speed_knots: 1323.0,
            step_reveal_delay_ms: 300,
            briefing_delay_ms: 400,
            system_message_poll_ms: 2000,
            history_per_role: 10,
            popup_history: 20,
            summary_history: 24,
        }
    }
}

/// Default border polyline used for arrival countdowns.
pub const DEFAULT_BORDER_WKT: &str = "LINESTRING (35.114365 33.09902, 35.294266 33.111674, 35.321732 33.103621, 35.332031 33.084638, 35.352631 33.062773, 35.378723 33.060471, 35.395889 33.0645, 35.428848 33.069103, 35.443954 33.090966, 35.46936 33.094993, 35.49408 33.094993, 35.499573 33.116275, 35.527725 33.124901, 35.527725 33.142151, 35.540771 33.191582, 35.533905 33.213414, 35.537338 33.234093, 35.544891 33.255341, 35.559311 33.267972, 35.564117 33.286916, 35.584717 33.285194, 35.597076 33.258786, 35.608749 33.250747, 35.625229 33.24443, 35.619736 33.274861, 35.643768 33.282324, 35.657501 33.279454, 35.721359 33.325365, 35.772171 33.337412, 35.811996 33.321349, 35.785217 33.280028, 35.816803 33.246153, 35.855255 33.1502, 35.816803 33.121451, 35.851135 33.104197, 35.875854 32.983324, 35.893707 32.939539, 35.847015 32.871514, 35.842896 32.827673, 35.804443 32.779193, 35.653381 32.678685, 35.562744 32.630123, 35.562744 31.751525, 35.408936 31.264466, 35.463867 31.142305, 35.425415 30.939924, 35.343018 30.822064, 35.172729 30.472349, 35.183716 30.368136, 35.167236 30.102366, 34.920044 29.473079, 34.84314 29.654642, 34.848633 29.750071, 34.595947 30.377614, 34.524536 30.424993, 34.551315 30.502526, 34.504623 30.539199, 34.51973 30.596548, 34.271851 31.236289, 34.335022 31.282072, 34.373474 31.303195, 34.363861 31.370054, 34.370728 31.385296, 34.443169 31.444774, 34.565735 31.539919, 34.29245 31.709476, 34.705811 32.916485, 34.84314 33.022482, 34.876099 33.169744, 35.11282 33.098876)";
