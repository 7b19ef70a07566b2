//! Client configuration loaded from environment variables.
//!
//! Every setting has a default except the backend URL and anon key, which
//! [`ClientConfig::validate`] insists on before any client is built.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use fieldreport_shared::constants::{
    DEFAULT_COMPLETION_MODEL, DEFAULT_COMPLETION_URL, DEFAULT_HEARTBEAT_SECS,
};
use fieldreport_store::{Database, StoreError};

use crate::submit::SubmissionPolicy;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing setting: {0}")]
    Missing(&'static str),

    #[error("Invalid setting: {0}")]
    Invalid(String),
}

/// Client configuration.
#[derive(Clone)]
pub struct ClientConfig {
    /// Base URL of the hosted backend project.
    /// Env: `SUPABASE_URL` or `EXPO_PUBLIC_SUPABASE_URL`
    pub backend_url: String,

    /// Public (anon) API key of the backend project.
    /// Env: `SUPABASE_ANON_KEY` or `EXPO_PUBLIC_SUPABASE_ANON_KEY`
    pub anon_key: String,

    /// Chat-completion endpoint.
    /// Env: `COMPLETION_URL`
    pub completion_url: String,

    /// Env: `COMPLETION_MODEL`
    pub completion_model: String,

    /// Env: `OPENROUTER_API_KEY`
    /// Default: none (instructions fall back to the canned text).
    pub completion_api_key: Option<String>,

    /// Whether a GPS location is mandatory before submitting.
    /// Env: `REQUIRE_GPS` (true/false)
    /// Default: `false`
    pub require_gps: bool,

    /// Whether reports may carry an uploaded image.
    /// Env: `ALLOW_IMAGE_UPLOAD` (true/false)
    /// Default: `true`
    pub allow_image_upload: bool,

    /// Session database location.
    /// Env: `SESSION_DB_PATH`
    /// Default: platform data directory.
    pub session_db_path: Option<PathBuf>,

    /// Env: `REALTIME_HEARTBEAT_SECS`
    pub heartbeat_secs: u64,
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("backend_url", &self.backend_url)
            .field("anon_key_set", &!self.anon_key.is_empty())
            .field("completion_url", &self.completion_url)
            .field("completion_model", &self.completion_model)
            .field("completion_api_key_set", &self.completion_api_key.is_some())
            .field("require_gps", &self.require_gps)
            .field("allow_image_upload", &self.allow_image_upload)
            .field("session_db_path", &self.session_db_path)
            .field("heartbeat_secs", &self.heartbeat_secs)
            .finish()
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            backend_url: String::new(),
            anon_key: String::new(),
            completion_url: DEFAULT_COMPLETION_URL.to_string(),
            completion_model: DEFAULT_COMPLETION_MODEL.to_string(),
            completion_api_key: None,
            require_gps: false,
            allow_image_upload: true,
            session_db_path: None,
            heartbeat_secs: DEFAULT_HEARTBEAT_SECS,
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ClientConfig::from_env`] with an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        let first = |keys: &[&str]| keys.iter().find_map(|k| lookup(k).filter(|v| !v.is_empty()));

        if let Some(url) = first(&["SUPABASE_URL", "EXPO_PUBLIC_SUPABASE_URL"]) {
            config.backend_url = url.trim().to_string();
        }

        if let Some(key) = first(&["SUPABASE_ANON_KEY", "EXPO_PUBLIC_SUPABASE_ANON_KEY"]) {
            config.anon_key = key.trim().to_string();
        }

        if let Some(url) = first(&["COMPLETION_URL"]) {
            config.completion_url = url;
        }

        if let Some(model) = first(&["COMPLETION_MODEL"]) {
            config.completion_model = model;
        }

        config.completion_api_key = first(&["OPENROUTER_API_KEY"]);

        if let Some(val) = first(&["REQUIRE_GPS"]) {
            config.require_gps = parse_flag(&val, config.require_gps);
        }

        if let Some(val) = first(&["ALLOW_IMAGE_UPLOAD"]) {
            config.allow_image_upload = parse_flag(&val, config.allow_image_upload);
        }

        if let Some(path) = first(&["SESSION_DB_PATH"]) {
            config.session_db_path = Some(PathBuf::from(path));
        }

        if let Some(val) = first(&["REALTIME_HEARTBEAT_SECS"]) {
            match val.parse::<u64>() {
                Ok(n) if n > 0 => config.heartbeat_secs = n,
                _ => tracing::warn!(value = %val, "Invalid REALTIME_HEARTBEAT_SECS, using default"),
            }
        }

        config
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backend_url.is_empty() {
            return Err(ConfigError::Missing("SUPABASE_URL"));
        }
        if !(self.backend_url.starts_with("https://") || self.backend_url.starts_with("http://")) {
            return Err(ConfigError::Invalid(format!(
                "backend URL must be http(s): {}",
                self.backend_url
            )));
        }
        if self.anon_key.is_empty() {
            return Err(ConfigError::Missing("SUPABASE_ANON_KEY"));
        }
        Ok(())
    }

    pub fn submission_policy(&self) -> SubmissionPolicy {
        SubmissionPolicy {
            require_gps: self.require_gps,
            allow_image: self.allow_image_upload,
        }
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs.max(1))
    }

    pub fn open_session_db(&self) -> Result<Database, StoreError> {
        match &self.session_db_path {
            Some(path) => Database::open_at(path),
            None => Database::new(),
        }
    }
}

fn parse_flag(val: &str, default: bool) -> bool {
    match val.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => {
            tracing::warn!(value = %val, "Unrecognised boolean setting, using default");
            default
        }
    }
}
