// src/widget/options.rs
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Screen corner the widget is pinned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Position {
    #[default]
    BottomRight,
    BottomLeft,
    TopRight,
    TopLeft,
}

impl Position {
    pub fn as_str(self) -> &'static str {
        match self {
            Position::BottomRight => "bottom-right",
            Position::BottomLeft => "bottom-left",
            Position::TopRight => "top-right",
            Position::TopLeft => "top-left",
        }
    }
}

fn default_primary_color() -> String {
    "#3b82f6".to_string()
}

fn default_endpoint() -> String {
    "http://localhost:8000/api/nps-responses".to_string()
}

/// Options accepted by `init`. Validated once, then shared read-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetOptions {
    pub api_key: String,
    #[serde(default)]
    pub position: Position,
    #[serde(default = "default_primary_color")]
    pub primary_color: String,
    /// Milliseconds before the widget first shows.
    #[serde(default)]
    pub delay: u64,
    /// Suppress redisplay once a response has been submitted.
    #[serde(default)]
    pub show_once: bool,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OptionsError {
    #[error("apiKey must not be empty")]
    MissingApiKey,
    #[error("primaryColor '{0}' is not a #rgb or #rrggbb colour")]
    InvalidColor(String),
    #[error("endpoint '{0}' is not an http(s) URL")]
    InvalidEndpoint(String),
}

static HEX_COLOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^#(?:[0-9a-fA-F]{3}|[0-9a-fA-F]{6})$").expect("hex colour regex"));

impl WidgetOptions {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            position: Position::default(),
            primary_color: default_primary_color(),
            delay: 0,
            show_once: false,
            endpoint: default_endpoint(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_show_once(mut self, on: bool) -> Self {
        self.show_once = on;
        self
    }

    pub fn display_delay(&self) -> Duration {
        Duration::from_millis(self.delay)
    }

    pub fn validate(&self) -> Result<(), OptionsError> {
        if self.api_key.trim().is_empty() {
            return Err(OptionsError::MissingApiKey);
        }
        if !HEX_COLOR.is_match(&self.primary_color) {
            return Err(OptionsError::InvalidColor(self.primary_color.clone()));
        }
        match reqwest::Url::parse(&self.endpoint) {
            Ok(u) if matches!(u.scheme(), "http" | "https") => Ok(()),
            _ => Err(OptionsError::InvalidEndpoint(self.endpoint.clone())),
        }
    }
}

/// Host page the widget runs in; copied into every submission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageContext {
    pub url: Option<String>,
    pub user_agent: Option<String>,
}

/// Persisted "already answered" flag behind `showOnce`.
pub trait ShownFlag: Send + Sync {
    fn is_set(&self) -> bool;
    fn set(&self);
}

#[derive(Debug, Clone, Default)]
pub struct MemoryShownFlag(Arc<AtomicBool>);

impl ShownFlag for MemoryShownFlag {
    fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Flag kept as a marker file, surviving restarts of the host process.
#[derive(Debug, Clone)]
pub struct FileShownFlag {
    path: PathBuf,
}

impl FileShownFlag {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ShownFlag for FileShownFlag {
    fn is_set(&self) -> bool {
        self.path.exists()
    }

    fn set(&self) {
        if let Some(parent) = self.path.parent() {
            let _ = fs::create_dir_all(parent);
        }
        if let Err(e) = fs::write(&self.path, b"true") {
            tracing::warn!(target: "widget", error = %e, path = %self.path.display(), "could not persist shown flag");
        }
    }
}

/// Whether a widget with these options should be displayed at all.
pub fn should_display(options: &WidgetOptions, flag: &dyn ShownFlag) -> bool {
    !(options.show_once && flag.is_set())
}
