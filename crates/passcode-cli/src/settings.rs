//! Layered settings: optional TOML file, then `PASSCODE_*` environment
//! variables.

use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use config::{ConfigBuilder, builder::DefaultState};
use passcode_core::{config::OtpConfig, notify::MessageTemplate};
use passcode_notify::TwilioConfig;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
  /// SQLite database file; a leading `~/` is expanded.
  #[serde(default = "default_store_path")]
  pub store_path: PathBuf,
  #[serde(default)]
  pub otp:        OtpConfig,
  #[serde(default)]
  pub notifier:   NotifierSettings,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
  #[default]
  Log,
  Twilio,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotifierSettings {
  #[serde(default)]
  pub backend:  BackendKind,
  #[serde(default = "default_template")]
  pub template: String,
  /// Required when `backend = "twilio"`.
  pub twilio:   Option<TwilioConfig>,
}

impl Default for NotifierSettings {
  fn default() -> Self {
    Self { backend: BackendKind::default(), template: default_template(), twilio: None }
  }
}

fn default_store_path() -> PathBuf { PathBuf::from("passcode.db") }

fn default_template() -> String { MessageTemplate::DEFAULT.to_owned() }

impl Settings {
  /// Read `path` (if it exists) and overlay the environment.
  pub fn load(path: &Path) -> Result<Self> {
    let builder = config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(
        config::Environment::with_prefix("PASSCODE")
          .prefix_separator("_")
          .separator("__")
          .try_parsing(true),
      );
    Self::build(builder)
  }

  fn build(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
    let settings: Self = builder
      .build()
      .context("failed to read config file")?
      .try_deserialize()
      .context("failed to deserialise settings")?;
    settings.otp.validate().context("invalid [otp] settings")?;
    Ok(settings)
  }

  pub fn template(&self) -> Result<MessageTemplate> {
    MessageTemplate::new(self.notifier.template.clone()).context("invalid notifier.template")
  }

  /// `store_path` with a leading `~/` replaced by `$HOME`.
  pub fn store_path(&self) -> PathBuf { expand_tilde(&self.store_path) }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
