//! Host configuration.
//!
//! Three options shape the host: which program to run, whether the console
//! art surrounds the screen, and whether the window is fullscreen. Changes go
//! through [`HostConfig::reconfigure`], which reports what has to happen for
//! the change to take effect.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;
use thiserror::Error;

/// What surrounds the screen.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Background {
    /// Console art with touchable controls.
    #[default]
    Console,
    /// Bare screen, no pointer regions.
    None,
}

impl FromStr for Background {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "console" => Ok(Self::Console),
            "none" => Ok(Self::None),
            _ => Err(ConfigError::InvalidValue {
                option: "background".into(),
                value: s.into(),
            }),
        }
    }
}

impl fmt::Display for Background {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Console => "console",
            Self::None => "none",
        })
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown option `{0}`")]
    UnknownOption(String),

    #[error("invalid value `{value}` for option `{option}`")]
    InvalidValue { option: String, value: String },

    #[error("cannot read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("malformed config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Something the host must do after a configuration change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigEffect {
    /// Acquire and load the configured source.
    Reload,
    /// Rebuild the surface for the new background.
    Relayout,
    /// Enter (`true`) or leave fullscreen.
    Fullscreen(bool),
}

/// The recognised options.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HostConfig {
    /// Path or URL of the program image.
    pub source: Option<String>,
    pub background: Background,
    pub fullscreen: bool,
}

impl HostConfig {
    /// Replace the whole configuration, returning the effects of what changed.
    pub fn reconfigure(&mut self, new: Self) -> Vec<ConfigEffect> {
        let mut effects = Vec::new();
        if new.source != self.source && new.source.is_some() {
            effects.push(ConfigEffect::Reload);
        }
        if new.background != self.background {
            effects.push(ConfigEffect::Relayout);
        }
        if new.fullscreen != self.fullscreen {
            effects.push(ConfigEffect::Fullscreen(new.fullscreen));
        }
        *self = new;
        effects
    }

    /// Set one option from its string form.
    ///
    /// Setting `source` always reloads, even to the same value. On error the
    /// configuration is unchanged.
    pub fn set_option(&mut self, name: &str, value: &str) -> Result<Vec<ConfigEffect>, ConfigError> {
        let mut new = self.clone();
        match name {
            "source" | "src" => {
                let value = value.trim();
                if value.is_empty() {
                    return Err(ConfigError::InvalidValue {
                        option: name.into(),
                        value: value.into(),
                    });
                }
                new.source = Some(value.to_owned());
                let resend = new.source == self.source;
                let mut effects = self.reconfigure(new);
                if resend {
                    effects.insert(0, ConfigEffect::Reload);
                }
                return Ok(effects);
            }
            "background" => new.background = value.parse()?,
            "fullscreen" => new.fullscreen = parse_flag(name, value)?,
            _ => return Err(ConfigError::UnknownOption(name.into())),
        }
        Ok(self.reconfigure(new))
    }
}

/// Attribute-style boolean: present-but-empty means true.
fn parse_flag(option: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "" | "true" | "1" | "yes" | "on" | "fullscreen" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            option: option.into(),
            value: value.into(),
        }),
    }
}

/// Contents of a TOML config file. Every key is optional; command-line flags
/// override whatever is set here.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub source: Option<String>,
    pub background: Option<Background>,
    pub fullscreen: Option<bool>,
    /// Window scale factor.
    pub scale: Option<u32>,
}

impl ConfigFile {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Host options set by this file, defaults elsewhere.
    #[must_use]
    pub fn host_config(&self) -> HostConfig {
        HostConfig {
            source: self.source.clone(),
            background: self.background.unwrap_or_default(),
            fullscreen: self.fullscreen.unwrap_or(false),
        }
    }
}
