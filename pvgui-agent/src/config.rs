//! Configuration for the GUI agent.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use pvgui_core::{Keymap, SessionConfig};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Channel to the GUI daemon.
    pub channel: ChannelConfig,
    /// Window and framebuffer settings.
    pub display: DisplayConfig,
    /// Keyboard translation.
    pub input: InputConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Domain id of the GUI daemon.
    pub domain: u32,
    /// Channel port.
    pub port: u32,
    /// Ring size in bytes, per direction.
    pub ring_size: usize,
    /// Stage writes in memory instead of blocking on a full ring.
    pub buffered_writes: bool,
    /// Upper bound on one idle wait, in milliseconds.
    pub wait_timeout_ms: u64,
    /// Directory holding the Unix sockets that stand in for the channel.
    pub socket_dir: PathBuf,
}

/// Window and framebuffer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Title announced for the top-level window.
    pub window_name: String,
    /// Window size used while the framebuffer is unsized.
    pub placeholder_width: u32,
    pub placeholder_height: u32,
    /// Drop damage rectangles exactly one row high.
    pub ignore_single_line_damage: bool,
    /// Size and depth of the built-in headless framebuffer.
    pub width: u32,
    pub height: u32,
    pub bits_per_pixel: u32,
    /// Period of the full-frame repaint of the headless framebuffer, in
    /// milliseconds. 0 disables it.
    pub repaint_interval_ms: u64,
}

/// Keyboard configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Report pointer positions absolutely (tablet) instead of as deltas.
    pub absolute_pointer: bool,
    /// Keycode → scancode entries replacing the built-in table.
    /// Keys are decimal keycodes, e.g. `"94" = 0x56`.
    pub keymap_overrides: BTreeMap<String, u32>,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
    /// Optional log file path. If empty, logs to stderr.
    pub file: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid keymap override {key:?}: keycodes are 0..=255")]
    InvalidKeycode { key: String },

    #[error("cannot serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("cannot write configuration: {0}")]
    Io(#[from] std::io::Error),
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            domain: 0,
            port: 6000,
            ring_size: 4096,
            buffered_writes: false,
            wait_timeout_ms: 100,
            socket_dir: std::env::temp_dir(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            window_name: "pvgui".into(),
            placeholder_width: 640,
            placeholder_height: 480,
            ignore_single_line_damage: true,
            width: 1024,
            height: 768,
            bits_per_pixel: 32,
            repaint_interval_ms: 1000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            file: String::new(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl AgentConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Render as TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Write the default configuration to a file (for bootstrapping).
    pub fn write_default(path: &Path) -> Result<(), ConfigError> {
        std::fs::write(path, Self::default().to_toml()?)?;
        Ok(())
    }

    /// The headless repaint period, if enabled.
    pub fn repaint_interval(&self) -> Option<std::time::Duration> {
        match self.display.repaint_interval_ms {
            0 => None,
            ms => Some(std::time::Duration::from_millis(ms)),
        }
    }

    /// The built-in keymap with the configured overrides applied.
    pub fn keymap(&self) -> Result<Keymap, ConfigError> {
        let overrides = self
            .input
            .keymap_overrides
            .iter()
            .map(|(key, &scancode)| {
                key.trim()
                    .parse::<u8>()
                    .map(|keycode| (keycode, scancode))
                    .map_err(|_| ConfigError::InvalidKeycode { key: key.clone() })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Keymap::evdev().with_overrides(overrides))
    }

    /// Convert into the session core's configuration.
    pub fn to_session_config(&self) -> Result<SessionConfig, ConfigError> {
        Ok(SessionConfig {
            domain: self.channel.domain,
            port: self.channel.port,
            buffered_writes: self.channel.buffered_writes,
            wait_timeout_ms: self.channel.wait_timeout_ms.max(1),
            window_name: self.display.window_name.clone(),
            placeholder_width: self.display.placeholder_width.max(1),
            placeholder_height: self.display.placeholder_height.max(1),
            ignore_single_line_damage: self.display.ignore_single_line_damage,
            keymap: self.keymap()?,
        })
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let text = AgentConfig::default().to_toml().unwrap();
        assert!(text.contains("[channel]"));
        assert!(text.contains("wait_timeout_ms"));
        assert!(text.contains("bits_per_pixel"));
        assert!(text.contains("repaint_interval_ms = 1000"));
    }

    #[test]
    fn repaint_can_be_disabled() {
        let cfg = AgentConfig::default();
        assert_eq!(cfg.repaint_interval(), Some(std::time::Duration::from_secs(1)));
        let parsed: AgentConfig = toml::from_str("[display]\nrepaint_interval_ms = 0\n").unwrap();
        assert_eq!(parsed.repaint_interval(), None);
    }

    #[test]
    fn roundtrip_config() {
        let cfg = AgentConfig::default();
        let text = toml::to_string_pretty(&cfg).unwrap();
        let parsed: AgentConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.channel.port, 6000);
        assert_eq!(parsed.display.window_name, "pvgui");
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let parsed: AgentConfig = toml::from_str("[channel]\ndomain = 3\n").unwrap();
        assert_eq!(parsed.channel.domain, 3);
        assert_eq!(parsed.channel.port, 6000);
        assert_eq!(parsed.logging.level, "info");
    }

    #[test]
    fn written_default_loads_back() {
        let path = std::env::temp_dir().join(format!("pvgui-agent-{}.toml", std::process::id()));
        AgentConfig::write_default(&path).unwrap();
        let cfg = AgentConfig::load(&path);
        std::fs::remove_file(&path).unwrap();
        assert_eq!(cfg.channel.ring_size, 4096);
        assert_eq!(cfg.display.bits_per_pixel, 32);
    }

    #[test]
    fn missing_file_falls_back() {
        let cfg = AgentConfig::load(Path::new("/nonexistent/pvgui-agent.toml"));
        assert_eq!(cfg.channel.wait_timeout_ms, 100);
    }

    #[test]
    fn session_config_carries_settings() {
        let mut cfg = AgentConfig::default();
        cfg.channel.domain = 7;
        cfg.channel.buffered_writes = true;
        cfg.display.window_name = "guest".into();
        cfg.channel.wait_timeout_ms = 0;

        let session = cfg.to_session_config().unwrap();
        assert_eq!(session.domain, 7);
        assert!(session.buffered_writes);
        assert_eq!(session.window_name, "guest");
        assert_eq!(session.wait_timeout_ms, 1);
        assert_eq!(session.keymap.get(38), 0x1E);
    }

    #[test]
    fn keymap_overrides_apply() {
        let text = "[input.keymap_overrides]\n\"38\" = 0x30\n\"200\" = 0xE05B\n";
        let cfg: AgentConfig = toml::from_str(text).unwrap();
        let keymap = cfg.keymap().unwrap();
        assert_eq!(keymap.get(38), 0x30);
        assert_eq!(keymap.get(200), 0xE05B);
        assert_eq!(keymap.get(39), 0x1F);
    }

    #[test]
    fn keymap_override_rejects_bad_keycode() {
        let mut cfg = AgentConfig::default();
        cfg.input.keymap_overrides.insert("300".into(), 1);
        let err = cfg.keymap().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidKeycode { .. }));
    }
}
