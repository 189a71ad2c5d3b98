// Configuration - settings from config.toml
//
// Missing file or missing keys fall back to the demo defaults:
// 1000x480 resizable window, mailbox presentation, 3 frames in flight.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Root configuration structure
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub graphics: GraphicsConfig,
    pub debug: DebugConfig,
}

/// Window settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub resizable: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Hello Triangle".to_string(),
            width: 1000,
            height: 480,
            resizable: true,
        }
    }
}

/// Graphics settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GraphicsConfig {
    pub present_mode: String,
    pub clear_color: [f32; 4],
    pub frames_in_flight: usize,
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            present_mode: "mailbox".to_string(),
            clear_color: [0.02, 0.02, 0.08, 1.0],
            frames_in_flight: 3,
        }
    }
}

/// Debug settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub validation_layers: bool,
    pub show_fps: bool,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            validation_layers: true,
            show_fps: true,
        }
    }
}

impl Config {
    /// Load configuration from config.toml, falling back to defaults
    pub fn load() -> Self {
        Self::load_from_path("config.toml").unwrap_or_else(|e| {
            log::warn!("Failed to load config.toml: {}. Using defaults.", e);
            Config::default()
        })
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        Ok(config)
    }

    /// Present mode as a Vulkan enum
    pub fn present_mode(&self) -> ash::vk::PresentModeKHR {
        use ash::vk::PresentModeKHR;

        match self.graphics.present_mode.to_lowercase().as_str() {
            "immediate" => PresentModeKHR::IMMEDIATE,
            "mailbox" => PresentModeKHR::MAILBOX,
            "fifo" => PresentModeKHR::FIFO,
            "fifo_relaxed" => PresentModeKHR::FIFO_RELAXED,
            _ => {
                log::warn!(
                    "Unknown present mode '{}', defaulting to mailbox",
                    self.graphics.present_mode
                );
                PresentModeKHR::MAILBOX
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::PresentModeKHR;

    #[test]
    fn defaults_match_the_demo_settings() {
        let config = Config::default();
        assert_eq!(config.window.width, 1000);
        assert_eq!(config.window.height, 480);
        assert!(config.window.resizable);
        assert_eq!(config.graphics.frames_in_flight, 3);
        assert_eq!(config.present_mode(), PresentModeKHR::MAILBOX);
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let config: Config = toml::from_str(
            r#"
            [window]
            width = 1920
            "#,
        )
        .unwrap();

        assert_eq!(config.window.width, 1920);
        assert_eq!(config.window.height, 480);
        assert_eq!(config.graphics.present_mode, "mailbox");
    }

    #[test]
    fn present_mode_strings_map_to_vulkan_enums() {
        let mut config = Config::default();

        for (name, mode) in [
            ("immediate", PresentModeKHR::IMMEDIATE),
            ("mailbox", PresentModeKHR::MAILBOX),
            ("fifo", PresentModeKHR::FIFO),
            ("fifo_relaxed", PresentModeKHR::FIFO_RELAXED),
            ("MAILBOX", PresentModeKHR::MAILBOX),
        ] {
            config.graphics.present_mode = name.to_string();
            assert_eq!(config.present_mode(), mode, "mode name {name}");
        }
    }

    #[test]
    fn unknown_present_mode_falls_back_to_mailbox() {
        let mut config = Config::default();
        config.graphics.present_mode = "warp-speed".to_string();
        assert_eq!(config.present_mode(), PresentModeKHR::MAILBOX);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let config = Config::load_from_path("no/such/config.toml").unwrap();
        assert_eq!(config.window.title, "Hello Triangle");
    }
}
