// =============================================================================
// CONFIGURATION - Load settings from config.toml
// =============================================================================
//
// This module handles loading and parsing configuration from config.toml.
// Provides sensible defaults if config file is missing or has errors.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use winit::keyboard::KeyCode;

use crate::camera::CameraMode;

/// Root configuration structure
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub graphics: GraphicsConfig,
    pub camera: CameraConfig,
    pub model: ModelConfig,
    pub shaders: ShaderConfig,
    pub debug: DebugConfig,
    pub controls: ControlsConfig,
}

/// Window settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub fullscreen: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Model Viewer".to_string(),
            width: 1280,
            height: 720,
            fullscreen: false,
        }
    }
}

/// Graphics settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GraphicsConfig {
    pub present_mode: String,
    pub clear_color: [f32; 4],
    pub max_frames_in_flight: usize,
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            present_mode: "fifo".to_string(),
            clear_color: [0.01, 0.01, 0.03, 1.0],
            max_frames_in_flight: 2,
        }
    }
}

impl GraphicsConfig {
    /// Get present mode as Vulkan enum
    pub fn vk_present_mode(&self) -> ash::vk::PresentModeKHR {
        match self.present_mode.to_lowercase().as_str() {
            "immediate" => ash::vk::PresentModeKHR::IMMEDIATE,
            "mailbox" => ash::vk::PresentModeKHR::MAILBOX,
            "fifo" => ash::vk::PresentModeKHR::FIFO,
            "fifo_relaxed" => ash::vk::PresentModeKHR::FIFO_RELAXED,
            _ => {
                log::warn!(
                    "Unknown present mode '{}', defaulting to FIFO",
                    self.present_mode
                );
                ash::vk::PresentModeKHR::FIFO
            }
        }
    }
}

/// Camera settings
///
/// Rotation is in degrees; position is the view-space translation the camera
/// starts from (a negative Z backs away from a model at the origin).
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub mode: String,
    pub fov: f32,
    pub znear: f32,
    pub zfar: f32,
    pub position: [f32; 3],
    pub rotation: [f32; 3],
    pub movement_speed: f32,
    pub rotation_speed: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            mode: "lookat".to_string(),
            fov: 60.0,
            znear: 0.1,
            zfar: 256.0,
            position: [0.0, 0.0, -2.5],
            rotation: [0.0, 0.0, 0.0],
            movement_speed: 1.0,
            rotation_speed: 1.0,
        }
    }
}

impl CameraConfig {
    pub fn camera_mode(&self) -> CameraMode {
        match self.mode.to_lowercase().as_str() {
            "lookat" => CameraMode::LookAt,
            "firstperson" => CameraMode::FirstPerson,
            _ => {
                log::warn!("Unknown camera mode '{}', defaulting to lookat", self.mode);
                CameraMode::LookAt
            }
        }
    }
}

/// Model import settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub path: String,
    pub scale: [f32; 3],
    pub center: [f32; 3],
    pub uv_scale: [f32; 2],
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: "models/cube.obj".to_string(),
            scale: [1.0, 1.0, 1.0],
            center: [0.0, 0.0, 0.0],
            uv_scale: [1.0, 1.0],
        }
    }
}

/// Compiled shader locations
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ShaderConfig {
    pub vertex: String,
    pub fragment: String,
}

impl Default for ShaderConfig {
    fn default() -> Self {
        Self {
            vertex: "shaders/mesh.vert.spv".to_string(),
            fragment: "shaders/mesh.frag.spv".to_string(),
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

/// Control key bindings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ControlsConfig {
    pub fullscreen_key: String,
    pub quit_key: String,
}

impl Default for ControlsConfig {
    fn default() -> Self {
        Self {
            fullscreen_key: "F11".to_string(),
            quit_key: "Escape".to_string(),
        }
    }
}

impl ControlsConfig {
    pub fn fullscreen_keycode(&self) -> KeyCode {
        parse_key(&self.fullscreen_key).unwrap_or_else(|| {
            log::warn!(
                "Unknown key '{}' for fullscreen_key, defaulting to F11",
                self.fullscreen_key
            );
            KeyCode::F11
        })
    }

    pub fn quit_keycode(&self) -> KeyCode {
        parse_key(&self.quit_key).unwrap_or_else(|| {
            log::warn!(
                "Unknown key '{}' for quit_key, defaulting to Escape",
                self.quit_key
            );
            KeyCode::Escape
        })
    }
}

/// Map a key name from the config file to a winit key code
fn parse_key(name: &str) -> Option<KeyCode> {
    let key = match name.to_lowercase().as_str() {
        "escape" | "esc" => KeyCode::Escape,
        "space" => KeyCode::Space,
        "tab" => KeyCode::Tab,
        "f1" => KeyCode::F1,
        "f2" => KeyCode::F2,
        "f3" => KeyCode::F3,
        "f4" => KeyCode::F4,
        "f5" => KeyCode::F5,
        "f6" => KeyCode::F6,
        "f7" => KeyCode::F7,
        "f8" => KeyCode::F8,
        "f9" => KeyCode::F9,
        "f10" => KeyCode::F10,
        "f11" => KeyCode::F11,
        "f12" => KeyCode::F12,
        _ => return None,
    };
    Some(key)
}

impl Config {
    /// Load configuration from file, falling back to defaults if not found
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
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        log::info!("Loaded configuration from {:?}", path);
        log::debug!("Config: {:?}", config);

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk;

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();
        assert_eq!(config.window.width, 1280);
        assert_eq!(config.window.height, 720);
        assert_eq!(config.graphics.max_frames_in_flight, 2);
        assert_eq!(config.model.path, "models/cube.obj");
        assert_eq!(config.model.scale, [1.0, 1.0, 1.0]);
        assert_eq!(config.camera.camera_mode(), CameraMode::LookAt);
    }

    #[test]
    fn present_mode_mapping() {
        let mut graphics = GraphicsConfig::default();
        assert_eq!(graphics.vk_present_mode(), vk::PresentModeKHR::FIFO);

        graphics.present_mode = "Mailbox".to_string();
        assert_eq!(graphics.vk_present_mode(), vk::PresentModeKHR::MAILBOX);

        graphics.present_mode = "immediate".to_string();
        assert_eq!(graphics.vk_present_mode(), vk::PresentModeKHR::IMMEDIATE);

        graphics.present_mode = "not-a-mode".to_string();
        assert_eq!(graphics.vk_present_mode(), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn camera_mode_mapping() {
        let mut camera = CameraConfig::default();
        camera.mode = "FirstPerson".to_string();
        assert_eq!(camera.camera_mode(), CameraMode::FirstPerson);

        camera.mode = "orbit".to_string();
        assert_eq!(camera.camera_mode(), CameraMode::LookAt);
    }

    #[test]
    fn key_name_mapping() {
        assert_eq!(parse_key("F11"), Some(KeyCode::F11));
        assert_eq!(parse_key("esc"), Some(KeyCode::Escape));
        assert_eq!(parse_key("banana"), None);

        let controls = ControlsConfig {
            fullscreen_key: "banana".to_string(),
            quit_key: "escape".to_string(),
        };
        assert_eq!(controls.fullscreen_keycode(), KeyCode::F11);
        assert_eq!(controls.quit_keycode(), KeyCode::Escape);
    }

    #[test]
    fn partial_config_takes_defaults() {
        let config: Config = toml::from_str(
            r#"
            [window]
            width = 1920

            [camera]
            mode = "firstperson"
            fov = 45.0

            [model]
            path = "models/scene.obj"
            "#,
        )
        .unwrap();

        assert_eq!(config.window.width, 1920);
        assert_eq!(config.window.height, 720);
        assert_eq!(config.camera.camera_mode(), CameraMode::FirstPerson);
        assert_eq!(config.camera.fov, 45.0);
        assert_eq!(config.camera.znear, 0.1);
        assert_eq!(config.model.path, "models/scene.obj");
        assert_eq!(config.model.uv_scale, [1.0, 1.0]);
        assert_eq!(config.graphics.max_frames_in_flight, 2);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = Config::load_from_path("does-not-exist.toml").unwrap();
        assert_eq!(config.window.title, "Model Viewer");
    }
}
