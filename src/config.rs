//! Configuration management for warpblend

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::mesh::Perspective;
use crate::topology::DisplayId;

/// Placeholder replaced by the display id in path templates
pub const DISPLAY_PLACEHOLDER: &str = "{display}";

/// Input and debug file locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Topology (multi-projector calibration) file
    pub topology: PathBuf,
    /// Per-display warp grid, e.g. "testdata/WarpMap-DPY-{display}.txt"
    pub warp_template: String,
    /// Per-display blend grid
    pub blend_template: String,
    /// Per-display blend debug image
    pub debug_image_template: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            topology: PathBuf::from("testdata/multiprojector-calib-config.txt"),
            warp_template: "testdata/WarpMap-DPY-{display}.txt".to_string(),
            blend_template: "testdata/BlendMap-DPY-{display}.txt".to_string(),
            debug_image_template: "testdata/ppm_after-{display}.ppm".to_string(),
        }
    }
}

impl PathsConfig {
    pub fn warp_path(&self, display: DisplayId) -> PathBuf {
        expand_template(&self.warp_template, display)
    }

    pub fn blend_path(&self, display: DisplayId) -> PathBuf {
        expand_template(&self.blend_template, display)
    }

    pub fn debug_image_path(&self, display: DisplayId) -> PathBuf {
        expand_template(&self.debug_image_template, display)
    }

    fn validate(&self) -> Result<()> {
        for (name, template) in [
            ("warp_template", &self.warp_template),
            ("blend_template", &self.blend_template),
            ("debug_image_template", &self.debug_image_template),
        ] {
            if !template.contains(DISPLAY_PLACEHOLDER) {
                bail!(
                    "paths.{} = {:?} must contain {}",
                    name,
                    template,
                    DISPLAY_PLACEHOLDER
                );
            }
        }

        // The debug dump is written as PNM and the encoder picks the
        // subtype from the extension
        let is_ppm = Path::new(&self.debug_image_template)
            .extension()
            .map_or(false, |ext| ext.eq_ignore_ascii_case("ppm"));
        if !is_ppm {
            bail!(
                "paths.debug_image_template = {:?} must end in .ppm",
                self.debug_image_template
            );
        }
        Ok(())
    }
}

fn expand_template(template: &str, display: DisplayId) -> PathBuf {
    PathBuf::from(template.replace(DISPLAY_PLACEHOLDER, &display.to_string()))
}

/// Device dispatch settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Upper bound on waiting for the device to drain after each call
    pub settle_timeout_ms: u64,
    /// Directory for exported meshes and blend buffers (log only if unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export_dir: Option<PathBuf>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            settle_timeout_ms: 5000,
            export_dir: None,
        }
    }
}

impl DispatchConfig {
    pub fn settle_timeout(&self) -> Duration {
        Duration::from_millis(self.settle_timeout_ms)
    }
}

/// Warp mesh settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshConfig {
    /// Perspective pair stamped on every vertex. Grid files carry no
    /// perspective data; (0, 1) is the orthographic case.
    pub perspective: [f32; 2],
}

impl Default for MeshConfig {
    fn default() -> Self {
        let p = Perspective::default();
        Self {
            perspective: [p.p, p.q],
        }
    }
}

/// Blend buffer settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BlendConfig {
    /// Intensity for display pixels outside a smaller blend grid
    pub out_of_grid_intensity: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    /// Write a PPM of every blend buffer
    pub dump_blend_image: bool,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            dump_blend_image: true,
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub dispatch: DispatchConfig,

    #[serde(default)]
    pub mesh: MeshConfig,

    #[serde(default)]
    pub blend: BlendConfig,

    #[serde(default)]
    pub debug: DebugConfig,
}

impl Config {
    /// Load configuration from a file, or create default if it doesn't exist
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {:?}", path))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config from {:?}", path))?;
            config
                .paths
                .validate()
                .with_context(|| format!("Invalid config {:?}", path))?;
            tracing::info!("Loaded configuration from {:?}", path);
            Ok(config)
        } else {
            let config = Config::default();
            config.save(path)?;
            tracing::info!("Created default configuration at {:?}", path);
            Ok(config)
        }
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .context("Failed to serialize configuration")?;

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory {:?}", parent))?;
        }

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config to {:?}", path))?;

        tracing::info!("Saved configuration to {:?}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_expansion() {
        let paths = PathsConfig::default();
        assert_eq!(paths.warp_path(12), PathBuf::from("testdata/WarpMap-DPY-12.txt"));
        assert_eq!(paths.blend_path(3), PathBuf::from("testdata/BlendMap-DPY-3.txt"));
        assert_eq!(paths.debug_image_path(0), PathBuf::from("testdata/ppm_after-0.ppm"));
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.dispatch.settle_timeout(), Duration::from_secs(5));
        assert_eq!(config.mesh.perspective, [0.0, 1.0]);
        assert_eq!(config.blend.out_of_grid_intensity, 0);
        assert!(config.debug.dump_blend_image);
    }

    #[test]
    fn test_create_then_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let created = Config::load_or_create(&path).unwrap();
        assert!(path.exists());
        let loaded = Config::load_or_create(&path).unwrap();
        assert_eq!(loaded.paths.topology, created.paths.topology);
        assert_eq!(loaded.dispatch.settle_timeout_ms, created.dispatch.settle_timeout_ms);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[dispatch]\nsettle_timeout_ms = 250\n").unwrap();

        let config = Config::load_or_create(&path).unwrap();
        assert_eq!(config.dispatch.settle_timeout(), Duration::from_millis(250));
        assert_eq!(config.paths.warp_template, PathsConfig::default().warp_template);
    }

    #[test]
    fn test_template_without_placeholder_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[paths]\ntopology = \"t.txt\"\nwarp_template = \"warp.txt\"\n\
             blend_template = \"b-{display}.txt\"\ndebug_image_template = \"d-{display}.ppm\"\n",
        )
        .unwrap();

        let err = Config::load_or_create(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("warp_template"));
    }

    #[test]
    fn test_debug_image_must_be_ppm() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[paths]\ndebug_image_template = \"blend-{display}.png\"\n",
        )
        .unwrap();

        let err = Config::load_or_create(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("must end in .ppm"));

        std::fs::write(
            &path,
            "[paths]\ndebug_image_template = \"blend-{display}.PPM\"\n",
        )
        .unwrap();
        let config = Config::load_or_create(&path).unwrap();
        assert_eq!(
            config.paths.debug_image_path(2),
            PathBuf::from("blend-2.PPM")
        );
    }
}
