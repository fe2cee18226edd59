use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ViewerConfig {
    pub zoom_step: f32,
    pub min_scale: f32,
    pub max_scale: f32,
    /// Upper bound for fit-to-width, kept below `max_scale` so narrow
    /// containers are not over-magnified.
    pub fit_max_scale: f32,
    /// Horizontal space subtracted from the container before fitting.
    pub fit_padding: f32,
    pub resize_debounce_ms: u64,
    /// Characters kept on each side of a match in search snippets.
    pub snippet_radius: usize,
    pub page_gap: f32,
    pub container_padding: f32,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            zoom_step: 1.2,
            min_scale: 0.3,
            max_scale: 3.0,
            fit_max_scale: 2.0,
            fit_padding: 80.0,
            resize_debounce_ms: 250,
            snippet_radius: 50,
            page_gap: 20.0,
            container_padding: 32.0,
        }
    }
}

impl ViewerConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw).context("invalid viewer configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Reads `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {:?}", path))?;
        Self::from_toml_str(&raw).with_context(|| format!("failed to load config {:?}", path))
    }

    pub fn resize_debounce(&self) -> Duration {
        Duration::from_millis(self.resize_debounce_ms)
    }

    /// Checks the invariants the scale manager and layout rely on.
    pub fn validate(&self) -> Result<()> {
        let floats = [
            ("zoom_step", self.zoom_step),
            ("min_scale", self.min_scale),
            ("max_scale", self.max_scale),
            ("fit_max_scale", self.fit_max_scale),
            ("fit_padding", self.fit_padding),
            ("page_gap", self.page_gap),
            ("container_padding", self.container_padding),
        ];
        if let Some((name, value)) = floats.iter().find(|(_, value)| !value.is_finite()) {
            bail!("{name} must be a finite number (got {value})");
        }
        if !(self.min_scale > 0.0 && self.min_scale <= self.max_scale) {
            bail!(
                "scale bounds must satisfy 0 < min_scale <= max_scale (got {} and {})",
                self.min_scale,
                self.max_scale
            );
        }
        if self.zoom_step <= 1.0 {
            bail!("zoom_step must be greater than 1.0 (got {})", self.zoom_step);
        }
        if self.fit_max_scale > self.max_scale {
            bail!(
                "fit_max_scale {} exceeds max_scale {}",
                self.fit_max_scale,
                self.max_scale
            );
        }
        if self.page_gap < 0.0 || self.container_padding < 0.0 || self.fit_padding < 0.0 {
            bail!("layout spacing must not be negative");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let config = ViewerConfig::load(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config, ViewerConfig::default());
    }

    #[test]
    fn partial_file_overrides_only_given_fields() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "resize_debounce_ms = 100\nsnippet_radius = 20\n").unwrap();

        let config = ViewerConfig::load(&path).unwrap();
        assert_eq!(config.resize_debounce(), Duration::from_millis(100));
        assert_eq!(config.snippet_radius, 20);
        assert_eq!(config.max_scale, 3.0);
        assert_eq!(config.fit_max_scale, 2.0);
    }

    #[test]
    fn rejects_unknown_keys_and_bad_bounds() {
        assert!(ViewerConfig::from_toml_str("zoom = 2.0").is_err());
        assert!(ViewerConfig::from_toml_str("min_scale = 4.0").is_err());
        assert!(ViewerConfig::from_toml_str("fit_max_scale = 3.5").is_err());
        assert!(ViewerConfig::from_toml_str("zoom_step = 0.9").is_err());
    }

    #[test]
    fn rejects_non_finite_numbers() {
        for raw in [
            "container_padding = nan",
            "page_gap = nan",
            "zoom_step = nan",
            "fit_padding = -nan",
            "max_scale = inf",
        ] {
            let err = ViewerConfig::from_toml_str(raw).unwrap_err();
            assert!(
                format!("{err:#}").contains("finite"),
                "{raw} was accepted or failed for another reason: {err:#}"
            );
        }
    }
}
