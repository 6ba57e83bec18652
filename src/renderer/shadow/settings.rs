//! Shadow configuration
//!
//! Quality presets, per-generator options and cascade settings. All values are
//! validated before any GPU resource is touched.

use std::time::Duration;

use super::filter::{FilterParams, FilterType};
use crate::error::{Result, ShadowError};

/// Maximum number of cascades per directional light.
pub const MAX_CASCADES: u32 = 4;

/// Quality preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ShadowQuality {
    Low,
    #[default]
    Medium,
    High,
    Ultra,
}

impl ShadowQuality {
    /// The fixed settings bundle of this preset.
    pub fn settings(self) -> QualitySettings {
        match self {
            ShadowQuality::Low => QualitySettings {
                map_size: 512,
                bias: 0.005,
                normal_bias: 0.04,
                filter: FilterType::None,
                cascade_count: 1,
            },
            ShadowQuality::Medium => QualitySettings {
                map_size: 1024,
                bias: 0.003,
                normal_bias: 0.03,
                filter: FilterType::Pcf3x3,
                cascade_count: 2,
            },
            ShadowQuality::High => QualitySettings {
                map_size: 2048,
                bias: 0.002,
                normal_bias: 0.02,
                filter: FilterType::Pcf4x4,
                cascade_count: 3,
            },
            ShadowQuality::Ultra => QualitySettings {
                map_size: 4096,
                bias: 0.001,
                normal_bias: 0.01,
                filter: FilterType::Pcf8x8,
                cascade_count: 4,
            },
        }
    }
}

/// Settings pushed to every generator by a quality change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualitySettings {
    /// Shadow map resolution (width and height).
    pub map_size: u32,
    /// Constant depth bias.
    pub bias: f32,
    /// Normal offset bias, in texels.
    pub normal_bias: f32,
    pub filter: FilterType,
    /// Cascades for directional lights.
    pub cascade_count: u32,
}

impl Default for QualitySettings {
    fn default() -> Self {
        ShadowQuality::default().settings()
    }
}

impl QualitySettings {
    /// Reject values that cannot produce a shadow map.
    pub fn validate(&self) -> Result<()> {
        validate_map_size(self.map_size)?;
        validate_bias("bias", self.bias)?;
        validate_bias("normal bias", self.normal_bias)?;
        validate_cascade_count(self.cascade_count)
    }
}

fn validate_map_size(size: u32) -> Result<()> {
    if size == 0 {
        return Err(ShadowError::config("shadow map size must be positive"));
    }
    Ok(())
}

fn validate_bias(name: &str, value: f32) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(ShadowError::config(format!(
            "{name} must be a non-negative number, got {value}"
        )));
    }
    Ok(())
}

fn validate_cascade_count(count: u32) -> Result<()> {
    if count == 0 || count > MAX_CASCADES {
        return Err(ShadowError::config(format!(
            "cascade count must be in 1..={MAX_CASCADES}, got {count}"
        )));
    }
    Ok(())
}

/// Directional cascade settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CascadeSettings {
    pub cascade_count: u32,
    /// Log/uniform split blend (1 = logarithmic).
    pub lambda: f32,
    /// Fraction of the previous cascade shared as a cross-fade band.
    pub blend_width: f32,
    /// View distance covered by cascades.
    pub max_shadow_distance: f32,
    /// Snap cascades to whole texels to stop shimmering.
    pub stabilize: bool,
    /// Extra distance behind each cascade box for off-screen casters.
    pub caster_margin: f32,
}

impl Default for CascadeSettings {
    fn default() -> Self {
        Self {
            cascade_count: ShadowQuality::default().settings().cascade_count,
            lambda: 0.5,
            blend_width: 0.1,
            max_shadow_distance: 100.0,
            stabilize: false,
            caster_margin: 20.0,
        }
    }
}

impl CascadeSettings {
    pub fn validate(&self) -> Result<()> {
        validate_cascade_count(self.cascade_count)?;
        if !(0.0..=1.0).contains(&self.lambda) {
            return Err(ShadowError::config("cascade lambda must be in [0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.blend_width) {
            return Err(ShadowError::config("cascade blend width must be in [0, 1]"));
        }
        if !(self.max_shadow_distance > 0.0) {
            return Err(ShadowError::config("max shadow distance must be positive"));
        }
        if !(self.caster_margin >= 0.0) {
            return Err(ShadowError::config("caster margin must be non-negative"));
        }
        Ok(())
    }
}

/// Resolved settings of one generator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeneratorSettings {
    pub enabled: bool,
    pub map_size: u32,
    pub bias: f32,
    pub normal_bias: f32,
    pub filter: FilterType,
    pub filter_params: FilterParams,
    /// Minimum time between re-renders. Zero renders every frame.
    pub update_interval: Duration,
    /// Near plane of point and spot light cameras.
    pub near: f32,
    pub cascades: CascadeSettings,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self::from_quality(&QualitySettings::default())
    }
}

impl GeneratorSettings {
    /// Settings derived from a quality bundle.
    pub fn from_quality(quality: &QualitySettings) -> Self {
        Self {
            enabled: true,
            map_size: quality.map_size,
            bias: quality.bias,
            normal_bias: quality.normal_bias,
            filter: quality.filter,
            filter_params: FilterParams::default(),
            update_interval: Duration::ZERO,
            near: 0.1,
            cascades: CascadeSettings {
                cascade_count: quality.cascade_count,
                ..Default::default()
            },
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_map_size(self.map_size)?;
        validate_bias("bias", self.bias)?;
        validate_bias("normal bias", self.normal_bias)?;
        if !(self.near > 0.0) {
            return Err(ShadowError::config("light camera near plane must be positive"));
        }
        self.cascades.validate()
    }
}

/// Per-light overrides passed to `ShadowManager::add_generator`.
///
/// Unset fields fall back to the manager's quality preset and defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GeneratorOptions {
    pub enabled: Option<bool>,
    pub map_size: Option<u32>,
    pub bias: Option<f32>,
    pub normal_bias: Option<f32>,
    pub filter: Option<FilterType>,
    pub filter_params: Option<FilterParams>,
    pub update_interval: Option<Duration>,
    pub near: Option<f32>,
    pub cascade_count: Option<u32>,
    pub cascade_lambda: Option<f32>,
    pub cascade_blend_width: Option<f32>,
    pub stabilize_cascades: Option<bool>,
    pub caster_margin: Option<f32>,
}

impl GeneratorOptions {
    pub fn with_map_size(mut self, size: u32) -> Self {
        self.map_size = Some(size);
        self
    }

    pub fn with_bias(mut self, bias: f32, normal_bias: f32) -> Self {
        self.bias = Some(bias);
        self.normal_bias = Some(normal_bias);
        self
    }

    pub fn with_filter(mut self, filter: FilterType) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_update_interval(mut self, interval: Duration) -> Self {
        self.update_interval = Some(interval);
        self
    }

    pub fn with_cascades(mut self, count: u32) -> Self {
        self.cascade_count = Some(count);
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    /// Apply these overrides on top of `base` and validate the result.
    pub fn resolve(&self, base: GeneratorSettings) -> Result<GeneratorSettings> {
        let mut settings = base;
        if let Some(v) = self.enabled {
            settings.enabled = v;
        }
        if let Some(v) = self.map_size {
            settings.map_size = v;
        }
        if let Some(v) = self.bias {
            settings.bias = v;
        }
        if let Some(v) = self.normal_bias {
            settings.normal_bias = v;
        }
        if let Some(v) = self.filter {
            settings.filter = v;
        }
        if let Some(v) = self.filter_params {
            settings.filter_params = v;
        }
        if let Some(v) = self.update_interval {
            settings.update_interval = v;
        }
        if let Some(v) = self.near {
            settings.near = v;
        }
        if let Some(v) = self.cascade_count {
            settings.cascades.cascade_count = v;
        }
        if let Some(v) = self.cascade_lambda {
            settings.cascades.lambda = v;
        }
        if let Some(v) = self.cascade_blend_width {
            settings.cascades.blend_width = v;
        }
        if let Some(v) = self.stabilize_cascades {
            settings.cascades.stabilize = v;
        }
        if let Some(v) = self.caster_margin {
            settings.cascades.caster_margin = v;
        }
        settings.validate()?;
        Ok(settings)
    }
}

/// Shadow manager configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowManagerConfig {
    pub enabled: bool,
    pub quality: ShadowQuality,
    /// Defaults for cascade fitting, including the view distance covered.
    /// The cascade count always comes from the quality preset.
    pub cascades: CascadeSettings,
}

impl Default for ShadowManagerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            quality: ShadowQuality::default(),
            cascades: CascadeSettings::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_are_valid_and_ordered() {
        let presets = [
            ShadowQuality::Low,
            ShadowQuality::Medium,
            ShadowQuality::High,
            ShadowQuality::Ultra,
        ];
        for pair in presets.windows(2) {
            let (lo, hi) = (pair[0].settings(), pair[1].settings());
            lo.validate().unwrap();
            hi.validate().unwrap();
            assert!(lo.map_size < hi.map_size);
            assert!(lo.filter.tap_count() <= hi.filter.tap_count());
            assert!(lo.cascade_count <= hi.cascade_count);
        }
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let mut quality = QualitySettings::default();
        quality.map_size = 0;
        assert!(matches!(quality.validate(), Err(ShadowError::Configuration(_))));

        let mut quality = QualitySettings::default();
        quality.cascade_count = 0;
        assert!(quality.validate().is_err());

        let mut quality = QualitySettings::default();
        quality.bias = -0.1;
        assert!(quality.validate().is_err());

        let mut quality = QualitySettings::default();
        quality.normal_bias = f32::NAN;
        assert!(quality.validate().is_err());
    }

    #[test]
    fn test_options_override_base() {
        let base = GeneratorSettings::from_quality(&ShadowQuality::High.settings());
        let settings = GeneratorOptions::default()
            .with_map_size(256)
            .with_filter(FilterType::Vsm)
            .with_update_interval(Duration::from_millis(100))
            .resolve(base)
            .unwrap();

        assert_eq!(settings.map_size, 256);
        assert_eq!(settings.filter, FilterType::Vsm);
        assert_eq!(settings.update_interval, Duration::from_millis(100));
        assert_eq!(settings.bias, ShadowQuality::High.settings().bias);
        assert_eq!(settings.cascades.cascade_count, 3);

        let err = GeneratorOptions::default()
            .with_cascades(0)
            .resolve(base)
            .unwrap_err();
        assert!(matches!(err, ShadowError::Configuration(_)));
    }
}
