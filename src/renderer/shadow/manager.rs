//! Shadow manager
//!
//! Owns one [`ShadowGenerator`] per shadow-casting light and is the single
//! per-frame entry point of the shadow subsystem.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use super::generator::{ShadowGenerator, UpdateOutcome};
use super::scene::ShadowScene;
use super::settings::{
    CascadeSettings, GeneratorOptions, GeneratorSettings, QualitySettings, ShadowManagerConfig,
    ShadowQuality,
};
use super::{LightShadowUniforms, ShadowUniform};
use crate::context::GraphicsBackend;
use crate::error::{Result, ShadowError};
use crate::renderer::light::{Light, LightId, LightType};
use crate::renderer::viewer::Camera;

/// Render statistics of one generator.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorMetrics {
    pub light_id: LightId,
    pub light_type: LightType,
    /// CPU time of the generator's most recent update.
    pub render_time: Duration,
    pub update_count: u64,
    pub failure_count: u64,
    pub memory_bytes: u64,
    pub enabled: bool,
    pub inert: bool,
}

/// Aggregated render statistics, for adaptive quality logic in the host.
#[derive(Debug, Clone, PartialEq)]
pub struct PerformanceMetrics {
    pub total_render_time: Duration,
    pub frame_count: u64,
    pub average_frame_time: Duration,
    pub last_frame_time: Duration,
    /// Per-generator statistics, sorted by light id.
    pub generators: Vec<GeneratorMetrics>,
}

/// Shadow manager.
///
/// Generators may only be added or removed between frames; `update` takes
/// `&mut self`, so the map cannot change while a frame is being rendered.
#[derive(Debug)]
pub struct ShadowManager {
    config: ShadowManagerConfig,
    quality: QualitySettings,
    generators: HashMap<LightId, ShadowGenerator>,
    total_render_time: Duration,
    frame_count: u64,
    last_frame_time: Duration,
    clock_origin: Instant,
}

impl ShadowManager {
    /// Create a manager. Fails if the configuration is invalid.
    pub fn new(config: ShadowManagerConfig) -> Result<Self> {
        config.cascades.validate()?;
        Ok(Self {
            quality: config.quality.settings(),
            config,
            generators: HashMap::new(),
            total_render_time: Duration::ZERO,
            frame_count: 0,
            last_frame_time: Duration::ZERO,
            clock_origin: Instant::now(),
        })
    }

    /// Defaults for new generators: the current quality bundle plus the
    /// manager's cascade settings.
    fn base_settings(&self) -> GeneratorSettings {
        let mut settings = GeneratorSettings::from_quality(&self.quality);
        settings.cascades = CascadeSettings {
            cascade_count: self.quality.cascade_count,
            ..self.config.cascades
        };
        settings
    }

    /// Create and initialize a generator for `light`, replacing any existing
    /// generator of the same light.
    ///
    /// Lights that cannot cast shadows are rejected with
    /// [`ShadowError::UnsupportedLight`] and no generator is created. If the
    /// GPU resources cannot be allocated the generator is kept, disabled, and
    /// the allocation error is returned.
    pub fn add_generator<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        light: &Light,
        options: GeneratorOptions,
    ) -> Result<&mut ShadowGenerator> {
        let settings = options.resolve(self.base_settings())?;
        let mut generator = match ShadowGenerator::new(light, settings) {
            Ok(generator) => generator,
            Err(err @ ShadowError::UnsupportedLight { .. }) => {
                tracing::warn!(
                    light = %light.id,
                    kind = ?light.light_type(),
                    "light type cannot cast shadows"
                );
                return Err(err);
            }
            Err(err) => return Err(err),
        };

        if let Some(mut previous) = self.generators.remove(&light.id) {
            tracing::debug!(light = %light.id, "replacing shadow generator");
            previous.dispose(backend);
        }

        let init = generator.init(backend);
        let generator = self.generators.entry(light.id).or_insert(generator);
        init?;
        Ok(generator)
    }

    /// Dispose and remove the generator of a light. Returns whether one existed.
    pub fn remove_generator<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        light_id: LightId,
    ) -> bool {
        match self.generators.remove(&light_id) {
            Some(mut generator) => {
                generator.dispose(backend);
                true
            }
            None => false,
        }
    }

    pub fn generator(&self, light_id: LightId) -> Option<&ShadowGenerator> {
        self.generators.get(&light_id)
    }

    pub fn generator_mut(&mut self, light_id: LightId) -> Option<&mut ShadowGenerator> {
        self.generators.get_mut(&light_id)
    }

    pub fn generators(&self) -> impl Iterator<Item = &ShadowGenerator> {
        self.generators.values()
    }

    pub fn len(&self) -> usize {
        self.generators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.generators.is_empty()
    }

    /// Per-frame entry point, timed against the manager's own clock.
    pub fn update<B, S>(&mut self, backend: &mut B, scene: &mut S, camera: &Camera)
    where
        B: GraphicsBackend + ?Sized,
        S: ShadowScene<B> + ?Sized,
    {
        let now = self.clock_origin.elapsed();
        self.update_at(backend, scene, camera, now);
    }

    /// Update every due generator as of `now`.
    ///
    /// Failures stay inside the offending generator; the remaining generators
    /// still render.
    pub fn update_at<B, S>(
        &mut self,
        backend: &mut B,
        scene: &mut S,
        camera: &Camera,
        now: Duration,
    ) where
        B: GraphicsBackend + ?Sized,
        S: ShadowScene<B> + ?Sized,
    {
        if !self.config.enabled {
            return;
        }

        let start = Instant::now();
        let mut rendered = 0usize;
        let mut failed = 0usize;
        for generator in self.generators.values_mut() {
            match generator.update(backend, scene, camera, now) {
                UpdateOutcome::Rendered(_) => rendered += 1,
                UpdateOutcome::Failed(_) => failed += 1,
                UpdateOutcome::Skipped | UpdateOutcome::Inert => {}
            }
        }

        let elapsed = start.elapsed();
        self.last_frame_time = elapsed;
        self.total_render_time += elapsed;
        self.frame_count += 1;
        tracing::trace!(rendered, failed, elapsed = ?elapsed, "shadow frame");
    }

    /// Switch to a quality preset.
    pub fn set_quality<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        quality: ShadowQuality,
    ) -> Result<()> {
        self.config.quality = quality;
        self.set_quality_settings(backend, &quality.settings())
    }

    /// Push a quality bundle to every generator.
    ///
    /// The bundle is validated before any target is touched. A generator whose
    /// targets cannot be reallocated is disabled; the others are still updated
    /// and the first such error is returned.
    pub fn set_quality_settings<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        quality: &QualitySettings,
    ) -> Result<()> {
        quality.validate()?;
        self.quality = *quality;
        tracing::info!(
            size = quality.map_size,
            filter = ?quality.filter,
            cascades = quality.cascade_count,
            "applying shadow quality"
        );

        let mut first_error = None;
        for generator in self.generators.values_mut() {
            if let Err(err) = generator.apply_quality(backend, quality) {
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Preset last selected with [`set_quality`](Self::set_quality).
    pub fn quality(&self) -> ShadowQuality {
        self.config.quality
    }

    /// Quality bundle currently applied.
    pub fn quality_settings(&self) -> &QualitySettings {
        &self.quality
    }

    /// Change the view distance covered by directional cascades.
    pub fn set_max_shadow_distance(&mut self, distance: f32) -> Result<()> {
        if !(distance > 0.0) {
            return Err(ShadowError::config("max shadow distance must be positive"));
        }
        self.config.cascades.max_shadow_distance = distance;
        for generator in self.generators.values_mut() {
            generator.set_max_shadow_distance(distance);
        }
        Ok(())
    }

    pub fn max_shadow_distance(&self) -> f32 {
        self.config.cascades.max_shadow_distance
    }

    /// Shading payload of every rendered generator, sorted by light id.
    ///
    /// Empty while the manager is disabled.
    pub fn shadow_uniforms(&self) -> Vec<LightShadowUniforms> {
        if !self.config.enabled {
            return Vec::new();
        }
        let mut uniforms: Vec<_> = self
            .generators
            .values()
            .filter_map(ShadowGenerator::uniforms)
            .collect();
        uniforms.sort_by_key(|u| u.light_id);
        uniforms
    }

    /// [`shadow_uniforms`](Self::shadow_uniforms) packed for upload.
    pub fn gpu_uniforms(&self) -> Vec<ShadowUniform> {
        self.shadow_uniforms().iter().map(LightShadowUniforms::to_gpu).collect()
    }

    pub fn performance_metrics(&self) -> PerformanceMetrics {
        let average_frame_time = match u32::try_from(self.frame_count) {
            Ok(0) => Duration::ZERO,
            Ok(frames) => self.total_render_time / frames,
            Err(_) => Duration::from_secs_f64(
                self.total_render_time.as_secs_f64() / self.frame_count as f64,
            ),
        };

        let mut generators: Vec<_> = self
            .generators
            .values()
            .map(|g| GeneratorMetrics {
                light_id: g.light_id(),
                light_type: g.light_type(),
                render_time: g.render_time(),
                update_count: g.update_count(),
                failure_count: g.failure_count(),
                memory_bytes: g.memory_bytes(),
                enabled: g.is_enabled(),
                inert: g.is_inert(),
            })
            .collect();
        generators.sort_by_key(|m| m.light_id);

        PerformanceMetrics {
            total_render_time: self.total_render_time,
            frame_count: self.frame_count,
            average_frame_time,
            last_frame_time: self.last_frame_time,
            generators,
        }
    }

    /// Remove every generator whose light disappeared or stopped casting
    /// shadows. Returns the removed ids, sorted.
    pub fn prune_inert<B: GraphicsBackend + ?Sized>(&mut self, backend: &mut B) -> Vec<LightId> {
        let mut inert: Vec<_> = self
            .generators
            .values()
            .filter(|g| g.is_inert())
            .map(ShadowGenerator::light_id)
            .collect();
        inert.sort();
        for id in &inert {
            self.remove_generator(backend, *id);
        }
        if !inert.is_empty() {
            tracing::debug!(count = inert.len(), "pruned inert shadow generators");
        }
        inert
    }

    /// GPU memory held by all generators.
    pub fn memory_bytes(&self) -> u64 {
        self.generators.values().map(ShadowGenerator::memory_bytes).sum()
    }

    /// Turn the whole subsystem on or off. While off, `update` does nothing
    /// and no uniforms are reported.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.config.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Dispose every generator. Safe to call repeatedly.
    pub fn dispose<B: GraphicsBackend + ?Sized>(&mut self, backend: &mut B) {
        for (_, mut generator) in self.generators.drain() {
            generator.dispose(backend);
        }
    }
}
