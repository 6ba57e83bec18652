//! Shadow generator
//!
//! Per-light state machine. A generator owns the depth targets of one light,
//! decides when the light is due for a re-render, fits the light cameras and
//! drives the caster passes through the scene.
//!
//! Passes render into a back buffer that is swapped into the target once the
//! scene reports success, so a target's texture handles change after every
//! successful render and a failed pass never touches the previous map.
//!
//! ```text
//! Uninitialized -> Initialized -> { Updating <-> Idle } -> Disposed
//! ```

use std::time::{Duration, Instant};

use super::directional::DirectionalShadowGenerator;
use super::filter::FilterType;
use super::point::PointShadowGenerator;
use super::scene::{CubeFace, PassFace, ShadowPass, ShadowScene};
use super::settings::{GeneratorSettings, QualitySettings};
use super::spot::SpotShadowGenerator;
use super::LightShadowUniforms;
use crate::context::{GraphicsBackend, Viewport};
use crate::core::{DepthRenderTarget, ShadowMapKind};
use crate::error::{Result, ShadowError};
use crate::renderer::light::{Light, LightId, LightKind, LightType};
use crate::renderer::viewer::{Camera, Viewer};

/// Lifecycle state of a generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorState {
    Uninitialized,
    Initialized,
    /// Caster passes are being recorded.
    Updating,
    /// Rendered at least once, waiting for the next due update.
    Idle,
    Disposed,
}

/// Result of one [`ShadowGenerator::update`] call.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    /// All passes rendered, with the measured CPU time.
    Rendered(Duration),
    /// Not due, disabled or not initialized.
    Skipped,
    /// The light is gone or stopped casting shadows.
    Inert,
    /// A pass failed. Targets that were not re-rendered keep their previous
    /// contents and camera, and the update is retried next frame.
    Failed(ShadowError),
}

/// A fitted light camera for one depth target.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct LightView {
    pub camera: Camera,
    pub face: PassFace,
    /// World width covered by the map. Perspective views report the width at
    /// unit distance from the light.
    pub extent: f32,
    /// View-depth range covered by a cascade.
    pub range: Option<(f32, f32)>,
}

/// Light-specific part of a generator.
#[derive(Debug)]
pub enum GeneratorVariant {
    Directional(DirectionalShadowGenerator),
    Point(PointShadowGenerator),
    Spot(SpotShadowGenerator),
}

impl GeneratorVariant {
    fn for_light(light: &Light) -> Result<Self> {
        match light.kind {
            LightKind::Directional(_) => Ok(Self::Directional(DirectionalShadowGenerator::new())),
            LightKind::Point(_) => Ok(Self::Point(PointShadowGenerator::new())),
            LightKind::Spot(_) => Ok(Self::Spot(SpotShadowGenerator::new())),
            LightKind::Ambient(_) => Err(ShadowError::UnsupportedLight {
                id: light.id,
                kind: light.light_type(),
            }),
        }
    }

    /// Light type this variant shadows.
    pub fn light_type(&self) -> LightType {
        match self {
            Self::Directional(_) => LightType::Directional,
            Self::Point(_) => LightType::Point,
            Self::Spot(_) => LightType::Spot,
        }
    }

    /// Depth targets owned by this variant.
    pub fn targets(&self) -> &[DepthRenderTarget] {
        match self {
            Self::Directional(g) => g.targets(),
            Self::Point(g) => g.targets(),
            Self::Spot(g) => g.targets(),
        }
    }

    fn targets_mut(&mut self) -> &mut Vec<DepthRenderTarget> {
        match self {
            Self::Directional(g) => g.targets_mut(),
            Self::Point(g) => g.targets_mut(),
            Self::Spot(g) => g.targets_mut(),
        }
    }

    fn target_count(&self, settings: &GeneratorSettings) -> usize {
        match self {
            Self::Directional(_) => DirectionalShadowGenerator::target_count(settings),
            Self::Point(_) => PointShadowGenerator::target_count(),
            Self::Spot(_) => SpotShadowGenerator::target_count(),
        }
    }

    fn map_kind(&self) -> ShadowMapKind {
        match self {
            Self::Directional(_) => DirectionalShadowGenerator::map_kind(),
            Self::Point(_) => PointShadowGenerator::map_kind(),
            Self::Spot(_) => SpotShadowGenerator::map_kind(),
        }
    }

    /// Fit the light cameras. `None` when the light no longer matches the variant.
    fn light_views(
        &mut self,
        light: &Light,
        view: &Camera,
        settings: &GeneratorSettings,
        scene_bounds: Option<(glam::Vec3, glam::Vec3)>,
    ) -> Option<Vec<LightView>> {
        match (self, &light.kind) {
            (Self::Directional(g), LightKind::Directional(l)) => {
                Some(g.light_views(l, view, settings, scene_bounds))
            }
            (Self::Point(g), LightKind::Point(l)) => Some(g.light_views(l, settings)),
            (Self::Spot(g), LightKind::Spot(l)) => Some(g.light_views(l, settings)),
            _ => None,
        }
    }
}

fn target_label(light_id: LightId, kind: ShadowMapKind, index: usize) -> String {
    match kind {
        ShadowMapKind::Basic => format!("shadow {light_id}"),
        ShadowMapKind::Cascade => format!("shadow {light_id} cascade {index}"),
        ShadowMapKind::Omnidirectional => match CubeFace::ALL.get(index) {
            Some(face) => format!("shadow {light_id} face {face}"),
            None => format!("shadow {light_id} face {index}"),
        },
    }
}

/// Shadow generator for one light.
#[derive(Debug)]
pub struct ShadowGenerator {
    light_id: LightId,
    settings: GeneratorSettings,
    state: GeneratorState,
    variant: GeneratorVariant,
    /// Render destination of every pass, swapped into a target on success.
    back: Option<DepthRenderTarget>,
    /// Camera each target was last rendered with.
    views: Vec<Option<LightView>>,
    last_update: Option<Duration>,
    render_time: Duration,
    update_count: u64,
    failure_count: u64,
    inert: bool,
}

impl ShadowGenerator {
    /// Create a generator for `light`. No GPU resources are touched until
    /// [`init`](Self::init).
    pub fn new(light: &Light, settings: GeneratorSettings) -> Result<Self> {
        let variant = GeneratorVariant::for_light(light)?;
        settings.validate()?;
        Ok(Self {
            light_id: light.id,
            settings,
            state: GeneratorState::Uninitialized,
            variant,
            back: None,
            views: Vec::new(),
            last_update: None,
            render_time: Duration::ZERO,
            update_count: 0,
            failure_count: 0,
            inert: false,
        })
    }

    /// Allocate the depth targets. No-op when disabled or already initialized.
    ///
    /// On failure every partially created target is released and the generator
    /// is disabled.
    pub fn init<B: GraphicsBackend + ?Sized>(&mut self, backend: &mut B) -> Result<()> {
        if !self.settings.enabled {
            tracing::debug!(light = %self.light_id, "shadow generator disabled, skipping init");
            return Ok(());
        }
        if self.is_initialized() {
            return Ok(());
        }

        if let Err(err) = self.sync_targets(backend) {
            self.disable(backend, &err);
            return Err(err);
        }

        self.state = GeneratorState::Initialized;
        tracing::info!(
            light = %self.light_id,
            kind = ?self.variant.light_type(),
            size = self.settings.map_size,
            targets = self.views.len(),
            "shadow generator initialized"
        );
        Ok(())
    }

    /// Bring the target set and the back buffer in line with the settings:
    /// drop extra cascades, resize the rest, create missing ones.
    fn sync_targets<B: GraphicsBackend + ?Sized>(&mut self, backend: &mut B) -> Result<()> {
        let count = self.variant.target_count(&self.settings);
        let size = self.settings.map_size;
        let moments = self.settings.filter.requires_moments();
        let kind = self.variant.map_kind();
        let light_id = self.light_id;

        let targets = self.variant.targets_mut();
        let keep = count.min(targets.len());
        for mut target in targets.drain(keep..) {
            target.dispose(backend);
        }
        self.views.truncate(keep);

        for target in targets.iter_mut() {
            target.resize(backend, size)?;
            target.set_moments(backend, moments)?;
        }
        while targets.len() < count {
            let label = target_label(light_id, kind, targets.len());
            targets.push(DepthRenderTarget::create(backend, label, size, kind, moments)?);
        }
        self.views.resize(count, None);

        match self.back.as_mut() {
            Some(back) => {
                back.resize(backend, size)?;
                back.set_moments(backend, moments)?;
            }
            None => {
                let label = format!("shadow {light_id} back buffer");
                let back = DepthRenderTarget::create(backend, label, size, kind, moments)?;
                self.back = Some(back);
            }
        }
        Ok(())
    }

    fn release<B: GraphicsBackend + ?Sized>(&mut self, backend: &mut B) {
        for mut target in self.variant.targets_mut().drain(..) {
            target.dispose(backend);
        }
        if let Some(mut back) = self.back.take() {
            back.dispose(backend);
        }
        self.views.clear();
    }

    fn disable<B: GraphicsBackend + ?Sized>(&mut self, backend: &mut B, err: &ShadowError) {
        self.release(backend);
        self.settings.enabled = false;
        self.state = GeneratorState::Uninitialized;
        tracing::error!(light = %self.light_id, error = %err, "disabling shadow generator");
    }

    /// Whether the generator is due for a re-render at `now`.
    ///
    /// Always true for the first update after init, then throttled by the
    /// update interval.
    pub fn should_update(&self, now: Duration) -> bool {
        if !self.settings.enabled || self.inert || !self.is_initialized() {
            return false;
        }
        match self.last_update {
            None => true,
            Some(_) if self.settings.update_interval.is_zero() => true,
            Some(last) => now.saturating_sub(last) >= self.settings.update_interval,
        }
    }

    /// Refit the light cameras for `view` and render the shadow casters.
    ///
    /// Each pass renders into the back buffer, which is swapped into its
    /// target only once the scene reports success. Render failures never
    /// propagate: targets that were not re-rendered keep their previous
    /// contents and camera, `last_update` is left alone so the next frame
    /// retries, and the error is reported through the outcome.
    pub fn update<B, S>(
        &mut self,
        backend: &mut B,
        scene: &mut S,
        view: &Camera,
        now: Duration,
    ) -> UpdateOutcome
    where
        B: GraphicsBackend + ?Sized,
        S: ShadowScene<B> + ?Sized,
    {
        if self.inert {
            return UpdateOutcome::Inert;
        }
        if !self.should_update(now) {
            return UpdateOutcome::Skipped;
        }

        let views = match scene.light(self.light_id) {
            Some(light) if light.cast_shadow => {
                let bounds = scene.scene_bounds();
                self.variant.light_views(light, view, &self.settings, bounds)
            }
            _ => None,
        };
        let Some(views) = views else {
            self.inert = true;
            tracing::warn!(
                light = %self.light_id,
                "light removed or no longer casts shadows, generator is inert"
            );
            return UpdateOutcome::Inert;
        };

        self.state = GeneratorState::Updating;
        let start = Instant::now();
        let mut failure = None;

        for (index, light_view) in views.into_iter().enumerate() {
            let (Some(back), Some(target)) =
                (self.back.as_mut(), self.variant.targets_mut().get_mut(index))
            else {
                failure = Some(format!("{:?} pass has no render target", light_view.face));
                break;
            };
            back.set_camera(light_view.camera.clone());

            let Some(framebuffer) = back.bind(backend) else {
                failure = Some(format!("{} has no backing resources", back.label()));
                break;
            };
            let pass = ShadowPass {
                light_id: self.light_id,
                face: light_view.face,
                view: light_view.camera.view_matrix(),
                projection: light_view.camera.projection_matrix(),
                view_projection: back.shadow_matrix(),
                framebuffer,
                viewport: Viewport::square(back.size()),
                light_position: light_view.camera.position,
                far: light_view.camera.far(),
            };
            let result = scene.render_shadow_casters(backend, &pass);
            back.unbind(backend);

            if let Err(err) = result {
                failure = Some(format!("{:?} pass: {err:#}", light_view.face));
                break;
            }
            if let Err(err) = target.swap_contents(back) {
                failure = Some(err.to_string());
                break;
            }
            self.views[index] = Some(light_view);
        }

        self.render_time = start.elapsed();
        self.state = GeneratorState::Idle;

        if let Some(reason) = failure {
            self.failure_count += 1;
            let err = ShadowError::StaleRender {
                id: self.light_id,
                reason,
            };
            tracing::warn!(light = %self.light_id, error = %err, "keeping previous shadow map");
            return UpdateOutcome::Failed(err);
        }

        self.last_update = Some(now);
        self.update_count += 1;
        tracing::trace!(light = %self.light_id, elapsed = ?self.render_time, "shadow map rendered");
        UpdateOutcome::Rendered(self.render_time)
    }

    /// Push a quality bundle into this generator, resizing targets and
    /// adding or removing cascades as needed.
    pub fn apply_quality<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        quality: &QualitySettings,
    ) -> Result<()> {
        quality.validate()?;
        self.settings.map_size = quality.map_size;
        self.settings.bias = quality.bias;
        self.settings.normal_bias = quality.normal_bias;
        self.settings.filter = quality.filter;
        self.settings.cascades.cascade_count = quality.cascade_count;
        self.reconfigure(backend)
    }

    /// Change the map resolution, keeping every other setting.
    pub fn resize<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        size: u32,
    ) -> Result<()> {
        if size == 0 {
            return Err(ShadowError::config("shadow map size must be positive"));
        }
        self.settings.map_size = size;
        self.reconfigure(backend)
    }

    /// Change the filter, adding or dropping moment textures as needed.
    pub fn set_filter<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        filter: FilterType,
    ) -> Result<()> {
        self.settings.filter = filter;
        self.reconfigure(backend)
    }

    /// Change the re-render throttle.
    pub fn set_update_interval(&mut self, interval: Duration) {
        self.settings.update_interval = interval;
    }

    /// Change the view distance covered by cascades. Takes effect on the
    /// next update.
    pub fn set_max_shadow_distance(&mut self, distance: f32) {
        self.settings.cascades.max_shadow_distance = distance;
        self.last_update = None;
    }

    fn reconfigure<B: GraphicsBackend + ?Sized>(&mut self, backend: &mut B) -> Result<()> {
        self.last_update = None;
        if !self.is_initialized() {
            return Ok(());
        }
        if let Err(err) = self.sync_targets(backend) {
            self.disable(backend, &err);
            return Err(err);
        }
        Ok(())
    }

    /// Release all GPU resources. Safe to call repeatedly.
    pub fn dispose<B: GraphicsBackend + ?Sized>(&mut self, backend: &mut B) {
        if self.state != GeneratorState::Disposed {
            tracing::debug!(light = %self.light_id, "disposing shadow generator");
        }
        self.release(backend);
        self.state = GeneratorState::Disposed;
    }

    /// Shading payload, available once every target has been rendered.
    ///
    /// `None` while disabled, inert, disposed or before the first render.
    pub fn uniforms(&self) -> Option<LightShadowUniforms> {
        if !self.is_active() {
            return None;
        }
        let targets = self.variant.targets();
        if targets.is_empty() || targets.len() != self.views.len() {
            return None;
        }
        let views = self
            .views
            .iter()
            .map(Option::as_ref)
            .collect::<Option<Vec<_>>>()?;

        let light_type = self.variant.light_type();
        let map_size = self.settings.map_size;
        let ranges = views.iter().map(|v| v.range).collect::<Option<Vec<_>>>();

        Some(LightShadowUniforms {
            light_id: self.light_id,
            light_type,
            shadow_matrices: targets.iter().map(DepthRenderTarget::shadow_matrix).collect(),
            texel_world_sizes: views.iter().map(|v| v.extent / map_size as f32).collect(),
            bias: self.settings.bias,
            normal_bias: self.settings.normal_bias,
            filter: self.settings.filter,
            map_size,
            cascade_splits: ranges.as_ref().map(|r| r.iter().map(|&(_, end)| end).collect()),
            cascade_starts: ranges.map(|r| r.iter().map(|&(start, _)| start).collect()),
            light_position: match light_type {
                LightType::Directional => None,
                _ => views.first().map(|v| v.camera.position),
            },
            far: views.iter().map(|v| v.camera.far()).fold(0.0, f32::max),
        })
    }

    pub fn light_id(&self) -> LightId {
        self.light_id
    }

    pub fn light_type(&self) -> LightType {
        self.variant.light_type()
    }

    pub fn settings(&self) -> &GeneratorSettings {
        &self.settings
    }

    pub fn state(&self) -> GeneratorState {
        self.state
    }

    /// Light-specific state (cascades, cube faces, spot target).
    pub fn variant(&self) -> &GeneratorVariant {
        &self.variant
    }

    pub fn is_enabled(&self) -> bool {
        self.settings.enabled
    }

    /// Whether the light disappeared or stopped casting shadows.
    pub fn is_inert(&self) -> bool {
        self.inert
    }

    pub fn is_initialized(&self) -> bool {
        matches!(
            self.state,
            GeneratorState::Initialized | GeneratorState::Updating | GeneratorState::Idle
        )
    }

    fn is_active(&self) -> bool {
        self.settings.enabled && !self.inert && self.is_initialized()
    }

    /// Time of the last successful render.
    pub fn last_update(&self) -> Option<Duration> {
        self.last_update
    }

    /// CPU time of the most recent update.
    pub fn render_time(&self) -> Duration {
        self.render_time
    }

    pub fn update_count(&self) -> u64 {
        self.update_count
    }

    pub fn failure_count(&self) -> u64 {
        self.failure_count
    }

    /// GPU memory held by the depth targets and the back buffer.
    pub fn memory_bytes(&self) -> u64 {
        self.variant
            .targets()
            .iter()
            .chain(self.back.as_ref())
            .map(DepthRenderTarget::memory_bytes)
            .sum()
    }
}
