//! Directional light shadow mapping
//!
//! Cascaded shadow maps: the view frustum up to the shadow distance is split
//! into slices, each fitted with its own orthographic light camera and depth
//! target.

use glam::Vec3;

use super::cascade::{build_cascades, Cascade, LightSpaceBounds};
use super::generator::LightView;
use super::scene::PassFace;
use super::settings::GeneratorSettings;
use crate::core::{DepthRenderTarget, ShadowMapKind};
use crate::renderer::light::DirectionalLight;
use crate::renderer::viewer::Camera;

/// Near plane of cascade cameras.
const CASCADE_NEAR: f32 = 0.1;

/// Directional light shadow mapper, one target per cascade.
#[derive(Debug, Default)]
pub struct DirectionalShadowGenerator {
    targets: Vec<DepthRenderTarget>,
    cascades: Vec<Cascade>,
}

impl DirectionalShadowGenerator {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Cascades fitted by the most recent update.
    pub fn cascades(&self) -> &[Cascade] {
        &self.cascades
    }

    /// Cascade depth targets, nearest first.
    pub fn targets(&self) -> &[DepthRenderTarget] {
        &self.targets
    }

    pub(crate) fn targets_mut(&mut self) -> &mut Vec<DepthRenderTarget> {
        &mut self.targets
    }

    pub(crate) fn target_count(settings: &GeneratorSettings) -> usize {
        settings.cascades.cascade_count as usize
    }

    pub(crate) fn map_kind() -> ShadowMapKind {
        ShadowMapKind::Cascade
    }

    /// Fit one orthographic camera per cascade of `view`.
    pub(crate) fn light_views(
        &mut self,
        light: &DirectionalLight,
        view: &Camera,
        settings: &GeneratorSettings,
        scene_bounds: Option<(Vec3, Vec3)>,
    ) -> Vec<LightView> {
        let cascade_settings = &settings.cascades;
        let direction = light.direction.normalize_or(Vec3::NEG_Y);

        let mut cascades = build_cascades(
            view,
            direction,
            cascade_settings.cascade_count,
            cascade_settings.max_shadow_distance,
            cascade_settings.lambda,
            cascade_settings.blend_width,
        );

        let views = cascades
            .iter_mut()
            .map(|cascade| {
                if cascade_settings.stabilize {
                    cascade.bounds.snap_to_texels(settings.map_size);
                }
                let bounds = &cascade.bounds;
                let margin = caster_margin(
                    bounds,
                    direction,
                    cascade_settings.caster_margin,
                    scene_bounds,
                );

                let center = bounds.center_world();
                let position = center - direction * (bounds.depth() * 0.5 + margin);
                let camera = Camera::new_orthographic(
                    position,
                    center,
                    bounds.basis.up,
                    bounds.max_extent() * 0.5,
                    CASCADE_NEAR,
                    bounds.depth() + margin,
                );

                LightView {
                    camera,
                    face: PassFace::Cascade(cascade.index),
                    extent: bounds.max_extent(),
                    range: Some((cascade.start_distance, cascade.end_distance)),
                }
            })
            .collect();

        self.cascades = cascades;
        views
    }
}

/// Distance kept between the light camera and the near face of a cascade box.
///
/// Grows past `base` when known scene geometry sits further toward the light,
/// so casters outside the view frustum still land in the map.
fn caster_margin(
    bounds: &LightSpaceBounds,
    direction: Vec3,
    base: f32,
    scene_bounds: Option<(Vec3, Vec3)>,
) -> f32 {
    let Some((min, max)) = scene_bounds else {
        return base;
    };
    let center = bounds.center_world();
    let reach = (0..8)
        .map(|i| {
            let corner = Vec3::new(
                if i & 1 == 0 { min.x } else { max.x },
                if i & 2 == 0 { min.y } else { max.y },
                if i & 4 == 0 { min.z } else { max.z },
            );
            (center - corner).dot(direction)
        })
        .fold(f32::MIN, f32::max);
    base.max(reach - bounds.depth() * 0.5)
}
