//! Point light shadow mapping
//!
//! Omnidirectional shadows rendered as six 90 degree perspective views, one
//! depth target per cube face.

use glam::Vec3;

use super::generator::LightView;
use super::scene::{CubeFace, PassFace};
use super::settings::GeneratorSettings;
use crate::core::{DepthRenderTarget, ShadowMapKind};
use crate::renderer::light::PointLight;
use crate::renderer::viewer::Camera;

/// Far plane used when a point light has no influence distance.
pub const DEFAULT_POINT_FAR: f32 = 100.0;

/// Point light shadow mapper.
#[derive(Debug, Default)]
pub struct PointShadowGenerator {
    targets: Vec<DepthRenderTarget>,
}

impl PointShadowGenerator {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Face targets in [`CubeFace::ALL`] order.
    pub fn targets(&self) -> &[DepthRenderTarget] {
        &self.targets
    }

    /// Target of a single cube face.
    pub fn face_target(&self, face: CubeFace) -> Option<&DepthRenderTarget> {
        self.targets.get(face.index())
    }

    /// Cube face a light-to-fragment direction falls on.
    pub fn face_for_direction(direction: Vec3) -> CubeFace {
        CubeFace::from_direction(direction)
    }

    pub(crate) fn targets_mut(&mut self) -> &mut Vec<DepthRenderTarget> {
        &mut self.targets
    }

    pub(crate) fn target_count() -> usize {
        CubeFace::ALL.len()
    }

    pub(crate) fn map_kind() -> ShadowMapKind {
        ShadowMapKind::Omnidirectional
    }

    pub(crate) fn light_views(
        &self,
        light: &PointLight,
        settings: &GeneratorSettings,
    ) -> Vec<LightView> {
        let far = if light.distance > 0.0 {
            light.distance
        } else {
            DEFAULT_POINT_FAR
        };
        let near = settings.near.min(far * 0.5);
        let position = light.position;

        CubeFace::ALL
            .iter()
            .map(|&face| LightView {
                camera: Camera::new_perspective(
                    position,
                    position + face.direction(),
                    face.up(),
                    90.0,
                    1.0,
                    near,
                    far,
                ),
                face: PassFace::Cube(face),
                // 2 * tan(45 deg)
                extent: 2.0,
                range: None,
            })
            .collect()
    }
}
