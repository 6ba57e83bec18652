//! Spot light shadow mapping

use glam::Vec3;

use super::cascade::LightBasis;
use super::generator::LightView;
use super::scene::PassFace;
use super::settings::GeneratorSettings;
use crate::core::{DepthRenderTarget, ShadowMapKind};
use crate::renderer::light::SpotLight;
use crate::renderer::viewer::Camera;

/// Distance kept past the spot target.
const SPOT_FAR_MARGIN: f32 = 10.0;

/// Widest field of view a spot shadow camera may use.
const MAX_SPOT_FOV_DEGREES: f32 = 170.0;

/// Extra cone widening per unit of penumbra.
const PENUMBRA_PADDING: f32 = 0.25;

/// Spot light shadow mapper.
#[derive(Debug, Default)]
pub struct SpotShadowGenerator {
    targets: Vec<DepthRenderTarget>,
}

impl SpotShadowGenerator {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// The single depth target.
    pub fn target(&self) -> Option<&DepthRenderTarget> {
        self.targets.first()
    }

    /// Field of view of the shadow camera in radians: the full cone plus
    /// penumbra padding.
    pub fn field_of_view(light: &SpotLight) -> f32 {
        let padded = 2.0 * light.angle * (1.0 + PENUMBRA_PADDING * light.penumbra.clamp(0.0, 1.0));
        padded.clamp(1f32.to_radians(), MAX_SPOT_FOV_DEGREES.to_radians())
    }

    pub(crate) fn targets(&self) -> &[DepthRenderTarget] {
        &self.targets
    }

    pub(crate) fn targets_mut(&mut self) -> &mut Vec<DepthRenderTarget> {
        &mut self.targets
    }

    pub(crate) fn target_count() -> usize {
        1
    }

    pub(crate) fn map_kind() -> ShadowMapKind {
        ShadowMapKind::Basic
    }

    pub(crate) fn light_views(
        &self,
        light: &SpotLight,
        settings: &GeneratorSettings,
    ) -> Vec<LightView> {
        let direction = light.direction();
        let far = light.position.distance(light.target) + SPOT_FAR_MARGIN;
        let near = settings.near.min(far * 0.5);
        let fov = Self::field_of_view(light);
        let up = LightBasis::from_direction(direction).up;

        vec![LightView {
            camera: Camera::new_perspective(
                light.position,
                light.position + direction,
                up,
                fov.to_degrees(),
                1.0,
                near,
                far,
            ),
            face: PassFace::Single,
            extent: 2.0 * (fov * 0.5).tan(),
            range: None,
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camera_aims_at_target() {
        let generator = SpotShadowGenerator::new();
        let light = SpotLight::white(1.0, Vec3::new(0.0, 8.0, 0.0), Vec3::new(2.0, 0.0, 0.0), 30.0);
        let views = generator.light_views(&light, &GeneratorSettings::default());

        assert_eq!(views.len(), 1);
        let camera = &views[0].camera;
        assert_eq!(camera.position, light.position);
        assert!((camera.forward() - light.direction()).length() < 1e-5);
        let expected_far = light.position.distance(light.target) + SPOT_FAR_MARGIN;
        assert!((camera.far() - expected_far).abs() < 1e-4);
        assert_eq!(views[0].face, PassFace::Single);
    }

    #[test]
    fn test_penumbra_widens_fov() {
        let sharp = SpotLight::white(1.0, Vec3::Y, Vec3::ZERO, 30.0);
        let soft = sharp.clone().with_penumbra(1.0);

        let sharp_fov = SpotShadowGenerator::field_of_view(&sharp);
        assert!((sharp_fov - 60f32.to_radians()).abs() < 1e-5);
        assert!(SpotShadowGenerator::field_of_view(&soft) > sharp_fov);

        let wide = SpotLight::white(1.0, Vec3::Y, Vec3::ZERO, 89.0).with_penumbra(1.0);
        let max_fov = MAX_SPOT_FOV_DEGREES.to_radians();
        assert!(SpotShadowGenerator::field_of_view(&wide) <= max_fov + 1e-6);
    }
}
