//! Shared fixtures for the shadow benchmarks.

use penumbra::context::HeadlessBackend;
use penumbra::glam::Vec3;
use penumbra::renderer::shadow::{DepthBuffer, ShadowPass};
use penumbra::{Camera, DirectionalLight, Light, LightId, PointLight, ShadowScene, SpotLight};

/// Scene that accepts every caster pass without drawing anything.
pub struct NullScene {
    pub lights: Vec<Light>,
    pub passes: usize,
}

impl ShadowScene<HeadlessBackend> for NullScene {
    fn light(&self, id: LightId) -> Option<&Light> {
        self.lights.iter().find(|l| l.id == id)
    }

    fn render_shadow_casters(
        &mut self,
        _backend: &mut HeadlessBackend,
        _pass: &ShadowPass,
    ) -> anyhow::Result<()> {
        self.passes += 1;
        Ok(())
    }
}

/// Typical first-person view camera.
pub fn view_camera() -> Camera {
    Camera::new_perspective(
        Vec3::new(0.0, 1.8, 8.0),
        Vec3::new(0.0, 1.5, 0.0),
        Vec3::Y,
        70.0,
        16.0 / 9.0,
        0.1,
        500.0,
    )
}

/// One sun, then alternating point and spot lights.
pub fn mixed_lights(n: usize) -> Vec<Light> {
    let mut lights: Vec<Light> = vec![(LightId(0), DirectionalLight::default()).into()];
    for i in 1..n as u64 {
        let offset = Vec3::new((i % 8) as f32 * 4.0, 3.0, (i / 8) as f32 * 4.0);
        let light = if i % 2 == 0 {
            (LightId(i), PointLight::white(1.0, offset, 15.0)).into()
        } else {
            (LightId(i), SpotLight::white(1.0, offset, offset - Vec3::Y * 3.0, 35.0)).into()
        };
        lights.push(light);
    }
    lights
}

/// Map with a noisy occluder pattern and matching moments.
pub fn noisy_depth_map(size: u32) -> DepthBuffer {
    let mut map = DepthBuffer::new(size);
    for y in 0..size {
        for x in 0..size {
            let d = 0.3 + 0.4 * (((x * 7 + y * 13) % 17) as f32 / 17.0);
            map.set(x, y, d);
            map.set_moments(x, y, penumbra::glam::Vec2::new(d, d * d + 0.0004));
        }
    }
    map
}
