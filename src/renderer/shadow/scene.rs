//! Scene traversal contract
//!
//! The shadow subsystem does not know about meshes. Each frame it asks the
//! scene for lights and, once per cascade or cube face, to draw its shadow
//! casters into the currently bound target.

use glam::{Mat4, Vec3};

use crate::context::{FramebufferHandle, GraphicsBackend, Viewport};
use crate::renderer::light::{Light, LightId};

/// Six faces of an omnidirectional shadow, in cube map order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CubeFace {
    PositiveX,
    NegativeX,
    PositiveY,
    NegativeY,
    PositiveZ,
    NegativeZ,
}

impl CubeFace {
    /// All faces in cube map order.
    pub const ALL: [CubeFace; 6] = [
        CubeFace::PositiveX,
        CubeFace::NegativeX,
        CubeFace::PositiveY,
        CubeFace::NegativeY,
        CubeFace::PositiveZ,
        CubeFace::NegativeZ,
    ];

    /// Index into cube map arrays.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Direction the face camera looks along.
    pub fn direction(self) -> Vec3 {
        match self {
            CubeFace::PositiveX => Vec3::X,
            CubeFace::NegativeX => Vec3::NEG_X,
            CubeFace::PositiveY => Vec3::Y,
            CubeFace::NegativeY => Vec3::NEG_Y,
            CubeFace::PositiveZ => Vec3::Z,
            CubeFace::NegativeZ => Vec3::NEG_Z,
        }
    }

    /// Up vector of the face camera. The Y faces use Z so up never
    /// parallels the view direction.
    pub fn up(self) -> Vec3 {
        match self {
            CubeFace::PositiveY => Vec3::Z,
            CubeFace::NegativeY => Vec3::NEG_Z,
            _ => Vec3::NEG_Y,
        }
    }

    /// Face whose frustum contains a direction (dominant axis).
    pub fn from_direction(direction: Vec3) -> CubeFace {
        let a = direction.abs();
        if a.x >= a.y && a.x >= a.z {
            if direction.x >= 0.0 {
                CubeFace::PositiveX
            } else {
                CubeFace::NegativeX
            }
        } else if a.y >= a.z {
            if direction.y >= 0.0 {
                CubeFace::PositiveY
            } else {
                CubeFace::NegativeY
            }
        } else if direction.z >= 0.0 {
            CubeFace::PositiveZ
        } else {
            CubeFace::NegativeZ
        }
    }

    fn label(self) -> &'static str {
        match self {
            CubeFace::PositiveX => "+x",
            CubeFace::NegativeX => "-x",
            CubeFace::PositiveY => "+y",
            CubeFace::NegativeY => "-y",
            CubeFace::PositiveZ => "+z",
            CubeFace::NegativeZ => "-z",
        }
    }
}

impl std::fmt::Display for CubeFace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Which slice of a light's shadow a pass renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassFace {
    Single,
    Cascade(usize),
    Cube(CubeFace),
}

/// Everything a scene renderer needs to draw casters for one pass.
#[derive(Debug, Clone, Copy)]
pub struct ShadowPass {
    pub light_id: LightId,
    pub face: PassFace,
    pub view: Mat4,
    pub projection: Mat4,
    pub view_projection: Mat4,
    pub framebuffer: FramebufferHandle,
    pub viewport: Viewport,
    /// Light position, for writing linear distance in omnidirectional passes.
    pub light_position: Vec3,
    /// Far plane of the light camera.
    pub far: f32,
}

/// Scene as seen by the shadow subsystem.
pub trait ShadowScene<B: GraphicsBackend + ?Sized> {
    /// Look up a light by id.
    fn light(&self, id: LightId) -> Option<&Light>;

    /// World-space bounds of all shadow casters, if known.
    fn scene_bounds(&self) -> Option<(Vec3, Vec3)> {
        None
    }

    /// Draw shadow casters into the bound target.
    fn render_shadow_casters(&mut self, backend: &mut B, pass: &ShadowPass) -> anyhow::Result<()>;
}

/// Scene double that records every pass and can be told to fail.
#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::context::HeadlessBackend;

    #[derive(Debug, Default)]
    pub(crate) struct RecordingScene {
        pub lights: Vec<Light>,
        pub passes: Vec<ShadowPass>,
        pub bounds: Option<(Vec3, Vec3)>,
        /// Fail this many upcoming passes, whatever the light.
        pub failures_remaining: u32,
        /// Fail every pass of this light.
        pub broken_light: Option<LightId>,
        /// Let this many passes through, then fail the next one once.
        pub fail_after: Option<u32>,
    }

    impl RecordingScene {
        pub(crate) fn with_lights(lights: impl IntoIterator<Item = Light>) -> Self {
            Self {
                lights: lights.into_iter().collect(),
                ..Default::default()
            }
        }

        pub(crate) fn light_mut(&mut self, id: LightId) -> Option<&mut Light> {
            self.lights.iter_mut().find(|l| l.id == id)
        }
    }

    impl ShadowScene<HeadlessBackend> for RecordingScene {
        fn light(&self, id: LightId) -> Option<&Light> {
            self.lights.iter().find(|l| l.id == id)
        }

        fn scene_bounds(&self) -> Option<(Vec3, Vec3)> {
            self.bounds
        }

        fn render_shadow_casters(
            &mut self,
            backend: &mut HeadlessBackend,
            pass: &ShadowPass,
        ) -> anyhow::Result<()> {
            assert_eq!(backend.bound_framebuffer(), Some(pass.framebuffer));
            if self.broken_light == Some(pass.light_id) {
                anyhow::bail!("mesh buffers lost for light {}", pass.light_id);
            }
            if self.failures_remaining > 0 {
                self.failures_remaining -= 1;
                anyhow::bail!("draw call rejected");
            }
            match self.fail_after {
                Some(0) => {
                    self.fail_after = None;
                    anyhow::bail!("depth pass aborted");
                }
                Some(remaining) => self.fail_after = Some(remaining - 1),
                None => {}
            }
            self.passes.push(*pass);
            Ok(())
        }
    }
}
