//! Shadow mapping module
//!
//! Provides shadow map generation for directional (cascaded), point
//! (omnidirectional) and spot lights, CPU reference filtering, and the
//! [`ShadowManager`] that schedules generators each frame.
//!
//! The manager's [`ShadowManager::shadow_uniforms`] is the only data handed to
//! the lighting stage; shading code never reaches into generators.

pub mod cascade;
mod directional;
pub mod filter;
mod generator;
mod manager;
mod material;
mod point;
mod scene;
mod settings;
mod spot;

pub use cascade::{Cascade, LightBasis, LightSpaceBounds};
pub use directional::DirectionalShadowGenerator;
pub use filter::{DepthBuffer, DepthSource, FilterParams, FilterType};
pub use generator::{GeneratorState, GeneratorVariant, ShadowGenerator, UpdateOutcome};
pub use manager::{GeneratorMetrics, PerformanceMetrics, ShadowManager};
pub use material::{CascadeSelection, ShadowMaterial};
pub use point::PointShadowGenerator;
pub use scene::{CubeFace, PassFace, ShadowPass, ShadowScene};
pub use settings::{
    CascadeSettings, GeneratorOptions, GeneratorSettings, QualitySettings, ShadowManagerConfig,
    ShadowQuality, MAX_CASCADES,
};
pub use spot::SpotShadowGenerator;

use glam::{Mat4, Vec3};

use crate::renderer::light::{LightId, LightType};

/// Maximum matrices per light (six cube faces).
pub const MAX_SHADOW_MATRICES: usize = 6;

/// Complete per-light shadow payload for the shading stage.
#[derive(Debug, Clone, PartialEq)]
pub struct LightShadowUniforms {
    pub light_id: LightId,
    pub light_type: LightType,
    /// One matrix per cascade, per cube face, or a single matrix for spots.
    pub shadow_matrices: Vec<Mat4>,
    /// World size of one texel per matrix. Perspective maps report the size at
    /// unit distance from the light.
    pub texel_world_sizes: Vec<f32>,
    pub bias: f32,
    pub normal_bias: f32,
    pub filter: FilterType,
    pub map_size: u32,
    /// End distance of each cascade in view units (directional only).
    pub cascade_splits: Option<Vec<f32>>,
    /// Start distance of each cascade including its blend band (directional only).
    pub cascade_starts: Option<Vec<f32>>,
    /// Light position for point and spot lights.
    pub light_position: Option<Vec3>,
    /// Far plane of the light cameras.
    pub far: f32,
}

impl LightShadowUniforms {
    /// Pack into the fixed GPU layout.
    pub fn to_gpu(&self) -> ShadowUniform {
        let mut light_matrices = [[[0.0; 4]; 4]; MAX_SHADOW_MATRICES];
        for (slot, matrix) in light_matrices.iter_mut().zip(&self.shadow_matrices) {
            *slot = matrix.to_cols_array_2d();
        }

        let cascade_splits = pack_cascades(self.cascade_splits.as_deref());
        let cascade_starts = pack_cascades(self.cascade_starts.as_deref());

        let mut texel_world_sizes = [[0.0; 4]; 2];
        let slots = texel_world_sizes.iter_mut().flatten();
        for (slot, size) in slots.zip(&self.texel_world_sizes) {
            *slot = *size;
        }

        let position = self.light_position.unwrap_or(Vec3::ZERO);
        let light_type = match self.light_type {
            LightType::Directional => 0,
            LightType::Point => 1,
            LightType::Spot => 2,
            LightType::Ambient => 3,
        };

        ShadowUniform {
            light_matrices,
            cascade_splits,
            cascade_starts,
            texel_world_sizes,
            params: [
                self.bias,
                self.normal_bias,
                self.map_size as f32,
                self.far,
            ],
            light_position: [position.x, position.y, position.z, 1.0],
            flags: [
                self.filter.code(),
                self.shadow_matrices.len().min(MAX_SHADOW_MATRICES) as u32,
                light_type,
                0,
            ],
        }
    }
}

fn pack_cascades(values: Option<&[f32]>) -> [f32; MAX_CASCADES as usize] {
    let mut packed = [0.0; MAX_CASCADES as usize];
    for (slot, value) in packed.iter_mut().zip(values.unwrap_or_default()) {
        *slot = *value;
    }
    packed
}

/// Shadow uniform data for GPU.
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ShadowUniform {
    /// Light space matrices (world to light clip space).
    pub light_matrices: [[[f32; 4]; 4]; MAX_SHADOW_MATRICES],
    /// Cascade end distances in view units.
    pub cascade_splits: [f32; MAX_CASCADES as usize],
    /// Cascade start distances, blend band included.
    pub cascade_starts: [f32; MAX_CASCADES as usize],
    /// World size of one texel per matrix, four per row.
    pub texel_world_sizes: [[f32; 4]; 2],
    /// Bias, normal bias, shadow map size, far plane.
    pub params: [f32; 4],
    /// Light position (w = 1).
    pub light_position: [f32; 4],
    /// Filter code, matrix count, light type, unused.
    pub flags: [u32; 4],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shadow_uniform_size() {
        // 6 mat4 (384) + 7 vec4 (112)
        assert_eq!(std::mem::size_of::<ShadowUniform>(), 496);
        assert_eq!(std::mem::size_of::<ShadowUniform>() % 16, 0);
    }

    #[test]
    fn test_uniform_packing() {
        let uniforms = LightShadowUniforms {
            light_id: LightId(1),
            light_type: LightType::Directional,
            shadow_matrices: vec![Mat4::IDENTITY, Mat4::from_scale(Vec3::splat(2.0))],
            texel_world_sizes: vec![0.01, 0.04],
            bias: 0.002,
            normal_bias: 0.02,
            filter: FilterType::Pcf4x4,
            map_size: 2048,
            cascade_splits: Some(vec![20.0, 100.0]),
            cascade_starts: Some(vec![0.1, 18.0]),
            light_position: None,
            far: 100.0,
        };

        let gpu = uniforms.to_gpu();
        assert_eq!(gpu.flags, [FilterType::Pcf4x4.code(), 2, 0, 0]);
        assert_eq!(gpu.cascade_splits, [20.0, 100.0, 0.0, 0.0]);
        assert_eq!(gpu.cascade_starts, [0.1, 18.0, 0.0, 0.0]);
        assert_eq!(gpu.texel_world_sizes, [[0.01, 0.04, 0.0, 0.0], [0.0; 4]]);
        assert_eq!(gpu.params[2], 2048.0);
        assert_eq!(gpu.light_matrices[1][0][0], 2.0);
        assert_eq!(gpu.light_matrices[2], [[0.0; 4]; 4]);

        let bytes: &[u8] = bytemuck::bytes_of(&gpu);
        assert_eq!(bytes.len(), 496);
    }

    #[test]
    fn test_cube_texel_sizes_spill_into_second_row() {
        let uniforms = LightShadowUniforms {
            light_id: LightId(4),
            light_type: LightType::Point,
            shadow_matrices: vec![Mat4::IDENTITY; 6],
            texel_world_sizes: vec![0.5; 6],
            bias: 0.003,
            normal_bias: 0.03,
            filter: FilterType::Pcf3x3,
            map_size: 1024,
            cascade_splits: None,
            cascade_starts: None,
            light_position: Some(Vec3::new(1.0, 2.0, 3.0)),
            far: 25.0,
        };

        let gpu = uniforms.to_gpu();
        assert_eq!(gpu.texel_world_sizes, [[0.5; 4], [0.5, 0.5, 0.0, 0.0]]);
        assert_eq!(gpu.cascade_starts, [0.0; 4]);
        assert_eq!(gpu.light_position, [1.0, 2.0, 3.0, 1.0]);
        assert_eq!(gpu.flags[1], 6);
    }
}
