//! Shadow material
//!
//! Shading-side depth comparison. [`ShadowMaterial`] mirrors what the WGSL
//! snippet in `shaders/shadow.wgsl` does on the GPU so results can be checked
//! on the CPU.

use glam::{Mat4, Vec2, Vec3, Vec4};

use super::filter::{self, DepthSource, FilterParams, FilterType};
use super::LightShadowUniforms;

/// Chosen cascade for a view depth.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CascadeSelection {
    pub index: usize,
    /// Weight of the next cascade inside the blend band, `0` outside it.
    pub blend: f32,
}

/// Depth comparison state for one shadow map.
#[derive(Debug, Clone, PartialEq)]
pub struct ShadowMaterial {
    pub enabled: bool,
    pub filter: FilterType,
    pub bias: f32,
    pub normal_bias: f32,
    /// World size of one texel (at unit distance for perspective maps).
    pub texel_world_size: f32,
    pub map_size: u32,
    /// World to light clip space.
    pub shadow_matrix: Mat4,
    pub params: FilterParams,
}

impl Default for ShadowMaterial {
    fn default() -> Self {
        Self {
            enabled: true,
            filter: FilterType::default(),
            bias: 0.003,
            normal_bias: 0.03,
            texel_world_size: 0.0,
            map_size: 1024,
            shadow_matrix: Mat4::IDENTITY,
            params: FilterParams::default(),
        }
    }
}

impl ShadowMaterial {
    /// Material for a filter and bias pair.
    pub fn new(filter: FilterType, bias: f32, normal_bias: f32) -> Self {
        Self {
            filter,
            bias,
            normal_bias,
            ..Default::default()
        }
    }

    /// Material for matrix `index` (cascade or cube face) of a light.
    pub fn from_uniforms(uniforms: &LightShadowUniforms, index: usize) -> Option<Self> {
        let shadow_matrix = *uniforms.shadow_matrices.get(index)?;
        Some(Self {
            enabled: true,
            filter: uniforms.filter,
            bias: uniforms.bias,
            normal_bias: uniforms.normal_bias,
            texel_world_size: uniforms.texel_world_sizes.get(index).copied().unwrap_or(0.0),
            map_size: uniforms.map_size,
            shadow_matrix,
            params: FilterParams::default(),
        })
    }

    /// Visibility in `[0, 1]` of a surface point already transformed by
    /// `shadow_matrix`.
    ///
    /// The point is pushed along the normal by
    /// `max(N.L, 0) * normal_bias * texel_world_size` before the lookup, then
    /// the constant bias is subtracted from its depth. Points outside the
    /// light frustum are lit.
    pub fn calculate_visibility(
        &self,
        light_space_position: Vec4,
        normal: Vec3,
        light_direction: Vec3,
        source: &dyn DepthSource,
    ) -> f32 {
        if !self.enabled || light_space_position.w <= 0.0 {
            return 1.0;
        }

        let n = normal.normalize_or_zero();
        let l = (-light_direction).normalize_or_zero();
        // Scaled by w so perspective maps offset by the texel size at the point's distance
        let offset =
            n.dot(l).max(0.0) * self.normal_bias * self.texel_world_size * light_space_position.w;
        let shifted = light_space_position + self.shadow_matrix * (n * offset).extend(0.0);
        if shifted.w <= 0.0 {
            return 1.0;
        }

        let ndc = shifted.truncate() / shifted.w;
        if ndc.z > 1.0 {
            return 1.0;
        }
        let uv = Vec2::new(ndc.x * 0.5 + 0.5, 0.5 - ndc.y * 0.5);
        let receiver_depth = ndc.z - self.bias;

        filter::sample(self.filter, source, uv, receiver_depth, self.map_size, &self.params)
    }

    /// Convenience over [`calculate_visibility`](Self::calculate_visibility)
    /// for a world-space point.
    pub fn visibility_at(
        &self,
        world_position: Vec3,
        normal: Vec3,
        light_direction: Vec3,
        source: &dyn DepthSource,
    ) -> f32 {
        let light_space = self.shadow_matrix * world_position.extend(1.0);
        self.calculate_visibility(light_space, normal, light_direction, source)
    }

    /// Pick the cascade covering `view_depth`: the first whose end distance is
    /// at or beyond it. `None` past the last cascade or for non-cascaded lights.
    pub fn select_cascade(
        uniforms: &LightShadowUniforms,
        view_depth: f32,
    ) -> Option<CascadeSelection> {
        let splits = uniforms.cascade_splits.as_deref()?;
        let index = splits.iter().position(|&end| view_depth <= end)?;
        let blend = uniforms
            .cascade_starts
            .as_deref()
            .map_or(0.0, |starts| cascade_blend_factor(splits, starts, index, view_depth));
        Some(CascadeSelection { index, blend })
    }

    /// WGSL shadow sampling code with this material's constants prepended.
    pub fn shader_source(&self) -> String {
        let kernel = self.filter.kernel_offsets();
        format!(
            "const SHADOW_FILTER: u32 = {}u;\n\
             const SHADOW_KERNEL_START: i32 = {};\n\
             const SHADOW_KERNEL_END: i32 = {};\n\
             const SHADOW_MIN_VARIANCE: f32 = {:?};\n\
             const SHADOW_LIGHT_BLEED: f32 = {:?};\n\n{}",
            self.filter.code(),
            kernel.start,
            kernel.end,
            self.params.min_variance,
            self.params.light_bleed_reduction,
            SHADOW_WGSL,
        )
    }
}

const SHADOW_WGSL: &str = include_str!("../../shaders/shadow.wgsl");

/// Weight of cascade `index + 1` at `view_depth`, ramping from 0 where the
/// next cascade starts to 1 at the end of cascade `index`.
fn cascade_blend_factor(splits: &[f32], starts: &[f32], index: usize, view_depth: f32) -> f32 {
    let (Some(&end), Some(&next_start)) = (splits.get(index), starts.get(index + 1)) else {
        return 0.0;
    };
    if view_depth < next_start || end <= next_start {
        return 0.0;
    }
    ((view_depth - next_start) / (end - next_start)).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::light::{LightId, LightType};
    use crate::renderer::shadow::filter::DepthBuffer;
    use crate::renderer::viewer::{Camera, Viewer};

    /// Light looking straight down at the origin from y = 10.
    fn overhead_material(filter: FilterType) -> ShadowMaterial {
        let camera = Camera::new_orthographic(
            Vec3::new(0.0, 10.0, 0.0),
            Vec3::ZERO,
            Vec3::Z,
            5.0,
            0.1,
            20.0,
        );
        ShadowMaterial {
            shadow_matrix: camera.view_projection_matrix(),
            map_size: 64,
            texel_world_size: 10.0 / 64.0,
            ..ShadowMaterial::new(filter, 0.002, 0.5)
        }
    }

    fn depth_of(material: &ShadowMaterial, world: Vec3) -> f32 {
        let clip = material.shadow_matrix * world.extend(1.0);
        clip.z / clip.w
    }

    #[test]
    fn test_occluded_point_is_dark() {
        let material = overhead_material(FilterType::None);
        // Occluder at y = 2 covers the whole map
        let occluder = depth_of(&material, Vec3::new(0.0, 2.0, 0.0));
        let map = DepthBuffer::filled(64, occluder);

        let ground = material.visibility_at(Vec3::ZERO, Vec3::Y, Vec3::NEG_Y, &map);
        assert_eq!(ground, 0.0);

        let above = material.visibility_at(Vec3::new(0.0, 4.0, 0.0), Vec3::Y, Vec3::NEG_Y, &map);
        assert_eq!(above, 1.0);
    }

    #[test]
    fn test_outside_frustum_is_lit() {
        let material = overhead_material(FilterType::Pcf3x3);
        let map = DepthBuffer::filled(64, 0.0);

        let beside = material.visibility_at(Vec3::new(50.0, 0.0, 0.0), Vec3::Y, Vec3::NEG_Y, &map);
        assert_eq!(beside, 1.0);
        let below_far =
            material.visibility_at(Vec3::new(0.0, -30.0, 0.0), Vec3::Y, Vec3::NEG_Y, &map);
        assert_eq!(below_far, 1.0);

        let disabled = ShadowMaterial {
            enabled: false,
            ..overhead_material(FilterType::None)
        };
        assert_eq!(disabled.visibility_at(Vec3::ZERO, Vec3::Y, Vec3::NEG_Y, &map), 1.0);
    }

    #[test]
    fn test_bias_removes_self_shadowing() {
        let material = overhead_material(FilterType::None);
        // The ground itself is the stored occluder
        let ground_depth = depth_of(&material, Vec3::ZERO);
        let map = DepthBuffer::filled(64, ground_depth - 0.0005);

        let unbiased = ShadowMaterial {
            bias: 0.0,
            normal_bias: 0.0,
            ..material.clone()
        };
        assert_eq!(unbiased.visibility_at(Vec3::ZERO, Vec3::Y, Vec3::NEG_Y, &map), 0.0);
        assert_eq!(material.visibility_at(Vec3::ZERO, Vec3::Y, Vec3::NEG_Y, &map), 1.0);
    }

    #[test]
    fn test_normal_offset_moves_toward_light() {
        let material = overhead_material(FilterType::None);
        let ground = Vec3::ZERO;
        let shadowless = DepthBuffer::filled(64, 1.0);

        let base = material.shadow_matrix * ground.extend(1.0);
        // Facing the light: offset applied
        let n = Vec3::Y;
        let offset = material.normal_bias * material.texel_world_size;
        let expected = depth_of(&material, ground + n * offset);
        assert!(expected < depth_of(&material, ground));

        // Facing away: no offset, still lit because nothing occludes
        assert_eq!(material.calculate_visibility(base, Vec3::NEG_Y, Vec3::NEG_Y, &shadowless), 1.0);
    }

    fn cascaded_uniforms() -> LightShadowUniforms {
        LightShadowUniforms {
            light_id: LightId(1),
            light_type: LightType::Directional,
            shadow_matrices: vec![Mat4::IDENTITY; 3],
            texel_world_sizes: vec![0.01, 0.05, 0.2],
            bias: 0.002,
            normal_bias: 0.02,
            filter: FilterType::Pcf4x4,
            map_size: 2048,
            cascade_splits: Some(vec![10.0, 40.0, 100.0]),
            cascade_starts: Some(vec![0.1, 9.0, 37.0]),
            light_position: None,
            far: 100.0,
        }
    }

    #[test]
    fn test_select_cascade() {
        let uniforms = cascaded_uniforms();

        let near = ShadowMaterial::select_cascade(&uniforms, 2.0).unwrap();
        assert_eq!(near, CascadeSelection { index: 0, blend: 0.0 });

        let band = ShadowMaterial::select_cascade(&uniforms, 9.5).unwrap();
        assert_eq!(band.index, 0);
        assert!((band.blend - 0.5).abs() < 1e-5);

        assert_eq!(ShadowMaterial::select_cascade(&uniforms, 70.0).unwrap().index, 2);
        assert!(ShadowMaterial::select_cascade(&uniforms, 150.0).is_none());

        let material = ShadowMaterial::from_uniforms(&uniforms, 1).unwrap();
        assert_eq!(material.texel_world_size, 0.05);
        assert!(ShadowMaterial::from_uniforms(&uniforms, 3).is_none());
    }

    #[test]
    fn test_shader_source_constants() {
        let source = ShadowMaterial::new(FilterType::Pcf4x4, 0.002, 0.02).shader_source();
        assert!(source.starts_with("const SHADOW_FILTER: u32 = 3u;"));
        assert!(source.contains("const SHADOW_KERNEL_START: i32 = -2;"));
        assert!(source.contains("const SHADOW_KERNEL_END: i32 = 2;"));
        assert!(source.contains("fn shadow_visibility"));
        assert!(source.contains("fn shadow_cascade_visibility"));
    }

    #[test]
    fn test_shader_uniform_matches_gpu_layout() {
        // Field order of ShadowUniform
        let fields = [
            "light_matrices: array<mat4x4<f32>, 6>",
            "cascade_splits: vec4<f32>",
            "cascade_starts: vec4<f32>",
            "texel_world_sizes: array<vec4<f32>, 2>",
            "params: vec4<f32>",
            "light_position: vec4<f32>",
            "flags: vec4<u32>",
        ];
        let positions: Vec<_> = fields
            .iter()
            .map(|field| SHADOW_WGSL.find(field).unwrap_or_else(|| panic!("missing {field}")))
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }
}
