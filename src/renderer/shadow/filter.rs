//! Shadow filtering
//!
//! CPU reference implementation of the sampling strategies used by the
//! lighting shaders. Each filter turns a stored depth (or moment) sample and a
//! receiver depth into a visibility factor in `[0, 1]`.

use glam::{IVec2, Vec2};

/// Filtering strategy for shadow lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FilterType {
    /// Single depth comparison.
    None,
    Pcf2x2,
    #[default]
    Pcf3x3,
    Pcf4x4,
    Pcf8x8,
    /// Variance shadow map (Chebyshev upper bound over depth moments).
    Vsm,
}

impl FilterType {
    /// PCF kernel width, or 1 for single-tap filters.
    pub fn kernel_size(self) -> u32 {
        match self {
            FilterType::None | FilterType::Vsm => 1,
            FilterType::Pcf2x2 => 2,
            FilterType::Pcf3x3 => 3,
            FilterType::Pcf4x4 => 4,
            FilterType::Pcf8x8 => 8,
        }
    }

    /// Number of depth taps per lookup.
    pub fn tap_count(self) -> u32 {
        self.kernel_size() * self.kernel_size()
    }

    /// Whether the filter reads a moment texture.
    pub fn requires_moments(self) -> bool {
        matches!(self, FilterType::Vsm)
    }

    /// Stable integer code used in GPU uniforms and shader constants.
    pub fn code(self) -> u32 {
        match self {
            FilterType::None => 0,
            FilterType::Pcf2x2 => 1,
            FilterType::Pcf3x3 => 2,
            FilterType::Pcf4x4 => 3,
            FilterType::Pcf8x8 => 4,
            FilterType::Vsm => 5,
        }
    }

    /// Texel offsets of the PCF kernel along one axis.
    ///
    /// Odd kernels are centered; even kernels take `k` consecutive offsets
    /// starting at `-(k / 2)`.
    pub fn kernel_offsets(self) -> std::ops::Range<i32> {
        let k = self.kernel_size() as i32;
        let start = -(k / 2);
        start..start + k
    }
}

/// Tuning knobs for the filters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterParams {
    /// Minimum variance for VSM, avoids division by zero on flat occluders.
    pub min_variance: f32,
    /// VSM light-bleed reduction: probabilities below this become fully shadowed.
    pub light_bleed_reduction: f32,
}

impl Default for FilterParams {
    fn default() -> Self {
        Self {
            min_variance: 0.00002,
            light_bleed_reduction: 0.2,
        }
    }
}

/// Readable shadow map contents.
pub trait DepthSource {
    /// Square size in texels.
    fn size(&self) -> u32;

    /// Stored depth at a texel. Coordinates are clamped to the map edge.
    fn depth(&self, texel: IVec2) -> f32;

    /// Stored `(E[d], E[d^2])` at a texel. Coordinates are clamped.
    fn moments(&self, texel: IVec2) -> Vec2;
}

/// CPU copy of a shadow map, e.g. read back from the GPU.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthBuffer {
    size: u32,
    depth: Vec<f32>,
    moments: Option<Vec<Vec2>>,
}

impl DepthBuffer {
    /// A map cleared to "no occluder".
    pub fn new(size: u32) -> Self {
        Self::filled(size, 1.0)
    }

    /// A map where every texel stores `depth`.
    pub fn filled(size: u32, depth: f32) -> Self {
        let len = size as usize * size as usize;
        Self {
            size,
            depth: vec![depth; len],
            moments: None,
        }
    }

    /// Wrap read-back depth values (row-major, `size * size`).
    pub fn from_depths(size: u32, depth: Vec<f32>) -> Option<Self> {
        (depth.len() == size as usize * size as usize).then_some(Self {
            size,
            depth,
            moments: None,
        })
    }

    /// Attach read-back moments (row-major, `size * size`).
    pub fn with_moments(mut self, moments: Vec<Vec2>) -> Option<Self> {
        if moments.len() != self.depth.len() {
            return None;
        }
        self.moments = Some(moments);
        Some(self)
    }

    /// Write a depth value, deriving its moments if a moment channel exists.
    pub fn set(&mut self, x: u32, y: u32, depth: f32) {
        if x >= self.size || y >= self.size {
            return;
        }
        let i = (y * self.size + x) as usize;
        self.depth[i] = depth;
        if let Some(moments) = self.moments.as_mut() {
            moments[i] = Vec2::new(depth, depth * depth);
        }
    }

    /// Write explicit moments (e.g. after a blur).
    pub fn set_moments(&mut self, x: u32, y: u32, moments: Vec2) {
        if x >= self.size || y >= self.size {
            return;
        }
        let i = (y * self.size + x) as usize;
        let len = self.depth.len();
        self.moments.get_or_insert_with(|| vec![Vec2::ONE; len])[i] = moments;
    }

    fn index(&self, texel: IVec2) -> usize {
        let max = self.size as i32 - 1;
        let x = texel.x.clamp(0, max) as usize;
        let y = texel.y.clamp(0, max) as usize;
        y * self.size as usize + x
    }
}

impl DepthSource for DepthBuffer {
    fn size(&self) -> u32 {
        self.size
    }

    fn depth(&self, texel: IVec2) -> f32 {
        if self.size == 0 {
            return 1.0;
        }
        self.depth[self.index(texel)]
    }

    fn moments(&self, texel: IVec2) -> Vec2 {
        if self.size == 0 {
            return Vec2::ONE;
        }
        let i = self.index(texel);
        match &self.moments {
            Some(moments) => moments[i],
            None => {
                let d = self.depth[i];
                Vec2::new(d, d * d)
            }
        }
    }
}

/// Convert a UV coordinate into the texel containing it.
fn texel_at(uv: Vec2, texture_size: u32) -> IVec2 {
    let size = texture_size as f32;
    IVec2::new((uv.x * size).floor() as i32, (uv.y * size).floor() as i32)
}

fn uv_in_bounds(uv: Vec2) -> bool {
    uv.is_finite() && (0.0..=1.0).contains(&uv.x) && (0.0..=1.0).contains(&uv.y)
}

/// Visibility of a receiver given `(E[d], E[d^2])` moments.
///
/// Receivers in front of the mean occluder depth are fully lit. Behind it
/// the Chebyshev upper bound is remapped to cut light bleeding.
pub fn chebyshev_visibility(moments: Vec2, receiver_depth: f32, params: &FilterParams) -> f32 {
    let mean = moments.x;
    if receiver_depth <= mean {
        return 1.0;
    }

    let variance = (moments.y - mean * mean).max(params.min_variance);
    let d = receiver_depth - mean;
    let p = (variance / (variance + d * d)).clamp(0.0, 1.0);

    let bleed = params.light_bleed_reduction.clamp(0.0, 0.999);
    ((p - bleed) / (1.0 - bleed)).clamp(0.0, 1.0)
}

/// Sample a shadow map with a filter.
///
/// Returns `1.0` (fully lit) for UVs outside `[0, 1]^2`.
pub fn sample(
    filter: FilterType,
    source: &dyn DepthSource,
    uv: Vec2,
    receiver_depth: f32,
    texture_size: u32,
    params: &FilterParams,
) -> f32 {
    if !uv_in_bounds(uv) || texture_size == 0 {
        return 1.0;
    }
    let center = texel_at(uv, texture_size);

    match filter {
        FilterType::None => {
            if receiver_depth <= source.depth(center) {
                1.0
            } else {
                0.0
            }
        }
        FilterType::Vsm => chebyshev_visibility(source.moments(center), receiver_depth, params),
        FilterType::Pcf2x2 | FilterType::Pcf3x3 | FilterType::Pcf4x4 | FilterType::Pcf8x8 => {
            let mut lit = 0u32;
            for dy in filter.kernel_offsets() {
                for dx in filter.kernel_offsets() {
                    if receiver_depth <= source.depth(center + IVec2::new(dx, dy)) {
                        lit += 1;
                    }
                }
            }
            lit as f32 / filter.tap_count() as f32
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_FILTERS: [FilterType; 6] = [
        FilterType::None,
        FilterType::Pcf2x2,
        FilterType::Pcf3x3,
        FilterType::Pcf4x4,
        FilterType::Pcf8x8,
        FilterType::Vsm,
    ];

    fn half_shadowed(size: u32) -> DepthBuffer {
        // Left half has an occluder at depth 0.3
        let mut map = DepthBuffer::new(size);
        for y in 0..size {
            for x in 0..size / 2 {
                map.set(x, y, 0.3);
            }
        }
        map
    }

    #[test]
    fn test_kernel_offsets() {
        assert_eq!(FilterType::Pcf3x3.kernel_offsets(), -1..2);
        assert_eq!(FilterType::Pcf2x2.kernel_offsets(), -1..1);
        assert_eq!(FilterType::Pcf4x4.kernel_offsets(), -2..2);
        assert_eq!(FilterType::Pcf8x8.kernel_offsets().len(), 8);
        assert_eq!(FilterType::None.kernel_offsets(), 0..1);
    }

    #[test]
    fn test_pcf_receiver_in_front_is_lit() {
        let map = DepthBuffer::filled(16, 0.5);
        let v = sample(
            FilterType::Pcf3x3,
            &map,
            Vec2::new(0.5, 0.5),
            0.4,
            16,
            &FilterParams::default(),
        );
        assert_eq!(v, 1.0);
    }

    #[test]
    fn test_out_of_bounds_uv_is_lit() {
        let map = DepthBuffer::filled(16, 0.0);
        for filter in ALL_FILTERS {
            for uv in [Vec2::new(1.5, 0.2), Vec2::new(-0.1, 0.5), Vec2::new(0.5, 1.01)] {
                assert_eq!(sample(filter, &map, uv, 0.9, 16, &FilterParams::default()), 1.0);
            }
        }
    }

    #[test]
    fn test_visibility_in_unit_range() {
        let map = half_shadowed(32);
        let params = FilterParams::default();
        for filter in ALL_FILTERS {
            for i in 0..=20 {
                let uv = Vec2::new(i as f32 / 20.0, 0.5);
                for &depth in &[0.0, 0.29, 0.3, 0.31, 0.5, 1.0] {
                    let v = sample(filter, &map, uv, depth, 32, &params);
                    assert!((0.0..=1.0).contains(&v), "{filter:?} returned {v}");
                }
            }
        }
    }

    #[test]
    fn test_pcf_softens_edge() {
        let map = half_shadowed(32);
        let params = FilterParams::default();
        // Texel 16 is the first lit column; a 3x3 kernel straddles the edge
        let uv = Vec2::new(16.5 / 32.0, 0.5);

        assert_eq!(sample(FilterType::None, &map, uv, 0.5, 32, &params), 1.0);
        let soft = sample(FilterType::Pcf3x3, &map, uv, 0.5, 32, &params);
        assert!((soft - 2.0 / 3.0).abs() < 1e-6);

        let deep = Vec2::new(4.5 / 32.0, 0.5);
        assert_eq!(sample(FilterType::Pcf8x8, &map, deep, 0.5, 32, &params), 0.0);
    }

    #[test]
    fn test_vsm_monotonic_behind_occluder() {
        let params = FilterParams::default();
        let moments = Vec2::new(0.4, 0.4 * 0.4 + 0.001);

        let mut last = 1.0;
        for i in 0..=60 {
            let depth = 0.4 + i as f32 * 0.01;
            let v = chebyshev_visibility(moments, depth, &params);
            assert!(v <= last + 1e-6, "visibility increased at depth {depth}");
            last = v;
        }
        assert_eq!(chebyshev_visibility(moments, 0.3, &params), 1.0);
    }

    #[test]
    fn test_vsm_light_bleed_reduction() {
        let moments = Vec2::new(0.4, 0.4 * 0.4 + 0.01);
        let raw = chebyshev_visibility(
            moments,
            0.6,
            &FilterParams {
                light_bleed_reduction: 0.0,
                ..Default::default()
            },
        );
        let reduced = chebyshev_visibility(moments, 0.6, &FilterParams::default());
        assert!(raw > 0.0);
        assert!(reduced < raw);
    }

    #[test]
    fn test_depth_buffer_shape_checks() {
        assert!(DepthBuffer::from_depths(4, vec![1.0; 15]).is_none());
        let map = DepthBuffer::from_depths(2, vec![0.1, 0.2, 0.3, 0.4]).unwrap();
        assert_eq!(map.depth(IVec2::new(1, 1)), 0.4);
        // Clamped to edge
        assert_eq!(map.depth(IVec2::new(5, -3)), 0.2);
        assert!(map.with_moments(vec![Vec2::ZERO; 3]).is_none());
    }
}
