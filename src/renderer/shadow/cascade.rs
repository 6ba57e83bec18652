//! Cascade math
//!
//! Stateless helpers for cascaded shadow maps: split distances, sub-frustum
//! corners and light-space bounding boxes.

use glam::Vec3;

use crate::renderer::viewer::{Camera, Projection};

/// Fraction of the larger light-space extent added on each side of a box.
pub const BOUNDS_PADDING: f32 = 0.1;

/// Compute `cascade_count` increasing split fractions in `(0, 1]`.
///
/// Split `i` blends a logarithmic distance `near * (far / near)^p` with a
/// uniform distance `near + (far - near) * p` at `p = (i + 1) / count`,
/// weighted by `lambda` (1 = logarithmic, 0 = uniform). Fractions are
/// relative to `far`; the last one is exactly `1.0`.
pub fn compute_splits(cascade_count: u32, near_clip: f32, far_clip: f32, lambda: f32) -> Vec<f32> {
    let lambda = lambda.clamp(0.0, 1.0);
    let near = near_clip.max(f32::EPSILON);
    let far = far_clip.max(near + f32::EPSILON);
    let ratio = far / near;
    let range = far - near;

    (0..cascade_count)
        .map(|i| {
            if i + 1 == cascade_count {
                return 1.0;
            }
            let p = (i + 1) as f32 / cascade_count as f32;
            let log_split = near * ratio.powf(p);
            let uniform_split = near + range * p;
            let split = lambda * log_split + (1.0 - lambda) * uniform_split;
            split / far
        })
        .collect()
}

/// World-space corners of the camera sub-frustum between two view depths.
///
/// Order: near plane (bottom-left, bottom-right, top-right, top-left), then
/// the far plane in the same order.
pub fn frustum_corners(camera: &Camera, near_dist: f32, far_dist: f32) -> [Vec3; 8] {
    let forward = camera.forward();
    let right = camera.right();
    let up = camera.true_up();

    let extents = |depth: f32| -> (f32, f32, f32, f32) {
        match camera.projection {
            Projection::Perspective { fov, aspect, .. } => {
                let half_h = (fov * 0.5).tan() * depth;
                let half_w = half_h * aspect;
                (-half_w, half_w, -half_h, half_h)
            }
            Projection::Orthographic {
                left,
                right,
                bottom,
                top,
                ..
            } => (left, right, bottom, top),
        }
    };

    let mut corners = [Vec3::ZERO; 8];
    for (plane, depth) in [near_dist, far_dist].into_iter().enumerate() {
        let center = camera.position + forward * depth;
        let (l, r, b, t) = extents(depth);
        let base = plane * 4;
        corners[base] = center + right * l + up * b;
        corners[base + 1] = center + right * r + up * b;
        corners[base + 2] = center + right * r + up * t;
        corners[base + 3] = center + right * l + up * t;
    }
    corners
}

/// Orthonormal frame aligned with a light direction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightBasis {
    pub right: Vec3,
    pub up: Vec3,
    /// The light's travel direction.
    pub forward: Vec3,
}

impl LightBasis {
    /// Build a basis from a light direction.
    ///
    /// World +Y is the preferred up vector; +Z replaces it when the light is
    /// (nearly) vertical so the cross product never degenerates.
    pub fn from_direction(direction: Vec3) -> Self {
        let forward = direction.normalize_or(Vec3::NEG_Y);
        let up_hint = if forward.dot(Vec3::Y).abs() > 0.99 {
            Vec3::Z
        } else {
            Vec3::Y
        };
        let right = forward.cross(up_hint).normalize();
        let up = right.cross(forward);
        Self { right, up, forward }
    }

    /// Express a world-space vector in this basis.
    pub fn project(&self, v: Vec3) -> Vec3 {
        Vec3::new(v.dot(self.right), v.dot(self.up), v.dot(self.forward))
    }

    /// Convert basis coordinates back to a world-space vector.
    pub fn unproject(&self, v: Vec3) -> Vec3 {
        self.right * v.x + self.up * v.y + self.forward * v.z
    }
}

/// Axis-aligned box in light space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightSpaceBounds {
    pub min: Vec3,
    pub max: Vec3,
    pub center: Vec3,
    pub size: Vec3,
    /// Padding applied on each side of x and y.
    pub padding: f32,
    pub basis: LightBasis,
    /// World-space point that light-space coordinates are relative to.
    pub origin: Vec3,
}

impl LightSpaceBounds {
    /// Box before padding was applied.
    pub fn unpadded(&self) -> (Vec3, Vec3) {
        let pad = Vec3::new(self.padding, self.padding, 0.0);
        (self.min + pad, self.max - pad)
    }

    /// World-space position of a light-space point.
    pub fn to_world(&self, light_space: Vec3) -> Vec3 {
        self.origin + self.basis.unproject(light_space)
    }

    /// Light-space coordinates of a world-space point.
    pub fn to_light_space(&self, world: Vec3) -> Vec3 {
        self.basis.project(world - self.origin)
    }

    /// World-space center of the box.
    pub fn center_world(&self) -> Vec3 {
        self.to_world(self.center)
    }

    /// Larger of the x/y extents.
    pub fn max_extent(&self) -> f32 {
        self.size.x.max(self.size.y)
    }

    /// Depth along the light direction.
    pub fn depth(&self) -> f32 {
        self.size.z
    }

    /// Whether a world-space point lies inside the (padded) box.
    pub fn contains(&self, world: Vec3, tolerance: f32) -> bool {
        let p = self.to_light_space(world);
        let pad = Vec3::splat(tolerance);
        p.cmpge(self.min - pad).all() && p.cmple(self.max + pad).all()
    }

    /// Snap the x/y center to whole texels of a `map_size` map covering
    /// `max_extent`, measured from the world origin so the grid stays fixed
    /// while the camera moves.
    pub fn snap_to_texels(&mut self, map_size: u32) {
        let extent = self.max_extent();
        if map_size == 0 || extent <= 0.0 {
            return;
        }
        let texel = extent / map_size as f32;
        let offset = self.basis.project(self.origin);
        let absolute = self.center + offset;
        let snapped = Vec3::new(
            (absolute.x / texel).round() * texel,
            (absolute.y / texel).round() * texel,
            absolute.z,
        );
        let shift = snapped - absolute;
        self.center += shift;
        self.min += shift;
        self.max += shift;
    }
}

/// Fit a padded light-space box around a set of world-space points.
///
/// Coordinates are relative to the first point. Returns `None` for an empty
/// slice.
pub fn light_space_bounds(corners: &[Vec3], light_direction: Vec3) -> Option<LightSpaceBounds> {
    let origin = *corners.first()?;
    let basis = LightBasis::from_direction(light_direction);

    let mut min = Vec3::splat(f32::MAX);
    let mut max = Vec3::splat(f32::MIN);
    for corner in corners {
        let p = basis.project(*corner - origin);
        min = min.min(p);
        max = max.max(p);
    }

    let padding = BOUNDS_PADDING * (max.x - min.x).max(max.y - min.y);
    let pad = Vec3::new(padding, padding, 0.0);
    let min = min - pad;
    let max = max + pad;

    Some(LightSpaceBounds {
        min,
        max,
        center: (min + max) * 0.5,
        size: max - min,
        padding,
        basis,
        origin,
    })
}

/// One slice of a cascaded shadow.
#[derive(Debug, Clone, PartialEq)]
pub struct Cascade {
    pub index: usize,
    /// Start of the slice as a fraction of the shadow distance.
    pub start_fraction: f32,
    /// End of the slice as a fraction of the shadow distance.
    pub end_fraction: f32,
    /// Start of the slice in view-space units, including the blend band.
    pub start_distance: f32,
    /// End of the slice in view-space units.
    pub end_distance: f32,
    pub corners: [Vec3; 8],
    pub bounds: LightSpaceBounds,
}

/// Build the cascades covering `[near, shadow_distance]` of `camera`.
///
/// Each cascade's start is pulled back into its predecessor by
/// `blend_width * predecessor_length` so shading can cross-fade.
pub fn build_cascades(
    camera: &Camera,
    light_direction: Vec3,
    cascade_count: u32,
    shadow_distance: f32,
    lambda: f32,
    blend_width: f32,
) -> Vec<Cascade> {
    let near = camera.near();
    let far = shadow_distance.min(camera.far()).max(near + f32::EPSILON);
    let splits = compute_splits(cascade_count, near, far, lambda);

    let mut cascades = Vec::with_capacity(splits.len());
    let mut prev_fraction = near / far;
    let mut prev_start = near;
    for (index, &end_fraction) in splits.iter().enumerate() {
        let end_distance = end_fraction * far;
        let nominal_start = prev_fraction * far;
        let start_distance = if index == 0 {
            near
        } else {
            let blend = (nominal_start - prev_start) * blend_width.clamp(0.0, 1.0);
            (nominal_start - blend).max(near)
        };

        let corners = frustum_corners(camera, start_distance, end_distance);
        let Some(bounds) = light_space_bounds(&corners, light_direction) else {
            continue;
        };

        cascades.push(Cascade {
            index,
            start_fraction: if index == 0 { 0.0 } else { prev_fraction },
            end_fraction,
            start_distance,
            end_distance,
            corners,
            bounds,
        });

        prev_start = nominal_start;
        prev_fraction = end_fraction;
    }
    cascades
}
