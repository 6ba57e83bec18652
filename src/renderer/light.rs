//! Light types
//!
//! The shadow subsystem only reads lights; it never owns them. Lights are
//! identified by a caller-supplied [`LightId`] and looked up through the scene
//! every frame.

use std::fmt;

use glam::Vec3;

/// Stable, caller-supplied light identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LightId(pub u64);

impl fmt::Display for LightId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Light type enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightType {
    Ambient,
    Directional,
    Point,
    Spot,
}

/// Ambient light that illuminates all surfaces equally.
#[derive(Debug, Clone, PartialEq)]
pub struct AmbientLight {
    /// Light intensity (0.0 - 1.0).
    pub intensity: f32,
    /// Light color (RGB).
    pub color: [f32; 3],
}

impl Default for AmbientLight {
    fn default() -> Self {
        Self {
            intensity: 0.3,
            color: [1.0, 1.0, 1.0],
        }
    }
}

/// Directional light that illuminates from a direction.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectionalLight {
    /// Light intensity (0.0 - 1.0+).
    pub intensity: f32,
    /// Light color (RGB).
    pub color: [f32; 3],
    /// Direction the light travels in (normalized).
    pub direction: Vec3,
}

impl DirectionalLight {
    /// Create a white directional light.
    pub fn white(intensity: f32, direction: Vec3) -> Self {
        Self {
            intensity,
            color: [1.0, 1.0, 1.0],
            direction: direction.normalize(),
        }
    }
}

impl Default for DirectionalLight {
    fn default() -> Self {
        Self::white(1.0, Vec3::new(-0.3, -1.0, -0.5))
    }
}

/// Point light that illuminates from a position.
#[derive(Debug, Clone, PartialEq)]
pub struct PointLight {
    /// Light intensity.
    pub intensity: f32,
    /// Light color (RGB).
    pub color: [f32; 3],
    /// Light position.
    pub position: Vec3,
    /// Influence radius. Zero means unbounded.
    pub distance: f32,
}

impl PointLight {
    /// Create a white point light.
    pub fn white(intensity: f32, position: Vec3, distance: f32) -> Self {
        Self {
            intensity,
            color: [1.0, 1.0, 1.0],
            position,
            distance,
        }
    }
}

impl Default for PointLight {
    fn default() -> Self {
        Self::white(1.0, Vec3::new(0.0, 2.0, 0.0), 50.0)
    }
}

/// Spot light with cone-shaped illumination.
#[derive(Debug, Clone, PartialEq)]
pub struct SpotLight {
    /// Light intensity.
    pub intensity: f32,
    /// Light color (RGB).
    pub color: [f32; 3],
    /// Light position.
    pub position: Vec3,
    /// Point the light is aimed at.
    pub target: Vec3,
    /// Cone half-angle in radians.
    pub angle: f32,
    /// Fraction of the cone that fades out (0.0 - 1.0).
    pub penumbra: f32,
    /// Influence radius. Zero means unbounded.
    pub distance: f32,
}

impl SpotLight {
    /// Create a white spot light aimed at `target` with a cone half-angle in degrees.
    pub fn white(intensity: f32, position: Vec3, target: Vec3, angle_degrees: f32) -> Self {
        Self {
            intensity,
            color: [1.0, 1.0, 1.0],
            position,
            target,
            angle: angle_degrees.to_radians(),
            penumbra: 0.0,
            distance: 0.0,
        }
    }

    /// Set the penumbra fraction.
    pub fn with_penumbra(mut self, penumbra: f32) -> Self {
        self.penumbra = penumbra.clamp(0.0, 1.0);
        self
    }

    /// Normalized direction from the light toward its target.
    pub fn direction(&self) -> Vec3 {
        (self.target - self.position).normalize_or(Vec3::NEG_Y)
    }
}

impl Default for SpotLight {
    fn default() -> Self {
        Self::white(1.0, Vec3::new(0.0, 5.0, 0.0), Vec3::ZERO, 30.0)
    }
}

/// Per-type light data.
#[derive(Debug, Clone, PartialEq)]
pub enum LightKind {
    Ambient(AmbientLight),
    Directional(DirectionalLight),
    Point(PointLight),
    Spot(SpotLight),
}

/// A scene light as seen by the shadow subsystem.
#[derive(Debug, Clone, PartialEq)]
pub struct Light {
    /// Stable identifier.
    pub id: LightId,
    /// Whether the light should cast shadows.
    pub cast_shadow: bool,
    /// Type-specific data.
    pub kind: LightKind,
}

impl Light {
    /// Create a shadow-casting light.
    pub fn new(id: LightId, kind: LightKind) -> Self {
        Self {
            id,
            cast_shadow: true,
            kind,
        }
    }

    /// Get the light type.
    pub fn light_type(&self) -> LightType {
        match self.kind {
            LightKind::Ambient(_) => LightType::Ambient,
            LightKind::Directional(_) => LightType::Directional,
            LightKind::Point(_) => LightType::Point,
            LightKind::Spot(_) => LightType::Spot,
        }
    }

    /// World position, if the light has one.
    pub fn position(&self) -> Option<Vec3> {
        match &self.kind {
            LightKind::Point(p) => Some(p.position),
            LightKind::Spot(s) => Some(s.position),
            LightKind::Ambient(_) | LightKind::Directional(_) => None,
        }
    }

    /// Direction the light travels in, if it has one.
    pub fn direction(&self) -> Option<Vec3> {
        match &self.kind {
            LightKind::Directional(d) => Some(d.direction),
            LightKind::Spot(s) => Some(s.direction()),
            LightKind::Ambient(_) | LightKind::Point(_) => None,
        }
    }
}

impl From<(LightId, DirectionalLight)> for Light {
    fn from((id, light): (LightId, DirectionalLight)) -> Self {
        Self::new(id, LightKind::Directional(light))
    }
}

impl From<(LightId, PointLight)> for Light {
    fn from((id, light): (LightId, PointLight)) -> Self {
        Self::new(id, LightKind::Point(light))
    }
}

impl From<(LightId, SpotLight)> for Light {
    fn from((id, light): (LightId, SpotLight)) -> Self {
        Self::new(id, LightKind::Spot(light))
    }
}

impl From<(LightId, AmbientLight)> for Light {
    fn from((id, light): (LightId, AmbientLight)) -> Self {
        Self::new(id, LightKind::Ambient(light))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_light_accessors() {
        let spot: Light = (
            LightId(3),
            SpotLight::white(1.0, Vec3::new(0.0, 4.0, 0.0), Vec3::ZERO, 25.0),
        )
            .into();
        assert_eq!(spot.light_type(), LightType::Spot);
        assert_eq!(spot.position(), Some(Vec3::new(0.0, 4.0, 0.0)));
        assert!((spot.direction().unwrap() - Vec3::NEG_Y).length() < 1e-6);

        let ambient: Light = (LightId(4), AmbientLight::default()).into();
        assert_eq!(ambient.light_type(), LightType::Ambient);
        assert_eq!(ambient.position(), None);
        assert_eq!(ambient.direction(), None);
    }

    #[test]
    fn test_degenerate_spot_direction() {
        let spot = SpotLight::white(1.0, Vec3::ONE, Vec3::ONE, 30.0);
        assert_eq!(spot.direction(), Vec3::NEG_Y);
    }
}
