//! High-level rendering
//!
//! Cameras, lights and the shadow mapping subsystem.

pub mod light;
pub mod shadow;
pub mod viewer;

pub use light::{
    AmbientLight, DirectionalLight, Light, LightId, LightKind, LightType, PointLight, SpotLight,
};
pub use shadow::{
    CascadeSelection, CubeFace, DepthBuffer, DepthSource, FilterParams, FilterType,
    GeneratorOptions, GeneratorState, LightShadowUniforms, PassFace, PerformanceMetrics,
    ShadowGenerator, ShadowManager, ShadowManagerConfig, ShadowMaterial, ShadowPass,
    ShadowQuality, ShadowScene, ShadowUniform, UpdateOutcome,
};
pub use viewer::{Camera, Projection, Viewer};
