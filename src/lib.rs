//! Penumbra shadow mapping
//!
//! Real-time shadow maps for wgpu renderers: cascaded maps for directional
//! lights, omnidirectional maps for point lights and single maps for spot
//! lights, with PCF and variance filtering.
//!
//! # Architecture
//!
//! The library is organized into layers:
//!
//! 1. **context** - wgpu wrapper and the [`GraphicsBackend`] capability trait
//! 2. **core** - depth textures and render targets
//! 3. **renderer** - cameras, lights and the shadow subsystem
//!
//! The host renderer calls [`ShadowManager::update`] once per frame and hands
//! [`ShadowManager::shadow_uniforms`] to its lighting stage.

pub mod context;
pub mod core;
pub mod error;
pub mod renderer;

// Re-export commonly used types
pub use context::{GraphicsBackend, HeadlessBackend, WgpuBackend, WgpuContext};

pub use core::{DepthRenderTarget, ShadowMapKind};

pub use error::{Result, ShadowError};

pub use renderer::{
    AmbientLight, Camera, DirectionalLight, FilterType, GeneratorOptions, Light, LightId,
    LightKind, LightShadowUniforms, PerformanceMetrics, PointLight, Projection, ShadowManager,
    ShadowManagerConfig, ShadowMaterial, ShadowPass, ShadowQuality, ShadowScene, ShadowUniform,
    SpotLight, Viewer,
};

// Re-export glam for convenience
pub use glam;
