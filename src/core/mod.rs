//! Core rendering abstractions
//!
//! This module provides mid-level abstractions over GPU resources.

pub mod render_target;
pub mod texture;

pub use render_target::{DepthRenderTarget, ShadowMapKind};
pub use texture::{moment_sampler, shadow_comparison_sampler, DepthTexture, MomentTexture};
