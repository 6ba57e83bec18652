//! Graphics backend abstraction
//!
//! The shadow subsystem only needs a handful of GPU capabilities: allocate
//! depth (and moment) textures, group them into framebuffers, bind, set the
//! viewport and clear. Everything else (pipelines, draws) belongs to the scene
//! renderer that draws the casters.

use crate::error::Result;

/// Opaque handle to a texture owned by a [`GraphicsBackend`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub(crate) u32);

/// Opaque handle to a framebuffer owned by a [`GraphicsBackend`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FramebufferHandle(pub(crate) u32);

impl TextureHandle {
    /// Raw index of the handle.
    pub fn index(self) -> u32 {
        self.0
    }
}

impl FramebufferHandle {
    /// Raw index of the handle.
    pub fn index(self) -> u32 {
        self.0
    }
}

/// Viewport rectangle in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    /// A square viewport anchored at the origin.
    pub fn square(size: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            width: size,
            height: size,
        }
    }
}

/// Values written by [`GraphicsBackend::clear`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClearValues {
    /// Depth clear value.
    pub depth: f32,
    /// Moment clear value, if the bound framebuffer has a moment attachment.
    pub moments: Option<[f32; 2]>,
}

impl ClearValues {
    /// Far depth and, optionally, moments that represent "no occluder".
    pub fn no_occluder(with_moments: bool) -> Self {
        Self {
            depth: 1.0,
            moments: with_moments.then_some([1.0, 1.0]),
        }
    }
}

/// Minimal GPU capability set consumed by shadow render targets.
pub trait GraphicsBackend {
    /// Allocate a square depth texture.
    fn create_depth_texture(&mut self, size: u32, label: &str) -> Result<TextureHandle>;

    /// Allocate a square two-channel float texture storing `E[d]` and `E[d^2]`.
    fn create_moment_texture(&mut self, size: u32, label: &str) -> Result<TextureHandle>;

    /// Group a depth texture and an optional moment texture into a framebuffer.
    ///
    /// Fails if the attachment set is incomplete.
    fn create_framebuffer(
        &mut self,
        depth: TextureHandle,
        moments: Option<TextureHandle>,
        label: &str,
    ) -> Result<FramebufferHandle>;

    /// Make `framebuffer` the active destination (`None` = default target).
    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferHandle>);

    /// Currently bound framebuffer.
    fn bound_framebuffer(&self) -> Option<FramebufferHandle>;

    /// Set the active viewport.
    fn set_viewport(&mut self, viewport: Viewport);

    /// Clear the bound framebuffer.
    fn clear(&mut self, values: ClearValues);

    /// Release a framebuffer. Unknown handles are ignored.
    fn destroy_framebuffer(&mut self, framebuffer: FramebufferHandle);

    /// Release a texture. Unknown handles are ignored.
    fn destroy_texture(&mut self, texture: TextureHandle);
}
