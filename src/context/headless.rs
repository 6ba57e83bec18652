//! CPU-only backend
//!
//! Tracks resources and records every command instead of talking to a GPU.
//! Used for tests, tooling and servers that need shadow matrices without a
//! device.

use std::collections::HashMap;

use super::backend::{ClearValues, FramebufferHandle, GraphicsBackend, TextureHandle, Viewport};
use crate::error::{Result, ShadowError};

/// Kind of a headless texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureKind {
    Depth,
    Moments,
}

/// A command recorded by [`HeadlessBackend`].
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCommand {
    CreateTexture {
        handle: TextureHandle,
        kind: TextureKind,
        size: u32,
    },
    CreateFramebuffer {
        handle: FramebufferHandle,
    },
    Bind(Option<FramebufferHandle>),
    Viewport(Viewport),
    Clear(ClearValues),
    DestroyFramebuffer(FramebufferHandle),
    DestroyTexture(TextureHandle),
}

#[derive(Debug, Clone, Copy)]
struct HeadlessTexture {
    kind: TextureKind,
    size: u32,
}

#[derive(Debug, Clone, Copy)]
struct HeadlessFramebuffer {
    depth: TextureHandle,
    moments: Option<TextureHandle>,
}

/// Headless [`GraphicsBackend`] implementation.
#[derive(Debug, Default)]
pub struct HeadlessBackend {
    next_id: u32,
    textures: HashMap<TextureHandle, HeadlessTexture>,
    framebuffers: HashMap<FramebufferHandle, HeadlessFramebuffer>,
    bound: Option<FramebufferHandle>,
    viewport: Option<Viewport>,
    max_texture_size: Option<u32>,
    failing_allocations: u32,
    commands: Vec<BackendCommand>,
}

impl HeadlessBackend {
    /// Create a new headless backend without limits.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject textures larger than `size`, like a device limit would.
    pub fn with_max_texture_size(mut self, size: u32) -> Self {
        self.max_texture_size = Some(size);
        self
    }

    /// Make the next `count` texture allocations fail.
    pub fn fail_next_allocations(&mut self, count: u32) {
        self.failing_allocations = count;
    }

    /// Recorded commands, oldest first.
    pub fn commands(&self) -> &[BackendCommand] {
        &self.commands
    }

    /// Drop the recorded command log.
    pub fn clear_commands(&mut self) {
        self.commands.clear();
    }

    /// Number of live textures.
    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    /// Number of live framebuffers.
    pub fn live_framebuffers(&self) -> usize {
        self.framebuffers.len()
    }

    /// Size of a live texture.
    pub fn texture_size(&self, texture: TextureHandle) -> Option<u32> {
        self.textures.get(&texture).map(|t| t.size)
    }

    /// Last viewport set.
    pub fn viewport(&self) -> Option<Viewport> {
        self.viewport
    }

    /// Sizes of every depth texture ever created, in creation order.
    pub fn created_depth_sizes(&self) -> Vec<u32> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                BackendCommand::CreateTexture {
                    kind: TextureKind::Depth,
                    size,
                    ..
                } => Some(*size),
                _ => None,
            })
            .collect()
    }

    fn allocate_texture(
        &mut self,
        kind: TextureKind,
        size: u32,
        label: &str,
    ) -> Result<TextureHandle> {
        if self.failing_allocations > 0 {
            self.failing_allocations -= 1;
            return Err(ShadowError::resource(label, "allocation rejected"));
        }
        if size == 0 {
            return Err(ShadowError::resource(label, "zero-sized texture"));
        }
        if let Some(max) = self.max_texture_size {
            if size > max {
                return Err(ShadowError::resource(
                    label,
                    format!("size {size} exceeds device limit {max}"),
                ));
            }
        }

        let handle = TextureHandle(self.next_id);
        self.next_id += 1;
        self.textures.insert(handle, HeadlessTexture { kind, size });
        self.commands
            .push(BackendCommand::CreateTexture { handle, kind, size });
        Ok(handle)
    }
}

impl GraphicsBackend for HeadlessBackend {
    fn create_depth_texture(&mut self, size: u32, label: &str) -> Result<TextureHandle> {
        self.allocate_texture(TextureKind::Depth, size, label)
    }

    fn create_moment_texture(&mut self, size: u32, label: &str) -> Result<TextureHandle> {
        self.allocate_texture(TextureKind::Moments, size, label)
    }

    fn create_framebuffer(
        &mut self,
        depth: TextureHandle,
        moments: Option<TextureHandle>,
        label: &str,
    ) -> Result<FramebufferHandle> {
        let depth_tex = self
            .textures
            .get(&depth)
            .ok_or_else(|| ShadowError::resource(label, "missing depth attachment"))?;
        if depth_tex.kind != TextureKind::Depth {
            return Err(ShadowError::resource(label, "depth attachment is not a depth texture"));
        }

        if let Some(moments) = moments {
            let moment_tex = self
                .textures
                .get(&moments)
                .ok_or_else(|| ShadowError::resource(label, "missing moment attachment"))?;
            if moment_tex.size != depth_tex.size {
                return Err(ShadowError::resource(label, "attachment sizes differ"));
            }
        }

        let handle = FramebufferHandle(self.next_id);
        self.next_id += 1;
        self.framebuffers
            .insert(handle, HeadlessFramebuffer { depth, moments });
        self.commands.push(BackendCommand::CreateFramebuffer { handle });
        Ok(handle)
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferHandle>) {
        self.bound = framebuffer;
        self.commands.push(BackendCommand::Bind(framebuffer));
    }

    fn bound_framebuffer(&self) -> Option<FramebufferHandle> {
        self.bound
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = Some(viewport);
        self.commands.push(BackendCommand::Viewport(viewport));
    }

    fn clear(&mut self, values: ClearValues) {
        self.commands.push(BackendCommand::Clear(values));
    }

    fn destroy_framebuffer(&mut self, framebuffer: FramebufferHandle) {
        if self.framebuffers.remove(&framebuffer).is_some() {
            if self.bound == Some(framebuffer) {
                self.bound = None;
            }
            self.commands
                .push(BackendCommand::DestroyFramebuffer(framebuffer));
        }
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        if self.textures.remove(&texture).is_some() {
            self.commands.push(BackendCommand::DestroyTexture(texture));
        }
    }
}

impl HeadlessBackend {
    /// Attachments of a live framebuffer.
    pub fn attachments(
        &self,
        framebuffer: FramebufferHandle,
    ) -> Option<(TextureHandle, Option<TextureHandle>)> {
        self.framebuffers
            .get(&framebuffer)
            .map(|fb| (fb.depth, fb.moments))
    }
}
