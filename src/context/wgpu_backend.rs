//! wgpu implementation of [`GraphicsBackend`]
//!
//! wgpu has no bind state, so framebuffers are attachment pairs and "binding"
//! only records which pair the next clear and caster pass target.

use super::backend::{ClearValues, FramebufferHandle, GraphicsBackend, TextureHandle, Viewport};
use super::WgpuContext;
use crate::core::texture::{DepthTexture, MomentTexture};
use crate::error::{Result, ShadowError};

enum GpuTexture {
    Depth(DepthTexture),
    Moments(MomentTexture),
}

impl GpuTexture {
    fn view(&self) -> &wgpu::TextureView {
        match self {
            GpuTexture::Depth(t) => t.view(),
            GpuTexture::Moments(t) => t.view(),
        }
    }

    fn size(&self) -> (u32, u32) {
        match self {
            GpuTexture::Depth(t) => t.size(),
            GpuTexture::Moments(t) => t.size(),
        }
    }
}

#[derive(Clone, Copy)]
struct Framebuffer {
    depth: TextureHandle,
    moments: Option<TextureHandle>,
}

/// Attachment views of a framebuffer, for scene renderers that draw casters.
pub struct Attachments<'a> {
    /// Depth attachment.
    pub depth: &'a wgpu::TextureView,
    /// Moment attachment for variance shadow maps.
    pub moments: Option<&'a wgpu::TextureView>,
}

/// Shadow map backend built on a [`WgpuContext`].
pub struct WgpuBackend {
    ctx: WgpuContext,
    textures: Vec<Option<GpuTexture>>,
    framebuffers: Vec<Option<Framebuffer>>,
    bound: Option<FramebufferHandle>,
    viewport: Viewport,
}

impl WgpuBackend {
    /// Create a backend on an existing context.
    pub fn new(ctx: WgpuContext) -> Self {
        Self {
            ctx,
            textures: Vec::new(),
            framebuffers: Vec::new(),
            bound: None,
            viewport: Viewport::square(1),
        }
    }

    /// Get a reference to the context.
    pub fn context(&self) -> &WgpuContext {
        &self.ctx
    }

    /// Current viewport.
    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    /// View of a live texture, for binding shadow maps to lighting shaders.
    pub fn texture_view(&self, texture: TextureHandle) -> Option<&wgpu::TextureView> {
        self.textures
            .get(texture.0 as usize)
            .and_then(|t| t.as_ref())
            .map(|t| t.view())
    }

    /// Attachment views of a live framebuffer.
    pub fn attachments(&self, framebuffer: FramebufferHandle) -> Option<Attachments<'_>> {
        let fb = self.framebuffers.get(framebuffer.0 as usize)?.as_ref()?;
        Some(Attachments {
            depth: self.texture_view(fb.depth)?,
            moments: fb.moments.and_then(|m| self.texture_view(m)),
        })
    }

    fn insert_texture(&mut self, texture: GpuTexture) -> TextureHandle {
        if let Some(slot) = self.textures.iter().position(|t| t.is_none()) {
            self.textures[slot] = Some(texture);
            TextureHandle(slot as u32)
        } else {
            self.textures.push(Some(texture));
            TextureHandle(self.textures.len() as u32 - 1)
        }
    }

    fn texture(&self, texture: TextureHandle) -> Option<&GpuTexture> {
        self.textures.get(texture.0 as usize).and_then(|t| t.as_ref())
    }
}

impl GraphicsBackend for WgpuBackend {
    fn create_depth_texture(&mut self, size: u32, label: &str) -> Result<TextureHandle> {
        let texture = DepthTexture::new(&self.ctx, size, Some(label))?;
        Ok(self.insert_texture(GpuTexture::Depth(texture)))
    }

    fn create_moment_texture(&mut self, size: u32, label: &str) -> Result<TextureHandle> {
        let texture = MomentTexture::new(&self.ctx, size, Some(label))?;
        Ok(self.insert_texture(GpuTexture::Moments(texture)))
    }

    fn create_framebuffer(
        &mut self,
        depth: TextureHandle,
        moments: Option<TextureHandle>,
        label: &str,
    ) -> Result<FramebufferHandle> {
        let depth_size = match self.texture(depth) {
            Some(GpuTexture::Depth(t)) => t.size(),
            Some(GpuTexture::Moments(_)) => {
                return Err(ShadowError::resource(
                    label,
                    "depth attachment is not a depth texture",
                ))
            }
            None => return Err(ShadowError::resource(label, "missing depth attachment")),
        };

        if let Some(moments) = moments {
            let moment_size = self
                .texture(moments)
                .map(|t| t.size())
                .ok_or_else(|| ShadowError::resource(label, "missing moment attachment"))?;
            if moment_size != depth_size {
                return Err(ShadowError::resource(label, "attachment sizes differ"));
            }
        }

        let fb = Framebuffer { depth, moments };
        if let Some(slot) = self.framebuffers.iter().position(|f| f.is_none()) {
            self.framebuffers[slot] = Some(fb);
            Ok(FramebufferHandle(slot as u32))
        } else {
            self.framebuffers.push(Some(fb));
            Ok(FramebufferHandle(self.framebuffers.len() as u32 - 1))
        }
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferHandle>) {
        self.bound = framebuffer;
    }

    fn bound_framebuffer(&self) -> Option<FramebufferHandle> {
        self.bound
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    fn clear(&mut self, values: ClearValues) {
        let Some(bound) = self.bound else {
            tracing::warn!("clear called with no shadow framebuffer bound");
            return;
        };
        let Some(attachments) = self.attachments(bound) else {
            tracing::warn!(framebuffer = bound.0, "clear on a destroyed framebuffer");
            return;
        };

        let mut encoder = self.ctx.create_encoder(Some("shadow clear encoder"));
        {
            let color_attachment = match (attachments.moments, values.moments) {
                (Some(view), Some([m1, m2])) => Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: m1 as f64,
                            g: m2 as f64,
                            b: 0.0,
                            a: 0.0,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                }),
                _ => None,
            };

            let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("shadow clear pass"),
                color_attachments: &[color_attachment],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: attachments.depth,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(values.depth),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });
            // Pass drops immediately, just clearing
        }
        self.ctx.submit([encoder.finish()]);
    }

    fn destroy_framebuffer(&mut self, framebuffer: FramebufferHandle) {
        if let Some(slot) = self.framebuffers.get_mut(framebuffer.0 as usize) {
            if slot.take().is_some() && self.bound == Some(framebuffer) {
                self.bound = None;
            }
        }
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        if let Some(slot) = self.textures.get_mut(texture.0 as usize) {
            match slot.take() {
                Some(GpuTexture::Depth(t)) => t.texture.destroy(),
                Some(GpuTexture::Moments(t)) => t.texture.destroy(),
                None => {}
            }
        }
    }
}

impl std::fmt::Debug for WgpuBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WgpuBackend")
            .field("textures", &self.textures.iter().flatten().count())
            .field("framebuffers", &self.framebuffers.iter().flatten().count())
            .field("bound", &self.bound)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::test_context;
    use crate::core::{DepthRenderTarget, ShadowMapKind};

    fn test_backend() -> Option<WgpuBackend> {
        test_context().map(WgpuContext::into_backend)
    }

    #[test]
    fn test_slots_are_reused() {
        let Some(mut backend) = test_backend() else {
            return;
        };
        let first = backend.create_depth_texture(64, "first").unwrap();
        let second = backend.create_depth_texture(64, "second").unwrap();
        assert_ne!(first, second);

        backend.destroy_texture(first);
        // Unknown and already destroyed handles are ignored
        backend.destroy_texture(first);
        backend.destroy_texture(TextureHandle(99));
        assert!(backend.texture_view(first).is_none());

        let third = backend.create_moment_texture(64, "third").unwrap();
        assert_eq!(third, first);
        assert!(backend.texture_view(second).is_some());

        let fb = backend.create_framebuffer(second, None, "fb").unwrap();
        backend.destroy_framebuffer(fb);
        backend.destroy_framebuffer(fb);
        let again = backend.create_framebuffer(second, None, "again").unwrap();
        assert_eq!(again, fb);
    }

    #[test]
    fn test_framebuffer_validation() {
        let Some(mut backend) = test_backend() else {
            return;
        };
        let depth = backend.create_depth_texture(128, "depth").unwrap();
        let moments = backend.create_moment_texture(128, "moments").unwrap();
        let small = backend.create_moment_texture(64, "small").unwrap();

        let err = backend.create_framebuffer(moments, None, "swapped").unwrap_err();
        assert!(matches!(err, ShadowError::ResourceCreation { .. }));
        assert!(backend.create_framebuffer(depth, Some(small), "mismatch").is_err());

        let fb = backend.create_framebuffer(depth, Some(moments), "vsm").unwrap();
        let attachments = backend.attachments(fb).unwrap();
        assert!(attachments.moments.is_some());

        backend.destroy_texture(depth);
        assert!(backend.attachments(fb).is_none());
        assert!(backend.create_framebuffer(depth, None, "gone").is_err());
    }

    #[test]
    fn test_clear_with_and_without_moments() {
        let Some(mut backend) = test_backend() else {
            return;
        };
        let scope = backend
            .context()
            .device
            .push_error_scope(wgpu::ErrorFilter::Validation);

        let mut vsm =
            DepthRenderTarget::create(&mut backend, "vsm", 128, ShadowMapKind::Basic, true)
                .unwrap();
        let mut plain =
            DepthRenderTarget::create(&mut backend, "plain", 128, ShadowMapKind::Cascade, false)
                .unwrap();

        let fb = vsm.bind(&mut backend).unwrap();
        assert_eq!(backend.bound_framebuffer(), Some(fb));
        assert_eq!(backend.viewport(), Viewport::square(128));
        vsm.unbind(&mut backend);
        assert_eq!(backend.bound_framebuffer(), None);

        plain.bind(&mut backend).unwrap();
        // Moment values without a moment attachment only clear depth
        backend.clear(ClearValues::no_occluder(true));
        plain.unbind(&mut backend);

        // Nothing bound: ignored
        backend.clear(ClearValues::no_occluder(false));

        let error = pollster::block_on(scope.pop());
        assert!(error.is_none(), "{error:?}");

        vsm.dispose(&mut backend);
        plain.dispose(&mut backend);
        assert!(format!("{backend:?}").contains("textures: 0,"));
    }

    #[test]
    fn test_destroying_bound_framebuffer_unbinds() {
        let Some(mut backend) = test_backend() else {
            return;
        };
        let depth = backend.create_depth_texture(32, "depth").unwrap();
        let fb = backend.create_framebuffer(depth, None, "fb").unwrap();
        backend.bind_framebuffer(Some(fb));

        backend.destroy_framebuffer(fb);
        assert_eq!(backend.bound_framebuffer(), None);
    }
}
