//! Depth render target
//!
//! An offscreen depth surface (optionally paired with a moment texture for
//! variance shadow maps) plus the light camera that renders into it.

use std::cell::Cell;

use glam::{Mat4, Vec3};

use crate::context::{ClearValues, FramebufferHandle, GraphicsBackend, TextureHandle, Viewport};
use crate::error::{Result, ShadowError};
use crate::renderer::viewer::{Camera, Projection, Viewer};

/// What a shadow map is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShadowMapKind {
    /// Single map (spot lights).
    Basic,
    /// One slice of a cascaded directional shadow.
    Cascade,
    /// One face of an omnidirectional point-light shadow.
    Omnidirectional,
}

#[derive(Debug, Clone, Copy)]
struct TargetResources {
    depth: TextureHandle,
    moments: Option<TextureHandle>,
    framebuffer: FramebufferHandle,
}

/// Offscreen depth target with its light camera.
#[derive(Debug)]
pub struct DepthRenderTarget {
    label: String,
    size: u32,
    kind: ShadowMapKind,
    with_moments: bool,
    camera: Camera,
    shadow_matrix: Cell<Option<Mat4>>,
    needs_update: bool,
    resources: Option<TargetResources>,
    previous: Option<Option<FramebufferHandle>>,
}

impl DepthRenderTarget {
    /// Allocate a square depth target, plus a moment texture if `with_moments`.
    pub fn create<B: GraphicsBackend + ?Sized>(
        backend: &mut B,
        label: impl Into<String>,
        size: u32,
        kind: ShadowMapKind,
        with_moments: bool,
    ) -> Result<Self> {
        if size == 0 {
            return Err(ShadowError::config("shadow map size must be positive"));
        }

        let mut target = Self {
            label: label.into(),
            size,
            kind,
            with_moments,
            camera: Camera::new_orthographic(Vec3::Z, Vec3::ZERO, Vec3::Y, 1.0, 0.1, 1.0),
            shadow_matrix: Cell::new(None),
            needs_update: true,
            resources: None,
            previous: None,
        };
        target.allocate(backend)?;
        Ok(target)
    }

    fn allocate<B: GraphicsBackend + ?Sized>(&mut self, backend: &mut B) -> Result<()> {
        let depth = backend.create_depth_texture(self.size, &format!("{} depth", self.label))?;

        let moments = if self.with_moments {
            match backend.create_moment_texture(self.size, &format!("{} moments", self.label)) {
                Ok(m) => Some(m),
                Err(err) => {
                    backend.destroy_texture(depth);
                    return Err(err);
                }
            }
        } else {
            None
        };

        let framebuffer = match backend.create_framebuffer(depth, moments, &self.label) {
            Ok(fb) => fb,
            Err(err) => {
                backend.destroy_texture(depth);
                if let Some(m) = moments {
                    backend.destroy_texture(m);
                }
                return Err(err);
            }
        };

        tracing::debug!(
            label = %self.label,
            size = self.size,
            moments = self.with_moments,
            "allocated shadow target"
        );
        self.resources = Some(TargetResources {
            depth,
            moments,
            framebuffer,
        });
        self.needs_update = true;
        Ok(())
    }

    /// Make this target the render destination, set the viewport and clear it.
    ///
    /// Returns `None` if the target has been disposed.
    pub fn bind<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &mut B,
    ) -> Option<FramebufferHandle> {
        let resources = self.resources?;
        self.previous = Some(backend.bound_framebuffer());
        backend.bind_framebuffer(Some(resources.framebuffer));
        backend.set_viewport(Viewport::square(self.size));
        backend.clear(ClearValues::no_occluder(resources.moments.is_some()));
        Some(resources.framebuffer)
    }

    /// Restore the destination that was bound before [`bind`](Self::bind).
    pub fn unbind<B: GraphicsBackend + ?Sized>(&mut self, backend: &mut B) {
        if let Some(previous) = self.previous.take() {
            backend.bind_framebuffer(previous);
        }
    }

    /// Reposition the light camera. Invalidates the cached shadow matrix.
    pub fn update_camera(
        &mut self,
        position: Vec3,
        target: Vec3,
        up: Vec3,
        projection: Projection,
    ) {
        self.camera = Camera {
            position,
            target,
            up,
            projection,
        };
        self.shadow_matrix.set(None);
        self.needs_update = true;
    }

    /// Replace the light camera wholesale.
    pub fn set_camera(&mut self, camera: Camera) {
        let Camera {
            position,
            target,
            up,
            projection,
        } = camera;
        self.update_camera(position, target, up, projection);
    }

    /// Combined light view-projection matrix, recomputed lazily.
    pub fn shadow_matrix(&self) -> Mat4 {
        if let Some(matrix) = self.shadow_matrix.get() {
            return matrix;
        }
        let matrix = self.camera.view_projection_matrix();
        self.shadow_matrix.set(Some(matrix));
        matrix
    }

    /// Recreate the backing resources at a new size, keeping the camera.
    pub fn resize<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        size: u32,
    ) -> Result<()> {
        if size == 0 {
            return Err(ShadowError::config("shadow map size must be positive"));
        }
        if size == self.size && self.resources.is_some() {
            return Ok(());
        }

        tracing::debug!(label = %self.label, from = self.size, to = size, "resizing shadow target");
        self.release(backend);
        self.size = size;
        self.allocate(backend)
    }

    /// Add or drop the moment attachment, reallocating if it changes.
    pub fn set_moments<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        with_moments: bool,
    ) -> Result<()> {
        if with_moments == self.with_moments && self.resources.is_some() {
            return Ok(());
        }
        self.release(backend);
        self.with_moments = with_moments;
        self.allocate(backend)
    }

    /// Release all backing resources. Safe to call repeatedly.
    pub fn dispose<B: GraphicsBackend + ?Sized>(&mut self, backend: &mut B) {
        if self.resources.is_some() {
            tracing::debug!(label = %self.label, "disposing shadow target");
        }
        self.release(backend);
    }

    fn release<B: GraphicsBackend + ?Sized>(&mut self, backend: &mut B) {
        if let Some(resources) = self.resources.take() {
            backend.destroy_framebuffer(resources.framebuffer);
            backend.destroy_texture(resources.depth);
            if let Some(moments) = resources.moments {
                backend.destroy_texture(moments);
            }
        }
        self.previous = None;
    }

    /// Take over the contents rendered into `back`, together with its camera.
    ///
    /// `back` receives this target's previous resources and can be rendered
    /// into again. Both targets must share size and attachments.
    pub fn swap_contents(&mut self, back: &mut DepthRenderTarget) -> Result<()> {
        if back.size != self.size || back.with_moments != self.with_moments {
            return Err(ShadowError::config(format!(
                "{} cannot take contents of {}: attachments differ",
                self.label, back.label
            )));
        }
        if back.resources.is_none() {
            return Err(ShadowError::config(format!(
                "{} has no backing resources",
                back.label
            )));
        }

        std::mem::swap(&mut self.resources, &mut back.resources);
        std::mem::swap(&mut self.camera, &mut back.camera);
        self.shadow_matrix.swap(&back.shadow_matrix);
        self.needs_update = false;
        back.needs_update = true;
        Ok(())
    }

    /// Mark the current contents as matching the camera.
    pub fn mark_rendered(&mut self) {
        self.needs_update = false;
    }

    /// Whether the camera moved since the last render.
    pub fn needs_update(&self) -> bool {
        self.needs_update
    }

    /// Whether backing resources are allocated.
    pub fn is_initialized(&self) -> bool {
        self.resources.is_some()
    }

    /// Square resolution in texels.
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Map usage.
    pub fn kind(&self) -> ShadowMapKind {
        self.kind
    }

    /// Whether a moment texture backs this target.
    pub fn has_moments(&self) -> bool {
        self.with_moments
    }

    /// Light camera.
    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    /// Label used for backend resources.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Depth texture handle, if allocated.
    pub fn depth_texture(&self) -> Option<TextureHandle> {
        self.resources.map(|r| r.depth)
    }

    /// Moment texture handle, if allocated.
    pub fn moment_texture(&self) -> Option<TextureHandle> {
        self.resources.and_then(|r| r.moments)
    }

    /// Framebuffer handle, if allocated.
    pub fn framebuffer(&self) -> Option<FramebufferHandle> {
        self.resources.map(|r| r.framebuffer)
    }

    /// GPU memory held by this target.
    pub fn memory_bytes(&self) -> u64 {
        if self.resources.is_none() {
            return 0;
        }
        let texels = self.size as u64 * self.size as u64;
        let per_texel = if self.with_moments { 4 + 8 } else { 4 };
        texels * per_texel
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{BackendCommand, HeadlessBackend};

    #[test]
    fn test_create_with_moments() {
        let mut backend = HeadlessBackend::new();
        let target =
            DepthRenderTarget::create(&mut backend, "vsm", 256, ShadowMapKind::Basic, true)
                .unwrap();

        assert!(target.is_initialized());
        assert!(target.moment_texture().is_some());
        assert_eq!(backend.live_textures(), 2);
        assert_eq!(target.memory_bytes(), 256 * 256 * 12);
    }

    #[test]
    fn test_bind_clears_and_unbind_restores() {
        let mut backend = HeadlessBackend::new();
        let mut outer =
            DepthRenderTarget::create(&mut backend, "outer", 64, ShadowMapKind::Basic, false)
                .unwrap();
        let mut inner =
            DepthRenderTarget::create(&mut backend, "inner", 32, ShadowMapKind::Basic, false)
                .unwrap();
        backend.clear_commands();

        let outer_fb = outer.bind(&mut backend).unwrap();
        let inner_fb = inner.bind(&mut backend).unwrap();
        assert_eq!(backend.bound_framebuffer(), Some(inner_fb));
        assert_eq!(backend.viewport(), Some(Viewport::square(32)));

        inner.unbind(&mut backend);
        assert_eq!(backend.bound_framebuffer(), Some(outer_fb));
        outer.unbind(&mut backend);
        assert_eq!(backend.bound_framebuffer(), None);

        let clears = backend
            .commands()
            .iter()
            .filter(|c| matches!(c, BackendCommand::Clear(v) if v.depth == 1.0))
            .count();
        assert_eq!(clears, 2);
    }

    #[test]
    fn test_shadow_matrix_invalidation() {
        let mut backend = HeadlessBackend::new();
        let mut target =
            DepthRenderTarget::create(&mut backend, "spot", 128, ShadowMapKind::Basic, false)
                .unwrap();

        target.update_camera(
            Vec3::new(0.0, 10.0, 0.0),
            Vec3::ZERO,
            Vec3::Z,
            Projection::perspective(60.0, 1.0, 0.1, 50.0),
        );
        let first = target.shadow_matrix();
        target.mark_rendered();
        assert!(!target.needs_update());

        target.update_camera(
            Vec3::new(5.0, 10.0, 0.0),
            Vec3::ZERO,
            Vec3::Z,
            Projection::perspective(60.0, 1.0, 0.1, 50.0),
        );
        assert!(target.needs_update());
        assert_ne!(first, target.shadow_matrix());
    }

    #[test]
    fn test_resize_preserves_camera() {
        let mut backend = HeadlessBackend::new();
        let mut target =
            DepthRenderTarget::create(&mut backend, "dir", 512, ShadowMapKind::Cascade, false)
                .unwrap();
        target.update_camera(
            Vec3::new(0.0, 20.0, 0.0),
            Vec3::ZERO,
            Vec3::Z,
            Projection::orthographic(10.0, 0.1, 40.0),
        );
        let matrix = target.shadow_matrix();

        target.resize(&mut backend, 512).unwrap();
        assert_eq!(backend.created_depth_sizes(), vec![512]);

        target.resize(&mut backend, 1024).unwrap();
        assert_eq!(target.size(), 1024);
        assert_eq!(target.shadow_matrix(), matrix);
        assert_eq!(backend.created_depth_sizes(), vec![512, 1024]);
        assert_eq!(backend.live_textures(), 1);

        assert!(target.resize(&mut backend, 0).is_err());
    }

    #[test]
    fn test_swap_contents_moves_camera_and_resources() {
        let mut backend = HeadlessBackend::new();
        let mut front =
            DepthRenderTarget::create(&mut backend, "front", 128, ShadowMapKind::Basic, false)
                .unwrap();
        let mut back =
            DepthRenderTarget::create(&mut backend, "back", 128, ShadowMapKind::Basic, false)
                .unwrap();
        back.update_camera(
            Vec3::new(0.0, 10.0, 0.0),
            Vec3::ZERO,
            Vec3::Z,
            Projection::perspective(60.0, 1.0, 0.1, 50.0),
        );
        let matrix = back.shadow_matrix();
        let (front_fb, back_fb) = (front.framebuffer(), back.framebuffer());

        front.swap_contents(&mut back).unwrap();
        assert_eq!(front.framebuffer(), back_fb);
        assert_eq!(back.framebuffer(), front_fb);
        assert_eq!(front.shadow_matrix(), matrix);
        assert!(!front.needs_update());
        assert!(back.needs_update());
        assert_eq!(backend.live_textures(), 2);

        let mut small =
            DepthRenderTarget::create(&mut backend, "small", 64, ShadowMapKind::Basic, false)
                .unwrap();
        assert!(matches!(
            front.swap_contents(&mut small),
            Err(ShadowError::Configuration(_))
        ));
        assert_eq!(front.framebuffer(), back_fb);
    }

    #[test]
    fn test_dispose_is_idempotent() {
        let mut backend = HeadlessBackend::new();
        let mut target =
            DepthRenderTarget::create(&mut backend, "twice", 64, ShadowMapKind::Basic, true)
                .unwrap();

        target.dispose(&mut backend);
        target.dispose(&mut backend);

        assert!(!target.is_initialized());
        assert_eq!(backend.live_textures(), 0);
        assert_eq!(backend.live_framebuffers(), 0);
        assert!(target.bind(&mut backend).is_none());
    }

    #[test]
    fn test_failed_allocation_releases_partial_resources() {
        let mut backend = HeadlessBackend::new().with_max_texture_size(128);
        let err = DepthRenderTarget::create(&mut backend, "big", 256, ShadowMapKind::Basic, true)
            .unwrap_err();
        assert!(matches!(err, ShadowError::ResourceCreation { .. }));
        assert_eq!(backend.live_textures(), 0);
    }
}
