//! Texture abstractions
//!
//! Provides wgpu-backed depth and moment textures for shadow maps.

use crate::context::WgpuContext;
use crate::error::{Result, ShadowError};

fn validate_extent(ctx: &WgpuContext, size: u32, label: &str) -> Result<wgpu::Extent3d> {
    let max = ctx.device.limits().max_texture_dimension_2d;
    if size == 0 || size > max {
        return Err(ShadowError::resource(
            label,
            format!("size {size} outside supported range 1..={max}"),
        ));
    }

    Ok(wgpu::Extent3d {
        width: size,
        height: size,
        depth_or_array_layers: 1,
    })
}

/// A depth texture used as a shadow map.
pub struct DepthTexture {
    pub(crate) texture: wgpu::Texture,
    pub(crate) view: wgpu::TextureView,
    pub(crate) size: wgpu::Extent3d,
}

impl DepthTexture {
    /// The depth format used by this texture.
    pub const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

    /// Create a new square depth texture that can be rendered to and sampled.
    pub fn new(ctx: &WgpuContext, size: u32, label: Option<&str>) -> Result<Self> {
        let extent = validate_extent(ctx, size, label.unwrap_or("depth texture"))?;

        let texture = ctx.device.create_texture(&wgpu::TextureDescriptor {
            label,
            size: extent,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        Ok(Self {
            texture,
            view,
            size: extent,
        })
    }

    /// Get the texture view.
    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    /// Get the texture size.
    pub fn size(&self) -> (u32, u32) {
        (self.size.width, self.size.height)
    }
}

/// A two-channel float texture storing depth moments for variance shadow maps.
pub struct MomentTexture {
    pub(crate) texture: wgpu::Texture,
    pub(crate) view: wgpu::TextureView,
    pub(crate) size: wgpu::Extent3d,
}

impl MomentTexture {
    /// The moment format (`E[d]`, `E[d^2]`).
    pub const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rg32Float;

    /// Create a new square moment texture.
    pub fn new(ctx: &WgpuContext, size: u32, label: Option<&str>) -> Result<Self> {
        let extent = validate_extent(ctx, size, label.unwrap_or("moment texture"))?;

        let texture = ctx.device.create_texture(&wgpu::TextureDescriptor {
            label,
            size: extent,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        Ok(Self {
            texture,
            view,
            size: extent,
        })
    }

    /// Get the texture view.
    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    /// Get the texture size.
    pub fn size(&self) -> (u32, u32) {
        (self.size.width, self.size.height)
    }
}

/// Comparison sampler used to read depth shadow maps with hardware PCF.
pub fn shadow_comparison_sampler(ctx: &WgpuContext) -> wgpu::Sampler {
    ctx.device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("shadow sampler"),
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        compare: Some(wgpu::CompareFunction::LessEqual),
        ..Default::default()
    })
}

/// Point sampler for moment textures.
pub fn moment_sampler(ctx: &WgpuContext) -> wgpu::Sampler {
    // Rg32Float is not filterable without an extra feature
    ctx.device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("shadow moment sampler"),
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: wgpu::FilterMode::Nearest,
        min_filter: wgpu::FilterMode::Nearest,
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::test_context;

    #[test]
    fn test_formats() {
        assert_eq!(DepthTexture::FORMAT, wgpu::TextureFormat::Depth32Float);
        assert_eq!(MomentTexture::FORMAT, wgpu::TextureFormat::Rg32Float);
    }

    #[test]
    fn test_square_textures() {
        let Some(ctx) = test_context() else {
            return;
        };
        let depth = DepthTexture::new(&ctx, 512, Some("depth")).unwrap();
        assert_eq!(depth.size(), (512, 512));
        assert_eq!(depth.texture.format(), DepthTexture::FORMAT);

        let moments = MomentTexture::new(&ctx, 256, None).unwrap();
        assert_eq!(moments.size(), (256, 256));
        assert_eq!(moments.texture.format(), MomentTexture::FORMAT);
    }

    #[test]
    fn test_size_outside_device_limits() {
        let Some(ctx) = test_context() else {
            return;
        };
        let max = ctx.device.limits().max_texture_dimension_2d;

        let err = DepthTexture::new(&ctx, 0, Some("empty")).err().unwrap();
        assert!(matches!(err, ShadowError::ResourceCreation { ref label, .. } if label == "empty"));
        assert!(MomentTexture::new(&ctx, max + 1, None).is_err());
    }

    #[test]
    fn test_samplers_are_valid() {
        let Some(ctx) = test_context() else {
            return;
        };
        let scope = ctx.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let _comparison = shadow_comparison_sampler(&ctx);
        let _moments = moment_sampler(&ctx);
        let error = pollster::block_on(scope.pop());
        assert!(error.is_none(), "{error:?}");
    }
}
