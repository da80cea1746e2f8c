//! Render Target Factories
//!
//! The pool decides *when* a target is created or destroyed; a
//! [`RenderTargetFactory`] decides *how*. [`WgpuTargetFactory`] allocates real
//! GPU textures, [`HeadlessTargetFactory`] allocates identity-only handles and
//! keeps counters, which is what tests and offline tools use.

use std::cell::Cell;

use crate::errors::{CompositingError, Result};

use super::texture::{RenderTargetDesc, Texture, TextureKind};

/// Creates and destroys the physical storage behind pooled render targets.
pub trait RenderTargetFactory {
    /// Allocates a new render target matching `desc`.
    fn create_target(&self, desc: &RenderTargetDesc) -> Result<Texture>;

    /// Physically releases a target the pool no longer tracks.
    fn destroy_target(&self, target: Texture) {
        drop(target);
    }
}

/// Allocates render targets on a `wgpu` device.
pub struct WgpuTargetFactory {
    device: wgpu::Device,
    usage: wgpu::TextureUsages,
}

impl WgpuTargetFactory {
    #[must_use]
    pub fn new(device: wgpu::Device) -> Self {
        Self {
            device,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::COPY_DST,
        }
    }

    /// Overrides the usage flags of every target created from now on.
    #[must_use]
    pub fn with_usage(mut self, usage: wgpu::TextureUsages) -> Self {
        self.usage = usage;
        self
    }
}

impl RenderTargetFactory for WgpuTargetFactory {
    fn create_target(&self, desc: &RenderTargetDesc) -> Result<Texture> {
        let max = self.device.limits().max_texture_dimension_2d;
        if desc.resolution.x > max || desc.resolution.y > max {
            return Err(CompositingError::TargetCreationFailed(format!(
                "{}x{} exceeds the device limit of {max}",
                desc.resolution.x, desc.resolution.y
            )));
        }

        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Composure Pooled Target"),
            size: wgpu::Extent3d {
                width: desc.resolution.x,
                height: desc.resolution.y,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: desc.format,
            usage: self.usage,
            view_formats: &[],
        });

        Ok(Texture::from_gpu(
            "Composure Pooled Target",
            TextureKind::RenderTarget,
            texture,
        ))
    }

    fn destroy_target(&self, target: Texture) {
        if let Some(gpu) = target.gpu() {
            gpu.texture.destroy();
        }
    }
}

/// Allocates GPU-less render targets and counts allocations.
#[derive(Default)]
pub struct HeadlessTargetFactory {
    created: Cell<usize>,
    destroyed: Cell<usize>,
}

impl HeadlessTargetFactory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of targets created so far.
    #[must_use]
    pub fn created(&self) -> usize {
        self.created.get()
    }

    /// Number of targets physically destroyed so far.
    #[must_use]
    pub fn destroyed(&self) -> usize {
        self.destroyed.get()
    }

    /// Targets created and not yet destroyed.
    #[must_use]
    pub fn live(&self) -> usize {
        self.created.get() - self.destroyed.get()
    }
}

impl RenderTargetFactory for HeadlessTargetFactory {
    fn create_target(&self, desc: &RenderTargetDesc) -> Result<Texture> {
        self.created.set(self.created.get() + 1);
        Ok(Texture::headless(
            "Composure Pooled Target",
            TextureKind::RenderTarget,
            *desc,
        ))
    }

    fn destroy_target(&self, target: Texture) {
        self.destroyed.set(self.destroyed.get() + 1);
        drop(target);
    }
}
