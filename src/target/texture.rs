//! Texture Handles
//!
//! [`Texture`] is the image handle that flows between passes. It is a cheap
//! reference-counted handle; two handles are the *same texture* iff they share
//! a [`TextureId`]. Identity, not content, is what the pool and the lookup
//! table compare.
//!
//! A texture may be backed by a real `wgpu` texture (created by a
//! [`WgpuTargetFactory`](super::factory::WgpuTargetFactory)) or be headless,
//! which is how tests and offline tooling drive the pipeline without a GPU.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use glam::{IVec2, UVec2};

/// Default render format for elements without a parent.
pub const DEFAULT_TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;

/// Default render resolution for elements without a parent.
pub const DEFAULT_TARGET_RESOLUTION: IVec2 = IVec2::new(1920, 1080);

static NEXT_TEXTURE_ID: AtomicU64 = AtomicU64::new(1);

fn next_id() -> TextureId {
    TextureId(NEXT_TEXTURE_ID.fetch_add(1, Ordering::Relaxed))
}

/// Process-unique identity of a texture.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct TextureId(u64);

impl TextureId {
    #[inline]
    #[must_use]
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Pool bucket key: a render target's resolution and format.
///
/// Many physical targets may share one descriptor.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct RenderTargetDesc {
    pub resolution: UVec2,
    pub format: wgpu::TextureFormat,
}

impl RenderTargetDesc {
    #[inline]
    #[must_use]
    pub fn new(resolution: UVec2, format: wgpu::TextureFormat) -> Self {
        Self { resolution, format }
    }

    /// Builds a descriptor from a signed request, rejecting non-positive sizes.
    #[must_use]
    pub fn from_request(resolution: IVec2, format: wgpu::TextureFormat) -> Option<Self> {
        (resolution.x > 0 && resolution.y > 0)
            .then(|| Self::new(resolution.as_uvec2(), format))
    }
}

/// GPU storage of a texture.
pub struct GpuTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
}

/// What a texture is and who made it.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TextureKind {
    /// A poolable render target.
    RenderTarget,
    /// A texture produced outside the compositor (media feed, asset, ...).
    External,
}

struct TextureInner {
    id: TextureId,
    label: String,
    desc: RenderTargetDesc,
    kind: TextureKind,
    gpu: Option<GpuTexture>,
}

/// Reference-counted, identity-compared texture handle.
#[derive(Clone)]
pub struct Texture(Arc<TextureInner>);

impl Texture {
    /// Wraps an existing GPU texture.
    #[must_use]
    pub fn from_gpu(label: &str, kind: TextureKind, texture: wgpu::Texture) -> Self {
        let desc = RenderTargetDesc::new(
            UVec2::new(texture.width(), texture.height()),
            texture.format(),
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self::with_storage(label, kind, desc, Some(GpuTexture { texture, view }))
    }

    /// Creates a texture with no GPU storage.
    #[must_use]
    pub fn headless(label: &str, kind: TextureKind, desc: RenderTargetDesc) -> Self {
        Self::with_storage(label, kind, desc, None)
    }

    /// Creates a headless external texture, e.g. a stand-in for a media feed.
    #[must_use]
    pub fn external(label: &str, width: u32, height: u32, format: wgpu::TextureFormat) -> Self {
        Self::headless(
            label,
            TextureKind::External,
            RenderTargetDesc::new(UVec2::new(width, height), format),
        )
    }

    fn with_storage(
        label: &str,
        kind: TextureKind,
        desc: RenderTargetDesc,
        gpu: Option<GpuTexture>,
    ) -> Self {
        Self(Arc::new(TextureInner {
            id: next_id(),
            label: label.to_owned(),
            desc,
            kind,
            gpu,
        }))
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> TextureId {
        self.0.id
    }

    #[inline]
    #[must_use]
    pub fn label(&self) -> &str {
        &self.0.label
    }

    #[inline]
    #[must_use]
    pub fn desc(&self) -> RenderTargetDesc {
        self.0.desc
    }

    #[inline]
    #[must_use]
    pub fn resolution(&self) -> UVec2 {
        self.0.desc.resolution
    }

    #[inline]
    #[must_use]
    pub fn format(&self) -> wgpu::TextureFormat {
        self.0.desc.format
    }

    #[inline]
    #[must_use]
    pub fn kind(&self) -> TextureKind {
        self.0.kind
    }

    #[inline]
    #[must_use]
    pub fn is_render_target(&self) -> bool {
        self.0.kind == TextureKind::RenderTarget
    }

    /// GPU storage, if this texture has any.
    #[inline]
    #[must_use]
    pub fn gpu(&self) -> Option<&GpuTexture> {
        self.0.gpu.as_ref()
    }
}

impl PartialEq for Texture {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for Texture {}

impl fmt::Debug for Texture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Texture")
            .field("id", &self.0.id.0)
            .field("label", &self.0.label)
            .field("resolution", &self.0.desc.resolution)
            .field("format", &self.0.desc.format)
            .finish()
    }
}

/// Identity comparison of two optional textures.
#[inline]
#[must_use]
pub fn same_texture(a: Option<&Texture>, b: Option<&Texture>) -> bool {
    a.map(Texture::id) == b.map(Texture::id)
}
