//! Inherited Target Pool Views
//!
//! Passes never see the pool an element actually uses. They receive an
//! [`InheritedTargetPool`]: a cheap, clonable capability that remembers which
//! pool to ask, on whose behalf, at what native resolution and format, and
//! with which usage tags.
//!
//! A view is only meant to be used during the call it was handed to. Clones
//! share an *open* flag, so once the element calls
//! [`InheritedTargetPool::reset`] at the end of the call window every copy a
//! pass may have stashed away stops working (and says so in the log).
//!
//! [`ScopedTagAddendum`] temporarily ORs extra tags into a view, which is how
//! "this one pass's requests are intermediate" is expressed.

use std::cell::Cell;
use std::ops::{Deref, DerefMut};
use std::rc::{Rc, Weak};

use glam::IVec2;

use super::pool::{SharedTargetPool, TargetOwner, WeakTargetOwner, WeakTargetPool};
use super::texture::Texture;
use super::usage::TargetUsage;

/// A pass-facing view onto some render target pool.
#[derive(Clone)]
pub struct InheritedTargetPool {
    pool: WeakTargetPool,
    owner: WeakTargetOwner,
    usage: TargetUsage,
    resolution: IVec2,
    format: wgpu::TextureFormat,
    open: Rc<Cell<bool>>,
}

impl InheritedTargetPool {
    /// Root view bound to an owner, a backing pool and a base tag set.
    #[must_use]
    pub fn new(
        owner: &TargetOwner,
        resolution: IVec2,
        format: wgpu::TextureFormat,
        pool: &SharedTargetPool,
        usage: TargetUsage,
    ) -> Self {
        Self {
            pool: Rc::downgrade(pool),
            owner: owner.downgrade(),
            usage,
            resolution,
            format,
            open: Rc::new(Cell::new(true)),
        }
    }

    /// A view onto the same pool, owner and tags with a different native
    /// resolution and format. It closes together with `self`.
    #[must_use]
    pub fn with_target(&self, resolution: IVec2, format: wgpu::TextureFormat) -> Self {
        Self {
            resolution,
            format,
            ..self.clone()
        }
    }

    /// A view that resolves neither a pool nor an owner.
    #[must_use]
    pub fn invalid() -> Self {
        Self {
            pool: Weak::new(),
            owner: WeakTargetOwner::default(),
            usage: TargetUsage::empty(),
            resolution: IVec2::ZERO,
            format: crate::target::texture::DEFAULT_TARGET_FORMAT,
            open: Rc::new(Cell::new(false)),
        }
    }

    /// `true` while the call window is open and both pool and owner are alive.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.open.get() && self.pool.strong_count() > 0 && self.owner.is_valid()
    }

    #[inline]
    #[must_use]
    pub fn usage(&self) -> TargetUsage {
        self.usage
    }

    #[inline]
    #[must_use]
    pub fn resolution(&self) -> IVec2 {
        self.resolution
    }

    #[inline]
    #[must_use]
    pub fn format(&self) -> wgpu::TextureFormat {
        self.format
    }

    /// Requests a target at `scale` times the native resolution.
    pub fn request_render_target(&self, scale: f32) -> Option<Texture> {
        let resolution = (self.resolution.as_vec2() * scale).as_ivec2();
        self.request_render_target_sized(resolution, self.format)
    }

    /// Requests a target of an explicit size and format.
    pub fn request_render_target_sized(
        &self,
        resolution: IVec2,
        format: wgpu::TextureFormat,
    ) -> Option<Texture> {
        let Some((pool, owner)) = self.resolve() else {
            log::error!(
                "Render target requested through a pool view outside of its valid scope; \
                 views are only valid during the pass call they were handed to"
            );
            return None;
        };
        pool.borrow_mut()
            .assign_target(&owner, resolution, format, self.usage)
    }

    /// Hands a target back to the backing pool.
    pub fn release_render_target(&self, target: &Texture) -> bool {
        match self.resolve() {
            Some((pool, _)) => pool.borrow_mut().release_target(target),
            None => {
                log::error!("Render target released through an out-of-scope pool view");
                false
            }
        }
    }

    /// Closes the call window for this view and every clone of it.
    pub fn reset(&mut self) {
        self.open.set(false);
        self.pool = Weak::new();
        self.owner = WeakTargetOwner::default();
    }

    fn resolve(&self) -> Option<(SharedTargetPool, TargetOwner)> {
        if !self.open.get() {
            return None;
        }
        Some((self.pool.upgrade()?, self.owner.upgrade()?))
    }
}

/// Scope guard adding usage tags to a view for its lifetime.
///
/// Derefs to the tagged view; the prior tag set is restored on drop.
pub struct ScopedTagAddendum<'a> {
    pool: &'a mut InheritedTargetPool,
    prior: TargetUsage,
}

impl<'a> ScopedTagAddendum<'a> {
    pub fn new(extra: TargetUsage, pool: &'a mut InheritedTargetPool) -> Self {
        let prior = pool.usage;
        pool.usage |= extra;
        Self { pool, prior }
    }
}

impl Deref for ScopedTagAddendum<'_> {
    type Target = InheritedTargetPool;

    fn deref(&self) -> &Self::Target {
        self.pool
    }
}

impl DerefMut for ScopedTagAddendum<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.pool
    }
}

impl Drop for ScopedTagAddendum<'_> {
    fn drop(&mut self) {
        self.pool.usage = self.prior;
    }
}
