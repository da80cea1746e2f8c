//! Render Target Pool
//!
//! Reuses render targets across passes, elements and frames. A target is
//! either *free* (sitting in a bucket keyed by its [`RenderTargetDesc`]) or
//! *assigned* (checked out to one owner with a [`TargetUsage`] tag set),
//! never both.
//!
//! # Design
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     RenderTargetPool                         │
//! │                                                              │
//! │  free:     HashMap<Desc, Vec<PooledTarget>>  (stale counter) │
//! │  assigned: HashMap<TextureId, AssignedTarget> (owner, tags)  │
//! │                                                              │
//! │  assign_target()            free → assigned (or allocate)    │
//! │  release_target()           assigned → free                  │
//! │  release_assigned_targets() by owner, keeping masked tags    │
//! │  release_tagged_targets()   by tag (intermediate reclaim)    │
//! │  tick()                     orphan reclaim + stale eviction  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Ownership
//!
//! Owners are identified by [`TargetOwner`] tokens. The pool only holds
//! [`WeakTargetOwner`] references, so an owner that disappears without
//! returning its targets leaves *orphaned* assignments that any owner-scoped
//! release (and the idle sweep) will reclaim.
//!
//! When the pool itself is dropped every assigned target is forcibly
//! re-pooled and the whole free list is destroyed through the factory.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use glam::IVec2;
use rustc_hash::FxHashMap;

use crate::errors::{CompositingError, Result};
use crate::settings::CompositingSettings;

use super::factory::RenderTargetFactory;
use super::texture::{RenderTargetDesc, Texture, TextureId};
use super::usage::TargetUsage;

/// Strong handle to a pool shared between elements.
pub type SharedTargetPool = Rc<RefCell<RenderTargetPool>>;

/// Weak handle to a pool.
pub type WeakTargetPool = Weak<RefCell<RenderTargetPool>>;

// ─── Owners ──────────────────────────────────────────────────────────────────

struct OwnerInfo {
    label: String,
}

/// Identity token of an entity that checks targets out of a pool.
///
/// Dropping the last clone invalidates every [`WeakTargetOwner`] pointing at
/// it, which turns its outstanding assignments into orphans.
#[derive(Clone)]
pub struct TargetOwner(Rc<OwnerInfo>);

impl TargetOwner {
    #[must_use]
    pub fn new(label: &str) -> Self {
        Self(Rc::new(OwnerInfo {
            label: label.to_owned(),
        }))
    }

    #[must_use]
    pub fn downgrade(&self) -> WeakTargetOwner {
        WeakTargetOwner(Rc::downgrade(&self.0))
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.0.label
    }

    fn is(&self, weak: &WeakTargetOwner) -> bool {
        std::ptr::eq(Rc::as_ptr(&self.0), weak.0.as_ptr())
    }
}

impl fmt::Debug for TargetOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TargetOwner({:?})", self.0.label)
    }
}

/// Non-owning reference to a [`TargetOwner`].
#[derive(Clone, Default)]
pub struct WeakTargetOwner(Weak<OwnerInfo>);

impl WeakTargetOwner {
    #[must_use]
    pub fn upgrade(&self) -> Option<TargetOwner> {
        self.0.upgrade().map(TargetOwner)
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.0.strong_count() > 0
    }
}

// ─── Internal Types ──────────────────────────────────────────────────────────

/// A free target and the number of idle sweeps it has survived.
struct PooledTarget {
    target: Texture,
    stale_frames: u32,
}

/// Bookkeeping for a checked-out target.
struct AssignedTarget {
    target: Texture,
    owner: WeakTargetOwner,
    usage: TargetUsage,
}

impl AssignedTarget {
    /// Owner filter: `None` matches everyone, otherwise the owner itself or
    /// any orphaned assignment.
    fn owned_by(&self, owner: Option<&TargetOwner>) -> bool {
        match owner {
            None => true,
            Some(owner) => owner.is(&self.owner) || !self.owner.is_valid(),
        }
    }
}

// ─── Pool Implementation ─────────────────────────────────────────────────────

/// Tag-based render target pool.
///
/// The pool is single-threaded: elements mutate it from the one thread
/// that drives their frames, so it lives behind `Rc<RefCell<_>>` when shared.
pub struct RenderTargetPool {
    factory: Rc<dyn RenderTargetFactory>,
    /// Free targets, grouped by descriptor.
    free: FxHashMap<RenderTargetDesc, Vec<PooledTarget>>,
    /// Checked-out targets.
    assigned: FxHashMap<TextureId, AssignedTarget>,
    target_cap: usize,
    stale_frame_threshold: u32,
}

impl RenderTargetPool {
    /// Render priority that compositing elements build on; a root element
    /// renders at `EXTENSION_PRIORITY + 1`.
    pub const EXTENSION_PRIORITY: i32 = 100;

    /// Creates an empty pool with default settings.
    #[must_use]
    pub fn new(factory: Rc<dyn RenderTargetFactory>) -> Self {
        let defaults = CompositingSettings::default();
        Self {
            factory,
            free: FxHashMap::default(),
            assigned: FxHashMap::default(),
            target_cap: defaults.pool_target_cap,
            stale_frame_threshold: defaults.stale_frame_threshold,
        }
    }

    /// Creates an empty pool wrapped for sharing.
    #[must_use]
    pub fn new_shared(
        factory: Rc<dyn RenderTargetFactory>,
        settings: &CompositingSettings,
    ) -> SharedTargetPool {
        let mut pool = Self::new(factory);
        pool.apply_settings(settings);
        Rc::new(RefCell::new(pool))
    }

    /// Picks up the cap and staleness threshold from `settings`.
    pub fn apply_settings(&mut self, settings: &CompositingSettings) {
        self.target_cap = settings.pool_target_cap;
        self.stale_frame_threshold = settings.stale_frame_threshold;
    }

    // ── Assignment ──────────────────────────────────────────────────────────

    /// Checks out a target matching `resolution` and `format`.
    ///
    /// A free target with the exact descriptor is reused; otherwise a new one
    /// is created, unless the pool is at its cap.
    pub fn try_assign_target(
        &mut self,
        owner: &TargetOwner,
        resolution: IVec2,
        format: wgpu::TextureFormat,
        usage: TargetUsage,
    ) -> Result<Texture> {
        let desc = RenderTargetDesc::from_request(resolution, format).ok_or(
            CompositingError::InvalidResolution {
                width: resolution.x,
                height: resolution.y,
            },
        )?;

        let reused = self.free.get_mut(&desc).and_then(Vec::pop);
        let target = if let Some(pooled) = reused {
            pooled.target
        } else {
            if self.is_at_cap() {
                return Err(CompositingError::TargetCapExceeded {
                    cap: self.target_cap,
                });
            }
            let target = self.factory.create_target(&desc)?;
            log::debug!(
                "Render target pool allocated {}x{} {:?} (total: {})",
                desc.resolution.x,
                desc.resolution.y,
                desc.format,
                self.target_count() + 1
            );
            target
        };

        self.assigned.insert(
            target.id(),
            AssignedTarget {
                target: target.clone(),
                owner: owner.downgrade(),
                usage,
            },
        );
        Ok(target)
    }

    /// Logging wrapper around [`try_assign_target`](Self::try_assign_target).
    ///
    /// Returns `None` on failure; callers treat that as "skip this pass".
    pub fn assign_target(
        &mut self,
        owner: &TargetOwner,
        resolution: IVec2,
        format: wgpu::TextureFormat,
        usage: TargetUsage,
    ) -> Option<Texture> {
        match self.try_assign_target(owner, resolution, format, usage) {
            Ok(target) => Some(target),
            Err(err @ CompositingError::InvalidResolution { .. }) => {
                log::debug!("Skipping render target request for {owner:?}: {err}");
                None
            }
            Err(err) => {
                log::error!("Failed to assign a render target to {owner:?}: {err}");
                None
            }
        }
    }

    // ── Release ─────────────────────────────────────────────────────────────

    /// Returns a checked-out target to the free list.
    ///
    /// Returns `false` (and logs) if the target is not assigned by this pool,
    /// which points at a double release or an ownership bug upstream.
    pub fn release_target(&mut self, target: &Texture) -> bool {
        let Some(assignment) = self.assigned.remove(&target.id()) else {
            log::warn!(
                "Attempted to release render target {:?} which is not assigned by this pool",
                target.id()
            );
            return false;
        };
        self.push_free(assignment.target);
        true
    }

    /// Releases every target owned by `owner` (or orphaned) whose tags do not
    /// intersect `keep`. `owner = None` releases regardless of owner.
    ///
    /// Returns the number of released targets.
    pub fn release_assigned_targets(
        &mut self,
        owner: Option<&TargetOwner>,
        keep: TargetUsage,
    ) -> usize {
        self.release_where(|a| a.owned_by(owner) && !a.usage.intersects(keep))
    }

    /// Releases every target whose tags intersect `tags`, optionally limited
    /// to one owner (orphans included).
    pub fn release_tagged_targets(
        &mut self,
        tags: TargetUsage,
        owner: Option<&TargetOwner>,
    ) -> usize {
        self.release_where(|a| a.usage.intersects(tags) && a.owned_by(owner))
    }

    /// Strips `tags` from a checked-out target so tag-based releases skip it.
    ///
    /// Returns `false` if the target is not assigned by this pool.
    pub fn remove_usage_tags(&mut self, target: &Texture, tags: TargetUsage) -> bool {
        match self.assigned.get_mut(&target.id()) {
            Some(assignment) => {
                assignment.usage.remove(tags);
                true
            }
            None => false,
        }
    }

    /// Releases every assignment whose owner no longer exists.
    pub fn release_orphaned_targets(&mut self) -> usize {
        self.release_where(|a| !a.owner.is_valid())
    }

    fn release_where(&mut self, mut predicate: impl FnMut(&AssignedTarget) -> bool) -> usize {
        let released: Vec<TextureId> = self
            .assigned
            .iter()
            .filter(|(_, a)| predicate(a))
            .map(|(id, _)| *id)
            .collect();

        for id in &released {
            if let Some(assignment) = self.assigned.remove(id) {
                self.push_free(assignment.target);
            }
        }
        released.len()
    }

    fn push_free(&mut self, target: Texture) {
        self.free
            .entry(target.desc())
            .or_default()
            .push(PooledTarget {
                target,
                stale_frames: 0,
            });
    }

    // ── Queries ─────────────────────────────────────────────────────────────

    /// Tags of a checked-out target; empty if it is not assigned.
    #[must_use]
    pub fn find_assigned_usage_tags(&self, target: &Texture) -> TargetUsage {
        self.assigned
            .get(&target.id())
            .map_or(TargetUsage::empty(), |a| a.usage)
    }

    #[must_use]
    pub fn is_assigned(&self, target: &Texture) -> bool {
        self.assigned.contains_key(&target.id())
    }

    #[must_use]
    pub fn is_free(&self, target: &Texture) -> bool {
        self.free
            .get(&target.desc())
            .is_some_and(|bucket| bucket.iter().any(|p| p.target == *target))
    }

    /// Number of targets checked out to `owner`.
    #[must_use]
    pub fn assigned_count_for(&self, owner: &TargetOwner) -> usize {
        self.assigned
            .values()
            .filter(|a| owner.is(&a.owner))
            .count()
    }

    #[must_use]
    pub fn assigned_count(&self) -> usize {
        self.assigned.len()
    }

    #[must_use]
    pub fn free_count(&self) -> usize {
        self.free.values().map(Vec::len).sum()
    }

    /// Total number of targets managed by the pool (assigned + free).
    #[must_use]
    pub fn target_count(&self) -> usize {
        self.assigned_count() + self.free_count()
    }

    fn is_at_cap(&self) -> bool {
        self.target_cap > 0 && self.target_count() >= self.target_cap
    }

    // ── Idle sweep ──────────────────────────────────────────────────────────

    /// Reclaims orphaned assignments, ages the free list by one frame and
    /// destroys entries idle for longer than the staleness threshold.
    ///
    /// Returns the number of destroyed targets.
    pub fn tick(&mut self) -> usize {
        let orphaned = self.release_orphaned_targets();
        if orphaned > 0 {
            log::debug!("Render target pool reclaimed {orphaned} orphaned targets");
        }

        let threshold = self.stale_frame_threshold;
        let mut evicted = Vec::new();
        for bucket in self.free.values_mut() {
            for pooled in bucket.iter_mut() {
                pooled.stale_frames += 1;
            }
            let (stale, fresh): (Vec<_>, Vec<_>) = bucket
                .drain(..)
                .partition(|p| p.stale_frames > threshold);
            *bucket = fresh;
            evicted.extend(stale);
        }
        self.free.retain(|_, bucket| !bucket.is_empty());

        let count = evicted.len();
        for pooled in evicted {
            self.factory.destroy_target(pooled.target);
        }
        count
    }
}

impl Drop for RenderTargetPool {
    fn drop(&mut self) {
        let outstanding = self.release_assigned_targets(None, TargetUsage::empty());
        if outstanding > 0 {
            log::debug!("Render target pool forcibly reclaimed {outstanding} targets on teardown");
        }
        for (_, bucket) in self.free.drain() {
            for pooled in bucket {
                self.factory.destroy_target(pooled.target);
            }
        }
    }
}
