//! Compositing Context
//!
//! Host-wide state every element is created against: the settings, the
//! factory physical render targets come from, and the slot of the shared
//! render target pool.
//!
//! The shared pool is only weakly held here. It is created on first request,
//! kept alive by the elements using it, and torn down the moment the last of
//! them lets go; the next request creates a fresh one.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::settings::CompositingSettings;
use crate::target::factory::{HeadlessTargetFactory, RenderTargetFactory};
use crate::target::pool::{RenderTargetPool, SharedTargetPool, WeakTargetPool};

pub struct CompositingContext {
    settings: RefCell<CompositingSettings>,
    factory: Rc<dyn RenderTargetFactory>,
    shared_pool: RefCell<WeakTargetPool>,
}

impl CompositingContext {
    #[must_use]
    pub fn new(factory: Rc<dyn RenderTargetFactory>, settings: CompositingSettings) -> Rc<Self> {
        Rc::new(Self {
            settings: RefCell::new(settings),
            factory,
            shared_pool: RefCell::new(Weak::new()),
        })
    }

    /// Context backed by a [`HeadlessTargetFactory`], for tests and tooling.
    #[must_use]
    pub fn headless() -> Rc<Self> {
        Self::new(
            Rc::new(HeadlessTargetFactory::new()),
            CompositingSettings::default(),
        )
    }

    #[must_use]
    pub fn settings(&self) -> CompositingSettings {
        self.settings.borrow().clone()
    }

    /// Replaces the settings. A live shared pool picks up its new cap and
    /// staleness threshold immediately.
    pub fn set_settings(&self, settings: CompositingSettings) {
        if let Some(pool) = self.live_shared_pool() {
            pool.borrow_mut().apply_settings(&settings);
        }
        *self.settings.borrow_mut() = settings;
    }

    #[must_use]
    pub fn factory(&self) -> Rc<dyn RenderTargetFactory> {
        Rc::clone(&self.factory)
    }

    /// Returns the shared pool, creating it if no strong reference is left.
    #[must_use]
    pub fn shared_target_pool(&self) -> SharedTargetPool {
        if let Some(pool) = self.live_shared_pool() {
            return pool;
        }
        let pool = RenderTargetPool::new_shared(self.factory(), &self.settings.borrow());
        *self.shared_pool.borrow_mut() = Rc::downgrade(&pool);
        log::debug!("Created shared render target pool");
        pool
    }

    /// Returns the shared pool if some element still holds it.
    #[must_use]
    pub fn live_shared_pool(&self) -> Option<SharedTargetPool> {
        self.shared_pool.borrow().upgrade()
    }

    /// Creates a pool exclusively owned by one element.
    #[must_use]
    pub fn create_private_pool(&self) -> SharedTargetPool {
        RenderTargetPool::new_shared(self.factory(), &self.settings.borrow())
    }
}
