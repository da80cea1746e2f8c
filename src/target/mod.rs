//! Render Targets
//!
//! - [`texture`]: identity-compared texture handles and pool descriptors
//! - [`factory`]: creation and destruction of physical targets
//! - [`usage`]: usage tag bitmask and the intermediate generation
//! - [`pool`]: the tag-based render target pool
//! - [`inherited`]: pass-facing pool views and scoped tag addenda

pub mod factory;
pub mod inherited;
pub mod pool;
pub mod texture;
pub mod usage;

pub use factory::{HeadlessTargetFactory, RenderTargetFactory, WgpuTargetFactory};
pub use inherited::{InheritedTargetPool, ScopedTagAddendum};
pub use pool::{RenderTargetPool, SharedTargetPool, TargetOwner, WeakTargetOwner, WeakTargetPool};
pub use texture::{RenderTargetDesc, Texture, TextureId, TextureKind};
pub use usage::{IntermediateGeneration, TargetUsage};
