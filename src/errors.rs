//! Error Types
//!
//! This module defines the error types used throughout the compositor.
//!
//! # Overview
//!
//! The main error type [`CompositingError`] covers the failure modes of the
//! render-target pool, the pass-result registry and the element hierarchy:
//! - Render-target allocation failures (bad resolution, pool cap)
//! - Ownership violations (releasing targets the pool never handed out)
//! - Freeze-frame and persistent-result conflicts
//! - Hierarchy and configuration errors
//!
//! # Usage
//!
//! Fallible internals return [`Result<T>`]. The per-frame surface of
//! [`CompositingElement`](crate::element::CompositingElement) never
//! propagates these to the caller: it logs them and degrades to "no result"
//! so a single bad frame heals itself on the next one.
//!
//! ```rust,ignore
//! use composure::errors::{CompositingError, Result};
//!
//! fn allocate() -> Result<()> {
//!     Err(CompositingError::PoolUnavailable)
//! }
//! ```

use thiserror::Error;

use crate::target::texture::TextureId;

/// The main error type for the compositor.
#[derive(Error, Debug)]
pub enum CompositingError {
    // ========================================================================
    // Render Target Pool Errors
    // ========================================================================
    /// A render target was requested with a zero or negative dimension.
    #[error("Invalid render target resolution: {width}x{height}")]
    InvalidResolution {
        /// Requested width
        width: i32,
        /// Requested height
        height: i32,
    },

    /// The debug cap on the total number of pooled targets was reached.
    #[error("Render target pool is at its debug cap of {cap} targets")]
    TargetCapExceeded {
        /// The configured cap
        cap: usize,
    },

    /// A target was released to a pool that does not have it checked out.
    #[error("Render target {0:?} is not assigned by this pool")]
    TargetNotAssigned(TextureId),

    /// The render-target factory could not create a target.
    #[error("Render target creation failed: {0}")]
    TargetCreationFailed(String),

    /// A pool view was used outside of the scope it was handed out for.
    #[error("Render target pool is no longer available")]
    PoolUnavailable,

    // ========================================================================
    // Element Errors
    // ========================================================================
    /// An operation tried to mutate a target that is currently freeze-framed.
    #[error("Render target {0:?} is freeze-framed")]
    FrozenTarget(TextureId),

    /// A pass result would overwrite a persistent one.
    #[error("Pass result '{0}' is persistent and cannot be overwritten")]
    PersistentConflict(String),

    /// An element hierarchy operation would produce an invalid tree.
    #[error("Invalid element hierarchy: {0}")]
    InvalidHierarchy(String),

    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Settings could not be parsed.
    #[error("Settings parse error: {0}")]
    Settings(#[from] serde_json::Error),
}

/// Alias for `Result<T, CompositingError>`.
pub type Result<T> = std::result::Result<T, CompositingError>;
