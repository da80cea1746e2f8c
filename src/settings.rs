//! Compositor Settings
//!
//! Runtime toggles for the render-target pool and the element frame
//! pipeline. A single [`CompositingSettings`] lives in the
//! [`CompositingContext`](crate::context::CompositingContext) and is read
//! by every pool and element created from it.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use composure::settings::CompositingSettings;
//!
//! // Debug setup: every pass keeps its own target, and the pool is capped.
//! let settings = CompositingSettings {
//!     reuse_intermediate_targets: false,
//!     pool_target_cap: 64,
//!     ..Default::default()
//! };
//!
//! // Or from a JSON document (missing fields fall back to defaults).
//! let settings = CompositingSettings::from_json(r#"{ "stale_frame_threshold": 30 }"#)?;
//! ```

use serde::{Deserialize, Serialize};

use crate::errors::Result;

/// Global configuration for compositing elements and their target pools.
///
/// | Field                               | Description                                         | Default |
/// |-------------------------------------|-----------------------------------------------------|---------|
/// | `pool_target_cap`                   | Max targets a pool may hold (0 = unlimited)         | `0`     |
/// | `use_stable_pass_list`              | Also run programmatically constructed passes        | `true`  |
/// | `reuse_intermediate_targets`        | Recycle intermediate pass targets after one pass    | `true`  |
/// | `disable_element_when_opacity_zero` | Zero opacity disables the whole element             | `true`  |
/// | `stale_frame_threshold`             | Idle frames before a free target is destroyed       | `90`    |
/// | `disable_active_rendering`          | Shunt that stops all automatic element rendering    | `false` |
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositingSettings {
    /// Soft cap on the total number of targets (free + assigned) per pool.
    ///
    /// Allocations past the cap fail (and are logged). `0` disables the cap.
    pub pool_target_cap: usize,

    /// When `false`, elements only iterate their authored passes and skip
    /// passes added programmatically at runtime.
    pub use_stable_pass_list: bool,

    /// When `false`, no pass is ever tagged intermediate, so every pass
    /// result keeps its own target for the rest of the frame.
    pub reuse_intermediate_targets: bool,

    /// When `true`, dropping an element's opacity to zero disables it.
    pub disable_element_when_opacity_zero: bool,

    /// Number of idle sweeps a free target survives before being destroyed.
    pub stale_frame_threshold: u32,

    /// When `true`, [`CompositingGraph::render_frame`](crate::graph::CompositingGraph::render_frame)
    /// renders nothing. Elements can still be rendered explicitly.
    pub disable_active_rendering: bool,
}

impl Default for CompositingSettings {
    fn default() -> Self {
        Self {
            pool_target_cap: 0,
            use_stable_pass_list: true,
            reuse_intermediate_targets: true,
            disable_element_when_opacity_zero: true,
            stale_frame_threshold: 90,
            disable_active_rendering: false,
        }
    }
}

impl CompositingSettings {
    /// Parses settings from JSON. Missing fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
