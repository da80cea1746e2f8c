//! Compositing Passes
//!
//! An element's pipeline is three ordered lists of passes:
//!
//! - [`InputPass`]: produces an image from outside the element (media feed,
//!   scene capture, a child element's result...)
//! - [`TransformPass`]: turns the previous result into a new one
//! - [`OutputPass`]: consumes the final result (capture, copy to an asset...)
//!
//! Each pass sits in a [`PassSlot`] carrying the state the element reads
//! directly: name, enabled flag, intermediate flag and provenance.
//!
//! Passes only ever see their render target pool through an
//! [`InheritedTargetPool`] view that is valid for the duration of the call.

pub mod builtin;
pub mod proxy;

use crate::camera::SceneCamera;
use crate::lookup::PassResultLookup;
use crate::target::inherited::InheritedTargetPool;
use crate::target::texture::Texture;
use crate::utils::Name;

pub use builtin::{AlphaTransformPass, CopyToTargetOutput, TextureInput};
pub use proxy::{CommandRecorder, CompositeCommand, CompositingMaterial, PostProcessProxy};

/// Lifecycle hooks shared by every pass kind.
pub trait CompositingPass {
    /// Called once per frame before any pass runs, enabled or not.
    fn on_frame_begin(&mut self, _camera_cut: bool) {}

    /// Called once per frame after every output has been relayed.
    fn on_frame_end(&mut self) {}

    /// Drops any state kept across frames.
    fn reset(&mut self) {}

    fn on_enabled(&mut self) {}

    fn on_disabled(&mut self) {}
}

/// Produces an image.
pub trait InputPass: CompositingPass {
    fn generate_input(&mut self, pool: &InheritedTargetPool) -> Option<Texture>;
}

/// Read-only state handed to transform passes.
#[derive(Clone, Copy)]
pub struct TransformContext<'a> {
    /// Results produced earlier this frame (and by child elements).
    pub lookup: PassResultLookup<'a>,
    pub post_process: Option<&'a dyn PostProcessProxy>,
    pub camera: Option<&'a SceneCamera>,
}

/// Turns the previous result into a new one.
///
/// Returning the input unchanged (or `None`) leaves the element's latest
/// result as it was.
pub trait TransformPass: CompositingPass {
    fn apply_transform(
        &mut self,
        input: Option<&Texture>,
        context: &TransformContext<'_>,
        pool: &InheritedTargetPool,
    ) -> Option<Texture>;
}

/// Consumes the element's final result.
pub trait OutputPass: CompositingPass {
    fn relay_output(
        &mut self,
        result: Option<&Texture>,
        post_process: Option<&dyn PostProcessProxy>,
        pool: &InheritedTargetPool,
    );
}

/// How a pass got into an element's list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PassProvenance {
    /// Part of the element's authored setup.
    #[default]
    Authored,
    /// Added programmatically at runtime.
    Constructed,
}

/// A pass plus the per-pass state the element orchestrates with.
pub struct PassSlot<P: ?Sized> {
    name: Option<Name>,
    enabled: bool,
    intermediate: bool,
    provenance: PassProvenance,
    pass: Box<P>,
}

impl<P: ?Sized + CompositingPass> PassSlot<P> {
    /// Wraps a pass. An empty name leaves the pass unnamed; unnamed results
    /// are never registered in the lookup table.
    #[must_use]
    pub fn new(name: &str, pass: Box<P>) -> Self {
        Self {
            name: (!name.is_empty()).then(|| Name::new(name)),
            enabled: true,
            intermediate: false,
            provenance: PassProvenance::Authored,
            pass,
        }
    }

    #[must_use]
    pub fn with_provenance(mut self, provenance: PassProvenance) -> Self {
        self.provenance = provenance;
        self
    }

    #[must_use]
    pub fn name(&self) -> Option<Name> {
        self.name
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Enables or disables the pass, notifying it on change.
    pub fn set_enabled(&mut self, enabled: bool) {
        if self.enabled == enabled {
            return;
        }
        self.enabled = enabled;
        if enabled {
            self.pass.on_enabled();
        } else {
            self.pass.on_disabled();
        }
    }

    #[must_use]
    pub fn is_intermediate(&self) -> bool {
        self.intermediate
    }

    /// Marks the result as only needed by the next pass.
    pub fn set_intermediate(&mut self, intermediate: bool) {
        self.intermediate = intermediate;
    }

    #[must_use]
    pub fn provenance(&self) -> PassProvenance {
        self.provenance
    }

    pub fn pass(&self) -> &P {
        &self.pass
    }

    pub fn pass_mut(&mut self) -> &mut P {
        &mut self.pass
    }

    /// Unnamed passes are always treated as intermediate.
    pub(crate) fn wants_intermediate_target(&self) -> bool {
        self.intermediate || self.name.is_none()
    }
}
