#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_arguments)]

//! Composure
//!
//! Render-target pooling and pass-pipeline orchestration for layered
//! real-time compositing.
//!
//! A composite is a tree of [`CompositingElement`]s owned by a
//! [`CompositingGraph`]. Each element runs an ordered pipeline of input,
//! transform and output passes every frame, drawing into targets checked out
//! of a tag-based [`RenderTargetPool`] and publishing its results by name in
//! a [`TextureLookupTable`].
//!
//! ```rust,ignore
//! use composure::{CompositingContext, CompositingGraph, TextureInput};
//!
//! let mut graph = CompositingGraph::new(CompositingContext::headless());
//! let plate = graph.create_element("Plate");
//! graph
//!     .element_mut(plate)
//!     .unwrap()
//!     .add_input_pass("MediaPlate", TextureInput::new(None));
//! graph.render_frame(false);
//! ```

pub mod camera;
pub mod context;
pub mod element;
pub mod errors;
pub mod graph;
pub mod lookup;
pub mod pass;
pub mod settings;
pub mod target;
pub mod utils;

pub use camera::{CameraKind, SceneCamera};
pub use context::CompositingContext;
pub use element::{CameraSource, CompositingElement, Inheritable};
pub use errors::{CompositingError, Result};
pub use graph::{CameraKey, CompositingGraph, ElementKey};
pub use lookup::{PassResultLookup, TextureLookupTable};
pub use pass::{
    AlphaTransformPass, CommandRecorder, CompositeCommand, CompositingMaterial, CompositingPass,
    CopyToTargetOutput, InputPass, OutputPass, PassSlot, PostProcessProxy, TextureInput,
    TransformContext, TransformPass,
};
pub use settings::CompositingSettings;
pub use target::{
    HeadlessTargetFactory, InheritedTargetPool, RenderTargetFactory, RenderTargetPool,
    ScopedTagAddendum, TargetOwner, TargetUsage, Texture,
};
pub use utils::Name;
