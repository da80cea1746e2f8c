//! Post-Process Proxy
//!
//! Passes do not record GPU work themselves. They describe it as a
//! [`CompositeCommand`] and submit it to the element's [`PostProcessProxy`],
//! which owns the actual draw path (a wgpu encoder, a remote renderer, or a
//! [`CommandRecorder`] in tests).

use std::cell::RefCell;

use smallvec::SmallVec;

use crate::lookup::TextureLookupTable;
use crate::target::texture::Texture;
use crate::utils::Name;

/// A full-screen draw a pass wants executed.
#[derive(Debug, Clone)]
pub enum CompositeCommand {
    /// `target = source * alpha` (premultiplied).
    ScaleAlpha {
        source: Texture,
        target: Texture,
        alpha: f32,
    },
    /// Straight copy, resampling if the sizes differ.
    Copy { source: Texture, target: Texture },
    /// A material draw with its texture parameters bound to pass results.
    Material {
        material: Name,
        inputs: SmallVec<[(Name, Texture); 4]>,
        target: Texture,
    },
}

impl CompositeCommand {
    /// The texture the command writes to.
    #[must_use]
    pub fn target(&self) -> &Texture {
        match self {
            Self::ScaleAlpha { target, .. }
            | Self::Copy { target, .. }
            | Self::Material { target, .. } => target,
        }
    }
}

/// Executes composite commands on behalf of passes.
pub trait PostProcessProxy {
    fn submit(&self, command: CompositeCommand);
}

/// Proxy that records submitted commands instead of executing them.
#[derive(Default)]
pub struct CommandRecorder {
    commands: RefCell<Vec<CompositeCommand>>,
}

impl CommandRecorder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.borrow().is_empty()
    }

    /// Drains every recorded command.
    pub fn take(&self) -> Vec<CompositeCommand> {
        std::mem::take(&mut *self.commands.borrow_mut())
    }
}

impl PostProcessProxy for CommandRecorder {
    fn submit(&self, command: CompositeCommand) {
        log::trace!("Recorded composite command writing to {:?}", command.target().id());
        self.commands.borrow_mut().push(command);
    }
}

/// A material whose texture parameters are fed from named pass results.
#[derive(Debug, Clone)]
pub struct CompositingMaterial {
    pub material: Name,
    /// `(parameter, pass result name)` bindings.
    pub texture_params: SmallVec<[(Name, Name); 4]>,
}

impl CompositingMaterial {
    #[must_use]
    pub fn new(material: &str) -> Self {
        Self {
            material: Name::new(material),
            texture_params: SmallVec::new(),
        }
    }

    /// Binds `param` to the result of pass `pass_name`.
    #[must_use]
    pub fn with_texture_param(mut self, param: &str, pass_name: &str) -> Self {
        self.texture_params.push((Name::new(param), Name::new(pass_name)));
        self
    }

    /// Resolves the texture bindings against `lookup`.
    ///
    /// Bindings whose pass has no result this frame are left unbound.
    #[must_use]
    pub fn resolve_params(&self, lookup: &TextureLookupTable) -> SmallVec<[(Name, Texture); 4]> {
        self.texture_params
            .iter()
            .filter_map(|(param, pass)| match lookup.find_texture(*pass) {
                Some(texture) => Some((*param, texture)),
                None => {
                    log::debug!(
                        "Material {} parameter {} has no '{}' result this frame",
                        self.material,
                        param,
                        pass
                    );
                    None
                }
            })
            .collect()
    }
}
