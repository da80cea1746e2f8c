//! Pass list management.
//!
//! Each stage keeps one ordered list. Passes added through the
//! `add_new_*_pass` family are marked [`PassProvenance::Constructed`]; with
//! `use_stable_pass_list` off only authored passes are scheduled.

use super::CompositingElement;
use crate::pass::{
    CompositingPass, InputPass, OutputPass, PassProvenance, PassSlot, TransformPass,
};
use crate::target::texture::Texture;
use crate::utils::Name;

fn push_slot<P: ?Sized>(list: &mut Vec<PassSlot<P>>, slot: PassSlot<P>) -> &mut PassSlot<P> {
    let index = list.len();
    list.push(slot);
    &mut list[index]
}

fn position_of<P: ?Sized + CompositingPass>(list: &[PassSlot<P>], name: Name) -> Option<usize> {
    list.iter().position(|slot| slot.name() == Some(name))
}

fn remove_named<P: ?Sized + CompositingPass>(list: &mut Vec<PassSlot<P>>, name: Name) -> bool {
    match position_of(list, name) {
        Some(index) => {
            let mut slot = list.remove(index);
            slot.pass_mut().reset();
            true
        }
        None => false,
    }
}

/// Whether a slot runs under the current pass list policy.
pub(super) fn is_scheduled<P: ?Sized + CompositingPass>(slot: &PassSlot<P>, stable: bool) -> bool {
    stable || slot.provenance() == PassProvenance::Authored
}

impl CompositingElement {
    // ── Adding ──────────────────────────────────────────────────────────────

    /// Appends an authored input pass. An empty name leaves it unnamed.
    pub fn add_input_pass(
        &mut self,
        name: &str,
        pass: impl InputPass + 'static,
    ) -> &mut PassSlot<dyn InputPass> {
        let pass: Box<dyn InputPass> = Box::new(pass);
        push_slot(&mut self.inputs, PassSlot::new(name, pass))
    }

    pub fn add_transform_pass(
        &mut self,
        name: &str,
        pass: impl TransformPass + 'static,
    ) -> &mut PassSlot<dyn TransformPass> {
        let pass: Box<dyn TransformPass> = Box::new(pass);
        push_slot(&mut self.transforms, PassSlot::new(name, pass))
    }

    pub fn add_output_pass(
        &mut self,
        name: &str,
        pass: impl OutputPass + 'static,
    ) -> &mut PassSlot<dyn OutputPass> {
        let pass: Box<dyn OutputPass> = Box::new(pass);
        push_slot(&mut self.outputs, PassSlot::new(name, pass))
    }

    /// Appends an input pass constructed at runtime.
    pub fn add_new_input_pass(
        &mut self,
        name: &str,
        pass: impl InputPass + 'static,
    ) -> &mut PassSlot<dyn InputPass> {
        let pass: Box<dyn InputPass> = Box::new(pass);
        let slot = PassSlot::new(name, pass).with_provenance(PassProvenance::Constructed);
        push_slot(&mut self.inputs, slot)
    }

    pub fn add_new_transform_pass(
        &mut self,
        name: &str,
        pass: impl TransformPass + 'static,
    ) -> &mut PassSlot<dyn TransformPass> {
        let pass: Box<dyn TransformPass> = Box::new(pass);
        let slot = PassSlot::new(name, pass).with_provenance(PassProvenance::Constructed);
        push_slot(&mut self.transforms, slot)
    }

    pub fn add_new_output_pass(
        &mut self,
        name: &str,
        pass: impl OutputPass + 'static,
    ) -> &mut PassSlot<dyn OutputPass> {
        let pass: Box<dyn OutputPass> = Box::new(pass);
        let slot = PassSlot::new(name, pass).with_provenance(PassProvenance::Constructed);
        push_slot(&mut self.outputs, slot)
    }

    // ── Removing ────────────────────────────────────────────────────────────

    /// Removes the first pass named `name` from whichever stage holds it.
    /// The removed pass is reset.
    pub fn remove_pass(&mut self, name: &str) -> bool {
        let name = Name::new(name);
        remove_named(&mut self.inputs, name)
            || remove_named(&mut self.transforms, name)
            || remove_named(&mut self.outputs, name)
    }

    // ── Finding ─────────────────────────────────────────────────────────────

    /// Finds an input pass by name, with its current result.
    #[must_use]
    pub fn find_input_pass(&self, name: &str) -> Option<(&PassSlot<dyn InputPass>, Option<Texture>)> {
        let index = position_of(&self.inputs, Name::new(name))?;
        Some((&self.inputs[index], self.find_named_render_result(name, false)))
    }

    /// Finds a transform pass by name, with its current result.
    #[must_use]
    pub fn find_transform_pass(
        &self,
        name: &str,
    ) -> Option<(&PassSlot<dyn TransformPass>, Option<Texture>)> {
        let index = position_of(&self.transforms, Name::new(name))?;
        Some((&self.transforms[index], self.find_named_render_result(name, false)))
    }

    #[must_use]
    pub fn find_output_pass(&self, name: &str) -> Option<&PassSlot<dyn OutputPass>> {
        let index = position_of(&self.outputs, Name::new(name))?;
        Some(&self.outputs[index])
    }

    pub fn input_pass_mut(&mut self, name: &str) -> Option<&mut PassSlot<dyn InputPass>> {
        let index = position_of(&self.inputs, Name::new(name))?;
        Some(&mut self.inputs[index])
    }

    pub fn transform_pass_mut(&mut self, name: &str) -> Option<&mut PassSlot<dyn TransformPass>> {
        let index = position_of(&self.transforms, Name::new(name))?;
        Some(&mut self.transforms[index])
    }

    pub fn output_pass_mut(&mut self, name: &str) -> Option<&mut PassSlot<dyn OutputPass>> {
        let index = position_of(&self.outputs, Name::new(name))?;
        Some(&mut self.outputs[index])
    }

    #[must_use]
    pub fn input_passes(&self) -> &[PassSlot<dyn InputPass>] {
        &self.inputs
    }

    #[must_use]
    pub fn transform_passes(&self) -> &[PassSlot<dyn TransformPass>] {
        &self.transforms
    }

    #[must_use]
    pub fn output_passes(&self) -> &[PassSlot<dyn OutputPass>] {
        &self.outputs
    }

    pub fn input_passes_mut(&mut self) -> &mut [PassSlot<dyn InputPass>] {
        &mut self.inputs
    }

    pub fn transform_passes_mut(&mut self) -> &mut [PassSlot<dyn TransformPass>] {
        &mut self.transforms
    }

    pub fn output_passes_mut(&mut self) -> &mut [PassSlot<dyn OutputPass>] {
        &mut self.outputs
    }
}
