//! Per-frame orchestration.
//!
//! # Intermediate generations
//!
//! Input and transform passes flagged intermediate (or unnamed) get their
//! targets tagged with the current [`IntermediateGeneration`]. Every time the
//! latest result actually changes, the generation flips and everything
//! tagged with the generation that becomes current (two flips old) is
//! dropped from the lookup table and handed back to the pool. An
//! intermediate result therefore lives exactly as long as the next pass
//! needs it.
//!
//! Inputs flip once after the whole stage so that every input is visible to
//! the first transform pass.

use super::CompositingElement;
use super::passes::is_scheduled;
use crate::lookup::{PassResultLookup, TextureLookupTable};
use crate::pass::builtin::AlphaTransformPass;
use crate::pass::{CompositingPass, PassSlot, TransformContext, TransformPass};
use crate::target::inherited::ScopedTagAddendum;
use crate::target::texture::{Texture, same_texture};
use crate::target::usage::{IntermediateGeneration, TargetUsage};

/// Scans `passes` backwards for the first enabled pass with a registered,
/// non-empty result.
fn find_last_render_result<P: ?Sized + CompositingPass>(
    passes: &[PassSlot<P>],
    table: &TextureLookupTable,
    stable: bool,
) -> Option<Texture> {
    passes
        .iter()
        .rev()
        .filter(|slot| slot.is_enabled() && is_scheduled(*slot, stable))
        .find_map(|slot| {
            slot.name()
                .and_then(|name| table.find_named_pass_result(name, false).flatten())
        })
}

/// Stage tag plus the current generation when the pass is intermediate.
fn pass_usage<P: ?Sized + CompositingPass>(
    stage: TargetUsage,
    slot: &PassSlot<P>,
    generation: IntermediateGeneration,
    reuse_intermediates: bool,
) -> TargetUsage {
    if reuse_intermediates && slot.wants_intermediate_target() {
        stage | generation.tag()
    } else {
        stage
    }
}

impl CompositingElement {
    /// Runs one full frame and returns the element's final result.
    ///
    /// Nothing here fails: passes that cannot get a target or a collaborator
    /// log and pass their input through, and a frame without any result
    /// reports `None`.
    pub fn enqueue_rendering(&mut self, camera_cut: bool) -> Option<Texture> {
        if !self.use_shared_pool
            && let Some(pool) = &self.pool
        {
            pool.borrow_mut().apply_settings(&self.context.settings());
        }

        self.frame_reset();
        self.begin_frame_for_all_passes(camera_cut);

        self.generate_inputs();
        self.apply_transforms();

        let mut result = self.latest_render_result();
        result = self.apply_opacity(result);
        self.update_final_render_result(result.as_ref());

        for listener in &mut self.final_listeners {
            listener(self.name, result.as_ref());
        }

        self.relay_outputs();
        self.end_frame_for_all_passes();

        log::trace!("Element {} finished frame with {:?}", self.name, result.as_ref().map(Texture::id));
        result
    }

    /// Returns this element's frame targets to the pool and wipes its lookup
    /// table, keeping frozen and persistent results.
    pub fn frame_reset(&mut self) {
        let keep = self.freeze_mask | TargetUsage::PERSISTENT;
        if let Some(pool) = &self.pool {
            pool.borrow_mut()
                .release_assigned_targets(Some(&self.owner), keep);
        }
        self.lookup.borrow_mut().empty(keep);
        self.display_texture = None;
    }

    pub fn begin_frame_for_all_passes(&mut self, camera_cut: bool) {
        let stable = self.context.settings().use_stable_pass_list;
        for slot in self.inputs.iter_mut().filter(|s| is_scheduled(&**s, stable)) {
            slot.pass_mut().on_frame_begin(camera_cut);
        }
        for slot in self.transforms.iter_mut().filter(|s| is_scheduled(&**s, stable)) {
            slot.pass_mut().on_frame_begin(camera_cut);
        }
        for slot in self.outputs.iter_mut().filter(|s| is_scheduled(&**s, stable)) {
            slot.pass_mut().on_frame_begin(camera_cut);
        }
    }

    pub fn end_frame_for_all_passes(&mut self) {
        let stable = self.context.settings().use_stable_pass_list;
        for slot in self.inputs.iter_mut().filter(|s| is_scheduled(&**s, stable)) {
            slot.pass_mut().on_frame_end();
        }
        for slot in self.transforms.iter_mut().filter(|s| is_scheduled(&**s, stable)) {
            slot.pass_mut().on_frame_end();
        }
        for slot in self.outputs.iter_mut().filter(|s| is_scheduled(&**s, stable)) {
            slot.pass_mut().on_frame_end();
        }
    }

    /// Runs every input pass, or reuses last frame's input when frozen.
    pub fn generate_inputs(&mut self) {
        let settings = self.context.settings();
        let stable = settings.use_stable_pass_list;

        if self.freeze_mask.contains(TargetUsage::INPUT) {
            let frozen = find_last_render_result(&self.inputs, &self.lookup.borrow(), stable);
            self.update_final_render_result(frozen.as_ref());
            return;
        }

        let mut view = self.target_pool_view(TargetUsage::INPUT);
        for index in 0..self.inputs.len() {
            let slot = &mut self.inputs[index];
            if !is_scheduled(slot, stable) {
                continue;
            }
            let usage = pass_usage(
                TargetUsage::INPUT,
                slot,
                self.generation,
                settings.reuse_intermediate_targets,
            );

            let result = if slot.is_enabled() {
                let tagged = ScopedTagAddendum::new(usage, &mut view);
                slot.pass_mut().generate_input(&tagged)
            } else {
                None
            };

            let name = slot.name();
            if let Err(err) = self.register_tagged_pass_result(name, result.as_ref(), usage) {
                log::error!("Element {}: {err}", self.name);
            }
            self.update_final_render_result(result.as_ref());
        }
        view.reset();

        self.inc_intermediate_tracking_tag();
    }

    /// Runs every transform pass over the latest result, or reuses last
    /// frame's transform result when frozen.
    pub fn apply_transforms(&mut self) {
        let settings = self.context.settings();
        let stable = settings.use_stable_pass_list;

        if self.freeze_mask.contains(TargetUsage::TRANSFORM) {
            let frozen = find_last_render_result(&self.transforms, &self.lookup.borrow(), stable);
            self.update_final_render_result(frozen.as_ref());
            return;
        }

        let camera = self.target_camera.clone();
        let mut view = self.target_pool_view(TargetUsage::TRANSFORM);
        let mut previous = self.latest_render_result();

        for index in 0..self.transforms.len() {
            let slot = &mut self.transforms[index];
            if !is_scheduled(slot, stable) {
                continue;
            }
            let usage = pass_usage(
                TargetUsage::TRANSFORM,
                slot,
                self.generation,
                settings.reuse_intermediate_targets,
            );

            let result = if slot.is_enabled() {
                let table = self.lookup.borrow();
                let context = TransformContext {
                    lookup: PassResultLookup::new(&table),
                    post_process: self.post_process.as_deref(),
                    camera: camera.as_ref(),
                };
                let tagged = ScopedTagAddendum::new(usage, &mut view);
                slot.pass_mut()
                    .apply_transform(previous.as_ref(), &context, &tagged)
            } else {
                None
            };

            let name = slot.name();
            if let Err(err) = self.register_tagged_pass_result(name, result.as_ref(), usage) {
                log::error!("Element {}: {err}", self.name);
            }

            if let Some(result) = result
                && !same_texture(Some(&result), previous.as_ref())
            {
                self.update_final_render_result(Some(&result));
                previous = Some(result);
                self.inc_intermediate_tracking_tag();
            }
        }
        view.reset();
    }

    /// Scales `result` by the element opacity through a lazily created alpha
    /// pass. The pass is discarded once opacity is back at one.
    fn apply_opacity(&mut self, result: Option<Texture>) -> Option<Texture> {
        let current = match result {
            Some(current) if self.opacity < 1.0 => current,
            other => {
                if let Some(mut pass) = self.alpha_pass.take() {
                    pass.reset();
                    log::debug!("Element {} discarded its alpha pass", self.name);
                }
                return other;
            }
        };

        let mut view = self.target_pool_view(TargetUsage::TRANSFORM);
        let pass = self
            .alpha_pass
            .get_or_insert_with(AlphaTransformPass::default);
        pass.alpha_scale = self.opacity;

        let blended = {
            let table = self.lookup.borrow();
            let context = TransformContext {
                lookup: PassResultLookup::new(&table),
                post_process: self.post_process.as_deref(),
                camera: self.target_camera.as_ref(),
            };
            pass.apply_transform(Some(&current), &context, &view)
        };
        view.reset();

        match blended {
            Some(blended) if blended != current => {
                self.update_final_render_result(Some(&blended));
                self.inc_intermediate_tracking_tag();
                Some(blended)
            }
            _ => Some(current),
        }
    }

    /// Hands the final result to every enabled output pass.
    pub fn relay_outputs(&mut self) {
        if self.freeze_mask.contains(TargetUsage::OUTPUT) {
            return;
        }
        let stable = self.context.settings().use_stable_pass_list;
        let result = self.latest_render_result();

        let mut view = self.target_pool_view(TargetUsage::OUTPUT);
        for slot in &mut self.outputs {
            if slot.is_enabled() && is_scheduled(slot, stable) {
                slot.pass_mut()
                    .relay_output(result.as_ref(), self.post_process.as_deref(), &view);
            }
        }
        view.reset();
    }

    /// Flips the intermediate generation and reclaims everything tagged with
    /// the generation that becomes current.
    ///
    /// The latest result is never reclaimed: a transform may hand back an
    /// earlier intermediate, which then stays checked out until frame reset.
    pub fn inc_intermediate_tracking_tag(&mut self) {
        self.generation = self.generation.flipped();
        let stale = self.generation.tag();
        let latest = self.latest_render_result();

        {
            let mut table = self.lookup.borrow_mut();
            if let Some(latest) = &latest {
                table.remove_usage_tags(latest, stale);
            }
            table.clear_tagged_entries(stale, false);
        }
        if let Some(pool) = &self.pool {
            let mut pool = pool.borrow_mut();
            if let Some(latest) = &latest {
                pool.remove_usage_tags(latest, stale);
            }
            let released = pool.release_tagged_targets(stale, Some(&self.owner));
            if released > 0 {
                log::trace!("Element {} reclaimed {released} intermediate targets", self.name);
            }
        }
    }
}
