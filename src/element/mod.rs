//! Compositing Elements
//!
//! A [`CompositingElement`] is one layer of a composite: an ordered pipeline
//! of input, transform and output passes, a lookup table of the results they
//! produced this frame, and a (shared or private) render target pool the
//! passes draw into.
//!
//! # Frame
//!
//! ```text
//! frame_reset ─► begin_frame ─► generate_inputs ─► apply_transforms
//!                                                         │
//!         end_frame ◄─ relay_outputs ◄─ (alpha blend) ◄───┘
//! ```
//!
//! See [`CompositingElement::enqueue_rendering`]. The stages live in
//! `frame.rs`, pass list management in `passes.rs`.
//!
//! # Hierarchy
//!
//! Elements form a tree owned by a
//! [`CompositingGraph`](crate::graph::CompositingGraph). Resolution, format
//! and camera may be inherited from the parent; the graph resolves them and
//! writes the result into the element before each frame.

mod frame;
mod passes;

use std::cell::Ref;
use std::rc::Rc;

use glam::IVec2;

use crate::camera::SceneCamera;
use crate::context::CompositingContext;
use crate::errors::{CompositingError, Result};
use crate::graph::{CameraKey, ElementKey};
use crate::lookup::{SharedLookupTable, TextureLookupTable};
use crate::pass::builtin::AlphaTransformPass;
use crate::pass::proxy::{CompositeCommand, CompositingMaterial, PostProcessProxy};
use crate::pass::{CompositingPass, InputPass, OutputPass, PassSlot, TransformPass};
use crate::target::inherited::InheritedTargetPool;
use crate::target::pool::{RenderTargetPool, SharedTargetPool, TargetOwner};
use crate::target::texture::{
    DEFAULT_TARGET_FORMAT, DEFAULT_TARGET_RESOLUTION, Texture, same_texture,
};
use crate::target::usage::{IntermediateGeneration, TargetUsage};
use crate::utils::Name;

/// A property either set on the element or taken from its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Inheritable<T> {
    #[default]
    Inherited,
    Override(T),
}

/// Where an element's target camera comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CameraSource {
    /// The parent's camera. Root elements use their camera actor, or scan
    /// the scene when it is unset or gone.
    #[default]
    Inherited,
    /// Always the element's own camera actor, even if unset.
    Override,
}

/// Receives the element name and the frame's final result.
pub type FinalPassListener = Box<dyn FnMut(Name, Option<&Texture>)>;

/// Receives the element name, a pass result and the pass name.
pub type PassRenderedListener = Box<dyn FnMut(Name, Option<&Texture>, Option<Name>)>;

/// One layer of a composite.
pub struct CompositingElement {
    name: Name,
    owner: TargetOwner,
    context: Rc<CompositingContext>,

    // === Hierarchy (maintained by the graph) ===
    pub(crate) parent: Option<ElementKey>,
    pub(crate) children: Vec<ElementKey>,

    // === Pipeline ===
    inputs: Vec<PassSlot<dyn InputPass>>,
    transforms: Vec<PassSlot<dyn TransformPass>>,
    outputs: Vec<PassSlot<dyn OutputPass>>,
    alpha_pass: Option<AlphaTransformPass>,
    post_process: Option<Rc<dyn PostProcessProxy>>,

    // === Results ===
    lookup: SharedLookupTable,
    pool: Option<SharedTargetPool>,
    use_shared_pool: bool,
    generation: IntermediateGeneration,
    freeze_mask: TargetUsage,
    display_texture: Option<Texture>,

    // === State ===
    opacity: f32,
    auto_run: bool,
    enabled: bool,

    // === Inheritance ===
    resolution_source: Inheritable<IVec2>,
    format_source: Inheritable<wgpu::TextureFormat>,
    camera_source: CameraSource,
    inherited_resolution: IVec2,
    inherited_format: wgpu::TextureFormat,
    camera_actor: Option<CameraKey>,
    target_camera: Option<SceneCamera>,
    render_priority: i32,

    // === Listeners ===
    final_listeners: Vec<FinalPassListener>,
    pass_listeners: Vec<PassRenderedListener>,
}

impl CompositingElement {
    #[must_use]
    pub fn new(name: &str, context: &Rc<CompositingContext>) -> Self {
        Self {
            name: Name::new(name),
            owner: TargetOwner::new(name),
            context: Rc::clone(context),
            parent: None,
            children: Vec::new(),
            inputs: Vec::new(),
            transforms: Vec::new(),
            outputs: Vec::new(),
            alpha_pass: None,
            post_process: None,
            lookup: TextureLookupTable::new_shared(),
            pool: None,
            use_shared_pool: true,
            generation: IntermediateGeneration::default(),
            freeze_mask: TargetUsage::empty(),
            display_texture: None,
            opacity: 1.0,
            auto_run: true,
            enabled: true,
            resolution_source: Inheritable::Inherited,
            format_source: Inheritable::Inherited,
            camera_source: CameraSource::Inherited,
            inherited_resolution: DEFAULT_TARGET_RESOLUTION,
            inherited_format: DEFAULT_TARGET_FORMAT,
            camera_actor: None,
            target_camera: None,
            render_priority: RenderTargetPool::EXTENSION_PRIORITY + 1,
            final_listeners: Vec::new(),
            pass_listeners: Vec::new(),
        }
    }

    // ── Identity ────────────────────────────────────────────────────────────

    #[inline]
    #[must_use]
    pub fn name(&self) -> Name {
        self.name
    }

    /// Renames the element. A parent's linked-table key follows on the next
    /// frame.
    pub fn set_comp_id_name(&mut self, name: &str) {
        self.name = Name::new(name);
    }

    /// Identity the element checks targets out of its pool with.
    #[must_use]
    pub fn owner(&self) -> &TargetOwner {
        &self.owner
    }

    #[must_use]
    pub fn context(&self) -> &Rc<CompositingContext> {
        &self.context
    }

    #[must_use]
    pub fn parent(&self) -> Option<ElementKey> {
        self.parent
    }

    #[must_use]
    pub fn children(&self) -> &[ElementKey] {
        &self.children
    }

    // ── Inherited properties ────────────────────────────────────────────────

    #[must_use]
    pub fn render_resolution(&self) -> IVec2 {
        match self.resolution_source {
            Inheritable::Override(resolution) => resolution,
            Inheritable::Inherited => self.inherited_resolution,
        }
    }

    #[must_use]
    pub fn render_format(&self) -> wgpu::TextureFormat {
        match self.format_source {
            Inheritable::Override(format) => format,
            Inheritable::Inherited => self.inherited_format,
        }
    }

    #[must_use]
    pub fn resolution_source(&self) -> Inheritable<IVec2> {
        self.resolution_source
    }

    pub fn set_resolution_source(&mut self, source: Inheritable<IVec2>) {
        self.resolution_source = source;
    }

    #[must_use]
    pub fn format_source(&self) -> Inheritable<wgpu::TextureFormat> {
        self.format_source
    }

    pub fn set_format_source(&mut self, source: Inheritable<wgpu::TextureFormat>) {
        self.format_source = source;
    }

    #[must_use]
    pub fn camera_source(&self) -> CameraSource {
        self.camera_source
    }

    pub fn set_camera_source(&mut self, source: CameraSource) {
        self.camera_source = source;
    }

    /// The explicitly linked camera.
    #[must_use]
    pub fn camera_actor(&self) -> Option<CameraKey> {
        self.camera_actor
    }

    pub fn set_camera_actor(&mut self, camera: Option<CameraKey>) {
        self.camera_actor = camera;
    }

    /// Camera handed to transform passes, as resolved before the frame.
    #[must_use]
    pub fn target_camera(&self) -> Option<&SceneCamera> {
        self.target_camera.as_ref()
    }

    /// Parents render before children: a child's priority is its parent's
    /// plus one.
    #[must_use]
    pub fn render_priority(&self) -> i32 {
        self.render_priority
    }

    pub(crate) fn set_inherited_target(&mut self, resolution: IVec2, format: wgpu::TextureFormat) {
        self.inherited_resolution = resolution;
        self.inherited_format = format;
    }

    pub(crate) fn set_target_camera(&mut self, camera: Option<SceneCamera>) {
        self.target_camera = camera;
    }

    pub(crate) fn set_render_priority(&mut self, priority: i32) {
        self.render_priority = priority;
    }

    // ── Running state ───────────────────────────────────────────────────────

    #[must_use]
    pub fn opacity(&self) -> f32 {
        self.opacity
    }

    /// Sets the output opacity. Crossing to zero disables the element when
    /// `disable_element_when_opacity_zero` is on.
    pub fn set_opacity(&mut self, opacity: f32) {
        if self.opacity == opacity {
            return;
        }
        if opacity <= 0.0
            && self.opacity > 0.0
            && self.context.settings().disable_element_when_opacity_zero
        {
            self.on_disabled();
        }
        self.opacity = opacity;
    }

    #[must_use]
    pub fn auto_run(&self) -> bool {
        self.auto_run
    }

    pub fn set_auto_run(&mut self, auto_run: bool) {
        if self.auto_run == auto_run {
            return;
        }
        self.auto_run = auto_run;
        if !auto_run && !self.is_actively_running() {
            self.on_disabled();
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        if self.enabled == enabled {
            return;
        }
        self.enabled = enabled;
        if !enabled {
            self.on_disabled();
        }
    }

    /// Whether the graph renders this element automatically each frame.
    #[must_use]
    pub fn is_actively_running(&self) -> bool {
        let settings = self.context.settings();
        self.auto_run
            && self.enabled
            && !settings.disable_active_rendering
            && (!settings.disable_element_when_opacity_zero || self.opacity > 0.0)
    }

    /// Drops every result reference and returns all non-persistent targets.
    pub fn on_disabled(&mut self) {
        self.lookup.borrow_mut().clear_textures();
        self.display_texture = None;
        self.freeze_mask = TargetUsage::empty();
        if let Some(pool) = &self.pool {
            pool.borrow_mut()
                .release_assigned_targets(Some(&self.owner), TargetUsage::PERSISTENT);
        }
    }

    #[must_use]
    pub fn freeze_frame_mask(&self) -> TargetUsage {
        self.freeze_mask
    }

    /// Freezes the stages named in `mask`: they reuse last frame's result
    /// instead of recomputing it.
    pub fn set_freeze_frame_mask(&mut self, mask: TargetUsage) {
        self.freeze_mask = mask;
    }

    #[must_use]
    pub fn intermediate_generation(&self) -> IntermediateGeneration {
        self.generation
    }

    /// Texture currently shown for this element, if any.
    #[must_use]
    pub fn display_texture(&self) -> Option<&Texture> {
        self.display_texture.as_ref()
    }

    #[must_use]
    pub fn has_alpha_pass(&self) -> bool {
        self.alpha_pass.is_some()
    }

    pub fn set_post_process_proxy(&mut self, proxy: Option<Rc<dyn PostProcessProxy>>) {
        self.post_process = proxy;
    }

    // ── Pool ────────────────────────────────────────────────────────────────

    #[must_use]
    pub fn uses_shared_target_pool(&self) -> bool {
        self.use_shared_pool
    }

    /// Switches between the shared pool and a private one. Targets held in
    /// the old pool are returned to it.
    pub fn set_use_shared_target_pool(&mut self, shared: bool) {
        if self.use_shared_pool == shared {
            return;
        }
        if let Some(pool) = self.pool.take() {
            pool.borrow_mut()
                .release_assigned_targets(Some(&self.owner), TargetUsage::empty());
        }
        self.lookup.borrow_mut().empty(TargetUsage::empty());
        self.use_shared_pool = shared;
    }

    /// The pool this element draws from, created on first use.
    pub fn render_target_pool(&mut self) -> SharedTargetPool {
        if let Some(pool) = &self.pool {
            return Rc::clone(pool);
        }
        let pool = if self.use_shared_pool {
            self.context.shared_target_pool()
        } else {
            self.context.create_private_pool()
        };
        self.pool = Some(Rc::clone(&pool));
        pool
    }

    /// The pool, if one has been acquired already.
    #[must_use]
    pub fn current_target_pool(&self) -> Option<&SharedTargetPool> {
        self.pool.as_ref()
    }

    fn target_pool_view(&mut self, usage: TargetUsage) -> InheritedTargetPool {
        let pool = self.render_target_pool();
        InheritedTargetPool::new(
            &self.owner,
            self.render_resolution(),
            self.render_format(),
            &pool,
            usage,
        )
    }

    // ── Results ─────────────────────────────────────────────────────────────

    #[must_use]
    pub fn lookup_table(&self) -> Ref<'_, TextureLookupTable> {
        self.lookup.borrow()
    }

    pub(crate) fn shared_lookup_table(&self) -> &SharedLookupTable {
        &self.lookup
    }

    /// Rebuilds the links from this element's table to its children's.
    pub(crate) fn relink_child_tables(&self, children: &[(Name, SharedLookupTable)]) {
        let mut table = self.lookup.borrow_mut();
        table.clear_linked_search_tables();
        for (name, child) in children {
            table.link_nested_search_table(*name, child);
        }
    }

    /// Checks out a target at `scale` times the render resolution and
    /// registers it under `name` (unless empty).
    ///
    /// A persistent target already registered under `name` is returned
    /// instead of allocating a new one.
    pub fn request_named_render_target(
        &mut self,
        name: &str,
        scale: f32,
        usage: TargetUsage,
    ) -> Option<Texture> {
        if self.freeze_mask.intersects(usage) {
            log::warn!(
                "Element {} requested a render target for a freeze-framed usage ({usage:?}); \
                 frozen results should stay static",
                self.name
            );
        }

        let pool = self.render_target_pool();
        let name = (!name.is_empty()).then(|| Name::new(name));

        if let Some(name) = name
            && let Some(Some(existing)) = self.lookup.borrow().find_named_pass_result(name, false)
            && existing.is_render_target()
            && pool
                .borrow()
                .find_assigned_usage_tags(&existing)
                .contains(TargetUsage::PERSISTENT)
        {
            log::warn!(
                "Element {} requested a new render target named '{name}', which is persistent; \
                 returning the existing target",
                self.name
            );
            return Some(existing);
        }

        let resolution = (self.render_resolution().as_vec2() * scale).as_ivec2();
        let target = pool
            .borrow_mut()
            .assign_target(&self.owner, resolution, self.render_format(), usage)?;

        if let Some(name) = name {
            self.lookup
                .borrow_mut()
                .register_pass_result(name, Some(target.clone()), usage);
        }
        Some(target)
    }

    /// Returns a target to the pool. Freeze-framed targets are never
    /// released; persistent ones are also dropped from the lookup table.
    pub fn release_owned_target(&mut self, target: &Texture) -> bool {
        match self.try_release_owned_target(target) {
            Ok(()) => true,
            Err(err @ CompositingError::FrozenTarget(_)) => {
                log::error!("Blocked release by element {}: {err}", self.name);
                false
            }
            Err(err) => {
                log::warn!("Element {} could not release a target: {err}", self.name);
                false
            }
        }
    }

    fn try_release_owned_target(&mut self, target: &Texture) -> Result<()> {
        let pool = self.pool.as_ref().ok_or(CompositingError::PoolUnavailable)?;
        let usage = pool.borrow().find_assigned_usage_tags(target);
        if usage.intersects(self.freeze_mask) {
            return Err(CompositingError::FrozenTarget(target.id()));
        }
        if !pool.borrow_mut().release_target(target) {
            return Err(CompositingError::TargetNotAssigned(target.id()));
        }
        if usage.contains(TargetUsage::PERSISTENT) {
            self.lookup.borrow_mut().remove(target);
        }
        Ok(())
    }

    /// Registers an externally produced result under `name`, optionally
    /// making it the element's latest result.
    pub fn register_pass_result(
        &mut self,
        name: &str,
        result: Option<&Texture>,
        set_as_latest: bool,
    ) {
        let name = (!name.is_empty()).then(|| Name::new(name));
        if let Err(err) = self.register_tagged_pass_result(name, result, TargetUsage::empty()) {
            log::error!("Element {}: {err}", self.name);
        }
        if set_as_latest {
            self.update_final_render_result(result);
        }
    }

    /// Registers a result with explicit tags. Empty tags take the target's
    /// pool tags.
    ///
    /// A different texture is never registered over a persistent entry;
    /// release the persistent target first.
    pub fn register_tagged_pass_result(
        &mut self,
        name: Option<Name>,
        result: Option<&Texture>,
        usage: TargetUsage,
    ) -> Result<()> {
        let outcome = match name {
            Some(name) => self.register_in_table(name, result, usage),
            None => Ok(()),
        };
        for listener in &mut self.pass_listeners {
            listener(self.name, result, name);
        }
        outcome
    }

    fn register_in_table(
        &mut self,
        name: Name,
        result: Option<&Texture>,
        usage: TargetUsage,
    ) -> Result<()> {
        let mut mask = usage;
        if usage.is_empty()
            && let (Some(pool), Some(texture)) = (&self.pool, result)
        {
            mask = pool.borrow().find_assigned_usage_tags(texture);
        }

        let mut table = self.lookup.borrow_mut();
        if table.find_usage_tags(name).contains(TargetUsage::PERSISTENT) {
            let existing = table.find_named_pass_result(name, false).flatten();
            if !same_texture(existing.as_ref(), result) {
                return Err(CompositingError::PersistentConflict(name.to_string()));
            }
            return Ok(());
        }
        table.register_pass_result(name, result.cloned(), mask);
        Ok(())
    }

    /// Finds a result of this element (and, optionally, of its children).
    #[must_use]
    pub fn find_named_render_result(&self, name: &str, search_children: bool) -> Option<Texture> {
        self.lookup
            .borrow()
            .find_named_pass_result(name, search_children)
            .flatten()
    }

    /// The most recent result produced by this element.
    #[must_use]
    pub fn latest_render_result(&self) -> Option<Texture> {
        let table = self.lookup.borrow();
        table
            .find_named_pass_result(table.prepass_name(), false)
            .flatten()
    }

    fn update_final_render_result(&mut self, result: Option<&Texture>) {
        if let Some(result) = result {
            self.display_texture = Some(result.clone());
            self.lookup.borrow_mut().set_most_recent_result(result.clone());
        }
    }

    /// Draws `material` into a named target at `scale` times the render
    /// resolution. A frozen `usage` returns the previously registered result.
    pub fn render_compositing_material(
        &mut self,
        material: &CompositingMaterial,
        scale: f32,
        name: &str,
        usage: TargetUsage,
    ) -> Option<Texture> {
        if self.freeze_mask.intersects(usage) {
            return self.find_named_render_result(name, false);
        }
        let target = self.request_named_render_target(name, scale, usage);
        self.render_compositing_material_to_target(material, target, name)
    }

    /// Draws `material` into `target` and registers it as the latest result.
    pub fn render_compositing_material_to_target(
        &mut self,
        material: &CompositingMaterial,
        target: Option<Texture>,
        name: &str,
    ) -> Option<Texture> {
        let frozen = match (&self.pool, &target) {
            (Some(pool), Some(target)) => pool
                .borrow()
                .find_assigned_usage_tags(target)
                .intersects(self.freeze_mask),
            _ => false,
        };
        if frozen {
            return self.find_named_render_result(name, false);
        }

        let target = target?;
        let Some(proxy) = self.post_process.clone() else {
            log::warn!(
                "Element {} has no post-process proxy; material {} not drawn",
                self.name,
                material.material
            );
            return Some(target);
        };

        let inputs = material.resolve_params(&self.lookup.borrow());
        proxy.submit(CompositeCommand::Material {
            material: material.material,
            inputs,
            target: target.clone(),
        });
        if !name.is_empty() {
            self.register_pass_result(name, Some(&target), true);
        }
        Some(target)
    }

    // ── Listeners ───────────────────────────────────────────────────────────

    /// Called at the end of every frame with the final result.
    pub fn on_final_pass_rendered(&mut self, listener: impl FnMut(Name, Option<&Texture>) + 'static) {
        self.final_listeners.push(Box::new(listener));
    }

    /// Called for every registered pass result.
    pub fn on_pass_rendered(
        &mut self,
        listener: impl FnMut(Name, Option<&Texture>, Option<Name>) + 'static,
    ) {
        self.pass_listeners.push(Box::new(listener));
    }
}

impl Drop for CompositingElement {
    fn drop(&mut self) {
        if let Some(mut pass) = self.alpha_pass.take() {
            pass.reset();
        }
        let Some(pool) = self.pool.take() else {
            return;
        };
        match pool.try_borrow_mut() {
            Ok(mut pool) => {
                let released =
                    pool.release_assigned_targets(Some(&self.owner), TargetUsage::empty());
                log::debug!("Element {} returned {released} targets on teardown", self.name);
            }
            Err(_) => log::warn!(
                "Element {} dropped while its pool was busy; its targets are left as orphans",
                self.name
            ),
        }
    }
}
