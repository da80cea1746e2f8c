//! Compositing Graph
//!
//! Owns every [`CompositingElement`] of a composite together with the
//! cameras they can target, and drives their frames.
//!
//! # Hierarchy
//!
//! Elements form a forest. Parent and child links live in the elements
//! themselves but are only ever changed here, so both sides stay in sync:
//!
//! - [`attach_as_child_layer`](CompositingGraph::attach_as_child_layer)
//!   re-parents a child (cycles are rejected)
//! - [`detach_as_child_layer`](CompositingGraph::detach_as_child_layer)
//!   turns it back into a root
//!
//! # Frame
//!
//! [`render_frame`](CompositingGraph::render_frame) first resolves every
//! inherited property (resolution, format, camera, render priority) and
//! rebuilds the lookup-table links from parents to children, then renders
//! all actively running elements in ascending render priority.

use std::rc::Rc;

use glam::IVec2;
use slotmap::{SlotMap, new_key_type};

use crate::camera::{CameraKind, SceneCamera};
use crate::context::CompositingContext;
use crate::element::{CameraSource, CompositingElement, Inheritable};
use crate::errors::{CompositingError, Result};
use crate::lookup::SharedLookupTable;
use crate::target::pool::RenderTargetPool;
use crate::target::texture::{DEFAULT_TARGET_FORMAT, DEFAULT_TARGET_RESOLUTION};
use crate::utils::Name;

new_key_type! {
    /// Handle of an element in a [`CompositingGraph`].
    pub struct ElementKey;
    /// Handle of a camera in a [`CompositingGraph`].
    pub struct CameraKey;
}

pub struct CompositingGraph {
    context: Rc<CompositingContext>,
    elements: SlotMap<ElementKey, CompositingElement>,
    roots: Vec<ElementKey>,
    cameras: SlotMap<CameraKey, SceneCamera>,
    /// Cameras in insertion order, for deterministic scene scans.
    camera_order: Vec<CameraKey>,
}

impl CompositingGraph {
    #[must_use]
    pub fn new(context: Rc<CompositingContext>) -> Self {
        Self {
            context,
            elements: SlotMap::with_key(),
            roots: Vec::new(),
            cameras: SlotMap::with_key(),
            camera_order: Vec::new(),
        }
    }

    #[must_use]
    pub fn context(&self) -> &Rc<CompositingContext> {
        &self.context
    }

    // ── Elements ────────────────────────────────────────────────────────────

    /// Creates a root element.
    pub fn create_element(&mut self, name: &str) -> ElementKey {
        let key = self
            .elements
            .insert(CompositingElement::new(name, &self.context));
        self.roots.push(key);
        key
    }

    /// Creates an element directly under `parent`.
    pub fn create_child_element(&mut self, name: &str, parent: ElementKey) -> Result<ElementKey> {
        if !self.elements.contains_key(parent) {
            return Err(CompositingError::InvalidHierarchy(format!(
                "parent of '{name}' does not exist"
            )));
        }
        let key = self.create_element(name);
        self.attach_as_child_layer(parent, key)?;
        Ok(key)
    }

    /// Removes an element. Its children become roots; its targets go back
    /// to the pool.
    pub fn remove_element(&mut self, key: ElementKey) -> bool {
        let Some(element) = self.elements.get(key) else {
            return false;
        };
        let parent = element.parent;
        let children = element.children.clone();

        for child in children {
            if let Some(child) = self.elements.get_mut(child) {
                child.parent = None;
            }
            self.roots.push(child);
        }
        match parent {
            Some(parent) => {
                if let Some(parent) = self.elements.get_mut(parent) {
                    parent.children.retain(|c| *c != key);
                }
            }
            None => self.roots.retain(|r| *r != key),
        }

        self.elements.remove(key).is_some()
    }

    #[must_use]
    pub fn element(&self, key: ElementKey) -> Option<&CompositingElement> {
        self.elements.get(key)
    }

    pub fn element_mut(&mut self, key: ElementKey) -> Option<&mut CompositingElement> {
        self.elements.get_mut(key)
    }

    /// First element named `name`.
    #[must_use]
    pub fn find_element(&self, name: &str) -> Option<ElementKey> {
        let name = Name::new(name);
        self.elements
            .iter()
            .find(|(_, element)| element.name() == name)
            .map(|(key, _)| key)
    }

    pub fn elements(&self) -> impl Iterator<Item = (ElementKey, &CompositingElement)> {
        self.elements.iter()
    }

    #[must_use]
    pub fn roots(&self) -> &[ElementKey] {
        &self.roots
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    // ── Hierarchy ───────────────────────────────────────────────────────────

    /// Makes `child` a child layer of `parent`, detaching it from any other
    /// parent. Returns whether anything changed.
    pub fn attach_as_child_layer(&mut self, parent: ElementKey, child: ElementKey) -> Result<bool> {
        if !self.elements.contains_key(parent) || !self.elements.contains_key(child) {
            return Err(CompositingError::InvalidHierarchy(
                "attach between unknown elements".to_owned(),
            ));
        }
        if parent == child || self.is_ancestor(child, parent) {
            return Err(CompositingError::InvalidHierarchy(format!(
                "attaching '{}' under '{}' would create a cycle",
                self.elements[child].name(),
                self.elements[parent].name()
            )));
        }

        let old_parent = self.elements[child].parent;
        if old_parent != Some(parent) {
            match old_parent {
                Some(old) => {
                    self.detach_as_child_layer(old, child);
                }
                None => self.roots.retain(|r| *r != child),
            }
            self.elements[parent].children.push(child);
            self.roots.retain(|r| *r != child);
            self.elements[child].parent = Some(parent);
            return Ok(true);
        }
        if !self.elements[parent].children.contains(&child) {
            self.elements[parent].children.push(child);
            return Ok(true);
        }
        Ok(false)
    }

    /// Removes `child` from `parent`'s child layers, making it a root.
    pub fn detach_as_child_layer(&mut self, parent: ElementKey, child: ElementKey) -> bool {
        let Some(parent_element) = self.elements.get_mut(parent) else {
            return false;
        };
        let before = parent_element.children.len();
        parent_element.children.retain(|c| *c != child);
        let modified = parent_element.children.len() != before;

        match self.elements.get_mut(child) {
            Some(child_element) if child_element.parent == Some(parent) => {
                child_element.parent = None;
                self.roots.push(child);
            }
            Some(_) => log::warn!("Detached an element from a layer that was not its parent"),
            None => {}
        }
        modified
    }

    /// `true` if `ancestor` is `key` or one of its ancestors.
    fn is_ancestor(&self, ancestor: ElementKey, key: ElementKey) -> bool {
        let mut current = Some(key);
        while let Some(k) = current {
            if k == ancestor {
                return true;
            }
            current = self.elements.get(k).and_then(|e| e.parent);
        }
        false
    }

    #[must_use]
    pub fn is_sub_element(&self, key: ElementKey) -> bool {
        self.element_parent(key).is_some()
    }

    #[must_use]
    pub fn element_parent(&self, key: ElementKey) -> Option<ElementKey> {
        self.elements.get(key).and_then(|e| e.parent)
    }

    #[must_use]
    pub fn child_elements(&self, key: ElementKey) -> &[ElementKey] {
        self.elements.get(key).map_or(&[][..], |e| e.children.as_slice())
    }

    // ── Cameras ─────────────────────────────────────────────────────────────

    pub fn add_camera(&mut self, camera: SceneCamera) -> CameraKey {
        let key = self.cameras.insert(camera);
        self.camera_order.push(key);
        key
    }

    pub fn remove_camera(&mut self, key: CameraKey) -> Option<SceneCamera> {
        self.camera_order.retain(|k| *k != key);
        self.cameras.remove(key)
    }

    #[must_use]
    pub fn camera(&self, key: CameraKey) -> Option<&SceneCamera> {
        self.cameras.get(key)
    }

    pub fn camera_mut(&mut self, key: CameraKey) -> Option<&mut SceneCamera> {
        self.cameras.get_mut(key)
    }

    fn is_valid_camera(&self, key: CameraKey) -> bool {
        self.cameras.get(key).is_some_and(SceneCamera::is_valid)
    }

    fn first_valid_camera(&self, kind: CameraKind) -> Option<CameraKey> {
        self.camera_order
            .iter()
            .copied()
            .find(|k| self.cameras.get(*k).is_some_and(|c| c.kind == kind && c.is_valid()))
    }

    // ── Inherited properties ────────────────────────────────────────────────

    /// Resolves the camera an element targets.
    ///
    /// An override always wins. Otherwise the parent's camera is used; a
    /// root uses its own camera actor, or failing that the first valid cine
    /// camera, then the first valid standard camera.
    #[must_use]
    pub fn find_target_camera(&self, key: ElementKey) -> Option<CameraKey> {
        let element = self.elements.get(key)?;
        let actor = element
            .camera_actor()
            .filter(|k| self.cameras.contains_key(*k));

        match element.camera_source() {
            CameraSource::Override => actor,
            CameraSource::Inherited => {
                if let Some(parent) = element.parent {
                    return self.find_target_camera(parent);
                }
                if let Some(actor) = actor.filter(|k| self.is_valid_camera(*k)) {
                    return Some(actor);
                }
                self.first_valid_camera(CameraKind::Cine)
                    .or_else(|| self.first_valid_camera(CameraKind::Standard))
                    .or(actor)
            }
        }
    }

    #[must_use]
    pub fn render_resolution(&self, key: ElementKey) -> IVec2 {
        let Some(element) = self.elements.get(key) else {
            return DEFAULT_TARGET_RESOLUTION;
        };
        match (element.resolution_source(), element.parent) {
            (Inheritable::Override(resolution), _) => resolution,
            (Inheritable::Inherited, Some(parent)) => self.render_resolution(parent),
            (Inheritable::Inherited, None) => DEFAULT_TARGET_RESOLUTION,
        }
    }

    #[must_use]
    pub fn render_format(&self, key: ElementKey) -> wgpu::TextureFormat {
        let Some(element) = self.elements.get(key) else {
            return DEFAULT_TARGET_FORMAT;
        };
        match (element.format_source(), element.parent) {
            (Inheritable::Override(format), _) => format,
            (Inheritable::Inherited, Some(parent)) => self.render_format(parent),
            (Inheritable::Inherited, None) => DEFAULT_TARGET_FORMAT,
        }
    }

    /// A root renders at `EXTENSION_PRIORITY + 1`, each level below at one
    /// more than its parent.
    #[must_use]
    pub fn render_priority(&self, key: ElementKey) -> i32 {
        match self.element_parent(key) {
            Some(parent) => self.render_priority(parent) + 1,
            None => RenderTargetPool::EXTENSION_PRIORITY + 1,
        }
    }

    /// Pushes resolved inherited properties and child lookup links into
    /// every element.
    pub fn refresh_inherited_state(&mut self) {
        let keys: Vec<ElementKey> = self.elements.keys().collect();
        for key in keys {
            let resolution = match self.element_parent(key) {
                Some(parent) => self.render_resolution(parent),
                None => DEFAULT_TARGET_RESOLUTION,
            };
            let format = match self.element_parent(key) {
                Some(parent) => self.render_format(parent),
                None => DEFAULT_TARGET_FORMAT,
            };
            let camera = self
                .find_target_camera(key)
                .and_then(|k| self.cameras.get(k))
                .cloned();
            let priority = self.render_priority(key);
            let children: Vec<(Name, SharedLookupTable)> = self
                .child_elements(key)
                .iter()
                .filter_map(|c| self.elements.get(*c))
                .map(|c| (c.name(), Rc::clone(c.shared_lookup_table())))
                .collect();

            let element = &mut self.elements[key];
            element.set_inherited_target(resolution, format);
            element.set_target_camera(camera);
            element.set_render_priority(priority);
            element.relink_child_tables(&children);
        }
    }

    // ── Frame ───────────────────────────────────────────────────────────────

    /// Renders one frame of every actively running element, parents before
    /// children. Returns the number of elements rendered.
    pub fn render_frame(&mut self, camera_cut: bool) -> usize {
        self.refresh_inherited_state();

        let mut order: Vec<(i32, ElementKey)> = self
            .elements
            .iter()
            .filter(|(_, element)| element.is_actively_running())
            .map(|(key, element)| (element.render_priority(), key))
            .collect();
        order.sort_by_key(|(priority, _)| *priority);

        for (_, key) in &order {
            if let Some(element) = self.elements.get_mut(*key) {
                element.enqueue_rendering(camera_cut);
            }
        }
        order.len()
    }

    /// Runs the idle sweep on the shared pool and every private pool.
    /// Returns the number of destroyed targets.
    pub fn tick(&mut self) -> usize {
        let mut destroyed = self
            .context
            .live_shared_pool()
            .map_or(0, |pool| pool.borrow_mut().tick());

        for (_, element) in &self.elements {
            if !element.uses_shared_target_pool()
                && let Some(pool) = element.current_target_pool()
            {
                destroyed += pool.borrow_mut().tick();
            }
        }
        if destroyed > 0 {
            log::debug!("Idle sweep destroyed {destroyed} render targets");
        }
        destroyed
    }
}
