//! Pass Result Lookup Table
//!
//! A per-element registry mapping pass names to the texture each pass
//! produced this frame, with the usage tags it was produced under.
//!
//! # Name resolution
//!
//! | Query            | Resolution                                                 |
//! |------------------|------------------------------------------------------------|
//! | `"Beauty"`       | local entry                                                |
//! | `"PrePass"`, `"Self"`, `"Previous"` | the most recently produced result        |
//! | `"Child"`        | the linked child table's most recent result                |
//! | `"Child.Beauty"` | `"Beauty"` inside the linked child table (recursively)     |
//!
//! Linked tables are non-owning back-references, rebuilt every frame from
//! the live element hierarchy.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::target::texture::Texture;
use crate::target::usage::TargetUsage;
use crate::utils::Name;

/// Reserved names that always resolve to the most recent result.
pub const PREPASS_ALIASES: [&str; 3] = ["PrePass", "Self", "Previous"];

/// Default canonical name the most recent result is stored under.
pub const DEFAULT_PREPASS_NAME: &str = "PrePass";

pub type SharedLookupTable = Rc<RefCell<TextureLookupTable>>;
pub type WeakLookupTable = Weak<RefCell<TextureLookupTable>>;

/// One registered result.
#[derive(Clone, Debug, Default)]
pub struct LookupEntry {
    /// `None` for a pass that ran but produced nothing (or whose texture was
    /// reclaimed).
    pub texture: Option<Texture>,
    pub usage: TargetUsage,
}

/// Named pass-result registry with nested child lookup.
pub struct TextureLookupTable {
    entries: FxHashMap<Name, LookupEntry>,
    linked: SmallVec<[(Name, WeakLookupTable); 4]>,
    prepass_name: Name,
}

impl Default for TextureLookupTable {
    fn default() -> Self {
        Self::new()
    }
}

impl TextureLookupTable {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: FxHashMap::default(),
            linked: SmallVec::new(),
            prepass_name: Name::new(DEFAULT_PREPASS_NAME),
        }
    }

    #[must_use]
    pub fn new_shared() -> SharedLookupTable {
        Rc::new(RefCell::new(Self::new()))
    }

    /// Canonical name the most recent result is registered under.
    #[must_use]
    pub fn prepass_name(&self) -> Name {
        self.prepass_name
    }

    /// Changes the canonical prepass name, moving the current entry along.
    pub fn set_prepass_name(&mut self, name: impl Into<Name>) {
        let name = name.into();
        if let Some(entry) = self.entries.remove(&self.prepass_name) {
            self.entries.insert(name, entry);
        }
        self.prepass_name = name;
    }

    #[must_use]
    pub fn is_prepass_name(&self, name: Name) -> bool {
        name == self.prepass_name || PREPASS_ALIASES.contains(&name.as_str())
    }

    /// Maps every prepass alias onto the canonical prepass name.
    fn resolve_key(&self, name: Name) -> Name {
        if self.is_prepass_name(name) {
            self.prepass_name
        } else {
            name
        }
    }

    // ── Registration ────────────────────────────────────────────────────────

    /// Registers `texture` under `name`.
    ///
    /// Re-registering the same texture only accumulates tags; a different
    /// texture replaces the entry wholesale.
    pub fn register_pass_result(
        &mut self,
        name: impl Into<Name>,
        texture: Option<Texture>,
        usage: TargetUsage,
    ) {
        let name = self.resolve_key(name.into());
        match self.entries.get_mut(&name) {
            Some(entry) if entry.texture == texture => entry.usage |= usage,
            _ => {
                self.entries.insert(name, LookupEntry { texture, usage });
            }
        }
    }

    /// Registers `texture` as the most recent result under the prepass name.
    pub fn set_most_recent_result(&mut self, texture: Texture) {
        self.register_pass_result(self.prepass_name, Some(texture), TargetUsage::empty());
    }

    // ── Lookup ──────────────────────────────────────────────────────────────

    /// Finds a named result.
    ///
    /// Returns `None` if no such result exists, `Some(None)` if the name is
    /// known (or is a prepass alias) but currently holds no texture.
    #[must_use]
    pub fn find_named_pass_result(
        &self,
        name: impl Into<Name>,
        search_linked_tables: bool,
    ) -> Option<Option<Texture>> {
        let key = self.resolve_key(name.into());
        let is_prepass = key == self.prepass_name;

        if let Some(entry) = self.entries.get(&key) {
            return Some(entry.texture.clone());
        }

        if search_linked_tables && !is_prepass {
            if let Some(found) = self.find_in_linked(key) {
                return Some(found);
            }
        }

        is_prepass.then_some(None)
    }

    /// Convenience lookup collapsing "absent" and "empty".
    #[must_use]
    pub fn find_texture(&self, name: impl Into<Name>) -> Option<Texture> {
        self.find_named_pass_result(name, true).flatten()
    }

    fn find_in_linked(&self, key: Name) -> Option<Option<Texture>> {
        if let Some(child) = self.linked_table(key) {
            let child = child.try_borrow().ok()?;
            return child.find_named_pass_result(child.prepass_name, true);
        }

        let (head, rest) = key.split_path()?;
        let child = self.linked_table(Name::new(head))?;
        let child = child.try_borrow().ok()?;
        child.find_named_pass_result(rest, true)
    }

    fn linked_table(&self, name: Name) -> Option<SharedLookupTable> {
        self.linked
            .iter()
            .find(|(linked_name, _)| *linked_name == name)
            .and_then(|(_, table)| table.upgrade())
    }

    /// Usage tags of a local entry; empty if absent.
    #[must_use]
    pub fn find_usage_tags(&self, name: impl Into<Name>) -> TargetUsage {
        self.entries
            .get(&self.resolve_key(name.into()))
            .map_or(TargetUsage::empty(), |e| e.usage)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Name, &LookupEntry)> {
        self.entries.iter().map(|(name, entry)| (*name, entry))
    }

    // ── Invalidation ────────────────────────────────────────────────────────

    /// Wipes every entry, or with a non-empty `keep` mask only the entries
    /// whose tags do not intersect it.
    pub fn empty(&mut self, keep: TargetUsage) {
        if keep.is_empty() {
            self.entries.clear();
        } else {
            self.entries.retain(|_, entry| entry.usage.intersects(keep));
        }
    }

    /// Drops the texture of every entry tagged with `tags`, optionally
    /// removing the entries outright.
    pub fn clear_tagged_entries(&mut self, tags: TargetUsage, remove: bool) {
        if remove {
            self.entries.retain(|_, entry| !entry.usage.intersects(tags));
        } else {
            for entry in self.entries.values_mut() {
                if entry.usage.intersects(tags) {
                    entry.texture = None;
                }
            }
        }
    }

    /// Strips `tags` from every entry holding `texture`.
    pub fn remove_usage_tags(&mut self, texture: &Texture, tags: TargetUsage) {
        for entry in self.entries.values_mut() {
            if entry.texture.as_ref() == Some(texture) {
                entry.usage.remove(tags);
            }
        }
    }

    /// Drops the texture of every entry, keeping names and tags.
    pub fn clear_textures(&mut self) {
        for entry in self.entries.values_mut() {
            entry.texture = None;
        }
    }

    /// Removes every entry holding `texture`, whatever its name.
    pub fn remove(&mut self, texture: &Texture) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| entry.texture.as_ref() != Some(texture));
        before - self.entries.len()
    }

    // ── Linked tables ───────────────────────────────────────────────────────

    /// Links a child element's table under `name` for nested lookups.
    pub fn link_nested_search_table(&mut self, name: impl Into<Name>, table: &SharedLookupTable) {
        let name = name.into();
        let weak = Rc::downgrade(table);
        match self.linked.iter_mut().find(|(linked, _)| *linked == name) {
            Some(slot) => slot.1 = weak,
            None => self.linked.push((name, weak)),
        }
    }

    pub fn clear_linked_search_tables(&mut self) {
        self.linked.clear();
    }

    /// Names under which child tables are linked, in link order.
    #[must_use]
    pub fn linked_table_names(&self) -> Vec<Name> {
        self.linked.iter().map(|(name, _)| *name).collect()
    }
}

/// Read-only lookup handed to transform passes.
#[derive(Clone, Copy)]
pub struct PassResultLookup<'a> {
    table: &'a TextureLookupTable,
}

impl<'a> PassResultLookup<'a> {
    #[must_use]
    pub fn new(table: &'a TextureLookupTable) -> Self {
        Self { table }
    }

    /// See [`TextureLookupTable::find_named_pass_result`].
    #[must_use]
    pub fn find_named_pass_result(&self, name: impl Into<Name>) -> Option<Option<Texture>> {
        self.table.find_named_pass_result(name, true)
    }

    #[must_use]
    pub fn find_texture(&self, name: impl Into<Name>) -> Option<Texture> {
        self.table.find_texture(name)
    }
}
