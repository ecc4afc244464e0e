//! Export/import symbol table.
//!
//! Natively registered functions and objects, and whatever loaded scripts export, live in
//! one name → value table. Every entry remembers which script instance contributed it so
//! that unloading an instance retracts all of its exports at once.

use std::collections::BTreeMap;
use std::fmt;

use super::value::Value;
use crate::errors::SymbolError;

/// Marker between a symbol name and its disambiguation suffix, as in `Character::Say^3`.
pub const MANGLE_MARKER: char = '^';

/// Identifies a loaded script instance that owns exports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(pub u32);

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "instance{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScriptImport {
    pub name: String,
    pub value: Value,
    /// `None` for native exports, which no script unload can retract.
    pub owner: Option<InstanceId>,
}

pub struct SymbolTable {
    entries: Vec<Option<ScriptImport>>,
    by_name: BTreeMap<String, usize>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            by_name: BTreeMap::new(),
        }
    }

    /// Registers `name` and returns its index.
    ///
    /// A native registration replaces an existing entry of the same name. A script export
    /// never shadows one.
    pub fn add(
        &mut self,
        name: &str,
        value: Value,
        owner: Option<InstanceId>,
    ) -> Result<usize, SymbolError> {
        if name.is_empty() {
            return Err(SymbolError::EmptyName);
        }
        if let Some(&index) = self.by_name.get(name) {
            if owner.is_some() {
                log::debug!("symbols: {name} already exported, ignoring export from {owner:?}");
                return Err(SymbolError::AlreadyExported(name.to_string()));
            }
            self.entries[index] = Some(ScriptImport {
                name: name.to_string(),
                value,
                owner,
            });
            return Ok(index);
        }

        let entry = Some(ScriptImport {
            name: name.to_string(),
            value,
            owner,
        });
        let index = match self.entries.iter().position(Option::is_none) {
            Some(free) => {
                self.entries[free] = entry;
                free
            }
            None => {
                self.entries.push(entry);
                self.entries.len() - 1
            }
        };
        self.by_name.insert(name.to_string(), index);
        Ok(index)
    }

    pub fn remove(&mut self, name: &str) -> bool {
        match self.by_name.remove(name) {
            Some(index) => {
                self.entries[index] = None;
                true
            }
            None => false,
        }
    }

    /// Index of `name`.
    ///
    /// Tries the exact name, then any mangled variant `name^...`, then, if the name itself
    /// carries a short numeric `^N` suffix, the name without it.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        if let Some(&index) = self.by_name.get(name) {
            return Some(index);
        }

        let mangled = format!("{name}{MANGLE_MARKER}");
        if let Some((key, &index)) = self.by_name.range(mangled.clone()..).next() {
            if key.starts_with(&mangled) {
                return Some(index);
            }
        }

        let marker = name.rfind(MANGLE_MARKER)?;
        let suffix = &name[marker + MANGLE_MARKER.len_utf8()..];
        if marker > 0
            && (1..=2).contains(&suffix.len())
            && suffix.bytes().all(|b| b.is_ascii_digit())
        {
            return self.index_of(&name[..marker]);
        }
        None
    }

    pub fn get_by_name(&self, name: &str) -> Option<&ScriptImport> {
        self.index_of(name).and_then(|index| self.get(index))
    }

    pub fn get(&self, index: usize) -> Option<&ScriptImport> {
        self.entries.get(index)?.as_ref()
    }

    /// Name of the first entry bound to exactly `value`.
    pub fn find_name(&self, value: &Value) -> Option<&str> {
        self.entries
            .iter()
            .flatten()
            .find(|entry| entry.value == *value)
            .map(|entry| entry.name.as_str())
    }

    /// Retracts every export contributed by `owner`. Returns how many were removed.
    pub fn remove_exports_of(&mut self, owner: InstanceId) -> usize {
        let mut removed = 0;
        for entry in self.entries.iter_mut() {
            let owned = entry.as_ref().is_some_and(|e| e.owner == Some(owner));
            if !owned {
                continue;
            }
            if let Some(old) = entry.take() {
                self.by_name.remove(&old.name);
                removed += 1;
            }
        }
        log::debug!("symbols: removed {removed} exports of {owner}");
        removed
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.by_name.clear();
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &ScriptImport)> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(index, entry)| entry.as_ref().map(|e| (index, e)))
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}
