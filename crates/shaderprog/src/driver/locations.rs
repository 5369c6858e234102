//! Maps driver-native uniform locations onto the crate's `UniformLocation`
//! keys for backends whose native locations are opaque.
use std::collections::HashMap;

use super::{ProgramHandle, UniformLocation};

/// One key per (program, name) for as long as the program stays linked, so
/// repeated reflection passes reuse keys instead of minting new ones.
#[derive(Debug)]
#[cfg_attr(not(feature = "glow"), allow(dead_code))]
pub(crate) struct LocationTable<L> {
    native: HashMap<UniformLocation, (ProgramHandle, L)>,
    by_name: HashMap<(ProgramHandle, String), UniformLocation>,
    next: u32,
}

impl<L> Default for LocationTable<L> {
    fn default() -> Self {
        Self {
            native: HashMap::new(),
            by_name: HashMap::new(),
            next: 0,
        }
    }
}

#[cfg_attr(not(feature = "glow"), allow(dead_code))]
impl<L> LocationTable<L> {
    /// Key for `name` in `program`; `query` runs only on the first request.
    pub(crate) fn resolve(
        &mut self,
        program: ProgramHandle,
        name: &str,
        query: impl FnOnce() -> Option<L>,
    ) -> Option<UniformLocation> {
        let lookup = (program, name.to_string());
        if let Some(&key) = self.by_name.get(&lookup) {
            return Some(key);
        }
        let native = query()?;
        let key = UniformLocation(self.next);
        self.next = self.next.wrapping_add(1);
        self.native.insert(key, (program, native));
        self.by_name.insert(lookup, key);
        Some(key)
    }

    pub(crate) fn native(&self, key: UniformLocation) -> Option<&L> {
        self.native.get(&key).map(|(_, native)| native)
    }

    /// Drops every key of `program`; called on relink and delete.
    pub(crate) fn forget(&mut self, program: ProgramHandle) {
        self.native.retain(|_, (owner, _)| *owner != program);
        self.by_name.retain(|(owner, _), _| *owner != program);
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.native.len()
    }
}
