//! Code objects that have been deoptimized but may still have frames on the stack
//!
//! A lazily deoptimized frame returns into its old optimized code, so that code must
//! stay findable by pc until the collector proves no frame refers to it. Entries are
//! evicted when the owner reports the code unreachable; handles carry a generation so
//! a handle to an evicted entry never resolves to the entry that reused its slot.

use super::code::CodeSpace;
use super::CodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeoptimizingCodeHandle {
    index: u32,
    generation: u32,
}

#[derive(Debug, Clone)]
struct Entry {
    code: Option<CodeId>,
    generation: u32,
}

#[derive(Debug, Clone, Default)]
pub struct DeoptimizingCodeRegistry {
    entries: Vec<Entry>,
    free: Vec<u32>,
    live: usize,
}

impl DeoptimizingCodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, code: CodeId) -> DeoptimizingCodeHandle {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let entry = &mut self.entries[index as usize];
            entry.code = Some(code);
            return DeoptimizingCodeHandle {
                index,
                generation: entry.generation,
            };
        }
        let index = self.entries.len() as u32;
        self.entries.push(Entry {
            code: Some(code),
            generation: 0,
        });
        DeoptimizingCodeHandle { index, generation: 0 }
    }

    pub fn get(&self, handle: DeoptimizingCodeHandle) -> Option<CodeId> {
        let entry = self.entries.get(handle.index as usize)?;
        if entry.generation != handle.generation {
            return None;
        }
        entry.code
    }

    /// Registered code containing `pc`
    pub fn find(&self, space: &CodeSpace, pc: usize) -> Option<CodeId> {
        self.entries
            .iter()
            .filter_map(|entry| entry.code)
            .find(|&code| space.get(code).contains(pc))
    }

    pub fn contains(&self, code: CodeId) -> bool {
        self.entries.iter().any(|entry| entry.code == Some(code))
    }

    /// Evict the entry behind `handle`.
    ///
    /// Returns false for stale handles.
    pub fn notify_unreachable(&mut self, handle: DeoptimizingCodeHandle) -> bool {
        let Some(entry) = self.entries.get_mut(handle.index as usize) else {
            return false;
        };
        if entry.generation != handle.generation || entry.code.is_none() {
            return false;
        }
        tracing::trace!(
            target: "bailout::deopt",
            code = ?entry.code,
            "evicting deoptimized code"
        );
        entry.code = None;
        entry.generation = entry.generation.wrapping_add(1);
        self.free.push(handle.index);
        self.live -= 1;
        true
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deopt::code::{Code, CodeKind};

    #[test]
    fn test_insert_find_and_evict() {
        let mut space = CodeSpace::new();
        let code = space.add(Code::new(CodeKind::OptimizedFunction, 40));
        let other = space.add(Code::new(CodeKind::OptimizedFunction, 40));
        let mut registry = DeoptimizingCodeRegistry::new();
        let handle = registry.insert(code);
        assert_eq!(registry.len(), 1);
        let pc = space.get(code).address(4);
        assert_eq!(registry.find(&space, pc), Some(code));
        assert_eq!(registry.find(&space, space.get(other).address(4)), None);

        assert!(registry.notify_unreachable(handle));
        assert!(registry.is_empty());
        assert_eq!(registry.find(&space, pc), None);
        assert!(!registry.notify_unreachable(handle));
    }

    #[test]
    fn test_stale_handle_does_not_resolve_reused_slot() {
        let mut registry = DeoptimizingCodeRegistry::new();
        let first = registry.insert(CodeId(1));
        registry.notify_unreachable(first);
        let second = registry.insert(CodeId(2));
        assert_eq!(registry.get(first), None);
        assert_eq!(registry.get(second), Some(CodeId(2)));
        assert!(!registry.notify_unreachable(first));
        assert_eq!(registry.len(), 1);
    }
}
