//! Handle & reference registry (component C, spec.md §4.3).
//!
//! A handle is a `Word` cell owned by this registry, not by the
//! caller's native stack — its heap allocation keeps the same address
//! for its whole lifetime, which is what lets the collector treat its
//! address as a stable root slot across a copying cycle. Three tiers:
//! scoped locals (LIFO, destroyed on scope exit), persistent (strong,
//! outlive any scope), and weak (traced last, invoke a callback on
//! death and never keep their target alive).

use crate::value::Word;

pub type ScopeId = usize;

type WeakCallback = Box<dyn FnMut(Word)>;

pub struct HandleRegistry {
    scopes: Vec<Vec<Box<Word>>>,
    persistent: Vec<Box<Word>>,
    weak: Vec<(Box<Word>, Option<WeakCallback>)>,
}

fn addr_of(b: &Box<Word>) -> *mut Word {
    b.as_ref() as *const Word as *mut Word
}

impl HandleRegistry {
    pub fn new() -> HandleRegistry {
        HandleRegistry {
            scopes: Vec::new(),
            persistent: Vec::new(),
            weak: Vec::new(),
        }
    }

    /// Pushes a new scope frame; every handle created before the
    /// matching `close_scope` belongs to it.
    pub fn open_scope(&mut self) -> ScopeId {
        self.scopes.push(Vec::new());
        self.scopes.len() - 1
    }

    /// Pops a scope, dropping every local handle created within it.
    /// Scopes nest like a stack; closing anything but the innermost
    /// open scope is a usage error in the embedder.
    pub fn close_scope(&mut self, id: ScopeId) {
        debug_assert_eq!(id, self.scopes.len() - 1, "handle scopes must close LIFO");
        self.scopes.truncate(id);
    }

    /// Allocates a new local handle holding `value`, owned by `scope`.
    pub fn new_local(&mut self, scope: ScopeId, value: Word) -> *mut Word {
        let mut boxed = Box::new(value);
        let ptr: *mut Word = boxed.as_mut();
        self.scopes[scope].push(boxed);
        ptr
    }

    /// Promotes a local handle to persistent, unlinking it from its
    /// scope (spec.md §4.3's `Persist()`). The handle keeps the same
    /// address, so existing raw pointers to it remain valid.
    pub fn persist(&mut self, scope: ScopeId, local: *mut Word) -> *mut Word {
        if let Some(idx) = self.scopes[scope].iter().position(|b| addr_of(b) == local) {
            let boxed = self.scopes[scope].remove(idx);
            let ptr = addr_of(&boxed);
            self.persistent.push(boxed);
            ptr
        } else {
            local
        }
    }

    /// Demotes a persistent handle to weak, installing `callback` to
    /// run with the dead value if the target doesn't survive the next
    /// collection (spec.md §4.3's `Weaken()`).
    pub fn weaken(&mut self, persistent: *mut Word, callback: Option<WeakCallback>) -> *mut Word {
        if let Some(idx) = self.persistent.iter().position(|b| addr_of(b) == persistent) {
            let boxed = self.persistent.remove(idx);
            let ptr = addr_of(&boxed);
            self.weak.push((boxed, callback));
            ptr
        } else {
            persistent
        }
    }

    /// Every strong root slot: scoped locals plus persistents.
    pub fn strong_roots(&self) -> Vec<*mut Word> {
        let mut out = Vec::new();
        for frame in &self.scopes {
            out.extend(frame.iter().map(addr_of));
        }
        out.extend(self.persistent.iter().map(addr_of));
        out
    }

    pub fn weak_roots(&self) -> Vec<*mut Word> {
        self.weak.iter().map(|(b, _)| addr_of(b)).collect()
    }

    /// Called by the collector for each weak slot whose target did not
    /// survive: fires the callback (if any) and drops the cell.
    pub fn notify_weak_death(&mut self, slot: *mut Word, dead_value: Word) {
        if let Some(idx) = self.weak.iter().position(|(b, _)| addr_of(b) == slot) {
            let (_, cb) = self.weak.remove(idx);
            if let Some(mut cb) = cb {
                cb(dead_value);
            }
        }
    }
}

impl Default for HandleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_destroys_its_handles_on_close() {
        let mut reg = HandleRegistry::new();
        let s = reg.open_scope();
        reg.new_local(s, Word::smi(1));
        reg.new_local(s, Word::smi(2));
        assert_eq!(reg.strong_roots().len(), 2);
        reg.close_scope(s);
        assert_eq!(reg.strong_roots().len(), 0);
    }

    #[test]
    fn persist_survives_scope_close() {
        let mut reg = HandleRegistry::new();
        let s = reg.open_scope();
        let local = reg.new_local(s, Word::smi(7));
        let persisted = reg.persist(s, local);
        reg.close_scope(s);
        assert_eq!(reg.strong_roots(), vec![persisted]);
    }

    #[test]
    fn weaken_moves_handle_out_of_strong_roots() {
        let mut reg = HandleRegistry::new();
        let s = reg.open_scope();
        let local = reg.new_local(s, Word::smi(3));
        let persisted = reg.persist(s, local);
        let weak = reg.weaken(persisted, None);
        assert!(reg.strong_roots().is_empty());
        assert_eq!(reg.weak_roots(), vec![weak]);
    }

    #[test]
    fn weak_death_callback_fires_once() {
        use std::cell::RefCell;
        use std::rc::Rc;
        let mut reg = HandleRegistry::new();
        let s = reg.open_scope();
        let local = reg.new_local(s, Word::smi(9));
        let persisted = reg.persist(s, local);
        let seen = Rc::new(RefCell::new(None));
        let seen2 = seen.clone();
        let weak = reg.weaken(persisted, Some(Box::new(move |w| *seen2.borrow_mut() = Some(w))));
        reg.notify_weak_death(weak, Word::smi(9));
        assert_eq!(*seen.borrow(), Some(Word::smi(9)));
        assert!(reg.weak_roots().is_empty());
    }
}
