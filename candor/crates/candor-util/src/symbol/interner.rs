//! Global string interner backing [`Symbol`].
//!
//! Strings are hashed into an [`FxHashMap`] guarded by a [`parking_lot::RwLock`]:
//! readers (the common case, since every keyword is pre-interned at startup)
//! take a shared lock, and only a genuine miss takes the exclusive lock to
//! insert. Interned strings are leaked to obtain `'static` references, which
//! is safe because the table lives for the process and never evicts.

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::LazyLock;

use super::{InternerStats, Symbol, RESERVED_SYMBOLS_END};

/// Global string table, populated with Candor's keywords and default
/// globals on first access.
pub static STRING_TABLE: LazyLock<StringTable> = LazyLock::new(|| {
    let table = StringTable::new();
    table.initialize_known_symbols();
    table
});

/// Thread-safe, append-only string interner.
pub struct StringTable {
    /// string -> index
    by_str: RwLock<FxHashMap<&'static str, u32>>,
    /// index -> string, for `Symbol::as_str`
    by_index: RwLock<Vec<&'static str>>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl StringTable {
    fn new() -> Self {
        Self {
            by_str: RwLock::new(FxHashMap::default()),
            by_index: RwLock::new(Vec::with_capacity(RESERVED_SYMBOLS_END as usize)),
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
        }
    }

    /// Pre-intern every keyword and default global so their [`Symbol`]
    /// indices are stable and known at compile time. Must run exactly once.
    fn initialize_known_symbols(&self) {
        for &s in super::KNOWN_SYMBOLS {
            self.intern(s);
        }
        debug_assert!(
            (self.by_index.read().len() as u32) <= RESERVED_SYMBOLS_END,
            "known symbol table grew past RESERVED_SYMBOLS_END; bump the reservation"
        );
    }

    /// Intern `string`, returning its (possibly freshly allocated) symbol.
    pub fn intern(&self, string: &str) -> Symbol {
        if let Some(&index) = self.by_str.read().get(string) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Symbol { index };
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let mut by_str = self.by_str.write();
        // Another writer may have inserted the same string while we waited.
        if let Some(&index) = by_str.get(string) {
            return Symbol { index };
        }
        let leaked: &'static str = Box::leak(string.to_string().into_boxed_str());
        let mut by_index = self.by_index.write();
        let index = by_index.len() as u32;
        by_index.push(leaked);
        by_str.insert(leaked, index);
        Symbol { index }
    }

    /// Look up the string behind a symbol. `None` only for a `Symbol`
    /// constructed out of band with an index this table never issued.
    pub fn get(&self, symbol: Symbol) -> Option<&'static str> {
        self.by_index.read().get(symbol.index as usize).copied()
    }

    pub fn stats(&self) -> InternerStats {
        let count = self.by_index.read().len();
        InternerStats {
            count,
            capacity: self.by_str.read().capacity(),
            collisions: 0,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    #[cfg(test)]
    pub(crate) fn reset_stats(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_intern_same_string() {
        let s1 = STRING_TABLE.intern("hello");
        let s2 = STRING_TABLE.intern("hello");
        assert_eq!(s1, s2);
    }

    #[test]
    fn test_intern_different_strings() {
        let s1 = STRING_TABLE.intern("hello");
        let s2 = STRING_TABLE.intern("world");
        assert_ne!(s1, s2);
    }

    #[test]
    fn test_get_string() {
        let symbol = STRING_TABLE.intern("test_string");
        let string = STRING_TABLE.get(symbol);
        assert_eq!(string, Some("test_string"));
    }

    #[test]
    fn test_concurrent_intern() {
        let handles: Vec<_> = (0..20)
            .map(|i| thread::spawn(move || (i, STRING_TABLE.intern(&format!("thread_{i}")))))
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let symbols: Vec<_> = results.iter().map(|(_, s)| *s).collect();
        for i in 0..symbols.len() {
            for j in (i + 1)..symbols.len() {
                assert_ne!(symbols[i], symbols[j]);
            }
        }
    }

    #[test]
    fn test_concurrent_same_string() {
        let handles: Vec<_> = (0..10)
            .map(|_| thread::spawn(|| STRING_TABLE.intern("concurrent_same")))
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for symbol in &results[1..] {
            assert_eq!(results[0], *symbol);
        }
    }

    #[test]
    fn test_stats_tracking() {
        STRING_TABLE.reset_stats();

        let _ = STRING_TABLE.intern("new_unique_string_12345");
        let stats = STRING_TABLE.stats();
        assert!(stats.misses >= 1);

        let _ = STRING_TABLE.intern("new_unique_string_12345");
        let stats = STRING_TABLE.stats();
        assert!(stats.hits >= 1);
    }

    #[test]
    fn test_stats_struct() {
        let stats = STRING_TABLE.stats();
        assert!(stats.count > 0); // keywords are pre-interned
        assert!(stats.load_factor() >= 0.0);
        assert!(stats.load_factor() <= 1.0);
    }

    #[test]
    fn test_empty_string() {
        let s = STRING_TABLE.intern("");
        assert_eq!(STRING_TABLE.get(s), Some(""));
    }

    #[test]
    fn test_unicode_strings() {
        let test_cases = ["你好", "世界", "🦀", "こんにちは", "Привет"];
        for test in &test_cases {
            let sym = STRING_TABLE.intern(test);
            assert_eq!(STRING_TABLE.get(sym), Some(*test));
        }
    }

    #[test]
    fn test_long_strings() {
        let long_string = "a".repeat(10000);
        let sym = STRING_TABLE.intern(&long_string);
        assert_eq!(STRING_TABLE.get(sym), Some(long_string.as_str()));
    }

    #[test]
    fn test_thread_safety_stress() {
        const THREADS: usize = 50;
        const ITERATIONS: usize = 100;

        let handles: Vec<_> = (0..THREADS)
            .map(|t| {
                thread::spawn(move || {
                    (0..ITERATIONS)
                        .map(|i| STRING_TABLE.intern(&format!("stress_{t}_{i}")))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for symbols in &results {
            for i in 0..symbols.len() {
                for j in (i + 1)..symbols.len() {
                    assert_ne!(symbols[i], symbols[j]);
                }
            }
        }
    }

    #[test]
    fn test_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<StringTable>();
    }
}
