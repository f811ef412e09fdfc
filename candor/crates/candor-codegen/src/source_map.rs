//! Translates a chunk's `(jit_offset, span)` pairs, recorded relative
//! to the start of emission, into absolute-address entries usable
//! once the chunk's final home on a code page is known (spec.md
//! §4.10, grounded on `original_source/code-space.cc`'s
//! `source_map()`/`GetStackTrace` path).

use candor_util::{SourceMap as FileTable, Span};

use crate::asm::SourceMapEntry as RelativeEntry;

#[derive(Debug, Clone)]
pub struct AbsoluteEntry {
    pub ip: usize,
    pub span: Span,
}

/// One chunk's absolute source map, kept sorted by `ip` ascending
/// (spec.md P8: jit offsets are recorded strictly increasing during
/// emission, so the translation to absolute addresses preserves
/// order — no separate sort is needed, only an assertion that it
/// holds).
#[derive(Debug, Default, Clone)]
pub struct ChunkSourceMap {
    entries: Vec<AbsoluteEntry>,
}

impl ChunkSourceMap {
    pub fn from_relative(base: usize, relative: &[RelativeEntry]) -> ChunkSourceMap {
        let mut entries = Vec::with_capacity(relative.len());
        let mut last_offset = None;
        for e in relative {
            if let Some(prev) = last_offset {
                debug_assert!(e.jit_offset > prev, "source map offsets must be strictly increasing");
            }
            last_offset = Some(e.jit_offset);
            entries.push(AbsoluteEntry { ip: base + e.jit_offset, span: e.span });
        }
        ChunkSourceMap { entries }
    }

    /// Combines every function placed on one chunk's page — a
    /// top-level program and however many nested closures it
    /// allocates — into the single map `lookup` walks. Each function's
    /// entries already live at non-overlapping addresses, so sorting
    /// by `ip` is all merging needs.
    pub fn merge(maps: Vec<ChunkSourceMap>) -> ChunkSourceMap {
        let mut entries: Vec<AbsoluteEntry> = maps.into_iter().flat_map(|m| m.entries).collect();
        entries.sort_by_key(|e| e.ip);
        ChunkSourceMap { entries }
    }

    /// Finds the entry for the largest recorded `ip` not exceeding
    /// `return_address` — the instruction the call that produced this
    /// return address was compiled from (spec.md §4.10:
    /// "`GetStackTrace` looks up the entry with the largest `ip` not
    /// exceeding a given return address").
    pub fn lookup(&self, return_address: usize) -> Option<&AbsoluteEntry> {
        match self.entries.binary_search_by(|e| e.ip.cmp(&return_address)) {
            Ok(idx) => Some(&self.entries[idx]),
            Err(0) => None,
            Err(idx) => Some(&self.entries[idx - 1]),
        }
    }
}

/// One stack-trace frame, shaped per spec.md's supplemented
/// `{filename, source, line, column}` tuple (the `source` field
/// beyond the base `(file, line, column)` triple is drawn from
/// `original_source/`'s richer `Error::PrintToStderr`, which always
/// captures the offending source line alongside its position).
#[derive(Debug, Clone)]
pub struct StackFrame {
    pub filename: String,
    pub source_line: String,
    pub line: u32,
    pub column: u32,
}

pub fn build_frame(filename: &str, files: &FileTable, span: Span) -> StackFrame {
    let file = files.get(span.file_id);
    let (line, column) = file.map(|f| f.offset_to_line_col(span.start)).unwrap_or((0, 0));
    let source_line = file.map(|f| f.line_at(line)).unwrap_or_default();
    StackFrame { filename: filename.to_string(), source_line, line, column }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candor_util::FileId;

    fn entry(offset: usize) -> RelativeEntry {
        RelativeEntry { jit_offset: offset, span: Span { start: 0, end: 0, line: 1, column: 1, file_id: FileId(0) } }
    }

    #[test]
    fn translates_offsets_against_the_chunk_base() {
        let relative = vec![entry(0), entry(10), entry(20)];
        let map = ChunkSourceMap::from_relative(0x1000, &relative);
        assert_eq!(map.lookup(0x1000).unwrap().ip, 0x1000);
        assert_eq!(map.lookup(0x1005).unwrap().ip, 0x1000);
        assert_eq!(map.lookup(0x1015).unwrap().ip, 0x100A);
    }

    #[test]
    fn address_before_the_first_entry_has_no_frame() {
        let relative = vec![entry(10)];
        let map = ChunkSourceMap::from_relative(0x1000, &relative);
        assert!(map.lookup(0x1005).is_none());
    }
}
