//! Typed views over heap object payloads (spec.md §3.2).
//!
//! Every function here is `unsafe` and takes a raw pointer into a heap
//! page; this is the narrow unsafe layer spec.md §9 calls for. Callers
//! above this module (the collector, the runtime stubs) never read a
//! tag byte or compute an offset themselves.

pub mod container;
pub mod context;
pub mod function;
pub mod header;
pub mod map;
pub mod scalar;
pub mod string;

pub use container::{ArrayView, ObjectView};
pub use context::ContextView;
pub use function::FunctionView;
pub use header::RawHeader;
pub use map::MapView;
pub use scalar::{BooleanView, CDataView, NumberView};
pub use string::{ConsStringView, FlatStringView};

use crate::value::Tag;

/// One outgoing reference discovered while tracing an object, paired
/// with whether the edge is strong (keeps its target alive) or weak
/// (followed for relocation only, per spec.md §4.2's per-tag table).
pub enum Edge {
    Strong(*mut crate::value::Word),
    Weak(*mut crate::value::Word),
}

/// Pushes every outgoing edge of the object at `ptr` (whose tag has
/// already been read) per spec.md §4.2's per-tag edge table. Returns
/// edges as raw slot pointers so the collector can relocate in place.
pub unsafe fn edges_of(ptr: *mut u8, tag: Tag, out: &mut Vec<Edge>) {
    match tag {
        Tag::Context => {
            out.push(Edge::Strong(ptr.add(16) as *mut crate::value::Word)); // parent
            let count = ContextView::slot_count(ptr);
            for i in 0..count {
                out.push(Edge::Strong(
                    (ptr.add(32) as *mut crate::value::Word).add(i as usize),
                ));
            }
        }
        Tag::Function => {
            if !FunctionView::is_binding(ptr) {
                out.push(Edge::Strong(ptr.add(16) as *mut crate::value::Word)); // parent context
            }
            out.push(Edge::Strong(ptr.add(32) as *mut crate::value::Word)); // root context
        }
        Tag::Object => {
            out.push(Edge::Weak(ptr.add(24) as *mut crate::value::Word)); // proto
            out.push(Edge::Strong(ptr.add(16) as *mut crate::value::Word)); // map
        }
        Tag::Array => {
            out.push(Edge::Weak(ptr.add(24) as *mut crate::value::Word)); // proto
            out.push(Edge::Strong(ptr.add(16) as *mut crate::value::Word)); // map
        }
        Tag::Map => {
            let cap = MapView::capacity(ptr);
            let base = ptr.add(map::SLOTS_OFFSET) as *mut crate::value::Word;
            for i in 0..cap {
                out.push(Edge::Strong(base.add(i as usize))); // key
                out.push(Edge::Strong(base.add((cap + i) as usize))); // value
            }
        }
        Tag::String => {
            if *ptr.add(1) == crate::value::StringRepr::Cons as u8 {
                out.push(Edge::Strong(ptr.add(header::HEADER_SIZE + 16) as *mut crate::value::Word));
                out.push(Edge::Strong(ptr.add(header::HEADER_SIZE + 24) as *mut crate::value::Word));
            }
        }
        Tag::Number | Tag::Boolean | Tag::CData | Tag::Nil => {}
    }
}
