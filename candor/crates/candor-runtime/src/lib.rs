//! The embedding API (spec.md §6.1): a host program links against
//! this crate to construct an `Isolate`, compile source text against
//! it, and exchange `Value`s with the compiled code through handles,
//! native callbacks, and `CData`.

pub mod callback;
pub mod cdata;
pub mod compile;
pub mod error;
pub mod handle;
pub mod isolate;
pub mod value;

pub use callback::NativeFunction;
pub use cdata::CWrapper;
pub use compile::CompiledChunk;
pub use error::{Result, RuntimeError};
pub use handle::HandleScope;
pub use isolate::Isolate;
pub use value::Value;
