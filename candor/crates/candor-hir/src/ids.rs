//! Typed indices into a function's HIR arenas (spec.md §4.5).

use candor_util::define_idx;

define_idx!(BlockId);
define_idx!(ValueId);
/// Index into a function's `nested` table of independently-compiled
/// function literals sharing its code page.
define_idx!(FunctionId);
