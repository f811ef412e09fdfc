//! Source text to a placed, callable top-level `Function` (spec.md
//! §6.1/§6.3): lex, parse, resolve scopes, build HIR, lower to LIR,
//! allocate registers, emit machine code, and link it onto a code
//! page — the whole pipeline `candor_par`/`candor_sem`/`candor_hir`/
//! `candor_lir`/`candor_codegen` exist to feed into.

use std::rc::Rc;

use candor_codegen::link::link;
use candor_codegen::page::{find_or_create_page, CodeChunk};
use candor_codegen::source_map::{build_frame, ChunkSourceMap, StackFrame};
use candor_gc::object::function::{FunctionView, SIZE as FUNCTION_SIZE};
use candor_gc::Word;
use candor_util::{Handler, SourceMap as FileTable};

use crate::error::{Result, RuntimeError};
use crate::isolate::Isolate;

/// One compiled top-level program: the page its code lives on (kept
/// alive as long as anything might still call into it), the callable
/// `Function` object the embedding API invokes, and the source-map
/// bookkeeping `Isolate::stack_trace`/`GetStackTrace` report against.
pub struct CompiledChunk {
    pub chunk: Rc<CodeChunk>,
    pub function: Word,
    pub frame: StackFrame,
    pub source_map: ChunkSourceMap,
}

/// Compiles `source` against `isolate`'s heap and code pages. Neither
/// calls nor registers the result — that's `Isolate::run`'s job, once
/// it has a `Value` to invoke.
pub fn compile(isolate: &mut Isolate, filename: &str, source: &str) -> Result<CompiledChunk> {
    let mut files = FileTable::new();
    let file_id = files.add_file(filename, source);
    let handler = Handler::new();

    let program = candor_par::parse_program(source, file_id, &handler);
    if handler.has_errors() || program.is_none() {
        return Err(compile_error(&handler, &files));
    }
    let program = program.expect("checked above");

    let scope = candor_sem::analyze(&program);
    let hir = candor_hir::build(&program, &scope);
    let mut lir = candor_lir::lower_function(&hir);
    let param_count = lir.param_count as u32;

    let page_size = isolate.page_size;
    let page = find_or_create_page(&mut isolate.pages, page_size, page_size)?;

    let linked = link(&mut lir, isolate.gc(), &isolate.stubs, &page)?;

    let function = unsafe {
        let ptr = isolate.alloc(FUNCTION_SIZE)?;
        FunctionView::init(ptr, Word::NIL, linked.entry as u64, Word::NIL, param_count);
        Word::from_ptr(ptr)
    };

    let chunk = Rc::new(CodeChunk::new(
        filename.to_string(),
        Rc::from(source),
        linked.entry,
        linked.size,
        page,
    ));

    let frame = build_frame(filename, &files, program.body.span);

    Ok(CompiledChunk { chunk, function, frame, source_map: linked.source_map })
}

impl<'a> crate::handle::HandleScope<'a> {
    /// Compiles `source`, registers the resulting chunk on the scope's
    /// isolate (so `Isolate::stack_trace` can report it), and returns
    /// the callable top-level function as a handle (spec.md §6.3's
    /// "compile, then call" CLI flow).
    pub fn compile(&mut self, filename: &str, source: &str) -> Result<crate::value::Value> {
        let chunk = compile(self.isolate(), filename, source)?;
        let function = chunk.function;
        self.isolate().chunks.push(chunk);
        Ok(self.local(function))
    }
}

fn compile_error(handler: &Handler, files: &FileTable) -> RuntimeError {
    let messages = handler
        .diagnostics()
        .iter()
        .map(|d| match files.format_span(d.span) {
            Some(location) => format!("{location}\n{}: {}", d.level, d.message),
            None => format!("{}: {}", d.level, d.message),
        })
        .collect();
    RuntimeError::Compile { messages }
}
