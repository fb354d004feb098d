//! The compilation driver: one run, end to end.
//!
//! Mirrors the pipeline contract exactly: read all inputs (overlapped),
//! parse, resolve the import closure, run passes 1–3 globally with the
//! deferred-queue drain after pass 1, write the module dependency file,
//! and only then; and only with a clean error counter; lower and
//! finalize backend units.  Output is all-or-nothing per run: a single
//! semantic error anywhere suppresses every object file, though all passes
//! still complete for diagnostic completeness.

use std::path::{Path, PathBuf};
use std::time::Instant;

use log::{debug, info};

use crate::compiler::backend::{BackendUnit, UnitSummary};
use crate::compiler::codegen;
use crate::compiler::context::{CompilationContext, FatalError, Params};
use crate::compiler::io::AsyncReader;
use crate::compiler::semantics::passes;
use crate::compiler::sym::ModuleId;

/// What one compilation run produced.
pub struct CompileOutcome {
    pub ctx: CompilationContext,
    pub summaries: Vec<UnitSummary>,
    /// Semantic errors plus backend-reported errors.
    pub error_count: u32,
    /// False whenever the error count is nonzero: no object output exists.
    pub emitted: bool,
}

/// Validates a file name the way the front end requires: the stem must be a
/// usable module identifier.
fn module_stem(path: &Path) -> Result<String, FatalError> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    if stem.is_empty() || stem == "." || stem == ".." {
        return Err(FatalError::InvalidFileName(path.display().to_string()));
    }
    Ok(stem.to_string())
}

/// Runs a whole compilation.  `Err` is reserved for the fatal classes
/// (missing/unreadable inputs, unresolved imports, `--only` mismatch);
/// recoverable errors land in the outcome's diagnostics with the error
/// count.
pub fn compile(params: Params) -> Result<CompileOutcome, FatalError> {
    if params.input_files.is_empty() {
        return Err(FatalError::MissingInput);
    }
    if let Some(only) = &params.only_file {
        if only != &params.input_files[0] {
            return Err(FatalError::OnlyArgMismatch(only.clone()));
        }
    }

    let mut ctx = CompilationContext::new(params);

    // One module per input file, named after the file until a module
    // header says otherwise.  The output module designation only matters in
    // --only mode.
    for (i, file) in ctx.params.input_files.clone().iter().enumerate() {
        let stem = module_stem(file)?;
        let name = vec![ctx.intern(&stem)];
        let id = ctx.add_module(name, file.clone(), true);
        if i == 0 && ctx.params.only_file.is_some() {
            ctx.output_module = Some(id);
        }
    }

    // Fire all reads up front; block per file at first use.
    let read_time = Instant::now();
    let mut reader = AsyncReader::new(ctx.params.input_files.clone());
    reader.start();
    for i in 0..reader.len() {
        let text = reader
            .wait(i)
            .map_err(|e| FatalError::Unreadable(reader.path(i).clone(), e))?;
        let module = ModuleId(i as u32);
        debug!("parse     {}", ctx.modules[module.index()].file.display());
        passes::parse_into_module(&mut ctx, module, text);

        // Adopt the declared module name, when the file carries a header.
        if let Some(declared) = ctx.modules[module.index()]
            .ast
            .as_ref()
            .and_then(|a| a.name.clone())
        {
            ctx.modules[module.index()].name = declared;
        }
        passes::declare_module_items(&mut ctx, module);
    }
    debug!("read+parse: {:.3}s", read_time.elapsed().as_secs_f32());

    // Load the import closure.  The module list grows as imports load, so
    // iterate by index.
    let mut i = 0;
    while i < ctx.modules.len() {
        debug!("importall {}", ctx.modules[i].file.display());
        passes::resolve_imports(&mut ctx, ModuleId(i as u32), true)?;
        i += 1;
    }

    // The three global passes, with the deferred drain after pass 1.
    let sem_time = Instant::now();
    for i in 0..ctx.modules.len() {
        debug!("semantic  {}", ctx.modules[i].file.display());
        passes::pass1_module(&mut ctx, ModuleId(i as u32));
    }
    passes::run_deferred(&mut ctx);
    for i in 0..ctx.modules.len() {
        debug!("semantic2 {}", ctx.modules[i].file.display());
        passes::pass2_module(&mut ctx, ModuleId(i as u32));
    }
    for i in 0..ctx.modules.len() {
        debug!("semantic3 {}", ctx.modules[i].file.display());
        passes::pass3_module(&mut ctx, ModuleId(i as u32));
    }
    debug!("semantic: {:.3}s", sem_time.elapsed().as_secs_f32());

    // The dependency file is written even when errors occurred; it records
    // the import edges verbatim from the in-memory buffer.
    if let Some(deps_file) = ctx.params.deps_file.clone() {
        let mut buffer = ctx.deps_lines.join("\n");
        if !buffer.is_empty() {
            buffer.push('\n');
        }
        std::fs::write(&deps_file, buffer)
            .map_err(|e| FatalError::CannotWrite(deps_file.clone(), format!("{}", e)))?;
    }

    // No partial object emission: any semantic error suppresses lowering
    // for the whole run.
    if ctx.diagnostics.has_errors() {
        let error_count = ctx.diagnostics.error_count();
        return Ok(CompileOutcome {
            ctx,
            summaries: vec![],
            error_count,
            emitted: false,
        });
    }

    let mut summaries = vec![];
    let mut backend_errors = 0;
    for i in 0..ctx.modules.len() {
        let module = ModuleId(i as u32);
        if !ctx.modules[i].is_input {
            continue;
        }
        if let Some(output) = ctx.output_module {
            if output != module {
                continue;
            }
        }
        let unit_name = unit_name(&ctx, module);
        info!("code      {}", unit_name);
        let mut unit = BackendUnit::new(&unit_name, ctx.types.target().ptr_size);
        codegen::lower_module(&ctx, &mut unit, module);
        backend_errors += unit.error_count();
        summaries.push(unit.finish());
    }

    let error_count = ctx.diagnostics.error_count() + backend_errors;
    let emitted = error_count == 0;
    Ok(CompileOutcome {
        ctx,
        summaries: if emitted { summaries } else { vec![] },
        error_count,
        emitted,
    })
}

fn unit_name(ctx: &CompilationContext, module: ModuleId) -> String {
    ctx.modules[module.index()]
        .name
        .iter()
        .filter_map(|p| ctx.strings.get(*p).ok())
        .collect::<Vec<_>>()
        .join(".")
}

/// Test helper: compiles in-memory sources as if they were the given files.
/// Mirrors `compile` without touching the filesystem; imports resolve only
/// among the given sources.
pub fn compile_strings(
    sources: &[(&str, &str)],
    params: Params,
) -> Result<CompileOutcome, FatalError> {
    let mut ctx = CompilationContext::new(params);

    for (name, _) in sources {
        let file = PathBuf::from(format!("{}.sbl", name));
        let name = vec![ctx.intern(name)];
        ctx.add_module(name, file, true);
    }
    for (i, (_, text)) in sources.iter().enumerate() {
        let module = ModuleId(i as u32);
        passes::parse_into_module(&mut ctx, module, (*text).into());
        if let Some(declared) = ctx.modules[module.index()]
            .ast
            .as_ref()
            .and_then(|a| a.name.clone())
        {
            ctx.modules[module.index()].name = declared;
        }
        passes::declare_module_items(&mut ctx, module);
    }
    let mut i = 0;
    while i < ctx.modules.len() {
        passes::resolve_imports(&mut ctx, ModuleId(i as u32), true)?;
        i += 1;
    }
    for i in 0..ctx.modules.len() {
        passes::pass1_module(&mut ctx, ModuleId(i as u32));
    }
    passes::run_deferred(&mut ctx);
    for i in 0..ctx.modules.len() {
        passes::pass2_module(&mut ctx, ModuleId(i as u32));
    }
    for i in 0..ctx.modules.len() {
        passes::pass3_module(&mut ctx, ModuleId(i as u32));
    }

    if ctx.diagnostics.has_errors() {
        let error_count = ctx.diagnostics.error_count();
        return Ok(CompileOutcome {
            ctx,
            summaries: vec![],
            error_count,
            emitted: false,
        });
    }

    let mut summaries = vec![];
    let mut backend_errors = 0;
    for i in 0..ctx.modules.len() {
        let module = ModuleId(i as u32);
        let unit_name = unit_name(&ctx, module);
        let mut unit = BackendUnit::new(&unit_name, ctx.types.target().ptr_size);
        codegen::lower_module(&ctx, &mut unit, module);
        backend_errors += unit.error_count();
        summaries.push(unit.finish());
    }

    let error_count = ctx.diagnostics.error_count() + backend_errors;
    let emitted = error_count == 0;
    Ok(CompileOutcome {
        ctx,
        summaries: if emitted { summaries } else { vec![] },
        error_count,
        emitted,
    })
}
