//! The process-scoped state of one compilation run.
//!
//! All mutable compiler state; the type interning cache, the symbol arena,
//! the module list, the diagnostic sink, the deferred semantic queue; lives
//! in one [`CompilationContext`] that is created at the start of a run and
//! dropped at the end, and is passed by reference into every component.
//! Nothing is ambient: two runs in one process (the tests do this
//! constantly) are fully isolated.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::rc::Rc;

use crate::{StringId, StringTable};

use super::ast;
use super::diagnostics::Diagnostics;
use super::semantics::version::VersionConditions;
use super::semantics::SemanticError;
use super::sym::{ModuleId, ModuleScope, Symbol, SymbolId, SymbolKind, Symbols, TemplateArgKey};
use super::target::TargetConfig;
use super::types::{TypeId, TypeShape, TypeTable};
use super::{CompilerError, SourceMap, Span};

/// Array bounds checking level: 0 disables all checks, 1 checks safe code,
/// 2 checks trusted/unsafe-marked code as well.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BoundsCheck {
    Off,
    Safe,
    All,
}

/// Template emission policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmitTemplates {
    Normal,
    All,
    Private,
    None,
    Auto,
}

/// Everything the driver parsed off the command line that the core's
/// behavior depends on.
#[derive(Clone, Debug)]
pub struct Params {
    pub input_files: Vec<PathBuf>,
    /// `--only`: emit code only for this file; other inputs are loaded just
    /// to satisfy imports.
    pub only_file: Option<PathBuf>,
    pub import_paths: Vec<PathBuf>,
    pub use_asserts: bool,
    pub use_contracts: bool,
    pub bounds_check: BoundsCheck,
    pub emit_templates: EmitTemplates,
    pub version_idents: Vec<String>,
    pub version_level: u32,
    pub deps_file: Option<PathBuf>,
    pub target: TargetConfig,
    pub verbose: bool,
}

impl Default for Params {
    fn default() -> Params {
        Params {
            input_files: vec![],
            only_file: None,
            import_paths: vec![],
            use_asserts: true,
            use_contracts: true,
            bounds_check: BoundsCheck::Safe,
            emit_templates: EmitTemplates::Auto,
            version_idents: vec![],
            version_level: 0,
            deps_file: None,
            target: TargetConfig::default_host(),
            verbose: false,
        }
    }
}

/// Errors that abort the compilation run immediately, with no partial
/// output.  Everything else goes through the diagnostic sink and analysis
/// continues.
#[derive(Clone, Debug, PartialEq)]
pub enum FatalError {
    MissingInput,
    InvalidFileName(String),
    Unreadable(PathBuf, String),
    CannotWrite(PathBuf, String),
    UnresolvedImport(String),
    OnlyArgMismatch(PathBuf),
    BadTarget(String),
}

impl std::fmt::Display for FatalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FatalError::MissingInput => f.write_str("no input files"),
            FatalError::InvalidFileName(name) => {
                f.write_fmt(format_args!("invalid file name '{}'", name))
            }
            FatalError::Unreadable(path, reason) => f.write_fmt(format_args!(
                "cannot read file {}: {}",
                path.display(),
                reason
            )),
            FatalError::CannotWrite(path, reason) => f.write_fmt(format_args!(
                "cannot write file {}: {}",
                path.display(),
                reason
            )),
            FatalError::UnresolvedImport(name) => {
                f.write_fmt(format_args!("cannot find module {} on the module path", name))
            }
            FatalError::OnlyArgMismatch(path) => f.write_fmt(format_args!(
                "--only argument {} is different from first input file name",
                path.display()
            )),
            FatalError::BadTarget(msg) => f.write_str(msg),
        }
    }
}

/// One compilation unit and its bookkeeping.
#[derive(Debug)]
pub struct ModuleUnit {
    /// Fully qualified module name.
    pub name: Vec<StringId>,
    pub file: PathBuf,
    /// The module's symbol (kind `Module`).
    pub sym: SymbolId,
    /// The parsed source; absent until the file has been parsed.
    pub ast: Option<Rc<ast::SourceModule>>,
    /// True when named on the command line (as opposed to loaded to satisfy
    /// an import).
    pub is_input: bool,
    /// Guard so each module's import list is walked once.
    pub imports_resolved: bool,
}

/// Work postponed during passes 1–2 and drained to a fixpoint afterwards.
#[derive(Clone, Debug, PartialEq)]
pub enum DeferredItem {
    /// Run pass 1 on a symbol whose resolution had to be postponed.
    Pass1(SymbolId),
    /// A template instantiation requested while the originating template
    /// was still mid-resolution.
    Instantiate {
        template: SymbolId,
        args: Vec<TemplateArgKey>,
        site_module: ModuleId,
        site_span: Span,
    },
}

pub struct CompilationContext {
    pub strings: StringTable,
    pub source_map: SourceMap,
    pub diagnostics: Diagnostics,
    pub types: TypeTable,
    pub symbols: Symbols,
    pub modules: Vec<ModuleUnit>,
    /// Module symbol for each [`ModuleId`], parallel to `modules`.
    pub module_syms: Vec<SymbolId>,
    pub deferred: VecDeque<DeferredItem>,
    pub versions: VersionConditions,
    pub params: Params,
    /// Recorded import edges, one line each, written verbatim to the
    /// `--deps` file at end of run.
    pub deps_lines: Vec<String>,
    /// The module whose code is emitted in `--only` mode.
    pub output_module: Option<ModuleId>,
    /// Serial source for private asm labels, unique across the run.
    pub asm_label_serial: u32,
    /// Which global semantic pass the pipeline is currently running (1–3).
    /// Template instances created mid-run are caught up to this pass.
    pub current_pass: u8,
}

impl CompilationContext {
    pub fn new(params: Params) -> CompilationContext {
        let mut versions = VersionConditions::predefined(&params.target);
        for ident in &params.version_idents {
            versions.add_ident(ident);
        }
        versions.set_level(params.version_level);

        CompilationContext {
            strings: StringTable::new(),
            source_map: SourceMap::new(),
            diagnostics: Diagnostics::new(),
            types: TypeTable::new(params.target.clone()),
            symbols: Symbols::new(),
            modules: vec![],
            module_syms: vec![],
            deferred: VecDeque::new(),
            versions,
            params,
            deps_lines: vec![],
            output_module: None,
            asm_label_serial: 0,
            current_pass: 1,
        }
    }

    /// Report a recoverable semantic error and keep going.
    pub fn error(&self, span: Span, err: SemanticError) {
        self.diagnostics.report(
            CompilerError::new(span, err),
            &self.source_map,
            &self.strings,
        );
    }

    pub fn intern(&self, s: &str) -> StringId {
        self.strings.insert(s.into())
    }

    /// Registers a new module and its module symbol.  The module's AST is
    /// attached later, once the file has been parsed.
    pub fn add_module(&mut self, name: Vec<StringId>, file: PathBuf, is_input: bool) -> ModuleId {
        let id = ModuleId(self.modules.len() as u32);
        let leaf = *name.last().expect("module name cannot be empty");
        let sym = self.symbols.alloc(Symbol::new(
            leaf,
            Span::zero(),
            None,
            id,
            SymbolKind::Module(ModuleScope::default()),
        ));
        self.modules.push(ModuleUnit {
            name,
            file,
            sym,
            ast: None,
            is_input,
            imports_resolved: false,
        });
        self.module_syms.push(sym);
        id
    }

    /// Finds an already-loaded module by fully qualified name.
    pub fn find_module(&self, name: &[StringId]) -> Option<ModuleId> {
        self.modules
            .iter()
            .position(|m| m.name == name)
            .map(|i| ModuleId(i as u32))
    }

    /// Resolves a module name to a file on the module lookup path: the
    /// command line import paths in order, then the standard library path
    /// with its multilib suffix applied.
    pub fn locate_module_file(&self, name: &[StringId]) -> Option<PathBuf> {
        let mut rel = PathBuf::new();
        for (i, part) in name.iter().enumerate() {
            let s = self.strings.get(*part).ok()?;
            if i + 1 == name.len() {
                rel.push(format!("{}.sbl", s));
            } else {
                rel.push(s);
            }
        }

        for dir in &self.params.import_paths {
            let candidate = dir.join(&rel);
            if candidate.is_file() {
                return Some(candidate);
            }
        }

        if let Some(stdlib) = &self.params.target.stdlib_dir {
            let mut dir = PathBuf::from(stdlib);
            if let Some(suffix) = &self.params.target.multilib_suffix {
                dir.push(suffix);
            }
            let candidate = dir.join(&rel);
            if candidate.is_file() {
                return Some(candidate);
            }
        }

        None
    }

    /// Renders a type for diagnostics.
    pub fn type_name(&self, ty: TypeId) -> String {
        match self.types.shape(ty) {
            TypeShape::Basic(kind) => kind.name().into(),
            TypeShape::Pointer(t) => format!("*{}", self.type_name(t)),
            TypeShape::SArray(t, dim) => format!("[{}; {}]", self.type_name(t), dim),
            TypeShape::DArray(t) => format!("[{}]", self.type_name(t)),
            TypeShape::AArray(k, v) => {
                format!("[{}: {}]", self.type_name(k), self.type_name(v))
            }
            TypeShape::Aggregate(sym) => self
                .strings
                .get(self.symbols.get(sym).name)
                .unwrap_or_else(|_| "<aggregate>".into()),
            TypeShape::Function(f) => {
                let params: Vec<_> = f.params.iter().map(|p| self.type_name(*p)).collect();
                format!("fn({}) -> {}", params.join(", "), self.type_name(f.ret))
            }
            TypeShape::Qualified(q, t) => {
                let qs = match q {
                    ast::Qualifier::Const => "const",
                    ast::Qualifier::Immutable => "immutable",
                    ast::Qualifier::Shared => "shared",
                };
                format!("{} {}", qs, self.type_name(t))
            }
            TypeShape::VaList => "va_list".into(),
            TypeShape::Error => "<error>".into(),
        }
    }

    /// The fully qualified name of a symbol, dotted.
    pub fn qualified_name(&self, sym: SymbolId) -> String {
        let mut parts = vec![];
        let s = self.symbols.get(sym);
        for part in &self.modules[s.module.index()].name {
            if let Ok(p) = self.strings.get(*part) {
                parts.push(p);
            }
        }
        if self.module_syms[s.module.index()] != sym {
            if let Ok(p) = self.strings.get(s.name) {
                parts.push(p);
            }
        }
        parts.join(".")
    }

    pub fn next_asm_label(&mut self) -> u32 {
        self.asm_label_serial += 1;
        self.asm_label_serial
    }

    /// Record one import edge for the module dependency file.
    pub fn record_dep(&mut self, from: ModuleId, to: ModuleId, public: bool) {
        let from_unit = &self.modules[from.index()];
        let to_unit = &self.modules[to.index()];
        let vis = if public { "public" } else { "private" };
        let line = format!(
            "{} ({}) : {} : {} ({})",
            self.module_display_name(from_unit),
            from_unit.file.display(),
            vis,
            self.module_display_name(to_unit),
            to_unit.file.display()
        );
        self.deps_lines.push(line);
    }

    fn module_display_name(&self, unit: &ModuleUnit) -> String {
        unit.name
            .iter()
            .filter_map(|p| self.strings.get(*p).ok())
            .collect::<Vec<_>>()
            .join(".")
    }
}
