use std::path::PathBuf;

use clap::{App, Arg, ArgMatches};

use crate::compiler::context::{BoundsCheck, EmitTemplates, Params};
use crate::compiler::target::TargetConfig;

// Exit codes for the different failure classes.
pub const ERR_FATAL: i32 = 1;
pub const ERR_SEMANTIC: i32 = 2;
pub const ERR_BAD_ARGS: i32 = 3;

pub fn configure_cli() -> clap::App<'static, 'static> {
    App::new("Sable Compiler")
        .version("0.3.0")
        .about("Compiles Sable source files into backend IR for optimization and machine-code generation")
        .arg(
            Arg::with_name("input")
                .multiple(true)
                .required(true)
                .help("Source files to compile; the first file is the main module"),
        )
        .arg(
            Arg::with_name("only")
                .long("only")
                .takes_value(true)
                .help("Emit code only for this file; other inputs are loaded just to satisfy imports. Must name the first input file."),
        )
        .arg(
            Arg::with_name("import")
                .short("I")
                .long("import")
                .multiple(true)
                .number_of_values(1)
                .takes_value(true)
                .help("Directory to search for imported modules, before the standard library path"),
        )
        .arg(
            Arg::with_name("bounds-check")
                .long("bounds-check")
                .possible_values(&["0", "1", "2"])
                .takes_value(true)
                .help("Array bounds checking: 0 off, 1 safe code, 2 also trusted/unsafe-marked code"),
        )
        .arg(
            Arg::with_name("emit-templates")
                .long("emit-templates")
                .possible_values(&["normal", "all", "private", "none", "auto"])
                .takes_value(true)
                .help("Where template instantiations are emitted"),
        )
        .arg(
            Arg::with_name("version-ident")
                .long("version-ident")
                .multiple(true)
                .number_of_values(1)
                .takes_value(true)
                .help("Define a version identifier, or set the global version level with a number"),
        )
        .arg(
            Arg::with_name("no-assert")
                .long("no-assert")
                .help("Disable assert checking"),
        )
        .arg(
            Arg::with_name("no-contracts")
                .long("no-contracts")
                .help("Disable contract checking"),
        )
        .arg(
            Arg::with_name("deps")
                .long("deps")
                .takes_value(true)
                .help("Write the module dependency list to this file"),
        )
        .arg(
            Arg::with_name("target")
                .long("target")
                .takes_value(true)
                .help("YAML target ABI description; defaults to the host"),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .long("verbose")
                .help("Print per-stage progress"),
        )
        .arg(
            Arg::with_name("log")
                .long("log")
                .possible_values(&["debug", "trace"])
                .takes_value(true)
                .help("Enable compiler-internal logging at the given level"),
        )
}

pub fn get_log_level(matches: &ArgMatches) -> Option<log::LevelFilter> {
    match matches.value_of("log") {
        Some("debug") => Some(log::LevelFilter::Debug),
        Some("trace") => Some(log::LevelFilter::Trace),
        _ => None,
    }
}

pub fn configure_logging(level: log::LevelFilter) -> Result<(), log::SetLoggerError> {
    simplelog::TermLogger::init(
        level,
        simplelog::Config::default(),
        simplelog::TerminalMode::Stderr,
        simplelog::ColorChoice::Auto,
    )
}

/// Converts parsed arguments into the core's [`Params`].  Argument errors
/// here are user errors, reported before a context exists.
pub fn params_from_matches(matches: &ArgMatches) -> Result<Params, String> {
    let mut params = Params::default();

    params.input_files = matches
        .values_of("input")
        .map(|vals| vals.map(PathBuf::from).collect())
        .unwrap_or_default();
    params.only_file = matches.value_of("only").map(PathBuf::from);
    params.import_paths = matches
        .values_of("import")
        .map(|vals| vals.map(PathBuf::from).collect())
        .unwrap_or_default();

    params.bounds_check = match matches.value_of("bounds-check") {
        Some("0") => BoundsCheck::Off,
        Some("2") => BoundsCheck::All,
        _ => BoundsCheck::Safe,
    };
    params.emit_templates = match matches.value_of("emit-templates") {
        Some("normal") => EmitTemplates::Normal,
        Some("all") => EmitTemplates::All,
        Some("private") => EmitTemplates::Private,
        Some("none") => EmitTemplates::None,
        _ => EmitTemplates::Auto,
    };

    if let Some(idents) = matches.values_of("version-ident") {
        for ident in idents {
            match ident.parse::<u32>() {
                Ok(level) => params.version_level = params.version_level.max(level),
                Err(_) => {
                    if ident.chars().all(|c| c.is_alphanumeric() || c == '_')
                        && !ident.is_empty()
                    {
                        params.version_idents.push(ident.to_string());
                    } else {
                        return Err(format!("bad argument for --version-ident: {}", ident));
                    }
                }
            }
        }
    }

    params.use_asserts = !matches.is_present("no-assert");
    params.use_contracts = !matches.is_present("no-contracts");
    params.deps_file = matches.value_of("deps").map(PathBuf::from);
    params.verbose = matches.is_present("verbose");

    if let Some(target) = matches.value_of("target") {
        params.target = TargetConfig::from_yaml(std::path::Path::new(target))?;
    }

    Ok(params)
}
