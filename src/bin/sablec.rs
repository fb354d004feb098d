extern crate log;
extern crate simplelog;

use sable_lang::cli::{
    configure_cli, configure_logging, get_log_level, params_from_matches, ERR_BAD_ARGS,
    ERR_FATAL, ERR_SEMANTIC,
};
use sable_lang::compiler::driver;

fn main() -> Result<(), i32> {
    let matches = configure_cli().get_matches();

    if let Some(level) = get_log_level(&matches) {
        configure_logging(level).expect("Failed to configure logger.");
    }

    let params = match params_from_matches(&matches) {
        Ok(p) => p,
        Err(msg) => {
            eprintln!("error: {}", msg);
            return Err(ERR_BAD_ARGS);
        }
    };
    let verbose = params.verbose;

    let outcome = match driver::compile(params) {
        Ok(o) => o,
        Err(fatal) => {
            eprintln!("error: {}", fatal);
            return Err(ERR_FATAL);
        }
    };

    for d in outcome.ctx.diagnostics.records() {
        eprintln!("error: {}", d.message);
    }

    if !outcome.emitted {
        eprintln!(
            "compilation failed with {} error(s); no output written",
            outcome.error_count
        );
        return Err(ERR_SEMANTIC);
    }

    if verbose {
        for unit in &outcome.summaries {
            eprintln!(
                "{}: {} function(s), {} data symbol(s), {} data byte(s)",
                unit.name, unit.functions, unit.data_symbols, unit.data_bytes
            );
        }
    }

    Ok(())
}
