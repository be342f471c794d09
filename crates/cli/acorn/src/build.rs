//! Build command implementation

use ac_driver::{CompileOptions, Session, load_units};
use anyhow::Result;
use colored::Colorize;
use std::path::PathBuf;
use std::time::Instant;

pub fn build(paths: &[PathBuf], options: CompileOptions) -> Result<()> {
    let start = Instant::now();
    println!(
        "{} module `{}` from {} units",
        "Compiling".green().bold(),
        options.module_name,
        paths.len()
    );

    let loaded = load_units(paths)?;
    let output = options.output.clone();
    let session = Session::new(options);
    let compiled = match session.compile(&loaded.units) {
        Ok(compiled) => compiled,
        Err(diagnostics) => return Err(crate::report::report(&diagnostics, &loaded.sources)),
    };

    compiled.write(&output)?;
    println!(
        "  {} {} functions, {} globals",
        "Lowered:".bold(),
        compiled.module.functions.len(),
        compiled.module.globals.len()
    );
    println!(
        "  {} wrote {} in {:.2}s",
        "Finished".green().bold(),
        output.display(),
        start.elapsed().as_secs_f64()
    );
    Ok(())
}
