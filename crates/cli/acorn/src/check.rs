//! Check command implementation

use ac_driver::{CompileOptions, Session, load_units};
use anyhow::Result;
use colored::Colorize;
use std::path::PathBuf;

pub fn check(paths: &[PathBuf], options: CompileOptions) -> Result<()> {
    println!("{} {} units", "Checking".green().bold(), paths.len());

    let loaded = load_units(paths)?;
    let session = Session::new(options);
    if let Err(diagnostics) = session.check(&loaded.units) {
        return Err(crate::report::report(&diagnostics, &loaded.sources));
    }

    println!("{} No errors found", "Success:".green().bold());
    Ok(())
}
