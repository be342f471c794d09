//! Diagnostic output

use ac_driver::{Diagnostic, SourceMap};
use colored::Colorize;

/// Prints every diagnostic to stderr and returns the error ending the command
pub fn report(diagnostics: &[Diagnostic], sources: &SourceMap) -> anyhow::Error {
    let color = colored::control::SHOULD_COLORIZE.should_colorize();
    for diagnostic in diagnostics {
        eprint!("{}", diagnostic.render(sources, color));
    }
    eprintln!(
        "{} {} errors found",
        "Failed:".red().bold(),
        diagnostics.len()
    );
    anyhow::anyhow!("compilation failed with {} errors", diagnostics.len())
}
