//! Compilation driver
//!
//! A [`Session`] runs the core pipeline over a set of units and produces one
//! IR module:
//!
//! 1. collect the items of every unit and reserve their module slots
//!    (sequential, [`ModuleContext::collect`]);
//! 2. check and lower each unit on the worker pool, installing bodies under
//!    the module lock;
//! 3. seal the module, but only if no unit reported anything.
//!
//! Diagnostics from every unit are returned together; a failing unit never
//! causes partial output.

mod config;
pub mod diagnostics;
pub mod sources;

use ac_ast::SourceUnit;
use ac_intern::Interner;
use ac_ir::{Module, ModuleBuilder};
use ac_ir_lower::{declare_items, lower_unit, ItemMap};
use ac_symbols::UnitId;
use ac_ty::{Declarations, TypeResolver};
use anyhow::{Context, Result};
use log::{debug, info, warn};
use parking_lot::Mutex;
use rayon::prelude::*;
use std::path::Path;
use std::time::Instant;

pub use config::{CompileOptions, CONFIG_FILE};
pub use diagnostics::{Diagnostic, DiagnosticKind};
pub use sources::{load_units, LoadedUnits, SourceFile, SourceMap};

/// Module-wide compiler state shared by every unit
///
/// Declarations are read-only after collection; the module builder is the
/// only mutable part and sits behind one lock.
pub struct ModuleContext {
    decls: Declarations,
    items: Option<ItemMap>,
    builder: Mutex<ModuleBuilder>,
}

impl ModuleContext {
    /// Collects every unit's items and reserves their module slots
    ///
    /// Slots are only reserved when collection succeeded; the returned
    /// diagnostics are link-level clashes such as two `main` functions.
    /// Collection errors are reported later, per unit, by the resolver.
    #[must_use]
    pub fn collect(
        interner: &Interner,
        module_name: &str,
        units: &[SourceUnit],
    ) -> (Self, Vec<Diagnostic>) {
        let decls = Declarations::collect(interner, units);
        let mut builder = ModuleBuilder::new(module_name);
        let mut diagnostics = Vec::new();

        let items = if decls.has_errors() {
            debug!("collection failed; skipping slot reservation");
            None
        } else {
            match declare_items(&decls, &mut builder) {
                Ok(items) => Some(items),
                Err(errors) => {
                    diagnostics.extend(errors.iter().map(|error| {
                        Diagnostic::from_declare_error(&units[error.unit.0 as usize].name, error)
                    }));
                    None
                }
            }
        };

        let context = Self {
            decls,
            items,
            builder: Mutex::new(builder),
        };
        (context, diagnostics)
    }

    /// Collected declarations
    #[must_use]
    pub fn declarations(&self) -> &Declarations {
        &self.decls
    }

    /// Checks one unit and, if it and the module declarations are clean,
    /// installs its lowered functions
    #[must_use]
    pub fn check_and_lower(&self, unit: UnitId, source: &SourceUnit) -> Vec<Diagnostic> {
        let resolved = match TypeResolver::new(&self.decls).resolve(unit, source) {
            Ok(resolved) => resolved,
            Err(errors) => {
                debug!("unit `{}` has {} errors", source.name, errors.len());
                return errors
                    .iter()
                    .map(|error| Diagnostic::from_type_error(&source.name, error))
                    .collect();
            }
        };
        let Some(items) = &self.items else {
            return Vec::new();
        };

        let bodies = lower_unit(&self.decls, items, &resolved);
        debug!("unit `{}`: lowered {} functions", source.name, bodies.len());

        let mut builder = self.builder.lock();
        for (id, body) in bodies {
            if let Err(error) = builder.define_function(id, body) {
                panic!("COMPILER BUG: {error}");
            }
        }
        Vec::new()
    }

    /// Seals the module
    ///
    /// # Errors
    ///
    /// Returns `IncompleteModule` if a reserved function never got a body.
    pub fn finish(self) -> Result<Module, Diagnostic> {
        self.builder
            .into_inner()
            .finish()
            .map_err(|error| Diagnostic::from_module_error(&error))
    }
}

/// A sealed module
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledModule {
    /// The linked IR
    pub module: Module,
}

impl CompiledModule {
    /// Textual IR
    #[must_use]
    pub fn text(&self) -> String {
        self.module.to_string()
    }

    /// Writes the textual IR, creating parent directories as needed
    ///
    /// # Errors
    ///
    /// Fails on any I/O error.
    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
        std::fs::write(path, self.text())
            .with_context(|| format!("failed to write {}", path.display()))
    }
}

/// One compilation configuration
pub struct Session {
    options: CompileOptions,
    interner: Interner,
}

impl Session {
    /// Creates a session
    #[must_use]
    pub fn new(options: CompileOptions) -> Self {
        Self {
            options,
            interner: Interner::new(),
        }
    }

    /// Session options
    #[must_use]
    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    /// Checks and lowers `units` into one module
    ///
    /// Unit `i` of the slice is `UnitId(i)`.
    ///
    /// # Errors
    ///
    /// Returns the diagnostics of every unit, in unit order, if any unit
    /// failed. No module is produced in that case.
    pub fn compile(&self, units: &[SourceUnit]) -> Result<CompiledModule, Vec<Diagnostic>> {
        let start = Instant::now();
        info!("collecting items of {} units", units.len());
        let (context, mut diagnostics) =
            ModuleContext::collect(&self.interner, &self.options.module_name, units);

        info!("checking and lowering");
        let per_unit: Vec<Vec<Diagnostic>> = self.on_workers(|| {
            units
                .par_iter()
                .enumerate()
                .map(|(index, unit)| context.check_and_lower(UnitId(index as u32), unit))
                .collect()
        });
        diagnostics.extend(per_unit.into_iter().flatten());

        if !diagnostics.is_empty() {
            info!("{} diagnostics; no module emitted", diagnostics.len());
            return Err(diagnostics);
        }

        let module = context.finish().map_err(|diagnostic| vec![diagnostic])?;
        info!(
            "module `{}` sealed: {} functions, {} globals in {:.2?}",
            module.name,
            module.functions.len(),
            module.globals.len(),
            start.elapsed()
        );
        Ok(CompiledModule { module })
    }

    /// Checks `units` without keeping the module
    ///
    /// # Errors
    ///
    /// Same as [`Session::compile`].
    pub fn check(&self, units: &[SourceUnit]) -> Result<(), Vec<Diagnostic>> {
        self.compile(units).map(|_| ())
    }

    fn on_workers<R: Send>(&self, op: impl FnOnce() -> R + Send) -> R {
        let Some(jobs) = self.options.jobs else {
            return op();
        };
        match rayon::ThreadPoolBuilder::new().num_threads(jobs).build() {
            Ok(pool) => pool.install(op),
            Err(error) => {
                warn!("cannot start {jobs} workers ({error}); using the global pool");
                op()
            }
        }
    }
}
