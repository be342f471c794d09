//! Diagnostics reported by a compilation session
//!
//! Every failure the core reports becomes a [`Diagnostic`]: a kind, the unit
//! and span it points at, and a message. Rendering goes through `miette` and
//! shows the offending source line when the unit's text is known.

use ac_ir::ModuleError;
use ac_ir_lower::DeclareError;
use ac_span::FileSpan;
use ac_ty::TypeError;
use miette::{GraphicalReportHandler, GraphicalTheme, LabeledSpan, NamedSource, SourceSpan};
use std::fmt;
use thiserror::Error;

use crate::sources::SourceMap;

/// Diagnostic taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    /// Name not bound in any visible scope
    UnboundName,
    /// Name declared twice in one scope or link namespace
    DuplicateDeclaration,
    /// Operand or value of the wrong type
    TypeMismatch,
    /// Wrong number of call arguments
    ArityMismatch,
    /// Returned value disagrees with the signature
    ReturnTypeMismatch,
    /// Access to a field the type does not have
    UnknownField,
    /// Assignment or `&` applied to a non-place
    NotAPlace,
    /// `break` or `continue` outside a loop
    BreakOutsideLoop,
    /// Self-referential type
    CyclicType,
    /// Reserved function never received a body
    IncompleteModule,
}

impl DiagnosticKind {
    /// Stable diagnostic code
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::UnboundName => "acorn::unbound_name",
            Self::DuplicateDeclaration => "acorn::duplicate_declaration",
            Self::TypeMismatch => "acorn::type_mismatch",
            Self::ArityMismatch => "acorn::arity_mismatch",
            Self::ReturnTypeMismatch => "acorn::return_type_mismatch",
            Self::UnknownField => "acorn::unknown_field",
            Self::NotAPlace => "acorn::not_a_place",
            Self::BreakOutsideLoop => "acorn::break_outside_loop",
            Self::CyclicType => "acorn::cyclic_type",
            Self::IncompleteModule => "acorn::incomplete_module",
        }
    }
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// One reported problem
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct Diagnostic {
    /// What went wrong
    pub kind: DiagnosticKind,
    /// Unit the problem was found in; `None` for module-wide problems
    pub unit: Option<String>,
    /// Primary location
    pub location: Option<FileSpan>,
    /// Human-readable message
    pub message: String,
    /// Optional hint
    pub help: Option<String>,
}

impl Diagnostic {
    /// Diagnostic for a resolver error in `unit`
    #[must_use]
    pub fn from_type_error(unit: &str, error: &TypeError) -> Self {
        let kind = match error {
            TypeError::UnboundName { .. } => DiagnosticKind::UnboundName,
            TypeError::DuplicateDeclaration { .. } => DiagnosticKind::DuplicateDeclaration,
            TypeError::TypeMismatch { .. } => DiagnosticKind::TypeMismatch,
            TypeError::ArityMismatch { .. } => DiagnosticKind::ArityMismatch,
            TypeError::ReturnTypeMismatch { .. } => DiagnosticKind::ReturnTypeMismatch,
            TypeError::UnknownField { .. } => DiagnosticKind::UnknownField,
            TypeError::NotAPlace { .. } => DiagnosticKind::NotAPlace,
            TypeError::BreakOutsideLoop { .. } => DiagnosticKind::BreakOutsideLoop,
            TypeError::CyclicType { .. } => DiagnosticKind::CyclicType,
        };
        let help = match error {
            TypeError::UnboundName { suggestions, .. } => suggestion_help(suggestions),
            _ => miette::Diagnostic::help(error).map(|help| help.to_string()),
        };
        Self {
            kind,
            unit: Some(unit.to_string()),
            location: Some(error.span()),
            message: error.to_string(),
            help,
        }
    }

    /// Diagnostic for an item the module builder rejected
    #[must_use]
    pub fn from_declare_error(unit: &str, error: &DeclareError) -> Self {
        Self {
            unit: Some(unit.to_string()),
            location: Some(error.span),
            ..Self::from_module_error(&error.error)
        }
    }

    /// Module-wide diagnostic
    ///
    /// # Panics
    ///
    /// Panics on errors that only a lowering defect can produce.
    #[must_use]
    pub fn from_module_error(error: &ModuleError) -> Self {
        let kind = match error {
            ModuleError::DuplicateDeclaration { .. } => DiagnosticKind::DuplicateDeclaration,
            ModuleError::IncompleteModule { .. } => DiagnosticKind::IncompleteModule,
            ModuleError::AlreadyDefined { .. } | ModuleError::ExternDefinition { .. } => {
                panic!("COMPILER BUG: {error}")
            }
        };
        Self {
            kind,
            unit: None,
            location: None,
            message: error.to_string(),
            help: None,
        }
    }

    /// Renders the diagnostic, with a source excerpt when the text is known
    #[must_use]
    pub fn render(&self, sources: &SourceMap, color: bool) -> String {
        let theme = if color {
            GraphicalTheme::unicode()
        } else {
            GraphicalTheme::unicode_nocolor()
        };
        let report = Report::new(self, sources);
        let mut out = String::new();
        match GraphicalReportHandler::new_themed(theme).render_report(&mut out, &report) {
            Ok(()) => out,
            Err(_) => format!("error[{}]: {report}\n", self.kind),
        }
    }
}

fn suggestion_help(suggestions: &[String]) -> Option<String> {
    match suggestions {
        [] => None,
        [only] => Some(format!("did you mean `{only}`?")),
        many => Some(format!(
            "did you mean one of {}?",
            many.iter()
                .map(|name| format!("`{name}`"))
                .collect::<Vec<_>>()
                .join(", ")
        )),
    }
}

/// Adapter handing a [`Diagnostic`] and its source to `miette`
#[derive(Debug)]
struct Report<'a> {
    diagnostic: &'a Diagnostic,
    source: Option<(NamedSource<String>, SourceSpan)>,
}

impl<'a> Report<'a> {
    fn new(diagnostic: &'a Diagnostic, sources: &SourceMap) -> Self {
        let source = diagnostic
            .unit
            .as_deref()
            .and_then(|unit| sources.get(unit))
            .zip(diagnostic.location)
            .filter(|(file, location)| location.range().end <= file.text.len())
            .map(|(file, location)| {
                let name = file.path.display().to_string();
                let span = SourceSpan::from((location.range().start, location.span.len() as usize));
                (NamedSource::new(name, file.text.clone()), span)
            });
        Self { diagnostic, source }
    }
}

impl fmt::Display for Report<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.diagnostic.message)?;
        if self.source.is_none() {
            match (&self.diagnostic.unit, self.diagnostic.location) {
                (Some(unit), Some(location)) => write!(f, " (in {unit} at {location})")?,
                (Some(unit), None) => write!(f, " (in {unit})")?,
                _ => {}
            }
        }
        Ok(())
    }
}

impl std::error::Error for Report<'_> {}

impl miette::Diagnostic for Report<'_> {
    fn code<'b>(&'b self) -> Option<Box<dyn fmt::Display + 'b>> {
        Some(Box::new(self.diagnostic.kind))
    }

    fn help<'b>(&'b self) -> Option<Box<dyn fmt::Display + 'b>> {
        self.diagnostic
            .help
            .as_ref()
            .map(|help| Box::new(help) as Box<dyn fmt::Display + 'b>)
    }

    fn source_code(&self) -> Option<&dyn miette::SourceCode> {
        self.source
            .as_ref()
            .map(|(source, _)| source as &dyn miette::SourceCode)
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        let (_, span) = self.source.as_ref()?;
        Some(Box::new(std::iter::once(LabeledSpan::new_with_span(
            Some("here".to_string()),
            *span,
        ))))
    }
}
