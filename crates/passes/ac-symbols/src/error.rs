//! Error types for name resolution

use ac_span::FileSpan;

/// Errors raised by the symbol table and the module index
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SymbolError {
    /// Name is not bound in any visible scope
    #[error("cannot find `{name}` in this scope")]
    UnboundName {
        /// The name that was not found
        name: String,
        /// Where the name was used
        span: FileSpan,
        /// Similar visible names, closest first
        suggestions: Vec<String>,
    },

    /// Name is declared twice in the same scope
    #[error("`{name}` is already declared in this scope")]
    DuplicateDeclaration {
        /// The redeclared name
        name: String,
        /// Location of the second declaration
        span: FileSpan,
        /// Location of the first declaration
        first: FileSpan,
    },
}

impl SymbolError {
    /// Location the error is reported at
    #[must_use]
    pub fn span(&self) -> FileSpan {
        match self {
            Self::UnboundName { span, .. } | Self::DuplicateDeclaration { span, .. } => *span,
        }
    }

    /// Picks up to three candidates within edit distance 3 of `name`
    pub fn compute_suggestions<'a>(
        name: &str,
        candidates: impl IntoIterator<Item = &'a str>,
    ) -> Vec<String> {
        let mut scored: Vec<(usize, &str)> = candidates
            .into_iter()
            .filter(|candidate| *candidate != name)
            .map(|candidate| (levenshtein_distance(name, candidate), candidate))
            .filter(|(distance, _)| *distance <= 3)
            .collect();

        scored.sort_unstable();
        scored.dedup();
        scored
            .into_iter()
            .take(3)
            .map(|(_, candidate)| candidate.to_string())
            .collect()
    }
}

/// Compute Levenshtein distance between two strings
fn levenshtein_distance(source: &str, target: &str) -> usize {
    let source: Vec<char> = source.chars().collect();
    let target: Vec<char> = target.chars().collect();

    if source.is_empty() {
        return target.len();
    }
    if target.is_empty() {
        return source.len();
    }

    let mut previous: Vec<usize> = (0..=target.len()).collect();
    let mut current = vec![0; target.len() + 1];

    for (idx, source_char) in source.iter().enumerate() {
        current[0] = idx + 1;
        for (jdx, target_char) in target.iter().enumerate() {
            let cost = usize::from(source_char != target_char);
            current[jdx + 1] = (previous[jdx + 1] + 1)
                .min(current[jdx] + 1)
                .min(previous[jdx] + cost);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[target.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levenshtein_distance() {
        assert_eq!(levenshtein_distance("", ""), 0);
        assert_eq!(levenshtein_distance("abc", "abc"), 0);
        assert_eq!(levenshtein_distance("abc", "def"), 3);
        assert_eq!(levenshtein_distance("kitten", "sitting"), 3);
        assert_eq!(levenshtein_distance("saturday", "sunday"), 3);
    }

    #[test]
    fn test_suggestions_are_sorted_and_bounded() {
        let suggestions =
            SymbolError::compute_suggestions("countr", ["counter", "count", "main", "country"]);
        assert_eq!(suggestions, vec!["count", "counter", "country"]);
    }

    #[test]
    fn test_no_suggestions_for_distant_names() {
        let suggestions = SymbolError::compute_suggestions("x", ["argument_count"]);
        assert!(suggestions.is_empty());
    }
}
