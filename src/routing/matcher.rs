//! Direct-access rule matching.
//!
//! # Responsibilities
//! - Compile the include (`regexps`) and exclude (`notregexps`) lists once
//! - Classify a routing subject as `Continue` or `DirectAccess`
//!
//! # Design Decisions
//! - Exclude rules are checked first and always win
//! - Patterns run against raw bytes, no normalization of host or path
//! - Compiled sets are immutable, shared across workers without locks
//! - First matching pattern is only reported for logging, never for the decision

use regex::bytes::Regex;
use thiserror::Error;
use tracing::Span;

/// Which rule list a pattern belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    Include,
    Exclude,
}

impl std::fmt::Display for RuleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuleKind::Include => write!(f, "include"),
            RuleKind::Exclude => write!(f, "exclude"),
        }
    }
}

/// A rule pattern failed to compile.
#[derive(Debug, Error)]
#[error("invalid {kind} pattern #{index} `{pattern}`: {source}")]
pub struct RuleError {
    pub kind: RuleKind,
    pub index: usize,
    pub pattern: String,
    #[source]
    pub source: regex::Error,
}

/// Routing decision for a single request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Proceed through the normal pipeline.
    Continue,
    /// Skip the pipeline and go straight to the origin.
    DirectAccess,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Continue => "continue",
            Decision::DirectAccess => "direct_access",
        }
    }
}

/// Ordered list of compiled patterns.
#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    patterns: Vec<Regex>,
}

impl PatternSet {
    /// Compile `patterns` in order. The first invalid pattern aborts.
    pub fn compile<I, S>(kind: RuleKind, patterns: I) -> Result<Self, RuleError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .enumerate()
            .map(|(index, p)| {
                Regex::new(p.as_ref()).map_err(|source| RuleError {
                    kind,
                    index,
                    pattern: p.as_ref().to_string(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { patterns })
    }

    /// Returns the first pattern matching `subject`.
    pub fn first_match(&self, subject: &[u8]) -> Option<&Regex> {
        self.patterns.iter().find(|re| re.is_match(subject))
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// Include/exclude rule pair deciding which requests bypass the pipeline.
#[derive(Debug, Clone, Default)]
pub struct RuleMatcher {
    include: PatternSet,
    exclude: PatternSet,
}

impl RuleMatcher {
    /// Compile both rule lists. Any malformed pattern is fatal for the matcher.
    pub fn new<I, E, S, T>(include: I, exclude: E) -> Result<Self, RuleError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
        E: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        Ok(Self {
            include: PatternSet::compile(RuleKind::Include, include)?,
            exclude: PatternSet::compile(RuleKind::Exclude, exclude)?,
        })
    }

    /// Classify `subject`, logging against the current span.
    pub fn classify(&self, subject: &[u8]) -> Decision {
        self.classify_with_span(&Span::current(), subject)
    }

    /// Classify `subject`, logging against the given request span.
    pub fn classify_with_span(&self, span: &Span, subject: &[u8]) -> Decision {
        let hostpath = String::from_utf8_lossy(subject);
        tracing::debug!(parent: span, hostpath = %hostpath, "Classifying request");

        if let Some(re) = self.exclude.first_match(subject) {
            tracing::debug!(parent: span, hostpath = %hostpath, pattern = %re, "Matched exclude rule");
            return Decision::Continue;
        }

        if let Some(re) = self.include.first_match(subject) {
            tracing::debug!(parent: span, hostpath = %hostpath, pattern = %re, "Matched include rule");
            return Decision::DirectAccess;
        }

        Decision::Continue
    }

    pub fn include_rules(&self) -> &PatternSet {
        &self.include
    }

    pub fn exclude_rules(&self) -> &PatternSet {
        &self.exclude
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NO_RULES: [&str; 0] = [];

    #[test]
    fn test_include_match() {
        let matcher = RuleMatcher::new([r"^example\.com/.*"], NO_RULES).unwrap();
        assert_eq!(matcher.classify(b"example.com/path?x=1"), Decision::DirectAccess);
        assert_eq!(matcher.classify(b"other.com/path"), Decision::Continue);
    }

    #[test]
    fn test_exclude_wins() {
        let matcher = RuleMatcher::new(
            [r"^example\.com/.*"],
            [r"^example\.com/admin"],
        )
        .unwrap();
        assert_eq!(matcher.classify(b"example.com/admin/x"), Decision::Continue);
        assert_eq!(matcher.classify(b"example.com/public"), Decision::DirectAccess);
    }

    #[test]
    fn test_exclude_only_never_direct() {
        let matcher = RuleMatcher::new(NO_RULES, [r"admin"]).unwrap();
        assert_eq!(matcher.classify(b"example.com/admin"), Decision::Continue);
        assert_eq!(matcher.classify(b"example.com/"), Decision::Continue);
    }

    #[test]
    fn test_empty_rules_always_continue() {
        let matcher = RuleMatcher::new(NO_RULES, NO_RULES).unwrap();
        assert_eq!(matcher.classify(b""), Decision::Continue);
        assert_eq!(matcher.classify(b"example.com/"), Decision::Continue);
        assert!(matcher.include_rules().is_empty());
        assert!(matcher.exclude_rules().is_empty());
    }

    #[test]
    fn test_query_string_is_part_of_subject() {
        let matcher = RuleMatcher::new([r"\?debug=1$"], NO_RULES).unwrap();
        assert_eq!(matcher.classify(b"example.com/a?debug=1"), Decision::DirectAccess);
        assert_eq!(matcher.classify(b"example.com/a"), Decision::Continue);
    }

    #[test]
    fn test_no_case_normalization() {
        let matcher = RuleMatcher::new([r"^example\.com/"], NO_RULES).unwrap();
        assert_eq!(matcher.classify(b"EXAMPLE.COM/"), Decision::Continue);
    }

    #[test]
    fn test_non_utf8_subject() {
        let matcher = RuleMatcher::new([r"(?-u)^example\.com/\xff"], NO_RULES).unwrap();
        assert_eq!(matcher.classify(b"example.com/\xff"), Decision::DirectAccess);
    }

    #[test]
    fn test_malformed_pattern_rejected() {
        let err = RuleMatcher::new([r"^ok$"], [r"([unclosed"]).unwrap_err();
        assert_eq!(err.kind, RuleKind::Exclude);
        assert_eq!(err.index, 0);
        assert_eq!(err.pattern, "([unclosed");

        let err = RuleMatcher::new([r"^ok$", r"*bad"], NO_RULES).unwrap_err();
        assert_eq!(err.kind, RuleKind::Include);
        assert_eq!(err.index, 1);
    }
}
