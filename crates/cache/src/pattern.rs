//! Input pattern expansion
//!
//! Turns the user-declared input patterns (`schema/*.sql`, `${basedir}/db/**.sql`)
//! into the ordered list of files whose contents feed the checksum.

use crate::{Error, Result};
use regex::Regex;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

/// Maximum directory depth walked when expanding patterns or listing outputs.
pub const MAX_WALK_DEPTH: usize = 16;

/// Host-supplied evaluator that substitutes configuration placeholders in a
/// pattern and aligns the result to the project base directory.
pub trait PathEvaluator {
    /// Evaluate a raw pattern into a path string.
    fn evaluate_path(&self, raw: &str) -> Result<String>;
}

impl<F> PathEvaluator for F
where
    F: Fn(&str) -> Result<String>,
{
    fn evaluate_path(&self, raw: &str) -> Result<String> {
        self(raw)
    }
}

/// Ordered input files, relative to the project base directory.
///
/// Pattern order is preserved and nothing is deduplicated: the same file
/// matched by two patterns is folded into the checksum twice.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedInputs {
    files: Vec<PathBuf>,
}

impl ResolvedInputs {
    /// Wrap an already ordered list of files.
    #[must_use]
    pub fn new(files: Vec<PathBuf>) -> Self {
        Self { files }
    }

    /// `true` when no pattern matched anything; the guard disables itself.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Number of resolved files.
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Files in checksum order.
    #[must_use]
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }
}

impl<'a> IntoIterator for &'a ResolvedInputs {
    type Item = &'a PathBuf;
    type IntoIter = std::slice::Iter<'a, PathBuf>;

    fn into_iter(self) -> Self::IntoIter {
        self.files.iter()
    }
}

/// How an evaluated pattern is expanded.
#[derive(Debug, PartialEq, Eq)]
enum PatternShape<'a> {
    /// No wildcard at all.
    Literal,
    /// Wildcard present but no separator before it.
    Degenerate,
    /// Walk `base_dir` and match `remainder` against relative paths.
    Wildcard { base_dir: &'a str, remainder: &'a str },
}

fn classify(pattern: &str) -> PatternShape<'_> {
    let Some(first_wildcard) = pattern.find('*') else {
        return PatternShape::Literal;
    };
    let Some(sep) = pattern[..first_wildcard].rfind(std::path::is_separator) else {
        return PatternShape::Degenerate;
    };
    // Keep the root separator when the wildcard sits directly under it
    let base_dir = if sep == 0 { &pattern[..1] } else { &pattern[..sep] };
    PatternShape::Wildcard {
        base_dir,
        remainder: &pattern[sep + 1..],
    }
}

/// Compile the part of a pattern after its base directory into an anchored
/// matcher over `/`-separated relative paths.
///
/// - `**` matches one or more characters, separators included, so `**/`
///   needs at least one directory
/// - `*` matches one or more characters within a single path segment
/// - everything else (dots included) is literal
fn compile_matcher(remainder: &str) -> Result<Regex> {
    let remainder = if cfg!(windows) {
        remainder.replace('\\', "/")
    } else {
        remainder.to_string()
    };

    let mut expr = String::from("^");
    let mut rest = remainder.as_str();
    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix("**") {
            expr.push_str(".+");
            rest = after;
        } else if let Some(after) = rest.strip_prefix('*') {
            expr.push_str("[^/]+");
            rest = after;
        } else {
            let literal_end = rest.find('*').unwrap_or(rest.len());
            expr.push_str(&regex::escape(&rest[..literal_end]));
            rest = &rest[literal_end..];
        }
    }
    expr.push('$');

    Regex::new(&expr)
        .map_err(|e| Error::configuration(format!("Invalid input pattern '{remainder}': {e}")))
}

/// Join the normal components of a relative path with `/`.
fn slash_path(rel: &Path) -> String {
    let mut out = String::new();
    for comp in rel.components() {
        if let Component::Normal(s) = comp {
            if !out.is_empty() {
                out.push('/');
            }
            out.push_str(&s.to_string_lossy());
        }
    }
    out
}

fn walk_matches(base_dir: &Path, matcher: &Regex) -> Vec<PathBuf> {
    if !base_dir.is_dir() {
        tracing::warn!(dir = %base_dir.display(), "Couldn't list files, input directory does not exist");
        return Vec::new();
    }

    let mut matches = Vec::new();
    for entry in WalkDir::new(base_dir).max_depth(MAX_WALK_DEPTH) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::debug!(dir = %base_dir.display(), error = %e, "Skipping unreadable entry");
                continue;
            }
        };
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Ok(rel) = path.strip_prefix(base_dir) else {
            continue;
        };
        if matcher.is_match(&slash_path(rel)) {
            matches.push(path.to_path_buf());
        }
    }
    matches
}

/// Expand one pattern into concrete paths.
///
/// The evaluator runs first. A pattern without `*` yields itself, unchecked;
/// a missing file surfaces later as a checksum read failure. Wildcard patterns
/// walk their base directory (bounded to [`MAX_WALK_DEPTH`]) and return regular
/// files in walk order.
pub fn resolve<E>(pattern: &str, evaluator: &E) -> Result<Vec<PathBuf>>
where
    E: PathEvaluator + ?Sized,
{
    let evaluated = evaluator.evaluate_path(pattern)?;

    match classify(&evaluated) {
        PatternShape::Literal => Ok(vec![PathBuf::from(&evaluated)]),
        PatternShape::Degenerate => {
            tracing::warn!(
                pattern = %evaluated,
                "Wildcard pattern has no directory part, treating it as a literal path"
            );
            Ok(vec![PathBuf::from(&evaluated)])
        }
        PatternShape::Wildcard {
            base_dir,
            remainder,
        } => {
            let matcher = compile_matcher(remainder)?;
            Ok(walk_matches(Path::new(base_dir), &matcher))
        }
    }
}

/// Expand every pattern in declaration order and relativize the results
/// against `base_dir`.
///
/// Paths outside `base_dir` are kept as evaluated.
pub fn resolve_inputs<E>(base_dir: &Path, patterns: &[String], evaluator: &E) -> Result<ResolvedInputs>
where
    E: PathEvaluator + ?Sized,
{
    let span = tracing::debug_span!(
        "pattern.resolve_inputs",
        base = %base_dir.display(),
        pattern_count = patterns.len()
    );
    let _guard = span.enter();

    let mut files = Vec::new();
    for pattern in patterns {
        let matched = resolve(pattern, evaluator)?;
        tracing::debug!(pattern = %pattern, matched = matched.len(), "Resolved input pattern");
        files.extend(matched.into_iter().map(|path| match path.strip_prefix(base_dir) {
            Ok(rel) => rel.to_path_buf(),
            Err(_) => path,
        }));
    }

    Ok(ResolvedInputs::new(files))
}
