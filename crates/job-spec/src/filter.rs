use crate::{ConfigError, Filter};
use globset::{GlobBuilder, GlobMatcher};

/// Compiled upload filters. The last filter whose pattern matches a path's full
/// relative form or its base name decides; no match means excluded.
#[derive(Debug, Clone)]
pub struct FilterChain {
    rules: Vec<Rule>,
}

#[derive(Debug, Clone)]
struct Rule {
    matcher: GlobMatcher,
    exclude: bool,
}

impl FilterChain {
    pub fn compile(filters: &[Filter]) -> Result<Self, ConfigError> {
        let rules = filters
            .iter()
            .map(|filter| {
                let glob = GlobBuilder::new(&shell_glob(&filter.pattern))
                    .literal_separator(true)
                    .backslash_escape(true)
                    .build()
                    .map_err(|err| ConfigError::InvalidPattern {
                        pattern: filter.pattern.clone(),
                        message: err.kind().to_string(),
                    })?;
                Ok(Rule {
                    matcher: glob.compile_matcher(),
                    exclude: filter.exclude,
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;
        Ok(Self { rules })
    }

    /// `relative_path` uses `/` separators and is relative to the working directory.
    pub fn includes(&self, relative_path: &str) -> bool {
        let base_name = relative_path
            .rsplit('/')
            .next()
            .unwrap_or(relative_path);
        self.rules
            .iter()
            .rev()
            .find(|rule| rule.matcher.is_match(relative_path) || rule.matcher.is_match(base_name))
            .map_or(false, |rule| !rule.exclude)
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Restricts globset syntax to plain shell globs: braces are literal and a run
/// of stars is a single `*`. Escapes and bracket classes pass through untouched.
fn shell_glob(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                out.push(c);
                if let Some(next) = chars.next() {
                    out.push(next);
                }
            }
            '[' => {
                out.push(c);
                let mut first = true;
                while let Some(inner) = chars.next() {
                    out.push(inner);
                    if inner == ']' && !first {
                        break;
                    }
                    if !(first && (inner == '!' || inner == '^')) {
                        first = false;
                    }
                }
            }
            '{' | '}' => {
                out.push('\\');
                out.push(c);
            }
            '*' => {
                out.push(c);
                while chars.peek() == Some(&'*') {
                    chars.next();
                }
            }
            _ => out.push(c),
        }
    }
    out
}
