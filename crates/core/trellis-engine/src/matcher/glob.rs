//! Glob patterns compiled to anchored regular expressions.
//!
//! Supported syntax: `*` (within a path segment), `**` (across segments),
//! `?`, `[...]` / `[!...]` classes, and `{a,b}` alternation. Every wildcard
//! becomes a capture group, and the captures become the recipe arguments.

use regex::Regex;

use super::GoalMatcher;
use crate::error::{EngineError, Result};
use crate::goal::MatchResult;

/// Matches names against a glob pattern.
///
/// The recipe receives the whole name followed by one argument per
/// wildcard, in pattern order.
pub struct GlobMatcher {
    pattern: String,
    regex: Regex,
}

impl GlobMatcher {
    /// Compile `pattern`.
    pub fn new(pattern: impl Into<String>) -> Result<Self> {
        let pattern = pattern.into();
        let source = glob_to_regex(&pattern)?;
        let regex = Regex::new(&source).map_err(|e| EngineError::InvalidGoal {
            reason: format!("bad glob pattern '{pattern}': {e}"),
        })?;
        Ok(Self { pattern, regex })
    }

    /// The original glob pattern.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    fn captures(&self, name: &str) -> Option<Vec<String>> {
        let caps = self.regex.captures(name)?;
        Some(
            caps.iter()
                .map(|c| c.map_or_else(String::new, |m| m.as_str().to_string()))
                .collect(),
        )
    }
}

impl GoalMatcher for GlobMatcher {
    fn match_string(&self, name: &str) -> Option<MatchResult> {
        let exec_args = self.captures(name)?;
        Some(MatchResult {
            id: name.to_string(),
            args: vec![name.to_string()],
            exec_args,
        })
    }

    fn match_goal_id(&self, id: &str, args: &[String]) -> Option<MatchResult> {
        match args {
            [only] if only == id => self.match_string(id),
            _ => None,
        }
    }

    fn create_goal_id(&self, args: &[String]) -> Result<MatchResult> {
        let [name] = args else {
            return Err(EngineError::InvalidGoal {
                reason: format!("glob '{}' takes one argument, got {}", self.pattern, args.len()),
            });
        };
        self.match_string(name).ok_or_else(|| EngineError::InvalidGoal {
            reason: format!("'{name}' does not match glob '{}'", self.pattern),
        })
    }
}

/// Translate a glob into an anchored regex source string.
fn glob_to_regex(pattern: &str) -> Result<String> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::from("^");
    let mut in_group = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '*' if chars.get(i + 1) == Some(&'*') => {
                if chars.get(i + 2) == Some(&'/') {
                    out.push_str("((?:[^/]*/)*)");
                    i += 3;
                } else {
                    out.push_str("(.*)");
                    i += 2;
                }
                continue;
            }
            '*' => out.push_str("([^/]*)"),
            '?' => out.push_str("([^/])"),
            '[' => {
                let close = chars[i + 1..]
                    .iter()
                    .position(|&ch| ch == ']')
                    .map(|p| p + i + 1)
                    .ok_or_else(|| EngineError::InvalidGoal {
                        reason: format!("unterminated character class in '{pattern}'"),
                    })?;
                out.push_str("([");
                let mut body = &chars[i + 1..close];
                if let Some('!' | '^') = body.first() {
                    out.push('^');
                    body = &body[1..];
                }
                for &ch in body {
                    if ch == '\\' || ch == '[' {
                        out.push('\\');
                    }
                    out.push(ch);
                }
                out.push_str("])");
                i = close + 1;
                continue;
            }
            '{' if !in_group => {
                in_group = true;
                out.push_str("((?:");
            }
            ',' if in_group => out.push_str(")|(?:"),
            '}' if in_group => {
                in_group = false;
                out.push_str("))");
            }
            _ => out.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
        }
        i += 1;
    }

    if in_group {
        return Err(EngineError::InvalidGoal {
            reason: format!("unterminated alternation in '{pattern}'"),
        });
    }
    out.push('$');
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn star_stays_within_segment() {
        let m = GlobMatcher::new("out/*.o").unwrap();
        let found = m.match_string("out/main.o").unwrap();
        assert_eq!(found.exec_args, vec!["out/main.o", "main"]);
        assert!(m.match_string("out/sub/main.o").is_none());
    }

    #[test]
    fn double_star_crosses_segments() {
        let m = GlobMatcher::new("src/**/*.rs").unwrap();
        assert!(m.match_string("src/lib.rs").is_some());
        let found = m.match_string("src/a/b/mod.rs").unwrap();
        assert_eq!(found.exec_args, vec!["src/a/b/mod.rs", "a/b/", "mod"]);
    }

    #[test]
    fn classes_and_alternation() {
        let m = GlobMatcher::new("{lib,bin}/[!_]?.txt").unwrap();
        assert!(m.match_string("lib/ab.txt").is_some());
        assert!(m.match_string("bin/xy.txt").is_some());
        assert!(m.match_string("lib/_b.txt").is_none());
        assert!(m.match_string("doc/ab.txt").is_none());
    }

    #[test]
    fn literal_characters_are_escaped() {
        let m = GlobMatcher::new("a+b(c).txt").unwrap();
        assert!(m.match_string("a+b(c).txt").is_some());
        assert!(m.match_string("aab(c).txt").is_none());
    }

    #[test]
    fn create_rejects_non_matching_names() {
        let m = GlobMatcher::new("*.c").unwrap();
        assert_eq!(m.create_goal_id(&["x.c".into()]).unwrap().id, "x.c");
        assert!(m.create_goal_id(&["x.h".into()]).is_err());
        assert!(GlobMatcher::new("[abc").is_err());
    }
}
