//! Goal matchers: how rules recognise names and goal ids.
//!
//! A matcher answers three questions for its rule:
//! - does this free-text name belong to me ([`GoalMatcher::match_string`])?
//! - does this structured `(id, args)` pair belong to me
//!   ([`GoalMatcher::match_goal_id`])?
//! - which goal do these arguments denote ([`GoalMatcher::create_goal_id`])?
//!
//! Matchers compose: [`KindMatcher`] namespaces ids with a kind prefix,
//! [`PrefixMatcher`] adds a prefix on both sides, and [`NoStringMatcher`]
//! hides a rule from free-text lookup.

mod glob;

pub use glob::GlobMatcher;

use crate::error::{EngineError, Result};
use crate::goal::MatchResult;

/// Recognises goal names and ids for a single rule.
pub trait GoalMatcher: Send + Sync {
    /// Match free text, e.g. a name typed on the command line.
    fn match_string(&self, name: &str) -> Option<MatchResult>;

    /// Match a canonical goal id together with its arguments.
    fn match_goal_id(&self, id: &str, args: &[String]) -> Option<MatchResult>;

    /// Construct the goal denoted by `args`.
    fn create_goal_id(&self, args: &[String]) -> Result<MatchResult>;
}

// ---------------------------------------------------------------------------
// Leaf matchers
// ---------------------------------------------------------------------------

/// Matches exactly one name.
pub struct ExactMatcher {
    name: String,
}

impl ExactMatcher {
    /// Matcher for the single goal `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl GoalMatcher for ExactMatcher {
    fn match_string(&self, name: &str) -> Option<MatchResult> {
        (name == self.name).then(|| MatchResult::new(name, Vec::new()))
    }

    fn match_goal_id(&self, id: &str, args: &[String]) -> Option<MatchResult> {
        (id == self.name && args.is_empty()).then(|| MatchResult::new(id, Vec::new()))
    }

    fn create_goal_id(&self, _args: &[String]) -> Result<MatchResult> {
        Ok(MatchResult::new(self.name.clone(), Vec::new()))
    }
}

/// Matches every name; the single argument is the name itself.
pub struct AlwaysMatcher;

impl GoalMatcher for AlwaysMatcher {
    fn match_string(&self, name: &str) -> Option<MatchResult> {
        Some(MatchResult::new(name, vec![name.to_string()]))
    }

    fn match_goal_id(&self, id: &str, args: &[String]) -> Option<MatchResult> {
        match args {
            [only] if only == id => Some(MatchResult::new(id, args.to_vec())),
            _ => None,
        }
    }

    fn create_goal_id(&self, args: &[String]) -> Result<MatchResult> {
        match args {
            [only] => Ok(MatchResult::new(only.clone(), args.to_vec())),
            _ => Err(EngineError::InvalidGoal {
                reason: format!("expected exactly one argument, got {}", args.len()),
            }),
        }
    }
}

/// Builds ids from arguments with a naming function; never matches free text.
pub struct MakeMatcher {
    arity: usize,
    name_fn: Box<dyn Fn(&[String]) -> String + Send + Sync>,
}

impl MakeMatcher {
    /// Matcher for goals named `name_fn(args)` with `arity` arguments.
    pub fn new<F>(arity: usize, name_fn: F) -> Self
    where
        F: Fn(&[String]) -> String + Send + Sync + 'static,
    {
        Self {
            arity,
            name_fn: Box::new(name_fn),
        }
    }
}

impl GoalMatcher for MakeMatcher {
    fn match_string(&self, _name: &str) -> Option<MatchResult> {
        None
    }

    fn match_goal_id(&self, id: &str, args: &[String]) -> Option<MatchResult> {
        (args.len() == self.arity && (self.name_fn)(args) == id)
            .then(|| MatchResult::new(id, args.to_vec()))
    }

    fn create_goal_id(&self, args: &[String]) -> Result<MatchResult> {
        if args.len() != self.arity {
            return Err(EngineError::InvalidGoal {
                reason: format!("expected {} arguments, got {}", self.arity, args.len()),
            });
        }
        Ok(MatchResult::new((self.name_fn)(args), args.to_vec()))
    }
}

// ---------------------------------------------------------------------------
// Wrappers
// ---------------------------------------------------------------------------

/// Namespaces ids with a kind prefix such as `Builtin::Task::`.
///
/// Free text is matched without the prefix; structured ids must carry it.
pub struct KindMatcher {
    prefix: String,
    inner: Box<dyn GoalMatcher>,
}

impl KindMatcher {
    /// Wrap `inner` so that every id it produces starts with `prefix`.
    pub fn new(prefix: impl Into<String>, inner: impl GoalMatcher + 'static) -> Self {
        Self {
            prefix: prefix.into(),
            inner: Box::new(inner),
        }
    }

    fn prefixed(&self, m: MatchResult) -> MatchResult {
        MatchResult {
            id: format!("{}{}", self.prefix, m.id),
            ..m
        }
    }
}

impl GoalMatcher for KindMatcher {
    fn match_string(&self, name: &str) -> Option<MatchResult> {
        self.inner.match_string(name).map(|m| self.prefixed(m))
    }

    fn match_goal_id(&self, id: &str, args: &[String]) -> Option<MatchResult> {
        let rest = id.strip_prefix(self.prefix.as_str())?;
        self.inner.match_goal_id(rest, args).map(|m| self.prefixed(m))
    }

    fn create_goal_id(&self, args: &[String]) -> Result<MatchResult> {
        self.inner.create_goal_id(args).map(|m| self.prefixed(m))
    }
}

/// Requires a prefix on both free text and structured ids.
pub struct PrefixMatcher {
    prefix: String,
    inner: Box<dyn GoalMatcher>,
}

impl PrefixMatcher {
    /// Wrap `inner` so that it only sees names starting with `prefix`.
    pub fn new(prefix: impl Into<String>, inner: impl GoalMatcher + 'static) -> Self {
        Self {
            prefix: prefix.into(),
            inner: Box::new(inner),
        }
    }

    fn prefixed(&self, m: MatchResult) -> MatchResult {
        MatchResult {
            id: format!("{}{}", self.prefix, m.id),
            ..m
        }
    }
}

impl GoalMatcher for PrefixMatcher {
    fn match_string(&self, name: &str) -> Option<MatchResult> {
        let rest = name.strip_prefix(self.prefix.as_str())?;
        self.inner.match_string(rest).map(|m| self.prefixed(m))
    }

    fn match_goal_id(&self, id: &str, args: &[String]) -> Option<MatchResult> {
        let rest = id.strip_prefix(self.prefix.as_str())?;
        self.inner.match_goal_id(rest, args).map(|m| self.prefixed(m))
    }

    fn create_goal_id(&self, args: &[String]) -> Result<MatchResult> {
        self.inner.create_goal_id(args).map(|m| self.prefixed(m))
    }
}

/// Hides the wrapped matcher from free-text lookup.
pub struct NoStringMatcher {
    inner: Box<dyn GoalMatcher>,
}

impl NoStringMatcher {
    /// Wrap `inner`, disabling [`GoalMatcher::match_string`].
    pub fn new(inner: impl GoalMatcher + 'static) -> Self {
        Self {
            inner: Box::new(inner),
        }
    }
}

impl GoalMatcher for NoStringMatcher {
    fn match_string(&self, _name: &str) -> Option<MatchResult> {
        None
    }

    fn match_goal_id(&self, id: &str, args: &[String]) -> Option<MatchResult> {
        self.inner.match_goal_id(id, args)
    }

    fn create_goal_id(&self, args: &[String]) -> Result<MatchResult> {
        self.inner.create_goal_id(args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn exact_matches_only_its_name() {
        let m = ExactMatcher::new("build");
        assert_eq!(m.match_string("build").map(|r| r.id), Some("build".into()));
        assert!(m.match_string("builder").is_none());
        assert!(m.match_goal_id("build", &strings(&["x"])).is_none());
    }

    #[test]
    fn kind_prefix_applies_to_ids_not_free_text() {
        let m = KindMatcher::new("Builtin::Task::", ExactMatcher::new("build"));
        let by_name = m.match_string("build").unwrap();
        assert_eq!(by_name.id, "Builtin::Task::build");
        assert!(m.match_goal_id("build", &[]).is_none());
        assert_eq!(
            m.match_goal_id("Builtin::Task::build", &[]).unwrap().id,
            "Builtin::Task::build"
        );
        assert!(m.match_string("Builtin::Task::build").is_none());
    }

    #[test]
    fn prefix_matcher_requires_prefix_everywhere() {
        let m = PrefixMatcher::new("lib::", AlwaysMatcher);
        assert!(m.match_string("core").is_none());
        let found = m.match_string("lib::core").unwrap();
        assert_eq!(found.id, "lib::core");
        assert_eq!(found.args, strings(&["core"]));
        let created = m.create_goal_id(&strings(&["core"])).unwrap();
        assert_eq!(created, found);
        assert!(m.match_goal_id("lib::core", &strings(&["core"])).is_some());
    }

    #[test]
    fn make_matcher_checks_arity() {
        let m = MakeMatcher::new(2, |args| format!("{}-{}", args[0], args[1]));
        assert!(m.match_string("a-b").is_none());
        let created = m.create_goal_id(&strings(&["a", "b"])).unwrap();
        assert_eq!(created.id, "a-b");
        assert!(m.match_goal_id("a-b", &strings(&["a", "b"])).is_some());
        assert!(m.match_goal_id("a-b", &strings(&["a"])).is_none());
        assert!(matches!(
            m.create_goal_id(&strings(&["a"])),
            Err(EngineError::InvalidGoal { .. })
        ));
    }

    #[test]
    fn no_string_hides_free_text() {
        let m = NoStringMatcher::new(AlwaysMatcher);
        assert!(m.match_string("x").is_none());
        assert!(m.match_goal_id("x", &strings(&["x"])).is_some());
    }
}
