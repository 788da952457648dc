//! Recipe file (`trellis.toml`) loading and discovery.
//!
//! ```toml
//! [settings]
//! jobs = 4
//! journal = "build/.journal"
//!
//! [[task]]
//! name = "default"
//! deps = ["app"]
//!
//! [[task]]
//! name = "app"
//! command = "cc -o app main.c"
//! files = ["main.c"]
//!
//! [[oracle]]
//! name = "compiler"
//! command = "cc --version"
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use trellis_rules::RuleKind;

/// File name searched for when no `--file` is given.
pub const RECIPE_FILE: &str = "trellis.toml";

/// A parsed recipe file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecipeFile {
    #[serde(default)]
    pub settings: Settings,
    #[serde(default, rename = "task")]
    pub tasks: Vec<GoalDecl>,
    #[serde(default, rename = "phony")]
    pub phonies: Vec<GoalDecl>,
    #[serde(default, rename = "oracle")]
    pub oracles: Vec<GoalDecl>,
}

/// The `[settings]` table. Command-line flags take precedence.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    pub jobs: Option<usize>,
    pub journal: Option<PathBuf>,
}

/// One declared goal.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GoalDecl {
    pub name: String,
    /// Shell command run from the project root; its trimmed stdout is the result.
    pub command: Option<String>,
    /// Other declared goals this one needs.
    #[serde(default)]
    pub deps: Vec<String>,
    /// Files (relative to the project root) whose contents this goal depends on.
    #[serde(default)]
    pub files: Vec<PathBuf>,
}

impl RecipeFile {
    /// Read and validate the recipe file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let file: RecipeFile = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        file.validate()
            .with_context(|| format!("Invalid recipe file {}", path.display()))?;
        Ok(file)
    }

    /// Every declaration with its rule kind, in file order.
    pub fn declarations(&self) -> impl Iterator<Item = (RuleKind, &GoalDecl)> {
        let tasks = self.tasks.iter().map(|d| (RuleKind::Task, d));
        let phonies = self.phonies.iter().map(|d| (RuleKind::Phony, d));
        let oracles = self.oracles.iter().map(|d| (RuleKind::Oracle, d));
        tasks.chain(phonies).chain(oracles)
    }

    /// Names must be unique and non-empty, and deps must name declared goals.
    fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        for (_, decl) in self.declarations() {
            if decl.name.is_empty() {
                bail!("goal with an empty name");
            }
            if !names.insert(decl.name.as_str()) {
                bail!("goal '{}' is declared more than once", decl.name);
            }
        }
        for (_, decl) in self.declarations() {
            if let Some(missing) = decl.deps.iter().find(|d| !names.contains(d.as_str())) {
                bail!("goal '{}' depends on undeclared goal '{missing}'", decl.name);
            }
        }
        Ok(())
    }
}

/// Locate the recipe file: `explicit` if given, else the nearest
/// `trellis.toml` in `start` or one of its ancestors.
///
/// Returns the project root (the file's directory) and the file path.
pub fn find_recipe_file(start: &Path, explicit: Option<&Path>) -> Result<(PathBuf, PathBuf)> {
    if let Some(path) = explicit {
        let path = start.join(path);
        if !path.is_file() {
            bail!("Recipe file {} not found", path.display());
        }
        let root = path.parent().map_or_else(|| start.to_path_buf(), Path::to_path_buf);
        return Ok((root, path));
    }

    let mut dir = start.to_path_buf();
    loop {
        let candidate = dir.join(RECIPE_FILE);
        if candidate.is_file() {
            return Ok((dir, candidate));
        }
        if !dir.pop() {
            bail!("Could not find {RECIPE_FILE} in {} or any parent directory", start.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Result<RecipeFile> {
        let file: RecipeFile = toml::from_str(text)?;
        file.validate()?;
        Ok(file)
    }

    #[test]
    fn parses_all_tables() {
        let file = parse(
            r#"
            [settings]
            jobs = 2

            [[task]]
            name = "app"
            command = "make app"
            deps = ["version"]
            files = ["main.c"]

            [[phony]]
            name = "default"
            deps = ["app"]

            [[oracle]]
            name = "version"
            command = "git describe"
            "#,
        )
        .unwrap();
        assert_eq!(file.settings.jobs, Some(2));
        let kinds: Vec<_> = file.declarations().map(|(k, d)| (k, d.name.as_str())).collect();
        assert_eq!(
            kinds,
            [
                (RuleKind::Task, "app"),
                (RuleKind::Phony, "default"),
                (RuleKind::Oracle, "version"),
            ]
        );
        assert_eq!(file.tasks[0].files, [PathBuf::from("main.c")]);
    }

    #[test]
    fn rejects_duplicate_names() {
        let err = parse("[[task]]\nname = \"a\"\n[[oracle]]\nname = \"a\"\n").unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn rejects_unknown_deps() {
        let err = parse("[[task]]\nname = \"a\"\ndeps = [\"b\"]\n").unwrap_err();
        assert!(err.to_string().contains("undeclared goal 'b'"));
    }

    #[test]
    fn rejects_unknown_keys() {
        assert!(parse("[[task]]\nname = \"a\"\ncmd = \"x\"\n").is_err());
    }

    #[test]
    fn finds_file_in_ancestors() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(RECIPE_FILE), "").unwrap();
        let nested = dir.path().join("src/deep");
        std::fs::create_dir_all(&nested).unwrap();

        let (root, path) = find_recipe_file(&nested, None).unwrap();
        assert_eq!(root, dir.path());
        assert_eq!(path, dir.path().join(RECIPE_FILE));
    }

    #[test]
    fn explicit_file_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        assert!(find_recipe_file(dir.path(), Some(Path::new("other.toml"))).is_err());
        std::fs::write(dir.path().join("other.toml"), "").unwrap();
        let (root, _) = find_recipe_file(dir.path(), Some(Path::new("other.toml"))).unwrap();
        assert_eq!(root, dir.path());
    }
}
