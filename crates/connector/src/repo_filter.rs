use anyhow::{Context, Result};
use regex::{Regex, RegexBuilder};

/// Inclusion/exclusion globs over `workspace/repo` names. `*` matches any run
/// of characters and `?` a single one; matching ignores case.
#[derive(Debug, Clone, Default)]
pub struct RepoFilter {
    inclusions: Vec<Regex>,
    exclusions: Vec<Regex>,
}

impl RepoFilter {
    pub fn new(inclusions: &[String], exclusions: &[String]) -> Result<Self> {
        Ok(Self {
            inclusions: compile_all(inclusions)?,
            exclusions: compile_all(exclusions)?,
        })
    }

    pub fn allows(&self, full_name: &str) -> bool {
        if !self.inclusions.is_empty()
            && !self.inclusions.iter().any(|glob| glob.is_match(full_name))
        {
            return false;
        }
        !self.exclusions.iter().any(|glob| glob.is_match(full_name))
    }
}

fn compile_all(globs: &[String]) -> Result<Vec<Regex>> {
    globs
        .iter()
        .filter(|glob| !glob.trim().is_empty())
        .map(|glob| compile(glob.trim()))
        .collect()
}

fn compile(glob: &str) -> Result<Regex> {
    let mut pattern = String::with_capacity(glob.len() + 8);
    pattern.push('^');
    for ch in glob.chars() {
        match ch {
            '*' => pattern.push_str(".*"),
            '?' => pattern.push('.'),
            other => pattern.push_str(&regex::escape(&other.to_string())),
        }
    }
    pattern.push('$');
    RegexBuilder::new(&pattern)
        .case_insensitive(true)
        .build()
        .with_context(|| format!("invalid repository pattern {glob:?}"))
}
