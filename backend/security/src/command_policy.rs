use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};

use crate::PolicyViolation;

/// Patterns that are refused regardless of configuration.
const DANGEROUS_PATTERNS: &[&str] = &[
    r"rm\s+(-rf?|--recursive)\s+/",
    r"mkfs",
    r"dd\s+if=.*of=/dev",
    r":\(\)\s*\{|fork\s*bomb",
    r"chmod\s+777\s+/",
    r">\s*/dev/sda",
];

static DANGEROUS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    DANGEROUS_PATTERNS
        .iter()
        .filter_map(|p| compile(p).ok().map(|re| (*p, re)))
        .collect()
});

fn compile(pattern: &str) -> Result<Regex, PolicyViolation> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| PolicyViolation::InvalidPattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })
}

/// Screens shell commands before they reach a shell.
///
/// Built-in destructive patterns always apply. `blocked` patterns refuse a
/// match; a non-empty `allowed` list refuses anything that matches none.
#[derive(Debug, Clone, Default)]
pub struct CommandPolicy {
    blocked: Vec<Regex>,
    allowed: Vec<Regex>,
}

impl CommandPolicy {
    pub fn new<B, A>(blocked: B, allowed: A) -> Result<Self, PolicyViolation>
    where
        B: IntoIterator,
        B::Item: AsRef<str>,
        A: IntoIterator,
        A::Item: AsRef<str>,
    {
        Ok(Self {
            blocked: blocked
                .into_iter()
                .map(|p| compile(p.as_ref()))
                .collect::<Result<_, _>>()?,
            allowed: allowed
                .into_iter()
                .map(|p| compile(p.as_ref()))
                .collect::<Result<_, _>>()?,
        })
    }

    pub fn check(&self, command: &str) -> Result<(), PolicyViolation> {
        if command.trim().is_empty() {
            return Err(PolicyViolation::EmptyCommand);
        }

        if let Some((pattern, _)) = DANGEROUS.iter().find(|(_, re)| re.is_match(command)) {
            return Err(PolicyViolation::DangerousCommand((*pattern).to_string()));
        }

        if let Some(re) = self.blocked.iter().find(|re| re.is_match(command)) {
            return Err(PolicyViolation::BlockedCommand(re.as_str().to_string()));
        }

        if !self.allowed.is_empty() && !self.allowed.iter().any(|re| re.is_match(command)) {
            return Err(PolicyViolation::NotAllowed);
        }

        Ok(())
    }
}

/// Strip NUL bytes and cap output at `max_chars` characters.
/// Returns the cleaned text and whether it was truncated.
pub fn sanitize_output(output: &str, max_chars: usize) -> (String, bool) {
    let cleaned: String = output.chars().filter(|c| *c != '\0').collect();
    match cleaned.char_indices().nth(max_chars) {
        Some((cut, _)) => (format!("{}\n... (output truncated)", &cleaned[..cut]), true),
        None => (cleaned, false),
    }
}
