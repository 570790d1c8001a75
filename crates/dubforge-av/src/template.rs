//! `{var}` substitution for user-configured command lines.

use std::collections::BTreeMap;
use std::path::Path;

/// Variables available to a command template.
///
/// ```
/// use dubforge_av::TemplateContext;
/// use std::path::Path;
///
/// let ctx = TemplateContext::new()
///     .with_path("source", Path::new("/work/clip.tts.wav"))
///     .with_var("name", "narrator");
///
/// assert_eq!(ctx.substitute("--in={source}"), "--in=/work/clip.tts.wav");
/// assert_eq!(ctx.substitute("{name}-{missing}"), "narrator-{missing}");
/// ```
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    vars: BTreeMap<String, String>,
}

impl TemplateContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_var(mut self, key: &str, value: impl Into<String>) -> Self {
        self.vars.insert(key.to_string(), value.into());
        self
    }

    pub fn with_path(self, key: &str, path: &Path) -> Self {
        self.with_var(key, path.display().to_string())
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.vars.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Replace every `{key}` with its value in a single pass.
    ///
    /// Substituted values are not rescanned. Unknown placeholders and
    /// unbalanced braces are kept verbatim.
    pub fn substitute(&self, template: &str) -> String {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            match after.find('}') {
                Some(close) => {
                    let key = &after[..close];
                    match self.vars.get(key) {
                        Some(value) => out.push_str(value),
                        None => {
                            out.push('{');
                            out.push_str(key);
                            out.push('}');
                        }
                    }
                    rest = &after[close + 1..];
                }
                None => {
                    out.push_str(&rest[open..]);
                    rest = "";
                }
            }
        }
        out.push_str(rest);
        out
    }

    pub fn substitute_all(&self, templates: &[String]) -> Vec<String> {
        templates.iter().map(|t| self.substitute(t)).collect()
    }

    /// Placeholders in `templates` that have no value in this context.
    pub fn unresolved(&self, templates: &[String]) -> Vec<String> {
        let mut missing = Vec::new();
        for template in templates {
            let mut rest = template.as_str();
            while let Some(open) = rest.find('{') {
                let after = &rest[open + 1..];
                let Some(close) = after.find('}') else { break };
                let key = &after[..close];
                if !self.vars.contains_key(key) && !missing.iter().any(|m| m == key) {
                    missing.push(key.to_string());
                }
                rest = &after[close + 1..];
            }
        }
        missing
    }
}
