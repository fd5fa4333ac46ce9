//! `{NAME}` template substitution for camera and output pipelines.
//!
//! Only names present in the context are replaced. Anything else between
//! braces is kept verbatim, since GStreamer caps use braces for lists
//! (`format={ RGB, BGR }`).

use regex::{Captures, Regex};
use std::collections::HashMap;
use std::sync::LazyLock;

/// Matches `{NAME}` where NAME is upper-case with digits and underscores.
static TEMPLATE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([A-Z][A-Z0-9_]*)\}").unwrap());

/// Named values available to a template.
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    vars: HashMap<String, String>,
}

impl TemplateContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a variable
    pub fn with_var(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    /// Replace every known `{NAME}` in one pass. Substituted values are not
    /// rescanned.
    pub fn substitute(&self, input: &str) -> String {
        TEMPLATE_PATTERN
            .replace_all(input, |caps: &Captures| match self.vars.get(&caps[1]) {
                Some(value) => value.clone(),
                None => caps[0].to_string(),
            })
            .into_owned()
    }

    /// Names referenced by `input` that this context cannot resolve.
    pub fn unresolved<'a>(&self, input: &'a str) -> Vec<&'a str> {
        TEMPLATE_PATTERN
            .captures_iter(input)
            .filter_map(|caps| caps.get(1))
            .map(|name| name.as_str())
            .filter(|name| !self.vars.contains_key(*name))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_names_replaced() {
        let ctx = TemplateContext::new()
            .with_var("HOST", "10.0.0.5")
            .with_var("PORT", "554");
        assert_eq!(
            ctx.substitute("rtsp://{HOST}:{PORT}/live"),
            "rtsp://10.0.0.5:554/live"
        );
    }

    #[test]
    fn test_unknown_names_and_caps_lists_kept() {
        let ctx = TemplateContext::new().with_var("HOST", "cam");
        let input = "video/x-raw,format={ RGB, BGR } ! {UNKNOWN} ! {HOST}";
        assert_eq!(
            ctx.substitute(input),
            "video/x-raw,format={ RGB, BGR } ! {UNKNOWN} ! cam"
        );
        assert_eq!(ctx.unresolved(input), vec!["UNKNOWN"]);
    }

    #[test]
    fn test_values_not_rescanned() {
        let ctx = TemplateContext::new()
            .with_var("A", "{B}")
            .with_var("B", "b");
        assert_eq!(ctx.substitute("{A}{B}"), "{B}b");
    }

    #[test]
    fn test_repeated_name() {
        let ctx = TemplateContext::new().with_var("W", "640");
        assert_eq!(ctx.substitute("{W}x{W}"), "640x640");
        assert_eq!(ctx.get("W"), Some("640"));
        assert_eq!(ctx.get("H"), None);
    }
}
