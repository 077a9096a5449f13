use std::collections::HashMap;

use crate::core::error::{LauncherError, LauncherResult};

/// Values for `${name}` placeholders in argument templates.
#[derive(Debug, Clone, Default)]
pub struct Substitutions {
    values: HashMap<&'static str, String>,
}

impl Substitutions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, name: &'static str, value: impl Into<String>) -> &mut Self {
        self.values.insert(name, value.into());
        self
    }

    /// Bind only non-blank values, so an empty credential stays unbound.
    pub fn bind_present(&mut self, name: &'static str, value: &str) -> &mut Self {
        if !value.trim().is_empty() {
            self.values.insert(name, value.to_string());
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Replace every `${name}` in `template`. An unterminated `${` is kept
    /// as written.
    pub fn apply(&self, template: &str) -> LauncherResult<String> {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(start) = rest.find("${") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let Some(end) = after.find('}') else {
                out.push_str(&rest[start..]);
                return Ok(out);
            };
            let name = &after[..end];
            let value = self
                .get(name)
                .ok_or_else(|| LauncherError::MissingSubstitution(name.to_string()))?;
            out.push_str(value);
            rest = &after[end + 1..];
        }

        out.push_str(rest);
        Ok(out)
    }

    pub fn apply_all(&self, templates: &[String]) -> LauncherResult<Vec<String>> {
        templates.iter().map(|t| self.apply(t)).collect()
    }
}
