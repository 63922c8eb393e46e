//! # Message Templates
//!
//! Slack message bodies rendered from small markdown templates with
//! `{{ key }}` placeholders. Built-in templates are compiled into the binary
//! and can be overridden per file from a directory.

use regex::{Captures, Regex};
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::LazyLock,
};
use tracing::{debug, info};

#[cfg(test)]
#[path = "templates_tests.rs"]
mod tests;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*(.*?)\s*\}\}").expect("placeholder pattern is valid")
});

/// Template rendering failures. Any failure aborts the whole dispatch.
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("Template '{template}' references '{key}' but no value was supplied")]
    MissingValue { template: &'static str, key: String },

    #[error("Failed to read template {path}: {message}")]
    Io { path: PathBuf, message: String },
}

/// Every message the bridge can send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateKind {
    Help,
    UserTriggered,
    IncidentTriggered,
    IncidentAcknowledged,
    IncidentReassigned,
    IncidentResolved,
    IncidentStatus,
}

impl TemplateKind {
    pub const ALL: [TemplateKind; 7] = [
        Self::Help,
        Self::UserTriggered,
        Self::IncidentTriggered,
        Self::IncidentAcknowledged,
        Self::IncidentReassigned,
        Self::IncidentResolved,
        Self::IncidentStatus,
    ];

    /// File name used when loading overrides from a directory.
    pub fn file_name(&self) -> &'static str {
        match self {
            Self::Help => "msg-help.md",
            Self::UserTriggered => "msg-triggered.md",
            Self::IncidentTriggered => "msg-pd-incident-triggered.md",
            Self::IncidentAcknowledged => "msg-pd-incident-acknowledged.md",
            Self::IncidentReassigned => "msg-pd-incident-reassigned.md",
            Self::IncidentResolved => "msg-pd-incident-resolved.md",
            Self::IncidentStatus => "msg-pd-incident-status.md",
        }
    }

    fn builtin(&self) -> &'static str {
        match self {
            Self::Help => include_str!("../templates/msg-help.md"),
            Self::UserTriggered => include_str!("../templates/msg-triggered.md"),
            Self::IncidentTriggered => include_str!("../templates/msg-pd-incident-triggered.md"),
            Self::IncidentAcknowledged => {
                include_str!("../templates/msg-pd-incident-acknowledged.md")
            }
            Self::IncidentReassigned => include_str!("../templates/msg-pd-incident-reassigned.md"),
            Self::IncidentResolved => include_str!("../templates/msg-pd-incident-resolved.md"),
            Self::IncidentStatus => include_str!("../templates/msg-pd-incident-status.md"),
        }
    }
}

/// Renders [`TemplateKind`] messages.
#[derive(Debug, Clone)]
pub struct TemplateRenderer {
    templates: HashMap<TemplateKind, String>,
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::builtin()
    }
}

impl TemplateRenderer {
    /// Renderer using only the compiled-in templates.
    pub fn builtin() -> Self {
        let templates = TemplateKind::ALL
            .iter()
            .map(|kind| (*kind, kind.builtin().to_string()))
            .collect();
        Self { templates }
    }

    /// Renderer using templates from `dir`, falling back to the built-in
    /// template for any file that does not exist.
    pub fn from_dir(dir: &Path) -> Result<Self, TemplateError> {
        let mut renderer = Self::builtin();
        for kind in TemplateKind::ALL {
            let path = dir.join(kind.file_name());
            match std::fs::read_to_string(&path) {
                Ok(content) => {
                    debug!(path = %path.display(), "Loaded template override");
                    renderer.templates.insert(kind, content);
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(TemplateError::Io {
                        path,
                        message: e.to_string(),
                    })
                }
            }
        }
        info!(dir = %dir.display(), "Template overrides loaded");
        Ok(renderer)
    }

    /// Replace a single template.
    pub fn with_template(mut self, kind: TemplateKind, content: impl Into<String>) -> Self {
        self.templates.insert(kind, content.into());
        self
    }

    /// Render `kind`, substituting each placeholder from `values` in one pass.
    ///
    /// Substituted values are never re-scanned for placeholders.
    pub fn render(&self, kind: TemplateKind, values: &[(&str, &str)]) -> Result<String, TemplateError> {
        let template = self
            .templates
            .get(&kind)
            .map(String::as_str)
            .unwrap_or_else(|| kind.builtin());

        let mut missing = None;
        let rendered = PLACEHOLDER.replace_all(template, |caps: &Captures<'_>| {
            let key = &caps[1];
            match values.iter().find(|(name, _)| *name == key) {
                Some((_, value)) => (*value).to_string(),
                None => {
                    missing.get_or_insert_with(|| key.to_string());
                    String::new()
                }
            }
        });

        if let Some(key) = missing {
            return Err(TemplateError::MissingValue {
                template: kind.file_name(),
                key,
            });
        }

        Ok(rendered.trim_end().to_string())
    }
}
