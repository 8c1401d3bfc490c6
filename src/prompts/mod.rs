// Prompt templates for the text-generation collaborator
//
// Resolution order:
// 1. Override directory (`workflow.prompts_dir`, `<name>.tera`)
// 2. Builtin - compiled-in default templates

pub mod builtin;

use crate::error::WorkflowError;
use log::{debug, info};
use std::fs;
use std::path::{Path, PathBuf};
use tera::{Context, Tera};

/// Where a loaded prompt came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptSource {
    Override(PathBuf),
    Builtin,
}

/// Compiled prompt templates, one per builtin name
pub struct PromptLibrary {
    tera: Tera,
    sources: Vec<(String, PromptSource)>,
}

impl PromptLibrary {
    /// Library made of the builtin templates only
    pub fn builtin() -> Result<Self, WorkflowError> {
        Self::load(None)
    }

    /// Load the builtin templates, replacing any that have a `<name>.tera` file in `overrides`
    pub fn load(overrides: Option<&Path>) -> Result<Self, WorkflowError> {
        let mut tera = Tera::default();
        let mut sources = Vec::new();

        for name in builtin::list_builtin_templates() {
            let (content, source) = match Self::try_override(overrides, name)? {
                Some((content, path)) => {
                    info!("Prompt '{}' resolved from override {:?}", name, path);
                    (content, PromptSource::Override(path))
                }
                None => {
                    let content = builtin::get_builtin_template(name)
                        .unwrap_or_default()
                        .to_string();
                    (content, PromptSource::Builtin)
                }
            };

            tera.add_raw_template(name, &content).map_err(|e| {
                WorkflowError::Configuration(format!(
                    "Failed to compile prompt '{}': {}",
                    name, e
                ))
            })?;
            sources.push((name.to_string(), source));
        }

        Ok(Self { tera, sources })
    }

    fn try_override(
        dir: Option<&Path>,
        name: &str,
    ) -> Result<Option<(String, PathBuf)>, WorkflowError> {
        let Some(dir) = dir else {
            return Ok(None);
        };
        let path = dir.join(format!("{}.tera", name));
        if !path.exists() {
            return Ok(None);
        }
        debug!("Found prompt override at {:?}", path);
        let content = fs::read_to_string(&path).map_err(|e| {
            WorkflowError::Configuration(format!(
                "Failed to read prompt override {:?}: {}",
                path, e
            ))
        })?;
        Ok(Some((content, path)))
    }

    /// Render a prompt by name
    pub fn render(&self, name: &str, context: &Context) -> Result<String, WorkflowError> {
        self.tera.render(name, context).map_err(|e| {
            // Tera nests the useful message in the error source chain
            let mut message = e.to_string();
            let mut source = std::error::Error::source(&e);
            while let Some(inner) = source {
                message = format!("{}: {}", message, inner);
                source = inner.source();
            }
            WorkflowError::Configuration(format!("Failed to render prompt '{}': {}", name, message))
        })
    }

    /// Where a prompt was loaded from
    pub fn source(&self, name: &str) -> Option<&PromptSource> {
        self.sources
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, source)| source)
    }
}
