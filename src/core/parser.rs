//! GL-005: Recipe loading and structural validation.
//!
//! Accepts JSON or YAML, as a bare step array or a full recipe file, and
//! checks the constraints that need no registry:
//! - Version must be "1.0"
//! - Name must not be empty
//! - Every step names an operation

use super::recipe::{RecipeFile, Step};
use serde::Deserialize;
use std::path::Path;

/// Validation error.
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RecipeDocument {
    Steps(Vec<Step>),
    File(RecipeFile),
}

/// Parse a recipe file from disk.
pub fn parse_recipe_file(path: &Path) -> Result<RecipeFile, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    parse_recipe(&content)
}

/// Parse a recipe from a string.
///
/// Text starting with `[` or `{` is tried as JSON first, then as YAML flow
/// style; anything else is YAML.
pub fn parse_recipe(text: &str) -> Result<RecipeFile, String> {
    let trimmed = text.trim_start();
    let document: RecipeDocument = if trimmed.starts_with('[') || trimmed.starts_with('{') {
        match serde_json::from_str(text) {
            Ok(document) => document,
            Err(json_err) => serde_yaml_ng::from_str(text)
                .map_err(|_| format!("JSON parse error: {}", json_err))?,
        }
    } else {
        serde_yaml_ng::from_str(text).map_err(|e| format!("YAML parse error: {}", e))?
    };
    Ok(match document {
        RecipeDocument::Steps(steps) => RecipeFile::from_steps(steps),
        RecipeDocument::File(file) => file,
    })
}

/// Validate a parsed recipe. Returns a list of errors (empty = valid).
pub fn validate_recipe(recipe: &RecipeFile) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if recipe.version != "1.0" {
        errors.push(ValidationError {
            message: format!("version must be \"1.0\", got \"{}\"", recipe.version),
        });
    }

    if recipe.name.trim().is_empty() {
        errors.push(ValidationError {
            message: "name must not be empty".to_string(),
        });
    }

    for (i, step) in recipe.steps.iter().enumerate() {
        if step.op.trim().is_empty() {
            errors.push(ValidationError {
                message: format!("step {} has no operation name", i + 1),
            });
        }
    }

    errors
}
