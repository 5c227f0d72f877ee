//! Offline validation of a workflow definition file, ahead of loading it
//! through the API (spec.md §3 data model invariants: unique slug shape,
//! unique step names, known step types).

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct WorkflowDefinition {
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub webhook_secret: Option<String>,
    #[serde(default)]
    pub steps: Vec<StepDefinition>,
}

#[derive(Debug, Deserialize)]
pub struct StepDefinition {
    pub name: String,
    pub step_type: String,
    #[serde(default)]
    pub config: serde_json::Value,
}

pub fn validate(def: &WorkflowDefinition) -> Result<(), String> {
    if def.name.trim().is_empty() {
        return Err("workflow name must not be empty".to_string());
    }

    if def.slug.is_empty() || def.slug.len() > 100 || !def.slug.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-') {
        return Err(format!("slug `{}` must be 1-100 chars of [a-z0-9-]", def.slug));
    }

    if def.steps.is_empty() {
        return Err("workflow must declare at least one step".to_string());
    }

    let mut seen_names = std::collections::HashSet::new();
    for step in &def.steps {
        if step.name.trim().is_empty() {
            return Err("step name must not be empty".to_string());
        }
        if !seen_names.insert(step.name.as_str()) {
            return Err(format!("duplicate step name `{}`", step.name));
        }
        if step.step_type.parse::<db::models::StepType>().is_err() {
            return Err(format!("step `{}` has unknown step_type `{}`", step.name, step.step_type));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> WorkflowDefinition {
        WorkflowDefinition {
            name: "demo".to_string(),
            slug: "demo-hook".to_string(),
            webhook_secret: None,
            steps: vec![StepDefinition {
                name: "fetch".to_string(),
                step_type: "http".to_string(),
                config: serde_json::json!({"method": "GET", "url": "https://example.com"}),
            }],
        }
    }

    #[test]
    fn valid_definition_passes() {
        assert!(validate(&sample()).is_ok());
    }

    #[test]
    fn rejects_bad_slug() {
        let mut def = sample();
        def.slug = "Not Valid!".to_string();
        assert!(validate(&def).is_err());
    }

    #[test]
    fn rejects_empty_steps() {
        let mut def = sample();
        def.steps.clear();
        assert!(validate(&def).is_err());
    }

    #[test]
    fn rejects_duplicate_step_names() {
        let mut def = sample();
        let dup = StepDefinition { name: "fetch".to_string(), step_type: "transform".to_string(), config: serde_json::Value::Null };
        def.steps.push(dup);
        assert!(validate(&def).is_err());
    }

    #[test]
    fn rejects_unknown_step_type() {
        let mut def = sample();
        def.steps[0].step_type = "ftp".to_string();
        assert!(validate(&def).is_err());
    }
}
