//! YAML parser for process definitions

use crate::error::{FlowError, Result};
use crate::models::{DefinitionLimits, ProcessDefinition};
use std::fs;
use std::path::Path;

/// Parse a process definition from a YAML file.
///
/// # Errors
///
/// * `FlowError::Io` - If the file cannot be read
/// * any error returned by [`parse_definition`]
pub fn parse_definition_file<P: AsRef<Path>>(
    path: P,
    limits: &DefinitionLimits,
) -> Result<ProcessDefinition> {
    let content = fs::read_to_string(path)?;
    parse_definition(&content, limits)
}

/// Parse a process definition from a YAML string.
///
/// The expected shape is a top-level `tasks` sequence of `{name, needs?}`
/// entries. Only syntactic and size checks happen here; uniqueness and
/// dependency references are validated when the process graph is built.
///
/// # Errors
///
/// * `FlowError::DefinitionSizeExceeded` - If the text exceeds the size limit
/// * `FlowError::YamlParse` - If the YAML is malformed or lacks `tasks`
/// * `FlowError::EmptyDefinition` - If no tasks are declared
/// * `FlowError::TaskCountExceeded` - If too many tasks are declared
/// * `FlowError::InvalidTaskName` / `FlowError::TaskNameTooLong` - On bad names
///
/// # Example
///
/// ```
/// use flowboard::models::DefinitionLimits;
/// use flowboard::parser::parse_definition;
///
/// let yaml = r#"
/// tasks:
///   - name: A
///   - name: B
///     needs: [A]
/// "#;
///
/// let definition = parse_definition(yaml, &DefinitionLimits::default())?;
/// assert_eq!(definition.tasks.len(), 2);
/// # Ok::<(), flowboard::error::FlowError>(())
/// ```
pub fn parse_definition(content: &str, limits: &DefinitionLimits) -> Result<ProcessDefinition> {
    if content.len() > limits.max_definition_size {
        return Err(FlowError::DefinitionSizeExceeded {
            size: content.len(),
            limit: limits.max_definition_size,
        });
    }

    let definition: ProcessDefinition = serde_yaml::from_str(content)?;

    if definition.tasks.is_empty() {
        return Err(FlowError::EmptyDefinition);
    }

    if definition.tasks.len() > limits.max_task_count {
        return Err(FlowError::TaskCountExceeded {
            count: definition.tasks.len(),
            limit: limits.max_task_count,
        });
    }

    for task in &definition.tasks {
        validate_task_name(&task.name, limits)?;
        for need in task.needs.iter().flatten() {
            validate_task_name(need, limits)?;
        }
    }

    Ok(definition)
}

fn validate_task_name(name: &str, limits: &DefinitionLimits) -> Result<()> {
    if name.trim().is_empty() {
        return Err(FlowError::InvalidTaskName {
            name: name.to_string(),
        });
    }

    if name.chars().count() > limits.max_task_name_len {
        return Err(FlowError::TaskNameTooLong {
            name: name.to_string(),
            max: limits.max_task_name_len,
        });
    }

    Ok(())
}
