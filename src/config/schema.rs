use crate::gradle::{
    ParserChoice, Pattern, PlanOptions, PropertyDescriptor, RenderForm, DEFAULT_INDENT,
};
use serde::Deserialize;
use std::fmt;

#[derive(Debug, Deserialize, Default, Clone)]
pub struct OperationConfig {
    #[serde(default)]
    pub meta: Metadata,
    #[serde(default)]
    pub operations: Vec<OperationDefinition>,
}

impl OperationConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();

        if self.operations.is_empty() {
            issues.push(ValidationIssue::EmptyOperationList);
        }

        if let Some(indent) = &self.meta.indent {
            if indent.is_empty() || !indent.chars().all(|c| c == ' ' || c == '\t') {
                issues.push(ValidationIssue::InvalidCombo {
                    operation_id: None,
                    message: "meta.indent must be non-empty spaces or tabs".to_string(),
                });
            }
        }

        for operation in &self.operations {
            let id = || Some(operation.id.clone());
            if operation.id.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    operation_id: None,
                    field: "id",
                });
            }
            if operation.file.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    operation_id: id(),
                    field: "file",
                });
            }

            if let Err(err) = operation
                .target
                .validate()
                .and_then(|()| operation.target.chain().map(|_| ()))
            {
                issues.push(ValidationIssue::InvalidCombo {
                    operation_id: id(),
                    message: format!("target: {err}"),
                });
            }

            if operation.properties.is_empty() {
                issues.push(ValidationIssue::MissingField {
                    operation_id: id(),
                    field: "properties",
                });
            }
            for property in &operation.properties {
                if let Err(message) = property.to_descriptor() {
                    issues.push(ValidationIssue::InvalidCombo {
                        operation_id: id(),
                        message,
                    });
                }
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }

    pub fn plan_options(&self) -> PlanOptions {
        PlanOptions {
            indent_unit: self
                .meta
                .indent
                .clone()
                .unwrap_or_else(|| DEFAULT_INDENT.to_string()),
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct Metadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Indentation unit when a file gives no hint.
    #[serde(default)]
    pub indent: Option<String>,
    #[serde(default)]
    pub parser: ParserChoice,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OperationDefinition {
    pub id: String,
    /// Build script path, relative to the project root.
    pub file: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Block path to inject into; empty means the top level.
    #[serde(default)]
    pub target: Pattern,
    #[serde(default)]
    pub properties: Vec<PropertySpec>,
}

impl OperationDefinition {
    /// Converted properties. Fails only for configs that skipped validation.
    pub fn descriptors(&self) -> Result<Vec<PropertyDescriptor>, String> {
        self.properties.iter().map(PropertySpec::to_descriptor).collect()
    }

    /// One-line summary for previews.
    pub fn display_text(&self) -> String {
        match &self.description {
            Some(description) => description.clone(),
            None => {
                let names: Vec<&str> = self.properties.iter().map(|p| p.name.as_str()).collect();
                format!("inject {} into {}", names.join(", "), self.target)
            }
        }
    }
}

/// A property as written in an operation file.
///
/// Exactly one shape applies: `value` + `form` for a line of text, `block`
/// for a nested block, or neither for a bare name such as `google()`.
#[derive(Debug, Deserialize, Clone)]
pub struct PropertySpec {
    pub name: String,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub form: Option<RenderForm>,
    #[serde(default)]
    pub block: Option<Vec<PropertySpec>>,
}

impl PropertySpec {
    pub fn to_descriptor(&self) -> Result<PropertyDescriptor, String> {
        let descriptor = match (&self.value, &self.form, &self.block) {
            (Some(_), _, Some(_)) => {
                return Err(format!(
                    "property '{}' has both `value` and `block`",
                    self.name
                ))
            }
            (None, Some(_), _) => {
                return Err(format!(
                    "property '{}' has `form` without `value`",
                    self.name
                ))
            }
            (Some(_), None, None) => {
                return Err(format!(
                    "property '{}' needs `form = \"statement\"` or `form = \"property\"`",
                    self.name
                ))
            }
            (Some(value), Some(RenderForm::Statement), None) => {
                PropertyDescriptor::statement(&self.name, value)
            }
            (Some(value), Some(RenderForm::Property), None) => {
                PropertyDescriptor::property(&self.name, value)
            }
            (None, None, Some(children)) => PropertyDescriptor::block(
                &self.name,
                children
                    .iter()
                    .map(PropertySpec::to_descriptor)
                    .collect::<Result<_, _>>()?,
            ),
            (None, None, None) => PropertyDescriptor::statement(&self.name, ""),
        };
        descriptor.validate().map_err(|err| err.to_string())?;
        Ok(descriptor)
    }
}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, issue) in self.issues.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone)]
pub enum ValidationIssue {
    EmptyOperationList,
    MissingField {
        operation_id: Option<String>,
        field: &'static str,
    },
    InvalidCombo {
        operation_id: Option<String>,
        message: String,
    },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::EmptyOperationList => {
                write!(f, "operation file contains no operations")
            }
            ValidationIssue::MissingField {
                operation_id,
                field,
            } => match operation_id {
                Some(id) => write!(f, "operation '{id}' missing required field '{field}'"),
                None => write!(f, "operation missing required field '{field}'"),
            },
            ValidationIssue::InvalidCombo {
                operation_id,
                message,
            } => match operation_id {
                Some(id) => write!(f, "operation '{id}' has invalid configuration: {message}"),
                None => write!(f, "invalid operation configuration: {message}"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gradle::PropertyValue;

    fn property_spec(name: &str) -> PropertySpec {
        PropertySpec {
            name: name.to_string(),
            value: None,
            form: None,
            block: None,
        }
    }

    #[test]
    fn text_property_requires_form() {
        let mut property = property_spec("implementation");
        property.value = Some("'a:b:1'".to_string());
        assert!(property.to_descriptor().unwrap_err().contains("form"));

        property.form = Some(RenderForm::Statement);
        assert_eq!(
            property.to_descriptor().unwrap(),
            PropertyDescriptor::statement("implementation", "'a:b:1'")
        );
    }

    #[test]
    fn bare_name_and_nested_block() {
        let bare = property_spec("google()");
        assert_eq!(
            bare.to_descriptor().unwrap(),
            PropertyDescriptor::statement("google()", "")
        );

        let mut url = property_spec("url");
        url.value = Some("'https://example.invalid'".to_string());
        url.form = Some(RenderForm::Statement);
        let mut maven = property_spec("maven");
        maven.block = Some(vec![url]);
        match maven.to_descriptor().unwrap().value {
            PropertyValue::Block(children) => assert_eq!(children.len(), 1),
            other => panic!("expected block, got {other:?}"),
        }
    }

    #[test]
    fn conflicting_shapes_rejected() {
        let mut property = property_spec("maven");
        property.value = Some("x".to_string());
        property.form = Some(RenderForm::Statement);
        property.block = Some(Vec::new());
        assert!(property.to_descriptor().is_err());

        let mut formless = property_spec("x");
        formless.form = Some(RenderForm::Property);
        assert!(formless.to_descriptor().is_err());
    }

    #[test]
    fn display_text_falls_back_to_summary() {
        let operation = OperationDefinition {
            id: "deps".to_string(),
            file: "build.gradle".to_string(),
            description: None,
            target: Pattern::from_path(["dependencies"]),
            properties: vec![property_spec("google()")],
        };
        assert_eq!(
            operation.display_text(),
            "inject google() into {dependencies: {}}"
        );
    }
}
