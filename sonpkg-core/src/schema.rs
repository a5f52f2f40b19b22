//! JSON Schema validation for descriptors
//!
//! One compiled schema per [`DescriptorKind`]. Schemas are taken from the
//! workspace schema directory when present (`<kind>.json`), otherwise the
//! copies bundled with this crate are used.

use anyhow::{anyhow, Context, Result};
use jsonschema::JSONSchema;
use serde_json::Value;
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;
use tracing::debug;

use crate::descriptor::DescriptorKind;

const BUNDLED_SERVICE_SCHEMA: &str = include_str!("../schemas/service-descriptor.json");
const BUNDLED_FUNCTION_SCHEMA: &str = include_str!("../schemas/function-descriptor.json");
const BUNDLED_PACKAGE_SCHEMA: &str = include_str!("../schemas/package-descriptor.json");

const ALL_KINDS: [DescriptorKind; 3] = [
    DescriptorKind::Service,
    DescriptorKind::Function,
    DescriptorKind::Package,
];

/// Validates a parsed document against the schema for its kind
pub trait SchemaValidator: Send + Sync {
    /// `Err` carries one diagnostic line per violation
    fn validate(&self, document: &Value, kind: DescriptorKind) -> Result<(), Vec<String>>;
}

/// [`SchemaValidator`] backed by compiled JSON Schemas
pub struct JsonSchemaValidator {
    schemas: HashMap<DescriptorKind, JSONSchema>,
}

impl JsonSchemaValidator {
    /// Validator using only the bundled schemas
    pub fn bundled() -> Result<Self> {
        let mut schemas = HashMap::new();
        for kind in ALL_KINDS {
            let raw: Value = serde_json::from_str(bundled_source(kind))
                .with_context(|| format!("parsing bundled {} schema", kind.schema_stem()))?;
            schemas.insert(kind, compile(&raw, kind.schema_stem())?);
        }
        Ok(Self { schemas })
    }

    /// Validator preferring `<dir>/<kind>.json` over the bundled schemas
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let mut validator = Self::bundled()?;

        for kind in ALL_KINDS {
            let path = dir.join(format!("{}.json", kind.schema_stem()));
            if !path.is_file() {
                continue;
            }

            let raw: Value = serde_json::from_reader(
                File::open(&path).with_context(|| format!("opening schema {}", path.display()))?,
            )
            .with_context(|| format!("parsing schema {}", path.display()))?;

            debug!("Using workspace schema {} for {}", path.display(), kind);
            validator
                .schemas
                .insert(kind, compile(&raw, &path.display().to_string())?);
        }

        Ok(validator)
    }
}

impl SchemaValidator for JsonSchemaValidator {
    fn validate(&self, document: &Value, kind: DescriptorKind) -> Result<(), Vec<String>> {
        let Some(schema) = self.schemas.get(&kind) else {
            return Err(vec![format!("no schema loaded for {kind}")]);
        };

        schema.validate(document).map_err(|errors| {
            errors
                .map(|err| {
                    let pointer = err.instance_path.to_string();
                    if pointer.is_empty() {
                        err.to_string()
                    } else {
                        format!("{pointer}: {err}")
                    }
                })
                .collect()
        })
    }
}

fn bundled_source(kind: DescriptorKind) -> &'static str {
    match kind {
        DescriptorKind::Service => BUNDLED_SERVICE_SCHEMA,
        DescriptorKind::Function => BUNDLED_FUNCTION_SCHEMA,
        DescriptorKind::Package => BUNDLED_PACKAGE_SCHEMA,
    }
}

fn compile(raw: &Value, origin: &str) -> Result<JSONSchema> {
    JSONSchema::compile(raw).map_err(|err| anyhow!("compiling schema {origin}: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_bundled_service_schema() {
        let validator = JsonSchemaValidator::bundled().unwrap();

        let valid = json!({
            "vendor": "acme",
            "name": "svc",
            "version": "1.0",
            "network_functions": [
                {"vnf_vendor": "acme", "vnf_name": "fw", "vnf_version": "1.0"}
            ]
        });
        assert!(validator.validate(&valid, DescriptorKind::Service).is_ok());

        let invalid = json!({"vendor": "acme", "version": "1.0"});
        let diagnostics = validator
            .validate(&invalid, DescriptorKind::Service)
            .unwrap_err();
        assert!(diagnostics.iter().any(|d| d.contains("name")));
    }

    #[test]
    fn test_function_schema_rejects_bad_units() {
        let validator = JsonSchemaValidator::bundled().unwrap();
        let invalid = json!({
            "vendor": "acme",
            "name": "fw",
            "version": "1.0",
            "virtual_deployment_units": [{"vm_image": "fw.img"}]
        });
        let diagnostics = validator
            .validate(&invalid, DescriptorKind::Function)
            .unwrap_err();
        assert!(diagnostics[0].starts_with("/virtual_deployment_units/0"));
    }

    #[test]
    fn test_workspace_schema_overrides_bundled() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(
            temp_dir.path().join("function-descriptor.json"),
            r#"{"type": "object", "required": ["vendor", "name", "version", "licence"]}"#,
        )
        .unwrap();

        let validator = JsonSchemaValidator::from_dir(temp_dir.path()).unwrap();
        let document = json!({"vendor": "acme", "name": "fw", "version": "1.0"});

        assert!(validator
            .validate(&document, DescriptorKind::Function)
            .is_err());
        // Kinds without an override keep the bundled schema
        let service = json!({"vendor": "acme", "name": "svc", "version": "1.0"});
        assert!(validator.validate(&service, DescriptorKind::Service).is_ok());
    }
}
