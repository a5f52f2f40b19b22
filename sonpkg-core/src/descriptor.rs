//! Service and function descriptor models
//!
//! Descriptors are kept twice: as the raw document (used for schema
//! validation and for writing catalogue answers back to the workspace cache)
//! and as a typed view with the fields the packager needs.

use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

/// The schema families the validator knows about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorKind {
    Service,
    Function,
    Package,
}

impl DescriptorKind {
    /// File stem of the schema for this kind (`<stem>.json`)
    pub fn schema_stem(&self) -> &'static str {
        match self {
            DescriptorKind::Service => "service-descriptor",
            DescriptorKind::Function => "function-descriptor",
            DescriptorKind::Package => "package-descriptor",
        }
    }
}

impl fmt::Display for DescriptorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DescriptorKind::Service => write!(f, "Service descriptor"),
            DescriptorKind::Function => write!(f, "Function descriptor"),
            DescriptorKind::Package => write!(f, "Package descriptor"),
        }
    }
}

/// Component identity: `vendor.name.version`
///
/// Used for dependency tracking, cache directory naming and catalogue
/// lookups. Two descriptors with the same id are the same component
/// regardless of where they were found.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ComponentId {
    key: String,
    vendor: String,
    name: String,
    version: String,
}

impl ComponentId {
    pub fn new(vendor: &str, name: &str, version: &str) -> Self {
        Self {
            key: format!("{vendor}.{name}.{version}"),
            vendor: vendor.to_string(),
            name: name.to_string(),
            version: version.to_string(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.key
    }

    pub fn vendor(&self) -> &str {
        &self.vendor
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

/// A function reference inside a service descriptor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionRef {
    #[serde(default)]
    pub vnf_id: Option<String>,
    pub vnf_vendor: String,
    #[serde(default)]
    pub vnf_name: String,
    #[serde(deserialize_with = "scalar_string")]
    pub vnf_version: String,
}

impl FunctionRef {
    pub fn component_id(&self) -> ComponentId {
        ComponentId::new(&self.vnf_vendor, &self.vnf_name, &self.vnf_version)
    }
}

/// Service descriptor (NSD)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    pub vendor: String,
    pub name: String,
    #[serde(deserialize_with = "scalar_string")]
    pub version: String,
    #[serde(default)]
    pub network_functions: Vec<FunctionRef>,
}

impl ServiceDescriptor {
    pub fn from_document(document: &Value) -> serde_json::Result<Self> {
        serde_json::from_value(document.clone())
    }

    /// Identifiers of every referenced function, in descriptor order
    ///
    /// Entries with an empty `vnf_name` are not references.
    pub fn required_components(&self) -> impl Iterator<Item = ComponentId> + '_ {
        self.network_functions
            .iter()
            .filter(|f| !f.vnf_name.is_empty())
            .map(FunctionRef::component_id)
    }
}

/// One deployment unit of a function, possibly carrying an image reference
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentUnit {
    pub id: String,
    #[serde(default)]
    pub vm_image: Option<String>,
    #[serde(default)]
    pub vm_image_format: Option<String>,
}

impl DeploymentUnit {
    /// Declared image format, `raw` when unspecified
    pub fn image_format(&self) -> &str {
        match self.vm_image_format.as_deref() {
            Some(format) if !format.is_empty() => format,
            _ => "raw",
        }
    }
}

/// Function descriptor (VNFD)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDescriptor {
    pub vendor: String,
    pub name: String,
    #[serde(deserialize_with = "scalar_string")]
    pub version: String,
    #[serde(default)]
    pub virtual_deployment_units: Vec<DeploymentUnit>,
}

impl FunctionDescriptor {
    pub fn from_document(document: &Value) -> serde_json::Result<Self> {
        serde_json::from_value(document.clone())
    }

    pub fn component_id(&self) -> ComponentId {
        ComponentId::new(&self.vendor, &self.name, &self.version)
    }

    /// Deployment units that declare a non-empty image
    pub fn images(&self) -> impl Iterator<Item = (&DeploymentUnit, &str)> {
        self.virtual_deployment_units.iter().filter_map(|vdu| {
            vdu.vm_image
                .as_deref()
                .filter(|image| !image.is_empty())
                .map(|image| (vdu, image))
        })
    }
}

/// Versions are often written unquoted (`version: 0.1`) and parse as numbers
fn scalar_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let value = Value::deserialize(deserializer)?;
    scalar_to_string(&value).ok_or_else(|| {
        de::Error::custom(format!("expected a string or number, found {value}"))
    })
}

pub(crate) fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yaml(content: &str) -> Value {
        serde_yaml_ng::from_str(content).unwrap()
    }

    #[test]
    fn test_service_required_components() {
        let document = yaml(
            r#"
vendor: eu.sonata-nfv
name: sonata-demo
version: "0.2"
network_functions:
  - vnf_id: vnf_firewall
    vnf_vendor: eu.sonata-nfv
    vnf_name: firewall-vnf
    vnf_version: "0.1"
  - vnf_id: vnf_unnamed
    vnf_vendor: eu.sonata-nfv
    vnf_name: ""
    vnf_version: "0.1"
"#,
        );

        let nsd = ServiceDescriptor::from_document(&document).unwrap();
        let ids: Vec<_> = nsd.required_components().collect();
        assert_eq!(ids, vec![ComponentId::new("eu.sonata-nfv", "firewall-vnf", "0.1")]);
        assert_eq!(ids[0].as_str(), "eu.sonata-nfv.firewall-vnf.0.1");
    }

    #[test]
    fn test_unquoted_versions_are_strings() {
        let document = yaml("vendor: acme\nname: fw\nversion: 0.1\n");
        let vnfd = FunctionDescriptor::from_document(&document).unwrap();
        assert_eq!(vnfd.component_id().as_str(), "acme.fw.0.1");
    }

    #[test]
    fn test_service_without_functions() {
        let document = yaml("vendor: acme\nname: empty\nversion: '1.0'\n");
        let nsd = ServiceDescriptor::from_document(&document).unwrap();
        assert_eq!(nsd.required_components().count(), 0);
    }

    #[test]
    fn test_function_images_and_default_format() {
        let document = yaml(
            r#"
vendor: acme
name: fw
version: "1.0"
virtual_deployment_units:
  - id: vdu01
    vm_image: images/fw.img
  - id: vdu02
    vm_image: qcow/
    vm_image_format: qcow2
  - id: vdu03
"#,
        );

        let vnfd = FunctionDescriptor::from_document(&document).unwrap();
        assert_eq!(vnfd.component_id().as_str(), "acme.fw.1.0");

        let images: Vec<_> = vnfd
            .images()
            .map(|(vdu, image)| (vdu.id.as_str(), image, vdu.image_format()))
            .collect();
        assert_eq!(
            images,
            vec![
                ("vdu01", "images/fw.img", "raw"),
                ("vdu02", "qcow/", "qcow2"),
            ]
        );
    }
}
