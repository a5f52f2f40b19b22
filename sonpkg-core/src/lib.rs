//! Network service package assembly
//!
//! Turns a project (service descriptor plus function components) into a
//! self-contained `.son` package, pulling functions the project does not
//! ship from the workspace cache or the catalogue servers.

pub mod archive;
pub mod catalogue;
pub mod collector;
pub mod config;
pub mod dependencies;
pub mod descriptor;
pub mod digest;
pub mod error;
pub mod loader;
pub mod manifest;
pub mod packager;
pub mod resolver;
pub mod schema;
pub mod staging;

pub use config::{Project, ProjectInfo, Workspace};
pub use descriptor::{ComponentId, DescriptorKind};
pub use error::{PackageError, Result};
pub use manifest::{PackageContentEntry, PackageDescriptor};
pub use packager::{PackageReport, Packager, Stage};
