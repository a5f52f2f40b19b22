//! Package assembly
//!
//! Drives one packaging run through a fixed sequence of stages:
//!
//! ```text
//! Init ─► ServiceLoaded ─► LocalComponentsPackaged ─┬─────────────────────────► Finalized
//!                                                   └► ExternalResolutionPending ┬► Finalized
//!                                                                                └► Failed
//! ```
//!
//! Any stage can end in `Failed`. There are no retries: external resolution
//! runs at most once, and the archive is only written after every required
//! component has been packaged and the package descriptor validated.

use anyhow::Context;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use crate::archive::write_archive;
use crate::catalogue::{CatalogueClient, HttpCatalogueClient};
use crate::collector::ArtifactCollector;
use crate::config::{Project, Workspace};
use crate::dependencies::{DependencyRegistry, DependencyState, Registration, Satisfaction};
use crate::descriptor::{DescriptorKind, FunctionDescriptor, ServiceDescriptor};
use crate::error::{PackageError, Result};
use crate::loader::load_descriptor;
use crate::manifest::{
    function_content_type, service_content_type, PackageContentEntry, PackageDescriptor,
    DEFAULT_DESCRIPTOR_VERSION,
};
use crate::resolver::{ResolutionReport, Resolver, WorkspaceCache};
use crate::schema::{JsonSchemaValidator, SchemaValidator};
use crate::staging::{StagingTree, FUNCTION_DIR, SERVICE_DIR};

/// Default destination directory inside the project
pub const DEFAULT_TARGET_DIR: &str = "target";

/// Pipeline stages of a packaging run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Init,
    ServiceLoaded,
    LocalComponentsPackaged,
    ExternalResolutionPending,
    Finalized,
    Failed,
}

/// What a successful run produced
#[derive(Debug)]
pub struct PackageReport {
    /// The `.son` archive
    pub archive: PathBuf,
    /// The manifest inside the staging tree
    pub manifest: PathBuf,
    pub descriptor: PackageDescriptor,
    /// Problems that were skipped over
    pub warnings: Vec<PackageError>,
    /// Present when some components had to come from outside the project
    pub resolution: Option<ResolutionReport>,
}

/// Assembles a package from a project
pub struct Packager {
    project: Project,
    extension: String,
    destination: Option<PathBuf>,
    descriptor_version: String,
    verify_image_urls: bool,
    validator: Box<dyn SchemaValidator>,
    resolver: Resolver,

    stage: Stage,
    registry: DependencyRegistry,
    content: Vec<PackageContentEntry>,
    warnings: Vec<PackageError>,
}

impl Packager {
    /// Packager wired to the workspace's schemas and catalogue servers
    pub fn new(project: Project, workspace: &Workspace) -> anyhow::Result<Self> {
        let validator = JsonSchemaValidator::from_dir(&workspace.schemas_dir())
            .context("Failed to load descriptor schemas")?;

        let mut catalogues: Vec<Box<dyn CatalogueClient>> = Vec::new();
        for server in &workspace.config.catalogue_servers {
            let client = HttpCatalogueClient::new(&server.url).with_context(|| {
                format!("Failed to create client for catalogue server '{}'", server.id)
            })?;
            catalogues.push(Box::new(client));
        }

        let cache = WorkspaceCache::new(workspace.cache_dir(), workspace.descriptor_extension());

        Ok(Self {
            project,
            extension: workspace.descriptor_extension().to_string(),
            destination: None,
            descriptor_version: DEFAULT_DESCRIPTOR_VERSION.to_string(),
            verify_image_urls: workspace.config.verify_image_urls,
            validator: Box::new(validator),
            resolver: Resolver::new(cache, catalogues),
            stage: Stage::Init,
            registry: DependencyRegistry::new(),
            content: Vec::new(),
            warnings: Vec::new(),
        })
    }

    /// Write into `destination` instead of `<project>/target`
    pub fn with_destination(mut self, destination: impl Into<PathBuf>) -> Self {
        self.destination = Some(destination.into());
        self
    }

    pub fn with_descriptor_version(mut self, version: &str) -> Self {
        self.descriptor_version = version.to_string();
        self
    }

    /// Replace the configured catalogue servers (priority order)
    pub fn with_catalogues(mut self, catalogues: Vec<Box<dyn CatalogueClient>>) -> Self {
        let cache = self.resolver.cache().clone();
        self.resolver = Resolver::new(cache, catalogues);
        self
    }

    pub fn with_validator(mut self, validator: Box<dyn SchemaValidator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_image_url_checks(mut self, enabled: bool) -> Self {
        self.verify_image_urls = enabled;
        self
    }

    /// Directory that receives the staging tree and the archive
    pub fn destination(&self) -> PathBuf {
        self.destination
            .clone()
            .unwrap_or_else(|| self.project.root.join(DEFAULT_TARGET_DIR))
    }

    /// Run the pipeline and write `<destination>/<name>.son`
    pub async fn package(mut self, name: &str) -> Result<PackageReport> {
        match self.run(name).await {
            Ok(report) => {
                self.advance(Stage::Finalized);
                Ok(report)
            }
            Err(e) => {
                self.advance(Stage::Failed);
                error!("Packaging failed: {}", e);
                Err(e)
            }
        }
    }

    async fn run(&mut self, name: &str) -> Result<PackageReport> {
        let staging = StagingTree::new(self.prepare_destination()?);

        self.load_service(&staging)?;
        self.advance(Stage::ServiceLoaded);

        info!("Packaging VNF descriptors from project source...");
        let functions_dir = self.project.functions_dir();
        for (dir, component) in component_dirs(&functions_dir)? {
            self.package_component(&staging, &dir, &component).await?;
        }
        self.advance(Stage::LocalComponentsPackaged);

        let mut resolution = None;
        let pending = self.registry.unsatisfied();
        if !pending.is_empty() {
            self.advance(Stage::ExternalResolutionPending);
            info!("Solving dependencies for {} VNF descriptor(s)...", pending.len());

            let mut report = self.resolver.resolve(&pending).await;
            self.warnings.append(&mut report.warnings);

            info!("Packaging VNF descriptors from external source...");
            for (id, _) in &report.resolved {
                let dir = self.resolver.cache().entry_path(id)?;
                self.package_component(&staging, &dir, id.as_str()).await?;
            }
            resolution = Some(report);

            let unresolved: Vec<_> = self.registry.unsatisfied().into_iter().collect();
            if !unresolved.is_empty() {
                return Err(PackageError::UnresolvedDependency { ids: unresolved });
            }
        }

        self.finalize(&staging, name, resolution)
    }

    fn advance(&mut self, next: Stage) {
        debug!("Packaging stage {:?} -> {:?}", self.stage, next);
        self.stage = next;
    }

    /// Create the destination, refusing to merge into a non-empty one
    ///
    /// The default `<project>/target` is owned by the packager and is
    /// cleared on every run.
    fn prepare_destination(&self) -> Result<PathBuf> {
        let destination = self.destination();

        match &self.destination {
            Some(_) if destination.is_dir() => {
                let mut entries =
                    std::fs::read_dir(&destination).map_err(|e| PackageError::io(&destination, e))?;
                if entries.next().is_some() {
                    return Err(PackageError::DestinationNotEmpty { path: destination });
                }
            }
            None if destination.exists() => {
                std::fs::remove_dir_all(&destination)
                    .map_err(|e| PackageError::io(&destination, e))?;
            }
            _ => {}
        }

        std::fs::create_dir_all(&destination).map_err(|e| PackageError::io(&destination, e))?;
        Ok(destination)
    }

    /// Load, stage and register the service descriptor
    fn load_service(&mut self, staging: &StagingTree) -> Result<()> {
        let service_dir = self.project.service_dir();
        let loaded = load_descriptor(
            &service_dir,
            &self.extension,
            DescriptorKind::Service,
            self.validator.as_ref(),
        )?;
        let service = ServiceDescriptor::from_document(&loaded.document).map_err(|e| {
            PackageError::SchemaViolation {
                path: loaded.path.clone(),
                kind: DescriptorKind::Service,
                diagnostic: e.to_string(),
            }
        })?;

        for id in service.required_components() {
            if self.registry.register(id.clone()) == Registration::Duplicate {
                warn!("Function '{}' is referenced more than once in the service descriptor", id);
                self.warnings.push(PackageError::DuplicateDependency { id });
            }
        }

        let relative = Path::new(SERVICE_DIR).join(&loaded.file_name);
        let entry = staging.stage(&loaded.path, &relative, service_content_type())?;
        self.content.push(entry);

        info!(
            "Loaded service descriptor '{}' requiring {} function(s)",
            loaded.file_name,
            self.registry.len()
        );
        Ok(())
    }

    /// Package one function component found in `dir`
    ///
    /// Problems local to the component are recorded as warnings and the
    /// component is skipped; only staging failures are returned.
    async fn package_component(
        &mut self,
        staging: &StagingTree,
        dir: &Path,
        component: &str,
    ) -> Result<()> {
        let loaded = match load_descriptor(
            dir,
            &self.extension,
            DescriptorKind::Function,
            self.validator.as_ref(),
        ) {
            Ok(loaded) => loaded,
            Err(e) if !e.is_fatal() || matches!(e, PackageError::Parse { .. }) => {
                warn!("Skipping component '{}': {}", component, e);
                self.warnings.push(e);
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let descriptor = match FunctionDescriptor::from_document(&loaded.document) {
            Ok(descriptor) => descriptor,
            Err(e) => {
                let violation = PackageError::SchemaViolation {
                    path: loaded.path.clone(),
                    kind: DescriptorKind::Function,
                    diagnostic: e.to_string(),
                };
                warn!("Skipping component '{}': {}", component, violation);
                self.warnings.push(violation);
                return Ok(());
            }
        };

        let id = descriptor.component_id();
        match self.registry.state(&id) {
            DependencyState::Pending => {}
            DependencyState::Unreferenced => {
                warn!(
                    "VNF id='{}' file='{}' is not referenced in the service descriptor. \
                     It will be excluded from the package",
                    id,
                    loaded.path.display()
                );
                return Ok(());
            }
            DependencyState::Satisfied => {
                warn!("VNF id='{}' was already packaged, ignoring '{}'", id, loaded.path.display());
                self.warnings.push(PackageError::DuplicateDependency { id });
                return Ok(());
            }
        }

        let relative = Path::new(FUNCTION_DIR).join(&loaded.file_name);
        if staging.contains(&relative) {
            warn!(
                "Function descriptor '{}' of '{}' collides with one already packaged",
                loaded.file_name, id
            );
            self.warnings.push(PackageError::ArtifactNameCollision {
                component: component.to_string(),
                name: loaded.file_name.clone(),
            });
            return Ok(());
        }

        let entry = staging.stage(&loaded.path, &relative, function_content_type())?;
        let collected = ArtifactCollector::new(staging, self.verify_image_urls)
            .collect(dir, component, &descriptor)
            .await?;

        self.content.push(entry);
        self.content.extend(collected.entries);
        self.warnings.extend(collected.warnings);

        if self.registry.satisfy(&id) == Satisfaction::Satisfied {
            debug!("Packaged VNF id='{}' from {}", id, dir.display());
        }
        Ok(())
    }

    /// Validate and write the manifest, then the archive
    fn finalize(
        &mut self,
        staging: &StagingTree,
        name: &str,
        resolution: Option<ResolutionReport>,
    ) -> Result<PackageReport> {
        let descriptor = PackageDescriptor::new(
            &self.project.info,
            &self.descriptor_version,
            std::mem::take(&mut self.content),
        );

        let manifest_path = staging.root().join(crate::manifest::MANIFEST_PATH);
        let document = serde_json::to_value(&descriptor).map_err(|e| {
            PackageError::SchemaViolation {
                path: manifest_path.clone(),
                kind: DescriptorKind::Package,
                diagnostic: e.to_string(),
            }
        })?;
        debug!("Validating Package Descriptor");
        self.validator
            .validate(&document, DescriptorKind::Package)
            .map_err(|diagnostics| PackageError::SchemaViolation {
                path: manifest_path,
                kind: DescriptorKind::Package,
                diagnostic: diagnostics.join("\n"),
            })?;

        let manifest = descriptor.write_to(staging.root())?;
        let archive = write_archive(staging.root(), name)?;

        Ok(PackageReport {
            archive,
            manifest,
            descriptor,
            warnings: std::mem::take(&mut self.warnings),
            resolution,
        })
    }
}

/// Component directories under `functions_dir`, sorted by name
fn component_dirs(functions_dir: &Path) -> Result<Vec<(PathBuf, String)>> {
    if !functions_dir.is_dir() {
        debug!("No function sources at {}", functions_dir.display());
        return Ok(Vec::new());
    }

    let entries =
        std::fs::read_dir(functions_dir).map_err(|e| PackageError::io(functions_dir, e))?;

    let mut dirs = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| PackageError::io(functions_dir, e))?;
        let path = entry.path();
        if path.is_dir() {
            let name = entry.file_name().to_string_lossy().into_owned();
            dirs.push((path, name));
        }
    }

    dirs.sort_by(|a, b| a.1.cmp(&b.1));
    Ok(dirs)
}
