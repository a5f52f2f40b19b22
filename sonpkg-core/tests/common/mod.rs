//! Test helper functions for integration tests
//!
//! Builds project and workspace trees on disk and provides an in-memory
//! catalogue server so tests never touch the network.

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use sonpkg_core::catalogue::CatalogueClient;
use sonpkg_core::{ComponentId, Packager, Project, Workspace};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use tempfile::TempDir;

/// Initialize logging for tests (only once per test run)
static INIT: Once = Once::new();

pub fn init_test_logging() {
    INIT.call_once(|| {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

        let _ = tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_test_writer()
                    .with_target(true)
                    .with_level(true),
            )
            .with(tracing_subscriber::filter::EnvFilter::from_default_env())
            .try_init();
    });
}

/// A project and a workspace living in one temporary directory
pub struct Fixture {
    // Held so the directory lives as long as the fixture
    _temp: TempDir,
    pub project_root: PathBuf,
    pub workspace_root: PathBuf,
}

impl Fixture {
    /// Project `demo` whose service references `refs` (vendor, name, version)
    pub fn new(refs: &[(&str, &str, &str)]) -> Result<Self> {
        let temp = TempDir::new()?;
        let project_root = temp.path().join("demo");
        let workspace_root = temp.path().join("workspace");

        fs::create_dir_all(&workspace_root)?;
        fs::write(
            workspace_root.join(Workspace::DESCRIPTOR_NAME),
            "name: test-workspace\ndescriptor_extension: yml\n",
        )?;

        fs::create_dir_all(&project_root)?;
        fs::write(
            project_root.join(Project::DESCRIPTOR_NAME),
            "group: eu.sonata-nfv\n\
             name: demo\n\
             version: 0.1\n\
             maintainer: Jane Doe\n\
             description: Demo service\n",
        )?;

        let fixture = Self {
            _temp: temp,
            project_root,
            workspace_root,
        };
        fixture.write_service(refs)?;
        Ok(fixture)
    }

    pub fn write_service(&self, refs: &[(&str, &str, &str)]) -> Result<()> {
        let dir = self.project_root.join("sources").join("nsd");
        fs::create_dir_all(&dir)?;

        let mut content = String::from("vendor: eu.sonata-nfv\nname: demo-service\nversion: '0.1'\n");
        if !refs.is_empty() {
            content.push_str("network_functions:\n");
            for (i, (vendor, name, version)) in refs.iter().enumerate() {
                content.push_str(&format!(
                    "  - vnf_id: vnf{i}\n    vnf_vendor: {vendor}\n    vnf_name: {name}\n    vnf_version: '{version}'\n"
                ));
            }
        }
        fs::write(dir.join("nsd.yml"), content)?;
        Ok(())
    }

    /// Component `dir` under sources/vnf with one VDU per `(id, vm_image)`
    pub fn write_component(
        &self,
        dir: &str,
        id: (&str, &str, &str),
        vdus: &[(&str, &str)],
    ) -> Result<PathBuf> {
        let component_dir = self.project_root.join("sources").join("vnf").join(dir);
        fs::create_dir_all(&component_dir)?;
        fs::write(
            component_dir.join(format!("{}.yml", id.1)),
            function_yaml(id, vdus),
        )?;
        Ok(component_dir)
    }

    /// Pre-populated workspace cache entry
    pub fn write_cache_entry(&self, id: (&str, &str, &str)) -> Result<PathBuf> {
        let entry = self
            .workspace()?
            .cache_dir()
            .join(ComponentId::new(id.0, id.1, id.2).as_str());
        fs::create_dir_all(&entry)?;
        fs::write(entry.join(format!("{}.yml", id.1)), function_yaml(id, &[]))?;
        Ok(entry)
    }

    pub fn workspace(&self) -> Result<Workspace> {
        Workspace::load(&self.workspace_root)
    }

    pub fn project(&self) -> Result<Project> {
        Ok(Project::load(&self.project_root)?)
    }

    /// Packager with no catalogue servers and no URL checks
    pub fn packager(&self) -> Result<Packager> {
        Ok(Packager::new(self.project()?, &self.workspace()?)?
            .with_catalogues(Vec::new())
            .with_image_url_checks(false))
    }

    pub fn target(&self) -> PathBuf {
        self.project_root.join("target")
    }
}

pub fn function_yaml(id: (&str, &str, &str), vdus: &[(&str, &str)]) -> String {
    let mut content = format!(
        "vendor: {}\nname: {}\nversion: '{}'\n",
        id.0, id.1, id.2
    );
    if !vdus.is_empty() {
        content.push_str("virtual_deployment_units:\n");
        for (vdu, image) in vdus {
            content.push_str(&format!("  - id: {vdu}\n    vm_image: {image}\n"));
        }
    }
    content
}

pub fn function_document(id: (&str, &str, &str), author: &str) -> Value {
    serde_json::json!({
        "vendor": id.0,
        "name": id.1,
        "version": id.2,
        "author": author
    })
}

/// Names of every entry in a `.son` archive
pub fn archive_entries(archive: &Path) -> Result<Vec<String>> {
    let file = fs::File::open(archive)?;
    let mut archive = tar::Archive::new(flate2::read::GzDecoder::new(file));
    let mut names = Vec::new();
    for entry in archive.entries()? {
        names.push(entry?.path()?.to_string_lossy().into_owned());
    }
    Ok(names)
}

/// In-memory catalogue server
pub struct FakeCatalogue {
    url: String,
    alive: bool,
    holds: Vec<(ComponentId, Value)>,
    pub probes: Arc<AtomicUsize>,
    pub queries: Arc<AtomicUsize>,
}

impl FakeCatalogue {
    pub fn new(url: &str, alive: bool) -> Self {
        Self {
            url: url.to_string(),
            alive,
            holds: Vec::new(),
            probes: Arc::new(AtomicUsize::new(0)),
            queries: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn holding(mut self, id: (&str, &str, &str), document: Value) -> Self {
        self.holds.push((ComponentId::new(id.0, id.1, id.2), document));
        self
    }
}

#[async_trait]
impl CatalogueClient for FakeCatalogue {
    fn base_url(&self) -> &str {
        &self.url
    }

    async fn alive(&self) -> bool {
        self.probes.fetch_add(1, Ordering::SeqCst);
        self.alive
    }

    async fn get_function(&self, id: &ComponentId) -> sonpkg_core::Result<Option<Value>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .holds
            .iter()
            .find(|(held, _)| held == id)
            .map(|(_, document)| document.clone()))
    }
}
