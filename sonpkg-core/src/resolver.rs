//! Resolution of components missing from the project source
//!
//! Sources are tried in a fixed priority order and the first one that can
//! provide a component wins:
//!
//! 1. the workspace cache (a directory named by the component id)
//! 2. each configured catalogue server, in configuration order
//!
//! Catalogue answers are written into the cache so the packager only ever
//! loads external components from one place. Cache hits are not validated
//! here; the packager validates every descriptor when it loads it.

use serde_json::Value;
use std::collections::BTreeSet;
use std::io::{ErrorKind, Write};
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::catalogue::CatalogueClient;
use crate::descriptor::{ComponentId, DescriptorKind, FunctionDescriptor};
use crate::error::{PackageError, Result};
use crate::loader::locate_descriptor;
use crate::staging::is_path_segment;

/// Where a resolved component came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionSource {
    Cache,
    /// Catalogue server base URL
    Catalogue(String),
}

/// Outcome of one resolution pass
#[derive(Debug, Default)]
pub struct ResolutionReport {
    pub resolved: Vec<(ComponentId, ResolutionSource)>,
    pub unresolved: Vec<ComponentId>,
    /// Non-fatal problems (dead servers, failed requests)
    pub warnings: Vec<PackageError>,
}

impl ResolutionReport {
    pub fn is_complete(&self) -> bool {
        self.unresolved.is_empty()
    }
}

/// Result of writing a catalogue answer into the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheWrite {
    Created,
    /// Another writer created the entry first; it was left untouched
    AlreadyPresent,
}

/// Workspace cache of function descriptors, one directory per component id
#[derive(Debug, Clone)]
pub struct WorkspaceCache {
    dir: PathBuf,
    extension: String,
}

impl WorkspaceCache {
    pub fn new(dir: impl Into<PathBuf>, extension: &str) -> Self {
        Self {
            dir: dir.into(),
            extension: extension.to_string(),
        }
    }

    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }

    /// Directory of the cache entry for `id`
    ///
    /// Ids whose key is not a single path component are refused so an entry
    /// can never land outside the cache directory.
    pub fn entry_path(&self, id: &ComponentId) -> Result<PathBuf> {
        if !is_path_segment(id.as_str()) {
            return Err(PackageError::UnsafePath {
                root: self.dir.clone(),
                path: id.as_str().to_string(),
            });
        }
        Ok(self.dir.join(id.as_str()))
    }

    /// Whether the entry for `id` holds a descriptor
    ///
    /// An entry directory without one (left behind by an interrupted
    /// write) is not a hit.
    pub fn contains(&self, id: &ComponentId) -> bool {
        self.entry_path(id).is_ok_and(|entry| {
            entry.is_dir()
                && locate_descriptor(&entry, &self.extension, DescriptorKind::Function).is_ok()
        })
    }

    /// Store a descriptor document under `id`
    ///
    /// Creation is create-if-absent: an entry that already holds a
    /// descriptor is never overwritten. The file is named after the id, not
    /// after anything in the document. A half-written file is removed again
    /// so it cannot later pass for a valid cache hit.
    pub fn store(&self, id: &ComponentId, document: &Value) -> Result<CacheWrite> {
        let entry = self.entry_path(id)?;
        if !is_path_segment(id.name()) {
            return Err(PackageError::UnsafePath {
                root: entry,
                path: id.name().to_string(),
            });
        }
        if self.contains(id) {
            return Ok(CacheWrite::AlreadyPresent);
        }

        std::fs::create_dir_all(&entry).map_err(|e| PackageError::io(&entry, e))?;
        let path = entry.join(format!("{}.{}", id.name(), self.extension));

        let content = serde_yaml_ng::to_string(document).map_err(|source| PackageError::Parse {
            path: path.clone(),
            source,
        })?;

        let mut file = match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(CacheWrite::AlreadyPresent),
            Err(e) => return Err(PackageError::io(&path, e)),
        };

        if let Err(e) = file.write_all(content.as_bytes()) {
            drop(file);
            let _ = std::fs::remove_file(&path);
            return Err(PackageError::io(&path, e));
        }

        debug!("Cached {} at {}", id, path.display());
        Ok(CacheWrite::Created)
    }
}

/// Resolves component ids from the cache and the catalogue servers
pub struct Resolver {
    cache: WorkspaceCache,
    catalogues: Vec<Box<dyn CatalogueClient>>,
}

impl Resolver {
    pub fn new(cache: WorkspaceCache, catalogues: Vec<Box<dyn CatalogueClient>>) -> Self {
        Self { cache, catalogues }
    }

    pub fn cache(&self) -> &WorkspaceCache {
        &self.cache
    }

    /// Try to make every id in `ids` available in the workspace cache
    ///
    /// Misses are collected rather than failing early so the caller gets
    /// one report covering every unresolved component.
    pub async fn resolve(&self, ids: &BTreeSet<ComponentId>) -> ResolutionReport {
        let mut report = ResolutionReport::default();
        let mut liveness: Vec<Option<bool>> = vec![None; self.catalogues.len()];

        for id in ids {
            debug!("Probing workspace cache for {}", id);
            if self.cache.contains(id) {
                debug!("Found {} in workspace cache {}", id, self.cache.dir().display());
                report.resolved.push((id.clone(), ResolutionSource::Cache));
                continue;
            }

            debug!("{} is not cached, contacting catalogue servers", id);
            let Some((url, document)) = self
                .first_catalogue_hit(id, &mut liveness, &mut report.warnings)
                .await
            else {
                warn!("Component {} is not present in any catalogue server", id);
                report.unresolved.push(id.clone());
                continue;
            };

            match self.cache.store(id, &document) {
                Ok(outcome) => {
                    if outcome == CacheWrite::AlreadyPresent {
                        debug!("Cache entry for {} appeared concurrently, keeping it", id);
                    }
                    info!("Retrieved {} from catalogue server {}", id, url);
                    report
                        .resolved
                        .push((id.clone(), ResolutionSource::Catalogue(url)));
                }
                Err(e) => {
                    warn!("Failed to cache {}: {}", id, e);
                    report.unresolved.push(id.clone());
                    report.warnings.push(e);
                }
            }
        }

        report
    }

    /// First catalogue server, in priority order, that holds `id`
    ///
    /// Each server is probed for liveness at most once per resolution pass;
    /// dead servers are skipped for every later id.
    async fn first_catalogue_hit(
        &self,
        id: &ComponentId,
        liveness: &mut [Option<bool>],
        warnings: &mut Vec<PackageError>,
    ) -> Option<(String, Value)> {
        if self.catalogues.is_empty() {
            warn!("No catalogue servers available! Please check the workspace configuration.");
            return None;
        }

        for (client, alive) in self.catalogues.iter().zip(liveness.iter_mut()) {
            let url = client.base_url().to_string();

            let is_alive = match *alive {
                Some(known) => known,
                None => {
                    debug!("Contacting catalogue server '{}'", url);
                    let probed = client.alive().await;
                    if !probed {
                        warn!("Catalogue server '{}' is not available", url);
                        warnings.push(PackageError::UnreachableCatalogue {
                            url: url.clone(),
                            reason: "liveness probe failed".to_string(),
                        });
                    }
                    *alive = Some(probed);
                    probed
                }
            };
            if !is_alive {
                continue;
            }

            match client.get_function(id).await {
                Ok(Some(document)) => match describes(&document, id) {
                    Ok(()) => return Some((url, document)),
                    Err(diagnostic) => {
                        warn!("Ignoring answer for {} from '{}': {}", id, url, diagnostic);
                        warnings.push(PackageError::SchemaViolation {
                            path: PathBuf::from(url),
                            kind: DescriptorKind::Function,
                            diagnostic,
                        });
                    }
                },
                Ok(None) => debug!("Catalogue server '{}' does not hold {}", url, id),
                Err(e) => {
                    warn!("Request for {} to '{}' failed: {}", id, url, e);
                    warnings.push(PackageError::UnreachableCatalogue {
                        url,
                        reason: format!("{:#}", anyhow::Error::new(e)),
                    });
                }
            }
        }

        None
    }
}

/// Check that a catalogue answer is the descriptor of `id`
fn describes(document: &Value, id: &ComponentId) -> std::result::Result<(), String> {
    let descriptor = FunctionDescriptor::from_document(document).map_err(|e| e.to_string())?;
    let found = descriptor.component_id();
    if found != *id {
        return Err(format!("descriptor is for {found}, not {id}"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    struct FakeCatalogue {
        url: String,
        alive: bool,
        holds: Vec<(ComponentId, Value)>,
        probes: Arc<AtomicUsize>,
        queries: Arc<AtomicUsize>,
    }

    impl FakeCatalogue {
        fn new(url: &str, alive: bool, holds: Vec<(ComponentId, Value)>) -> Self {
            Self {
                url: url.to_string(),
                alive,
                holds,
                probes: Arc::new(AtomicUsize::new(0)),
                queries: Arc::new(AtomicUsize::new(0)),
            }
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

        async fn get_function(&self, id: &ComponentId) -> Result<Option<Value>> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .holds
                .iter()
                .find(|(held, _)| held == id)
                .map(|(_, document)| document.clone()))
        }
    }

    fn fw() -> ComponentId {
        ComponentId::new("acme", "fw", "1.0")
    }

    fn fw_document(author: &str) -> Value {
        json!({"vendor": "acme", "name": "fw", "version": "1.0", "author": author})
    }

    #[tokio::test]
    async fn test_cache_hit_skips_catalogues() {
        let temp_dir = TempDir::new().unwrap();
        let cache = WorkspaceCache::new(temp_dir.path(), "yml");
        let entry = cache.entry_path(&fw()).unwrap();
        std::fs::create_dir_all(&entry).unwrap();
        std::fs::write(entry.join("fw.yml"), "vendor: acme\nname: fw\nversion: '1.0'\n").unwrap();

        let catalogue = FakeCatalogue::new("http://cat01", true, vec![(fw(), fw_document("cat01"))]);
        let queries = catalogue.queries.clone();
        let resolver = Resolver::new(cache, vec![Box::new(catalogue)]);

        let report = resolver.resolve(&BTreeSet::from([fw()])).await;
        assert_eq!(report.resolved, vec![(fw(), ResolutionSource::Cache)]);
        assert_eq!(queries.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_dead_server_skipped_and_hit_cached() {
        let temp_dir = TempDir::new().unwrap();
        let cache = WorkspaceCache::new(temp_dir.path().join("vnfs"), "yml");

        let dead = FakeCatalogue::new("http://cat01", false, vec![(fw(), fw_document("cat01"))]);
        let dead_queries = dead.queries.clone();
        let live = FakeCatalogue::new("http://cat02", true, vec![(fw(), fw_document("cat02"))]);
        let resolver = Resolver::new(cache.clone(), vec![Box::new(dead), Box::new(live)]);

        let report = resolver.resolve(&BTreeSet::from([fw()])).await;
        assert!(report.is_complete());
        assert_eq!(
            report.resolved,
            vec![(fw(), ResolutionSource::Catalogue("http://cat02".to_string()))]
        );
        assert_eq!(dead_queries.load(Ordering::SeqCst), 0);
        assert!(matches!(
            report.warnings.as_slice(),
            [PackageError::UnreachableCatalogue { .. }]
        ));

        let cached = std::fs::read_to_string(cache.entry_path(&fw()).unwrap().join("fw.yml")).unwrap();
        assert!(cached.contains("author: cat02"));
    }

    #[tokio::test]
    async fn test_first_configured_server_wins() {
        let temp_dir = TempDir::new().unwrap();
        let cache = WorkspaceCache::new(temp_dir.path(), "yml");

        let first = FakeCatalogue::new("http://cat01", true, vec![(fw(), fw_document("cat01"))]);
        let second = FakeCatalogue::new("http://cat02", true, vec![(fw(), fw_document("cat02"))]);
        let second_queries = second.queries.clone();
        let resolver = Resolver::new(cache.clone(), vec![Box::new(first), Box::new(second)]);

        let report = resolver.resolve(&BTreeSet::from([fw()])).await;
        assert_eq!(
            report.resolved,
            vec![(fw(), ResolutionSource::Catalogue("http://cat01".to_string()))]
        );
        assert_eq!(second_queries.load(Ordering::SeqCst), 0);

        let cached = std::fs::read_to_string(cache.entry_path(&fw()).unwrap().join("fw.yml")).unwrap();
        assert!(cached.contains("author: cat01"));
    }

    #[tokio::test]
    async fn test_unresolved_ids_are_collected() {
        let temp_dir = TempDir::new().unwrap();
        let cache = WorkspaceCache::new(temp_dir.path(), "yml");
        let lb = ComponentId::new("acme", "lb", "2.0");

        let catalogue = FakeCatalogue::new("http://cat01", true, vec![(fw(), fw_document("cat01"))]);
        let probes = catalogue.probes.clone();
        let resolver = Resolver::new(cache, vec![Box::new(catalogue)]);

        let report = resolver.resolve(&BTreeSet::from([fw(), lb.clone()])).await;
        assert_eq!(report.unresolved, vec![lb]);
        assert_eq!(report.resolved.len(), 1);
        // Liveness is probed once per pass, not once per id
        assert_eq!(probes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_no_catalogues_leaves_ids_unresolved() {
        let temp_dir = TempDir::new().unwrap();
        let resolver = Resolver::new(WorkspaceCache::new(temp_dir.path(), "yml"), Vec::new());

        let report = resolver.resolve(&BTreeSet::from([fw()])).await;
        assert_eq!(report.unresolved, vec![fw()]);
    }

    #[test]
    fn test_store_never_overwrites() {
        let temp_dir = TempDir::new().unwrap();
        let cache = WorkspaceCache::new(temp_dir.path(), "yml");

        assert_eq!(
            cache.store(&fw(), &fw_document("first")).unwrap(),
            CacheWrite::Created
        );
        assert_eq!(
            cache.store(&fw(), &fw_document("second")).unwrap(),
            CacheWrite::AlreadyPresent
        );

        let cached = std::fs::read_to_string(cache.entry_path(&fw()).unwrap().join("fw.yml")).unwrap();
        assert!(cached.contains("author: first"));
    }

    #[test]
    fn test_store_names_file_after_the_id() {
        let temp_dir = TempDir::new().unwrap();
        let cache_dir = temp_dir.path().join("vnfs");
        let cache = WorkspaceCache::new(&cache_dir, "yml");

        let document = json!({"vendor": "acme", "name": "../escaped", "version": "1.0"});
        assert_eq!(cache.store(&fw(), &document).unwrap(), CacheWrite::Created);

        assert!(!cache_dir.join("escaped.yml").exists());
        assert!(!temp_dir.path().join("escaped.yml").exists());
        assert!(cache.entry_path(&fw()).unwrap().join("fw.yml").is_file());
        assert!(cache.contains(&fw()));
    }

    #[test]
    fn test_empty_entry_is_not_a_hit_and_gets_filled() {
        let temp_dir = TempDir::new().unwrap();
        let cache = WorkspaceCache::new(temp_dir.path(), "yml");
        std::fs::create_dir_all(cache.entry_path(&fw()).unwrap()).unwrap();

        assert!(!cache.contains(&fw()));
        assert_eq!(
            cache.store(&fw(), &fw_document("refill")).unwrap(),
            CacheWrite::Created
        );
        assert!(cache.contains(&fw()));
    }

    #[test]
    fn test_ids_leaving_the_cache_are_refused() {
        let temp_dir = TempDir::new().unwrap();
        let cache = WorkspaceCache::new(temp_dir.path().join("vnfs"), "yml");
        let sneaky = ComponentId::new("..", "..", "x/y");

        assert!(matches!(
            cache.entry_path(&sneaky),
            Err(PackageError::UnsafePath { .. })
        ));
        assert!(!cache.contains(&sneaky));
        assert!(matches!(
            cache.store(&sneaky, &fw_document("sneaky")),
            Err(PackageError::UnsafePath { .. })
        ));
    }

    #[tokio::test]
    async fn test_answer_for_another_component_is_ignored() {
        let temp_dir = TempDir::new().unwrap();
        let cache_dir = temp_dir.path().join("vnfs");
        let cache = WorkspaceCache::new(&cache_dir, "yml");
        let escaping = json!({"vendor": "acme", "name": "../escaped", "version": "1.0"});

        let resolver = Resolver::new(
            cache.clone(),
            vec![
                Box::new(FakeCatalogue::new("http://cat01", true, vec![(fw(), escaping)])),
                Box::new(FakeCatalogue::new("http://cat02", true, vec![(fw(), fw_document("cat02"))])),
            ],
        );
        let report = resolver.resolve(&BTreeSet::from([fw()])).await;

        assert_eq!(
            report.resolved,
            vec![(fw(), ResolutionSource::Catalogue("http://cat02".to_string()))]
        );
        assert!(matches!(
            report.warnings.as_slice(),
            [PackageError::SchemaViolation { .. }]
        ));
        assert!(!cache_dir.join("escaped.yml").exists());
        assert!(!temp_dir.path().join("escaped.yml").exists());
    }
}
