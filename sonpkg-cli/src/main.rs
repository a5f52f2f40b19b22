//! son-package - builds network service packages from a project tree

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use std::path::{Path, PathBuf};
use tabled::{
    settings::{object::Rows, Alignment, Modify, Style},
    Table, Tabled,
};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use sonpkg_core::{PackageContentEntry, Packager, Project, Workspace};

/// Log levels
#[derive(Debug, Clone, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_filter_directive(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

#[derive(Parser, Debug)]
#[clap(
    name = "son-package",
    about = "Create a network service package from a project",
    version
)]
struct Cli {
    /// Workspace directory (defaults to ~/.son-workspace)
    #[clap(long)]
    workspace: Option<PathBuf>,

    /// Project directory to package
    #[clap(long, default_value = ".")]
    project: PathBuf,

    /// Output directory; must be empty if it exists (defaults to <project>/target)
    #[clap(short, long)]
    destination: Option<PathBuf>,

    /// Package name (defaults to the project directory's name)
    #[clap(short, long)]
    name: Option<String>,

    /// Set log level (overrides the workspace setting)
    #[clap(long)]
    log_level: Option<LogLevel>,

    /// Emit structured JSON logs on stderr
    #[clap(long)]
    log_json: bool,

    /// Do not check that remote image URLs exist
    #[clap(long)]
    no_verify_urls: bool,
}

fn initialize_tracing(directive: &str, json: bool) {
    let filter = EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new("info"));

    if json {
        // JSON output for structured logs - MUST go to stderr
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }
}

/// Fail early when `dir` lacks its descriptor file
fn require_descriptor(dir: &Path, descriptor: &str, what: &str) -> Result<()> {
    if !dir.join(descriptor).is_file() {
        bail!(
            "Invalid {} location '{}': no {} found",
            what,
            dir.display(),
            descriptor
        );
    }
    Ok(())
}

#[derive(Tabled)]
struct ContentTableRow {
    #[tabled(rename = "Content type")]
    content_type: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Digest")]
    digest: String,
}

impl From<&PackageContentEntry> for ContentTableRow {
    fn from(entry: &PackageContentEntry) -> Self {
        Self {
            content_type: entry.content_type.clone(),
            name: entry.name.clone(),
            digest: entry.md5.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let workspace_root = match &cli.workspace {
        Some(root) => root.clone(),
        None => Workspace::default_root()?,
    };
    require_descriptor(&workspace_root, Workspace::DESCRIPTOR_NAME, "workspace")?;
    require_descriptor(&cli.project, Project::DESCRIPTOR_NAME, "project")?;

    let workspace = Workspace::load(&workspace_root)?;

    let directive = cli
        .log_level
        .as_ref()
        .map(|level| level.to_filter_directive().to_string())
        .unwrap_or_else(|| workspace.config.log_level.clone());
    initialize_tracing(&directive, cli.log_json);

    debug!("Using workspace {}", workspace_root.display());
    if workspace.config.catalogue_servers.is_empty() {
        warn!("No catalogue servers configured in {}", workspace_root.display());
    }

    let project = Project::load(&cli.project)
        .with_context(|| format!("Failed to load project at {}", cli.project.display()))?;
    let name = cli
        .name
        .clone()
        .unwrap_or_else(|| project.default_package_name());

    let mut packager = Packager::new(project, &workspace)?;
    if let Some(destination) = &cli.destination {
        packager = packager.with_destination(destination);
    }
    if cli.no_verify_urls {
        packager = packager.with_image_url_checks(false);
    }

    info!("Creating package '{}'", name);
    let report = match packager.package(&name).await {
        Ok(report) => report,
        Err(e) => {
            error!("Package creation failed");
            return Err(e).context("Failed to create package");
        }
    };

    let rows: Vec<ContentTableRow> = report
        .descriptor
        .package_content
        .iter()
        .map(ContentTableRow::from)
        .collect();
    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Rows::first()).with(Alignment::center()))
        .to_string();

    println!("{table}");
    println!("\nPackage: {}", report.archive.display());

    if !report.warnings.is_empty() {
        println!("{} warning(s):", report.warnings.len());
        for warning in &report.warnings {
            println!("  - {warning}");
        }
    }

    Ok(())
}
