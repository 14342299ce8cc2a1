//! fsabstract CLI - Command line interface for driver operations.
//!
//! Descriptors are kept in JSON files. Commands that change a descriptor
//! write the updated value back to the same file.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use fsabstract_common::{FileDescriptor, FileLocation};
use fsabstract_storage::{
    create_default_registry, load_options, DriverOptions, DriverRegistry, Migrator,
};

#[derive(Parser)]
#[command(name = "fsabstract")]
#[command(about = "fsabstract - Backend-agnostic file storage")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// JSON file of driver options.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Driver option as key=value, overriding the config file.
    #[arg(short = 'o', long = "option", global = true, value_parser = parse_key_value)]
    options: Vec<(String, String)>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered drivers.
    Drivers,

    /// Write a new, unstored descriptor.
    New {
        /// Descriptor file to create.
        #[arg(short, long)]
        descriptor: PathBuf,

        /// Application-assigned file id.
        #[arg(long)]
        id: i64,

        /// File name.
        #[arg(short, long)]
        name: String,

        /// Content type.
        #[arg(short = 't', long, default_value = "")]
        file_type: String,

        /// Metadata entry as key=value.
        #[arg(short, long, value_parser = parse_key_value)]
        meta: Vec<(String, String)>,
    },

    /// Print a descriptor.
    Show {
        /// Descriptor file.
        #[arg(short, long)]
        descriptor: PathBuf,
    },

    /// Store a file's content through a driver.
    Put {
        /// Descriptor file.
        #[arg(short, long)]
        descriptor: PathBuf,

        /// Driver name.
        #[arg(long)]
        driver: String,

        /// File holding the content.
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Read a file's content from a driver.
    Get {
        /// Descriptor file.
        #[arg(short, long)]
        descriptor: PathBuf,

        /// Driver name.
        #[arg(long)]
        driver: String,

        /// Destination file (default: stdout).
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Remove a driver's copy of a file.
    Delete {
        /// Descriptor file.
        #[arg(short, long)]
        descriptor: PathBuf,

        /// Driver name.
        #[arg(long)]
        driver: String,
    },

    /// Move a file from one driver to another.
    Migrate {
        /// Descriptor file.
        #[arg(short, long)]
        descriptor: PathBuf,

        /// Source driver.
        #[arg(long)]
        from: String,

        /// Destination driver.
        #[arg(long)]
        to: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let options = build_options(cli.config.as_deref(), cli.options)?;
    let registry = create_default_registry();

    match cli.command {
        Commands::Drivers => cmd_drivers(&registry),

        Commands::New {
            descriptor,
            id,
            name,
            file_type,
            meta,
        } => cmd_new(&descriptor, id, &name, &file_type, meta).await,

        Commands::Show { descriptor } => cmd_show(&descriptor).await,

        Commands::Put {
            descriptor,
            driver,
            input,
        } => cmd_put(&registry, &options, &descriptor, &driver, &input).await,

        Commands::Get {
            descriptor,
            driver,
            output,
        } => cmd_get(&registry, &options, &descriptor, &driver, output.as_deref()).await,

        Commands::Delete { descriptor, driver } => {
            cmd_delete(&registry, &options, &descriptor, &driver).await
        }

        Commands::Migrate {
            descriptor,
            from,
            to,
        } => cmd_migrate(&registry, &options, &descriptor, &from, &to).await,
    }
}

/// Parse a `key=value` argument.
fn parse_key_value(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected key=value, got '{}'", raw)),
    }
}

/// Merge the config file with command-line overrides.
fn build_options(config: Option<&Path>, overrides: Vec<(String, String)>) -> Result<DriverOptions> {
    let mut options = match config {
        Some(path) => load_options(path).context("Failed to load driver options")?,
        None => DriverOptions::new(),
    };
    options.extend(overrides);
    Ok(options)
}

async fn read_descriptor(path: &Path) -> Result<FileDescriptor> {
    let json = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read descriptor {}", path.display()))?;
    FileDescriptor::from_json(&json).context("Invalid descriptor")
}

async fn write_descriptor(path: &Path, descriptor: &FileDescriptor) -> Result<()> {
    let json = descriptor.to_json_pretty()?;
    tokio::fs::write(path, json)
        .await
        .with_context(|| format!("Failed to write descriptor {}", path.display()))
}

/// List registered drivers.
fn cmd_drivers(registry: &DriverRegistry) -> Result<()> {
    for name in registry.drivers() {
        println!("{}", name);
    }
    Ok(())
}

/// Create a descriptor file.
async fn cmd_new(
    path: &Path,
    id: i64,
    name: &str,
    file_type: &str,
    meta: Vec<(String, String)>,
) -> Result<()> {
    if path.exists() {
        anyhow::bail!("Descriptor {} already exists", path.display());
    }

    let mut descriptor = FileDescriptor::new(id, name);
    descriptor.file_type = file_type.to_string();
    descriptor.metadata.extend(meta);

    write_descriptor(path, &descriptor).await?;
    println!("Descriptor created: {}", path.display());
    Ok(())
}

/// Print a descriptor and its locations.
async fn cmd_show(path: &Path) -> Result<()> {
    let descriptor = read_descriptor(path).await?;

    println!("File {}: {} ({} bytes)", descriptor.id, descriptor.name, descriptor.size);
    if descriptor.locations.is_empty() {
        println!("  Not stored anywhere.");
    }
    for location in &descriptor.locations {
        println!(
            "  [{}] {} (store: {}, written {})",
            location.driver,
            location.location,
            if location.store_id.is_empty() { "-" } else { location.store_id.as_str() },
            location.created.to_rfc3339()
        );
    }
    Ok(())
}

/// Store content through a driver.
async fn cmd_put(
    registry: &DriverRegistry,
    options: &DriverOptions,
    path: &Path,
    driver_name: &str,
    input: &Path,
) -> Result<()> {
    let descriptor = read_descriptor(path).await?;
    let content = tokio::fs::read(input)
        .await
        .context("Failed to read input file")?;

    info!("Storing file {} via {}", descriptor.id, driver_name);
    let driver = registry
        .open(driver_name, options)
        .await
        .with_context(|| format!("Failed to open driver '{}'", driver_name))?;
    let updated = driver
        .put(&descriptor, &content)
        .await
        .context("Failed to store file")?;

    write_descriptor(path, &updated).await?;
    println!("Stored {} bytes via {}", content.len(), driver_name);
    Ok(())
}

/// Read content from a driver.
async fn cmd_get(
    registry: &DriverRegistry,
    options: &DriverOptions,
    path: &Path,
    driver_name: &str,
    output: Option<&Path>,
) -> Result<()> {
    let descriptor = read_descriptor(path).await?;

    let driver = registry
        .open(driver_name, options)
        .await
        .with_context(|| format!("Failed to open driver '{}'", driver_name))?;
    let (content, location) = driver
        .get(&descriptor)
        .await
        .context("Failed to read file")?;

    info!("Read {} bytes from {}", content.len(), location.location);
    match output {
        Some(out) => tokio::fs::write(out, &content)
            .await
            .context("Failed to write output file")?,
        None => std::io::stdout()
            .write_all(&content)
            .context("Failed to write to stdout")?,
    }
    Ok(())
}

/// Remove a driver's copy.
async fn cmd_delete(
    registry: &DriverRegistry,
    options: &DriverOptions,
    path: &Path,
    driver_name: &str,
) -> Result<()> {
    let descriptor = read_descriptor(path).await?;

    let driver = registry
        .open(driver_name, options)
        .await
        .with_context(|| format!("Failed to open driver '{}'", driver_name))?;
    let updated = driver
        .delete(&descriptor, None)
        .await
        .context("Failed to delete file")?;

    write_descriptor(path, &updated).await?;
    println!("Removed copy from {}", driver_name);
    if updated.locations.is_empty() {
        println!("File {} is no longer stored anywhere.", updated.id);
    }
    Ok(())
}

/// Move a file between drivers.
async fn cmd_migrate(
    registry: &DriverRegistry,
    options: &DriverOptions,
    path: &Path,
    from: &str,
    to: &str,
) -> Result<()> {
    let descriptor = read_descriptor(path).await?;
    let migrator = Migrator::new(registry, options);

    match migrator
        .migrate(
            &descriptor,
            &FileLocation::for_driver(from),
            &FileLocation::for_driver(to),
        )
        .await
    {
        Ok(updated) => {
            write_descriptor(path, &updated).await?;
            println!("Migrated file {} from {} to {}", updated.id, from, to);
            Ok(())
        }
        Err(err) => {
            // Record the copy written before a failed delete
            if err.has_duplicate_copy() {
                write_descriptor(path, &err.descriptor).await?;
                eprintln!("Both {} and {} now hold a copy; retry the delete.", from, to);
            }
            Err(err.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_value() {
        assert_eq!(
            parse_key_value("local.basepath=/srv/a=b").unwrap(),
            ("local.basepath".to_string(), "/srv/a=b".to_string())
        );
        assert!(parse_key_value("novalue").is_err());
        assert!(parse_key_value("=x").is_err());
    }

    #[test]
    fn test_overrides_win_over_config() {
        let temp = tempfile::TempDir::new().unwrap();
        let config = temp.path().join("options.json");
        std::fs::write(&config, r#"{"local.basepath": "/a", "memory.store": "m"}"#).unwrap();

        let options = build_options(
            Some(&config),
            vec![("local.basepath".to_string(), "/b".to_string())],
        )
        .unwrap();

        assert_eq!(options["local.basepath"], "/b");
        assert_eq!(options["memory.store"], "m");
    }
}
