//! RKV archive command implementations

use anyhow::{Context, Result};
use clap::{Subcommand, ValueEnum};
use std::fs;
use std::path::Path;
use ty_rkv::{Archive, FormatVersion, RkvBuilder};

use crate::utils::{format_bytes, format_timestamp, matches_pattern};

#[derive(ValueEnum, Clone, Debug)]
pub enum VersionArg {
    V1,
    V2,
}

impl From<VersionArg> for FormatVersion {
    fn from(arg: VersionArg) -> Self {
        match arg {
            VersionArg::V1 => FormatVersion::Rkv1,
            VersionArg::V2 => FormatVersion::Rkv2,
        }
    }
}

#[derive(Subcommand)]
pub enum RkvCommands {
    /// List files in an RKV archive
    List {
        /// Path to the RKV archive
        archive: String,

        /// Show detailed information (size, timestamp)
        #[arg(short, long)]
        long: bool,

        /// Filter files by pattern (supports wildcards)
        #[arg(short, long)]
        filter: Option<String>,
    },

    /// Extract files from an RKV archive
    Extract {
        /// Path to the RKV archive
        archive: String,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        output: String,

        /// Specific files to extract (extracts all if not specified)
        files: Vec<String>,

        /// Preserve directory structure from full-path names
        #[arg(short, long)]
        preserve_paths: bool,
    },

    /// Create a new RKV archive
    Create {
        /// Path for the new RKV archive
        archive: String,

        /// Files to add to the archive
        #[arg(short, long, required = true)]
        add: Vec<String>,

        /// Archive format version
        #[arg(long, value_enum, default_value_t = VersionArg::V2)]
        version: VersionArg,
    },

    /// Show information about an RKV archive
    Info {
        /// Path to the RKV archive
        archive: String,
    },
}

pub fn execute(command: RkvCommands) -> Result<()> {
    match command {
        RkvCommands::List {
            archive,
            long,
            filter,
        } => list(&archive, long, filter.as_deref()),
        RkvCommands::Extract {
            archive,
            output,
            files,
            preserve_paths,
        } => extract(&archive, &output, &files, preserve_paths),
        RkvCommands::Create {
            archive,
            add,
            version,
        } => create(&archive, &add, version.into()),
        RkvCommands::Info { archive } => info(&archive),
    }
}

fn list(path: &str, long: bool, filter: Option<&str>) -> Result<()> {
    let archive =
        Archive::open(path).with_context(|| format!("Failed to open archive: {path}"))?;

    let mut names = archive.file_names().collect::<Vec<_>>();
    names.sort_unstable();

    let mut shown = 0usize;
    for name in names {
        if let Some(pattern) = filter {
            if !matches_pattern(name, pattern) {
                continue;
            }
        }
        shown += 1;

        if long {
            // file() cannot fail for a name that came out of file_names().
            if let Some(entry) = archive.file(name) {
                println!(
                    "{:>12}  {}  {}",
                    format_bytes(u64::from(entry.size)),
                    format_timestamp(entry.timestamp),
                    name
                );
            }
        } else {
            println!("{name}");
        }
    }

    if long {
        println!("\n{shown} file(s)");
    }
    Ok(())
}

fn extract(path: &str, output: &str, files: &[String], preserve_paths: bool) -> Result<()> {
    let archive =
        Archive::open(path).with_context(|| format!("Failed to open archive: {path}"))?;

    let targets: Vec<String> = if files.is_empty() {
        archive.file_names().map(String::from).collect()
    } else {
        files.to_vec()
    };

    let output_dir = Path::new(output);
    fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create output directory: {output}"))?;

    let mut extracted = 0usize;
    for name in &targets {
        let data = archive
            .read_file(name)
            .with_context(|| format!("Failed to read {name} from archive"))?;

        let relative = if preserve_paths {
            name.replace('\\', "/")
        } else {
            name.rsplit(['\\', '/'])
                .next()
                .unwrap_or(name.as_str())
                .to_string()
        };
        let target = output_dir.join(relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&target, data)
            .with_context(|| format!("Failed to write {}", target.display()))?;
        extracted += 1;
        log::info!("extracted {name} -> {}", target.display());
    }

    println!("Extracted {extracted} file(s) to {output}");
    Ok(())
}

fn create(path: &str, add: &[String], version: FormatVersion) -> Result<()> {
    let mut builder = RkvBuilder::new(version);
    for file in add {
        let data =
            fs::read(file).with_context(|| format!("Failed to read input file: {file}"))?;
        let name = Path::new(file)
            .file_name()
            .and_then(|n| n.to_str())
            .with_context(|| format!("Input path has no usable file name: {file}"))?;
        builder = builder.add_file_data(name, data);
    }

    builder
        .write_to(path)
        .with_context(|| format!("Failed to write archive: {path}"))?;

    println!("Created {path} with {} file(s)", add.len());
    Ok(())
}

fn info(path: &str) -> Result<()> {
    let archive =
        Archive::open(path).with_context(|| format!("Failed to open archive: {path}"))?;

    let total: u64 = archive
        .file_names()
        .filter_map(|n| archive.file(n))
        .map(|e| u64::from(e.size))
        .sum();

    println!("Archive: {path}");
    println!("Format:  {}", archive.version());
    println!("Files:   {}", archive.file_count());
    println!("Data:    {}", format_bytes(total));
    println!("Size:    {}", format_bytes(archive.file_size()));
    Ok(())
}
