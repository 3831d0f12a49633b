//! `nodefs metadata`: raw access to a node's attribute record.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use nodefs_config::path::is_within_directory;
use nodefs_tree::Lookup;
use nodefs_xattr::sidecar::METADATA_SUFFIX;
use nodefs_xattr::Attributes;

#[derive(Args, Debug)]
pub struct MetadataArgs {
    /// Node id, or the absolute internal path of the node
    #[arg(short, long)]
    node: String,

    /// Space of the node, required when `--node` is an id
    #[arg(short, long)]
    space: Option<String>,

    #[command(subcommand)]
    command: MetadataCommand,
}

#[derive(Subcommand, Debug)]
enum MetadataCommand {
    /// Print every attribute
    Dump,
    /// Print one attribute
    Get {
        #[arg(short, long)]
        attribute: String,
    },
    /// Set one attribute; values starting with 0x are decoded as hex
    Set {
        #[arg(short, long)]
        attribute: String,

        #[arg(short, long, allow_hyphen_values = true)]
        value: String,
    },
}

pub fn run(lookup: &Lookup, args: MetadataArgs) -> Result<()> {
    let path = node_path(lookup, &args.node, args.space.as_deref())?;
    let backend = lookup.metadata_backend();

    match args.command {
        MetadataCommand::Dump => {
            let attrs = backend
                .all(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            print!("{}", render_all(&attrs));
        }
        MetadataCommand::Get { attribute } => {
            let value = backend
                .get(&path, &attribute)
                .with_context(|| format!("Failed to read {attribute}"))?;
            println!("{attribute}={}", render_value(&value));
        }
        MetadataCommand::Set { attribute, value } => {
            let bytes = parse_value(&value)?;
            if !backend.exists(&path) {
                bail!("no record at {}", path.display());
            }
            backend
                .set(&path, &attribute, &bytes)
                .with_context(|| format!("Failed to set {attribute}"))?;
            tracing::info!(attribute = %attribute, path = %path.display(), "Attribute updated");
        }
    }
    Ok(())
}

/// Internal path from either an absolute path or a `(space, node)` pair
fn node_path(lookup: &Lookup, node: &str, space: Option<&str>) -> Result<PathBuf> {
    if node.starts_with('/') {
        let trimmed = PathBuf::from(node.strip_suffix(METADATA_SUFFIX).unwrap_or(node));
        if !is_within_directory(&trimmed, lookup.internal_root()) {
            bail!(
                "{} is not a node below {}",
                trimmed.display(),
                lookup.internal_root().display()
            );
        }
        return Ok(trimmed);
    }
    let Some(space) = space else {
        bail!("--space is required when --node is an id");
    };
    Ok(lookup.internal_path(space, node))
}

fn render_all(attrs: &Attributes) -> String {
    let mut out = String::new();
    for (key, value) in attrs.iter() {
        out.push_str(key);
        out.push('=');
        out.push_str(&render_value(value));
        out.push('\n');
    }
    out
}

/// Printable UTF-8 is shown quoted, anything else as `0x` hex
fn render_value(value: &[u8]) -> String {
    match std::str::from_utf8(value) {
        Ok(s) if !s.chars().any(char::is_control) => format!("{s:?}"),
        _ => format!("0x{}", hex::encode(value)),
    }
}

fn parse_value(value: &str) -> Result<Vec<u8>> {
    match value.strip_prefix("0x") {
        Some(digits) => hex::decode(digits).with_context(|| format!("Invalid hex value {value}")),
        None => Ok(value.as_bytes().to_vec()),
    }
}
