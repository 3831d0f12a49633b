//! # nodefs CLI
//!
//! Inspect and repair a nodefs store on disk.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use nodefs_config::logging::{init_logging, LogLevel};
use nodefs_config::path::expand_tilde;
use nodefs_config::Config;
use nodefs_tree::{Lookup, Node};

mod check;
mod grants;
mod metadata;

/// nodefs - node metadata store maintenance
#[derive(Parser)]
#[command(name = "nodefs")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Storage root, overrides the configured one
    #[arg(long, global = true, env = "NODEFS_ROOT")]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read or write the attribute record of a node
    Metadata(metadata::MetadataArgs),

    /// Print the path of a node relative to its space root
    Path {
        #[arg(short, long)]
        space: String,

        #[arg(short, long)]
        node: String,
    },

    /// Walk a path below a space root and print the node it names
    Resolve {
        #[arg(short, long)]
        space: String,

        #[arg(value_name = "PATH")]
        path: String,

        /// Do not follow references
        #[arg(long)]
        no_follow: bool,
    },

    /// Report incomplete records, orphans and dangling entries of a space
    Check(check::CheckArgs),

    /// List the grants on a node
    Grants(grants::GrantsArgs),

    /// Configuration management
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective configuration as TOML
    Show,
    /// Print the configuration file locations
    Path,
    /// Write a default configuration file
    Init {
        /// Write to the global file instead of ./.nodefs/config.toml
        #[arg(long)]
        global: bool,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn main() -> Result<()> {
    init_logging(LogLevel::Warn);

    let cli = Cli::parse();
    let mut config = Config::load().context("Failed to load configuration")?;
    if let Some(root) = &cli.root {
        config.storage.root = root.clone();
    }
    config.storage.root = expand_tilde(&config.storage.root);
    tracing::debug!(root = %config.storage.root.display(), "Using storage root");

    match cli.command {
        Commands::Metadata(args) => metadata::run(&Lookup::from_config(&config), args),
        Commands::Path { space, node } => {
            let lookup = Lookup::from_config(&config);
            let node = Node::read(&lookup, &space, &node)
                .with_context(|| format!("Failed to load node {node}"))?;
            println!("{}", lookup.path(&node, |_| true)?);
            Ok(())
        }
        Commands::Resolve {
            space,
            path,
            no_follow,
        } => {
            let lookup = Lookup::from_config(&config);
            let root = lookup
                .node_from_space_id(&space)
                .with_context(|| format!("Failed to load space {space}"))?;
            let node = lookup.walk_path(&root, &path, !no_follow, |_| Ok(()))?;
            println!("{}\t{}\t{}", node.space_id, node.id, node.node_type());
            Ok(())
        }
        Commands::Check(args) => check::run(&Lookup::from_config(&config), args),
        Commands::Grants(args) => grants::run(&Lookup::from_config(&config), args),
        Commands::Config { command } => cmd_config(&config, command),
    }
}

fn cmd_config(config: &Config, command: ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::Show => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
        ConfigCommands::Path => {
            match Config::global_config_path() {
                Some(path) => println!("Global:  {}", path.display()),
                None => println!("Global:  (no home directory)"),
            }
            println!("Project: {}", Config::project_config_path().display());
            Ok(())
        }
        ConfigCommands::Init { global, force } => {
            let path = if global {
                Config::global_config_path().context("No home directory for global config")?
            } else {
                Config::project_config_path()
            };
            if path.exists() && !force {
                anyhow::bail!("{} already exists (use --force)", path.display());
            }
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&path, Config::default_toml()?)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Wrote {}", path.display());
            Ok(())
        }
    }
}
