//! `nodefs check`: consistency report for one space.

use anyhow::{bail, Context, Result};
use clap::Args;
use nodefs_tree::{CheckReport, Lookup};

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Space to check
    #[arg(short, long)]
    space: String,

    /// Print problems only
    #[arg(short, long)]
    quiet: bool,
}

pub fn run(lookup: &Lookup, args: CheckArgs) -> Result<()> {
    let report = lookup
        .check_space(&args.space)
        .with_context(|| format!("Failed to check space {}", args.space))?;
    print!("{}", render(&report, args.quiet));

    let problems = report.incomplete.len() + report.orphans.len() + report.dangling.len();
    if problems > 0 {
        bail!("{problems} problem(s) found in space {}", args.space);
    }
    Ok(())
}

fn render(report: &CheckReport, quiet: bool) -> String {
    let mut out = String::new();
    if !quiet {
        out.push_str(&format!("nodes: {}\n", report.nodes));
        out.push_str(&format!("total blob size: {}\n", report.total_blob_size));
    }
    for id in &report.incomplete {
        out.push_str(&format!("incomplete: {id}\n"));
    }
    for id in &report.orphans {
        out.push_str(&format!("orphan: {id}\n"));
    }
    for entry in &report.dangling {
        out.push_str(&format!("dangling: {}\n", entry.display()));
    }
    out
}
