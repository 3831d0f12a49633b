//! `nodefs grants`: list the decoded grants of a node.

use anyhow::{Context, Result};
use clap::Args;
use nodefs_ace::{Ace, Grant};
use nodefs_tree::{Lookup, Node};
use serde::Serialize;

#[derive(Args, Debug)]
pub struct GrantsArgs {
    #[arg(short, long)]
    space: String,

    #[arg(short, long)]
    node: String,

    /// Print JSON instead of one line per grant
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Serialize, PartialEq)]
struct GrantView {
    principal: String,
    #[serde(rename = "type")]
    ace_type: String,
    permissions: String,
    creator: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    expires: Option<i64>,
}

impl From<&Grant> for GrantView {
    fn from(grant: &Grant) -> Self {
        let ace = Ace::from_grant(grant);
        Self {
            principal: ace.principal.clone(),
            ace_type: ace.ace_type.as_str().to_string(),
            permissions: ace.permissions.clone(),
            creator: grant.creator.clone(),
            expires: grant.expiration.map(|t| t.as_unix_nanos()),
        }
    }
}

pub fn run(lookup: &Lookup, args: GrantsArgs) -> Result<()> {
    let node = Node::read(lookup, &args.space, &args.node)
        .with_context(|| format!("Failed to load node {}", args.node))?;
    let mut views: Vec<GrantView> = node.list_grants()?.iter().map(GrantView::from).collect();
    views.sort_by(|a, b| a.principal.cmp(&b.principal));

    if args.json {
        println!("{}", serde_json::to_string_pretty(&views)?);
    } else {
        for view in &views {
            println!("{}\t{}\t{}", view.principal, view.ace_type, view.permissions);
        }
    }
    Ok(())
}
