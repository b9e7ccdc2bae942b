//! Find, Refs and Diagnostics commands.

use anyhow::Result;
use std::path::Path;

use super::project::{Project, ProjectArgs};
use crate::config::Settings;
use crate::fs::path_to_string;
use crate::indexing::NameMatch;

pub fn run_find(
    settings: &Settings,
    args: &ProjectArgs,
    name: &str,
    matcher: NameMatch,
    json: bool,
) -> Result<()> {
    let project = Project::open(settings, args)?;
    let found = project.index.find_global_scope_decl(name, &matcher);
    if json {
        println!("{}", serde_json::to_string_pretty(&found)?);
    } else if found.is_empty() {
        eprintln!("No declaration matches '{name}'");
    } else {
        for entry in &found {
            match &entry.package {
                Some(pkg) => println!(
                    "{} {pkg}::{} {}:{}",
                    entry.kind, entry.name, entry.file, entry.location
                ),
                None => println!("{} {} {}:{}", entry.kind, entry.name, entry.file, entry.location),
            }
        }
    }
    project.close();
    Ok(())
}

pub fn run_refs(settings: &Settings, args: &ProjectArgs, name: &str, json: bool) -> Result<()> {
    let project = Project::open(settings, args)?;
    let refs = project.index.find_references(name, &NameMatch::Exact);
    if json {
        println!("{}", serde_json::to_string_pretty(&refs)?);
    } else {
        for entry in &refs {
            println!("{:?} {} {}:{}", entry.kind, entry.name, entry.file, entry.location);
        }
    }
    project.close();
    Ok(())
}

pub fn run_diagnostics(settings: &Settings, args: &ProjectArgs, path: &Path, json: bool) -> Result<()> {
    let project = Project::open(settings, args)?;
    let path = path_to_string(&std::path::absolute(path)?);
    project.index.ensure_parsed();
    let markers = project.index.get_diagnostics(&path);
    if json {
        println!("{}", serde_json::to_string_pretty(&markers)?);
    } else if !project.index.contains_file(&path) {
        eprintln!("{path} is not part of the index");
    } else {
        for marker in &markers {
            match &marker.location {
                Some(location) => println!("{path}:{location}: {:?}: {}", marker.kind, marker.message),
                None => println!("{path}: {:?}: {}", marker.kind, marker.message),
            }
        }
    }
    project.close();
    Ok(())
}
