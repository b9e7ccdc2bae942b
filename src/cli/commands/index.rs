//! Index and Files commands.

use anyhow::Result;

use super::project::{Project, ProjectArgs};
use crate::config::Settings;
use crate::indexing::IndexState;

/// Bring the index to `AllFilesParsed` and print a summary.
pub fn run_index(settings: &Settings, args: &ProjectArgs, json: bool) -> Result<()> {
    let started = std::time::Instant::now();
    let project = Project::open(settings, args)?;
    let state = project.index.ensure_parsed();
    let stats = project.index.stats();

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        println!("Indexed {}", stats.base_location);
        println!("  state:            {state}");
        println!("  files:            {}", stats.files);
        println!("  root files:       {}", stats.root_files);
        println!("  declarations:     {}", stats.declarations);
        println!("  references:       {}", stats.references);
        println!("  missing includes: {}", stats.missing_includes);
        println!("  elapsed:          {:.2?}", started.elapsed());
    }
    if state < IndexState::AllFilesParsed {
        tracing::warn!("[cli] index stopped at {state}");
    }
    project.close();
    Ok(())
}

/// List tracked files, or include strings that could not be resolved.
pub fn run_files(settings: &Settings, args: &ProjectArgs, missing: bool) -> Result<()> {
    let project = Project::open(settings, args)?;
    let lines = if missing {
        project.index.missing_includes()
    } else {
        project.index.file_list()
    };
    for line in lines {
        println!("{line}");
    }
    project.close();
    Ok(())
}
