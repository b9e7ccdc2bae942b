//! Watch command: keep the index and its snapshot current.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;

use super::project::{Project, ProjectArgs};
use crate::config::Settings;
use crate::indexing::IndexChangeListener;
use crate::watcher::FsWatcher;

struct RebuildReporter;

impl IndexChangeListener for RebuildReporter {
    fn index_rebuilt(&self, base_location: &str) {
        crate::log_event!("watch", "rebuilt", "{base_location}");
    }
}

/// Runs until the process is interrupted.
pub fn run_watch(settings: &Settings, args: &ProjectArgs, debounce: Option<u64>) -> Result<()> {
    let project = Project::open(settings, args)?;
    let debounce_ms = debounce.unwrap_or(settings.indexing.debounce_ms);
    project.index.add_change_listener(Arc::new(RebuildReporter));

    let watcher = FsWatcher::start(project.fs.clone(), debounce_ms).context("Cannot start watcher")?;
    project.index.ensure_parsed();
    watcher.watch_index(&project.index)?;
    println!(
        "Watching {} ({} files). Press Ctrl-C to stop.",
        project.index.base_location(),
        project.index.file_list().len()
    );

    let poll = Duration::from_millis(debounce_ms.max(100));
    while watcher.is_running() {
        std::thread::sleep(poll);
        if project.index.is_dirty() {
            let state = project.index.ensure_parsed();
            let stats = project.index.stats();
            println!(
                "{state}: {} files, {} declarations, {} missing includes",
                stats.files, stats.declarations, stats.missing_includes
            );
        }
    }
    project.close();
    Ok(())
}
