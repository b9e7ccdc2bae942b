use anyhow::Result;
use clap::Parser;

use hdlindex::cli::commands::{index, init, project::ProjectArgs, query, watch};
use hdlindex::cli::{Cli, Commands};
use hdlindex::config::Settings;
use hdlindex::indexing::NameMatch;

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Init { force } = cli.command {
        hdlindex::logging::init();
        return init::run_init(force);
    }

    let settings = match &cli.config {
        Some(path) => Settings::load_from(path)?,
        None => Settings::load()?,
    };
    hdlindex::logging::init_with_config(&settings.logging);

    let mut args = ProjectArgs {
        base: cli.base.clone(),
        argfile: cli.argfile.clone(),
        ..ProjectArgs::default()
    };

    match cli.command {
        Commands::Init { .. } => Ok(()),
        Commands::Config => init::run_config(&settings),
        Commands::Index {
            base,
            threads,
            no_threads,
            force,
            json,
        } => {
            if let Some(base) = base {
                args.base = base;
            }
            args.threads = threads;
            args.no_threads = no_threads;
            args.fresh = force;
            index::run_index(&settings, &args, json)
        }
        Commands::Files { missing } => index::run_files(&settings, &args, missing),
        Commands::Find {
            name,
            ignore_case,
            prefix,
            json,
        } => {
            let matcher = if prefix {
                NameMatch::Prefix
            } else if ignore_case {
                NameMatch::CaseInsensitive
            } else {
                NameMatch::Exact
            };
            query::run_find(&settings, &args, &name, matcher, json)
        }
        Commands::Refs { name, json } => query::run_refs(&settings, &args, &name, json),
        Commands::Diagnostics { path, json } => {
            query::run_diagnostics(&settings, &args, &path, json)
        }
        Commands::Watch { debounce } => watch::run_watch(&settings, &args, debounce),
    }
}
