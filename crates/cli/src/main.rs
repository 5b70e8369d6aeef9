//! Proctor CLI: dependency-ordered module test runner.
//!
//! Subcommands:
//! - **run**: install and test modules, one fresh database each
//! - **plan**: print the order modules would be tested in
//! - **changed**: list modules touched by a diff
//! - **init-config**: write a starting `proctor.toml`
//!
//! Exit codes: 0 when every module passed, 1 when any failed, 2 for
//! configuration errors raised before the run started.

mod commands;
mod diff;
mod format;
mod parse;

use std::path::Path;
use std::process;
use std::sync::Arc;

use proctor_core::{ModuleName, ProctorResult};
use proctor_engine::{
    JsonReportObserver, MemoryRuntime, RunConfig, TestRunCoordinator, TracingObserver,
};
use tracing::{info, warn};

use commands::build_cli;
use format::{format_modules, format_report};
use parse::{config_path, load_config, log_level, matches_to_action, CliAction, Selection};

fn main() {
    let matches = build_cli().get_matches();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(log_level(&matches))
        .init();

    let exit_code = match run(&matches) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("(error) {}", e);
            if e.is_fatal() {
                2
            } else {
                1
            }
        }
    };
    process::exit(exit_code);
}

fn run(matches: &clap::ArgMatches) -> ProctorResult<i32> {
    let action = matches_to_action(matches).map_err(proctor_core::ProctorError::invalid_config)?;
    let config = load_config(matches, &action)?;

    match action {
        CliAction::InitConfig { resolved } => {
            let path = config_path(matches);
            if init_config(&path, resolved.then_some(&config))? {
                println!("{}", path.display());
            } else {
                warn!(path = %path.display(), "config file already exists, left unchanged");
            }
            Ok(0)
        }
        CliAction::Changed(source) => {
            let modules = diff::changed_modules(&source, &config.addons_path)?;
            print_modules(&modules);
            Ok(0)
        }
        CliAction::Plan(selection) => {
            let modules = select(&selection, &config)?;
            let plan = coordinator(config)?.plan(&modules)?;
            print_modules(&plan);
            Ok(0)
        }
        CliAction::Run(args) => {
            let modules = select(&args.selection, &config)?;
            if modules.is_empty() {
                warn!("no modules selected, nothing to test");
                return Ok(0);
            }
            let mut coordinator = coordinator(config)?
                .with_filter(args.filter())
                .with_observer(Arc::new(TracingObserver));
            if let Some(path) = &args.report_json {
                coordinator = coordinator.with_observer(Arc::new(JsonReportObserver::new(path)));
            }
            let report = coordinator.run(&modules)?;
            println!("{}", format_report(&report));
            Ok(report.exit_code())
        }
    }
}

/// Write the commented defaults unless `path` exists, or `resolved` over it
///
/// Returns whether the file was written.
fn init_config(path: &Path, resolved: Option<&RunConfig>) -> ProctorResult<bool> {
    match resolved {
        Some(config) => {
            config.write_to_file(path)?;
            Ok(true)
        }
        None => {
            let existed = path.exists();
            RunConfig::write_default_if_missing(path)?;
            Ok(!existed)
        }
    }
}

fn coordinator(config: RunConfig) -> ProctorResult<TestRunCoordinator> {
    let runtime = Arc::new(MemoryRuntime::new()?);
    Ok(TestRunCoordinator::new(runtime, config))
}

/// Named modules, or the ones touched by the diff when none are named
fn select(selection: &Selection, config: &RunConfig) -> ProctorResult<Vec<ModuleName>> {
    if !selection.modules.is_empty() {
        return Ok(selection.modules.clone());
    }
    let modules = diff::changed_modules(&selection.diff, &config.addons_path)?;
    info!(modules = ?modules, "modules derived from diff");
    Ok(modules)
}

fn print_modules(modules: &[ModuleName]) {
    let text = format_modules(modules);
    if !text.is_empty() {
        println!("{}", text);
    }
}
