//! ArgMatches → CliAction / RunConfig conversion.
//!
//! Flags are applied last, over `proctor.toml` and `PROCTOR_*` variables.

use std::path::{Path, PathBuf};

use clap::ArgMatches;
use proctor_core::{ModuleName, ProctorResult};
use proctor_engine::{RunConfig, TestFilter, CONFIG_FILE_NAME};
use tracing::Level;

/// Where changed paths come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffSource {
    /// `git diff --name-only <ref>..HEAD`
    Git(String),
    /// A unified diff on disk
    File(PathBuf),
}

/// Which modules a command applies to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    /// Explicitly named modules; empty means "derive from the diff"
    pub modules: Vec<ModuleName>,
    /// Fallback source of module names
    pub diff: DiffSource,
    /// Test dependencies too
    pub include_deps: bool,
}

/// Flags of the `run` subcommand
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunArgs {
    pub selection: Selection,
    pub tests: Vec<String>,
    pub database: Option<String>,
    pub no_dropdb: bool,
    pub require_demo: bool,
    pub report_json: Option<PathBuf>,
}

impl RunArgs {
    /// Test filter built from `--tests`
    pub fn filter(&self) -> TestFilter {
        TestFilter::new(self.tests.iter().cloned())
    }
}

/// The result of parsing the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliAction {
    Run(RunArgs),
    Plan(Selection),
    Changed(DiffSource),
    /// Write a config file; `resolved` writes the effective settings
    InitConfig { resolved: bool },
}

/// Convert clap ArgMatches into a CliAction.
pub fn matches_to_action(matches: &ArgMatches) -> Result<CliAction, String> {
    let (sub_name, sub_matches) = matches
        .subcommand()
        .ok_or_else(|| "No command provided".to_string())?;

    match sub_name {
        "run" => Ok(CliAction::Run(RunArgs {
            selection: parse_selection(sub_matches),
            tests: strings(sub_matches, "tests"),
            database: sub_matches.get_one::<String>("database").cloned(),
            no_dropdb: sub_matches.get_flag("no-dropdb"),
            require_demo: sub_matches.get_flag("require-demo"),
            report_json: sub_matches.get_one::<String>("report-json").map(PathBuf::from),
        })),
        "plan" => Ok(CliAction::Plan(parse_selection(sub_matches))),
        "changed" => Ok(CliAction::Changed(parse_diff(sub_matches))),
        "init-config" => Ok(CliAction::InitConfig {
            resolved: sub_matches.get_flag("resolved"),
        }),
        other => Err(format!("Unknown command: {}", other)),
    }
}

fn strings(matches: &ArgMatches, id: &str) -> Vec<String> {
    matches
        .get_many::<String>(id)
        .map(|values| {
            values
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

fn parse_diff(matches: &ArgMatches) -> DiffSource {
    match matches.get_one::<String>("diff-file") {
        Some(path) => DiffSource::File(PathBuf::from(path)),
        None => DiffSource::Git(
            matches
                .get_one::<String>("diff")
                .cloned()
                .unwrap_or_else(|| "HEAD~1".to_string()),
        ),
    }
}

fn parse_selection(matches: &ArgMatches) -> Selection {
    Selection {
        modules: strings(matches, "modules")
            .into_iter()
            .map(ModuleName::from)
            .collect(),
        diff: parse_diff(matches),
        include_deps: matches.get_flag("include-deps"),
    }
}

fn leaf(matches: &ArgMatches) -> &ArgMatches {
    matches.subcommand().map(|(_, m)| m).unwrap_or(matches)
}

/// Log level from the `-v` count
pub fn log_level(matches: &ArgMatches) -> Level {
    match leaf(matches).get_count("verbose") {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Config file named by `--config`, or `./proctor.toml`
pub fn config_path(matches: &ArgMatches) -> PathBuf {
    leaf(matches)
        .get_one::<String>("config")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME))
}

/// Effective configuration: file, then environment, then flags
///
/// A missing `--config` file is an error, except for `init-config`, which
/// is about to create it.
pub fn load_config(matches: &ArgMatches, action: &CliAction) -> ProctorResult<RunConfig> {
    let leaf = leaf(matches);
    let explicit = leaf.get_one::<String>("config").is_some()
        && !matches!(action, CliAction::InitConfig { .. });
    let path = Some(config_path(matches)).filter(|p| explicit || p.exists());
    let mut config = RunConfig::load(path.as_deref())?;
    apply_flags(&mut config, leaf.get_one::<String>("addons-path").map(Path::new), action);
    config.validate()?;
    Ok(config)
}

fn apply_flags(config: &mut RunConfig, addons_path: Option<&Path>, action: &CliAction) {
    if let Some(path) = addons_path {
        config.addons_path = path.to_path_buf();
    }
    let selection = match action {
        CliAction::Run(args) => {
            if let Some(db) = &args.database {
                config.database = Some(db.clone());
            }
            if args.no_dropdb {
                config.drop_database = false;
            }
            if args.require_demo {
                config.require_demo = true;
            }
            &args.selection
        }
        CliAction::Plan(selection) => selection,
        CliAction::Changed(_) | CliAction::InitConfig { .. } => return,
    };
    if selection.include_deps {
        config.test_dependencies = true;
    }
}
