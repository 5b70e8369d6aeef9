//! Clap command tree definition.

use clap::{Arg, ArgAction, Command};

/// Build the complete CLI command tree.
pub fn build_cli() -> Command {
    Command::new("proctor")
        .about("Dependency-ordered, transaction-isolated module test runner")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("PATH")
                .help("Config file (default: ./proctor.toml when present)")
                .global(true),
        )
        .arg(
            Arg::new("addons-path")
                .long("addons-path")
                .value_name("DIR")
                .help("Directory holding the modules")
                .global(true),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("More logging (-v info, -vv debug, -vvv trace)")
                .action(ArgAction::Count)
                .global(true),
        )
        .subcommand(build_run())
        .subcommand(build_plan())
        .subcommand(build_changed())
        .subcommand(build_init_config())
}

// =========================================================================
// Module selection
// =========================================================================

fn selection_args(cmd: Command) -> Command {
    cmd.arg(
        Arg::new("modules")
            .short('m')
            .long("modules")
            .value_name("MODULE")
            .help("Module to test; repeatable, comma separated lists accepted")
            .action(ArgAction::Append)
            .value_delimiter(','),
    )
    .arg(
        Arg::new("diff")
            .long("diff")
            .value_name("REF")
            .help("Test modules changed between REF and HEAD when no module is given")
            .default_value("HEAD~1")
            .conflicts_with("diff-file"),
    )
    .arg(
        Arg::new("diff-file")
            .long("diff-file")
            .value_name("PATH")
            .help("Test modules touched by a unified diff file"),
    )
    .arg(
        Arg::new("include-deps")
            .long("include-deps")
            .help("Also test every dependency of the selected modules")
            .action(ArgAction::SetTrue),
    )
}

fn build_changed() -> Command {
    Command::new("changed")
        .about("List modules touched by a change")
        .arg(
            Arg::new("diff")
                .long("diff")
                .value_name("REF")
                .help("Compare REF with HEAD")
                .default_value("HEAD~1")
                .conflicts_with("diff-file"),
        )
        .arg(
            Arg::new("diff-file")
                .long("diff-file")
                .value_name("PATH")
                .help("Read a unified diff from PATH"),
        )
}

fn build_init_config() -> Command {
    Command::new("init-config")
        .about("Write a config file (--config, default ./proctor.toml)")
        .arg(
            Arg::new("resolved")
                .long("resolved")
                .help("Write the effective settings (file, environment, flags), replacing the file")
                .action(ArgAction::SetTrue),
        )
}

fn build_plan() -> Command {
    selection_args(Command::new("plan").about("Print the order modules would be tested in"))
}

// =========================================================================
// Run
// =========================================================================

fn build_run() -> Command {
    selection_args(Command::new("run").about("Install and test modules"))
        .arg(
            Arg::new("tests")
                .short('t')
                .long("tests")
                .value_name("TEST")
                .help("Only run matching tests (name, Suite.name or Suite); repeatable")
                .action(ArgAction::Append)
                .value_delimiter(','),
        )
        .arg(
            Arg::new("database")
                .long("database")
                .value_name("NAME")
                .help("Run against an existing database; it is never dropped"),
        )
        .arg(
            Arg::new("no-dropdb")
                .long("no-dropdb")
                .help("Keep the databases created for the run")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("require-demo")
                .long("require-demo")
                .help("Create databases with demo data")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("report-json")
                .long("report-json")
                .value_name("PATH")
                .help("Write the run report as JSON"),
        )
}
