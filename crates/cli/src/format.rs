//! RunReport → human readable summary.

use std::fmt::Write;

use proctor_core::{ModuleName, RunReport, TestStatus};

/// One line per module, failing tests indented below, then a summary.
pub fn format_report(report: &RunReport) -> String {
    let mut out = String::new();
    for outcome in report.outcomes() {
        let mark = if outcome.is_success() { "PASS" } else { "FAIL" };
        let _ = writeln!(
            out,
            "{} {} ({} passed, {} failed, {} errors, {} skipped, {:.2}s)",
            mark,
            outcome.module,
            outcome.count(TestStatus::Passed),
            outcome.count(TestStatus::Failed),
            outcome.count(TestStatus::Error),
            outcome.count(TestStatus::Skipped),
            outcome.duration.as_secs_f64()
        );
        if let Some(error) = &outcome.error {
            let _ = writeln!(out, "    error: {}", error);
        }
        for test in outcome.failures() {
            let _ = writeln!(
                out,
                "    {} {}.{}: {}",
                test.status,
                test.classname,
                test.name,
                test.message.as_deref().unwrap_or("")
            );
        }
    }
    let failed = report.failed_modules();
    if failed.is_empty() {
        let _ = write!(out, "{} module(s) passed", report.modules.len());
    } else {
        let names: Vec<&str> = failed.iter().map(|m| m.as_str()).collect();
        let _ = write!(out, "{} module(s) failed: {}", failed.len(), names.join(", "));
    }
    out
}

/// One module per line
pub fn format_modules(modules: &[ModuleName]) -> String {
    modules
        .iter()
        .map(|m| m.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}
