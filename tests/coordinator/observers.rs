//! Observer notifications and the whole-runtime suite.

use crate::common::*;
use proctor::{JsonReportObserver, SuiteRegistry, TestFailure, TestRunCoordinator, TestSuite};
use std::sync::Arc;

#[test]
fn observers_see_the_run_in_order() {
    let addons = Addons::new().module("base", &[]).module("sale", &["base"]);
    let recorder = Arc::new(Recorder::default());
    TestRunCoordinator::new(runtime(), addons.config())
        .with_observer(recorder.clone())
        .run(&names(&["sale", "base"]))
        .unwrap();

    assert_eq!(
        recorder.calls(),
        vec![
            "run_started base,sale",
            "module_started base",
            "module_finished base ok",
            "module_started sale",
            "module_finished sale ok",
            "run_finished 0",
        ]
    );
}

#[test]
fn whole_runtime_suite_runs_first() {
    let addons = Addons::new().module("base", &[]);
    let recorder = Arc::new(Recorder::default());
    let loader = SuiteRegistry::new().runtime(
        TestSuite::new("RuntimeChecks")
            .case("test_admin_exists", |env| {
                proctor::ensure(env.context().and_then(|c| c.lang()) == Some("en_US"), "no lang")
            })
            .case("test_not_ready", |_| Err(TestFailure::skipped("not ready"))),
    );
    let report = TestRunCoordinator::new(runtime(), addons.config())
        .with_loader(Arc::new(loader))
        .with_observer(recorder.clone())
        .run(&names(&["base"]))
        .unwrap();

    let whole = report.whole_runtime.as_ref().unwrap();
    assert_eq!(whole.module.as_str(), proctor_engine::WHOLE_RUNTIME);
    assert!(whole.is_success(), "{:?}", whole);
    assert_eq!(whole.tests.len(), 2);
    assert_eq!(recorder.calls()[1], format!("module_started {}", proctor_engine::WHOLE_RUNTIME));
    assert_eq!(recorder.calls()[3], "module_started base");
}

#[test]
fn json_report_is_written() {
    let addons = Addons::new().module("base", &[]);
    let out = addons.path().join("report.json");
    let report = TestRunCoordinator::new(runtime(), addons.config())
        .with_observer(Arc::new(JsonReportObserver::new(&out)))
        .run(&names(&["base"]))
        .unwrap();

    let written: RunReport = serde_json::from_slice(&std::fs::read(&out).unwrap()).unwrap();
    assert_eq!(written.modules.len(), 1);
    assert_eq!(written.modules[0].module, report.modules[0].module);
    assert_eq!(written.exit_code(), 0);
}
