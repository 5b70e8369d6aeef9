//! Reference scenarios: one module, a chain, an external database, a missing
//! descriptor and a failing installation.

use crate::common::*;
use proctor::{
    ensure, DatabaseSource, ErrorKind, HostRuntime, ModulePhase, ModuleState, ProctorError,
    SuiteRegistry, TestRunCoordinator, TestStatus, TestSuite,
};
use std::sync::Arc;

// ============================================================================
// A: a single module
// ============================================================================

#[test]
fn single_base_module_passes_on_a_template_copy() {
    let addons = Addons::new().module("base", &[]);
    let runtime = runtime();
    let report = TestRunCoordinator::new(runtime.clone(), addons.config())
        .run(&names(&["base"]))
        .unwrap();

    assert!(report.is_success(), "{:?}", report);
    assert_eq!(report.exit_code(), 0);
    let outcome = report.module("base").unwrap();
    assert_eq!(outcome.phase, ModulePhase::Reported);
    assert_eq!(outcome.count(TestStatus::Passed), 1);

    let events = runtime.events();
    let created = created_databases(&events);
    assert_eq!(created.len(), 1);
    assert!(created[0].starts_with("test_"));
    assert!(events.contains(&RuntimeEvent::CreateDatabase {
        name: created[0].clone(),
        source: DatabaseSource::Template("base".into()),
    }));
    // base ships with the template
    assert!(installs(&events).is_empty());
    assert!(events.contains(&RuntimeEvent::DropDatabase(created[0].clone())));
    assert_eq!(runtime.server().databases(), vec!["base".to_string()]);
}

// ============================================================================
// B: a dependency chain
// ============================================================================

#[test]
fn chain_is_tested_in_dependency_order() {
    let addons = Addons::new()
        .module("base", &[])
        .module("module_a", &["base"])
        .module("module_b", &["module_a"])
        .module("module_c", &["module_b"]);
    let runtime = runtime();
    let report = TestRunCoordinator::new(runtime.clone(), addons.config())
        .run(&names(&["module_c", "module_a", "module_b"]))
        .unwrap();

    assert!(report.is_success(), "{:?}", report);
    let order: Vec<&str> = report.modules.iter().map(|m| m.module.as_str()).collect();
    assert_eq!(order, vec!["module_a", "module_b", "module_c"]);

    // every module gets a fresh database and brings its dependencies along
    let events = runtime.events();
    assert_eq!(created_databases(&events).len(), 3);
    assert_eq!(
        installs(&events),
        vec![
            vec!["module_a".to_string()],
            vec!["module_a".to_string(), "module_b".to_string()],
            vec![
                "module_a".to_string(),
                "module_b".to_string(),
                "module_c".to_string()
            ],
        ]
    );
    let databases: Vec<_> = report.modules.iter().filter_map(|m| m.database.clone()).collect();
    assert_eq!(databases, created_databases(&events));
}

#[test]
fn include_dependencies_tests_the_whole_chain() {
    let addons = Addons::new()
        .module("base", &[])
        .module("module_a", &["base"])
        .module("module_b", &["module_a"]);
    let mut config = addons.config();
    config.test_dependencies = true;
    let report = TestRunCoordinator::new(runtime(), config)
        .run(&names(&["module_b"]))
        .unwrap();

    let order: Vec<&str> = report.modules.iter().map(|m| m.module.as_str()).collect();
    assert_eq!(order, vec!["base", "module_a", "module_b"]);
    assert!(report.is_success());
}

// ============================================================================
// C: an external database
// ============================================================================

#[test]
fn configured_database_is_used_and_never_dropped() {
    let addons = Addons::new().module("base", &[]).module("sale", &["base"]);
    let runtime = runtime();
    runtime
        .create_database("shared", &DatabaseSource::Template("base".into()))
        .unwrap();
    runtime.clear_events();

    let mut config = addons.config();
    config.database = Some("shared".into());
    let loader = SuiteRegistry::new().register(
        "sale",
        TestSuite::new("SaleSuite").case("test_write", |env| {
            let cursor = env.cursor()?;
            let mut cursor = cursor.lock();
            cursor.execute("CREATE TABLE sale_order", &[])?;
            cursor.execute("INSERT INTO sale_order", &["SO001".into()])?;
            ensure(env.database() == "shared", "wrong database")
        }),
    );
    let report = TestRunCoordinator::new(runtime.clone(), config)
        .with_loader(Arc::new(loader))
        .run(&names(&["sale"]))
        .unwrap();

    assert!(report.is_success(), "{:?}", report);
    let events = runtime.events();
    assert!(created_databases(&events).is_empty());
    assert!(!events.iter().any(|e| matches!(
        e,
        RuntimeEvent::DropDatabase(_) | RuntimeEvent::TerminateSessions(_)
    )));
    assert!(runtime.database_exists("shared"));
    assert_eq!(
        runtime.module_state("shared", "sale").unwrap(),
        ModuleState::Installed
    );
    // a kept database keeps the writes of its tests
    assert_eq!(runtime.server().rows("shared", "sale_order").unwrap().len(), 1);
}

#[test]
fn missing_configured_database_errors_the_module() {
    let addons = Addons::new().module("base", &[]);
    let mut config = addons.config();
    config.database = Some("nowhere".into());
    let report = TestRunCoordinator::new(runtime(), config)
        .run(&names(&["base"]))
        .unwrap();

    let outcome = report.module("base").unwrap();
    assert!(!outcome.is_success());
    assert!(outcome.database.is_none());
    assert!(outcome.error.as_deref().unwrap_or_default().contains("nowhere"));
}

// ============================================================================
// D: a missing descriptor
// ============================================================================

#[test]
fn missing_manifest_is_fatal_before_any_database_operation() {
    let addons = Addons::new()
        .module("base", &[])
        .module("sale", &["base", "broken"])
        .bare_dir("broken");
    let runtime = runtime();
    let recorder = Arc::new(Recorder::default());
    let err = TestRunCoordinator::new(runtime.clone(), addons.config())
        .with_observer(recorder.clone())
        .run(&names(&["sale"]))
        .unwrap_err();

    assert!(matches!(err, ProctorError::ManifestMissing { .. }), "{:?}", err);
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert!(err.is_fatal());
    assert!(runtime.events().is_empty());
    assert!(recorder.calls().is_empty());
}

#[test]
fn dependency_cycle_is_fatal() {
    let addons = Addons::new()
        .module("base", &[])
        .module("a", &["base", "b"])
        .module("b", &["a"]);
    let runtime = runtime();
    let err = TestRunCoordinator::new(runtime.clone(), addons.config())
        .run(&names(&["a"]))
        .unwrap_err();
    assert!(matches!(err, ProctorError::DependencyCycle { .. }), "{:?}", err);
    assert!(runtime.events().is_empty());
}

// ============================================================================
// E: a failing installation
// ============================================================================

#[test]
fn failing_install_does_not_stop_later_modules() {
    let addons = Addons::new()
        .module("base", &[])
        .module("crm", &["base"])
        .module("sale", &["base"]);
    let runtime = runtime();
    runtime.fail_install("crm");
    let report = TestRunCoordinator::new(runtime.clone(), addons.config())
        .run(&names(&["crm", "sale"]))
        .unwrap();

    let crm = report.module("crm").unwrap();
    assert_eq!(crm.phase, ModulePhase::Reported);
    assert!(crm.tests.is_empty());
    assert!(crm
        .error
        .as_deref()
        .unwrap_or_default()
        .contains("Installation of module crm failed"));

    assert!(report.module("sale").unwrap().is_success());
    assert_eq!(report.exit_code(), 1);
    assert_eq!(report.failed_modules(), vec![&ModuleName::from("crm")]);
    // the failed module's database was still dropped
    assert_eq!(runtime.server().databases(), vec!["base".to_string()]);
}

#[test]
fn failing_test_fails_only_its_module() {
    let addons = Addons::new()
        .module("base", &[])
        .module("crm", &["base"])
        .module("sale", &["base"]);
    let loader = SuiteRegistry::new().register(
        "crm",
        TestSuite::new("CrmSuite")
            .case("test_ok", |_| Ok(()))
            .case("test_broken", |_| {
                assert_eq!(1 + 1, 3);
                Ok(())
            }),
    );
    let report = TestRunCoordinator::new(runtime(), addons.config())
        .with_loader(Arc::new(loader))
        .run(&names(&["crm", "sale"]))
        .unwrap();

    let crm = report.module("crm").unwrap();
    assert!(crm.error.is_none());
    assert_eq!(crm.count(TestStatus::Passed), 1);
    assert_eq!(crm.count(TestStatus::Failed), 1);
    assert!(report.module("sale").unwrap().is_success());
    assert_eq!(report.exit_code(), 1);
}
