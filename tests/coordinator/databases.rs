//! Database lifecycle: provisioning source, teardown, kept databases.

use crate::common::*;
use proctor::{DatabaseSource, HostRuntime, TestRunCoordinator, TestSuite};
use std::sync::Arc;

#[test]
fn no_dropdb_keeps_created_databases_and_commits() {
    let addons = Addons::new().module("base", &[]).module("sale", &["base"]);
    let runtime = runtime();
    let mut config = addons.config();
    config.drop_database = false;
    let loader = proctor::SuiteRegistry::new().register(
        "sale",
        TestSuite::new("SaleSuite").case("test_write", |env| {
            let cursor = env.cursor()?;
            let mut cursor = cursor.lock();
            cursor.execute("CREATE TABLE note", &[])?;
            cursor.execute("INSERT INTO note", &["kept".into()])?;
            Ok(())
        }),
    );
    let report = TestRunCoordinator::new(runtime.clone(), config)
        .with_loader(Arc::new(loader))
        .run(&names(&["sale"]))
        .unwrap();

    let database = report.module("sale").unwrap().database.clone().unwrap();
    assert!(runtime.database_exists(&database));
    assert_eq!(runtime.server().rows(&database, "note").unwrap().len(), 1);
    assert!(!runtime
        .events()
        .iter()
        .any(|e| matches!(e, RuntimeEvent::DropDatabase(_))));
}

#[test]
fn ephemeral_databases_roll_back_test_writes() {
    let addons = Addons::new().module("base", &[]).module("sale", &["base"]);
    let runtime = runtime();
    let loader = proctor::SuiteRegistry::new().register(
        "sale",
        TestSuite::new("SaleSuite")
            .case("test_write", |env| {
                let cursor = env.cursor()?;
                let mut cursor = cursor.lock();
                cursor.execute("CREATE TABLE note", &[])?;
                Ok(())
            })
            .case("test_isolated", |env| {
                let cursor = env.cursor()?;
                let mut cursor = cursor.lock();
                proctor::ensure(
                    cursor.execute("SELECT * FROM note", &[]).is_err(),
                    "writes leaked between tests",
                )
            }),
    );
    let report = TestRunCoordinator::new(runtime, addons.config())
        .with_loader(Arc::new(loader))
        .run(&names(&["sale"]))
        .unwrap();
    assert!(report.is_success(), "{:?}", report);
}

#[test]
fn without_template_databases_are_built_from_scratch() {
    let addons = Addons::new().module("base", &[]);
    let runtime = runtime();
    let mut config = addons.config();
    config.use_template = false;
    let report = TestRunCoordinator::new(runtime.clone(), config)
        .run(&names(&["base"]))
        .unwrap();

    assert!(report.is_success(), "{:?}", report);
    assert!(runtime.events().iter().any(|e| matches!(
        e,
        RuntimeEvent::CreateDatabase {
            source: DatabaseSource::Scratch { demo: false },
            ..
        }
    )));
}

#[test]
fn creation_failure_errors_every_module_without_stopping_the_run() {
    let addons = Addons::new().module("base", &[]).module("sale", &["base"]);
    let runtime = runtime();
    runtime.fail_create(true);
    let report = TestRunCoordinator::new(runtime.clone(), addons.config())
        .run(&names(&["base", "sale"]))
        .unwrap();

    assert_eq!(report.modules.len(), 2);
    for outcome in &report.modules {
        assert!(!outcome.is_success());
        assert!(outcome
            .error
            .as_deref()
            .unwrap_or_default()
            .contains("Provisioning failed"));
    }
    assert_eq!(report.exit_code(), 1);
}

#[test]
fn registry_reload_failure_is_an_installation_error() {
    let addons = Addons::new().module("base", &[]).module("sale", &["base"]);
    let runtime = runtime();
    runtime.fail_reload(true);
    let report = TestRunCoordinator::new(runtime.clone(), addons.config())
        .run(&names(&["sale"]))
        .unwrap();

    let outcome = report.module("sale").unwrap();
    assert!(outcome
        .error
        .as_deref()
        .unwrap_or_default()
        .contains("Installation of module sale failed"));
    assert_eq!(runtime.server().databases(), vec!["base".to_string()]);
}
