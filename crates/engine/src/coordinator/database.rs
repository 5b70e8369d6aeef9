//! Per-module database lifecycle
//!
//! A configured database is claimed and used as is. Otherwise a fresh one is
//! created from the template, or from scratch when demo data is needed, and
//! dropped afterwards unless the run keeps its databases.

use super::TestRunCoordinator;
use crate::claims::DatabaseClaim;
use crate::runtime::DatabaseSource;
use proctor_concurrency::Disposition;
use proctor_core::{ModuleOutcome, ModulePhase, ProctorError, ProctorResult};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

static DATABASE_SEQ: AtomicU64 = AtomicU64::new(0);

/// A database in use by one module run
struct Provisioned {
    claim: DatabaseClaim,
    created: bool,
}

impl Provisioned {
    fn name(&self) -> &str {
        self.claim.name()
    }
}

impl TestRunCoordinator {
    /// Provision a database, run `f` on it, then tear it down
    pub(super) fn with_database<F>(
        &self,
        demo: bool,
        outcome: &mut ModuleOutcome,
        f: F,
    ) -> ProctorResult<()>
    where
        F: FnOnce(&str, Disposition, &mut ModuleOutcome) -> ProctorResult<()>,
    {
        let db = self.provision(demo)?;
        outcome.database = Some(db.name().to_string());
        let disposition = if self.drops(&db) {
            Disposition::Rollback
        } else {
            Disposition::Commit
        };

        let result = self
            .runtime
            .disable_scheduler(db.name())
            .and_then(|()| outcome.phase.advance(ModulePhase::DatabaseReady))
            .and_then(|()| f(db.name(), disposition, outcome));
        let teardown = self.teardown(&db);

        match (result, teardown) {
            (Err(e), Err(te)) => {
                warn!(database = %db.name(), error = %te, "teardown failed after module error");
                Err(e)
            }
            (Err(e), Ok(())) => Err(e),
            (Ok(()), teardown) => teardown,
        }
    }

    fn drops(&self, db: &Provisioned) -> bool {
        db.created && self.config.drop_database
    }

    fn provision(&self, demo: bool) -> ProctorResult<Provisioned> {
        if let Some(name) = &self.config.database {
            if !self.runtime.database_exists(name) {
                return Err(ProctorError::provisioning(
                    name.as_str(),
                    "configured database does not exist",
                ));
            }
            if demo && !self.config.require_demo {
                warn!(database = %name, "suite requires demo data; using configured database as is");
            }
            let claim = DatabaseClaim::acquire(name)?;
            info!(database = %name, "using configured database");
            return Ok(Provisioned {
                claim,
                created: false,
            });
        }

        let name = format!(
            "test_{}_{}",
            chrono::Utc::now().timestamp(),
            DATABASE_SEQ.fetch_add(1, Ordering::Relaxed)
        );
        let claim = DatabaseClaim::acquire(&name)?;
        let demo = demo || self.config.require_demo;
        let source = if self.config.use_template && !demo {
            DatabaseSource::Template(self.config.template.clone())
        } else {
            DatabaseSource::Scratch { demo }
        };
        self.runtime
            .create_database(&name, &source)
            .map_err(|e| match e {
                ProctorError::Provisioning { .. } => e,
                other => ProctorError::provisioning(name.as_str(), other.to_string()),
            })?;
        info!(database = %name, source = %source, "database provisioned");
        Ok(Provisioned {
            claim,
            created: true,
        })
    }

    fn teardown(&self, db: &Provisioned) -> ProctorResult<()> {
        if !self.drops(db) {
            debug!(database = %db.name(), "keeping database");
            return Ok(());
        }
        let provisioning = |e: ProctorError| ProctorError::provisioning(db.name(), e.to_string());
        let terminated = self.runtime.terminate_sessions(db.name()).map_err(provisioning)?;
        self.runtime.drop_database(db.name()).map_err(provisioning)?;
        info!(database = %db.name(), terminated, "database dropped");
        Ok(())
    }

}
