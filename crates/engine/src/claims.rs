//! Process-wide database claims
//!
//! Two runs in one process must not share a database: one could drop it, or
//! commit into it, under the other. A run claims every database it uses and
//! releases the claim when the guard drops. Runs in other processes are not
//! covered.

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use proctor_core::{ProctorError, ProctorResult};
use std::collections::HashSet;

/// Databases currently claimed by a run in this process
static CLAIMED_DATABASES: Lazy<Mutex<HashSet<String>>> = Lazy::new(|| Mutex::new(HashSet::new()));

/// Exclusive use of a database for the lifetime of the guard
#[derive(Debug)]
pub struct DatabaseClaim {
    name: String,
}

impl DatabaseClaim {
    /// Claim `name`
    ///
    /// # Errors
    ///
    /// `Provisioning` if another run in this process holds it.
    pub fn acquire(name: &str) -> ProctorResult<Self> {
        let mut claimed = CLAIMED_DATABASES.lock();
        if !claimed.insert(name.to_string()) {
            return Err(ProctorError::provisioning(
                name,
                "database is in use by another run in this process",
            ));
        }
        Ok(Self {
            name: name.to_string(),
        })
    }

    /// Claimed database
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Check if `name` is claimed
    pub fn is_claimed(name: &str) -> bool {
        CLAIMED_DATABASES.lock().contains(name)
    }
}

impl Drop for DatabaseClaim {
    fn drop(&mut self) {
        CLAIMED_DATABASES.lock().remove(&self.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_is_exclusive_until_dropped() {
        let claim = DatabaseClaim::acquire("claims_test_db").unwrap();
        assert!(DatabaseClaim::is_claimed("claims_test_db"));
        assert!(DatabaseClaim::acquire("claims_test_db").is_err());

        drop(claim);
        assert!(!DatabaseClaim::is_claimed("claims_test_db"));
        let again = DatabaseClaim::acquire("claims_test_db").unwrap();
        assert_eq!(again.name(), "claims_test_db");
    }
}
