//! [`RequirementManager`] – exclusive ownership of robot subsystems.
//!
//! Before a command runs, the scheduler claims every subsystem the command
//! requires.  A claim is all-or-nothing: if any requested subsystem is already
//! held, nothing is claimed and a [`ControlError::ResourceConflict`] names
//! the first conflicting subsystem and its current holder.

use std::collections::HashMap;

use krypton_types::ControlError;

/// Tracks which holder owns each named subsystem.
///
/// # Example
///
/// ```
/// use krypton_kernel::requirements::RequirementManager;
/// use krypton_types::ControlError;
///
/// let mut mgr = RequirementManager::new();
/// mgr.claim("drive_90deg", &["drivetrain".to_string()]).unwrap();
///
/// let err = mgr.claim("tape_approach", &["drivetrain".to_string()]).unwrap_err();
/// assert!(matches!(err, ControlError::ResourceConflict { .. }));
///
/// mgr.release("drive_90deg");
/// assert!(mgr.claim("tape_approach", &["drivetrain".to_string()]).is_ok());
/// ```
#[derive(Debug, Default)]
pub struct RequirementManager {
    holders: HashMap<String, String>,
}

impl RequirementManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim every resource in `resources` for `holder`.
    ///
    /// Re-claiming a resource the same holder already owns is allowed.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::ResourceConflict`] when any resource is held by
    /// a different holder.  No resource is claimed in that case.
    pub fn claim(&mut self, holder: &str, resources: &[String]) -> Result<(), ControlError> {
        if let Some((resource, current)) = resources.iter().find_map(|r| {
            self.holders
                .get(r)
                .filter(|h| h.as_str() != holder)
                .map(|h| (r, h))
        }) {
            return Err(ControlError::ResourceConflict {
                resource: resource.clone(),
                holder: current.clone(),
            });
        }
        for resource in resources {
            self.holders.insert(resource.clone(), holder.to_string());
        }
        Ok(())
    }

    /// Release every resource held by `holder`.  No-ops for unknown holders.
    pub fn release(&mut self, holder: &str) {
        self.holders.retain(|_, h| h != holder);
    }

    /// Current holder of `resource`, if any.
    pub fn holder(&self, resource: &str) -> Option<&str> {
        self.holders.get(resource).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.holders.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn res(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn claim_and_query_holder() {
        let mut mgr = RequirementManager::new();
        mgr.claim("aim", &res(&["turret", "vision"])).unwrap();
        assert_eq!(mgr.holder("turret"), Some("aim"));
        assert_eq!(mgr.holder("vision"), Some("aim"));
        assert_eq!(mgr.holder("hood"), None);
    }

    #[test]
    fn conflict_names_resource_and_holder() {
        let mut mgr = RequirementManager::new();
        mgr.claim("aim_turret", &res(&["turret"])).unwrap();
        let err = mgr.claim("manual_turret", &res(&["turret"])).unwrap_err();
        assert_eq!(
            err,
            ControlError::ResourceConflict {
                resource: "turret".to_string(),
                holder: "aim_turret".to_string(),
            }
        );
    }

    #[test]
    fn failed_claim_is_all_or_nothing() {
        let mut mgr = RequirementManager::new();
        mgr.claim("a", &res(&["hood"])).unwrap();
        assert!(mgr.claim("b", &res(&["turret", "hood"])).is_err());
        assert_eq!(mgr.holder("turret"), None);
    }

    #[test]
    fn reclaim_by_same_holder_is_idempotent() {
        let mut mgr = RequirementManager::new();
        mgr.claim("a", &res(&["drivetrain"])).unwrap();
        assert!(mgr.claim("a", &res(&["drivetrain"])).is_ok());
    }

    #[test]
    fn release_frees_only_that_holder() {
        let mut mgr = RequirementManager::new();
        mgr.claim("a", &res(&["drivetrain"])).unwrap();
        mgr.claim("b", &res(&["turret"])).unwrap();
        mgr.release("a");
        assert_eq!(mgr.holder("drivetrain"), None);
        assert_eq!(mgr.holder("turret"), Some("b"));
        mgr.release("ghost");
        mgr.release("b");
        assert!(mgr.is_empty());
    }
}
