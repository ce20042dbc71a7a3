use crate::core::ViewTarget;
use serde::Serialize;
use std::fmt;

/// Statements one bundle's unit of work would run, without running them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ViewPlan {
    pub target: ViewTarget,
    pub view_name: String,
    /// Set when meta views are enabled
    pub meta_view_name: Option<String>,
    /// Output columns of the view, in order
    pub columns: Vec<String>,
    /// Session `group_concat_max_len` applied before the unit of work
    pub group_concat_max_len: u64,
    /// DDL run between `START TRANSACTION` and `COMMIT`
    pub statements: Vec<String>,
}

impl ViewPlan {
    /// The plan as a runnable SQL script
    pub fn to_script(&self) -> String {
        let mut script = format!(
            "SET SESSION group_concat_max_len = {};\nSTART TRANSACTION;\n",
            self.group_concat_max_len
        );
        for statement in &self.statements {
            script.push_str(statement);
            script.push_str(";\n");
        }
        script.push_str("COMMIT;\n");
        script
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BundleFailure {
    pub entity_kind: String,
    pub bundle: String,
    pub reason: String,
}

impl fmt::Display for BundleFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}: {}", self.entity_kind, self.bundle, self.reason)
    }
}

/// Outcome of a batch rebuild. Bundles skipped as ineligible appear in
/// neither list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RebuildReport {
    /// Created or updated view names, in processing order
    pub created: Vec<String>,
    pub failed: Vec<BundleFailure>,
}

impl RebuildReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}
