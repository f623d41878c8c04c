// ============================================================================
// Store Migrations
// ============================================================================
//
// Migrations run once per open, on the raw snapshot document, before any
// record is decoded. A fresh store has no document and simply adopts the
// target schema version.
//
// ============================================================================

use crate::core::{Result, StoreError};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// The store as the migration collaborator sees it
#[derive(Debug, Clone, PartialEq)]
pub struct StoreContainer {
    pub name: String,
    pub schema_version: u32,
    /// Snapshot document, `None` for a store that was never written
    pub document: Option<Value>,
}

impl StoreContainer {
    pub fn new(name: impl Into<String>, document: Option<Value>) -> Self {
        let schema_version = document
            .as_ref()
            .and_then(|doc| doc.get("schema_version"))
            .and_then(Value::as_u64)
            .map(|v| v.min(u32::MAX as u64) as u32)
            .unwrap_or(1);
        Self {
            name: name.into(),
            schema_version,
            document,
        }
    }
}

/// Upgrades a store before it is loaded
pub trait Migrator: Send + Sync {
    fn perform_migrations(&self, container: StoreContainer) -> Result<StoreContainer>;
}

/// Leaves every store as found
#[derive(Debug, Default, Clone, Copy)]
pub struct NoMigrations;

impl Migrator for NoMigrations {
    fn perform_migrations(&self, container: StoreContainer) -> Result<StoreContainer> {
        Ok(container)
    }
}

pub type DocumentMigrator = Arc<dyn Fn(&mut Value) -> Result<()> + Send + Sync>;

/// One `from -> to` upgrade of the snapshot document
#[derive(Clone)]
pub struct MigrationStep {
    pub from_version: u32,
    pub to_version: u32,
    migrate: DocumentMigrator,
}

impl MigrationStep {
    pub fn new<F>(from_version: u32, to_version: u32, migrate: F) -> Self
    where
        F: Fn(&mut Value) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            from_version,
            to_version,
            migrate: Arc::new(migrate),
        }
    }
}

impl fmt::Debug for MigrationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationStep")
            .field("from_version", &self.from_version)
            .field("to_version", &self.to_version)
            .finish_non_exhaustive()
    }
}

/// Ordered chain of steps up to a target schema version
#[derive(Debug, Clone)]
pub struct MigrationPlan {
    current_version: u32,
    steps: Vec<MigrationStep>,
}

impl MigrationPlan {
    pub fn new(current_version: u32) -> Self {
        Self {
            current_version,
            steps: Vec::new(),
        }
    }

    pub fn current_version(&self) -> u32 {
        self.current_version
    }

    pub fn steps(&self) -> &[MigrationStep] {
        &self.steps
    }

    /// Adds a step, validating the plan immediately.
    pub fn add_step(&mut self, step: MigrationStep) -> Result<()> {
        self.steps.push(step);
        if let Err(err) = self.validate() {
            self.steps.pop();
            return Err(err);
        }
        Ok(())
    }

    pub fn with_step<F>(mut self, from_version: u32, to_version: u32, migrate: F) -> Result<Self>
    where
        F: Fn(&mut Value) -> Result<()> + Send + Sync + 'static,
    {
        self.add_step(MigrationStep::new(from_version, to_version, migrate))?;
        Ok(self)
    }

    /// Checks versions >= 1, `from < to <= current` and unique start versions.
    pub fn validate(&self) -> Result<()> {
        if self.current_version == 0 {
            return Err(StoreError::Migration("Schema version must be >= 1".to_string()));
        }

        let mut seen_from = HashSet::<u32>::new();
        for step in &self.steps {
            if step.from_version == 0 {
                return Err(StoreError::Migration(
                    "Migration 'from_version' must be >= 1".to_string(),
                ));
            }
            if step.to_version <= step.from_version {
                return Err(StoreError::Migration(format!(
                    "Migration step {} -> {} is invalid",
                    step.from_version, step.to_version
                )));
            }
            if step.to_version > self.current_version {
                return Err(StoreError::Migration(format!(
                    "Migration step {} -> {} exceeds current schema version {}",
                    step.from_version, step.to_version, self.current_version
                )));
            }
            if !seen_from.insert(step.from_version) {
                return Err(StoreError::Migration(format!(
                    "Duplicate migration step starting at version {}",
                    step.from_version
                )));
            }
        }

        Ok(())
    }

    fn resolve_chain(&self, from_version: u32) -> Result<Vec<&MigrationStep>> {
        if from_version > self.current_version {
            return Err(StoreError::Migration(format!(
                "Cannot migrate down from schema version {} to {}",
                from_version, self.current_version
            )));
        }

        let by_from: HashMap<u32, &MigrationStep> =
            self.steps.iter().map(|step| (step.from_version, step)).collect();

        let mut cursor = from_version;
        let mut chain = Vec::new();
        while cursor < self.current_version {
            let step = by_from.get(&cursor).copied().ok_or_else(|| {
                StoreError::Migration(format!(
                    "No migration step from schema version {} (target {})",
                    cursor, self.current_version
                ))
            })?;
            chain.push(step);
            cursor = step.to_version;
        }
        Ok(chain)
    }
}

impl Migrator for MigrationPlan {
    fn perform_migrations(&self, mut container: StoreContainer) -> Result<StoreContainer> {
        self.validate()?;

        if container.document.is_none() {
            container.schema_version = self.current_version;
            return Ok(container);
        }

        let chain = self.resolve_chain(container.schema_version)?;
        if let Some(document) = container.document.as_mut() {
            for step in chain {
                (step.migrate)(document)?;
                container.schema_version = step.to_version;
                if let Some(object) = document.as_object_mut() {
                    object.insert("schema_version".to_string(), Value::from(step.to_version));
                }
            }
        }
        Ok(container)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_validation_rejects_bad_steps() {
        assert!(MigrationPlan::new(0).validate().is_err());
        assert!(MigrationPlan::new(3).with_step(0, 1, |_| Ok(())).is_err());
        assert!(MigrationPlan::new(3).with_step(2, 2, |_| Ok(())).is_err());
        assert!(MigrationPlan::new(3).with_step(2, 4, |_| Ok(())).is_err());
        assert!(
            MigrationPlan::new(3)
                .with_step(1, 2, |_| Ok(()))
                .unwrap()
                .with_step(1, 3, |_| Ok(()))
                .is_err()
        );
    }

    #[test]
    fn test_fresh_store_adopts_target_version() {
        let plan = MigrationPlan::new(4);
        let container = plan
            .perform_migrations(StoreContainer::new("tasks", None))
            .unwrap();
        assert_eq!(container.schema_version, 4);
    }

    #[test]
    fn test_chain_runs_in_order() {
        let plan = MigrationPlan::new(3)
            .with_step(2, 3, |doc| {
                doc["steps"].as_array_mut().unwrap().push(json!("2->3"));
                Ok(())
            })
            .unwrap()
            .with_step(1, 2, |doc| {
                doc["steps"] = json!(["1->2"]);
                Ok(())
            })
            .unwrap();

        let container = StoreContainer::new("tasks", Some(json!({ "schema_version": 1 })));
        let migrated = plan.perform_migrations(container).unwrap();
        assert_eq!(migrated.schema_version, 3);
        let document = migrated.document.unwrap();
        assert_eq!(document["steps"], json!(["1->2", "2->3"]));
        assert_eq!(document["schema_version"], json!(3));
    }

    #[test]
    fn test_gap_and_downgrade_fail() {
        let plan = MigrationPlan::new(3).with_step(1, 2, |_| Ok(())).unwrap();
        let gap = StoreContainer::new("tasks", Some(json!({ "schema_version": 1 })));
        assert!(plan.perform_migrations(gap).is_err());

        let newer = StoreContainer::new("tasks", Some(json!({ "schema_version": 5 })));
        assert!(plan.perform_migrations(newer).is_err());
    }
}
