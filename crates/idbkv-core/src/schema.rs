//! Schema step run during a version change

use tracing::{debug, info};

use crate::config::StoreSchema;
use crate::engine::{UpgradeTarget, VersionChange};
use crate::error::EngineResult;
use crate::logging::prefix;

/// Ensure the object store described by `schema` exists.
///
/// Engines call this from inside their open sequence whenever the database is
/// new or stored at a lower version. Running it again against a database that
/// already has the store changes nothing.
///
/// Returns `true` if the store was created.
pub fn ensure_schema(
    target: &mut dyn UpgradeTarget,
    change: VersionChange,
    schema: &StoreSchema,
) -> EngineResult<bool> {
    info!(
        "{} Database upgrade needed (v{} -> v{})",
        prefix::DB,
        change.old_version,
        change.new_version
    );

    if target.has_store(&schema.name) {
        debug!("{} Object store '{}' already present", prefix::DB, schema.name);
        return Ok(false);
    }

    target.create_store(schema)?;
    info!(
        "{} Object store '{}' created (key path '{}', auto increment {})",
        prefix::DB,
        schema.name,
        schema.key_path,
        schema.auto_increment
    );
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;

    #[derive(Default)]
    struct Stores {
        created: Vec<StoreSchema>,
        fail: bool,
    }

    impl UpgradeTarget for Stores {
        fn has_store(&self, name: &str) -> bool {
            self.created.iter().any(|s| s.name == name)
        }

        fn create_store(&mut self, schema: &StoreSchema) -> EngineResult<()> {
            if self.fail {
                return Err(EngineError::Open("create failed".into()));
            }
            self.created.push(schema.clone());
            Ok(())
        }
    }

    const FIRST: VersionChange = VersionChange {
        old_version: 0,
        new_version: 1,
    };

    #[test]
    fn test_creates_missing_store() {
        let mut stores = Stores::default();
        assert!(ensure_schema(&mut stores, FIRST, &StoreSchema::default()).unwrap());
        assert_eq!(stores.created.len(), 1);
        assert_eq!(stores.created[0].name, "my-store");
    }

    #[test]
    fn test_is_idempotent() {
        let mut stores = Stores::default();
        let schema = StoreSchema::default();
        ensure_schema(&mut stores, FIRST, &schema).unwrap();
        let second = VersionChange {
            old_version: 1,
            new_version: 2,
        };
        assert!(!ensure_schema(&mut stores, second, &schema).unwrap());
        assert_eq!(stores.created.len(), 1);
    }

    #[test]
    fn test_propagates_create_failure() {
        let mut stores = Stores {
            fail: true,
            ..Default::default()
        };
        let result = ensure_schema(&mut stores, FIRST, &StoreSchema::default());
        assert!(matches!(result, Err(EngineError::Open(_))));
    }
}
