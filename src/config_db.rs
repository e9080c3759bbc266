use std::{collections::BTreeMap, path::Path};

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};

use crate::error::Result;

const SETTINGS: TableDefinition<&str, &str> = TableDefinition::new("settings");

/// Persisted operator settings (`lexbert config`).
pub struct ConfigDb {
    db: Database,
}

impl ConfigDb {
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path)?;

        let txn = db.begin_write()?;
        txn.open_table(SETTINGS)?;
        txn.commit()?;

        Ok(Self { db })
    }

    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(SETTINGS)?;
            table.insert(key, value)?;
        }
        txn.commit()?;
        Ok(())
    }

    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(SETTINGS)?;
        Ok(table.get(key)?.map(|v| v.value().to_string()))
    }

    pub fn remove_setting(&self, key: &str) -> Result<bool> {
        let txn = self.db.begin_write()?;
        let removed = {
            let mut table = txn.open_table(SETTINGS)?;
            table.remove(key)?.is_some()
        };
        txn.commit()?;
        Ok(removed)
    }

    /// Every stored setting, read in one transaction.
    pub fn settings(&self) -> Result<BTreeMap<String, String>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(SETTINGS)?;
        let mut result = BTreeMap::new();
        for entry in table.iter()? {
            let (k, v) = entry?;
            result.insert(k.value().to_string(), v.value().to_string());
        }
        Ok(result)
    }
}

impl std::fmt::Debug for ConfigDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigDb").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> (tempfile::TempDir, ConfigDb) {
        let tmp = tempfile::tempdir().unwrap();
        let db = ConfigDb::open(&tmp.path().join("config.redb")).unwrap();
        (tmp, db)
    }

    #[test]
    fn settings_crud() {
        let (_tmp, db) = test_db();

        assert_eq!(db.get_setting("top_k").unwrap(), None);

        db.set_setting("top_k", "8").unwrap();
        assert_eq!(db.get_setting("top_k").unwrap(), Some("8".to_string()));
        db.set_setting("top_k", "3").unwrap();
        assert_eq!(db.get_setting("top_k").unwrap(), Some("3".to_string()));

        assert!(db.remove_setting("top_k").unwrap());
        assert!(!db.remove_setting("top_k").unwrap());
        assert_eq!(db.get_setting("top_k").unwrap(), None);
    }

    #[test]
    fn settings_snapshot_holds_every_key() {
        let (_tmp, db) = test_db();
        assert!(db.settings().unwrap().is_empty());

        db.set_setting("top_k", "3").unwrap();
        db.set_setting("max_distance", "0.5").unwrap();

        let settings = db.settings().unwrap();
        assert_eq!(settings.len(), 2);
        assert_eq!(settings["max_distance"], "0.5");
        assert_eq!(settings["top_k"], "3");
    }

    #[test]
    fn reopen_preserves_data() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.redb");

        {
            let db = ConfigDb::open(&path).unwrap();
            db.set_setting("model", "local/minilm").unwrap();
        }

        {
            let db = ConfigDb::open(&path).unwrap();
            assert_eq!(
                db.get_setting("model").unwrap(),
                Some("local/minilm".to_string())
            );
        }
    }
}
