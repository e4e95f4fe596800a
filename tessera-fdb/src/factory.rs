//! Factory producing [`FeatureDatabase`] child stores.

use camino::Utf8Path;
use tessera_core::{ChildStore, ChildStoreFactory, Result};

use crate::FeatureDatabase;

/// Creates and opens `SQLite` feature databases.
#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteChildStoreFactory;

impl ChildStoreFactory for SqliteChildStoreFactory {
    fn create(&self, path: &Utf8Path) -> Result<Box<dyn ChildStore>> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_str().is_empty()) {
            tessera_fs::ensure_dir(parent)
                .map_err(|source| tessera_core::FeatureStoreError::io(parent, source))?;
        }
        Ok(Box::new(FeatureDatabase::create(path)?))
    }

    fn open(&self, path: &Utf8Path) -> Result<Box<dyn ChildStore>> {
        Ok(Box::new(FeatureDatabase::open(path)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use rstest::rstest;
    use tessera_core::{FeatureDataStore, FeatureSetDefinition};

    #[rstest]
    fn created_databases_reopen_with_their_feature_sets() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = Utf8PathBuf::from_path_buf(dir.path().join("nested/one.fdb"))
            .expect("utf-8 temp path");
        let factory = SqliteChildStoreFactory;
        let created = factory.create(&path).expect("create");
        created
            .insert_feature_set(&FeatureSetDefinition::new("roads", "vec", "lines"))
            .expect("insert set");
        created.close();

        let reopened = factory.open(&path).expect("open");
        assert_eq!(reopened.feature_set_count().expect("count"), 1);
    }

    #[rstest]
    fn opening_a_missing_file_fails() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = Utf8PathBuf::from_path_buf(dir.path().join("absent.fdb"))
            .expect("utf-8 temp path");
        assert!(SqliteChildStoreFactory.open(&path).is_err());
    }
}
