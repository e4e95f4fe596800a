//! Single-file feature store backed by `SQLite`.

use std::fmt;

use camino::{Utf8Path, Utf8PathBuf};
use log::debug;
use parking_lot::Mutex;
use rusqlite::types::Value;
use rusqlite::{Connection, OpenFlags, OptionalExtension, params, params_from_iter};
use tessera_core::{
    ChildStore, Feature, FeatureCursor, FeatureDataStore, FeatureDefinition, FeatureQuery,
    FeatureSet, FeatureSetDefinition, FeatureSetQuery, FeatureSetUpdate, FeatureUpdate, Result,
    paged_count,
};

use crate::codec::{
    FEATURE_COLUMNS, FEATURE_SET_COLUMNS, encode_attributes, encode_geometry, feature_from_row,
    feature_set_from_row,
};
use crate::filter::{feature_predicate, feature_set_order, feature_set_predicate};
use crate::schema::{check_version, initialise};
use crate::FeatureDatabaseError;

const FEATURES_FROM: &str = "FROM features f JOIN featuresets s ON s.id = f.fsid";

/// A feature store persisted in one `SQLite` file.
///
/// Ids are local to the file. Features are returned ordered by feature set
/// id then feature id.
pub struct FeatureDatabase {
    path: Utf8PathBuf,
    connection: Mutex<Option<Connection>>,
}

impl fmt::Debug for FeatureDatabase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureDatabase")
            .field("path", &self.path)
            .field("open", &self.connection.lock().is_some())
            .finish()
    }
}

impl FeatureDatabase {
    /// Create an empty database at `path`, replacing any existing file.
    ///
    /// # Errors
    /// Fails when the old file cannot be removed or the schema cannot be
    /// written.
    pub fn create(path: &Utf8Path) -> Result<Self, FeatureDatabaseError> {
        tessera_fs::remove_file_if_exists(path).map_err(|source| FeatureDatabaseError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let connection = open_connection(path, OpenFlags::default())?;
        initialise(&connection)?;
        debug!("created feature database {path}");
        Ok(Self::from_connection(path, connection))
    }

    /// Open an existing database.
    ///
    /// # Errors
    /// Fails when the file is missing, unreadable or has another schema
    /// version.
    pub fn open(path: &Utf8Path) -> Result<Self, FeatureDatabaseError> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let connection = open_connection(path, flags)?;
        check_version(&connection, path)?;
        Ok(Self::from_connection(path, connection))
    }

    /// Create a private in-memory database.
    ///
    /// # Errors
    /// Fails when the schema cannot be written.
    pub fn open_in_memory() -> Result<Self, FeatureDatabaseError> {
        let connection = Connection::open_in_memory()?;
        initialise(&connection)?;
        Ok(Self::from_connection(Utf8Path::new(":memory:"), connection))
    }

    fn from_connection(path: &Utf8Path, connection: Connection) -> Self {
        Self {
            path: path.to_path_buf(),
            connection: Mutex::new(Some(connection)),
        }
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    fn with_connection<T>(
        &self,
        operation: impl FnOnce(&mut Connection) -> Result<T, FeatureDatabaseError>,
    ) -> Result<T> {
        let mut slot = self.connection.lock();
        let connection = slot.as_mut().ok_or(FeatureDatabaseError::Closed)?;
        Ok(operation(connection)?)
    }
}

fn open_connection(path: &Utf8Path, flags: OpenFlags) -> Result<Connection, FeatureDatabaseError> {
    Connection::open_with_flags(path, flags).map_err(|source| FeatureDatabaseError::OpenDatabase {
        path: path.to_path_buf(),
        source,
    })
}

fn feature_set_flags(
    connection: &Connection,
    fsid: i64,
) -> Result<(bool, bool, i64), FeatureDatabaseError> {
    connection
        .query_row(
            "SELECT visible, read_only, version FROM featuresets WHERE id = ?1",
            [fsid],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()?
        .ok_or(FeatureDatabaseError::MissingFeatureSet { fsid })
}

fn ensure_writable(connection: &Connection, fsid: i64) -> Result<(), FeatureDatabaseError> {
    let (_, read_only, _) = feature_set_flags(connection, fsid)?;
    if read_only {
        return Err(FeatureDatabaseError::ReadOnly { fsid });
    }
    Ok(())
}

fn owning_feature_set(connection: &Connection, fid: i64) -> Result<i64, FeatureDatabaseError> {
    connection
        .query_row("SELECT fsid FROM features WHERE fid = ?1", [fid], |row| {
            row.get(0)
        })
        .optional()?
        .ok_or(FeatureDatabaseError::MissingFeature { fid })
}

fn select_features(
    connection: &Connection,
    query: &FeatureQuery,
) -> Result<Vec<Feature>, FeatureDatabaseError> {
    let mut predicate = feature_predicate(query);
    let where_clause = predicate.where_clause();
    let paging = predicate.paged(query.limit, query.offset);
    let sql = format!(
        "SELECT {FEATURE_COLUMNS} {FEATURES_FROM}{where_clause} ORDER BY f.fsid, f.fid{paging}"
    );
    let mut statement = connection.prepare(&sql)?;
    let mut rows = statement.query(params_from_iter(predicate.args.iter()))?;
    let mut features = Vec::new();
    while let Some(row) = rows.next()? {
        features.push(feature_from_row(row)?);
    }
    Ok(features)
}

fn select_feature_sets(
    connection: &Connection,
    query: &FeatureSetQuery,
) -> Result<Vec<FeatureSet>, FeatureDatabaseError> {
    let mut predicate = feature_set_predicate(query);
    let where_clause = predicate.where_clause();
    let order = feature_set_order(query);
    let paging = predicate.paged(query.limit, query.offset);
    let sql = format!("SELECT {FEATURE_SET_COLUMNS} FROM featuresets{where_clause}{order}{paging}");
    let mut statement = connection.prepare(&sql)?;
    let rows = statement.query_map(params_from_iter(predicate.args.iter()), feature_set_from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

fn insert_feature_set_row(
    connection: &Connection,
    fsid: Option<i64>,
    definition: &FeatureSetDefinition,
    version: i64,
) -> Result<i64, FeatureDatabaseError> {
    connection.execute(
        "INSERT INTO featuresets
            (id, name, provider, type, visible, min_resolution, max_resolution, version)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            fsid,
            definition.name,
            definition.provider,
            definition.feature_type,
            definition.visible,
            definition.min_resolution,
            definition.max_resolution,
            version
        ],
    )?;
    Ok(connection.last_insert_rowid())
}

fn select_feature(connection: &Connection, fid: i64) -> Result<Option<Feature>, FeatureDatabaseError> {
    let sql = format!("SELECT {FEATURE_COLUMNS} {FEATURES_FROM} WHERE f.fid = ?1");
    let mut statement = connection.prepare(&sql)?;
    let mut rows = statement.query([fid])?;
    match rows.next()? {
        Some(row) => Ok(Some(feature_from_row(row)?)),
        None => Ok(None),
    }
}

impl FeatureDataStore for FeatureDatabase {
    fn query_features(&self, query: &FeatureQuery) -> Result<FeatureCursor> {
        let features = self.with_connection(|connection| select_features(connection, query))?;
        Ok(Box::new(features.into_iter()))
    }

    fn query_features_count(&self, query: &FeatureQuery) -> Result<usize> {
        self.with_connection(|connection| {
            let predicate = feature_predicate(query);
            let sql = format!(
                "SELECT count(*) {FEATURES_FROM}{}",
                predicate.where_clause()
            );
            let total: i64 = connection.query_row(
                &sql,
                params_from_iter(predicate.args.iter()),
                |row| row.get(0),
            )?;
            Ok(paged_count(
                usize::try_from(total).unwrap_or(0),
                query.limit,
                query.offset,
            ))
        })
    }

    fn query_feature_sets(&self, query: &FeatureSetQuery) -> Result<Vec<FeatureSet>> {
        self.with_connection(|connection| select_feature_sets(connection, query))
    }

    fn query_feature_sets_count(&self, query: &FeatureSetQuery) -> Result<usize> {
        self.with_connection(|connection| {
            let predicate = feature_set_predicate(query);
            let sql = format!(
                "SELECT count(*) FROM featuresets{}",
                predicate.where_clause()
            );
            let total: i64 = connection.query_row(
                &sql,
                params_from_iter(predicate.args.iter()),
                |row| row.get(0),
            )?;
            Ok(paged_count(
                usize::try_from(total).unwrap_or(0),
                query.limit,
                query.offset,
            ))
        })
    }

    fn feature(&self, fid: i64) -> Result<Option<Feature>> {
        self.with_connection(|connection| select_feature(connection, fid))
    }

    fn feature_set(&self, fsid: i64) -> Result<Option<FeatureSet>> {
        self.with_connection(|connection| {
            let sql = format!("SELECT {FEATURE_SET_COLUMNS} FROM featuresets WHERE id = ?1");
            Ok(connection
                .query_row(&sql, [fsid], feature_set_from_row)
                .optional()?)
        })
    }

    fn insert_feature_set(&self, definition: &FeatureSetDefinition) -> Result<FeatureSet> {
        self.with_connection(|connection| {
            let fsid = insert_feature_set_row(connection, None, definition, 1)?;
            Ok(FeatureSet {
                id: fsid,
                name: definition.name.clone(),
                provider: definition.provider.clone(),
                feature_type: definition.feature_type.clone(),
                min_resolution: definition.min_resolution,
                max_resolution: definition.max_resolution,
                version: 1,
            })
        })
    }

    fn update_feature_set(&self, fsid: i64, update: &FeatureSetUpdate) -> Result<()> {
        self.with_connection(|connection| {
            let (min_resolution, max_resolution) = update.resolution.unzip();
            let updated = connection.execute(
                "UPDATE featuresets SET
                    name = coalesce(?1, name),
                    min_resolution = coalesce(?2, min_resolution),
                    max_resolution = coalesce(?3, max_resolution),
                    version = version + 1
                 WHERE id = ?4",
                params![update.name, min_resolution, max_resolution, fsid],
            )?;
            if updated == 0 {
                return Err(FeatureDatabaseError::MissingFeatureSet { fsid });
            }
            Ok(())
        })
    }

    fn delete_feature_set(&self, fsid: i64) -> Result<()> {
        self.with_connection(|connection| {
            // A savepoint nests inside an open bulk insertion.
            let savepoint = connection.savepoint()?;
            savepoint.execute("DELETE FROM features WHERE fsid = ?1", [fsid])?;
            let deleted = savepoint.execute("DELETE FROM featuresets WHERE id = ?1", [fsid])?;
            if deleted == 0 {
                return Err(FeatureDatabaseError::MissingFeatureSet { fsid });
            }
            savepoint.commit()?;
            Ok(())
        })
    }

    fn insert_feature(
        &self,
        fsid: i64,
        definition: &FeatureDefinition,
        visible: bool,
    ) -> Result<Feature> {
        self.with_connection(|connection| {
            let (_, read_only, version) = feature_set_flags(connection, fsid)?;
            if read_only {
                return Err(FeatureDatabaseError::ReadOnly { fsid });
            }
            let geometry = encode_geometry(&definition.geometry)?;
            let attributes = encode_attributes(&definition.attributes)?;
            connection.execute(
                "INSERT INTO features
                    (fsid, name, geometry, min_x, min_y, max_x, max_y, attributes, style, visible, version)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    fsid,
                    definition.name,
                    geometry.blob,
                    geometry.min_x,
                    geometry.min_y,
                    geometry.max_x,
                    geometry.max_y,
                    attributes,
                    definition.style,
                    visible,
                    version
                ],
            )?;
            Ok(Feature {
                id: connection.last_insert_rowid(),
                feature_set_id: fsid,
                name: definition.name.clone(),
                geometry: definition.geometry.clone(),
                attributes: definition.attributes.clone(),
                style: definition.style.clone(),
                version,
            })
        })
    }

    fn update_feature(&self, fid: i64, update: &FeatureUpdate) -> Result<()> {
        self.with_connection(|connection| {
            let fsid = owning_feature_set(connection, fid)?;
            ensure_writable(connection, fsid)?;
            if update.is_empty() {
                return Ok(());
            }
            let mut assignments = vec![String::from("version = version + 1")];
            let mut args: Vec<Value> = Vec::new();
            if let Some(name) = &update.name {
                assignments.push(String::from("name = ?"));
                args.push(Value::Text(name.clone()));
            }
            if let Some(geometry) = &update.geometry {
                let encoded = encode_geometry(geometry)?;
                assignments.push(String::from(
                    "geometry = ?, min_x = ?, min_y = ?, max_x = ?, max_y = ?",
                ));
                args.push(Value::Blob(encoded.blob));
                for bound in [encoded.min_x, encoded.min_y, encoded.max_x, encoded.max_y] {
                    args.push(bound.map_or(Value::Null, Value::Real));
                }
            }
            if let Some(attributes) = &update.attributes {
                assignments.push(String::from("attributes = ?"));
                args.push(Value::Text(encode_attributes(attributes)?));
            }
            if let Some(style) = &update.style {
                assignments.push(String::from("style = ?"));
                args.push(Value::Text(style.clone()));
            }
            args.push(Value::Integer(fid));
            let sql = format!("UPDATE features SET {} WHERE fid = ?", assignments.join(", "));
            connection.execute(&sql, params_from_iter(args.iter()))?;
            Ok(())
        })
    }

    fn delete_feature(&self, fid: i64) -> Result<()> {
        self.with_connection(|connection| {
            let fsid = owning_feature_set(connection, fid)?;
            ensure_writable(connection, fsid)?;
            connection.execute("DELETE FROM features WHERE fid = ?1", [fid])?;
            Ok(())
        })
    }

    fn is_feature_visible(&self, fid: i64) -> Result<bool> {
        self.with_connection(|connection| {
            connection
                .query_row("SELECT visible FROM features WHERE fid = ?1", [fid], |row| {
                    row.get(0)
                })
                .optional()?
                .ok_or(FeatureDatabaseError::MissingFeature { fid })
        })
    }

    fn set_feature_visible(&self, fid: i64, visible: bool) -> Result<()> {
        self.with_connection(|connection| {
            let updated = connection.execute(
                "UPDATE features SET visible = ?1 WHERE fid = ?2",
                params![visible, fid],
            )?;
            if updated == 0 {
                return Err(FeatureDatabaseError::MissingFeature { fid });
            }
            Ok(())
        })
    }

    fn set_features_visible(&self, query: &FeatureQuery, visible: bool) -> Result<()> {
        self.with_connection(|connection| {
            let mut predicate = feature_predicate(query);
            let where_clause = predicate.where_clause();
            let paging = predicate.paged(query.limit, query.offset);
            let sql = format!(
                "UPDATE features SET visible = ? WHERE fid IN \
                 (SELECT f.fid {FEATURES_FROM}{where_clause} ORDER BY f.fsid, f.fid{paging})"
            );
            let mut args = vec![Value::Integer(i64::from(visible))];
            args.append(&mut predicate.args);
            connection.execute(&sql, params_from_iter(args.iter()))?;
            Ok(())
        })
    }

    fn is_feature_set_visible(&self, fsid: i64) -> Result<bool> {
        self.with_connection(|connection| {
            feature_set_flags(connection, fsid).map(|(visible, _, _)| visible)
        })
    }

    fn set_feature_set_visible(&self, fsid: i64, visible: bool) -> Result<()> {
        self.with_connection(|connection| {
            let updated = connection.execute(
                "UPDATE featuresets SET visible = ?1 WHERE id = ?2",
                params![visible, fsid],
            )?;
            if updated == 0 {
                return Err(FeatureDatabaseError::MissingFeatureSet { fsid });
            }
            Ok(())
        })
    }

    fn set_feature_sets_visible(&self, query: &FeatureSetQuery, visible: bool) -> Result<()> {
        self.with_connection(|connection| {
            let mut predicate = feature_set_predicate(query);
            let where_clause = predicate.where_clause();
            let order = feature_set_order(query);
            let paging = predicate.paged(query.limit, query.offset);
            let sql = format!(
                "UPDATE featuresets SET visible = ? WHERE id IN \
                 (SELECT id FROM featuresets{where_clause}{order}{paging})"
            );
            let mut args = vec![Value::Integer(i64::from(visible))];
            args.append(&mut predicate.args);
            connection.execute(&sql, params_from_iter(args.iter()))?;
            Ok(())
        })
    }

    fn is_feature_set_read_only(&self, fsid: i64) -> Result<bool> {
        self.with_connection(|connection| {
            feature_set_flags(connection, fsid).map(|(_, read_only, _)| read_only)
        })
    }

    fn set_feature_set_read_only(&self, fsid: i64, read_only: bool) -> Result<()> {
        self.with_connection(|connection| {
            let updated = connection.execute(
                "UPDATE featuresets SET read_only = ?1 WHERE id = ?2",
                params![read_only, fsid],
            )?;
            if updated == 0 {
                return Err(FeatureDatabaseError::MissingFeatureSet { fsid });
            }
            Ok(())
        })
    }
}

impl ChildStore for FeatureDatabase {
    fn insert_feature_set_with_id(
        &self,
        fsid: i64,
        definition: &FeatureSetDefinition,
        version: i64,
    ) -> Result<()> {
        self.with_connection(|connection| {
            insert_feature_set_row(connection, Some(fsid), definition, version).map(|_| ())
        })
    }

    fn max_feature_version(&self, fsid: i64) -> Result<i64> {
        self.with_connection(|connection| {
            Ok(connection.query_row(
                "SELECT coalesce(max(version), 0) FROM features WHERE fsid = ?1",
                [fsid],
                |row| row.get(0),
            )?)
        })
    }

    fn feature_set_count(&self) -> Result<usize> {
        self.with_connection(|connection| {
            let count: i64 =
                connection.query_row("SELECT count(*) FROM featuresets", [], |row| row.get(0))?;
            Ok(usize::try_from(count).unwrap_or(0))
        })
    }

    fn begin_bulk(&self) -> Result<()> {
        self.with_connection(|connection| {
            if !connection.is_autocommit() {
                return Err(FeatureDatabaseError::BulkInsertionOpen);
            }
            connection.execute_batch("BEGIN IMMEDIATE")?;
            Ok(())
        })
    }

    fn commit_bulk(&self) -> Result<()> {
        self.with_connection(|connection| {
            if connection.is_autocommit() {
                return Err(FeatureDatabaseError::NoBulkInsertion);
            }
            connection.execute_batch("COMMIT")?;
            Ok(())
        })
    }

    fn close(&self) {
        if self.connection.lock().take().is_some() {
            debug!("closed feature database {}", self.path);
        }
    }
}
