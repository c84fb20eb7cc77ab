//! Queries and bulk writes against one open connection.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf, MAIN_SEPARATOR};

use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection, Params, ToSql, Transaction};

use super::rows::FILE_COLUMNS;
use super::{
    numbered_placeholders, placeholders, DatabaseStatistics, FileRow, Link, LinkedPair,
    StorageResult, MAX_PARAMS,
};
use crate::scanner::{Entry, FileId};

/// Path/hash pairs per hash update statement: `?1` is the timestamp and
/// every pair takes two more parameters.
const HASH_UPDATE_BATCH: usize = (MAX_PARAMS - 1) / 2;

fn to_i64(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn size_to_i64(size: u64) -> i64 {
    i64::try_from(size).unwrap_or(i64::MAX)
}

fn count_to_u64(n: i64) -> u64 {
    u64::try_from(n).unwrap_or(0)
}

/// Insert entries as new rows inside an open transaction.
fn insert_rows(tx: &Transaction<'_>, entries: &[Entry], now: DateTime<Utc>) -> StorageResult<usize> {
    let mut stmt = tx.prepare_cached(
        "INSERT INTO files (record_created_at, updated_at, path, modified_at, deleted_at, \
         size, hash, hashed_at, is_directory) \
         VALUES (?1, ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    )?;

    let mut inserted = 0;
    for entry in entries {
        let path = entry.path_key().into_owned();
        let hash = if entry.is_directory() {
            None
        } else {
            entry.content_hash.as_deref()
        };
        let hashed_at = hash.filter(|h| !h.is_empty()).map(|_| now);

        inserted += stmt.execute(params![
            now,
            path,
            entry.modified_at,
            entry.deleted_at,
            entry.size.map(size_to_i64),
            hash,
            hashed_at,
            entry.is_directory(),
        ])?;
    }
    Ok(inserted)
}

/// `UPDATE` setting `n` hashes keyed by path.
///
/// `?1` is the timestamp; pair `i` binds its path to `?{2i+2}` and its hash
/// to `?{2i+3}`. The path parameters are reused in the `IN` list.
fn hash_update_sql(n: usize) -> String {
    let mut case = String::from("CASE path");
    for i in 0..n {
        let p = 2 + 2 * i;
        let _ = write!(case, " WHEN ?{} THEN ?{}", p, p + 1);
    }
    case.push_str(" ELSE hash END");

    let paths = (0..n)
        .map(|i| format!("?{}", 2 + 2 * i))
        .collect::<Vec<_>>()
        .join(",");

    format!(
        "UPDATE files SET hash = {case}, \
         hashed_at = CASE WHEN ({case}) <> '' THEN ?1 ELSE NULL END, \
         updated_at = ?1 \
         WHERE path IN ({paths})"
    )
}

/// An open connection to the index.
#[derive(Debug)]
pub struct Store {
    conn: Connection,
    path: PathBuf,
}

impl Store {
    pub(crate) fn new(conn: Connection, path: PathBuf) -> Self {
        Self { conn, path }
    }

    /// The underlying connection.
    #[must_use]
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Path of the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn query_files<P: Params>(&self, sql: &str, params: P) -> StorageResult<Vec<FileRow>> {
        let mut stmt = self.conn.prepare_cached(sql)?;
        let rows = stmt
            .query_map(params, FileRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Number of rows in `files`.
    ///
    /// # Errors
    ///
    /// Returns the SQLite error if the query fails.
    pub fn file_count(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM files", [], |row| row.get(0))?;
        Ok(count_to_u64(count))
    }

    /// Rows whose path is one of `paths`.
    ///
    /// The lookup is split into statements of at most [`MAX_PARAMS`] paths.
    ///
    /// # Errors
    ///
    /// Returns the SQLite error if a query fails.
    pub fn files_by_paths(&self, paths: &[String]) -> StorageResult<Vec<FileRow>> {
        let mut rows = Vec::with_capacity(paths.len());
        for chunk in paths.chunks(MAX_PARAMS) {
            let sql = format!(
                "SELECT {FILE_COLUMNS} FROM files WHERE path IN ({})",
                placeholders(chunk.len())
            );
            rows.extend(self.query_files(&sql, params_from_iter(chunk.iter()))?);
        }
        Ok(rows)
    }

    /// Up to `limit` files after id `after` that need (re)hashing, by id.
    ///
    /// # Errors
    ///
    /// Returns the SQLite error if the query fails.
    pub fn files_needing_hash(&self, after: FileId, limit: usize) -> StorageResult<Vec<FileRow>> {
        let sql = format!(
            "SELECT {FILE_COLUMNS} FROM files \
             WHERE id > ?1 AND COALESCE(is_directory, 0) = 0 AND deleted_at IS NULL \
               AND (hash IS NULL OR hash = '' OR hashed_at IS NULL \
                    OR (hashed_at < modified_at AND hashed_at < updated_at)) \
             ORDER BY id LIMIT ?2"
        );
        self.query_files(&sql, params![after, to_i64(limit)])
    }

    /// Up to `limit` rows after id `after` not marked deleted, by id.
    ///
    /// # Errors
    ///
    /// Returns the SQLite error if the query fails.
    pub fn files_not_deleted(&self, after: FileId, limit: usize) -> StorageResult<Vec<FileRow>> {
        let sql = format!(
            "SELECT {FILE_COLUMNS} FROM files \
             WHERE id > ?1 AND deleted_at IS NULL \
             ORDER BY id LIMIT ?2"
        );
        self.query_files(&sql, params![after, to_i64(limit)])
    }

    /// Up to `limit` rows of any kind after id `after`, by id.
    ///
    /// # Errors
    ///
    /// Returns the SQLite error if the query fails.
    pub fn files_after(&self, after: FileId, limit: usize) -> StorageResult<Vec<FileRow>> {
        let sql = format!("SELECT {FILE_COLUMNS} FROM files WHERE id > ?1 ORDER BY id LIMIT ?2");
        self.query_files(&sql, params![after, to_i64(limit)])
    }

    /// Up to `limit` live, hashed file rows strictly after the
    /// `(after_hash, after_id)` cursor, ordered by `hash, id`.
    ///
    /// Start from `("", 0)`; continue from the last row returned. Each page
    /// is an index range scan on `hash_index`, so a full pass stays linear.
    ///
    /// # Errors
    ///
    /// Returns the SQLite error if the query fails.
    pub fn duplicate_candidates(
        &self,
        after_hash: &str,
        after_id: FileId,
        limit: usize,
    ) -> StorageResult<Vec<FileRow>> {
        let sql = format!(
            "SELECT {FILE_COLUMNS} FROM files \
             WHERE hash IS NOT NULL AND hash <> '' \
               AND (hash > ?1 OR (hash = ?1 AND id > ?2)) \
               AND COALESCE(is_directory, 0) = 0 AND deleted_at IS NULL \
             ORDER BY hash ASC, id ASC LIMIT ?3"
        );
        self.query_files(&sql, params![after_hash, after_id, to_i64(limit)])
    }

    /// Insert entries as new rows in one transaction.
    ///
    /// `hashed_at` is set only for entries carrying a non-empty hash.
    ///
    /// # Errors
    ///
    /// Returns the SQLite error; nothing is written in that case.
    pub fn insert_files(&mut self, entries: &[Entry]) -> StorageResult<usize> {
        let now = Utc::now();
        let tx = self.conn.transaction()?;
        let inserted = insert_rows(&tx, entries, now)?;
        tx.commit()?;
        Ok(inserted)
    }

    /// Delete the existing rows of entries that carry an id, then insert
    /// every entry as a new row, in one transaction.
    ///
    /// Replaced entries get new ids.
    ///
    /// # Errors
    ///
    /// Returns the SQLite error; nothing is written in that case.
    pub fn replace_files(&mut self, entries: &[Entry]) -> StorageResult<usize> {
        let now = Utc::now();
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached("DELETE FROM files WHERE id = ?1")?;
            for id in entries.iter().filter_map(|e| e.id) {
                stmt.execute([id])?;
            }
        }
        let inserted = insert_rows(&tx, entries, now)?;
        tx.commit()?;
        Ok(inserted)
    }

    /// Delete rows by id.
    ///
    /// # Errors
    ///
    /// Returns the SQLite error; nothing is deleted in that case.
    pub fn delete_by_ids(&mut self, ids: &[FileId]) -> StorageResult<usize> {
        let tx = self.conn.transaction()?;
        let mut deleted = 0;
        {
            let mut stmt = tx.prepare_cached("DELETE FROM files WHERE id = ?1")?;
            for id in ids {
                deleted += stmt.execute([id])?;
            }
        }
        tx.commit()?;
        Ok(deleted)
    }

    /// Set content hashes by path.
    ///
    /// Each pair is `(path, hash)`. `hashed_at` becomes now for non-empty
    /// hashes and NULL for empty ones.
    ///
    /// # Errors
    ///
    /// Returns the SQLite error; nothing is written in that case.
    pub fn update_hashes(&mut self, hashes: &[(String, String)]) -> StorageResult<usize> {
        let now = Utc::now();
        let tx = self.conn.transaction()?;
        let mut updated = 0;

        for batch in hashes.chunks(HASH_UPDATE_BATCH) {
            let sql = hash_update_sql(batch.len());
            let mut values: Vec<&dyn ToSql> = Vec::with_capacity(1 + 2 * batch.len());
            values.push(&now);
            for (path, hash) in batch {
                values.push(path);
                values.push(hash);
            }
            updated += tx.execute(&sql, values.as_slice())?;
        }

        tx.commit()?;
        Ok(updated)
    }

    /// Set `deleted_at` to now for the given paths.
    ///
    /// # Errors
    ///
    /// Returns the SQLite error; nothing is written in that case.
    pub fn mark_deleted(&mut self, paths: &[String]) -> StorageResult<usize> {
        let now = Utc::now();
        let tx = self.conn.transaction()?;
        let mut marked = 0;

        for chunk in paths.chunks(MAX_PARAMS - 1) {
            let sql = format!(
                "UPDATE files SET deleted_at = ?1, updated_at = ?1 WHERE path IN ({})",
                numbered_placeholders(2, chunk.len())
            );
            let mut values: Vec<&dyn ToSql> = Vec::with_capacity(1 + chunk.len());
            values.push(&now);
            values.extend(chunk.iter().map(|p| p as &dyn ToSql));
            marked += tx.execute(&sql, values.as_slice())?;
        }

        tx.commit()?;
        Ok(marked)
    }

    /// Delete rows by path.
    ///
    /// # Errors
    ///
    /// Returns the SQLite error; nothing is deleted in that case.
    pub fn delete_by_paths(&mut self, paths: &[String]) -> StorageResult<usize> {
        let tx = self.conn.transaction()?;
        let mut deleted = 0;

        for chunk in paths.chunks(MAX_PARAMS) {
            let sql = format!(
                "DELETE FROM files WHERE path IN ({})",
                placeholders(chunk.len())
            );
            deleted += tx.execute(&sql, params_from_iter(chunk.iter()))?;
        }

        tx.commit()?;
        Ok(deleted)
    }

    /// Append duplicate links in one transaction.
    ///
    /// # Errors
    ///
    /// Returns the SQLite error; nothing is written in that case.
    pub fn insert_links(&mut self, links: &[Link]) -> StorageResult<usize> {
        let tx = self.conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt =
                tx.prepare_cached("INSERT INTO file_links (file_1_id, file_2_id) VALUES (?1, ?2)")?;
            for link in links {
                inserted += stmt.execute([link.first_id, link.second_id])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    /// Remove every duplicate link.
    ///
    /// # Errors
    ///
    /// Returns the SQLite error if the delete fails.
    pub fn clear_links(&self) -> StorageResult<usize> {
        Ok(self.conn.execute("DELETE FROM file_links", [])?)
    }

    /// Number of rows in `file_links`.
    ///
    /// # Errors
    ///
    /// Returns the SQLite error if the query fails.
    pub fn link_count(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM file_links", [], |row| row.get(0))?;
        Ok(count_to_u64(count))
    }

    /// One page of non-reflexive links joined with both files.
    ///
    /// Links whose representative has size 0 are left out. Rows come
    /// largest representative first, then by representative id and
    /// duplicate id, so the pairs of one group are contiguous.
    ///
    /// # Errors
    ///
    /// Returns the SQLite error if the query fails.
    pub fn link_page(&self, offset: usize, limit: usize) -> StorageResult<Vec<LinkedPair>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT f1.id, f2.id, f1.path, f1.size, f2.path \
             FROM file_links l \
             JOIN files f1 ON f1.id = l.file_1_id \
             JOIN files f2 ON f2.id = l.file_2_id \
             WHERE l.file_1_id <> l.file_2_id AND f1.size <> 0 \
             ORDER BY f1.size DESC, f1.id ASC, f2.id ASC \
             LIMIT ?1 OFFSET ?2",
        )?;

        let pairs = stmt
            .query_map(params![to_i64(limit), to_i64(offset)], |row| {
                let size: i64 = row.get(3)?;
                Ok(LinkedPair {
                    first_id: row.get(0)?,
                    second_id: row.get(1)?,
                    first_path: row.get(2)?,
                    first_size: count_to_u64(size),
                    second_path: row.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(pairs)
    }

    /// Recompute the size of every directory whose size is missing or older
    /// than its modification time.
    ///
    /// A directory's size is the sum of the live file rows below it. Returns
    /// the number of directories updated.
    ///
    /// # Errors
    ///
    /// Returns the SQLite error if the update fails.
    pub fn update_directory_sizes(&self) -> StorageResult<usize> {
        // Everything under "dir/" sorts in ["dir/", "dir" + next char), which
        // lets the path index serve the range.
        let sep = MAIN_SEPARATOR.to_string();
        let after_sep = char::from_u32(MAIN_SEPARATOR as u32 + 1)
            .unwrap_or(MAIN_SEPARATOR)
            .to_string();

        let updated = self.conn.execute(
            "UPDATE files SET \
               size = (SELECT COALESCE(SUM(f2.size), 0) FROM files f2 \
                       WHERE COALESCE(f2.is_directory, 0) = 0 AND f2.deleted_at IS NULL \
                         AND f2.path >= files.path || ?2 AND f2.path < files.path || ?3), \
               updated_at = ?1 \
             WHERE is_directory = 1 AND deleted_at IS NULL \
               AND (size IS NULL OR updated_at < modified_at)",
            params![Utc::now(), sep, after_sep],
        )?;
        log::debug!("Updated sizes of {} directories", updated);
        Ok(updated)
    }

    /// Summary figures for the whole index.
    ///
    /// # Errors
    ///
    /// Returns the SQLite error if a query fails.
    pub fn statistics(&self) -> StorageResult<DatabaseStatistics> {
        let mut stats = self.conn.query_row(
            "SELECT COUNT(*), \
               COALESCE(SUM(CASE WHEN COALESCE(is_directory, 0) = 0 THEN 1 ELSE 0 END), 0), \
               COALESCE(SUM(CASE WHEN is_directory = 1 THEN 1 ELSE 0 END), 0), \
               COALESCE(SUM(CASE WHEN deleted_at IS NOT NULL THEN 1 ELSE 0 END), 0), \
               COALESCE(SUM(CASE WHEN COALESCE(is_directory, 0) = 0 AND deleted_at IS NULL \
                                 THEN size ELSE 0 END), 0), \
               COALESCE(SUM(CASE WHEN COALESCE(is_directory, 0) = 0 AND hash <> '' \
                                 THEN 1 ELSE 0 END), 0) \
             FROM files",
            [],
            |row| {
                Ok(DatabaseStatistics {
                    total_records: count_to_u64(row.get(0)?),
                    files: count_to_u64(row.get(1)?),
                    directories: count_to_u64(row.get(2)?),
                    deleted: count_to_u64(row.get(3)?),
                    total_size: count_to_u64(row.get(4)?),
                    hashed: count_to_u64(row.get(5)?),
                    ..Default::default()
                })
            },
        )?;

        stats.links = self.link_count()?;
        stats.database_bytes = fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0);
        Ok(stats)
    }
}
