//! Turso Embedded / libSQL storage layer (offline mode).
//!
//! The [`Storage`] struct wraps a libSQL database holding generated question
//! sets and the per-book chunk index used for retrieval. It implements both
//! [`QuestionStore`] and [`VectorIndex`].

mod chunks;
mod codec;
mod migrations;

use std::path::Path;

use async_trait::async_trait;
use chapterquiz_shared::{
    Chapter, ChapterText, QuestionStore, QuizError, Result, RowId, StoredQuestionSet, VectorIndex,
};
use chrono::{DateTime, NaiveDateTime, Utc};
use libsql::{Connection, Database, params};
use tokio::sync::Mutex;

pub use chunks::{CHUNK_TARGET_CHARS, fts_query, split_into_chunks};

/// How long a connection waits on a locked database before failing.
const BUSY_TIMEOUT_MS: u64 = 5_000;

/// Primary storage handle wrapping a libSQL database.
///
/// Reads and single-statement writes share one connection. Chunk indexing
/// runs its transaction on a connection of its own, so readers only ever see
/// committed chunks.
pub struct Storage {
    db: Database,
    conn: Connection,
    /// Serializes writers across connections.
    write_lock: Mutex<()>,
}

fn db_err(e: libsql::Error) -> QuizError {
    QuizError::Persistence(e.to_string())
}

impl Storage {
    /// Open or create a database at `path`.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| QuizError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(db_err)?;

        let conn = connect(&db).await?;
        // WAL keeps readers off the writer's uncommitted pages
        pragma(&conn, "PRAGMA journal_mode = WAL").await?;

        let storage = Self {
            db,
            conn,
            write_lock: Mutex::new(()),
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        QuizError::Persistence(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    // -----------------------------------------------------------------------
    // Question sets
    // -----------------------------------------------------------------------

    /// Insert or replace the question set for `(user_id, book_id)`.
    ///
    /// The row takes `row_id` and a fresh `created_on`; the previous set for
    /// the same pair is overwritten.
    pub async fn upsert_question_set(
        &self,
        user_id: &str,
        book_id: &str,
        row_id: &RowId,
        chapters: &[Chapter],
    ) -> Result<RowId> {
        let chapters_json = codec::encode_chapters(chapters)?;
        let now = Utc::now().to_rfc3339();

        let _guard = self.write_lock.lock().await;
        self.conn
            .execute(
                "INSERT INTO question_sets (user_id, book_id, row_id, chapters_json, created_on)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(user_id, book_id) DO UPDATE SET
                   row_id = excluded.row_id,
                   chapters_json = excluded.chapters_json,
                   created_on = excluded.created_on",
                params![user_id, book_id, row_id.as_str(), chapters_json.as_str(), now.as_str()],
            )
            .await
            .map_err(db_err)?;

        tracing::debug!(user_id, book_id, %row_id, chapters = chapters.len(), "stored question set");
        Ok(row_id.clone())
    }

    /// Get the question set stored for `(user_id, book_id)`.
    pub async fn get_question_set(
        &self,
        user_id: &str,
        book_id: &str,
    ) -> Result<Option<StoredQuestionSet>> {
        let mut rows = self
            .conn
            .query(
                "SELECT row_id, chapters_json, created_on FROM question_sets
                 WHERE user_id = ?1 AND book_id = ?2",
                params![user_id, book_id],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await {
            Ok(Some(row)) => {
                let row_id: String = row.get(0).map_err(db_err)?;
                let chapters_json: String = row.get(1).map_err(db_err)?;
                let created_on: String = row.get(2).map_err(db_err)?;
                Ok(Some(StoredQuestionSet {
                    row_id: RowId::from(row_id),
                    chapters: codec::decode_chapters(&chapters_json)?,
                    created_on: parse_timestamp(&created_on)?,
                }))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(db_err(e)),
        }
    }

    /// Get the chapters stored under `row_id`.
    pub async fn get_chapters_by_row_id(&self, row_id: &RowId) -> Result<Option<Vec<Chapter>>> {
        let mut rows = self
            .conn
            .query(
                "SELECT chapters_json FROM question_sets WHERE row_id = ?1",
                params![row_id.as_str()],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await {
            Ok(Some(row)) => {
                let chapters_json: String = row.get(0).map_err(db_err)?;
                Ok(Some(codec::decode_chapters(&chapters_json)?))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(db_err(e)),
        }
    }

    // -----------------------------------------------------------------------
    // Chunk index
    // -----------------------------------------------------------------------

    /// Replace the chunk index of `book_id` with chunks cut from `chapters`.
    /// Returns the number of chunks written.
    pub async fn index_chapters(&self, book_id: &str, chapters: &[ChapterText]) -> Result<usize> {
        let _guard = self.write_lock.lock().await;
        let conn = connect(&self.db).await?;
        let tx = conn.transaction().await.map_err(db_err)?;

        tx.execute("DELETE FROM book_chunks WHERE book_id = ?1", params![book_id])
            .await
            .map_err(db_err)?;

        let mut position: i64 = 0;
        for chapter in chapters {
            for chunk in split_into_chunks(&chapter.text, CHUNK_TARGET_CHARS) {
                tx.execute(
                    "INSERT INTO book_chunks (book_id, chapter_name, position, text)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![book_id, chapter.chapter_name.as_str(), position, chunk.as_str()],
                )
                .await
                .map_err(db_err)?;
                position += 1;
            }
        }

        tx.commit().await.map_err(db_err)?;
        tracing::info!(book_id, chapters = chapters.len(), chunks = position, "indexed book");
        Ok(position as usize)
    }

    /// Whether any chunk exists for `book_id`.
    pub async fn has_chunks(&self, book_id: &str) -> Result<bool> {
        let mut rows = self
            .conn
            .query(
                "SELECT EXISTS(SELECT 1 FROM book_chunks WHERE book_id = ?1)",
                params![book_id],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(row.get::<i64>(0).map_err(db_err)? != 0),
            Ok(None) => Ok(false),
            Err(e) => Err(db_err(e)),
        }
    }

    /// Up to `k` distinct chapter names of `book_id`, ordered by first chunk.
    pub async fn chapter_names(&self, book_id: &str, k: usize) -> Result<Vec<String>> {
        let mut rows = self
            .conn
            .query(
                "SELECT chapter_name FROM book_chunks
                 WHERE book_id = ?1
                 GROUP BY chapter_name
                 ORDER BY MIN(position)
                 LIMIT ?2",
                params![book_id, k as i64],
            )
            .await
            .map_err(db_err)?;

        let mut names = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            names.push(row.get::<String>(0).map_err(db_err)?);
        }
        Ok(names)
    }

    /// Up to `k` chunks of `book_id` ranked by FTS5 relevance to `query`.
    ///
    /// A query without searchable words returns chunks in book order.
    pub async fn search_chunks(
        &self,
        book_id: &str,
        query: &str,
        k: usize,
    ) -> Result<Vec<ChapterText>> {
        let limit = k as i64;
        let mut rows = match fts_query(query) {
            Some(expr) => self
                .conn
                .query(
                    "SELECT c.chapter_name, c.text
                     FROM book_chunks_fts fts
                     JOIN book_chunks c ON c.id = fts.rowid
                     WHERE book_chunks_fts MATCH ?1 AND c.book_id = ?2
                     ORDER BY rank
                     LIMIT ?3",
                    params![expr.as_str(), book_id, limit],
                )
                .await
                .map_err(db_err)?,
            None => self
                .conn
                .query(
                    "SELECT chapter_name, text FROM book_chunks
                     WHERE book_id = ?1
                     ORDER BY position
                     LIMIT ?2",
                    params![book_id, limit],
                )
                .await
                .map_err(db_err)?,
        };

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            results.push(ChapterText {
                chapter_name: row.get(0).map_err(db_err)?,
                text: row.get(1).map_err(db_err)?,
            });
        }
        Ok(results)
    }
}

async fn connect(db: &Database) -> Result<Connection> {
    let conn = db.connect().map_err(db_err)?;
    pragma(&conn, &format!("PRAGMA busy_timeout = {BUSY_TIMEOUT_MS}")).await?;
    Ok(conn)
}

async fn pragma(conn: &Connection, sql: &str) -> Result<()> {
    let mut rows = conn.query(sql, params![]).await.map_err(db_err)?;
    rows.next().await.map_err(db_err)?;
    Ok(())
}

/// Parse a stored timestamp: RFC 3339, or a naive ISO form taken as UTC.
fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| QuizError::Persistence(format!("invalid date {s:?}: {e}")))
}

// ---------------------------------------------------------------------------
// Collaborator impls
// ---------------------------------------------------------------------------

#[async_trait]
impl QuestionStore for Storage {
    async fn upsert(
        &self,
        user_id: &str,
        book_id: &str,
        row_id: &RowId,
        chapters: &[Chapter],
    ) -> Result<RowId> {
        self.upsert_question_set(user_id, book_id, row_id, chapters).await
    }

    async fn fetch_by_user_book(
        &self,
        user_id: &str,
        book_id: &str,
    ) -> Result<Option<StoredQuestionSet>> {
        self.get_question_set(user_id, book_id).await
    }

    async fn fetch_by_row_id(&self, row_id: &RowId) -> Result<Option<Vec<Chapter>>> {
        self.get_chapters_by_row_id(row_id).await
    }
}

#[async_trait]
impl VectorIndex for Storage {
    async fn exists(&self, book_id: &str) -> Result<bool> {
        self.has_chunks(book_id).await
    }

    async fn index(&self, book_id: &str, chapters: &[ChapterText]) -> Result<()> {
        self.index_chapters(book_id, chapters).await.map(|_| ())
    }

    async fn chapters(&self, book_id: &str, k: usize) -> Result<Vec<String>> {
        self.chapter_names(book_id, k).await
    }

    async fn top_k(&self, book_id: &str, query: &str, k: usize) -> Result<Vec<ChapterText>> {
        self.search_chunks(book_id, query, k).await
    }
}
