//! SQL migration definitions for the chapterquiz database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "Initial schema: question_sets",
            sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- One generated question set per (user, book)
CREATE TABLE IF NOT EXISTS question_sets (
    user_id       TEXT NOT NULL,
    book_id       TEXT NOT NULL,
    row_id        TEXT NOT NULL UNIQUE,
    chapters_json TEXT NOT NULL,
    created_on    TEXT NOT NULL,
    PRIMARY KEY (user_id, book_id)
);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
        },
        Migration {
            version: 2,
            description: "Chunk index: book_chunks, FTS5",
            sql: r#"
-- Retrieval chunks, in book order per book
CREATE TABLE IF NOT EXISTS book_chunks (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    book_id      TEXT NOT NULL,
    chapter_name TEXT NOT NULL,
    position     INTEGER NOT NULL,
    text         TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_book_chunks_book ON book_chunks(book_id, position);

-- Full-text search over chunks
CREATE VIRTUAL TABLE IF NOT EXISTS book_chunks_fts USING fts5(
    chapter_name,
    text,
    content=book_chunks,
    content_rowid=id
);

-- Triggers to keep FTS in sync with book_chunks
CREATE TRIGGER IF NOT EXISTS book_chunks_fts_insert AFTER INSERT ON book_chunks BEGIN
    INSERT INTO book_chunks_fts(rowid, chapter_name, text)
    VALUES (new.id, new.chapter_name, new.text);
END;

CREATE TRIGGER IF NOT EXISTS book_chunks_fts_delete AFTER DELETE ON book_chunks BEGIN
    INSERT INTO book_chunks_fts(book_chunks_fts, rowid, chapter_name, text)
    VALUES ('delete', old.id, old.chapter_name, old.text);
END;

INSERT INTO schema_migrations (version) VALUES (2);
"#,
        },
    ]
}
