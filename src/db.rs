use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::error::Result;
use crate::listing::ContentType;
use crate::parser::{DetailRecord, ItemStub};

// ── Schema ──

enum Step {
    CreateTable { table: &'static str, sql: &'static str },
    AddColumn { table: &'static str, column: &'static str, decl: &'static str },
    CreateIndex { index: &'static str, sql: &'static str },
}

/// One forward-only schema change. Applied only when its check says it is missing.
struct Migration {
    description: &'static str,
    step: Step,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        description: "library_items base table",
        step: Step::CreateTable {
            table: "library_items",
            sql: "CREATE TABLE library_items (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                title        TEXT,
                url          TEXT UNIQUE,
                content_type TEXT,
                html         TEXT,
                scraped_at   TEXT
            )",
        },
    },
    Migration {
        description: "library_items.description",
        step: Step::AddColumn {
            table: "library_items",
            column: "description",
            decl: "TEXT",
        },
    },
    Migration {
        description: "library_items.resource_type",
        step: Step::AddColumn {
            table: "library_items",
            column: "resource_type",
            decl: "TEXT",
        },
    },
    Migration {
        description: "age tags",
        step: Step::CreateTable {
            table: "library_item_ages",
            sql: "CREATE TABLE library_item_ages (
                item_id INTEGER,
                age     TEXT
            )",
        },
    },
    Migration {
        description: "subject tags",
        step: Step::CreateTable {
            table: "library_item_subjects",
            sql: "CREATE TABLE library_item_subjects (
                item_id INTEGER,
                subject TEXT
            )",
        },
    },
    Migration {
        description: "age tag lookup index",
        step: Step::CreateIndex {
            index: "idx_item_ages_item",
            sql: "CREATE INDEX idx_item_ages_item ON library_item_ages(item_id)",
        },
    },
    Migration {
        description: "subject tag lookup index",
        step: Step::CreateIndex {
            index: "idx_item_subjects_item",
            sql: "CREATE INDEX idx_item_subjects_item ON library_item_subjects(item_id)",
        },
    },
];

fn schema_object_exists(conn: &Connection, kind: &str, name: &str) -> Result<bool> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = ?1 AND name = ?2",
        params![kind, name],
        |r| r.get(0),
    )?;
    Ok(n > 0)
}

pub fn table_columns(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let cols = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(cols)
}

impl Step {
    fn is_applied(&self, conn: &Connection) -> Result<bool> {
        match self {
            Step::CreateTable { table, .. } => schema_object_exists(conn, "table", table),
            Step::AddColumn { table, column, .. } => {
                Ok(table_columns(conn, table)?.iter().any(|c| c == column))
            }
            Step::CreateIndex { index, .. } => schema_object_exists(conn, "index", index),
        }
    }

    fn apply(&self, conn: &Connection) -> Result<()> {
        match self {
            Step::CreateTable { sql, .. } | Step::CreateIndex { sql, .. } => {
                conn.execute_batch(sql)?;
            }
            Step::AddColumn { table, column, decl } => {
                conn.execute_batch(&format!(
                    "ALTER TABLE {} ADD COLUMN {} {}",
                    table, column, decl
                ))?;
            }
        }
        Ok(())
    }
}

/// Applies every missing migration in order; returns how many ran.
pub fn migrate(conn: &Connection) -> Result<usize> {
    let mut applied = 0;
    for m in MIGRATIONS {
        if m.step.is_applied(conn)? {
            debug!(migration = m.description, "already present");
            continue;
        }
        m.step.apply(conn)?;
        info!(migration = m.description, "applied schema migration");
        applied += 1;
    }
    Ok(applied)
}

// ── Rows ──

#[derive(Debug, Clone)]
pub struct LibraryItem {
    pub id: i64,
    pub url: String,
    pub title: Option<String>,
    pub content_type: Option<String>,
    pub html: Option<String>,
    pub scraped_at: Option<String>,
    pub description: Option<String>,
    pub resource_type: Option<String>,
}

pub struct OverviewRow {
    pub id: i64,
    pub title: String,
    pub content_type: String,
    pub resource_type: String,
    pub ages: i64,
    pub subjects: i64,
    pub url: String,
}

pub struct Stats {
    pub total: usize,
    pub enriched: usize,
    pub age_tags: usize,
    pub subject_tags: usize,
    pub by_type: Vec<(String, usize)>,
}

// ── Session ──

/// An open, migrated library database. Dropping it closes the connection.
pub struct Store {
    conn: Connection,
    migrations_applied: usize,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Wraps an existing connection, bringing its schema up to date.
    pub fn from_connection(conn: Connection) -> Result<Self> {
        let migrations_applied = migrate(&conn)?;
        Ok(Store {
            conn,
            migrations_applied,
        })
    }

    pub fn close(self) -> Result<()> {
        self.conn.close().map_err(|(_, e)| e)?;
        Ok(())
    }

    /// Migrations that ran when this session was opened.
    pub fn migrations_applied(&self) -> usize {
        self.migrations_applied
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    // ── Discovery ──

    /// Inserts a discovered card unless its URL is already known. Returns true when a row was created.
    pub fn insert_stub(
        &self,
        stub: &ItemStub,
        content_type: ContentType,
        scraped_at: &str,
    ) -> Result<bool> {
        let n = self.conn.execute(
            "INSERT OR IGNORE INTO library_items (title, url, content_type, html, scraped_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![stub.title, stub.url, content_type.as_str(), stub.html, scraped_at],
        )?;
        Ok(n > 0)
    }

    // ── Enrichment ──

    pub fn item_urls(&self, limit: Option<usize>) -> Result<Vec<(i64, String)>> {
        let sql = match limit {
            Some(n) => format!("SELECT id, url FROM library_items ORDER BY id LIMIT {}", n),
            None => "SELECT id, url FROM library_items ORDER BY id".to_string(),
        };
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Writes detail fields and replaces both tag sets for `item_id` in one transaction.
    pub fn apply_enrichment(&self, item_id: i64, detail: &DetailRecord) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "UPDATE library_items SET title = ?1, description = ?2, resource_type = ?3 WHERE id = ?4",
            params![detail.title, detail.description, detail.resource_type, item_id],
        )?;
        tx.execute("DELETE FROM library_item_ages WHERE item_id = ?1", params![item_id])?;
        tx.execute("DELETE FROM library_item_subjects WHERE item_id = ?1", params![item_id])?;
        {
            let mut age_stmt =
                tx.prepare("INSERT INTO library_item_ages (item_id, age) VALUES (?1, ?2)")?;
            for age in &detail.ages {
                age_stmt.execute(params![item_id, age])?;
            }
            let mut subject_stmt = tx
                .prepare("INSERT INTO library_item_subjects (item_id, subject) VALUES (?1, ?2)")?;
            for subject in &detail.subjects {
                subject_stmt.execute(params![item_id, subject])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    // ── Reads ──

    pub fn find_by_url(&self, url: &str) -> Result<Option<LibraryItem>> {
        let item = self
            .conn
            .query_row(
                "SELECT id, url, title, content_type, html, scraped_at, description, resource_type
                 FROM library_items WHERE url = ?1",
                params![url],
                |row| {
                    Ok(LibraryItem {
                        id: row.get(0)?,
                        url: row.get(1)?,
                        title: row.get(2)?,
                        content_type: row.get(3)?,
                        html: row.get(4)?,
                        scraped_at: row.get(5)?,
                        description: row.get(6)?,
                        resource_type: row.get(7)?,
                    })
                },
            )
            .optional()?;
        Ok(item)
    }

    pub fn ages_for(&self, item_id: i64) -> Result<Vec<String>> {
        self.tag_values("SELECT age FROM library_item_ages WHERE item_id = ?1 ORDER BY rowid", item_id)
    }

    pub fn subjects_for(&self, item_id: i64) -> Result<Vec<String>> {
        self.tag_values(
            "SELECT subject FROM library_item_subjects WHERE item_id = ?1 ORDER BY rowid",
            item_id,
        )
    }

    fn tag_values(&self, sql: &str, item_id: i64) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt
            .query_map(params![item_id], |row| row.get(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn list_items(
        &self,
        content_type: Option<ContentType>,
        limit: usize,
    ) -> Result<Vec<OverviewRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT i.id, COALESCE(i.title,''), COALESCE(i.content_type,''),
                    COALESCE(i.resource_type,''),
                    (SELECT COUNT(*) FROM library_item_ages a WHERE a.item_id = i.id),
                    (SELECT COUNT(*) FROM library_item_subjects s WHERE s.item_id = i.id),
                    i.url
             FROM library_items i
             WHERE ?1 IS NULL OR i.content_type = ?1
             ORDER BY i.id
             LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(
                params![content_type.map(ContentType::as_str), limit as i64],
                |row| {
                    Ok(OverviewRow {
                        id: row.get(0)?,
                        title: row.get(1)?,
                        content_type: row.get(2)?,
                        resource_type: row.get(3)?,
                        ages: row.get(4)?,
                        subjects: row.get(5)?,
                        url: row.get(6)?,
                    })
                },
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn stats(&self) -> Result<Stats> {
        let count = |sql: &str| -> Result<usize> {
            Ok(self.conn.query_row(sql, [], |r| r.get(0))?)
        };
        let total = count("SELECT COUNT(*) FROM library_items")?;
        let enriched = count(
            "SELECT COUNT(*) FROM library_items
             WHERE description IS NOT NULL OR resource_type IS NOT NULL",
        )?;
        let age_tags = count("SELECT COUNT(*) FROM library_item_ages")?;
        let subject_tags = count("SELECT COUNT(*) FROM library_item_subjects")?;

        let mut stmt = self.conn.prepare(
            "SELECT COALESCE(content_type,'?'), COUNT(*) FROM library_items
             GROUP BY content_type ORDER BY COUNT(*) DESC, content_type",
        )?;
        let by_type = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Stats {
            total,
            enriched,
            age_tags,
            subject_tags,
            by_type,
        })
    }
}

// ── Tests ──
