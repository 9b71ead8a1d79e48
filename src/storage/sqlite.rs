//! SQLite storage backend for wikiledger

use super::traits::{
    CommitOutcome, CommitTarget, OpenStore, RevisionCommit, StorageError, StorageResult, WikiStore,
};
use crate::model::{
    Author, LinkKind, MarkupMode, NewWeb, Page, PageId, PageLock, Reference, Revision, RevisionId,
    Web, WebId, WebReference,
};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, TransactionBehavior};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

const BUSY_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

const REVISION_COLUMNS: &str = "r.id, r.page_id, r.content, r.author, r.ip, r.revised_at";

type RevisionRow = (i64, i64, String, Option<String>, Option<String>, String);
type PageRow = (i64, i64, String, Option<String>, Option<String>);
type WebRow = (i64, String, String, Option<String>, String, bool);

/// SQLite-backed wiki store
///
/// Uses a single SQLite database file with tables for webs, pages,
/// revisions, references and file records. Thread-safe via internal mutex
/// on the connection; cross-process writers are serialised by SQLite
/// itself (each commit takes the write lock up front).
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Initialize the database schema
    fn init_schema(conn: &Connection) -> StorageResult<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS webs (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                address TEXT NOT NULL UNIQUE,
                password TEXT,
                markup TEXT NOT NULL DEFAULT 'markdown',
                brackets_only INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS pages (
                id INTEGER PRIMARY KEY,
                web_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                locked_at TEXT,
                locked_by TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE (web_id, name),
                FOREIGN KEY (web_id) REFERENCES webs(id) ON DELETE CASCADE
            );

            -- AUTOINCREMENT: sequence numbers are never reused after a delete
            CREATE TABLE IF NOT EXISTS revisions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                page_id INTEGER NOT NULL,
                content TEXT NOT NULL,
                author TEXT,
                ip TEXT,
                revised_at TEXT NOT NULL,
                FOREIGN KEY (page_id) REFERENCES pages(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_revisions_page
                ON revisions(page_id);
            CREATE INDEX IF NOT EXISTS idx_revisions_author
                ON revisions(author);

            CREATE TABLE IF NOT EXISTS wiki_references (
                id INTEGER PRIMARY KEY,
                page_id INTEGER NOT NULL,
                referenced_name TEXT NOT NULL,
                link_type TEXT NOT NULL,
                from_rename INTEGER NOT NULL DEFAULT 0,
                FOREIGN KEY (page_id) REFERENCES pages(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_references_page
                ON wiki_references(page_id);
            CREATE INDEX IF NOT EXISTS idx_references_name
                ON wiki_references(referenced_name, link_type);

            CREATE TABLE IF NOT EXISTS wiki_files (
                id INTEGER PRIMARY KEY,
                web_id INTEGER NOT NULL,
                file_name TEXT NOT NULL,
                description TEXT NOT NULL,
                UNIQUE (web_id, file_name),
                FOREIGN KEY (web_id) REFERENCES webs(id) ON DELETE CASCADE
            );

            PRAGMA foreign_keys = ON;

            -- Readers see the last committed state while a commit is in flight
            PRAGMA journal_mode = WAL;
            "#,
        )?;
        debug!("wiki schema ready");
        Ok(())
    }

    fn conn(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }

    fn row_to_web(row: WebRow) -> StorageResult<Web> {
        let (id, name, address, password, markup, brackets_only) = row;
        Ok(Web {
            id: WebId::new(id),
            name,
            address,
            password,
            markup: markup.parse::<MarkupMode>().map_err(StorageError::UnknownMarkup)?,
            brackets_only,
        })
    }

    fn row_to_page(row: PageRow) -> StorageResult<Page> {
        let (id, web_id, name, locked_at, locked_by) = row;
        let lock = match locked_at {
            Some(at) => Some(PageLock {
                locked_at: parse_time(&at)?,
                locked_by: locked_by.unwrap_or_default(),
            }),
            None => None,
        };
        Ok(Page {
            id: PageId::new(id),
            web_id: WebId::new(web_id),
            name,
            lock,
        })
    }

    fn row_to_revision(row: RevisionRow) -> StorageResult<Revision> {
        let (id, page_id, content, author, ip, revised_at) = row;
        Ok(Revision {
            id: RevisionId::new(id),
            page_id: PageId::new(page_id),
            content,
            author: Author {
                name: author.unwrap_or_default(),
                origin: ip,
            },
            revised_at: parse_time(&revised_at)?,
        })
    }

    fn read_revision_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RevisionRow> {
        Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
            row.get(5)?,
        ))
    }

    fn read_web_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<WebRow> {
        Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
            row.get(5)?,
        ))
    }

    fn read_page_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PageRow> {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
    }

    fn query_page_by_id(conn: &Connection, page_id: PageId) -> StorageResult<Option<Page>> {
        let row = conn
            .query_row(
                "SELECT id, web_id, name, locked_at, locked_by FROM pages WHERE id = ?1",
                params![page_id.get()],
                Self::read_page_row,
            )
            .optional()?;
        row.map(Self::row_to_page).transpose()
    }

    fn query_revision(conn: &Connection, revision_id: RevisionId) -> StorageResult<Option<Revision>> {
        let row = conn
            .query_row(
                &format!("SELECT {REVISION_COLUMNS} FROM revisions r WHERE r.id = ?1"),
                params![revision_id.get()],
                Self::read_revision_row,
            )
            .optional()?;
        row.map(Self::row_to_revision).transpose()
    }

    fn query_revisions(
        conn: &Connection,
        sql: &str,
        param: i64,
    ) -> StorageResult<Vec<Revision>> {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params![param], Self::read_revision_row)?;
        let mut revisions = Vec::new();
        for row in rows {
            revisions.push(Self::row_to_revision(row?)?);
        }
        Ok(revisions)
    }
}

fn format_time(time: &DateTime<Utc>) -> String {
    // Fixed width, so lexical order matches time order
    time.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_time(raw: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|time| time.with_timezone(&Utc))
        .map_err(|e| StorageError::DateParse(e.to_string()))
}

fn parse_kind(code: &str) -> StorageResult<LinkKind> {
    let mut chars = code.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => LinkKind::from_code(c).ok_or_else(|| StorageError::UnknownLinkKind(code.to_string())),
        _ => Err(StorageError::UnknownLinkKind(code.to_string())),
    }
}

/// SQL list literal for a set of kinds; codes come from the enum, never from input
fn kind_list(kinds: &[LinkKind]) -> String {
    let codes: Vec<String> = kinds.iter().map(|kind| format!("'{}'", kind.code())).collect();
    format!("({})", codes.join(", "))
}

fn map_unique(err: rusqlite::Error, on_conflict: StorageError) -> StorageError {
    match err {
        rusqlite::Error::SqliteFailure(ref e, _) if e.code == ErrorCode::ConstraintViolation => on_conflict,
        other => StorageError::Database(other),
    }
}

impl OpenStore for SqliteStore {
    fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        // Other processes may hold the write lock; wait instead of failing
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl WikiStore for SqliteStore {
    // === Web Operations ===

    fn create_web(&self, web: &NewWeb) -> StorageResult<Web> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO webs (name, address, password, markup, brackets_only, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                web.name,
                web.address,
                web.password,
                web.markup.as_str(),
                web.brackets_only,
                format_time(&Utc::now()),
            ],
        )
        .map_err(|e| map_unique(e, StorageError::WebExists(web.address.clone())))?;

        Ok(Web {
            id: WebId::new(conn.last_insert_rowid()),
            name: web.name.clone(),
            address: web.address.clone(),
            password: web.password.clone(),
            markup: web.markup,
            brackets_only: web.brackets_only,
        })
    }

    fn load_web(&self, address: &str) -> StorageResult<Option<Web>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT id, name, address, password, markup, brackets_only FROM webs WHERE address = ?1",
                params![address],
                Self::read_web_row,
            )
            .optional()?;
        row.map(Self::row_to_web).transpose()
    }

    fn list_webs(&self) -> StorageResult<Vec<Web>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, address, password, markup, brackets_only FROM webs ORDER BY name, address",
        )?;
        let rows = stmt.query_map([], Self::read_web_row)?;

        let mut webs = Vec::new();
        for row in rows {
            webs.push(Self::row_to_web(row?)?);
        }
        Ok(webs)
    }

    // === File Records ===

    fn save_file(&self, web_id: WebId, file_name: &str, description: &str) -> StorageResult<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO wiki_files (web_id, file_name, description)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(web_id, file_name) DO UPDATE SET
                description = excluded.description
            "#,
            params![web_id.get(), file_name, description],
        )?;
        Ok(())
    }

    fn has_file(&self, web_id: WebId, file_name: &str) -> StorageResult<bool> {
        let conn = self.conn()?;
        let found: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM wiki_files WHERE web_id = ?1 AND file_name = ?2",
            params![web_id.get(), file_name],
            |row| row.get(0),
        )?;
        Ok(found)
    }

    // === Page Operations ===

    fn load_page(&self, web_id: WebId, name: &str) -> StorageResult<Option<Page>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT id, web_id, name, locked_at, locked_by FROM pages WHERE web_id = ?1 AND name = ?2",
                params![web_id.get(), name],
                Self::read_page_row,
            )
            .optional()?;
        row.map(Self::row_to_page).transpose()
    }

    fn list_pages(&self, web_id: WebId) -> StorageResult<Vec<Page>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, web_id, name, locked_at, locked_by FROM pages WHERE web_id = ?1 ORDER BY name",
        )?;
        let rows = stmt.query_map(params![web_id.get()], Self::read_page_row)?;

        let mut pages = Vec::new();
        for row in rows {
            pages.push(Self::row_to_page(row?)?);
        }
        Ok(pages)
    }

    fn delete_page(&self, page_id: PageId) -> StorageResult<bool> {
        let conn = self.conn()?;
        // Revisions and references go with it (ON DELETE CASCADE)
        let rows = conn.execute("DELETE FROM pages WHERE id = ?1", params![page_id.get()])?;
        Ok(rows > 0)
    }

    fn save_lock(&self, page_id: PageId, lock: Option<&PageLock>) -> StorageResult<()> {
        let conn = self.conn()?;
        let rows = conn.execute(
            "UPDATE pages SET locked_at = ?2, locked_by = ?3 WHERE id = ?1",
            params![
                page_id.get(),
                lock.map(|l| format_time(&l.locked_at)),
                lock.map(|l| l.locked_by.as_str()),
            ],
        )?;
        if rows == 0 {
            return Err(StorageError::PageNotFound(page_id));
        }
        Ok(())
    }

    // === Revision Operations ===

    fn revisions(&self, page_id: PageId) -> StorageResult<Vec<Revision>> {
        let conn = self.conn()?;
        Self::query_revisions(
            &conn,
            &format!("SELECT {REVISION_COLUMNS} FROM revisions r WHERE r.page_id = ?1 ORDER BY r.id"),
            page_id.get(),
        )
    }

    fn current_revision(&self, page_id: PageId) -> StorageResult<Option<Revision>> {
        let conn = self.conn()?;
        let mut revisions = Self::query_revisions(
            &conn,
            &format!(
                "SELECT {REVISION_COLUMNS} FROM revisions r WHERE r.page_id = ?1 ORDER BY r.id DESC LIMIT 1"
            ),
            page_id.get(),
        )?;
        Ok(revisions.pop())
    }

    fn revision_count(&self, page_id: PageId) -> StorageResult<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM revisions WHERE page_id = ?1",
            params![page_id.get()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn current_revisions(&self, web_id: WebId) -> StorageResult<Vec<Revision>> {
        let conn = self.conn()?;
        Self::query_revisions(
            &conn,
            &format!(
                r#"
                SELECT {REVISION_COLUMNS}
                FROM revisions r
                JOIN pages p ON p.id = r.page_id
                WHERE p.web_id = ?1
                  AND r.id = (SELECT MAX(id) FROM revisions WHERE page_id = r.page_id)
                ORDER BY p.name
                "#
            ),
            web_id.get(),
        )
    }

    fn authors(&self, web_id: WebId) -> StorageResult<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT DISTINCT r.author
            FROM revisions r
            JOIN pages p ON p.id = r.page_id
            WHERE p.web_id = ?1 AND r.author IS NOT NULL AND r.author <> ''
            ORDER BY r.author
            "#,
        )?;
        let names = stmt
            .query_map(params![web_id.get()], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }

    fn authored_pages(&self, web_id: WebId) -> StorageResult<Vec<(String, PageId)>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT DISTINCT r.author, r.page_id
            FROM revisions r
            JOIN pages p ON p.id = r.page_id
            WHERE p.web_id = ?1 AND r.author IS NOT NULL AND r.author <> ''
            ORDER BY r.author, r.page_id
            "#,
        )?;
        let pairs = stmt
            .query_map(params![web_id.get()], |row| {
                Ok((row.get::<_, String>(0)?, PageId::new(row.get::<_, i64>(1)?)))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(pairs)
    }

    fn commit_revision(&self, commit: &RevisionCommit) -> StorageResult<CommitOutcome> {
        let mut conn = self.conn()?;
        // Take the write lock before reading the head, so the check below
        // cannot be invalidated by another writer
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let stamp = format_time(&commit.revised_at);

        let (page_id, amend_head) = match &commit.target {
            CommitTarget::NewPage => {
                tx.execute(
                    "INSERT INTO pages (web_id, name, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)",
                    params![commit.web_id.get(), commit.name, stamp],
                )
                .map_err(|e| map_unique(e, StorageError::PageExists(commit.name.clone())))?;
                (PageId::new(tx.last_insert_rowid()), None)
            }
            CommitTarget::Existing { page_id, head, amend } => {
                let current: Option<i64> = tx.query_row(
                    "SELECT MAX(id) FROM revisions WHERE page_id = ?1",
                    params![page_id.get()],
                    |row| row.get(0),
                )?;
                if current != Some(head.get()) {
                    // Dropping the transaction rolls it back
                    return Err(StorageError::Conflict(format!(
                        "page {} moved past revision {} while saving",
                        page_id, head
                    )));
                }

                let updated = tx
                    .execute(
                        "UPDATE pages SET name = ?2, updated_at = ?3 WHERE id = ?1",
                        params![page_id.get(), commit.name, stamp],
                    )
                    .map_err(|e| map_unique(e, StorageError::PageExists(commit.name.clone())))?;
                if updated == 0 {
                    return Err(StorageError::PageNotFound(*page_id));
                }
                (*page_id, amend.then_some(*head))
            }
        };

        let revision_id = match amend_head {
            Some(head) => {
                tx.execute(
                    "UPDATE revisions SET content = ?2, revised_at = ?3 WHERE id = ?1",
                    params![head.get(), commit.content, stamp],
                )?;
                head
            }
            None => {
                tx.execute(
                    r#"
                    INSERT INTO revisions (page_id, content, author, ip, revised_at)
                    VALUES (?1, ?2, ?3, ?4, ?5)
                    "#,
                    params![
                        page_id.get(),
                        commit.content,
                        commit.author.name,
                        commit.author.origin,
                        stamp,
                    ],
                )?;
                RevisionId::new(tx.last_insert_rowid())
            }
        };

        tx.execute(
            "DELETE FROM wiki_references WHERE page_id = ?1",
            params![page_id.get()],
        )?;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO wiki_references (page_id, referenced_name, link_type, from_rename)
                VALUES (?1, ?2, ?3, ?4)
                "#,
            )?;
            let redirected = LinkKind::Redirected.code().to_string();
            for name in &commit.former_names {
                stmt.execute(params![page_id.get(), name, redirected, true])?;
            }
            for reference in &commit.references {
                // One row per redirect; the rename marker wins
                if reference.kind == LinkKind::Redirected
                    && commit.former_names.contains(&reference.referenced_name)
                {
                    continue;
                }
                stmt.execute(params![
                    page_id.get(),
                    reference.referenced_name,
                    reference.kind.code().to_string(),
                    false,
                ])?;
            }
        }

        let page = Self::query_page_by_id(&tx, page_id)?.ok_or(StorageError::PageNotFound(page_id))?;
        let revision = Self::query_revision(&tx, revision_id)?.ok_or_else(|| {
            StorageError::Conflict(format!("revision {} vanished during commit", revision_id))
        })?;
        tx.commit()?;

        Ok(CommitOutcome {
            page,
            revision,
            amended: amend_head.is_some(),
        })
    }

    // === Reference Operations ===

    fn references_from(&self, page_id: PageId) -> StorageResult<Vec<Reference>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT referenced_name, link_type FROM wiki_references WHERE page_id = ?1 ORDER BY referenced_name, id",
        )?;
        let rows = stmt.query_map(params![page_id.get()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut references = Vec::new();
        for row in rows {
            let (name, code) = row?;
            references.push(Reference::new(name, parse_kind(&code)?));
        }
        Ok(references)
    }

    fn former_names(&self, page_id: PageId) -> StorageResult<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT DISTINCT referenced_name FROM wiki_references
            WHERE page_id = ?1 AND from_rename = 1
            ORDER BY referenced_name
            "#,
        )?;
        let names = stmt
            .query_map(params![page_id.get()], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }

    fn references_in_web(&self, web_id: WebId, kinds: &[LinkKind]) -> StorageResult<Vec<WebReference>> {
        let conn = self.conn()?;
        let sql = format!(
            r#"
            SELECT p.id, p.name, w.referenced_name, w.link_type
            FROM wiki_references w
            JOIN pages p ON p.id = w.page_id
            WHERE p.web_id = ?1 AND w.link_type IN {}
            ORDER BY p.name, w.referenced_name
            "#,
            kind_list(kinds)
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![web_id.get()], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut references = Vec::new();
        for row in rows {
            let (page_id, page_name, referenced_name, code) = row?;
            references.push(WebReference {
                page_id: PageId::new(page_id),
                page_name,
                referenced_name,
                kind: parse_kind(&code)?,
            });
        }
        Ok(references)
    }

    fn referencing_page_names(
        &self,
        web_id: WebId,
        name: &str,
        kinds: &[LinkKind],
    ) -> StorageResult<Vec<String>> {
        let conn = self.conn()?;
        let sql = format!(
            r#"
            SELECT DISTINCT p.name
            FROM pages p
            JOIN wiki_references w ON p.id = w.page_id
            WHERE p.web_id = ?1 AND w.referenced_name = ?2 AND w.link_type IN {}
            ORDER BY p.name
            "#,
            kind_list(kinds)
        );
        let mut stmt = conn.prepare(&sql)?;
        let names = stmt
            .query_map(params![web_id.get(), name], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }
}
