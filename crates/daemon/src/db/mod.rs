use anyhow::{anyhow, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use engine::media::MediaKind;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn new(db_path: &Path) -> Result<Self> {
        Self::from_connection(Connection::open(db_path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        let db = Database {
            conn: Mutex::new(conn),
        };
        db.init_schema()?;
        Ok(db)
    }

    pub(crate) fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("database connection mutex poisoned"))
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS tags (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE COLLATE NOCASE
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS videos (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                description TEXT,
                file TEXT NOT NULL,
                uploaded_at TEXT NOT NULL,
                duration_seconds INTEGER NOT NULL DEFAULT 0,
                checksum TEXT
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS audios (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                artist TEXT,
                file TEXT NOT NULL,
                uploaded_at TEXT NOT NULL,
                duration_seconds INTEGER NOT NULL DEFAULT 0,
                mood TEXT,
                checksum TEXT
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS images (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                file TEXT NOT NULL,
                uploaded_at TEXT NOT NULL,
                checksum TEXT
            )",
            [],
        )?;

        for kind in [MediaKind::Video, MediaKind::Audio, MediaKind::Image] {
            let t = MediaTables::of(kind);
            conn.execute(
                &format!(
                    "CREATE TABLE IF NOT EXISTS {link} (
                        media_id INTEGER NOT NULL,
                        tag_id INTEGER NOT NULL,
                        PRIMARY KEY (media_id, tag_id),
                        FOREIGN KEY (media_id) REFERENCES {media}(id) ON DELETE CASCADE,
                        FOREIGN KEY (tag_id) REFERENCES tags(id) ON DELETE CASCADE
                    )",
                    link = t.link,
                    media = t.media,
                ),
                [],
            )?;
        }

        conn.execute(
            "CREATE TABLE IF NOT EXISTS jobs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                type TEXT NOT NULL,
                status TEXT NOT NULL,
                progress REAL NOT NULL,
                payload_json TEXT,
                result_json TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        Ok(())
    }
}

/// Timestamps are stored as fixed-width RFC 3339 so text order is time order.
pub(crate) fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(value: &str, column: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| {
            rusqlite::Error::InvalidColumnType(column, "TEXT".to_string(), rusqlite::types::Type::Text)
        })
}

struct MediaTables {
    media: &'static str,
    link: &'static str,
}

impl MediaTables {
    fn of(kind: MediaKind) -> Self {
        match kind {
            MediaKind::Video => MediaTables {
                media: "videos",
                link: "video_tags",
            },
            MediaKind::Audio => MediaTables {
                media: "audios",
                link: "audio_tags",
            },
            MediaKind::Image => MediaTables {
                media: "images",
                link: "image_tags",
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tag {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct Video {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub file: String,
    pub uploaded_at: DateTime<Utc>,
    pub duration_seconds: i64,
    pub checksum: Option<String>,
}

impl Video {
    const COLUMNS: &'static str =
        "v.id, v.title, v.description, v.file, v.uploaded_at, v.duration_seconds, v.checksum";

    pub fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let uploaded_at: String = row.get(4)?;
        Ok(Video {
            id: row.get(0)?,
            title: row.get(1)?,
            description: row.get(2)?,
            file: row.get(3)?,
            uploaded_at: parse_timestamp(&uploaded_at, 4)?,
            duration_seconds: row.get(5)?,
            checksum: row.get(6)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Audio {
    pub id: i64,
    pub title: String,
    pub artist: Option<String>,
    pub file: String,
    pub uploaded_at: DateTime<Utc>,
    pub duration_seconds: i64,
    pub mood: Option<String>,
    pub checksum: Option<String>,
}

impl Audio {
    const COLUMNS: &'static str =
        "v.id, v.title, v.artist, v.file, v.uploaded_at, v.duration_seconds, v.mood, v.checksum";

    pub fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let uploaded_at: String = row.get(4)?;
        Ok(Audio {
            id: row.get(0)?,
            title: row.get(1)?,
            artist: row.get(2)?,
            file: row.get(3)?,
            uploaded_at: parse_timestamp(&uploaded_at, 4)?,
            duration_seconds: row.get(5)?,
            mood: row.get(6)?,
            checksum: row.get(7)?,
        })
    }
}

/// Fields for a catalog entry created by hand (admin seeding, tests).
#[derive(Debug, Clone, Default)]
pub struct NewMedia {
    pub title: String,
    pub file: String,
    pub description: Option<String>,
    pub artist: Option<String>,
    pub mood: Option<String>,
    pub duration_seconds: i64,
    pub uploaded_at: Option<DateTime<Utc>>,
}

impl Database {
    /// Returns the tag and whether it was created by this call.
    pub fn get_or_create_tag(&self, name: &str) -> Result<(Tag, bool)> {
        let conn = self.conn()?;
        let existing = conn
            .query_row(
                "SELECT id, name FROM tags WHERE name = ?1",
                params![name],
                |row| Ok(Tag { id: row.get(0)?, name: row.get(1)? }),
            )
            .optional()?;

        match existing {
            Some(tag) => Ok((tag, false)),
            None => {
                conn.execute("INSERT INTO tags (name) VALUES (?1)", params![name])?;
                Ok((
                    Tag {
                        id: conn.last_insert_rowid(),
                        name: name.to_string(),
                    },
                    true,
                ))
            }
        }
    }

    pub fn get_tag(&self, name: &str) -> Result<Option<Tag>> {
        let conn = self.conn()?;
        Ok(conn
            .query_row(
                "SELECT id, name FROM tags WHERE name = ?1",
                params![name],
                |row| Ok(Tag { id: row.get(0)?, name: row.get(1)? }),
            )
            .optional()?)
    }

    pub fn list_tags(&self) -> Result<Vec<Tag>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT id, name FROM tags ORDER BY name COLLATE NOCASE")?;
        let rows = stmt.query_map([], |row| Ok(Tag { id: row.get(0)?, name: row.get(1)? }))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Look up a catalog entry by title, inserting it with `file` when absent.
    /// An existing entry keeps its original file reference.
    pub fn get_or_create_media(&self, kind: MediaKind, title: &str, file: &str) -> Result<(i64, bool)> {
        let t = MediaTables::of(kind);
        let conn = self.conn()?;
        let existing: Option<i64> = conn
            .query_row(
                &format!("SELECT id FROM {} WHERE title = ?1 ORDER BY id LIMIT 1", t.media),
                params![title],
                |row| row.get(0),
            )
            .optional()?;

        match existing {
            Some(id) => Ok((id, false)),
            None => {
                conn.execute(
                    &format!(
                        "INSERT INTO {} (title, file, uploaded_at) VALUES (?1, ?2, ?3)",
                        t.media
                    ),
                    params![title, file, timestamp(Utc::now())],
                )?;
                Ok((conn.last_insert_rowid(), true))
            }
        }
    }

    /// Refresh the import-derived columns of an entry. `None` leaves a column as is.
    pub fn update_media_details(
        &self,
        kind: MediaKind,
        id: i64,
        checksum: Option<&str>,
        duration_seconds: Option<i64>,
    ) -> Result<()> {
        let t = MediaTables::of(kind);
        let conn = self.conn()?;
        conn.execute(
            &format!("UPDATE {} SET checksum = COALESCE(?1, checksum) WHERE id = ?2", t.media),
            params![checksum, id],
        )?;
        if kind.is_timed() {
            if let Some(duration) = duration_seconds {
                conn.execute(
                    &format!("UPDATE {} SET duration_seconds = ?1 WHERE id = ?2", t.media),
                    params![duration, id],
                )?;
            }
        }
        Ok(())
    }

    /// Attach a tag; attaching it twice is a no-op.
    pub fn add_tag(&self, kind: MediaKind, media_id: i64, tag_id: i64) -> Result<()> {
        let t = MediaTables::of(kind);
        let conn = self.conn()?;
        conn.execute(
            &format!("INSERT OR IGNORE INTO {} (media_id, tag_id) VALUES (?1, ?2)", t.link),
            params![media_id, tag_id],
        )?;
        Ok(())
    }

    pub fn create_media(&self, kind: MediaKind, media: &NewMedia) -> Result<i64> {
        let uploaded_at = timestamp(media.uploaded_at.unwrap_or_else(Utc::now));
        let conn = self.conn()?;
        match kind {
            MediaKind::Video => conn.execute(
                "INSERT INTO videos (title, description, file, uploaded_at, duration_seconds)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![media.title, media.description, media.file, uploaded_at, media.duration_seconds],
            )?,
            MediaKind::Audio => conn.execute(
                "INSERT INTO audios (title, artist, file, uploaded_at, duration_seconds, mood)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![media.title, media.artist, media.file, uploaded_at, media.duration_seconds, media.mood],
            )?,
            MediaKind::Image => conn.execute(
                "INSERT INTO images (title, file, uploaded_at) VALUES (?1, ?2, ?3)",
                params![media.title, media.file, uploaded_at],
            )?,
        };
        Ok(conn.last_insert_rowid())
    }

    /// Create an entry and attach `tags`, creating missing tags on the way.
    pub fn create_tagged_media(&self, kind: MediaKind, media: &NewMedia, tags: &[&str]) -> Result<i64> {
        let id = self.create_media(kind, media)?;
        for name in tags {
            let (tag, _) = self.get_or_create_tag(name)?;
            self.add_tag(kind, id, tag.id)?;
        }
        Ok(id)
    }

    #[cfg(test)]
    pub fn media_ids_titled(&self, kind: MediaKind, title: &str) -> Result<Vec<i64>> {
        let t = MediaTables::of(kind);
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!("SELECT id FROM {} WHERE title = ?1 ORDER BY id", t.media))?;
        let rows = stmt.query_map(params![title], |row| row.get(0))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    #[cfg(test)]
    pub fn media_tags(&self, kind: MediaKind, media_id: i64) -> Result<Vec<String>> {
        let t = MediaTables::of(kind);
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT t.name FROM tags t JOIN {} l ON l.tag_id = t.id
             WHERE l.media_id = ?1 ORDER BY t.name COLLATE NOCASE",
            t.link
        ))?;
        let rows = stmt.query_map(params![media_id], |row| row.get(0))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// WHERE clause matching entries that carry any of `count` tags.
    fn any_tag_filter(link: &str, count: usize) -> String {
        let placeholders = (1..=count)
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "EXISTS (SELECT 1 FROM {link} l JOIN tags t ON t.id = l.tag_id
                     WHERE l.media_id = v.id AND t.name IN ({placeholders}))"
        )
    }

    /// Most recently uploaded video carrying any of `tags` (ties: highest id).
    pub fn first_video_with_any_tag(&self, tags: &[String]) -> Result<Option<Video>> {
        if tags.is_empty() {
            return Ok(None);
        }
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM videos v WHERE {} ORDER BY v.uploaded_at DESC, v.id DESC LIMIT 1",
            Video::COLUMNS,
            Self::any_tag_filter("video_tags", tags.len())
        );
        Ok(conn
            .query_row(&sql, params_from_iter(tags.iter()), |row| Video::from_row(row))
            .optional()?)
    }

    /// Most recently uploaded audio carrying any of `tags` (ties: highest id).
    pub fn first_audio_with_any_tag(&self, tags: &[String]) -> Result<Option<Audio>> {
        if tags.is_empty() {
            return Ok(None);
        }
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM audios v WHERE {} ORDER BY v.uploaded_at DESC, v.id DESC LIMIT 1",
            Audio::COLUMNS,
            Self::any_tag_filter("audio_tags", tags.len())
        );
        Ok(conn
            .query_row(&sql, params_from_iter(tags.iter()), |row| Audio::from_row(row))
            .optional()?)
    }

    pub fn videos_for_tag(&self, tag_id: i64) -> Result<Vec<Video>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM videos v JOIN video_tags l ON l.media_id = v.id
             WHERE l.tag_id = ?1 ORDER BY v.uploaded_at DESC, v.id DESC",
            Video::COLUMNS
        ))?;
        let rows = stmt.query_map(params![tag_id], |row| Video::from_row(row))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}
