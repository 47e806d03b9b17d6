//! Library repository
//!
//! Every query the API runs against the library schema: full sync, song
//! registration, download bookkeeping and payload lookup.

use chrono::Utc;
use sqlx::{FromRow, PgPool, Postgres, Transaction};

use crate::models::{FullSyncSummary, SongDownload, SongSource, Thumbnail};
use crate::services::library::SyncPlan;

/// A song that still needs its audio payload
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct PendingDownload {
    pub id: i32,
    pub weburl: String,
}

/// Payload that was replaced or deleted and should be removed from storage
pub type OrphanedPayload = (String, String);

/// Repository for library database operations
#[derive(Clone)]
pub struct LibraryRepository {
    pool: PgPool,
}

impl LibraryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Replace the whole library with `plan` in one transaction
    ///
    /// Returns the written row counts and the payloads of every deleted song.
    pub async fn full_sync(
        &self,
        plan: &SyncPlan<'_>,
    ) -> Result<(FullSyncSummary, Vec<OrphanedPayload>), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM playlist_song").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM playlist").execute(&mut *tx).await?;
        let orphaned = sqlx::query_as::<_, OrphanedPayload>(
            r#"
            WITH removed AS (DELETE FROM song RETURNING data_uuid, dataext)
            SELECT data_uuid, dataext
            FROM removed
            WHERE data_uuid IS NOT NULL AND dataext IS NOT NULL
            "#,
        )
        .fetch_all(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM album").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM artist").execute(&mut *tx).await?;

        let mut artist_ids = Vec::with_capacity(plan.artists.len());
        for title in &plan.artists {
            artist_ids.push(insert_titled(&mut tx, "artist", title).await?);
        }

        let mut album_ids = Vec::with_capacity(plan.albums.len());
        for title in &plan.albums {
            album_ids.push(insert_titled(&mut tx, "album", title).await?);
        }

        let mut song_ids = Vec::with_capacity(plan.songs.len());
        for planned in &plan.songs {
            let song = planned.song;
            let id: i32 = sqlx::query_scalar(
                r#"
                INSERT INTO song (title, duration, extractor, weburl, thumburl, artist_id, album_id)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                RETURNING id
                "#,
            )
            .bind(&song.title)
            .bind(song.duration)
            .bind(&song.extractor)
            .bind(&song.weburl)
            .bind(&song.thumburl)
            .bind(artist_ids[planned.artist])
            .bind(planned.album.map(|index| album_ids[index]))
            .fetch_one(&mut *tx)
            .await?;
            song_ids.push(id);
        }

        let dateadded = Utc::now();
        for playlist in &plan.playlists {
            let playlist_id = insert_titled(&mut tx, "playlist", playlist.title).await?;
            for &song_index in &playlist.songs {
                sqlx::query(
                    r#"
                    INSERT INTO playlist_song (song_id, playlist_id, dateadded)
                    VALUES ($1, $2, $3)
                    "#,
                )
                .bind(song_ids[song_index])
                .bind(playlist_id)
                .bind(dateadded)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        Ok((plan.summary(), orphaned))
    }

    /// Find an artist by name, creating it if needed
    pub async fn find_or_create_artist(&self, title: &str) -> Result<i32, sqlx::Error> {
        sqlx::query_scalar(
            r#"
            INSERT INTO artist (title) VALUES ($1)
            ON CONFLICT (title) DO UPDATE SET title = EXCLUDED.title
            RETURNING id
            "#,
        )
        .bind(title)
        .fetch_one(&self.pool)
        .await
    }

    /// Find an album by title, creating it if needed
    pub async fn find_or_create_album(&self, title: &str) -> Result<i32, sqlx::Error> {
        let existing: Option<i32> =
            sqlx::query_scalar("SELECT id FROM album WHERE title = $1 ORDER BY id LIMIT 1")
                .bind(title)
                .fetch_optional(&self.pool)
                .await?;

        match existing {
            Some(id) => Ok(id),
            None => {
                sqlx::query_scalar("INSERT INTO album (title) VALUES ($1) RETURNING id")
                    .bind(title)
                    .fetch_one(&self.pool)
                    .await
            }
        }
    }

    /// Register a song by its web URL, or update the existing one
    ///
    /// A new song without an explicit title is titled with its URL until a
    /// download fills in the real one. Artist and album are only overwritten
    /// when given.
    pub async fn upsert_song_for_url(
        &self,
        weburl: &str,
        title: Option<&str>,
        artist_id: Option<i32>,
        album_id: Option<i32>,
    ) -> Result<i32, sqlx::Error> {
        sqlx::query_scalar(
            r#"
            INSERT INTO song (title, weburl, artist_id, album_id)
            VALUES (COALESCE($2, $1), $1, $3, $4)
            ON CONFLICT (weburl) DO UPDATE SET
                title = COALESCE($2, song.title),
                artist_id = COALESCE(EXCLUDED.artist_id, song.artist_id),
                album_id = COALESCE(EXCLUDED.album_id, song.album_id)
            RETURNING id
            "#,
        )
        .bind(weburl)
        .bind(title)
        .bind(artist_id)
        .bind(album_id)
        .fetch_one(&self.pool)
        .await
    }

    /// Enabled songs with a web URL but no stored payload
    pub async fn songs_missing_data(&self) -> Result<Vec<PendingDownload>, sqlx::Error> {
        sqlx::query_as::<_, PendingDownload>(
            r#"
            SELECT id, weburl
            FROM song
            WHERE data_uuid IS NULL AND weburl IS NOT NULL AND disabled = FALSE
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await
    }

    pub async fn find_thumbnail_by_hash(
        &self,
        hash: &str,
    ) -> Result<Option<Thumbnail>, sqlx::Error> {
        sqlx::query_as::<_, Thumbnail>(
            "SELECT id, hash, data_uuid, ext FROM thumbnail WHERE hash = $1",
        )
        .bind(hash)
        .fetch_optional(&self.pool)
        .await
    }

    /// Insert a thumbnail, or return the row already stored for `hash`
    ///
    /// When another download stored the same image first, the returned row
    /// carries that download's `data_uuid`.
    pub async fn upsert_thumbnail(
        &self,
        hash: &str,
        data_uuid: &str,
        ext: &str,
    ) -> Result<Thumbnail, sqlx::Error> {
        sqlx::query_as::<_, Thumbnail>(
            r#"
            INSERT INTO thumbnail (hash, data_uuid, ext)
            VALUES ($1, $2, $3)
            ON CONFLICT (hash) DO UPDATE SET hash = EXCLUDED.hash
            RETURNING id, hash, data_uuid, ext
            "#,
        )
        .bind(hash)
        .bind(data_uuid)
        .bind(ext)
        .fetch_one(&self.pool)
        .await
    }

    /// Record a finished download on its song
    ///
    /// Returns `None` if the song no longer exists, otherwise the payload
    /// the song held before (if any), which the caller should remove. The
    /// extracted title only replaces the URL placeholder set at registration;
    /// artist and album only fill in missing values.
    pub async fn attach_download(
        &self,
        song_id: i32,
        download: &SongDownload,
    ) -> Result<Option<SongSource>, sqlx::Error> {
        sqlx::query_as::<_, SongSource>(
            r#"
            UPDATE song s SET
                data_uuid = $2,
                dataext = $3,
                thumb_id = COALESCE($4, s.thumb_id),
                title = CASE
                    WHEN s.title = s.weburl AND $5::TEXT IS NOT NULL THEN $5
                    ELSE s.title
                END,
                duration = COALESCE($6, s.duration),
                extractor = COALESCE($7, s.extractor),
                thumburl = COALESCE($8, s.thumburl),
                artist_id = COALESCE(s.artist_id, $9),
                album_id = COALESCE(s.album_id, $10)
            FROM (SELECT id, data_uuid, dataext FROM song WHERE id = $1 FOR UPDATE) previous
            WHERE s.id = previous.id
            RETURNING previous.id, previous.data_uuid, previous.dataext
            "#,
        )
        .bind(song_id)
        .bind(&download.data_uuid)
        .bind(&download.dataext)
        .bind(download.thumb_id)
        .bind(&download.title)
        .bind(download.duration)
        .bind(&download.extractor)
        .bind(&download.thumburl)
        .bind(download.artist_id)
        .bind(download.album_id)
        .fetch_optional(&self.pool)
        .await
    }

    /// Where a song's audio payload is stored
    pub async fn song_source(&self, song_id: i32) -> Result<Option<SongSource>, sqlx::Error> {
        sqlx::query_as::<_, SongSource>("SELECT id, data_uuid, dataext FROM song WHERE id = $1")
            .bind(song_id)
            .fetch_optional(&self.pool)
            .await
    }

    /// The thumbnail attached to a song, if the song exists and has one
    pub async fn thumbnail_for_song(
        &self,
        song_id: i32,
    ) -> Result<Option<Thumbnail>, sqlx::Error> {
        sqlx::query_as::<_, Thumbnail>(
            r#"
            SELECT t.id, t.hash, t.data_uuid, t.ext
            FROM song s
            JOIN thumbnail t ON t.id = s.thumb_id
            WHERE s.id = $1
            "#,
        )
        .bind(song_id)
        .fetch_optional(&self.pool)
        .await
    }
}

/// Insert a row into a `(id, title)` table and return its id
async fn insert_titled(
    tx: &mut Transaction<'_, Postgres>,
    table: &'static str,
    title: &str,
) -> Result<i32, sqlx::Error> {
    let sql = format!("INSERT INTO {} (title) VALUES ($1) RETURNING id", table);
    sqlx::query_scalar(&sql).bind(title).fetch_one(&mut **tx).await
}
