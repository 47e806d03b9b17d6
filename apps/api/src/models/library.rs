//! Library rows and request bodies

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Stored thumbnail, deduplicated by content hash
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Thumbnail {
    pub id: i32,
    /// Hex SHA-256 of the image bytes
    pub hash: String,
    pub data_uuid: String,
    pub ext: String,
}

/// Location of a song's stored audio payload
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct SongSource {
    pub id: i32,
    pub data_uuid: Option<String>,
    pub dataext: Option<String>,
}

/// Metadata written back to a song after a successful download
#[derive(Debug, Clone, PartialEq)]
pub struct SongDownload {
    pub data_uuid: String,
    pub dataext: String,
    pub thumb_id: Option<i32>,
    pub title: Option<String>,
    pub duration: Option<f64>,
    pub extractor: Option<String>,
    pub thumburl: Option<String>,
    /// Only applied when the song has no artist yet
    pub artist_id: Option<i32>,
    /// Only applied when the song has no album yet
    pub album_id: Option<i32>,
}

// =============================================================================
// Request bodies
// =============================================================================

/// Body of `POST /api/song`
#[derive(Debug, Clone, Deserialize)]
pub struct SongIn {
    pub weburl: String,
    pub title: Option<String>,
    pub album: Option<String>,
    pub artist: Option<String>,
}

/// One song inside a full sync playlist
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SongFullSync {
    pub title: String,
    pub album: Option<String>,
    pub duration: f64,
    pub extractor: String,
    pub weburl: Option<String>,
    pub thumburl: Option<String>,
    pub artist: String,
}

/// One playlist inside a full sync
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PlaylistFullSync {
    pub title: String,
    pub songs: Vec<SongFullSync>,
}

/// Body of `POST /api/fullsync`: the complete library, grouped by playlist
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FullSync {
    pub playlists: Vec<PlaylistFullSync>,
}

/// Row counts written by a full sync
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FullSyncSummary {
    pub artists: usize,
    pub albums: usize,
    pub songs: usize,
    pub playlists: usize,
    pub playlist_songs: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_sync_deserialization() {
        let json = r#"{
            "playlists": [{
                "title": "Road trip",
                "songs": [{
                    "title": "Hammerhead",
                    "album": null,
                    "duration": 201.5,
                    "extractor": "Bandcamp",
                    "weburl": "https://abductedbysharks.bandcamp.com/track/hammerhead",
                    "thumburl": null,
                    "artist": "Abducted By Sharks"
                }]
            }]
        }"#;

        let sync: FullSync = serde_json::from_str(json).unwrap();
        assert_eq!(sync.playlists.len(), 1);
        let song = &sync.playlists[0].songs[0];
        assert_eq!(song.artist, "Abducted By Sharks");
        assert!(song.album.is_none());
        assert_eq!(song.duration, 201.5);
    }

    #[test]
    fn test_song_in_optional_fields() {
        let song: SongIn =
            serde_json::from_str(r#"{"weburl": "https://youtube.com/watch?v=T5-faDLv1Vs"}"#)
                .unwrap();
        assert!(song.title.is_none());
        assert!(song.artist.is_none());
    }
}
