//! Full library synchronisation
//!
//! A full sync replaces the whole library. The request is first flattened
//! into a [`SyncPlan`] with duplicates merged, then written in one
//! transaction by [`LibraryRepository::full_sync`].

use std::collections::HashMap;

use crate::error::ApiResult;
use crate::models::{FullSync, FullSyncSummary, SongFullSync};
use crate::repositories::LibraryRepository;
use crate::services::storage::PayloadStore;

/// A song to insert, with indices into the plan's artists and albums
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedSong<'a> {
    pub song: &'a SongFullSync,
    pub artist: usize,
    pub album: Option<usize>,
}

/// A playlist to insert, with indices into the plan's songs
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedPlaylist<'a> {
    pub title: &'a str,
    pub songs: Vec<usize>,
}

/// Deduplicated rows of a full sync, in first-seen order
///
/// - songs are merged by `weburl`; songs without one are always distinct
/// - artists are merged by name and albums by title
/// - playlists with the same title are merged, and a song appears at most
///   once per playlist
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncPlan<'a> {
    pub artists: Vec<&'a str>,
    pub albums: Vec<&'a str>,
    pub songs: Vec<PlannedSong<'a>>,
    pub playlists: Vec<PlannedPlaylist<'a>>,
}

impl<'a> SyncPlan<'a> {
    pub fn new(sync: &'a FullSync) -> Self {
        let mut plan = Self::default();
        let mut artists: HashMap<&str, usize> = HashMap::new();
        let mut albums: HashMap<&str, usize> = HashMap::new();
        let mut songs: HashMap<&str, usize> = HashMap::new();
        let mut playlists: HashMap<&str, usize> = HashMap::new();

        for playlist in &sync.playlists {
            let playlist_index = *playlists.entry(playlist.title.as_str()).or_insert_with(|| {
                plan.playlists.push(PlannedPlaylist {
                    title: &playlist.title,
                    songs: Vec::new(),
                });
                plan.playlists.len() - 1
            });

            for song in &playlist.songs {
                let existing = song.weburl.as_deref().and_then(|url| songs.get(url).copied());
                let song_index = match existing {
                    Some(index) => index,
                    None => {
                        let artist = *artists.entry(song.artist.as_str()).or_insert_with(|| {
                            plan.artists.push(&song.artist);
                            plan.artists.len() - 1
                        });
                        let album = song.album.as_deref().filter(|a| !a.is_empty()).map(|title| {
                            *albums.entry(title).or_insert_with(|| {
                                plan.albums.push(title);
                                plan.albums.len() - 1
                            })
                        });

                        plan.songs.push(PlannedSong {
                            song,
                            artist,
                            album,
                        });
                        let index = plan.songs.len() - 1;
                        if let Some(url) = song.weburl.as_deref() {
                            songs.insert(url, index);
                        }
                        index
                    }
                };

                let members = &mut plan.playlists[playlist_index].songs;
                if !members.contains(&song_index) {
                    members.push(song_index);
                }
            }
        }

        plan
    }

    pub fn summary(&self) -> FullSyncSummary {
        FullSyncSummary {
            artists: self.artists.len(),
            albums: self.albums.len(),
            songs: self.songs.len(),
            playlists: self.playlists.len(),
            playlist_songs: self.playlists.iter().map(|p| p.songs.len()).sum(),
        }
    }
}

/// Library-wide operations that touch both the database and stored payloads
#[derive(Clone)]
pub struct LibraryService {
    repo: LibraryRepository,
    storage: PayloadStore,
}

impl LibraryService {
    pub fn new(repo: LibraryRepository, storage: PayloadStore) -> Self {
        Self { repo, storage }
    }

    /// Replace the whole library with `sync`
    ///
    /// Payload files of the replaced songs are deleted after the
    /// transaction commits.
    pub async fn full_sync(&self, sync: &FullSync) -> ApiResult<FullSyncSummary> {
        let plan = SyncPlan::new(sync);
        let (summary, orphaned) = self.repo.full_sync(&plan).await?;

        for (data_uuid, ext) in &orphaned {
            if let Err(e) = self.storage.remove(data_uuid, ext).await {
                tracing::warn!(error = %e, data_uuid = %data_uuid, "Failed to remove orphaned payload");
            }
        }

        tracing::info!(
            artists = summary.artists,
            albums = summary.albums,
            songs = summary.songs,
            playlists = summary.playlists,
            removed_payloads = orphaned.len(),
            "Full sync committed"
        );
        Ok(summary)
    }
}
