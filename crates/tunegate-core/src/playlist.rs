//! Playlist intake.
//!
//! Turns one playlist URL into a lazy, capped sequence of [`TrackDescriptor`]s.
//!
//! The extraction call is retried as a whole, never per entry. Once entries
//! are flowing, missing metadata is replaced with defaults. An entry that
//! cannot be read at all ends the sequence, keeping what was already yielded.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tunegate_core::{IntakeConfig, PlaylistExtractor, YtDlpExtractor};
//!
//! let config = IntakeConfig::default();
//! let engine = Arc::new(YtDlpExtractor::from_settings(&config.extractor));
//! let extractor = PlaylistExtractor::new(engine, &config);
//!
//! for track in extractor.extract("https://www.youtube.com/playlist?list=PLtest", 0, "alice") {
//!     println!("{} ({}s)", track.title, track.duration_secs);
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::config::IntakeConfig;
use crate::error::ExtractionError;
use crate::extractor::{ExtractOptions, ExtractedPlaylist, MediaExtractor};

/// Title used when an entry has none.
pub const UNKNOWN_TITLE: &str = "Unknown Title";

/// Title used when the playlist has none.
pub const UNKNOWN_PLAYLIST: &str = "Unknown Playlist";

/// Prefix turning a bare video identifier into a watch URL.
pub const WATCH_URL_PREFIX: &str = "https://www.youtube.com/watch?v=";

/// One normalized playlist entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackDescriptor {
    /// Absolute URL of the track, empty when upstream had none.
    pub source_url: String,
    /// Track title.
    pub title: String,
    /// URL of the playlist this track came from.
    pub playlist_url: String,
    /// Title of the playlist this track came from.
    pub playlist_title: String,
    /// Who asked for the playlist.
    pub submitted_by: String,
    /// Duration reported by the playlist, zero when unknown.
    pub duration_secs: u64,
}

impl TrackDescriptor {
    /// Whether upstream provided a usable URL for this entry.
    #[must_use]
    pub fn has_source_url(&self) -> bool {
        !self.source_url.is_empty()
    }
}

/// Rewrite a bare video identifier into a full watch URL.
///
/// Values that already start with `http` are returned unchanged.
#[must_use]
pub fn canonical_watch_url(raw: &str) -> String {
    if raw.starts_with("http") {
        raw.to_string()
    } else {
        format!("{WATCH_URL_PREFIX}{raw}")
    }
}

/// Playlist-level fields copied onto every descriptor.
#[derive(Debug, Clone)]
struct PlaylistContext {
    playlist_url: String,
    playlist_title: String,
    submitted_by: String,
}

/// Normalize one raw entry.
///
/// Missing fields fall back to defaults. Only an entry that is not an object,
/// or whose `url` is present but not a string, is an error.
fn normalize_entry(
    index: usize,
    entry: &Value,
    context: &PlaylistContext,
) -> Result<TrackDescriptor, ExtractionError> {
    let fields = entry
        .as_object()
        .ok_or_else(|| ExtractionError::MalformedEntry {
            index,
            reason: format!("expected an object, got {entry}"),
        })?;

    let title = fields
        .get("title")
        .and_then(Value::as_str)
        .unwrap_or(UNKNOWN_TITLE)
        .to_string();

    let source_url = match fields.get("url") {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(raw)) if raw.is_empty() => String::new(),
        Some(Value::String(raw)) => canonical_watch_url(raw),
        Some(other) => {
            return Err(ExtractionError::MalformedEntry {
                index,
                reason: format!("url is not a string: {other}"),
            });
        }
    };
    if source_url.is_empty() {
        debug!("Playlist entry #{} '{}' has no url", index, title);
    }

    Ok(TrackDescriptor {
        source_url,
        title,
        playlist_url: context.playlist_url.clone(),
        playlist_title: context.playlist_title.clone(),
        submitted_by: context.submitted_by.clone(),
        duration_secs: fields.get("duration").map_or(0, duration_secs),
    })
}

/// Read a duration that may be an integer, a float, or garbage.
fn duration_secs(value: &Value) -> u64 {
    if let Some(secs) = value.as_u64() {
        return secs;
    }
    value
        .as_f64()
        .filter(|secs| secs.is_finite() && *secs > 0.0)
        .map_or(0, |secs| secs.round() as u64)
}

/// Turns playlist URLs into track descriptors.
pub struct PlaylistExtractor {
    engine: Arc<dyn MediaExtractor>,
    options: ExtractOptions,
    attempts: u32,
    retry_delay: Duration,
    max_tracks: usize,
}

impl PlaylistExtractor {
    /// Create an extractor over `engine` using the intake configuration.
    #[must_use]
    pub fn new(engine: Arc<dyn MediaExtractor>, config: &IntakeConfig) -> Self {
        Self {
            engine,
            options: ExtractOptions::from_settings(&config.extractor),
            attempts: config.extractor.download_attempts,
            retry_delay: Duration::from_millis(config.extractor.retry_delay_ms),
            max_tracks: config.admission.max_track_playlist,
        }
    }

    /// Maximum number of descriptors one call yields.
    #[must_use]
    pub const fn max_tracks(&self) -> usize {
        self.max_tracks
    }

    /// Lazily extract the tracks of `playlist_url`.
    ///
    /// Nothing happens until the returned iterator is first advanced. Entries
    /// before `start_index` are skipped and do not count toward the cap.
    #[must_use]
    pub fn extract(
        &self,
        playlist_url: &str,
        start_index: usize,
        submitted_by: &str,
    ) -> PlaylistTracks<'_> {
        PlaylistTracks {
            extractor: self,
            playlist_url: playlist_url.to_string(),
            submitted_by: submitted_by.to_string(),
            start_index,
            state: TracksState::Pending,
        }
    }

    /// Run the engine with bounded retries. Never fails; `None` means give up.
    fn fetch(&self, url: &str) -> Option<ExtractedPlaylist> {
        for attempt in 1..=self.attempts {
            match self.engine.extract_info(url, &self.options) {
                Ok(info) => {
                    debug!("Extracted {} on attempt {}/{}", url, attempt, self.attempts);
                    return Some(info);
                }
                Err(e) => {
                    warn!(
                        "Extraction attempt {}/{} failed for {}: {}",
                        attempt, self.attempts, url, e
                    );
                    if attempt < self.attempts && !self.retry_delay.is_zero() {
                        std::thread::sleep(self.retry_delay);
                    }
                }
            }
        }

        error!(
            "Giving up on {} after {} attempt(s), no tracks added",
            url, self.attempts
        );
        None
    }
}

impl std::fmt::Debug for PlaylistExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaylistExtractor")
            .field("options", &self.options)
            .field("attempts", &self.attempts)
            .field("retry_delay", &self.retry_delay)
            .field("max_tracks", &self.max_tracks)
            .finish_non_exhaustive()
    }
}

enum TracksState {
    Pending,
    Streaming {
        context: PlaylistContext,
        entries: std::vec::IntoIter<Value>,
        position: usize,
        emitted: usize,
    },
    Done,
}

/// Lazy sequence of descriptors returned by [`PlaylistExtractor::extract`].
pub struct PlaylistTracks<'a> {
    extractor: &'a PlaylistExtractor,
    playlist_url: String,
    submitted_by: String,
    start_index: usize,
    state: TracksState,
}

impl PlaylistTracks<'_> {
    fn start(&mut self) -> TracksState {
        let Some(info) = self.extractor.fetch(&self.playlist_url) else {
            return TracksState::Done;
        };

        let Some(entries) = info.entries else {
            info!("{} is not a playlist, nothing to add", self.playlist_url);
            return TracksState::Done;
        };

        let playlist_title = info
            .title
            .unwrap_or_else(|| UNKNOWN_PLAYLIST.to_string());
        info!(
            "Playlist '{}' has {} entries, starting at {}",
            playlist_title,
            entries.len(),
            self.start_index
        );

        TracksState::Streaming {
            context: PlaylistContext {
                playlist_url: self.playlist_url.clone(),
                playlist_title,
                submitted_by: self.submitted_by.clone(),
            },
            entries: entries.into_iter(),
            position: 0,
            emitted: 0,
        }
    }
}

impl Iterator for PlaylistTracks<'_> {
    type Item = TrackDescriptor;

    fn next(&mut self) -> Option<Self::Item> {
        if matches!(self.state, TracksState::Pending) {
            self.state = self.start();
        }

        let max_tracks = self.extractor.max_tracks;
        let start_index = self.start_index;

        let TracksState::Streaming {
            context,
            entries,
            position,
            emitted,
        } = &mut self.state
        else {
            return None;
        };

        loop {
            if *emitted >= max_tracks {
                debug!("Reached the {} track cap", max_tracks);
                break;
            }

            let Some(entry) = entries.next() else {
                break;
            };
            let index = *position;
            *position += 1;

            if index < start_index {
                continue;
            }

            match normalize_entry(index, &entry, context) {
                Ok(track) => {
                    *emitted += 1;
                    return Some(track);
                }
                Err(e) => {
                    error!(
                        "Stopping playlist {} after {} track(s): {}",
                        context.playlist_url, emitted, e
                    );
                    break;
                }
            }
        }

        self.state = TracksState::Done;
        None
    }
}

impl std::iter::FusedIterator for PlaylistTracks<'_> {}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::extractor::MockMediaExtractor;
    use serde_json::json;

    fn config(max_tracks: usize, attempts: u32) -> IntakeConfig {
        let mut config = IntakeConfig::default();
        config.admission.max_track_playlist = max_tracks;
        config.extractor.download_attempts = attempts;
        config
    }

    fn playlist(entries: usize) -> ExtractedPlaylist {
        ExtractedPlaylist {
            title: Some("Road Trip".to_string()),
            entries: Some(
                (0..entries)
                    .map(|i| json!({"url": format!("vid{i}"), "title": format!("Song {i}"), "duration": 100 + i}))
                    .collect(),
            ),
        }
    }

    fn failure() -> Error {
        ExtractionError::ToolFailed {
            url: "u".to_string(),
            status: Some(1),
            stderr: "HTTP Error 429".to_string(),
        }
        .into()
    }

    fn extractor_with(info: ExtractedPlaylist, max_tracks: usize) -> PlaylistExtractor {
        let mut mock = MockMediaExtractor::new();
        mock.expect_extract_info()
            .returning(move |_, _| Ok(info.clone()));
        PlaylistExtractor::new(Arc::new(mock), &config(max_tracks, 3))
    }

    #[test]
    fn test_canonical_watch_url() {
        assert_eq!(
            canonical_watch_url("abc123"),
            "https://www.youtube.com/watch?v=abc123"
        );
        assert_eq!(
            canonical_watch_url("https://soundcloud.com/a/b"),
            "https://soundcloud.com/a/b"
        );
        assert_eq!(canonical_watch_url("http://x.y/z"), "http://x.y/z");
    }

    #[test]
    fn test_yields_count_offset_and_cap() {
        // (entries, start, cap, expected)
        let cases = [
            (10, 0, 20, 10),
            (10, 0, 4, 4),
            (10, 3, 20, 7),
            (10, 3, 5, 5),
            (10, 8, 5, 2),
            (10, 10, 5, 0),
            (10, 15, 5, 0),
            (0, 0, 5, 0),
            (10, 0, 0, 0),
        ];

        for (entries, start, cap, expected) in cases {
            let extractor = extractor_with(playlist(entries), cap);
            let tracks: Vec<_> = extractor.extract("https://pl", start, "bob").collect();

            assert_eq!(
                tracks.len(),
                expected,
                "entries={entries} start={start} cap={cap}"
            );
            for (offset, track) in tracks.iter().enumerate() {
                assert_eq!(track.title, format!("Song {}", start + offset));
            }
        }
    }

    #[test]
    fn test_descriptor_fields() {
        let extractor = extractor_with(playlist(1), 20);
        let track = extractor.extract("https://pl", 0, "bob").next().unwrap();

        assert_eq!(
            track,
            TrackDescriptor {
                source_url: "https://www.youtube.com/watch?v=vid0".to_string(),
                title: "Song 0".to_string(),
                playlist_url: "https://pl".to_string(),
                playlist_title: "Road Trip".to_string(),
                submitted_by: "bob".to_string(),
                duration_secs: 100,
            }
        );
        assert!(track.has_source_url());
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let info = ExtractedPlaylist {
            title: None,
            entries: Some(vec![
                json!({}),
                json!({"url": null, "title": null, "duration": null}),
                json!({"url": "", "duration": -5}),
                json!({"url": "https://a/b", "duration": 212.6}),
            ]),
        };
        let extractor = extractor_with(info, 20);
        let tracks: Vec<_> = extractor.extract("https://pl", 0, "").collect();

        assert_eq!(tracks.len(), 4);
        assert_eq!(tracks[0].title, UNKNOWN_TITLE);
        assert_eq!(tracks[0].source_url, "");
        assert!(!tracks[0].has_source_url());
        assert_eq!(tracks[0].duration_secs, 0);
        assert_eq!(tracks[0].playlist_title, UNKNOWN_PLAYLIST);
        assert_eq!(tracks[1].title, UNKNOWN_TITLE);
        assert_eq!(tracks[1].duration_secs, 0);
        assert_eq!(tracks[2].source_url, "");
        assert_eq!(tracks[2].duration_secs, 0);
        assert_eq!(tracks[3].source_url, "https://a/b");
        assert_eq!(tracks[3].duration_secs, 213);
    }

    #[test]
    fn test_all_attempts_fail_yields_nothing() {
        let mut mock = MockMediaExtractor::new();
        mock.expect_extract_info()
            .times(3)
            .returning(|_, _| Err(failure()));
        let extractor = PlaylistExtractor::new(Arc::new(mock), &config(20, 3));

        assert_eq!(extractor.extract("https://pl", 0, "").count(), 0);
    }

    #[test]
    fn test_retry_stops_on_first_success() {
        let mut mock = MockMediaExtractor::new();
        let mut seq = mockall::Sequence::new();
        mock.expect_extract_info()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Err(failure()));
        mock.expect_extract_info()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(playlist(2)));
        let extractor = PlaylistExtractor::new(Arc::new(mock), &config(20, 5));

        assert_eq!(extractor.extract("https://pl", 0, "").count(), 2);
    }

    #[test]
    fn test_not_a_playlist_yields_nothing() {
        let info = ExtractedPlaylist {
            title: Some("Single video".to_string()),
            entries: None,
        };
        let extractor = extractor_with(info, 20);
        assert_eq!(extractor.extract("https://video", 0, "").count(), 0);
    }

    #[test]
    fn test_extraction_is_lazy() {
        let mut mock = MockMediaExtractor::new();
        mock.expect_extract_info().times(0);
        let extractor = PlaylistExtractor::new(Arc::new(mock), &config(20, 3));

        let tracks = extractor.extract("https://pl", 0, "");
        drop(tracks);
    }

    #[test]
    fn test_each_call_extracts_again() {
        let mut mock = MockMediaExtractor::new();
        mock.expect_extract_info()
            .times(2)
            .returning(|_, _| Ok(playlist(3)));
        let extractor = PlaylistExtractor::new(Arc::new(mock), &config(20, 3));

        assert_eq!(extractor.extract("https://pl", 0, "").count(), 3);
        assert_eq!(extractor.extract("https://pl", 1, "").count(), 2);
    }

    #[test]
    fn test_malformed_entry_keeps_earlier_tracks() {
        let info = ExtractedPlaylist {
            title: Some("Broken".to_string()),
            entries: Some(vec![
                json!({"url": "a", "title": "First"}),
                json!({"url": "b", "title": "Second"}),
                json!("not an entry"),
                json!({"url": "c", "title": "Never seen"}),
            ]),
        };
        let extractor = extractor_with(info, 20);
        let mut tracks = extractor.extract("https://pl", 0, "");

        assert_eq!(tracks.next().unwrap().title, "First");
        assert_eq!(tracks.next().unwrap().title, "Second");
        assert!(tracks.next().is_none());
        assert!(tracks.next().is_none());
    }

    #[test]
    fn test_non_string_url_is_malformed() {
        let context = PlaylistContext {
            playlist_url: "p".to_string(),
            playlist_title: "t".to_string(),
            submitted_by: "u".to_string(),
        };
        let err = normalize_entry(4, &json!({"url": 42}), &context).unwrap_err();
        assert!(err.to_string().contains("#4"));
    }

    #[test]
    fn test_options_are_passed_to_engine() {
        let mut config = config(20, 1);
        config.extractor.debug = true;
        config.extractor.user_agent = Some("UA".to_string());

        let mut mock = MockMediaExtractor::new();
        mock.expect_extract_info()
            .withf(|url, options| {
                url == "https://pl"
                    && options.flat_playlist
                    && options.verbose
                    && options.user_agent.as_deref() == Some("UA")
            })
            .times(1)
            .returning(|_, _| Ok(playlist(1)));
        let extractor = PlaylistExtractor::new(Arc::new(mock), &config);

        assert_eq!(extractor.extract("https://pl", 0, "").count(), 1);
    }
}
