//! Metadata snapshots submitted by plugins.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Kind of a tag value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagType {
    Artist,
    AlbumArtist,
    Album,
    Title,
    Track,
    Disc,
    Genre,
    Date,
    Composer,
    Performer,
    /// Stream or station name.
    Name,
    Comment,
    MusicBrainzArtistId,
    MusicBrainzAlbumId,
    MusicBrainzTrackId,
}

/// One tag snapshot.
///
/// Items keep their submission order; a kind may appear more than once
/// (e.g. several artists).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    items: Vec<(TagType, String)>,
    /// Song duration, if the container states it.
    pub duration: Option<Duration>,
    /// Byte offset past already-scanned metadata, usable for fast re-seeks.
    pub quick_offset: Option<u64>,
}

impl Tag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`Tag::add`].
    pub fn with_item(mut self, kind: TagType, value: impl Into<String>) -> Self {
        self.add(kind, value);
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn with_quick_offset(mut self, offset: u64) -> Self {
        self.quick_offset = Some(offset);
        self
    }

    /// Appends a value. Blank values are ignored.
    pub fn add(&mut self, kind: TagType, value: impl Into<String>) {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return;
        }
        self.items.push((kind, trimmed.to_string()));
    }

    /// First value of `kind`.
    pub fn get(&self, kind: TagType) -> Option<&str> {
        self.items
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, v)| v.as_str())
    }

    /// All values of `kind` in submission order.
    pub fn get_all(&self, kind: TagType) -> impl Iterator<Item = &str> {
        self.items
            .iter()
            .filter(move |(k, _)| *k == kind)
            .map(|(_, v)| v.as_str())
    }

    pub fn items(&self) -> &[(TagType, String)] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty() && self.duration.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_and_lookup() {
        let tag = Tag::new()
            .with_item(TagType::Title, "Song")
            .with_item(TagType::Artist, "A")
            .with_item(TagType::Artist, "B")
            .with_duration(Duration::from_secs(180))
            .with_quick_offset(4096);

        assert_eq!(tag.get(TagType::Title), Some("Song"));
        assert_eq!(tag.get_all(TagType::Artist).collect::<Vec<_>>(), vec!["A", "B"]);
        assert_eq!(tag.get(TagType::Album), None);
        assert_eq!(tag.quick_offset, Some(4096));
        assert!(!tag.is_empty());
    }

    #[test]
    fn blank_values_are_dropped() {
        let mut tag = Tag::new();
        tag.add(TagType::Comment, "   ");
        tag.add(TagType::Genre, " Jazz ");
        assert_eq!(tag.items().len(), 1);
        assert_eq!(tag.get(TagType::Genre), Some("Jazz"));
        assert!(Tag::new().is_empty());
    }
}
