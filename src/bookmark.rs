use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{Locator, clamp_level};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bookmark {
    pub id: u64,
    pub title: String,
    pub level: u8,
    pub locator: Locator,
    pub chapter_label: String,
    pub percentage: f64,
    pub created_at: DateTime<Utc>,
}

/// Named bookmarks of one document, in insertion order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Bookmarks {
    entries: Vec<Bookmark>,
}

/// Fields supplied when creating a bookmark
#[derive(Clone, Debug)]
pub struct NewBookmark {
    pub title: String,
    pub level: usize,
    pub locator: Locator,
    pub chapter_label: String,
    pub percentage: f64,
    pub created_at: DateTime<Utc>,
}

impl Bookmarks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a bookmark and return its id. A blank title falls back to the
    /// chapter label.
    pub fn add(&mut self, new: NewBookmark) -> u64 {
        let id = self.entries.iter().map(|b| b.id).max().map_or(1, |max| max + 1);
        let title = match new.title.trim() {
            "" => new.chapter_label.clone(),
            title => title.to_string(),
        };
        self.entries.push(Bookmark {
            id,
            title,
            level: clamp_level(new.level),
            locator: new.locator,
            chapter_label: new.chapter_label,
            percentage: new.percentage.clamp(0.0, 100.0),
            created_at: new.created_at,
        });
        id
    }

    /// Newest first
    pub fn list(&self) -> Vec<&Bookmark> {
        let mut sorted: Vec<&Bookmark> = self.entries.iter().collect();
        sorted.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        sorted
    }

    pub fn get(&self, id: u64) -> Option<&Bookmark> {
        self.entries.iter().find(|b| b.id == id)
    }

    pub fn remove(&mut self, id: u64) -> Option<Bookmark> {
        let pos = self.entries.iter().position(|b| b.id == id)?;
        Some(self.entries.remove(pos))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn new_at(title: &str, minute: u32) -> NewBookmark {
        NewBookmark {
            title: title.to_string(),
            level: 1,
            locator: Locator::href("a.html"),
            chapter_label: "Chapter A".to_string(),
            percentage: 12.5,
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 10, minute, 0).unwrap(),
        }
    }

    #[test]
    fn list_is_newest_first() {
        let mut bookmarks = Bookmarks::new();
        bookmarks.add(new_at("old", 1));
        bookmarks.add(new_at("new", 5));
        bookmarks.add(new_at("mid", 3));
        let titles: Vec<_> = bookmarks.list().iter().map(|b| b.title.as_str()).collect();
        assert_eq!(titles, vec!["new", "mid", "old"]);
    }

    #[test]
    fn blank_title_uses_chapter_label_and_level_is_clamped() {
        let mut bookmarks = Bookmarks::new();
        let id = bookmarks.add(NewBookmark {
            level: 9,
            ..new_at("  ", 0)
        });
        let bookmark = bookmarks.get(id).unwrap();
        assert_eq!(bookmark.title, "Chapter A");
        assert_eq!(bookmark.level, 3);
    }

    #[test]
    fn ids_stay_unique_after_removal() {
        let mut bookmarks = Bookmarks::new();
        let a = bookmarks.add(new_at("a", 0));
        let b = bookmarks.add(new_at("b", 1));
        assert!(bookmarks.remove(a).is_some());
        let c = bookmarks.add(new_at("c", 2));
        assert_ne!(b, c);
        assert!(bookmarks.remove(a).is_none());
        bookmarks.clear();
        assert!(bookmarks.is_empty());
    }
}
