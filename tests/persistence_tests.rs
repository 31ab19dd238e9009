use std::fs;
use std::time::Instant;

use chrono::{TimeZone, Utc};
use pagemark::persistence::{
    JsonFileStore, ProgressStore, STORE_FILENAME, load_prefs, load_progress, save_prefs,
    save_progress,
};
use pagemark::test_utils::test_helpers::{FakeViewport, RecordingObserver, sample_text};
use pagemark::{
    DocumentFormat, DocumentId, Locator, ReaderSession, ReadingProgress, SessionParts, Settings,
    TypographyPrefs, build_document,
};
use serde_json::json;
use tempfile::TempDir;

#[test]
fn progress_survives_a_restart_on_disk() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(STORE_FILENAME);
    let progress = ReadingProgress {
        percentage: 37.5,
        format_locator: Locator::Page {
            page_index: 12,
            y_offset: Some(480.0),
        },
        timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
    };

    let mut store = JsonFileStore::with_file(&path);
    assert!(save_progress(&mut store, "reader_abc_book_pdf", &progress));

    let reloaded = JsonFileStore::load_from_file(&path).unwrap();
    assert_eq!(load_progress(&reloaded, "reader_abc_book_pdf"), Some(progress));
    assert_eq!(load_progress(&reloaded, "reader_other"), None);
}

#[test]
fn corrupt_entries_read_as_absent() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(STORE_FILENAME);
    fs::write(
        &path,
        json!({
            "entries": {
                "reader_x": {"percentage": "lots", "format_locator": 3},
                "reader_prefs_v1": {"line_height": "2.0", "page_width": 99999}
            }
        })
        .to_string(),
    )
    .unwrap();

    let store = JsonFileStore::load_from_file(&path).unwrap();
    assert_eq!(load_progress(&store, "reader_x"), None);

    // Prefs are tolerant: numeric strings parse and values are clamped
    let prefs = load_prefs(&store, "reader_x", false);
    assert_eq!(prefs.line_height, 2.0);
    assert_eq!(prefs.page_width, 1400.0);
    assert_eq!(prefs.font_size, TypographyPrefs::default().font_size);
}

#[test]
fn unreadable_store_file_starts_empty() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(STORE_FILENAME);
    fs::write(&path, "{ not json").unwrap();
    let store = JsonFileStore::load_or_ephemeral(Some(&path));
    assert_eq!(store.keys().count(), 0);
}

#[test]
fn saved_percentage_is_clamped() {
    let mut store = JsonFileStore::ephemeral();
    let progress = ReadingProgress {
        percentage: 140.0,
        format_locator: Locator::lines(0, 10),
        timestamp: Utc::now(),
    };
    assert!(save_progress(&mut store, "k", &progress));
    assert_eq!(load_progress(&store, "k").unwrap().percentage, 100.0);
}

#[test]
fn prefs_are_global_unless_isolated() {
    let mut store = JsonFileStore::ephemeral();
    let narrow = TypographyPrefs {
        page_width: 600.0,
        ..TypographyPrefs::default()
    };
    assert!(save_prefs(&mut store, "reader_a", false, &narrow));
    assert_eq!(load_prefs(&store, "reader_b", false).page_width, 600.0);
    assert_eq!(
        load_prefs(&store, "reader_b", true),
        TypographyPrefs::default()
    );

    let wide = TypographyPrefs {
        page_width: 1000.0,
        ..TypographyPrefs::default()
    };
    assert!(save_prefs(&mut store, "reader_b", true, &wide));
    assert_eq!(load_prefs(&store, "reader_b", true).page_width, 1000.0);
    assert_eq!(load_prefs(&store, "reader_a", false).page_width, 600.0);
}

#[test]
fn session_writes_through_a_file_store() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(STORE_FILENAME);
    let settings = Settings::default();
    let id = DocumentId::new(dir.path().join("novel.txt"));
    let key = id.storage_key();

    let viewport = FakeViewport::new(800_000.0);
    {
        let loaded = build_document(
            DocumentFormat::Text,
            sample_text().into_bytes(),
            "novel.txt",
            &settings,
        )
        .unwrap();
        let mut session = ReaderSession::open(
            id.clone(),
            loaded,
            settings.clone(),
            SessionParts {
                adapter: None,
                viewport: Box::new(viewport.clone()),
                store: Box::new(JsonFileStore::with_file(&path)),
                observers: vec![Box::new(RecordingObserver::new())],
            },
            Instant::now(),
        );
        assert!(session.next(Instant::now()));
        assert!(session.save_now());
    }

    let store = JsonFileStore::load_from_file(&path).unwrap();
    let saved = load_progress(&store, &key).unwrap();
    assert_eq!(saved.format_locator, Locator::lines(3, 7));
    assert!(store.load("last_read_book").is_some());
}
