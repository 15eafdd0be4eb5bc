use std::sync::Arc;
use tidal::registry::{CacheSource, HttpRemoteStore, ListEndpoint, LocalCache, SqliteCache, CACHE_PREFIX};
use tidal::{Config, FileRecord, FileRegistry, SearchOutcome, UploadFile};

fn offline_config(dir: &std::path::Path) -> Config {
    Config {
        offline: true,
        cache_path: dir.join("cache.db").display().to_string(),
        ..Config::default()
    }
}

#[tokio::test]
async fn offline_registry_persists_between_sessions() {
    let dir = tempfile::tempdir().unwrap();
    let config = offline_config(dir.path());

    {
        let registry = FileRegistry::from_config(&config).unwrap();
        let report = registry
            .upload_files(&[
                UploadFile::new("groceries.txt", b"eggs, flour, sugar".to_vec()),
                UploadFile::new("pixel.gif", b"GIF89a".to_vec()),
            ])
            .await;
        assert_eq!(report.succeeded, 2);
    }

    let registry = FileRegistry::from_config(&config).unwrap();
    assert!(registry.is_offline());
    let files = registry.list_files().await;
    assert_eq!(files.len(), 2);
    assert!(files.windows(2).all(|w| w[0].created >= w[1].created));

    let gif = files.iter().find(|f| f.name == "pixel.gif").unwrap();
    assert_eq!(gif.content.as_deref(), Some("data:image/gif;base64,R0lGODlh"));

    match registry.search("flour").await {
        SearchOutcome::Matches(found) => assert_eq!(found[0].name, "groceries.txt"),
        other => panic!("expected a match, got {other:?}"),
    }
    assert_eq!(registry.search("").await, SearchOutcome::Prompt);
    assert_eq!(registry.search("zzz-no-match").await, SearchOutcome::NoMatches);
}

#[tokio::test]
async fn cached_records_round_trip_through_fallback_listing() {
    let dir = tempfile::tempdir().unwrap();
    let cache = Arc::new(SqliteCache::open(&dir.path().join("cache.db")).unwrap());
    let records = vec![
        FileRecord::cached("one".into(), "one.txt".into(), "first".into(), 100),
        FileRecord::cached("three".into(), "three.txt".into(), "third".into(), 300),
        FileRecord::cached("two".into(), "two.txt".into(), "second".into(), 200),
    ];
    let source = CacheSource::new(cache.clone());
    for record in &records {
        source.insert(record).unwrap();
    }
    cache.set(&format!("{CACHE_PREFIX}garbage"), "not json").unwrap();

    // Nothing listens on port 9 on localhost, so listing falls back.
    let store = HttpRemoteStore::new("http://127.0.0.1:9", ListEndpoint::Files, None).unwrap();
    let registry = FileRegistry::remote(Arc::new(store), cache);

    let listed = registry.list_files().await;
    let names: Vec<&str> = listed.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["three.txt", "two.txt", "one.txt"]);
    for record in &records {
        let found = listed.iter().find(|r| r.id == record.id).unwrap();
        assert_eq!(found.name, record.name);
        assert_eq!(found.content, record.content);
        assert_eq!(found.created, record.created);
    }
}
