//! Asset fetcher integration tests

mod helpers;

use geoharvest_common::Photo;
use geoharvest_ingest::services::asset_fetcher::object_key;
use geoharvest_ingest::services::{AssetFetcher, AssetFetcherSettings};
use geoharvest_ingest::IngestError;
use helpers::{stored_photo, FakeSearch, FakeStore, INSIDE};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Photo as hydrated by the crawler, before any rendition is stored
fn hydrated(id: &str) -> Photo {
    let mut photo = stored_photo(id, 1, INSIDE);
    photo.medium = Default::default();
    photo.large = Default::default();
    photo
}

fn fetcher(search: FakeSearch, store: &Arc<FakeStore>) -> AssetFetcher {
    AssetFetcher::new(
        Arc::new(search),
        store.clone(),
        AssetFetcherSettings {
            concurrency: 3,
            ..AssetFetcherSettings::default()
        },
    )
}

#[tokio::test]
async fn test_renditions_uploaded_under_deterministic_keys() {
    let store = Arc::new(FakeStore::default());
    let photos = fetcher(FakeSearch::default(), &store)
        .fetch(vec![hydrated("11"), hydrated("12")], &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(photos.len(), 2);
    assert_eq!(photos[0].id, "11");
    assert_eq!(photos[1].id, "12");

    let stored = store.stored();
    let keys: Vec<_> = stored.iter().map(|o| o.key.as_str()).collect();
    assert_eq!(
        keys,
        vec![
            "flickr/11/large.jpg",
            "flickr/11/medium.jpg",
            "flickr/12/large.jpg",
            "flickr/12/medium.jpg",
        ]
    );
    assert!(stored.iter().all(|o| o.content_type == "image/jpeg"));

    // Bytes are the ones downloaded from the chosen rendition
    let medium = stored.iter().find(|o| o.key == "flickr/11/medium.jpg").unwrap();
    assert_eq!(medium.body, b"jpeg:https://live.test/11_Medium.jpg".to_vec());
    let large = stored.iter().find(|o| o.key == "flickr/11/large.jpg").unwrap();
    assert_eq!(large.body, b"jpeg:https://live.test/11_Large.jpg".to_vec());

    assert_eq!(photos[0].medium.source, "https://cdn.test/flickr/11/medium.jpg");
    assert_eq!(photos[0].large.source, "https://cdn.test/flickr/11/large.jpg");
}

#[tokio::test]
async fn test_key_prefix_is_configurable() {
    assert_eq!(object_key("photos", "42", "medium"), "photos/42/medium.jpg");

    let store = Arc::new(FakeStore::default());
    let fetcher = AssetFetcher::new(
        Arc::new(FakeSearch::default()),
        store.clone(),
        AssetFetcherSettings {
            key_prefix: "mirror".to_string(),
            ..AssetFetcherSettings::default()
        },
    );

    let photos = fetcher
        .fetch(vec![hydrated("13")], &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(photos[0].medium.source, "https://cdn.test/mirror/13/medium.jpg");
}

#[tokio::test]
async fn test_more_than_quarter_failing_aborts() {
    let ids: Vec<String> = (0..8).map(|i| format!("2{}", i)).collect();
    let search = FakeSearch::default()
        .fail_download("https://live.test/20_Medium.jpg")
        .fail_download("https://live.test/25_Large.jpg");
    let store = Arc::new(FakeStore::default().fail_key("flickr/27/large.jpg"));

    let err = fetcher(search, &store)
        .fetch(
            ids.iter().map(|id| hydrated(id)).collect(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    // Three failures out of eight is over the quarter
    assert!(matches!(
        err,
        IngestError::BatchAborted {
            failed: 3,
            total: 8,
            ..
        }
    ));
}

#[tokio::test]
async fn test_quarter_of_failures_is_tolerated() {
    let ids: Vec<String> = (0..8).map(|i| format!("3{}", i)).collect();
    let search = FakeSearch::default().fail_download("https://live.test/31_Medium.jpg");
    let store = Arc::new(FakeStore::default().fail_key("flickr/36/medium.jpg"));

    let photos = fetcher(search, &store)
        .fetch(
            ids.iter().map(|id| hydrated(id)).collect(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let kept: Vec<_> = photos.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(kept, vec!["30", "32", "33", "34", "35", "37"]);
}

#[tokio::test]
async fn test_photo_without_medium_size_is_skipped_not_failed() {
    let mut bare = hydrated("40");
    bare.sizes.retain(|s| s.label != "Medium");

    let store = Arc::new(FakeStore::default());
    let photos = fetcher(FakeSearch::default(), &store)
        .fetch(vec![bare, hydrated("41")], &CancellationToken::new())
        .await
        .unwrap();

    let kept: Vec<_> = photos.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(kept, vec!["41"]);
    let stored = store.stored();
    let keys: Vec<_> = stored.iter().map(|o| o.key.as_str()).collect();
    assert_eq!(keys, vec!["flickr/41/large.jpg", "flickr/41/medium.jpg"]);
}

#[tokio::test]
async fn test_batch_of_only_ineligible_photos_succeeds() {
    let mut bare = hydrated("42");
    bare.sizes.retain(|s| s.label != "Medium");

    let store = Arc::new(FakeStore::default());
    let photos = fetcher(FakeSearch::default(), &store)
        .fetch(vec![bare], &CancellationToken::new())
        .await
        .unwrap();

    assert!(photos.is_empty());
    assert!(store.stored().is_empty());
}

#[tokio::test]
async fn test_empty_batch() {
    let store = Arc::new(FakeStore::default());
    let photos = fetcher(FakeSearch::default(), &store)
        .fetch(Vec::new(), &CancellationToken::new())
        .await
        .unwrap();
    assert!(photos.is_empty());
}
