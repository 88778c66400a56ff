use std::collections::BTreeSet;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use bucketfs::{
    option_names, FilesystemAdapter, MemoryConfig, MemoryObjectClient, ObjectStorageAdapter,
    Operation,
};
use bucketfs_core::{AdapterConfig, CallConfig, Error, StorageAttributes, Visibility};
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt};
use tokio_stream::wrappers::ReceiverStream;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn adapter_with(client: MemoryObjectClient, prefix: &str) -> Result<ObjectStorageAdapter<MemoryObjectClient>> {
    // an empty bucket name is taken from the client
    let config = AdapterConfig::default().with_prefix(prefix);
    Ok(ObjectStorageAdapter::new(client, config)?)
}

#[tokio::test]
async fn test_file_lifecycle() -> Result<()> {
    init_tracing();
    let fs = adapter_with(MemoryObjectClient::new("site-assets"), "public")?;

    let public = CallConfig::new().with_visibility(Visibility::Public);
    fs.write("css/app.css", Bytes::from("body {}"), &public).await?;
    fs.write("notes/todo.txt", Bytes::from("ship it"), &CallConfig::new()).await?;

    assert!(fs.file_exists("css/app.css").await?);
    assert!(fs.directory_exists("css").await?);
    assert_eq!(fs.read("notes/todo.txt").await?, Bytes::from("ship it"));
    assert_eq!(
        fs.mime_type("notes/todo.txt").await?.mime_type.as_deref(),
        Some("text/plain")
    );
    assert_eq!(fs.visibility("css/app.css").await?.visibility, Some(Visibility::Public));
    assert_eq!(fs.visibility("notes/todo.txt").await?.visibility, Some(Visibility::Private));

    fs.copy_file("css/app.css", "css/app.v2.css", &CallConfig::new()).await?;
    assert_eq!(fs.visibility("css/app.v2.css").await?.visibility, Some(Visibility::Public));

    fs.move_file("notes/todo.txt", "archive/todo.txt", &CallConfig::new()).await?;
    assert!(!fs.file_exists("notes/todo.txt").await?);
    assert_eq!(fs.read("archive/todo.txt").await?, Bytes::from("ship it"));

    fs.delete("css/app.css").await?;
    assert!(!fs.file_exists("css/app.css").await?);

    let remaining: Vec<StorageAttributes> = fs.list_contents("", true).try_collect().await?;
    let paths: BTreeSet<_> = remaining.iter().map(|a| a.path().to_string()).collect();
    assert_eq!(
        paths,
        BTreeSet::from(["archive/todo.txt".to_string(), "css/app.v2.css".to_string()])
    );

    let raw_keys = fs.client().keys();
    assert!(raw_keys.iter().all(|key| key.starts_with("public/")));
    Ok(())
}

#[tokio::test]
async fn test_listing_is_complete_for_any_page_size() -> Result<()> {
    init_tracing();
    let expected: BTreeSet<String> = (0..57).map(|i| format!("data/part-{i:03}.csv")).collect();

    for page_size in [1, 7, 50, 1000] {
        let client = MemoryObjectClient::with_config(MemoryConfig {
            bucket: "lake".to_string(),
            page_size,
        });
        let fs = adapter_with(client, "")?;
        for path in &expected {
            fs.write(path, Bytes::from("a,b\n"), &CallConfig::new()).await?;
        }

        let listed: Vec<_> = fs.list_contents("data", false).try_collect().await?;
        let paths: BTreeSet<String> = listed.iter().map(|a| a.path().to_string()).collect();
        assert_eq!(paths, expected, "page size {page_size}");
        assert_eq!(listed.len(), expected.len(), "duplicates at page size {page_size}");

        // a second enumeration starts over from the beginning
        let first_two: Vec<_> = fs.list_contents("data", false).take(2).try_collect().await?;
        assert_eq!(first_two.len(), 2);
        let again: Vec<_> = fs.list_contents("data", false).try_collect().await?;
        assert_eq!(again.len(), expected.len());
    }
    Ok(())
}

#[tokio::test]
async fn test_deep_listing_is_complete_for_any_page_size() -> Result<()> {
    init_tracing();
    let files = [
        "top.txt",
        "a/one.txt",
        "a/b/two.txt",
        "a/b/c/three.txt",
        "a/b/c/d/four.txt",
        "z/last.txt",
    ];

    for page_size in [1, 7, 1000] {
        let client = MemoryObjectClient::new("tree").with_page_size(page_size);
        let fs = adapter_with(client, "nested")?;
        fs.create_directory("a/b", &CallConfig::new()).await?;
        for path in files {
            fs.write(path, Bytes::from(path), &CallConfig::new()).await?;
        }

        let listed: Vec<_> = fs.list_contents("", true).try_collect().await?;
        let found: BTreeSet<(String, bool)> =
            listed.iter().map(|a| (a.path().to_string(), a.is_dir())).collect();

        let mut expected: BTreeSet<(String, bool)> =
            files.iter().map(|p| (p.to_string(), false)).collect();
        expected.insert(("a/b".to_string(), true));
        assert_eq!(found, expected, "page size {page_size}");
        assert_eq!(listed.len(), expected.len(), "duplicates at page size {page_size}");
    }
    Ok(())
}

#[tokio::test]
async fn test_directory_tree_removal() -> Result<()> {
    init_tracing();
    let fs = adapter_with(MemoryObjectClient::new("photos").with_page_size(100), "users/42")?;

    fs.create_directory("albums/2024", &CallConfig::new()).await?;
    for i in 0..1500 {
        fs.write(&format!("albums/2024/img-{i:04}.jpg"), Bytes::from("jpeg"), &CallConfig::new())
            .await?;
    }
    fs.write("albums/cover.jpg", Bytes::from("jpeg"), &CallConfig::new()).await?;

    let children: Vec<_> = fs.list_contents("albums", false).try_collect().await?;
    assert_eq!(children.len(), 2);
    assert!(children.iter().any(|a| a.is_dir() && a.path() == "albums/2024"));

    fs.delete_directory("albums/2024").await?;
    assert!(!fs.directory_exists("albums/2024").await?);
    assert_eq!(fs.client().keys(), vec!["users/42/albums/cover.jpg"]);
    Ok(())
}

#[tokio::test]
async fn test_failed_move_keeps_destination() -> Result<()> {
    init_tracing();
    let fs = adapter_with(MemoryObjectClient::new("reports"), "")?;
    fs.write("q1.pdf", Bytes::from("%PDF-1.7"), &CallConfig::new()).await?;
    fs.client().fail_on(Operation::Delete);

    let err = fs.move_file("q1.pdf", "2024/q1.pdf", &CallConfig::new()).await.unwrap_err();
    assert!(matches!(err, Error::MoveFailed { .. }));
    assert!(err.to_string().contains("q1.pdf"));
    assert!(fs.file_exists("q1.pdf").await?);
    assert!(fs.file_exists("2024/q1.pdf").await?);

    fs.client().clear_failures();
    fs.delete("q1.pdf").await?;
    assert!(!fs.file_exists("q1.pdf").await?);
    Ok(())
}

#[tokio::test]
async fn test_shared_adapter_across_tasks() -> Result<()> {
    init_tracing();
    let fs = Arc::new(adapter_with(MemoryObjectClient::new("uploads"), "")?);

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let fs = fs.clone();
            tokio::spawn(async move {
                let path = format!("batch/{i}.json");
                let body = serde_json::to_vec(&serde_json::json!({ "id": i }))?;
                fs.write(&path, Bytes::from(body), &CallConfig::new()).await?;
                fs.read(&path).await.map_err(anyhow::Error::from)
            })
        })
        .collect();

    for handle in handles {
        let body = handle.await??;
        assert!(body.starts_with(b"{\"id\":"));
    }

    let listed: Vec<_> = fs.list_contents("batch", true).try_collect().await?;
    assert_eq!(listed.len(), 16);
    Ok(())
}

#[tokio::test]
async fn test_streaming_write_from_channel() -> Result<()> {
    init_tracing();
    let fs = adapter_with(MemoryObjectClient::new("logs"), "")?;

    let (tx, rx) = tokio::sync::mpsc::channel::<std::io::Result<Bytes>>(4);
    let producer = tokio::spawn(async move {
        for line in 0..100 {
            if tx.send(Ok(Bytes::from(format!("line {line}\n")))).await.is_err() {
                break;
            }
        }
    });

    let config = CallConfig::new().with(option_names::CONTENT_TYPE, "text/plain");
    fs.write_stream("app.log", ReceiverStream::new(rx).boxed(), &config).await?;
    producer.await?;

    let contents = fs.read("app.log").await?;
    assert_eq!(contents.iter().filter(|b| **b == b'\n').count(), 100);
    assert_eq!(fs.file_size("app.log").await?.file_size, Some(contents.len() as u64));

    let chunks: Vec<Bytes> = fs.read_stream("app.log").await?.try_collect().await?;
    assert_eq!(chunks.concat(), contents.to_vec());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_stalled_upload_can_be_cancelled() -> Result<()> {
    init_tracing();
    let fs = adapter_with(MemoryObjectClient::new("slow"), "")?;

    let stalled = futures::stream::pending::<std::io::Result<Bytes>>().boxed();
    let result = tokio::time::timeout(
        Duration::from_secs(5),
        fs.write_stream("never.bin", stalled, &CallConfig::new()),
    )
    .await;

    assert!(result.is_err());
    assert!(!fs.file_exists("never.bin").await?);
    Ok(())
}

#[tokio::test]
async fn test_adapter_from_config_file() -> Result<()> {
    init_tracing();
    let mut file = tempfile::NamedTempFile::new()?;
    write!(
        file,
        r#"{{
            "bucket": "configured",
            "prefix": "env/prod",
            "directory_visibility": "private",
            "default_options": {{ "CacheControl": "max-age=60" }},
            "list_page_size": 2
        }}"#
    )?;

    let config = AdapterConfig::from_file(file.path())?;
    let fs = ObjectStorageAdapter::new(MemoryObjectClient::new("configured"), config)?;

    fs.create_directory("cache", &CallConfig::new()).await?;
    assert_eq!(fs.client().acl("env/prod/cache/").as_deref(), Some("private"));

    for name in ["a", "b", "c", "d", "e"] {
        fs.write(&format!("cache/{name}"), Bytes::from(name), &CallConfig::new()).await?;
    }
    let listed: Vec<_> = fs.list_contents("cache", false).try_collect().await?;
    assert_eq!(listed.len(), 5);
    Ok(())
}

#[tokio::test]
async fn test_mismatched_bucket_is_rejected() {
    let result = ObjectStorageAdapter::new(
        MemoryObjectClient::new("actual"),
        AdapterConfig::new("expected"),
    );
    assert!(matches!(result, Err(Error::InvalidConfig { .. })));
}
