use std::time::Duration;
use url_cleaner::TempArtifacts;

#[tokio::test]
async fn test_scheduled_cleanup_deletes_file() {
    let dir = tempfile::tempdir().unwrap();
    let artifacts = TempArtifacts::new(dir.path());
    let artifact = artifacts.allocate("png");
    tokio::fs::write(&artifact.path, b"img").await.unwrap();

    let handle = artifacts.schedule_cleanup(artifact.path.clone(), Duration::from_millis(50));
    assert!(artifact.path.exists());

    handle.await.unwrap();
    assert!(!artifact.path.exists());
}

#[tokio::test]
async fn test_scheduled_cleanup_of_missing_file_is_noop() {
    let dir = tempfile::tempdir().unwrap();
    let artifacts = TempArtifacts::new(dir.path());
    let artifact = artifacts.allocate("gif");

    let handle = artifacts.schedule_cleanup(artifact.path, Duration::from_millis(10));
    assert!(handle.await.is_ok());
}

#[tokio::test]
async fn test_cleanup_does_not_block_caller() {
    let dir = tempfile::tempdir().unwrap();
    let artifacts = TempArtifacts::new(dir.path());
    let artifact = artifacts.allocate("png");
    tokio::fs::write(&artifact.path, b"img").await.unwrap();

    let started = std::time::Instant::now();
    let _detached = artifacts.schedule_cleanup(artifact.path.clone(), Duration::from_secs(60));
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(artifact.path.exists());
}

#[tokio::test]
async fn test_purge_all_removes_files_and_directory() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("temp_images");
    let artifacts = TempArtifacts::new(&root);
    assert!(artifacts.ensure_directory().await);

    for ext in ["png", "jpg", "webp"] {
        let artifact = artifacts.allocate(ext);
        tokio::fs::write(&artifact.path, b"data").await.unwrap();
    }
    assert_eq!(std::fs::read_dir(&root).unwrap().count(), 3);

    artifacts.purge_all().await;
    assert!(!root.exists());
}

#[tokio::test]
async fn test_purge_all_tolerates_missing_directory() {
    let dir = tempfile::tempdir().unwrap();
    let artifacts = TempArtifacts::new(dir.path().join("never_created"));

    artifacts.purge_all().await;
    artifacts.purge_all().await;
    assert!(!artifacts.root().exists());
}

#[tokio::test]
async fn test_purge_all_keeps_going_past_subdirectory() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("temp_images");
    let artifacts = TempArtifacts::new(&root);
    artifacts.ensure_directory().await;

    let artifact = artifacts.allocate("png");
    tokio::fs::write(&artifact.path, b"data").await.unwrap();
    tokio::fs::create_dir(root.join("nested")).await.unwrap();

    artifacts.purge_all().await;

    // files are gone; the directory stays because it is not empty
    assert!(!artifact.path.exists());
    assert!(root.join("nested").exists());
}
