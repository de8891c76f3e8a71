//! Status-file durability tests.

use butler::status::StatusFile;

#[tokio::test]
async fn concurrent_updates_serialize_and_all_land() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("butler.status");
    let status = std::sync::Arc::new(StatusFile::open(path.clone()).await);

    let mut tasks = tokio::task::JoinSet::new();
    for i in 0..10 {
        let status = std::sync::Arc::clone(&status);
        tasks.spawn(async move {
            status.set(&format!("manager-{i}"), i % 2 == 0).await.unwrap();
        });
    }
    while tasks.join_next().await.is_some() {}

    let reopened = StatusFile::open(path.clone()).await;
    for i in 0..10 {
        assert_eq!(
            reopened.get(&format!("manager-{i}")).await,
            Some(i % 2 == 0)
        );
    }

    // The document on disk is complete and well-formed.
    let content = tokio::fs::read_to_string(&path).await.unwrap();
    assert_eq!(content.lines().count(), 10);
    assert!(content.lines().all(|l| l.contains('=')));
}

#[tokio::test]
async fn rewrite_leaves_no_temp_file_behind() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("butler.status");
    let status = StatusFile::open(path.clone()).await;

    status.set("prom", true).await.unwrap();
    status.set("prom", false).await.unwrap();

    let entries: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(entries, vec![std::ffi::OsString::from("butler.status")]);
}

#[tokio::test]
async fn unknown_lines_are_ignored_on_seed() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("butler.status");
    tokio::fs::write(&path, "prom=ok\n# stray comment\nbroken line\n")
        .await
        .unwrap();

    let status = StatusFile::open(path).await;
    assert_eq!(status.get("prom").await, Some(true));
    assert_eq!(status.get("# stray comment").await, None);
}
