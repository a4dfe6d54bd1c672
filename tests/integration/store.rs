//! Content store behavior shared across runs and processes.

use anyhow::Result;
use numng::core::{NumngError, find_numng_error};
use numng::manifest::{SourceIdentity, SourceType};
use numng::store::{ContentStore, EnsureRequest, EntryState};
use std::time::Duration;

use crate::common::TestProject;

fn request(uri: &str, git_ref: &str, offset: Option<&str>) -> EnsureRequest {
    EnsureRequest {
        identity: SourceIdentity::new(SourceType::Git, uri, offset).unwrap(),
        uri: uri.to_string(),
        git_ref: git_ref.to_string(),
        context: "test".to_string(),
        consumers: 1,
    }
}

#[tokio::test]
async fn test_concurrent_stores_share_one_entry() -> Result<()> {
    let project = TestProject::new()?;
    let repo = project.create_source_repo("shared", &[("a.nu", "")])?;
    let uri = repo.file_url();

    // Separate instances stand in for separate processes: only file locks coordinate them
    let first = ContentStore::new(project.store_dir());
    let second = ContentStore::new(project.store_dir());
    let req = request(&uri, "main", None);
    let (a, b) = tokio::join!(first.ensure(&req), second.ensure(&req));
    let (a, b) = (a?, b?);

    assert_eq!(a.path, b.path);
    assert_eq!(a.commit, repo.rev_parse_head()?);
    let entries = first.list().await?;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].1.state, EntryState::Ready);
    Ok(())
}

#[tokio::test]
async fn test_path_offset_selects_subdirectory() -> Result<()> {
    let project = TestProject::new()?;
    let repo = project.create_source_repo("mono", &[("pkgs/one/mod.nu", "one"), ("pkgs/two/mod.nu", "two")])?;
    let store = ContentStore::new(project.store_dir());

    let one = store.ensure(&request(&repo.file_url(), "main", Some("pkgs/one"))).await?;
    let two = store.ensure(&request(&repo.file_url(), "main", Some("pkgs/two"))).await?;
    assert_ne!(one.key, two.key);
    assert_eq!(std::fs::read_to_string(one.package_dir.join("mod.nu"))?, "one");
    assert_eq!(std::fs::read_to_string(two.package_dir.join("mod.nu"))?, "two");

    let missing = store.ensure(&request(&repo.file_url(), "main", Some("pkgs/three"))).await;
    assert!(matches!(
        find_numng_error(&missing.unwrap_err()),
        Some(NumngError::Fetch { .. })
    ));
    Ok(())
}

#[tokio::test]
async fn test_missing_ref_resets_entry() -> Result<()> {
    let project = TestProject::new()?;
    let repo = project.create_source_repo("refs", &[("a.nu", "")])?;
    let store = ContentStore::new(project.store_dir());

    let error = store.ensure(&request(&repo.file_url(), "nope", None)).await.unwrap_err();
    assert!(matches!(find_numng_error(&error), Some(NumngError::RefNotFound { .. })));
    let entries = store.list().await?;
    assert!(entries.iter().all(|(_, record)| record.state == EntryState::Missing));

    repo.create_branch("nope")?;
    let entry = store.ensure(&request(&repo.file_url(), "nope", None)).await?;
    assert_eq!(entry.state, EntryState::Ready);
    Ok(())
}

#[tokio::test]
async fn test_gc_keeps_recent_entries() -> Result<()> {
    let project = TestProject::new()?;
    let repo = project.create_source_repo("gc", &[("a.nu", "")])?;
    let store = ContentStore::new(project.store_dir());
    let entry = store.ensure(&request(&repo.file_url(), "main", None)).await?;

    assert!(store.gc(Duration::from_secs(3600)).await?.is_empty());
    assert!(entry.path.exists());

    let removed = store.gc(Duration::ZERO).await?;
    assert_eq!(removed, vec![entry.key]);
    assert!(!entry.path.exists());
    assert!(store.list().await?.is_empty());
    Ok(())
}
