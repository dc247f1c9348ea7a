//! Property-based tests for version and message id sequencing
//! **Feature: scriptoria-files, Property 3: Contiguous Sequences**

use std::collections::BTreeSet;
use std::sync::Arc;

use proptest::prelude::*;
use scriptoria_config::WorkspaceConfig;
use scriptoria_files::Workspace;
use tokio::runtime::Runtime;

async fn open(root: &std::path::Path) -> Workspace {
    Workspace::open(&WorkspaceConfig::with_root(root)).await.unwrap()
}

// Property 3a: N sequential appends yield exactly 1..=N
#[test]
fn prop_sequential_versions_are_contiguous() {
    let rt = Runtime::new().unwrap();

    proptest!(ProptestConfig::with_cases(16), |(count in 1usize..20)| {
        let temp_dir = tempfile::tempdir().unwrap();
        let workspace = rt.block_on(open(temp_dir.path()));

        let mut versions = Vec::new();
        for i in 0..count {
            let content = format!("release {}", i);
            versions.push(rt.block_on(workspace.append_version("CHANGELOG.md", content.as_bytes())).unwrap());
        }
        let expected: Vec<u64> = (1..=count as u64).collect();
        prop_assert_eq!(versions, expected);
    });
}

// Property 3b: M concurrent callers appending K versions each still receive
// the contiguous set 1..=M*K, and every version holds what its caller wrote
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn prop_concurrent_versions_are_contiguous() {
    let temp_dir = tempfile::tempdir().unwrap();
    let workspace = Arc::new(open(temp_dir.path()).await);
    let callers = 6;
    let per_caller = 5;

    let mut tasks = Vec::new();
    for caller in 0..callers {
        let workspace = workspace.clone();
        tasks.push(tokio::spawn(async move {
            let mut assigned = Vec::new();
            for i in 0..per_caller {
                let content = format!("{}-{}", caller, i);
                let version = workspace
                    .append_version("docs/README.md", content.as_bytes())
                    .await
                    .unwrap();
                assigned.push((version, content));
            }
            assigned
        }));
    }

    let mut numbers = BTreeSet::new();
    for task in tasks {
        for (version, content) in task.await.unwrap() {
            assert!(numbers.insert(version), "version {} assigned twice", version);
            assert_eq!(
                workspace.get_version("docs/README.md", version).await.unwrap(),
                content.as_bytes()
            );
        }
    }
    let expected: BTreeSet<u64> = (1..=(callers * per_caller) as u64).collect();
    assert_eq!(numbers, expected);
}

// Property 3c: Concurrent message appends get unique, gap-free ids and the
// log replays in id order
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn prop_concurrent_message_ids_are_unique() {
    let temp_dir = tempfile::tempdir().unwrap();
    let workspace = Arc::new(open(temp_dir.path()).await);

    let mut tasks = Vec::new();
    for sender in 0..8 {
        let workspace = workspace.clone();
        tasks.push(tokio::spawn(async move {
            for i in 0..4 {
                workspace
                    .append_message(&format!("agent{}", sender), "hub", &i.to_string())
                    .await
                    .unwrap();
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let messages = workspace.read_messages("main", None).await.unwrap();
    let ids: Vec<u64> = messages.iter().map(|m| m.id).collect();
    assert_eq!(ids, (1..=32).collect::<Vec<u64>>());
    for pair in messages.windows(2) {
        assert!(pair[0].timestamp <= pair[1].timestamp);
    }
}

// Counters are derived from disk, so a reopened workspace continues where
// the previous one stopped
#[tokio::test]
async fn test_sequences_survive_reopen() {
    let temp_dir = tempfile::tempdir().unwrap();
    {
        let workspace = open(temp_dir.path()).await;
        workspace.append_version("doc.md", b"one").await.unwrap();
        workspace.append_message("a", "b", "first").await.unwrap();
    }

    let reopened = open(temp_dir.path()).await;
    assert_eq!(reopened.append_version("doc.md", b"two").await.unwrap(), 2);
    assert_eq!(reopened.append_message("a", "b", "second").await.unwrap().id, 2);
    assert_eq!(reopened.versioner().latest("doc.md").await.unwrap().0, 2);
}
