//! Causal Order Integration Tests
//!
//! Tests for newest-first ordering, tips and latest over a file-backed store.

use std::path::Path;
use std::sync::Arc;

use causeway::core::{ArtifactIndex, CausalGraph, CoreError, CrossRepoResolver};
use causeway::domain::{Artifact, ArtifactKind, ChunkStatus};
use causeway::store::FileStore;
use tempfile::TempDir;

async fn write_chunk(root: &Path, id: &str, status: &str, after: &[&str]) {
    let dir = root.join("chunks").join(id);
    tokio::fs::create_dir_all(&dir).await.unwrap();

    let yaml = format!("status: {}\ncreated_after: [{}]\n", status, after.join(", "));
    tokio::fs::write(dir.join("artifact.yaml"), yaml).await.unwrap();
}

fn index_for(root: &Path) -> ArtifactIndex {
    ArtifactIndex::new(
        Arc::new(FileStore::new("home", root)),
        Arc::new(CrossRepoResolver::new(Vec::new())),
    )
}

fn ids(artifacts: &[Artifact]) -> Vec<String> {
    artifacts.iter().map(|a| a.id.clone()).collect()
}

#[tokio::test]
async fn test_fork_scenario() {
    let temp = TempDir::new().unwrap();
    write_chunk(temp.path(), "a", "ACTIVE", &[]).await;
    write_chunk(temp.path(), "b", "FUTURE", &["a"]).await;
    write_chunk(temp.path(), "c", "FUTURE", &["a"]).await;

    let index = index_for(temp.path());

    let order = index.causal_order(ArtifactKind::Chunk).await.unwrap();
    assert_eq!(ids(&order), vec!["c", "b", "a"]);

    let tips = index.tips(ArtifactKind::Chunk).await.unwrap();
    assert_eq!(ids(&tips), vec!["b", "c"]);

    // Latest is the first element of causal order
    let latest = index.latest(ArtifactKind::Chunk).await.unwrap();
    assert_eq!(latest.id, "c");
}

#[tokio::test]
async fn test_order_is_stable_across_calls() {
    let temp = TempDir::new().unwrap();
    write_chunk(temp.path(), "root", "HISTORICAL", &[]).await;
    write_chunk(temp.path(), "left", "ACTIVE", &["root"]).await;
    write_chunk(temp.path(), "right", "ACTIVE", &["root"]).await;
    write_chunk(temp.path(), "merge", "IMPLEMENTING", &["left", "right"]).await;
    write_chunk(temp.path(), "side", "FUTURE", &[]).await;

    let index = index_for(temp.path());
    let first = ids(&index.causal_order(ArtifactKind::Chunk).await.unwrap());

    for _ in 0..5 {
        let again = ids(&index.causal_order(ArtifactKind::Chunk).await.unwrap());
        assert_eq!(first, again);
    }

    let pos = |id: &str| first.iter().position(|x| x == id).unwrap();
    assert!(pos("merge") < pos("left"));
    assert!(pos("merge") < pos("right"));
    assert!(pos("left") < pos("root"));
    assert!(pos("right") < pos("root"));
}

#[tokio::test]
async fn test_cycle_reported_with_members() {
    let temp = TempDir::new().unwrap();
    write_chunk(temp.path(), "a", "FUTURE", &["c"]).await;
    write_chunk(temp.path(), "b", "FUTURE", &["a"]).await;
    write_chunk(temp.path(), "c", "FUTURE", &["b"]).await;

    let err = index_for(temp.path())
        .listing(ArtifactKind::Chunk)
        .await
        .unwrap_err();

    match err {
        CoreError::CycleDetected { nodes } => {
            for id in ["a", "b", "c"] {
                assert!(nodes.iter().any(|n| n == id), "missing {} in {:?}", id, nodes);
            }
        }
        other => panic!("expected CycleDetected, got {:?}", other),
    }
}

#[tokio::test]
async fn test_dangling_reference_names_the_edge() {
    let temp = TempDir::new().unwrap();
    write_chunk(temp.path(), "a", "FUTURE", &[]).await;
    write_chunk(temp.path(), "b", "FUTURE", &["a", "vanished"]).await;

    let err = index_for(temp.path())
        .causal_order(ArtifactKind::Chunk)
        .await
        .unwrap_err();

    match err {
        CoreError::DanglingReference {
            child,
            missing_parent,
        } => {
            assert_eq!(child, "b");
            assert_eq!(missing_parent, "vanished");
        }
        other => panic!("expected DanglingReference, got {:?}", other),
    }
}

#[tokio::test]
async fn test_other_kinds_are_independent() {
    let temp = TempDir::new().unwrap();
    write_chunk(temp.path(), "a", "FUTURE", &[]).await;

    let index = index_for(temp.path());
    let err = index.latest(ArtifactKind::Investigation).await.unwrap_err();
    assert!(matches!(err, CoreError::EmptySet { .. }));
}

#[test]
fn test_graph_over_plain_slices() {
    let items = vec![
        Artifact::new("b", ArtifactKind::Chunk, ChunkStatus::Future.into())
            .with_created_after(["a"]),
        Artifact::new("a", ArtifactKind::Chunk, ChunkStatus::Active.into()),
    ];

    let graph = CausalGraph::build(&items).unwrap();
    let order: Vec<&str> = graph.causal_order().iter().map(|a| a.id.as_str()).collect();
    assert_eq!(order, vec!["b", "a"]);
}
