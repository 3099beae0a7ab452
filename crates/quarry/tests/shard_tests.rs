use quarry::{build_index, CancelToken, Error, Index, IndexBuilder, Query, SearchOpts};

fn query(line: &str) -> Query {
    Query {
        line: line.to_string(),
        ..Query::default()
    }
}

fn search_json(idx: &Index, q: &Query) -> String {
    let opts = SearchOpts {
        max_matches: 10_000,
        ..SearchOpts::default()
    };
    let out = idx.searcher().search(q, &opts, &CancelToken::new()).unwrap();
    serde_json::to_string(&out.results).unwrap()
}

fn three_file_index() -> Index {
    build_index(
        "r",
        "v1",
        vec![
            ("src/a.c", "int main() {\n  return 0;\n}\n"),
            ("src/b.c", "static int helper(void);\n"),
            ("README", "build with make\n"),
        ],
    )
    .unwrap()
}

#[test]
fn dump_load_search_equivalence() -> std::io::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("index.quarry");
    let idx = three_file_index();
    idx.dump(&path).unwrap();
    let loaded = Index::load(&path).unwrap();

    assert_eq!(loaded.name(), idx.name());
    assert_eq!(loaded.tree_count(), idx.tree_count());
    assert_eq!(loaded.file_count(), idx.file_count());
    assert_eq!(loaded.content_count(), idx.content_count());
    assert_eq!(loaded.chunk_count(), idx.chunk_count());

    for pattern in ["int", "main", "make", "(?m)^static", "nothing matches"] {
        let q = query(pattern);
        assert_eq!(
            search_json(&idx, &q),
            search_json(&loaded, &q),
            "pattern {:?} diverged after load",
            pattern
        );
    }
    Ok(())
}

#[test]
fn dump_at_finalize_matches_explicit_dump() -> std::io::Result<()> {
    let dir = tempfile::tempdir()?;
    let at_finalize = dir.path().join("a.quarry");
    let explicit = dir.path().join("b.quarry");

    let mut builder = IndexBuilder::new().name("dumped").dump_path(&at_finalize);
    let t = builder.add_tree("r", "v1", Default::default()).unwrap();
    builder.add_file(t, "f", b"needle\n").unwrap();
    let idx = builder.finalize().unwrap();
    idx.dump(&explicit).unwrap();

    let a = std::fs::read(&at_finalize)?;
    let b = std::fs::read(&explicit)?;
    assert_eq!(a, b, "finalize-time dump must equal an explicit dump");

    let loaded = Index::load(&at_finalize).unwrap();
    assert_eq!(loaded.name(), "dumped");
    let q = query("needle");
    assert_eq!(search_json(&idx, &q), search_json(&loaded, &q));
    Ok(())
}

#[test]
fn multi_chunk_round_trip() -> std::io::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("index.quarry");
    let mut builder = IndexBuilder::new().chunk_bytes(64);
    let t = builder.add_tree("r", "v1", Default::default()).unwrap();
    for i in 0..12 {
        let body = format!("file body number {}\nshared needle\n", i);
        builder.add_file(t, format!("f{:02}", i), body.as_bytes()).unwrap();
    }
    let idx = builder.finalize().unwrap();
    assert!(idx.chunk_count() > 1);
    idx.dump(&path).unwrap();

    let loaded = Index::load(&path).unwrap();
    assert_eq!(loaded.chunk_count(), idx.chunk_count());
    let q = query("shared needle");
    assert_eq!(search_json(&idx, &q), search_json(&loaded, &q));
    Ok(())
}

#[test]
fn tree_metadata_survives_the_round_trip() -> std::io::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("index.quarry");
    let mut builder = IndexBuilder::new().name("meta");
    let mut metadata = std::collections::BTreeMap::new();
    metadata.insert("path".to_string(), "/src/repo".to_string());
    metadata.insert("url".to_string(), "https://example.com".to_string());
    let t = builder.add_tree("r", "v2", metadata.clone()).unwrap();
    builder.add_file(t, "f", b"x\n").unwrap();
    builder.finalize().unwrap().dump(&path).unwrap();

    let loaded = Index::load(&path).unwrap();
    let info = loaded.info();
    assert_eq!(info.name, "meta");
    assert_eq!(info.trees.len(), 1);
    assert_eq!(info.trees[0].name, "r");
    assert_eq!(info.trees[0].version, "v2");
    assert_eq!(info.trees[0].metadata, metadata);
    assert!(!info.has_tags);
    Ok(())
}

#[test]
fn bad_magic_is_incompatible() -> std::io::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("index.quarry");
    three_file_index().dump(&path).unwrap();

    let mut bytes = std::fs::read(&path)?;
    bytes[0] ^= 0xff;
    std::fs::write(&path, &bytes)?;
    match Index::load(&path) {
        Err(Error::IncompatibleIndex(msg)) => assert!(msg.contains("magic"), "msg: {}", msg),
        other => panic!("expected IncompatibleIndex, got {:?}", other.map(|_| ())),
    }
    Ok(())
}

#[test]
fn future_version_is_incompatible() -> std::io::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("index.quarry");
    three_file_index().dump(&path).unwrap();

    let mut bytes = std::fs::read(&path)?;
    bytes[4..8].copy_from_slice(&999u32.to_le_bytes());
    std::fs::write(&path, &bytes)?;
    match Index::load(&path) {
        Err(Error::IncompatibleIndex(msg)) => assert!(msg.contains("version"), "msg: {}", msg),
        other => panic!("expected IncompatibleIndex, got {:?}", other.map(|_| ())),
    }
    Ok(())
}

#[test]
fn truncated_file_is_incompatible() -> std::io::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("index.quarry");
    three_file_index().dump(&path).unwrap();

    let bytes = std::fs::read(&path)?;
    for keep in [10usize, 60, bytes.len() / 2] {
        let cut = dir.path().join(format!("cut{}.quarry", keep));
        std::fs::write(&cut, &bytes[..keep])?;
        assert!(
            matches!(Index::load(&cut), Err(Error::IncompatibleIndex(_))),
            "keeping {} bytes should not load",
            keep
        );
    }
    Ok(())
}
