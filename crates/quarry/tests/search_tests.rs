use std::time::Duration;

use quarry::{
    build_index, Bounds, CancelToken, CodeSearchResult, Error, ExitReason, Index, IndexBuilder,
    Query, SearchOpts,
};

fn query(line: &str) -> Query {
    Query {
        line: line.to_string(),
        ..Query::default()
    }
}

fn run(idx: &Index, q: &Query) -> CodeSearchResult {
    let opts = SearchOpts {
        max_matches: 10_000,
        timeout: Duration::from_secs(60),
        ..SearchOpts::default()
    };
    idx.searcher()
        .search(q, &opts, &CancelToken::new())
        .expect("search failed")
}

#[test]
fn single_file_literal() {
    let idx = build_index("r", "v1", vec![("a.txt", "hello\nworld\nhello world\n")]).unwrap();
    let out = run(&idx, &query("hello"));
    assert_eq!(out.results.len(), 2);

    let first = &out.results[0];
    assert_eq!(first.tree, "r");
    assert_eq!(first.version, "v1");
    assert_eq!(first.path, "a.txt");
    assert_eq!(first.line_number, 1);
    assert_eq!(first.line, "hello");
    assert_eq!(first.bounds, Bounds { left: 0, right: 5 });

    let second = &out.results[1];
    assert_eq!(second.line_number, 3);
    assert_eq!(second.line, "hello world");
    assert_eq!(second.bounds, Bounds { left: 0, right: 5 });
    assert_eq!(out.stats.exit_reason, ExitReason::None);
}

#[test]
fn path_filter() {
    let idx = build_index("r", "v1", vec![("a.c", "foo\n"), ("b.py", "foo\n")]).unwrap();
    let mut q = query("foo");
    q.file = "\\.c$".to_string();
    let out = run(&idx, &q);
    assert_eq!(out.results.len(), 1);
    assert_eq!(out.results[0].path, "a.c");

    // The same content is still reachable through the other file.
    let mut q = query("foo");
    q.file = "\\.py$".to_string();
    let out = run(&idx, &q);
    assert_eq!(out.results.len(), 1);
    assert_eq!(out.results[0].path, "b.py");
}

#[test]
fn fold_case() {
    let idx = build_index("r", "v1", vec![("x", "Foo\nFOO\nbar\n")]).unwrap();
    let mut q = query("foo");
    q.fold_case = true;
    let out = run(&idx, &q);
    let lines: Vec<u32> = out.results.iter().map(|r| r.line_number).collect();
    assert_eq!(lines, vec![1, 2]);

    // Without folding, nothing matches.
    let out = run(&idx, &query("foo"));
    assert!(out.results.is_empty());
}

#[test]
fn match_limit_stops_early() {
    let body = "xx\n".repeat(1000);
    let idx = build_index("r", "v1", vec![("y", body.as_str())]).unwrap();
    let opts = SearchOpts {
        max_matches: 10,
        ..SearchOpts::default()
    };
    let out = idx
        .searcher()
        .search(&query("xx"), &opts, &CancelToken::new())
        .unwrap();
    assert_eq!(out.results.len(), 10);
    assert_eq!(out.stats.exit_reason, ExitReason::MatchLimit);
}

#[test]
fn match_limit_zero_returns_immediately() {
    let idx = build_index("r", "v1", vec![("y", "xx\n")]).unwrap();
    let opts = SearchOpts {
        max_matches: 0,
        ..SearchOpts::default()
    };
    let out = idx
        .searcher()
        .search(&query("xx"), &opts, &CancelToken::new())
        .unwrap();
    assert!(out.results.is_empty());
    assert_eq!(out.stats.exit_reason, ExitReason::MatchLimit);
}

#[test]
fn complex_regex_is_rejected_and_searcher_survives() {
    let idx = build_index("r", "v1", vec![("a", "abc\n")]).unwrap();
    let opts = SearchOpts::default();
    let err = idx
        .searcher()
        .search(&query("x{4001}"), &opts, &CancelToken::new())
        .unwrap_err();
    assert!(matches!(err, Error::QueryTooComplex(_)), "got {:?}", err);
    assert!(err.is_query_error());

    let err = idx
        .searcher()
        .search(&query("(unclosed"), &opts, &CancelToken::new())
        .unwrap_err();
    assert!(matches!(err, Error::QuerySyntax(_)), "got {:?}", err);

    // The index is untouched; a well-formed query still works.
    let out = run(&idx, &query("abc"));
    assert_eq!(out.results.len(), 1);
}

#[test]
fn empty_corpus() {
    let idx = IndexBuilder::new().finalize().unwrap();
    let out = run(&idx, &query("anything"));
    assert!(out.results.is_empty());
    assert_eq!(out.stats.exit_reason, ExitReason::None);
    assert!(out.stats.re2_time >= 0);
    assert!(out.stats.index_time >= 0);
    assert!(out.stats.sort_time >= 0);
}

#[test]
fn match_at_file_start_and_unterminated_last_line() {
    // No trailing newline: the sentinel newline is appended at ingest.
    let idx = build_index("r", "v1", vec![("f", "start here\nmiddle\nlast end")]).unwrap();
    let out = run(&idx, &query("start"));
    assert_eq!(out.results.len(), 1);
    assert_eq!(out.results[0].line_number, 1);
    assert_eq!(out.results[0].bounds, Bounds { left: 0, right: 5 });

    let out = run(&idx, &query("end$"));
    assert_eq!(out.results.len(), 1);
    assert_eq!(out.results[0].line_number, 3);
    assert_eq!(out.results[0].line, "last end");
}

#[test]
fn results_are_ordered_by_tree_path_and_line() {
    let mut builder = IndexBuilder::new();
    let ta = builder.add_tree("alpha", "v1", Default::default()).unwrap();
    let tb = builder.add_tree("beta", "v1", Default::default()).unwrap();
    builder
        .add_file(tb, "z.txt", b"needle\nnothing\nneedle\n")
        .unwrap();
    builder.add_file(ta, "b.txt", b"one needle\n").unwrap();
    builder.add_file(ta, "a.txt", b"a needle too\n").unwrap();
    let idx = builder.finalize().unwrap();

    let out = run(&idx, &query("needle"));
    let got: Vec<(String, String, u32)> = out
        .results
        .iter()
        .map(|r| (r.tree.clone(), r.path.clone(), r.line_number))
        .collect();
    assert_eq!(
        got,
        vec![
            ("alpha".into(), "a.txt".into(), 1),
            ("alpha".into(), "b.txt".into(), 1),
            ("beta".into(), "z.txt".into(), 1),
            ("beta".into(), "z.txt".into(), 3),
        ]
    );
}

#[test]
fn tree_filters() {
    let mut builder = IndexBuilder::new();
    let ta = builder.add_tree("kernel", "v1", Default::default()).unwrap();
    let tb = builder.add_tree("userland", "v1", Default::default()).unwrap();
    builder.add_file(ta, "k.c", b"probe\n").unwrap();
    builder.add_file(tb, "u.c", b"probe u\n").unwrap();
    let idx = builder.finalize().unwrap();

    let mut q = query("probe");
    q.repo = "^kern".to_string();
    let out = run(&idx, &q);
    assert_eq!(out.results.len(), 1);
    assert_eq!(out.results[0].tree, "kernel");

    let mut q = query("probe");
    q.not_repo = "^kern".to_string();
    let out = run(&idx, &q);
    assert_eq!(out.results.len(), 1);
    assert_eq!(out.results[0].tree, "userland");

    let mut q = query("probe");
    q.not_file = "\\.c$".to_string();
    let out = run(&idx, &q);
    assert!(out.results.is_empty());
}

#[test]
fn tags_constraint_matches_nothing_without_a_tags_corpus() {
    let idx = build_index("r", "v1", vec![("a", "foo\n")]).unwrap();
    let mut q = query("foo");
    q.tags = "T".to_string();
    let out = run(&idx, &q);
    assert!(out.results.is_empty());

    // not_tags excludes nothing when no tags exist.
    let mut q = query("foo");
    q.not_tags = "T".to_string();
    let out = run(&idx, &q);
    assert_eq!(out.results.len(), 1);
}

#[test]
fn context_lines_are_bounded_by_the_file() {
    let idx = build_index("r", "v1", vec![("c", "l1\nl2\nl3 hit\nl4\n")]).unwrap();
    let out = run(&idx, &query("hit"));
    assert_eq!(out.results.len(), 1);
    let r = &out.results[0];
    assert_eq!(r.context_before, vec!["l1", "l2"]);
    assert_eq!(r.context_after, vec!["l4"]);
}

#[test]
fn class_only_patterns_fall_back_to_a_full_scan() {
    // "\d" expands to no usable literal set, so every line is scanned.
    let idx = build_index("r", "v1", vec![("n", "a1\nbb\nc3\nd\n")]).unwrap();
    let out = run(&idx, &query("\\d"));
    let lines: Vec<u32> = out.results.iter().map(|r| r.line_number).collect();
    assert_eq!(lines, vec![1, 3]);

    // An empty pattern matches every line, at offset zero.
    let out = run(&idx, &query(""));
    assert_eq!(out.results.len(), 4);
    assert!(out
        .results
        .iter()
        .all(|r| r.bounds == Bounds { left: 0, right: 0 }));
}

#[test]
fn emitted_lines_actually_match() {
    let idx = build_index(
        "r",
        "v1",
        vec![("s", "prefix needle suffix\nno match here\nneedle2\n")],
    )
    .unwrap();
    let q = query("needle\\d?");
    let out = run(&idx, &q);
    let re = regex::Regex::new(&q.line).unwrap();
    assert_eq!(out.results.len(), 2);
    for r in &out.results {
        let m = re.find(&r.line).expect("emitted line must match");
        assert_eq!(m.start() as u32, r.bounds.left);
        assert_eq!(m.end() as u32, r.bounds.right);
    }
}

#[test]
fn multi_chunk_corpora_search_across_chunks() {
    let mut builder = IndexBuilder::new().chunk_bytes(64);
    let t = builder.add_tree("r", "v1", Default::default()).unwrap();
    for i in 0..20 {
        let body = format!("padding padding padding {}\nshared marker\n", i);
        builder
            .add_file(t, format!("f{:02}.txt", i), body.as_bytes())
            .unwrap();
    }
    let idx = builder.finalize().unwrap();
    assert!(idx.chunk_count() > 1, "expected multiple chunks");

    let out = run(&idx, &query("shared marker"));
    assert_eq!(out.results.len(), 20);
}

#[test]
fn timeout_zero_budget_reports_timeout() {
    let body = "needle\n".repeat(5000);
    let idx = build_index("r", "v1", vec![("big", body.as_str())]).unwrap();
    let opts = SearchOpts {
        max_matches: 1_000_000,
        timeout: Duration::from_micros(0),
        ..SearchOpts::default()
    };
    let out = idx
        .searcher()
        .search(&query("needle"), &opts, &CancelToken::new())
        .unwrap();
    assert_eq!(out.stats.exit_reason, ExitReason::Timeout);
}

#[test]
fn cancellation_keeps_partial_results() {
    let body = "needle\n".repeat(100);
    let idx = build_index("r", "v1", vec![("big", body.as_str())]).unwrap();
    let cancel = CancelToken::new();
    cancel.cancel();
    let opts = SearchOpts {
        max_matches: 1_000_000,
        ..SearchOpts::default()
    };
    let out = idx.searcher().search(&query("needle"), &opts, &cancel).unwrap();
    assert_eq!(out.stats.exit_reason, ExitReason::Cancelled);
    assert!(out.results.len() < 100);
}

#[test]
fn concurrent_identical_queries_return_identical_results() {
    let mut files = Vec::new();
    for i in 0..50 {
        files.push((
            format!("f{:02}.txt", i),
            format!("alpha {}\nbeta\ngamma alpha\n", i),
        ));
    }
    let idx = build_index("r", "v1", files).unwrap();

    let baseline = run(&idx, &query("alpha"));
    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..100)
            .map(|_| scope.spawn(|| run(&idx, &query("alpha")).results))
            .collect();
        for h in handles {
            assert_eq!(h.join().unwrap(), baseline.results);
        }
    });
}

#[test]
fn binary_content_does_not_break_matching() {
    let bytes: Vec<u8> = vec![0xff, 0xfe, b'\n', b'k', b'e', b'y', 0x00, 0x01, b'\n'];
    let mut builder = IndexBuilder::new();
    let t = builder.add_tree("r", "v1", Default::default()).unwrap();
    builder.add_file(t, "bin", &bytes).unwrap();
    let idx = builder.finalize().unwrap();
    let out = run(&idx, &query("key"));
    assert_eq!(out.results.len(), 1);
    assert_eq!(out.results[0].line_number, 2);
}
