use std::io::{Cursor, Write};
use std::sync::{Arc, Mutex};

use quarry::{build_index, SearchOpts};
use quarry_server::session::{JsonPresenter, Presenter, QueryGate, Session};

/// Write half the session can own while the test keeps reading.
#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn run_json_session(input: &str) -> Vec<serde_json::Value> {
    let idx = Arc::new(
        build_index(
            "r",
            "v1",
            vec![("a.txt", "hello\nworld\nhello world\n"), ("b.txt", "bye\n")],
        )
        .unwrap(),
    );
    let rt = tokio::runtime::Runtime::new().unwrap();
    let gate = QueryGate::new(rt.handle().clone(), 4);
    let out = SharedBuf::default();
    let presenter: Box<dyn Presenter> = Box::new(JsonPresenter::new(
        Cursor::new(input.as_bytes().to_vec()),
        out.clone(),
    ));
    let mut session = Session::new(idx, presenter, gate, SearchOpts::default(), false);
    session.run().unwrap();
    out.contents()
        .lines()
        .map(|l| serde_json::from_str(l).expect("every output line is JSON"))
        .collect()
}

#[test]
fn query_streams_matches_then_done() {
    let lines = run_json_session("{\"op\":\"query\",\"body\":{\"line\":\"hello\"}}\n");
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0]["op"], "match");
    assert_eq!(lines[0]["result"]["path"], "a.txt");
    assert_eq!(lines[0]["result"]["line_number"], 1);
    assert_eq!(lines[1]["op"], "match");
    assert_eq!(lines[1]["result"]["line_number"], 3);
    assert_eq!(lines[1]["result"]["bounds"]["left"], 0);
    assert_eq!(lines[1]["result"]["bounds"]["right"], 5);
    assert_eq!(lines[2]["op"], "done");
    assert_eq!(lines[2]["matches"], 2);
    assert_eq!(lines[2]["stats"]["exit_reason"], "NONE");
}

#[test]
fn info_request_describes_the_index() {
    let lines = run_json_session("{\"op\":\"info\"}\n");
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["op"], "info");
    assert_eq!(lines[0]["info"]["has_tags"], false);
    assert_eq!(lines[0]["info"]["trees"][0]["name"], "r");
    assert_eq!(lines[0]["info"]["trees"][0]["version"], "v1");
}

#[test]
fn bad_regex_reports_error_and_session_continues() {
    let input = "{\"op\":\"query\",\"body\":{\"line\":\"(unclosed\"}}\n\
                 {\"op\":\"query\",\"body\":{\"line\":\"bye\"}}\n";
    let lines = run_json_session(input);
    assert_eq!(lines[0]["op"], "error");
    assert!(
        lines[0]["error"].as_str().unwrap().contains("query syntax"),
        "error was {:?}",
        lines[0]["error"]
    );
    // The second query still ran.
    assert_eq!(lines[1]["op"], "match");
    assert_eq!(lines[1]["result"]["path"], "b.txt");
    assert_eq!(lines[2]["op"], "done");
}

#[test]
fn malformed_json_reports_error_in_band() {
    let input = "this is not json\n{\"op\":\"info\"}\n";
    let lines = run_json_session(input);
    assert_eq!(lines[0]["op"], "error");
    assert_eq!(lines[1]["op"], "info");
}

#[test]
fn too_complex_query_reports_error() {
    let lines = run_json_session("{\"op\":\"query\",\"body\":{\"line\":\"x{4001}\"}}\n");
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["op"], "error");
    assert!(
        lines[0]["error"].as_str().unwrap().contains("too complex"),
        "error was {:?}",
        lines[0]["error"]
    );
}

#[test]
fn quiet_suppresses_matches_but_not_stats() {
    let idx = Arc::new(build_index("r", "v1", vec![("a", "hit\n")]).unwrap());
    let rt = tokio::runtime::Runtime::new().unwrap();
    let gate = QueryGate::new(rt.handle().clone(), 1);
    let out = SharedBuf::default();
    let presenter: Box<dyn Presenter> = Box::new(JsonPresenter::new(
        Cursor::new(b"{\"op\":\"query\",\"body\":{\"line\":\"hit\"}}\n".to_vec()),
        out.clone(),
    ));
    let mut session = Session::new(idx, presenter, gate, SearchOpts::default(), true);
    session.run().unwrap();
    let lines: Vec<serde_json::Value> = out
        .contents()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["op"], "done");
    assert_eq!(lines[0]["matches"], 1);
}
