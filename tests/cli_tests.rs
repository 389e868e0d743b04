use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;
use tvu_chat::config::{self, ConfigStore};
use tvu_chat::protocol::scan;
use tvu_chat::{build_dispatcher, check, read_input, segment_report, tag_table, ResolveOptions};

fn temp_input(content: &str) -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("reply.txt");
    fs::write(&path, content).unwrap();
    (dir, path)
}

// ── read_input ────────────────────────────────────────────────────────────────

#[test]
fn read_input_returns_content() {
    let (_dir, path) = temp_input("xin chào");
    assert_eq!(read_input(&path).unwrap(), "xin chào");
}

#[test]
fn read_input_missing_file_errors() {
    let err = read_input(&PathBuf::from("/nonexistent/reply.txt")).unwrap_err();
    assert!(err.to_string().contains("Failed to read input"));
}

// ── check ─────────────────────────────────────────────────────────────────────

#[test]
fn check_passes_for_valid_blocks() {
    let (_dir, path) = temp_input("[CreateFolder]\nname: web\n[/CreateFolder]\n[OpenCode]web/index.html[/OpenCode]");
    assert!(check(&path).is_ok());
}

#[test]
fn check_lists_every_problem() {
    let (_dir, path) = temp_input("[RenameFile]\npath: a.txt\n[/RenameFile]\n[DeleteFolder]old");
    let message = check(&path).unwrap_err().to_string();
    assert!(message.contains("Found 2 problem(s) in 2 action block(s)"), "{message}");
    assert!(message.contains("newName"), "{message}");
    assert!(message.contains("[DeleteFolder] is not closed"), "{message}");
}

// ── tables and reports ────────────────────────────────────────────────────────

#[test]
fn tag_table_marks_optional_fields() {
    let table = tag_table();
    let create = table.lines().find(|l| l.starts_with("CreateFile ")).unwrap();
    assert!(create.contains("action"));
    assert!(create.contains("name, content, path?"), "{create}");
    assert!(table.lines().any(|l| l.starts_with("SEARCH_RESULT ") && l.contains("render")));
}

#[test]
fn segment_report_has_one_line_per_segment() {
    let doc = scan("hi [PATH]a/b[/PATH] [/MagicMode][DeleteFile]x");
    let report = segment_report(&doc);
    let lines: Vec<_> = report.lines().collect();
    assert_eq!(lines.len(), 5, "{report}");
    assert!(lines[1].contains("render   [PATH] \"a/b\""), "{report}");
    assert!(lines[3].contains("stray    [/MagicMode]"), "{report}");
    assert!(lines[4].contains("[DeleteFile] (unclosed)"), "{report}");
}

// ── config ────────────────────────────────────────────────────────────────────

#[test]
fn config_round_trips_through_toml() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("config.toml");
    let mut store = ConfigStore::load(&path).unwrap();
    assert_eq!(store.entries().count(), 0);

    store.set(config::TVU_USERNAME, "110120001");
    store.set(config::TVU_TERM, "  ");
    store.save().unwrap();

    let reloaded = ConfigStore::load(&path).unwrap();
    assert_eq!(reloaded.value(config::TVU_USERNAME), Some("110120001"));
    assert_eq!(reloaded.value(config::TVU_TERM), None);
    assert_eq!(reloaded.get(config::TVU_TERM, "HK1"), "HK1");
}

#[test]
fn config_rejects_malformed_file() {
    let (_dir, path) = temp_input("this is = = not toml");
    let err = ConfigStore::load(&path).unwrap_err();
    assert!(err.to_string().contains("Failed to parse config"));
}

#[tokio::test]
async fn dispatcher_without_settings_still_builds() {
    let dir = TempDir::new().unwrap();
    let store = ConfigStore::load(dir.path().join("config.toml")).unwrap();
    let workspace = dir.path().join("ws");
    let opts = ResolveOptions { workspace: Some(workspace.clone()), ..Default::default() };
    let dispatcher = build_dispatcher(&store, &opts).await.unwrap();

    let resolution = dispatcher
        .resolve("[CreateFile]\nname: a.txt\ncontent: hi\n[/CreateFile][TVU_SCORE][/TVU_SCORE]")
        .await;
    assert_eq!(fs::read_to_string(workspace.join("a.txt")).unwrap(), "hi");
    let outputs: Vec<_> = resolution.dispatched().map(|r| r.output.clone()).collect();
    assert!(outputs[1].contains("university account is not configured"), "{outputs:?}");
}
