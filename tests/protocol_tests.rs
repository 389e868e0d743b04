use tvu_chat::protocol::{
    build, build_block, parse_fields, registry, render, scan, Command, ScheduleAction, Segment, StreamBuffer,
    TagKind, ValidationError,
};

// ── scanning ──────────────────────────────────────────────────────────────────

#[test]
fn well_formed_registered_tags_scan_to_one_closed_block() {
    for spec in registry::all() {
        let text = format!("[{0}]body[/{0}]", spec.name);
        let doc = scan(&text);
        assert_eq!(doc.segments.len(), 1, "{}", spec.name);
        let block = doc.blocks().next().unwrap();
        assert!(block.closed);
        assert_eq!(block.body, "body");
        assert_eq!(block.tag(), spec.name);
    }
}

#[test]
fn unterminated_block_extends_to_end_and_is_not_pending_dispatch() {
    let text = "Creating it now:\n[CreateFile]\nname: a.js\ncontent: console.log(1)";
    let doc = scan(text);
    let block = doc.blocks().next().unwrap();
    assert!(!block.closed);
    assert_eq!(block.end, text.len());
    assert_eq!(&text[block.body_start..], block.body);
    assert!(doc.pending_actions().is_empty());
    assert_eq!(build_block(block), Err(ValidationError::Unterminated { tag: "CreateFile" }));
}

#[test]
fn rescanning_after_append_keeps_closed_blocks() {
    let full = "a [PATH]x[/PATH] b [DeleteFile]one[/DeleteFile] c [SEARCH_RESULT]r[/SEARCH_RESULT] [MagicMode]zz[/MagicMode]";
    let mut previous: Vec<_> = Vec::new();
    for cut in (0..=full.len()).filter(|i| full.is_char_boundary(*i)) {
        let doc = scan(&full[..cut]);
        let closed: Vec<_> = doc.blocks().filter(|b| b.closed).cloned().collect();
        assert!(closed.len() >= previous.len(), "lost a block at {cut}");
        assert_eq!(&closed[..previous.len()], &previous[..], "block moved at {cut}");
        previous = closed;
    }
    assert_eq!(previous.len(), 4);
}

#[test]
fn two_same_name_blocks_stay_separate() {
    let doc = scan("[DeleteFile]a[/DeleteFile] then [DeleteFile]b[/DeleteFile]");
    let paths: Vec<_> = doc
        .pending_actions()
        .into_iter()
        .map(|b| build_block(b).unwrap())
        .collect();
    assert_eq!(
        paths,
        vec![Command::DeleteFile { path: "a".into() }, Command::DeleteFile { path: "b".into() }]
    );
}

#[test]
fn bracketed_prose_is_untouched() {
    let text = "Use v[i] or [link](http://x) or [Note] here [/note]";
    let doc = scan(text);
    assert_eq!(doc.segments, vec![Segment::Text { start: 0, text: text.to_string() }]);
    assert_eq!(render(&doc), text);
}

// ── rendering ─────────────────────────────────────────────────────────────────

#[test]
fn render_keeps_plain_bytes_and_escapes_bodies() {
    let text = "Kết quả <b>bold</b> & more:\n[SEARCH_RESULT]<script>alert(1)</script>[/SEARCH_RESULT]\ntail [PATH]a&b[/PATH]";
    let html = render(&scan(text));
    assert_eq!(
        html,
        "Kết quả <b>bold</b> & more:\n<search-result>&lt;script&gt;alert(1)&lt;/script&gt;</search-result>\ntail <path>a&amp;b</path>"
    );
    assert!(!html.contains("<script>"));
}

#[test]
fn render_never_leaks_recognized_syntax() {
    let text = "[SEARCH_BLOCK][SEARCH_LINK]x[/SEARCH_LINK][/SEARCH_BLOCK] [CreateFolder]name: d[/CreateFolder] [/OpenCode] [TVU_SCHEDULE]ACTION: xem";
    let html = render(&scan(text));
    for spec in registry::all() {
        assert!(!html.contains(&format!("[{}]", spec.name)), "{html}");
        assert!(!html.contains(&format!("[/{}]", spec.name)), "{html}");
    }
}

#[test]
fn nested_different_tags_are_opaque_and_escaped() {
    let html = render(&scan("[SEARCH_BLOCK]see [PATH]p[/PATH][/SEARCH_BLOCK]"));
    assert_eq!(html, "<search-block>see &#91;PATH&#93;p&#91;/PATH&#93;</search-block>");
}

// ── fields and commands ───────────────────────────────────────────────────────

#[test]
fn verbatim_content_parse() {
    let spec = registry::lookup("CreateFile").unwrap();
    let fields = parse_fields("name: a.js\ncontent: line1\nline2", spec.absorbing, spec.implicit);
    assert_eq!(fields.iter().collect::<Vec<_>>(), vec![("name", "a.js"), ("content", "line1\nline2")]);
}

#[test]
fn create_file_without_content_names_the_field() {
    let doc = scan("[CreateFile]\nname: a.js\n[/CreateFile]");
    let block = doc.blocks().next().unwrap();
    let fields = block.spec.parse_fields(&block.body);
    match build(block.spec, &fields, block) {
        Err(ValidationError::MissingFields { fields, .. }) => assert_eq!(fields, vec!["content"]),
        other => panic!("expected missing content, got {other:?}"),
    }
}

#[test]
fn schedule_by_date_without_date_is_invalid() {
    let doc = scan("[TVU_SCHEDULE]\nACTION: xem_theo_ngay\n[/TVU_SCHEDULE]");
    let err = build_block(doc.blocks().next().unwrap()).unwrap_err();
    assert_eq!(err, ValidationError::MissingFields { tag: "TVU_SCHEDULE", fields: vec!["DATE"] });
    assert!(err.to_string().contains("DATE"));
}

#[test]
fn schedule_by_date_with_date() {
    let doc = scan("[TVU_SCHEDULE]\nACTION: xem_theo_ngay\nDATE: 2026-10-21\n[/TVU_SCHEDULE]");
    let cmd = build_block(doc.blocks().next().unwrap()).unwrap();
    assert_eq!(
        cmd,
        Command::ScheduleQuery {
            action: ScheduleAction::ByDate,
            date: chrono::NaiveDate::from_ymd_opt(2026, 10, 21)
        }
    );
}

#[test]
fn file_source_with_key_shaped_lines_survives() {
    let source = "const config = {\nport: 8080,\nhost: 'x'\n};\n\nexport default config;";
    let text = format!("[CreateFile]\nname: config.js\npath: src\ncontent: {source}\n[/CreateFile]");
    let doc = scan(&text);
    match build_block(doc.blocks().next().unwrap()).unwrap() {
        Command::CreateFile { content, name, path } => {
            assert_eq!(content, source);
            assert_eq!(name, "config.js");
            assert_eq!(path.as_deref(), Some("src"));
        }
        other => panic!("unexpected {other:?}"),
    };
}

// ── results and streaming ─────────────────────────────────────────────────────

#[test]
fn result_before_action_counts_as_resolved() {
    let doc = scan(
        "[TVU_SCHEDULE_RESULT]\nstatus: ok\noutput: none\n[/TVU_SCHEDULE_RESULT]\n[TVU_SCHEDULE]ACTION: xem_hom_nay[/TVU_SCHEDULE]",
    );
    let action = doc.action_blocks().next().unwrap();
    assert!(doc.is_resolved(action));
    assert!(doc.pending_actions().is_empty());
}

#[test]
fn result_answers_the_action_before_it() {
    let doc = scan("[DeleteFile]a[/DeleteFile][DeleteFile_RESULT]status: ok[/DeleteFile_RESULT][DeleteFile]b[/DeleteFile]");
    let pending = doc.pending_actions();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].body, "b");
}

#[test]
fn stream_buffer_hands_out_each_block_once() {
    let mut buffer = StreamBuffer::new();
    let chunks = ["[DeleteFile]a", "[/DeleteFile] and [Dele", "teFile]b[/DeleteFile]", " bye"];
    let mut seen = Vec::new();
    for chunk in chunks {
        buffer.push(chunk);
        seen.extend(buffer.take_ready().into_iter().map(|b| b.body));
    }
    assert_eq!(seen, vec!["a", "b"]);
    assert!(buffer.document().blocks().all(|b| b.spec.kind == TagKind::Action));
}
