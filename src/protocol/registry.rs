// ── Tag kinds ─────────────────────────────────────────────────────────────────

/// What a tag means to the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
    /// Executed against a collaborator by the dispatcher.
    Action,
    /// Display-only decoration, never dispatched.
    Render,
    /// Written by the dispatcher after an action ran.
    Result,
}

/// Fixed tag definition. Lives for the whole process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagSpec {
    pub name: &'static str,
    pub kind: TagKind,
    pub required: &'static [&'static str],
    pub optional: &'static [&'static str],
    /// Field that swallows the rest of the body verbatim once it starts.
    pub absorbing: Option<&'static str>,
    /// Field that receives body text appearing before the first `key:` line.
    pub implicit: Option<&'static str>,
    pub result_tag: Option<&'static str>,
    pub summary: &'static str,
}

impl TagSpec {
    const fn action(name: &'static str, result_tag: &'static str) -> Self {
        Self {
            name,
            kind: TagKind::Action,
            required: &[],
            optional: &[],
            absorbing: None,
            implicit: None,
            result_tag: Some(result_tag),
            summary: "",
        }
    }

    const fn render(name: &'static str, summary: &'static str) -> Self {
        Self {
            name,
            kind: TagKind::Render,
            required: &[],
            optional: &[],
            absorbing: None,
            implicit: None,
            result_tag: None,
            summary,
        }
    }

    const fn result(name: &'static str) -> Self {
        Self {
            name,
            kind: TagKind::Result,
            required: &["status"],
            optional: &[],
            absorbing: Some("output"),
            implicit: None,
            result_tag: None,
            summary: "Outcome written back after an action block ran.",
        }
    }

    const fn fields(mut self, required: &'static [&'static str], optional: &'static [&'static str]) -> Self {
        self.required = required;
        self.optional = optional;
        self
    }

    const fn absorbing(mut self, field: &'static str) -> Self {
        self.absorbing = Some(field);
        self
    }

    const fn implicit(mut self, field: &'static str) -> Self {
        self.implicit = Some(field);
        self
    }

    const fn summary(mut self, summary: &'static str) -> Self {
        self.summary = summary;
        self
    }

    pub fn is_action(&self) -> bool {
        self.kind == TagKind::Action
    }

    /// Element name used by the render layer: `SEARCH_RESULT` -> `search-result`,
    /// `MagicMode` -> `magic-mode`.
    pub fn element_name(&self) -> String {
        let mut out = String::with_capacity(self.name.len() + 4);
        let mut prev_lower = false;
        for c in self.name.chars() {
            if c == '_' {
                out.push('-');
                prev_lower = false;
            } else if c.is_ascii_uppercase() {
                if prev_lower {
                    out.push('-');
                }
                out.push(c.to_ascii_lowercase());
                prev_lower = false;
            } else {
                out.push(c);
                prev_lower = c.is_ascii_lowercase() || c.is_ascii_digit();
            }
        }
        out
    }
}

// ── Registry ──────────────────────────────────────────────────────────────────

static TAGS: &[TagSpec] = &[
    // File management
    TagSpec::action("CreateFile", "CreateFile_RESULT")
        .fields(&["name", "content"], &["path"])
        .absorbing("content")
        .summary("Create a file named `name` inside folder `path` with `content` as its full body."),
    TagSpec::action("CreateFolder", "CreateFolder_RESULT")
        .fields(&["name"], &["path"])
        .summary("Create a folder named `name` inside folder `path`."),
    TagSpec::action("RenameFile", "RenameFile_RESULT")
        .fields(&["path", "newName"], &[])
        .summary("Rename the file at `path` to `newName` in the same folder."),
    TagSpec::action("RenameFolder", "RenameFolder_RESULT")
        .fields(&["path", "newName"], &[])
        .summary("Rename the folder at `path` to `newName` in the same parent."),
    TagSpec::action("DeleteFile", "DeleteFile_RESULT")
        .fields(&["path"], &[])
        .implicit("path")
        .summary("Delete the file at `path`."),
    TagSpec::action("DeleteFolder", "DeleteFolder_RESULT")
        .fields(&["path"], &[])
        .implicit("path")
        .summary("Delete the folder at `path` and everything below it."),
    TagSpec::action("OpenMedia", "OpenMedia_RESULT")
        .fields(&["path"], &[])
        .implicit("path")
        .summary("Open the image, audio or video file at `path` in the media viewer."),
    TagSpec::action("OpenCode", "OpenCode_RESULT")
        .fields(&["path"], &[])
        .implicit("path")
        .summary("Open the source file at `path` in the code editor."),
    // University
    TagSpec::action("TVU_SCHEDULE", "TVU_SCHEDULE_RESULT")
        .fields(&["ACTION"], &["DATE"])
        .summary("Look up the class or exam schedule. ACTION is one of xem_hom_nay, xem_ngay_mai, xem_theo_ngay, xem_lich_thi; DATE (yyyy-MM-dd) is required for xem_theo_ngay."),
    TagSpec::action("TVU_SCORE", "TVU_SCORE_RESULT")
        .fields(&[], &["TERM"])
        .summary("Look up the student's scores, optionally for a single TERM."),
    // View toggles
    TagSpec::action("CodeManager", "CodeManager_RESULT")
        .fields(&["value"], &[])
        .implicit("value")
        .summary("Show the code manager. A body of `0` navigates back."),
    TagSpec::action("CodeEditor", "CodeEditor_RESULT")
        .fields(&["value"], &[])
        .implicit("value")
        .summary("Show the code editor. A body of `0` navigates back."),
    TagSpec::action("MediaView", "MediaView_RESULT")
        .fields(&["value"], &[])
        .implicit("value")
        .summary("Show the media viewer. A body of `0` navigates back."),
    // Display only
    TagSpec::render("SEARCH_RESULT", "A web search result summary."),
    TagSpec::render("SEARCH_LINK", "A link to a search result source."),
    TagSpec::render("SEARCH_BLOCK", "A group of search results."),
    TagSpec::render("MagicMode", "Text produced while magic mode is active."),
    TagSpec::render("PATH", "A file or folder path shown as a chip."),
    // Written back by the dispatcher
    TagSpec::result("CreateFile_RESULT"),
    TagSpec::result("CreateFolder_RESULT"),
    TagSpec::result("RenameFile_RESULT"),
    TagSpec::result("RenameFolder_RESULT"),
    TagSpec::result("DeleteFile_RESULT"),
    TagSpec::result("DeleteFolder_RESULT"),
    TagSpec::result("OpenMedia_RESULT"),
    TagSpec::result("OpenCode_RESULT"),
    TagSpec::result("TVU_SCHEDULE_RESULT"),
    TagSpec::result("TVU_SCORE_RESULT"),
    TagSpec::result("CodeManager_RESULT"),
    TagSpec::result("CodeEditor_RESULT"),
    TagSpec::result("MediaView_RESULT"),
];

/// Look up a tag by its exact, case-sensitive name.
/// `None` means the text should be left alone as prose.
pub fn lookup(name: &str) -> Option<&'static TagSpec> {
    TAGS.iter().find(|spec| spec.name == name)
}

pub fn all() -> &'static [TagSpec] {
    TAGS
}

/// The action tag whose results are written under `result_tag`.
pub fn action_for_result(result_tag: &str) -> Option<&'static TagSpec> {
    TAGS.iter().find(|spec| spec.result_tag == Some(result_tag))
}
