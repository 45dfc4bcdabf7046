//! Session transcript parsers, one per agent with a scriptable format.
//!
//! Parsers extract skill-directory mentions from whatever slice of the
//! transcript the observer hands them; matching against installed skills
//! happens later through the skill index.

use regex::Regex;

use super::events::EventKind;

/// Transcript container format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscriptFormat {
    /// One JSON object per line; tailed by byte offset.
    Jsonl,
    /// One JSON document per file; reparsed on mtime change.
    Json,
}

/// One skill mention found in a transcript.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionHit {
    pub session_id: String,
    /// Leaf skill directory name as it appeared in the transcript.
    pub skill_dir: String,
    pub kind: EventKind,
}

/// Per-agent transcript parser.
pub trait SessionParser {
    fn agent(&self) -> &'static str;

    /// Glob patterns relative to the user home.
    fn globs(&self) -> Vec<&'static str>;

    fn format(&self) -> TranscriptFormat;

    /// Parse a content slice (whole file for Json, the unread tail for
    /// Jsonl). Must tolerate partial lines; errors are the caller's cue
    /// to skip the file silently.
    fn parse(&self, content: &str) -> anyhow::Result<Vec<SessionHit>>;
}

/// Shared mention extraction: `skills/<name>` path references plus
/// explicit skill-invocation tool records.
struct MentionScanner {
    path_mention: Regex,
    invoke_mention: Regex,
}

impl MentionScanner {
    fn new() -> Self {
        Self {
            path_mention: Regex::new(r"skills/([A-Za-z0-9][A-Za-z0-9_-]*)")
                .expect("built-in pattern must compile"),
            invoke_mention: Regex::new(r#""skill"\s*:\s*"([A-Za-z0-9][A-Za-z0-9_-]*)""#)
                .expect("built-in pattern must compile"),
        }
    }

    fn scan(&self, session_id: &str, text: &str, hits: &mut Vec<SessionHit>) {
        for captures in self.invoke_mention.captures_iter(text) {
            hits.push(SessionHit {
                session_id: session_id.to_string(),
                skill_dir: captures[1].to_string(),
                kind: EventKind::Invoke,
            });
        }
        for captures in self.path_mention.captures_iter(text) {
            hits.push(SessionHit {
                session_id: session_id.to_string(),
                skill_dir: captures[1].to_string(),
                kind: EventKind::Access,
            });
        }
    }
}

fn session_id_of(value: &serde_json::Value, fallback: &str) -> String {
    for key in ["sessionId", "session_id", "conversationId", "id"] {
        if let Some(id) = value.get(key).and_then(|v| v.as_str()) {
            return id.to_string();
        }
    }
    fallback.to_string()
}

/// Claude: per-project JSONL transcripts.
pub struct ClaudeJsonlParser {
    scanner: MentionScanner,
}

impl ClaudeJsonlParser {
    pub fn new() -> Self {
        Self { scanner: MentionScanner::new() }
    }
}

impl Default for ClaudeJsonlParser {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionParser for ClaudeJsonlParser {
    fn agent(&self) -> &'static str {
        "claude"
    }

    fn globs(&self) -> Vec<&'static str> {
        vec![".claude/projects/*/*.jsonl"]
    }

    fn format(&self) -> TranscriptFormat {
        TranscriptFormat::Jsonl
    }

    fn parse(&self, content: &str) -> anyhow::Result<Vec<SessionHit>> {
        parse_jsonl(&self.scanner, content)
    }
}

/// Codex: session JSONL logs.
pub struct CodexJsonlParser {
    scanner: MentionScanner,
}

impl CodexJsonlParser {
    pub fn new() -> Self {
        Self { scanner: MentionScanner::new() }
    }
}

impl Default for CodexJsonlParser {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionParser for CodexJsonlParser {
    fn agent(&self) -> &'static str {
        "codex"
    }

    fn globs(&self) -> Vec<&'static str> {
        vec![".codex/sessions/*.jsonl"]
    }

    fn format(&self) -> TranscriptFormat {
        TranscriptFormat::Jsonl
    }

    fn parse(&self, content: &str) -> anyhow::Result<Vec<SessionHit>> {
        parse_jsonl(&self.scanner, content)
    }
}

/// Gemini: one JSON chat document per file.
pub struct GeminiJsonParser {
    scanner: MentionScanner,
}

impl GeminiJsonParser {
    pub fn new() -> Self {
        Self { scanner: MentionScanner::new() }
    }
}

impl Default for GeminiJsonParser {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionParser for GeminiJsonParser {
    fn agent(&self) -> &'static str {
        "gemini"
    }

    fn globs(&self) -> Vec<&'static str> {
        vec![".gemini/tmp/*/chats/*.json"]
    }

    fn format(&self) -> TranscriptFormat {
        TranscriptFormat::Json
    }

    fn parse(&self, content: &str) -> anyhow::Result<Vec<SessionHit>> {
        let value: serde_json::Value = serde_json::from_str(content)?;
        let session = session_id_of(&value, "gemini-session");
        let mut hits = Vec::new();
        self.scanner.scan(&session, content, &mut hits);
        Ok(hits)
    }
}

/// OpenCode: one JSON document per message.
pub struct OpenCodeJsonParser {
    scanner: MentionScanner,
}

impl OpenCodeJsonParser {
    pub fn new() -> Self {
        Self { scanner: MentionScanner::new() }
    }
}

impl Default for OpenCodeJsonParser {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionParser for OpenCodeJsonParser {
    fn agent(&self) -> &'static str {
        "opencode"
    }

    fn globs(&self) -> Vec<&'static str> {
        vec![".local/share/opencode/storage/message/*/*.json"]
    }

    fn format(&self) -> TranscriptFormat {
        TranscriptFormat::Json
    }

    fn parse(&self, content: &str) -> anyhow::Result<Vec<SessionHit>> {
        let value: serde_json::Value = serde_json::from_str(content)?;
        let session = session_id_of(&value, "opencode-session");
        let mut hits = Vec::new();
        self.scanner.scan(&session, content, &mut hits);
        Ok(hits)
    }
}

fn parse_jsonl(scanner: &MentionScanner, content: &str) -> anyhow::Result<Vec<SessionHit>> {
    let mut hits = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        // A torn final line is not an error; it stays unread until the
        // next scan advances the offset past it.
        let Ok(value) = serde_json::from_str::<serde_json::Value>(line) else {
            continue;
        };
        let session = session_id_of(&value, "unknown-session");
        scanner.scan(&session, line, &mut hits);
    }
    Ok(hits)
}

/// Built-in parser set.
pub fn builtin_parsers() -> Vec<Box<dyn SessionParser>> {
    vec![
        Box::new(ClaudeJsonlParser::new()),
        Box::new(CodexJsonlParser::new()),
        Box::new(GeminiJsonParser::new()),
        Box::new(OpenCodeJsonParser::new()),
    ]
}
