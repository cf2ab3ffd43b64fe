use crate::providers::base::Message;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use regex::Regex;
use std::path::PathBuf;
use std::sync::LazyLock;
use tracing::{debug, warn};


/// Header line of the memory file.
const MEMORY_HEADER: &str = "# Memoria del Proyecto";

/// Captured correction content is truncated to this many characters.
const MAX_CONTENT_CHARS: usize = 300;

/// Phrasings that mark a user message as a correction. English and Spanish,
/// matched case-insensitively: negations, clarifications, absolute rules.
static CORRECTION_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)^no[,.:]?\s",
        r"(?i)\beso no\b",
        r"(?i)\bno es correcto\b",
        r"(?i)\bthat'?s (not right|wrong|incorrect)\b",
        r"(?i)\bnot correct\b",
        r"(?i)^(en realidad|actually)\b",
        r"(?i)\b(debería ser|debe ser|should be)\b",
        r"(?i)\bno funciona así\b",
        r"(?i)\bdoesn'?t work (like )?that\b",
        r"(?i)^(siempre|nunca|always|never)\b",
        r"(?i)\b(en vez de|instead of)\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("correction pattern is valid"))
    .collect()
});

/// Kind of memory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryType {
    Correction,
    Pattern,
}

impl MemoryType {
    fn as_str(self) -> &'static str {
        match self {
            MemoryType::Correction => "Correccion",
            MemoryType::Pattern => "Patron",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "Correccion" => Some(MemoryType::Correction),
            "Patron" => Some(MemoryType::Pattern),
            _ => None,
        }
    }
}

/// One persisted memory entry.
#[derive(Debug, Clone)]
pub struct MemoryEntry {
    pub date: NaiveDate,
    pub entry_type: MemoryType,
    pub content: String,
}

/// Durable per-workspace notes auto-extracted from user corrections.
///
/// Backed by an append-only `.architect/memory.md`; entries are deduplicated
/// by content and reloaded on open.
pub struct ProceduralMemory {
    memory_path: PathBuf,
    entries: Vec<MemoryEntry>,
}

impl ProceduralMemory {
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        let memory_path = workspace_root.into().join(".architect").join("memory.md");
        let mut memory = Self {
            memory_path,
            entries: Vec::new(),
        };
        memory.load();
        memory
    }

    pub fn memory_path(&self) -> &std::path::Path {
        &self.memory_path
    }

    pub fn entries(&self) -> &[MemoryEntry] {
        &self.entries
    }

    /// Parse existing entries of form `- [YYYY-MM-DD] Type: content`.
    fn load(&mut self) {
        let Ok(raw) = std::fs::read_to_string(&self.memory_path) else {
            return;
        };
        static ENTRY_RE: LazyLock<Regex> = LazyLock::new(|| {
            Regex::new(r"^- \[(\d{4}-\d{2}-\d{2})\] (\w+): (.+)$").expect("entry regex is valid")
        });
        for line in raw.lines() {
            let Some(captures) = ENTRY_RE.captures(line) else {
                continue;
            };
            let Ok(date) = captures[1].parse::<NaiveDate>() else {
                continue;
            };
            let Some(entry_type) = MemoryType::parse(&captures[2]) else {
                debug!("skipping memory entry with unknown type: {}", line);
                continue;
            };
            self.entries.push(MemoryEntry {
                date,
                entry_type,
                content: captures[3].to_string(),
            });
        }
    }

    pub fn add_correction(&mut self, content: &str) -> Result<bool> {
        self.add_entry(MemoryType::Correction, content)
    }

    pub fn add_pattern(&mut self, content: &str) -> Result<bool> {
        self.add_entry(MemoryType::Pattern, content)
    }

    /// Append one entry, deduplicated by content. Returns whether it was new.
    fn add_entry(&mut self, entry_type: MemoryType, content: &str) -> Result<bool> {
        let content = content.trim();
        if content.is_empty() {
            return Ok(false);
        }
        if self.entries.iter().any(|e| e.content == content) {
            debug!("memory entry already present, skipping");
            return Ok(false);
        }

        let entry = MemoryEntry {
            date: chrono::Utc::now().date_naive(),
            entry_type,
            content: content.to_string(),
        };

        if let Some(parent) = self.memory_path.parent() {
            std::fs::create_dir_all(parent).context("failed to create .architect directory")?;
        }
        let mut file_content = if self.memory_path.is_file() {
            std::fs::read_to_string(&self.memory_path).unwrap_or_default()
        } else {
            String::new()
        };
        if file_content.is_empty() {
            file_content.push_str(MEMORY_HEADER);
            file_content.push('\n');
        }
        if !file_content.ends_with('\n') {
            file_content.push('\n');
        }
        file_content.push_str(&format!(
            "- [{}] {}: {}\n",
            entry.date.format("%Y-%m-%d"),
            entry.entry_type.as_str(),
            entry.content
        ));
        std::fs::write(&self.memory_path, file_content).context("failed to write memory file")?;

        self.entries.push(entry);
        Ok(true)
    }

    /// Memory file content for system-prompt injection; empty when there is
    /// nothing remembered.
    pub fn get_context(&self) -> String {
        match std::fs::read_to_string(&self.memory_path) {
            Ok(content) if !content.trim().is_empty() => content,
            _ => String::new(),
        }
    }

    /// Detect whether a user message is a correction. Returns the content to
    /// remember, truncated to [`MAX_CONTENT_CHARS`].
    pub fn detect_correction(&self, text: &str) -> Option<String> {
        let trimmed = text.trim();
        if trimmed.is_empty() || trimmed.ends_with('?') {
            return None;
        }
        if !CORRECTION_PATTERNS.iter().any(|re| re.is_match(trimmed)) {
            return None;
        }
        let content = if trimmed.chars().count() > MAX_CONTENT_CHARS {
            let truncated: String = trimmed.chars().take(MAX_CONTENT_CHARS).collect();
            format!("{}...", truncated)
        } else {
            trimmed.to_string()
        };
        Some(content)
    }

    /// Scan a finished conversation for user corrections and persist them.
    ///
    /// The first user message is the task prompt, never a correction.
    pub fn analyze_session(&mut self, messages: &[Message]) -> Vec<String> {
        let mut detected = Vec::new();
        let mut seen_first_user = false;
        for message in messages {
            if message.role != "user" {
                continue;
            }
            if !seen_first_user {
                seen_first_user = true;
                continue;
            }
            if let Some(correction) = self.detect_correction(&message.content) {
                match self.add_correction(&correction) {
                    Ok(_) => detected.push(correction),
                    Err(e) => warn!("failed to persist correction: {}", e),
                }
            }
        }
        detected
    }
}
