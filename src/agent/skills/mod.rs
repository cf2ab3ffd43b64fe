use glob::Pattern;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};


/// Project instruction files, in priority order. The first that exists wins.
const PROJECT_CONTEXT_FILES: &[&str] = &[".architect.md", "AGENTS.md", "CLAUDE.md"];

/// Where a skill was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkillSource {
    Local,
    Installed,
}

impl SkillSource {
    pub fn as_str(self) -> &'static str {
        match self {
            SkillSource::Local => "local",
            SkillSource::Installed => "installed",
        }
    }
}

/// One discovered skill: front-matter metadata plus its body.
#[derive(Debug, Clone)]
pub struct SkillInfo {
    pub name: String,
    pub description: String,
    /// Globs matched against the active-file set. Empty means the skill
    /// never auto-activates.
    pub globs: Vec<String>,
    pub content: String,
    pub source: SkillSource,
}

/// Discovers workspace skills and the project instruction document.
pub struct SkillsLoader {
    workspace_root: PathBuf,
    skills: Vec<SkillInfo>,
    project_context: Option<String>,
}

impl SkillsLoader {
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            skills: Vec::new(),
            project_context: None,
        }
    }

    /// Load the first existing project instruction file, caching the result.
    pub fn load_project_context(&mut self) -> Option<String> {
        if self.project_context.is_none() {
            for name in PROJECT_CONTEXT_FILES {
                let path = self.workspace_root.join(name);
                if path.is_file() {
                    match std::fs::read_to_string(&path) {
                        Ok(content) => {
                            debug!("loaded project context from {}", name);
                            self.project_context = Some(content);
                            break;
                        }
                        Err(e) => warn!("failed to read {}: {}", name, e),
                    }
                }
            }
        }
        self.project_context.clone()
    }

    /// Scan `.architect/skills/` and `.architect/installed-skills/` for
    /// `SKILL.md` files. Local skills shadow installed ones with the same name.
    pub fn discover_skills(&mut self) -> &[SkillInfo] {
        self.skills.clear();
        let roots = [
            (
                self.workspace_root.join(".architect").join("skills"),
                SkillSource::Local,
            ),
            (
                self.workspace_root.join(".architect").join("installed-skills"),
                SkillSource::Installed,
            ),
        ];
        for (root, source) in roots {
            let Ok(read_dir) = std::fs::read_dir(&root) else {
                continue;
            };
            let mut entries: Vec<_> = read_dir.flatten().collect();
            entries.sort_by_key(std::fs::DirEntry::file_name);
            for entry in entries {
                let skill_file = entry.path().join("SKILL.md");
                if !skill_file.is_file() {
                    continue;
                }
                let Ok(raw) = std::fs::read_to_string(&skill_file) else {
                    warn!("failed to read {}", skill_file.display());
                    continue;
                };
                let dir_name = entry.file_name().to_string_lossy().to_string();
                if self.skills.iter().any(|s| s.name == dir_name) {
                    continue;
                }
                self.skills.push(parse_skill(&dir_name, &raw, source));
            }
        }
        &self.skills
    }

    pub fn skills(&self) -> &[SkillInfo] {
        &self.skills
    }

    /// Skills whose globs match any of the active workspace-relative paths.
    pub fn relevant_skills(&self, active_files: &[String]) -> Vec<&SkillInfo> {
        self.skills
            .iter()
            .filter(|skill| {
                skill.globs.iter().any(|raw| {
                    let Ok(pattern) = Pattern::new(raw) else {
                        warn!("skill '{}' has invalid glob '{}'", skill.name, raw);
                        return false;
                    };
                    active_files.iter().any(|file| {
                        let file_name = Path::new(file)
                            .file_name()
                            .map(|n| n.to_string_lossy().to_string())
                            .unwrap_or_default();
                        pattern.matches(file) || pattern.matches(&file_name)
                    })
                })
            })
            .collect()
    }
}

/// Parse a SKILL.md: optional YAML front matter (`name`, `description`,
/// `globs`), body after it. A file without front matter is still a valid
/// skill named after its directory.
fn parse_skill(dir_name: &str, raw: &str, source: SkillSource) -> SkillInfo {
    let (front_matter, body) = split_front_matter(raw);

    let meta: Option<Value> = front_matter.and_then(|yaml| {
        serde_yaml_ng::from_str(yaml)
            .map_err(|e| debug!("skill '{}' front matter ignored: {}", dir_name, e))
            .ok()
    });

    let get_str = |key: &str| {
        meta.as_ref()
            .and_then(|m| m.get(key))
            .and_then(Value::as_str)
            .map(ToString::to_string)
    };

    let globs = meta
        .as_ref()
        .and_then(|m| m.get("globs"))
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(Value::as_str)
                .map(ToString::to_string)
                .collect()
        })
        .unwrap_or_default();

    SkillInfo {
        name: get_str("name").unwrap_or_else(|| dir_name.to_string()),
        description: get_str("description").unwrap_or_default(),
        globs,
        content: body.trim().to_string(),
        source,
    }
}

/// Split `---\n<yaml>\n---\n<body>`; returns `(None, whole)` without front matter.
fn split_front_matter(raw: &str) -> (Option<&str>, &str) {
    let Some(rest) = raw.strip_prefix("---") else {
        return (None, raw);
    };
    let Some(end) = rest.find("\n---") else {
        return (None, raw);
    };
    let yaml = rest[..end].trim();
    let after = &rest[end + 4..];
    let body = after.strip_prefix('\n').unwrap_or(after);
    (Some(yaml), body)
}
