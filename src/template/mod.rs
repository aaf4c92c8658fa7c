//! Named text templates with variable substitution
//!
//! One `.md` file per template under the templates directory, plus a JSON
//! metadata sidecar carrying description, category, extracted variables
//! and timestamps. Variables are `{{name}}` (inner whitespace allowed);
//! unprovided ones fall through to a date/time default map.

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::{DateTime, Local, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::{NxError, Result};
use crate::note::Note;
use crate::time;

static VARIABLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{([^}]+)\}\}").expect("variable regex"));
static HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^#\s+(.+)$").expect("heading regex"));
static WORD_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\w+").expect("word regex"));

/// Caller-supplied variable assignments
pub type VariableMap = HashMap<String, String>;

/// Template metadata
#[derive(Debug, Clone)]
pub struct TemplateInfo {
    pub name: String,
    pub description: String,
    pub category: String,
    /// Distinct variables in declaration order
    pub variables: Vec<String>,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    pub path: PathBuf,
}

/// Outcome of processing a template
#[derive(Debug, Clone)]
pub struct TemplateOutput {
    pub content: String,
    pub title: String,
    pub tags: Vec<String>,
    pub notebook: Option<String>,
}

/// Sidecar record persisted per template
#[derive(Debug, Serialize, Deserialize)]
struct SidecarEntry {
    description: String,
    category: String,
    variables: Vec<String>,
    created: i64,
    modified: i64,
}

/// Manages the template directory and its metadata sidecar
pub struct TemplateManager {
    templates_dir: PathBuf,
    metadata_path: PathBuf,
    cache: HashMap<String, TemplateInfo>,
    cache_valid: bool,
}

impl TemplateManager {
    /// Create a manager over a templates directory
    ///
    /// The metadata sidecar lives at `<templates_dir>/templates.json`.
    pub fn new(templates_dir: impl Into<PathBuf>) -> Self {
        let templates_dir = templates_dir.into();
        let metadata_path = templates_dir.join("templates.json");
        TemplateManager {
            templates_dir,
            metadata_path,
            cache: HashMap::new(),
            cache_valid: false,
        }
    }

    /// Create a new template
    pub fn create(
        &mut self,
        name: &str,
        content: &str,
        description: &str,
        category: &str,
    ) -> Result<()> {
        if name.is_empty() {
            return Err(NxError::Validation("template name cannot be empty".into()));
        }
        let name = sanitize_name(name);

        let path = self.template_path(&name);
        if path.exists() {
            return Err(NxError::Validation(format!(
                "template already exists: {}",
                name
            )));
        }

        validate_template(content)?;
        self.ensure_dir()?;
        write_atomic(&path, content)?;

        let now = time::now_millis();
        self.load_cache()?;
        self.cache.insert(
            name.clone(),
            TemplateInfo {
                name,
                description: description.to_string(),
                category: if category.is_empty() {
                    "default".to_string()
                } else {
                    category.to_string()
                },
                variables: extract_variables(content),
                created: now,
                modified: now,
                path,
            },
        );
        self.save_metadata()
    }

    /// Raw template content
    pub fn get(&self, name: &str) -> Result<String> {
        let path = self.template_path(name);
        if !path.exists() {
            return Err(NxError::not_found("template", name));
        }
        fs::read_to_string(&path).map_err(|e| NxError::file_read(&path, e))
    }

    /// Template metadata
    pub fn get_info(&mut self, name: &str) -> Result<TemplateInfo> {
        self.load_cache()?;
        self.cache
            .get(name)
            .cloned()
            .ok_or_else(|| NxError::not_found("template", name))
    }

    /// Templates sorted by name, optionally restricted to a category
    pub fn list(&mut self, category: Option<&str>) -> Result<Vec<TemplateInfo>> {
        self.load_cache()?;
        let mut templates: Vec<TemplateInfo> = self
            .cache
            .values()
            .filter(|info| category.map_or(true, |c| info.category == c))
            .cloned()
            .collect();
        templates.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(templates)
    }

    /// Replace a template's content
    pub fn update(&mut self, name: &str, content: &str) -> Result<()> {
        let path = self.template_path(name);
        if !path.exists() {
            return Err(NxError::not_found("template", name));
        }

        validate_template(content)?;
        write_atomic(&path, content)?;

        self.load_cache()?;
        if let Some(info) = self.cache.get_mut(name) {
            info.variables = extract_variables(content);
            info.modified = time::now_millis();
        }
        self.save_metadata()
    }

    /// Delete a template and its metadata
    pub fn delete(&mut self, name: &str) -> Result<()> {
        let path = self.template_path(name);
        if !path.exists() {
            return Err(NxError::not_found("template", name));
        }
        fs::remove_file(&path).map_err(|e| NxError::file_write(&path, e))?;

        self.load_cache()?;
        self.cache.remove(name);
        self.save_metadata()
    }

    /// Distinct categories, sorted
    pub fn list_categories(&mut self) -> Result<Vec<String>> {
        self.load_cache()?;
        let categories: BTreeSet<String> =
            self.cache.values().map(|info| info.category.clone()).collect();
        Ok(categories.into_iter().collect())
    }

    /// Reassign a template's category
    pub fn set_category(&mut self, name: &str, category: &str) -> Result<()> {
        self.load_cache()?;
        let info = self
            .cache
            .get_mut(name)
            .ok_or_else(|| NxError::not_found("template", name))?;
        info.category = category.to_string();
        self.save_metadata()
    }

    /// Case-insensitive substring search over names and descriptions
    pub fn search(&mut self, query: &str) -> Result<Vec<TemplateInfo>> {
        let needle = query.to_lowercase();
        Ok(self
            .list(None)?
            .into_iter()
            .filter(|info| {
                info.name.to_lowercase().contains(&needle)
                    || info.description.to_lowercase().contains(&needle)
            })
            .collect())
    }

    /// Render a template with the given variables
    pub fn process(&mut self, name: &str, variables: &VariableMap) -> Result<TemplateOutput> {
        let content = self.get(name)?;

        let mut merged = default_variables();
        for (key, value) in variables {
            merged.insert(key.clone(), value.clone());
        }

        let rendered = process_variables(&content, &merged);

        let title = merged
            .get("title")
            .cloned()
            .or_else(|| {
                HEADING_RE
                    .captures(&rendered)
                    .map(|caps| caps[1].trim().to_string())
            })
            .unwrap_or_else(|| "New Note from Template".to_string());

        let tags = merged
            .get("tags")
            .map(|tags_str| {
                WORD_RE
                    .find_iter(tags_str)
                    .map(|m| m.as_str().to_string())
                    .collect()
            })
            .unwrap_or_default();

        Ok(TemplateOutput {
            content: rendered,
            title,
            tags,
            notebook: merged.get("notebook").cloned(),
        })
    }

    /// Render a template into a fresh note
    pub fn create_note_from_template(
        &mut self,
        name: &str,
        variables: &VariableMap,
    ) -> Result<Note> {
        let output = self.process(name, variables)?;

        let mut note = Note::create(output.title, output.content);
        if !output.tags.is_empty() {
            note.set_tags(output.tags);
        }
        if let Some(notebook) = output.notebook {
            note.set_notebook(notebook);
        }
        Ok(note)
    }

    /// Install the built-in catalog, skipping templates that already exist
    pub fn install_builtins(&mut self) -> Result<()> {
        for builtin in BUILTIN_TEMPLATES {
            if !self.template_path(builtin.name).exists() {
                if let Err(e) =
                    self.create(builtin.name, builtin.content, builtin.description, builtin.category)
                {
                    tracing::warn!(name = builtin.name, error = %e, "failed to install builtin template");
                }
            }
        }
        Ok(())
    }

    fn template_path(&self, name: &str) -> PathBuf {
        self.templates_dir.join(format!("{}.md", name))
    }

    fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.templates_dir).map_err(|e| NxError::DirectoryCreate {
            path: self.templates_dir.clone(),
            reason: e.to_string(),
        })
    }

    /// Scan template files, then overlay the sidecar's metadata
    fn load_cache(&mut self) -> Result<()> {
        if self.cache_valid {
            return Ok(());
        }
        self.cache.clear();

        if self.templates_dir.exists() {
            for entry in fs::read_dir(&self.templates_dir)
                .map_err(|e| NxError::file_read(&self.templates_dir, e))?
                .filter_map(|e| e.ok())
            {
                let path = entry.path();
                if !path.extension().is_some_and(|e| e == "md") {
                    continue;
                }
                let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                    continue;
                };

                let variables = fs::read_to_string(&path)
                    .map(|content| extract_variables(&content))
                    .unwrap_or_default();
                let file_time: DateTime<Utc> = fs::metadata(&path)
                    .and_then(|m| m.modified())
                    .map(DateTime::from)
                    .unwrap_or_else(|_| time::now_millis());

                self.cache.insert(
                    name.to_string(),
                    TemplateInfo {
                        name: name.to_string(),
                        description: String::new(),
                        category: "default".to_string(),
                        variables,
                        created: file_time,
                        modified: file_time,
                        path,
                    },
                );
            }

            if self.metadata_path.exists() {
                let raw = fs::read_to_string(&self.metadata_path)
                    .map_err(|e| NxError::file_read(&self.metadata_path, e))?;
                if let Ok(sidecar) =
                    serde_json::from_str::<HashMap<String, SidecarEntry>>(&raw)
                {
                    for (name, entry) in sidecar {
                        if let Some(info) = self.cache.get_mut(&name) {
                            info.description = entry.description;
                            info.category = entry.category;
                        }
                    }
                }
            }
        }

        self.cache_valid = true;
        Ok(())
    }

    fn save_metadata(&mut self) -> Result<()> {
        self.ensure_dir()?;

        let sidecar: HashMap<&String, SidecarEntry> = self
            .cache
            .iter()
            .map(|(name, info)| {
                (
                    name,
                    SidecarEntry {
                        description: info.description.clone(),
                        category: info.category.clone(),
                        variables: info.variables.clone(),
                        created: info.created.timestamp(),
                        modified: info.modified.timestamp(),
                    },
                )
            })
            .collect();

        let json = serde_json::to_string_pretty(&sidecar)?;
        write_atomic(&self.metadata_path, &json)?;
        self.cache_valid = true;
        Ok(())
    }
}

fn write_atomic(path: &Path, content: &str) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| NxError::file_write(path, "no parent directory"))?;
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| NxError::file_write(path, e))?;
    tmp.write_all(content.as_bytes())
        .map_err(|e| NxError::file_write(path, e))?;
    tmp.persist(path)
        .map_err(|e| NxError::file_write(path, e.error))?;
    Ok(())
}

/// Template is non-empty and every `{{` has its `}}`
pub fn validate_template(content: &str) -> Result<()> {
    if content.is_empty() {
        return Err(NxError::Validation("template content cannot be empty".into()));
    }

    let mut depth: i32 = 0;
    let bytes = content.as_bytes();
    let mut i = 0;
    while i + 1 < bytes.len() {
        if bytes[i] == b'{' && bytes[i + 1] == b'{' {
            depth += 1;
            i += 2;
        } else if bytes[i] == b'}' && bytes[i + 1] == b'}' {
            depth -= 1;
            if depth < 0 {
                return Err(NxError::Validation(
                    "template contains unmatched closing braces '}}'".into(),
                ));
            }
            i += 2;
        } else {
            i += 1;
        }
    }

    if depth > 0 {
        return Err(NxError::Validation(
            "template contains unmatched opening braces '{{'".into(),
        ));
    }
    Ok(())
}

/// Distinct `{{variable}}` names in declaration order, whitespace stripped
pub fn extract_variables(content: &str) -> Vec<String> {
    let mut variables = Vec::new();
    for caps in VARIABLE_RE.captures_iter(content) {
        let name: String = caps[1].chars().filter(|c| !c.is_whitespace()).collect();
        if !name.is_empty() && !variables.contains(&name) {
            variables.push(name);
        }
    }
    variables
}

/// Replace every `{{name}}` and `{{ name }}` with the mapped value
pub fn process_variables(content: &str, variables: &VariableMap) -> String {
    let mut result = content.to_string();
    for (name, value) in variables {
        result = result.replace(&format!("{{{{{}}}}}", name), value);
        result = result.replace(&format!("{{{{ {} }}}}", name), value);
    }
    result
}

/// Date/time defaults available to every template, at local time
pub fn default_variables() -> VariableMap {
    let now = Local::now();
    let mut defaults = VariableMap::new();
    defaults.insert("date".into(), now.format("%Y-%m-%d").to_string());
    defaults.insert("datetime".into(), now.format("%Y-%m-%d %H:%M").to_string());
    defaults.insert("time".into(), now.format("%H:%M").to_string());
    defaults.insert("date_full".into(), now.format("%A, %B %d, %Y").to_string());
    defaults.insert("year".into(), now.format("%Y").to_string());
    defaults.insert("month".into(), now.format("%-m").to_string());
    defaults.insert("day".into(), now.format("%-d").to_string());
    defaults
}

/// Lowercase; anything but alphanumerics, `-` and `_` becomes `_`
fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}

struct BuiltinTemplate {
    name: &'static str,
    content: &'static str,
    description: &'static str,
    category: &'static str,
}

const BUILTIN_TEMPLATES: &[BuiltinTemplate] = &[
    BuiltinTemplate {
        name: "basic",
        content: "# {{title}}\n\n{{content}}\n\nCreated: {{date}}\nTags: {{tags}}",
        description: "Basic note template with title and content",
        category: "basic",
    },
    BuiltinTemplate {
        name: "meeting",
        content: "# Meeting: {{title}}\n\n**Date:** {{date}}  \n**Time:** {{time}}  \n**Attendees:** {{attendees}}\n\n## Agenda\n{{agenda}}\n\n## Discussion\n\n## Action Items\n- [ ] \n\n## Next Steps\n\n---\nTags: {{tags}}, meeting",
        description: "Meeting notes template",
        category: "work",
    },
    BuiltinTemplate {
        name: "daily",
        content: "# Daily Note - {{date_full}}\n\n## Today's Goals\n- \n\n## Completed Tasks\n- \n\n## Notes\n\n\n## Tomorrow's Priorities\n- \n\n---\nTags: daily, {{date}}",
        description: "Daily journal template",
        category: "journal",
    },
    BuiltinTemplate {
        name: "project",
        content: "# Project: {{title}}\n\n## Overview\n{{description}}\n\n## Goals\n- \n\n## Timeline\n- **Start Date:** {{start_date}}\n- **Target Date:** {{target_date}}\n\n## Resources\n- \n\n## Progress Log\n\n### {{date}}\n- Project created\n\n## Notes\n\n\n---\nTags: {{tags}}, project",
        description: "Project planning template",
        category: "work",
    },
    BuiltinTemplate {
        name: "book-review",
        content: "# Book Review: {{title}}\n\n**Author:** {{author}}  \n**Genre:** {{genre}}  \n**Rating:** {{rating}}/5  \n**Date Finished:** {{date}}\n\n## Summary\n\n\n## Key Takeaways\n- \n\n## Quotes\n\n\n## My Thoughts\n\n\n---\nTags: {{tags}}, book-review, reading",
        description: "Book review template",
        category: "review",
    },
];

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn manager_in(dir: &Path) -> TemplateManager {
        TemplateManager::new(dir.join("templates"))
    }

    #[test]
    fn test_create_get_update_delete() {
        let dir = tempdir().unwrap();
        let mut manager = manager_in(dir.path());

        manager
            .create("note", "# {{title}}\n\n{{body}}", "simple", "default")
            .unwrap();
        assert_eq!(manager.get("note").unwrap(), "# {{title}}\n\n{{body}}");

        let info = manager.get_info("note").unwrap();
        assert_eq!(info.variables, ["title", "body"]);
        assert_eq!(info.description, "simple");

        manager.update("note", "# {{title}} only").unwrap();
        let info = manager.get_info("note").unwrap();
        assert_eq!(info.variables, ["title"]);

        manager.delete("note").unwrap();
        assert_eq!(manager.get("note").unwrap_err().kind(), "not_found");
    }

    #[test]
    fn test_duplicate_create_rejected() {
        let dir = tempdir().unwrap();
        let mut manager = manager_in(dir.path());

        manager.create("dup", "content", "", "").unwrap();
        assert_eq!(
            manager.create("dup", "content", "", "").unwrap_err().kind(),
            "validation_error"
        );
    }

    #[test]
    fn test_metadata_survives_reload() {
        let dir = tempdir().unwrap();
        let mut manager = manager_in(dir.path());
        manager
            .create("kept", "{{x}}", "remembered description", "special")
            .unwrap();

        let mut fresh = manager_in(dir.path());
        let info = fresh.get_info("kept").unwrap();
        assert_eq!(info.description, "remembered description");
        assert_eq!(info.category, "special");
    }

    #[test]
    fn test_list_and_categories() {
        let dir = tempdir().unwrap();
        let mut manager = manager_in(dir.path());
        manager.create("b-work", "x", "", "work").unwrap();
        manager.create("a-work", "y", "", "work").unwrap();
        manager.create("journal", "z", "", "journal").unwrap();

        let all = manager.list(None).unwrap();
        let names: Vec<&str> = all.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, ["a-work", "b-work", "journal"]);

        let work = manager.list(Some("work")).unwrap();
        assert_eq!(work.len(), 2);

        assert_eq!(
            manager.list_categories().unwrap(),
            ["journal".to_string(), "work".to_string()]
        );

        manager.set_category("journal", "personal").unwrap();
        assert_eq!(manager.get_info("journal").unwrap().category, "personal");
    }

    #[test]
    fn test_search_templates() {
        let dir = tempdir().unwrap();
        let mut manager = manager_in(dir.path());
        manager
            .create("meeting", "x", "Meeting notes layout", "work")
            .unwrap();
        manager.create("recipe", "y", "Cooking", "home").unwrap();

        let hits = manager.search("meeting").unwrap();
        assert_eq!(hits.len(), 1);
        let hits = manager.search("COOK").unwrap();
        assert_eq!(hits.len(), 1);
        assert!(manager.search("absent").unwrap().is_empty());
    }

    #[test]
    fn test_extract_variables() {
        let vars = extract_variables("{{title}} and {{ spaced }} and {{title}} again");
        assert_eq!(vars, ["title", "spaced"]);
        assert!(extract_variables("no variables here").is_empty());
    }

    #[test]
    fn test_validate_template_balance() {
        assert!(validate_template("plain").is_ok());
        assert!(validate_template("{{ok}}").is_ok());
        assert!(validate_template("").is_err());
        assert!(validate_template("{{open").is_err());
        assert!(validate_template("close}}").is_err());
    }

    #[test]
    fn test_process_variables_with_defaults() {
        let dir = tempdir().unwrap();
        let mut manager = manager_in(dir.path());
        manager
            .create(
                "report",
                "# {{title}}\n\nBy {{author}} on {{ date }}",
                "",
                "",
            )
            .unwrap();

        let mut vars = VariableMap::new();
        vars.insert("title".into(), "X".into());
        vars.insert("author".into(), "Y".into());

        let output = manager.process("report", &vars).unwrap();
        let today = Local::now().format("%Y-%m-%d").to_string();
        assert_eq!(output.content, format!("# X\n\nBy Y on {}", today));
        assert_eq!(output.title, "X");
    }

    #[test]
    fn test_substitution_only_removes_variables() {
        let template = "{{title}} {{unassigned_var}}";
        let mut vars = default_variables();
        vars.insert("title".into(), "T".into());

        let before = extract_variables(template);
        let rendered = process_variables(template, &vars);
        let after = extract_variables(&rendered);
        for var in &after {
            assert!(before.contains(var));
        }
    }

    #[test]
    fn test_title_fallbacks() {
        let dir = tempdir().unwrap();
        let mut manager = manager_in(dir.path());

        manager.create("headed", "# The Heading\n\nBody", "", "").unwrap();
        let output = manager.process("headed", &VariableMap::new()).unwrap();
        assert_eq!(output.title, "The Heading");

        manager.create("bare", "Just a body", "", "").unwrap();
        let output = manager.process("bare", &VariableMap::new()).unwrap();
        assert_eq!(output.title, "New Note from Template");
    }

    #[test]
    fn test_create_note_from_template() {
        let dir = tempdir().unwrap();
        let mut manager = manager_in(dir.path());
        manager
            .create("tagged", "# {{title}}\n\nBody", "", "")
            .unwrap();

        let mut vars = VariableMap::new();
        vars.insert("title".into(), "Note Title".into());
        vars.insert("tags".into(), "alpha, beta;gamma".into());
        vars.insert("notebook".into(), "inbox".into());

        let note = manager.create_note_from_template("tagged", &vars).unwrap();
        assert_eq!(note.title(), "Note Title");
        assert_eq!(note.tags(), ["alpha", "beta", "gamma"]);
        assert_eq!(note.notebook(), Some("inbox"));
        assert!(note.validate().is_ok());
    }

    #[test]
    fn test_install_builtins_idempotent() {
        let dir = tempdir().unwrap();
        let mut manager = manager_in(dir.path());

        manager.install_builtins().unwrap();
        let first = manager.list(None).unwrap();
        assert_eq!(first.len(), 5);
        let names: Vec<&str> = first.iter().map(|i| i.name.as_str()).collect();
        assert!(names.contains(&"basic"));
        assert!(names.contains(&"book-review"));

        manager.install_builtins().unwrap();
        assert_eq!(manager.list(None).unwrap().len(), 5);
    }

    #[test]
    fn test_sanitized_names() {
        let dir = tempdir().unwrap();
        let mut manager = manager_in(dir.path());
        manager.create("My Template!", "x", "", "").unwrap();
        assert!(manager.get("my_template_").is_ok());
    }
}
