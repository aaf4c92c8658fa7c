//! Note metadata and its YAML front-matter representation

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{NxError, Result};
use crate::id::NoteId;
use crate::time;

const MAX_TITLE_LEN: usize = 200;
const MAX_TAG_LEN: usize = 50;
const MAX_NOTEBOOK_LEN: usize = 50;
const MAX_CUSTOM_KEY_LEN: usize = 50;
const MAX_CUSTOM_VALUE_LEN: usize = 1000;

/// Per-note attributes carried in the YAML front-matter
///
/// Fields are private; mutating setters bump `updated` through `touch()`
/// and keep tags and links deduplicated and sorted.
#[derive(Debug, Clone, PartialEq)]
pub struct Metadata {
    id: NoteId,
    title: String,
    created: DateTime<Utc>,
    updated: DateTime<Utc>,
    tags: Vec<String>,
    notebook: Option<String>,
    links: Vec<NoteId>,
    custom_fields: BTreeMap<String, String>,
}

impl Metadata {
    /// Create metadata with a given id and title, stamped now
    pub fn new(id: NoteId, title: impl Into<String>) -> Self {
        let now = time::now_millis();
        Metadata {
            id,
            title: title.into(),
            created: now,
            updated: now,
            tags: Vec::new(),
            notebook: None,
            links: Vec::new(),
            custom_fields: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> &NoteId {
        &self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    pub fn updated(&self) -> DateTime<Utc> {
        self.updated
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn notebook(&self) -> Option<&str> {
        self.notebook.as_deref()
    }

    pub fn links(&self) -> &[NoteId] {
        &self.links
    }

    pub fn custom_fields(&self) -> &BTreeMap<String, String> {
        &self.custom_fields
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
        self.touch();
    }

    /// Raw timestamp assignment; used by the importer and the parser
    pub fn set_created(&mut self, created: DateTime<Utc>) {
        self.created = time::truncate_millis(created);
    }

    /// Raw timestamp assignment; used by the importer and the parser
    pub fn set_updated(&mut self, updated: DateTime<Utc>) {
        self.updated = time::truncate_millis(updated);
    }

    pub fn set_tags(&mut self, tags: Vec<String>) {
        self.tags = tags;
        self.tags.sort();
        self.tags.dedup();
        self.touch();
    }

    pub fn add_tag(&mut self, tag: impl Into<String>) {
        let tag = tag.into();
        if !self.has_tag(&tag) {
            self.tags.push(tag);
            self.tags.sort();
            self.touch();
        }
    }

    pub fn remove_tag(&mut self, tag: &str) {
        if let Some(pos) = self.tags.iter().position(|t| t == tag) {
            self.tags.remove(pos);
            self.touch();
        }
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// Set the notebook; an empty name clears it
    pub fn set_notebook(&mut self, notebook: impl Into<String>) {
        let notebook = notebook.into();
        self.notebook = if notebook.is_empty() {
            None
        } else {
            Some(notebook)
        };
        self.touch();
    }

    pub fn clear_notebook(&mut self) {
        self.notebook = None;
        self.touch();
    }

    pub fn set_links(&mut self, links: Vec<NoteId>) {
        self.links = links;
        self.links.sort();
        self.links.dedup();
        self.touch();
    }

    pub fn add_link(&mut self, link: NoteId) {
        if !self.has_link(&link) {
            self.links.push(link);
            self.links.sort();
            self.touch();
        }
    }

    pub fn remove_link(&mut self, link: &NoteId) {
        if let Some(pos) = self.links.iter().position(|l| l == link) {
            self.links.remove(pos);
            self.touch();
        }
    }

    pub fn has_link(&self, link: &NoteId) -> bool {
        self.links.contains(link)
    }

    pub fn set_custom_field(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.custom_fields.insert(key.into(), value.into());
        self.touch();
    }

    pub fn custom_field(&self, key: &str) -> Option<&str> {
        self.custom_fields.get(key).map(String::as_str)
    }

    pub fn remove_custom_field(&mut self, key: &str) {
        if self.custom_fields.remove(key).is_some() {
            self.touch();
        }
    }

    /// Advance `updated` to now
    pub fn touch(&mut self) {
        self.updated = time::now_millis();
    }

    /// Check every metadata rule; the first violation wins
    pub fn validate(&self) -> Result<()> {
        if self.title.is_empty() {
            return Err(NxError::Validation("title cannot be empty".into()));
        }
        if self.title.len() > MAX_TITLE_LEN {
            return Err(NxError::Validation(format!(
                "title too long (max {} characters)",
                MAX_TITLE_LEN
            )));
        }

        for tag in &self.tags {
            if tag.is_empty() {
                return Err(NxError::Validation("tag cannot be empty".into()));
            }
            if tag.len() > MAX_TAG_LEN {
                return Err(NxError::Validation(format!(
                    "tag too long (max {} characters)",
                    MAX_TAG_LEN
                )));
            }
            if tag.chars().any(char::is_whitespace) {
                return Err(NxError::Validation(format!(
                    "tag cannot contain whitespace: {}",
                    tag
                )));
            }
        }

        if let Some(notebook) = &self.notebook {
            if notebook.len() > MAX_NOTEBOOK_LEN {
                return Err(NxError::Validation(format!(
                    "notebook name too long (max {} characters)",
                    MAX_NOTEBOOK_LEN
                )));
            }
        }

        for (key, value) in &self.custom_fields {
            if key.is_empty() {
                return Err(NxError::Validation("custom field key cannot be empty".into()));
            }
            if key.len() > MAX_CUSTOM_KEY_LEN {
                return Err(NxError::Validation(format!(
                    "custom field key too long (max {} characters)",
                    MAX_CUSTOM_KEY_LEN
                )));
            }
            if value.len() > MAX_CUSTOM_VALUE_LEN {
                return Err(NxError::Validation(format!(
                    "custom field value too long (max {} characters)",
                    MAX_CUSTOM_VALUE_LEN
                )));
            }
        }

        Ok(())
    }

    /// Serialize to the YAML front-matter block
    pub fn to_yaml(&self) -> Result<String> {
        let mirror = FrontMatter {
            id: self.id.to_string(),
            title: self.title.clone(),
            created: Some(time::to_rfc3339(self.created)),
            updated: Some(time::to_rfc3339(self.updated)),
            tags: self.tags.clone(),
            notebook: self.notebook.clone(),
            links: self.links.iter().map(NoteId::to_string).collect(),
            custom: self
                .custom_fields
                .iter()
                .map(|(k, v)| (k.clone(), serde_yaml::Value::String(v.clone())))
                .collect(),
        };
        Ok(serde_yaml::to_string(&mirror)?)
    }

    /// Parse front-matter YAML into validated metadata
    ///
    /// Malformed timestamps fall back to now, malformed link entries are
    /// skipped, non-scalar unknown keys are ignored. The parsed value never
    /// has `touch()` applied, so `updated` survives the round trip.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let mirror: FrontMatter = serde_yaml::from_str(yaml)
            .map_err(|e| NxError::Parse(format!("invalid front-matter: {}", e)))?;

        let id = NoteId::from_str(&mirror.id)
            .map_err(|_| NxError::Parse(format!("invalid note id in front-matter: {}", mirror.id)))?;

        let created = mirror
            .created
            .as_deref()
            .and_then(|s| time::parse_rfc3339(s).ok())
            .unwrap_or_else(time::now_millis);
        let updated = mirror
            .updated
            .as_deref()
            .and_then(|s| time::parse_rfc3339(s).ok())
            .unwrap_or_else(time::now_millis);

        let mut tags = mirror.tags;
        tags.sort();
        tags.dedup();

        let mut links: Vec<NoteId> = mirror
            .links
            .iter()
            .filter_map(|s| NoteId::from_str(s).ok())
            .collect();
        links.sort();
        links.dedup();

        let custom_fields = mirror
            .custom
            .into_iter()
            .filter_map(|(key, value)| scalar_to_string(&value).map(|v| (key, v)))
            .collect();

        let metadata = Metadata {
            id,
            title: mirror.title,
            created,
            updated,
            tags,
            notebook: mirror.notebook.filter(|n| !n.is_empty()),
            links,
            custom_fields,
        };

        metadata.validate()?;
        Ok(metadata)
    }
}

/// Typed serde mirror of the YAML front-matter
///
/// Standard fields serialize in declaration order; custom fields flatten
/// after them.
#[derive(Debug, Serialize, Deserialize)]
struct FrontMatter {
    id: String,
    title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    created: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    updated: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    notebook: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    links: Vec<String>,
    #[serde(flatten)]
    custom: BTreeMap<String, serde_yaml::Value>,
}

fn scalar_to_string(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Metadata {
        Metadata::new(NoteId::generate(), "Test Note")
    }

    #[test]
    fn test_setters_touch() {
        let mut meta = sample();
        let before = meta.updated();
        std::thread::sleep(std::time::Duration::from_millis(2));
        meta.set_title("Renamed");
        assert!(meta.updated() > before);
        assert!(meta.updated() >= meta.created());
    }

    #[test]
    fn test_tags_sorted_deduped() {
        let mut meta = sample();
        meta.set_tags(vec!["zebra".into(), "alpha".into(), "zebra".into()]);
        assert_eq!(meta.tags(), ["alpha", "zebra"]);

        meta.add_tag("beta");
        assert_eq!(meta.tags(), ["alpha", "beta", "zebra"]);
        meta.add_tag("beta");
        assert_eq!(meta.tags().len(), 3);

        meta.remove_tag("alpha");
        assert_eq!(meta.tags(), ["beta", "zebra"]);
    }

    #[test]
    fn test_links_sorted_deduped() {
        let mut meta = sample();
        let a: NoteId = "01AAAAAAAAAAAAAAAAAAAAAAAA".parse().unwrap();
        let b: NoteId = "01BBBBBBBBBBBBBBBBBBBBBBBB".parse().unwrap();
        meta.set_links(vec![b.clone(), a.clone(), b.clone()]);
        assert_eq!(meta.links(), [a.clone(), b.clone()]);
        assert!(meta.has_link(&a));
        meta.remove_link(&a);
        assert_eq!(meta.links(), [b]);
    }

    #[test]
    fn test_validation_rules() {
        let mut meta = sample();
        assert!(meta.validate().is_ok());

        meta.set_title("");
        assert!(matches!(meta.validate(), Err(NxError::Validation(_))));

        let mut meta = sample();
        meta.set_title("x".repeat(201));
        assert!(meta.validate().is_err());

        let mut meta = sample();
        meta.set_tags(vec!["has space".into()]);
        assert!(meta.validate().is_err());

        let mut meta = sample();
        meta.set_notebook("n".repeat(51));
        assert!(meta.validate().is_err());

        let mut meta = sample();
        meta.set_custom_field("key", "v".repeat(1001));
        assert!(meta.validate().is_err());
    }

    #[test]
    fn test_yaml_round_trip() {
        let mut meta = sample();
        meta.set_tags(vec!["beta".into(), "alpha".into()]);
        meta.set_notebook("work");
        meta.add_link("01AAAAAAAAAAAAAAAAAAAAAAAA".parse().unwrap());
        meta.set_custom_field("source", "web");

        let yaml = meta.to_yaml().unwrap();
        let parsed = Metadata::from_yaml(&yaml).unwrap();
        assert_eq!(parsed, meta);
    }

    #[test]
    fn test_yaml_field_order() {
        let meta = sample();
        let yaml = meta.to_yaml().unwrap();
        let id_pos = yaml.find("id:").unwrap();
        let title_pos = yaml.find("title:").unwrap();
        let created_pos = yaml.find("created:").unwrap();
        assert!(id_pos < title_pos);
        assert!(title_pos < created_pos);
    }

    #[test]
    fn test_from_yaml_unknown_scalars_become_custom_fields() {
        let id = NoteId::generate();
        let yaml = format!(
            "id: {}\ntitle: T\ncreated: 2024-01-01T00:00:00.000Z\nupdated: 2024-01-01T00:00:00.000Z\npriority: 3\nmood: calm\n",
            id
        );
        let meta = Metadata::from_yaml(&yaml).unwrap();
        assert_eq!(meta.custom_field("priority"), Some("3"));
        assert_eq!(meta.custom_field("mood"), Some("calm"));
    }

    #[test]
    fn test_from_yaml_skips_bad_links() {
        let id = NoteId::generate();
        let yaml = format!(
            "id: {}\ntitle: T\nlinks:\n  - not-a-ulid\n  - 01AAAAAAAAAAAAAAAAAAAAAAAA\n",
            id
        );
        let meta = Metadata::from_yaml(&yaml).unwrap();
        assert_eq!(meta.links().len(), 1);
    }

    #[test]
    fn test_from_yaml_missing_required() {
        assert!(Metadata::from_yaml("title: no id here\n").is_err());
        assert!(Metadata::from_yaml("id: 01AAAAAAAAAAAAAAAAAAAAAAAA\n").is_err());
    }
}
