//! Loading entry and content type files given on the command line

use anyhow::{Context, Result};
use log::debug;
use serde_json::Value;
use std::fs;
use std::path::Path;

use super::EntryArgs;
use crate::api::metadata::ContentTypes;
use crate::api::models::Entry;
use crate::api::parse::EntryParser;
use crate::config::SyncConfig;
use crate::graph::{GraphBuilder, OperationsGraph};

/// Entries read from one file
#[derive(Debug, Clone, Default)]
pub struct EntryFile {
    pub entries: Vec<Entry>,
    /// The file held an array rather than a single entry (or `null`)
    pub is_list: bool,
}

/// Both sides of a diff plus the schemas to read them with
#[derive(Debug, Clone)]
pub struct DiffInput {
    pub initial: EntryFile,
    pub updated: EntryFile,
    pub content_types: ContentTypes,
    pub config: SyncConfig,
}

impl DiffInput {
    /// Read every file named by `args`; `--locale` overrides the config
    pub fn load(args: &EntryArgs, mut config: SyncConfig) -> Result<Self> {
        if let Some(locale) = &args.locale {
            config.locale = locale.clone();
        }

        let content_types = match &args.content_types {
            Some(path) => {
                let value = read_json(path)?;
                ContentTypes::from_value(&value).with_context(|| {
                    format!("Failed to read content types from {}", path.display())
                })?
            }
            None => ContentTypes::new(),
        };

        let mut parser = EntryParser::new().with_content_types(&content_types);
        if args.localized {
            parser = parser.localized(&config.locale, &config.default_locale);
        }

        let initial = read_entries(&args.initial, &parser)?;
        let updated = read_entries(&args.updated, &parser)?;
        debug!(
            "Loaded {} initial and {} updated entries",
            initial.entries.len(),
            updated.entries.len()
        );

        Ok(Self {
            initial,
            updated,
            content_types,
            config,
        })
    }

    /// Single entries are diffed as a root pair, lists are paired by id
    pub fn is_single(&self) -> bool {
        !self.initial.is_list
            && !self.updated.is_list
            && self.initial.entries.len() <= 1
            && self.updated.entries.len() <= 1
    }

    pub fn build_graph(&self) -> Result<OperationsGraph> {
        let builder = GraphBuilder::new(self.config.build_options(self.content_types.clone()));
        let graph = if self.is_single() {
            builder.build_entry(self.initial.entries.first(), self.updated.entries.first())
        } else {
            builder.build_entries(&self.initial.entries, &self.updated.entries)
        };
        graph.context("Failed to diff entries")
    }
}

fn read_json(path: &Path) -> Result<Value> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read file: {}", path.display()))?;
    if content.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&content).with_context(|| format!("Invalid JSON in {}", path.display()))
}

fn read_entries(path: &Path, parser: &EntryParser<'_>) -> Result<EntryFile> {
    let value = read_json(path)?;
    let entries = parser
        .parse_many(&value)
        .with_context(|| format!("Failed to read entries from {}", path.display()))?;
    Ok(EntryFile {
        is_list: value.is_array(),
        entries,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::OutputFormat;
    use crate::api::operations::OperationKind;
    use serde_json::json;
    use std::path::PathBuf;

    fn write(dir: &tempfile::TempDir, name: &str, value: &Value) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, value.to_string()).unwrap();
        path
    }

    fn args(initial: PathBuf, updated: PathBuf) -> EntryArgs {
        EntryArgs {
            initial,
            updated,
            content_types: None,
            localized: false,
            locale: None,
            format: OutputFormat::Summary,
        }
    }

    fn entry(id: &str, title: &str) -> Value {
        json!({
            "sys": { "id": id, "version": 1, "contentType": { "sys": { "id": "post" } } },
            "fields": { "title": title }
        })
    }

    #[test]
    fn test_single_entries_are_diffed_as_root_pair() {
        let dir = tempfile::tempdir().unwrap();
        let initial = write(&dir, "a.json", &entry("0", "a"));
        let updated = write(&dir, "b.json", &entry("0", "b"));

        let input = DiffInput::load(&args(initial, updated), SyncConfig::default()).unwrap();
        assert!(input.is_single());

        let graph = input.build_graph().unwrap();
        assert_eq!(graph.len(), 1);
        assert_eq!(graph.nodes[0].kind(), OperationKind::Update);
    }

    #[test]
    fn test_null_initial_means_all_creates() {
        let dir = tempfile::tempdir().unwrap();
        let initial = write(&dir, "a.json", &Value::Null);
        let updated = write(&dir, "b.json", &entry("draft", "b"));

        let input = DiffInput::load(&args(initial, updated), SyncConfig::default()).unwrap();
        let graph = input.build_graph().unwrap();
        assert_eq!(graph.creates().len(), 1);
        assert_ne!(graph.nodes[0].id(), "draft");
    }

    #[test]
    fn test_lists_are_paired_by_id() {
        let dir = tempfile::tempdir().unwrap();
        let initial = write(&dir, "a.json", &json!([entry("1", "x"), entry("2", "y")]));
        let updated = write(&dir, "b.json", &json!([entry("2", "y2")]));

        let input = DiffInput::load(&args(initial, updated), SyncConfig::default()).unwrap();
        assert!(!input.is_single());

        let graph = input.build_graph().unwrap();
        assert_eq!(graph.updates()[0].id(), "2");
        assert_eq!(graph.dereferences()[0].id(), "1");
    }

    #[test]
    fn test_localized_files_use_locale_flag() {
        let dir = tempfile::tempdir().unwrap();
        let value = json!({
            "sys": { "id": "0", "contentType": { "sys": { "id": "post" } } },
            "fields": { "title": { "de-DE": "Hallo", "en-US": "Hello" } }
        });
        let initial = write(&dir, "a.json", &value);
        let updated = write(&dir, "b.json", &value);
        let mut args = args(initial, updated);
        args.localized = true;
        args.locale = Some("de-DE".to_string());

        let input = DiffInput::load(&args, SyncConfig::default()).unwrap();
        assert_eq!(input.config.locale, "de-DE");
        assert_eq!(
            input.updated.entries[0].field("title"),
            Some(&crate::api::models::FieldValue::from("Hallo"))
        );
    }

    #[test]
    fn test_missing_file_names_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let updated = write(&dir, "b.json", &entry("0", "b"));

        let err = DiffInput::load(&args(dir.path().join("nope.json"), updated), SyncConfig::default())
            .unwrap_err();
        assert!(err.to_string().contains("nope.json"));
    }
}
