//! Destination and correlation-id resolution for uploaded files.
//!
//! Clients describe where each uploaded file should go in several
//! overlapping ways. Each way is a strategy; strategies are tried in a fixed
//! order and the first one that produces a value wins, independently for
//! every file:
//!
//! | # | Strategy        | Source fields                                       |
//! |---|-----------------|-----------------------------------------------------|
//! | 1 | filename map    | `<filename>.jpg = <path>` text fields               |
//! | 2 | identifier map  | `newSources` / `attachedFiles` JSON + positional id |
//! | 3 | path list       | JSON paths, `imgPaths`, `paths`, repeated `path`... |
//! | 4 | single path     | one `path` / `imgPath`, one file only               |
//! | 5 | generated       | `{userId}_{uuid}{ext}`                              |
//!
//! Correlation ids use strategies 2 to 4 with the `ids` / `id` fields.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use super::form::{UploadForm, FILE_FIELDS};
use crate::store::{join_key, split_list};

/// Form fields that are never treated as filename mappings.
pub const RESERVED_FIELDS: [&str; 16] = [
    "userId",
    "folder",
    "imgPathsToDelete",
    "imgPaths",
    "paths",
    "path",
    "imgPath",
    "ids",
    "id",
    "fileIds",
    "fileId",
    "newSources",
    "attachedFiles",
    FILE_FIELDS[0],
    FILE_FIELDS[1],
    FILE_FIELDS[2],
];

/// Extensions that mark a text field name as a filename.
pub const IMAGE_EXTENSIONS: [&str; 6] = [".jpg", ".jpeg", ".png", ".gif", ".svg", ".webp"];

// =============================================================================
// Types
// =============================================================================

/// The file being resolved.
#[derive(Debug, Clone, Copy)]
pub struct PartRef<'a> {
    /// Position among the uploaded files
    pub index: usize,

    /// Filename the client sent
    pub file_name: &'a str,

    /// Extension of the payload that will be stored, with leading dot
    pub extension: &'a str,
}

/// Which strategy produced a destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionSource {
    FilenameMap,
    IdentifierMap,
    PathList,
    SinglePath,
    Generated,
}

/// Where one uploaded file goes and which client record it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    /// Destination path relative to the upload folder
    pub destination: String,

    /// Correlation id, empty when none was supplied
    pub correlation_id: String,

    pub source: ResolutionSource,
}

/// A path the client asked to delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteTarget {
    /// Path exactly as the client sent it
    pub requested: String,

    /// Fully qualified object key
    pub key: String,
}

type Strategy = fn(&PartRef<'_>, &FormContext) -> Option<String>;

const DESTINATION_STRATEGIES: [(ResolutionSource, Strategy); 4] = [
    (ResolutionSource::FilenameMap, destination_by_filename),
    (ResolutionSource::IdentifierMap, destination_by_identifier),
    (ResolutionSource::PathList, destination_by_path_list),
    (ResolutionSource::SinglePath, destination_by_single_path),
];

const CORRELATION_STRATEGIES: [Strategy; 3] = [
    correlation_by_identifier,
    correlation_by_id_list,
    correlation_by_single_id,
];

// =============================================================================
// Form Context
// =============================================================================

/// Everything the strategies need, extracted once per form.
#[derive(Debug, Clone, Default)]
pub struct FormContext {
    filename_map: HashMap<String, String>,
    identifier_map: HashMap<String, String>,
    positional_ids: Vec<String>,
    path_list: Vec<String>,
    single_path: Option<String>,
    id_list: Vec<String>,
    single_id: Option<String>,
    part_count: usize,
}

#[derive(Debug, Deserialize)]
struct SourceEntry {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    path: Option<String>,
}

impl SourceEntry {
    fn id(&self) -> &str {
        self.id.as_deref().unwrap_or("").trim()
    }

    fn path(&self) -> &str {
        self.path.as_deref().unwrap_or("").trim()
    }
}

impl FormContext {
    /// Extract resolution inputs from a form carrying `part_count` files.
    pub fn from_form(form: &UploadForm, part_count: usize) -> Self {
        let mut ctx = FormContext {
            part_count,
            ..Default::default()
        };

        for (name, value) in form.fields() {
            let value = value.trim();
            if is_filename_key(name) && !value.is_empty() {
                ctx.filename_map
                    .entry(name.to_string())
                    .or_insert_with(|| value.to_string());
            }
        }

        // Identifier map: newSources wins, attachedFiles only if it yields nothing
        let mut ordered_ids = Vec::new();
        let mut json_paths = Vec::new();
        if let Some(entries) = parse_source_list(form, "newSources") {
            for entry in entries.iter().filter(|e| !e.id().is_empty() && !e.path().is_empty()) {
                ctx.identifier_map
                    .insert(entry.id().to_string(), entry.path().to_string());
                ordered_ids.push(entry.id().to_string());
                json_paths.push(entry.path().to_string());
            }
        }
        if ctx.identifier_map.is_empty() {
            if let Some(entries) = parse_source_list(form, "attachedFiles") {
                for entry in &entries {
                    match (entry.id(), entry.path()) {
                        (_, "") => {}
                        ("", path) => json_paths.push(path.to_string()),
                        (id, path) => {
                            ctx.identifier_map.insert(id.to_string(), path.to_string());
                        }
                    }
                }
            }
        }

        ctx.positional_ids = match form.value("fileIds") {
            Some(raw) => split_list(raw),
            None => owned(form.values("fileId")),
        };
        if ctx.positional_ids.is_empty() {
            ctx.positional_ids = ordered_ids;
        }

        let path_values = form.values("path");
        let img_path_values = form.values("imgPath");
        ctx.path_list = [
            json_paths,
            form.value("imgPaths").map(split_list).unwrap_or_default(),
            form.value("paths")
                .map(|raw| {
                    split_list(raw)
                        .into_iter()
                        .filter(|p| !p.is_empty())
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default(),
            repeated(&path_values),
            repeated(&img_path_values),
        ]
        .into_iter()
        .find(|list| !list.is_empty())
        .unwrap_or_default();
        ctx.single_path = single(&path_values).or_else(|| single(&img_path_values));

        let id_values = form.values("id");
        ctx.id_list = match form.value("ids") {
            Some(raw) => split_list(raw),
            None => repeated(&id_values),
        };
        ctx.single_id = single(&id_values);

        ctx
    }

    /// Resolve one file.
    ///
    /// `owner` is the uploading user, used for generated names.
    pub fn resolve(&self, part: &PartRef<'_>, owner: &str) -> ResolvedTarget {
        let (destination, source) = DESTINATION_STRATEGIES
            .iter()
            .find_map(|(source, strategy)| strategy(part, self).map(|d| (d, *source)))
            .unwrap_or_else(|| (generated_name(owner, part.extension), ResolutionSource::Generated));

        let correlation_id = CORRELATION_STRATEGIES
            .iter()
            .find_map(|strategy| strategy(part, self))
            .unwrap_or_default();

        debug!(
            index = part.index,
            file_name = part.file_name,
            destination = %destination,
            correlation_id = %correlation_id,
            source = ?source,
            "Resolved upload target"
        );

        ResolvedTarget {
            destination,
            correlation_id,
            source,
        }
    }

    /// Resolve every file, in order.
    pub fn resolve_all(&self, parts: &[PartRef<'_>], owner: &str) -> Vec<ResolvedTarget> {
        parts.iter().map(|part| self.resolve(part, owner)).collect()
    }

    fn positional_id(&self, index: usize) -> Option<&str> {
        self.positional_ids
            .get(index)
            .map(|s| s.as_str())
            .filter(|s| !s.is_empty())
    }
}

// =============================================================================
// Strategies
// =============================================================================

fn destination_by_filename(part: &PartRef<'_>, ctx: &FormContext) -> Option<String> {
    ctx.filename_map.get(part.file_name).cloned()
}

fn destination_by_identifier(part: &PartRef<'_>, ctx: &FormContext) -> Option<String> {
    let id = ctx.positional_id(part.index)?;
    ctx.identifier_map.get(id).cloned()
}

fn destination_by_path_list(part: &PartRef<'_>, ctx: &FormContext) -> Option<String> {
    non_empty(ctx.path_list.get(part.index))
}

fn destination_by_single_path(_: &PartRef<'_>, ctx: &FormContext) -> Option<String> {
    ctx.single_path.clone().filter(|_| ctx.part_count == 1)
}

fn correlation_by_identifier(part: &PartRef<'_>, ctx: &FormContext) -> Option<String> {
    let id = ctx.positional_id(part.index)?;
    ctx.identifier_map.contains_key(id).then(|| id.to_string())
}

fn correlation_by_id_list(part: &PartRef<'_>, ctx: &FormContext) -> Option<String> {
    non_empty(ctx.id_list.get(part.index))
}

fn correlation_by_single_id(_: &PartRef<'_>, ctx: &FormContext) -> Option<String> {
    ctx.single_id.clone().filter(|_| ctx.part_count == 1)
}

// =============================================================================
// Helpers
// =============================================================================

/// Whether a text field name is a filename mapping.
pub fn is_filename_key(name: &str) -> bool {
    if RESERVED_FIELDS.contains(&name) {
        return false;
    }
    let lower = name.to_ascii_lowercase();
    IMAGE_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// Name for a file no strategy could place.
pub fn generated_name(owner: &str, extension: &str) -> String {
    format!("{}_{}{}", owner, Uuid::new_v4(), extension)
}

/// Qualify the comma-separated `imgPathsToDelete` list.
///
/// Bare filenames are placed inside `folder`; paths with a `/` are taken as
/// already folder-relative. `prefix` is prepended to every key.
pub fn resolve_deletions(raw: Option<&str>, folder: &str, prefix: &str) -> Vec<DeleteTarget> {
    let Some(raw) = raw else {
        return Vec::new();
    };

    split_list(raw)
        .into_iter()
        .filter(|p| !p.is_empty())
        .map(|requested| {
            let key = if requested.contains('/') {
                join_key(&[prefix, &requested])
            } else {
                join_key(&[prefix, folder, &requested])
            };
            DeleteTarget { requested, key }
        })
        .collect()
}

/// Parse a `{id, path}` list sent bare or wrapped in an object under `field`.
fn parse_source_list(form: &UploadForm, field: &str) -> Option<Vec<SourceEntry>> {
    let raw = form.value(field)?;

    let parsed = serde_json::from_str::<Value>(raw).and_then(|value| match value {
        Value::Object(mut map) => {
            serde_json::from_value(map.remove(field).unwrap_or(Value::Array(Vec::new())))
        }
        other => serde_json::from_value(other),
    });

    match parsed {
        Ok(entries) => Some(entries),
        Err(e) => {
            debug!(field, error = %e, "Ignoring malformed JSON form field");
            None
        }
    }
}

fn owned(values: Vec<&str>) -> Vec<String> {
    values.into_iter().map(|s| s.to_string()).collect()
}

/// Repeated field values, only when there are at least two of them.
fn repeated(values: &[&str]) -> Vec<String> {
    if values.len() > 1 {
        owned(values.to_vec())
    } else {
        Vec::new()
    }
}

fn single(values: &[&str]) -> Option<String> {
    match values {
        [one] => Some(one.to_string()),
        _ => None,
    }
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value.filter(|s| !s.is_empty()).cloned()
}

// =============================================================================
// Tests
// =============================================================================
