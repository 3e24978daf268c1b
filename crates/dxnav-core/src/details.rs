use chrono::DateTime;
use serde_json::Value;

const SIZE_UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

/// Human-readable size in powers of 1024, rounded to two decimals
/// (`1536` is `1.5 KB`).
pub fn format_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 B".to_string();
    }
    let mut unit = 0;
    let mut scale = 1u64;
    while unit + 1 < SIZE_UNITS.len() && bytes / scale >= 1024 {
        scale *= 1024;
        unit += 1;
    }
    let value = (bytes as f64 / scale as f64 * 100.0).round() / 100.0;
    format!("{value} {}", SIZE_UNITS[unit])
}

/// Epoch milliseconds as a UTC date and time. Out-of-range values are shown
/// as the raw number.
pub fn format_timestamp(millis: i64) -> String {
    match DateTime::from_timestamp_millis(millis) {
        Some(at) => at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        None => millis.to_string(),
    }
}

/// The fields of a file's `dx describe --json` output worth showing.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FileDetails {
    pub name: Option<String>,
    pub id: Option<String>,
    pub class: Option<String>,
    pub size: Option<u64>,
    pub state: Option<String>,
    pub folder: Option<String>,
    pub project: Option<String>,
    pub created: Option<i64>,
    pub modified: Option<i64>,
    pub created_by: Option<String>,
    pub media_type: Option<String>,
    /// Sorted by key.
    pub properties: Vec<(String, String)>,
    pub tags: Vec<String>,
}

impl FileDetails {
    pub fn from_describe(describe: &Value) -> Self {
        let text = |value: Option<&Value>| {
            value
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        let mut properties: Vec<(String, String)> = describe
            .get("properties")
            .and_then(Value::as_object)
            .map(|props| {
                props
                    .iter()
                    .map(|(key, value)| {
                        let value = match value {
                            Value::String(s) => s.clone(),
                            other => other.to_string(),
                        };
                        (key.clone(), value)
                    })
                    .collect()
            })
            .unwrap_or_default();
        properties.sort();

        Self {
            name: text(describe.get("name")),
            id: text(describe.get("id")),
            class: text(describe.get("class")),
            size: describe.get("size").and_then(Value::as_u64),
            state: text(describe.get("state")),
            folder: text(describe.get("folder")),
            project: text(describe.get("project")),
            created: describe.get("created").and_then(Value::as_i64),
            modified: describe.get("modified").and_then(Value::as_i64),
            created_by: text(describe.get("createdBy").and_then(|c| c.get("user"))),
            media_type: text(describe.get("media").and_then(|m| m.get("type"))),
            properties,
            tags: describe
                .get("tags")
                .and_then(Value::as_array)
                .map(|tags| {
                    tags.iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
        }
    }

    /// Labelled rows, skipping anything `describe` left out. Properties are
    /// summarised by count; list them from `properties`.
    pub fn rows(&self) -> Vec<(&'static str, String)> {
        let mut rows = Vec::new();
        let mut push = |label: &'static str, value: Option<String>| {
            if let Some(value) = value {
                rows.push((label, value));
            }
        };
        push("Name", self.name.clone());
        push("File ID", self.id.clone());
        push("Class", self.class.clone());
        push("Size", self.size.map(format_size));
        push("State", self.state.clone());
        push("Folder", self.folder.clone());
        push("Project", self.project.clone());
        push("Created", self.created.map(format_timestamp));
        push("Modified", self.modified.map(format_timestamp));
        push("Created By", self.created_by.clone());
        push("Media Type", self.media_type.clone());
        push(
            "Properties",
            (!self.properties.is_empty()).then(|| format!("{} item(s)", self.properties.len())),
        );
        push(
            "Tags",
            (!self.tags.is_empty()).then(|| self.tags.join(", ")),
        );
        rows
    }
}
