use std::{cmp::Ordering, path::Path};

use tracing::warn;

pub use crate::config::DEFAULT_LISTING_DELIMITER;

const HEADER_SENTINEL: &str = "State";
const FIRST_FOLDER_LINE: usize = 2;
const NAME_FIELD: usize = 3;
const ID_FIELD: usize = 4;

/// One entry of a `dx ls --verbose` listing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListingEntry {
    pub name: String,
    /// Project-relative path, always starting with `/`.
    pub path: String,
    pub id: Option<String>,
    pub is_folder: bool,
    pub extension: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Listing {
    pub folders: Vec<ListingEntry>,
    pub files: Vec<ListingEntry>,
}

impl Listing {
    /// Folders first, then files, each ordered by name.
    pub fn into_sorted(self) -> Vec<ListingEntry> {
        let mut entries = self.folders;
        entries.extend(self.files);
        sort_entries(&mut entries);
        entries
    }
}

pub fn ls_args(project_id: &str, path: &str, delimiter: &str) -> Vec<String> {
    vec![
        "ls".to_string(),
        "--verbose".to_string(),
        "--delimiter".to_string(),
        delimiter.to_string(),
        format!("{project_id}:{path}"),
    ]
}

/// Parses verbose `dx ls` output.
///
/// Folder names sit between line 2 and the `State<delim>` header; file rows
/// follow the header with the name in field 3 and the id in field 4. Output
/// without a header yields an empty listing.
pub fn parse_listing(raw: &str, delimiter: &str, parent_path: &str) -> Listing {
    let lines: Vec<&str> = raw.lines().map(|line| line.trim_end_matches('\r')).collect();
    let header_prefix = format!("{HEADER_SENTINEL}{delimiter}");
    let Some(header) = lines.iter().position(|line| line.starts_with(&header_prefix)) else {
        return Listing::default();
    };

    let mut listing = Listing::default();
    if header > FIRST_FOLDER_LINE {
        for line in &lines[FIRST_FOLDER_LINE..header] {
            let name = line.trim().trim_end_matches('/');
            if name.is_empty() {
                continue;
            }
            listing.folders.push(ListingEntry {
                name: name.to_string(),
                path: child_path(parent_path, name),
                id: None,
                is_folder: true,
                extension: None,
            });
        }
    }

    for line in lines[header + 1..].iter().filter(|line| !line.trim().is_empty()) {
        let fields: Vec<&str> = line.split(delimiter).collect();
        if fields.len() <= NAME_FIELD {
            warn!("Skipping malformed listing row: {line}");
            continue;
        }
        let name = fields[NAME_FIELD].trim();
        if name.is_empty() {
            warn!("Skipping listing row without a name: {line}");
            continue;
        }
        let id = fields
            .get(ID_FIELD)
            .map(|id| id.trim())
            .filter(|id| !id.is_empty())
            .map(str::to_string);
        listing.files.push(ListingEntry {
            name: name.to_string(),
            path: child_path(parent_path, name),
            id,
            is_folder: false,
            extension: extension_hint(name),
        });
    }
    listing
}

pub fn child_path(parent: &str, name: &str) -> String {
    let parent = parent.trim_end_matches('/');
    if parent.is_empty() {
        format!("/{name}")
    } else {
        format!("{parent}/{name}")
    }
}

pub fn extension_hint(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
}

pub fn sort_entries(entries: &mut [ListingEntry]) {
    entries.sort_by(|a, b| {
        b.is_folder
            .cmp(&a.is_folder)
            .then_with(|| compare_names(&a.name, &b.name))
    });
}

/// Case-insensitive comparison where digit runs compare numerically
/// (`run2` < `run10`); exact ties fall back to the raw names.
pub fn compare_names(a: &str, b: &str) -> Ordering {
    let mut left = a.chars().peekable();
    let mut right = b.chars().peekable();
    loop {
        match (left.peek().copied(), right.peek().copied()) {
            (None, None) => return a.cmp(b),
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(l), Some(r)) if l.is_ascii_digit() && r.is_ascii_digit() => {
                let ln = take_digits(&mut left);
                let rn = take_digits(&mut right);
                let ord = compare_digit_runs(&ln, &rn);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            (Some(l), Some(r)) => {
                let ord = l.to_lowercase().cmp(r.to_lowercase());
                if ord != Ordering::Equal {
                    return ord;
                }
                left.next();
                right.next();
            }
        }
    }
}

fn take_digits(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut out = String::new();
    while let Some(c) = chars.peek().copied().filter(char::is_ascii_digit) {
        out.push(c);
        chars.next();
    }
    out
}

fn compare_digit_runs(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(delim: &str) -> String {
        [
            "project-xyz:/data".to_string(),
            String::new(),
            "b/".to_string(),
            "a/".to_string(),
            String::new(),
            format!("State{d}Last modified{d}Size{d}Name{d}ID", d = delim),
            format!("closed{d}2024-01-01{d}12 KB{d}c.txt{d}file-c", d = delim),
            format!("closed{d}2024-01-02{d}1 MB{d}Reads.FASTQ{d}file-r", d = delim),
            String::new(),
        ]
        .join("\r\n")
    }

    #[test]
    fn folders_sort_before_files_alphabetically() {
        let entries = parse_listing(&sample(";;"), ";;", "/").into_sorted();
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["a", "b", "c.txt", "Reads.FASTQ"]);
    }

    #[test]
    fn header_splits_folders_and_files() {
        let listing = parse_listing(&sample(";;"), ";;", "/data");
        assert_eq!(listing.folders.len(), 2);
        assert!(listing.folders.iter().all(|f| f.is_folder && f.id.is_none()));
        assert_eq!(listing.folders[0].path, "/data/b");

        let reads = &listing.files[1];
        assert_eq!(reads.id.as_deref(), Some("file-r"));
        assert_eq!(reads.path, "/data/Reads.FASTQ");
        assert_eq!(reads.extension.as_deref(), Some("fastq"));
    }

    #[test]
    fn root_children_get_single_leading_slash() {
        let listing = parse_listing(&sample("|"), "|", "/");
        assert_eq!(listing.folders[1].path, "/a");
        assert_eq!(listing.files[0].path, "/c.txt");
    }

    #[test]
    fn missing_header_yields_nothing() {
        let listing = parse_listing("project-xyz:/\n\nsome/\n", ";;", "/");
        assert_eq!(listing, Listing::default());
    }

    #[test]
    fn short_rows_are_skipped_and_missing_id_is_none() {
        let raw = "p:/\n\nState;;Modified;;Size;;Name;;ID\nbroken;;row\nclosed;;x;;1;;orphan.bam\n";
        let listing = parse_listing(raw, ";;", "/");
        assert!(listing.folders.is_empty());
        assert_eq!(listing.files.len(), 1);
        assert_eq!(listing.files[0].name, "orphan.bam");
        assert_eq!(listing.files[0].id, None);
    }

    #[test]
    fn names_compare_naturally_and_case_insensitively() {
        assert_eq!(compare_names("run2", "run10"), Ordering::Less);
        assert_eq!(compare_names("Alpha", "beta"), Ordering::Less);
        assert_eq!(compare_names("sample007", "sample7"), Ordering::Less);
        assert_ne!(compare_names("A", "a"), Ordering::Equal);
    }

    #[test]
    fn ls_args_qualify_path_with_project() {
        assert_eq!(
            ls_args("project-1", "/reads", ";;"),
            ["ls", "--verbose", "--delimiter", ";;", "project-1:/reads"]
        );
    }
}
