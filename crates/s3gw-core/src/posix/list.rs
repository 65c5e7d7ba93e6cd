//! Listing by directory traversal.
//!
//! The walk starts at the directory named by the prefix up to its last `/`,
//! so a prefix narrows the traversal rather than filtering a full scan. With
//! the `/` delimiter a subdirectory becomes a common prefix without being
//! descended into; other delimiters fall back to rolling up the walked keys.
//! A directory with a marker sidecar is also the object `<dir>/`. Entries are
//! then sorted by key bytes, the order S3 lists in.

use std::path::Path;

use s3gw_model::types::{ListPage, ListQuery};

use super::meta::{ObjectRecord, is_missing, read_json_blocking};
use super::paths::{BucketLayout, INTERNAL_DIR, ObjectKey};
use crate::error::BackendResult;

#[derive(Debug, PartialEq, Eq)]
enum Entry {
    Object(String),
    Prefix(String),
}

impl Entry {
    fn name(&self) -> &str {
        match self {
            Self::Object(name) | Self::Prefix(name) => name,
        }
    }
}

/// Produce one page of `query` over the bucket. Blocking; run it on the
/// blocking pool.
pub(crate) fn list_page(layout: &BucketLayout, query: &ListQuery) -> BackendResult<ListPage> {
    let mut page = ListPage::default();
    if query.max_keys == 0 {
        return Ok(page);
    }

    let base = query
        .prefix
        .rfind('/')
        .map_or("", |i| &query.prefix[..=i]);
    let mut entries = Vec::new();
    if !base.is_empty() && base.starts_with(query.prefix.as_str()) && is_marker(layout, base) {
        entries.push(classify(base.to_owned(), query));
    }
    walk(layout, base, query, &mut entries)?;
    entries.sort_by(|a, b| a.name().cmp(b.name()));
    entries.dedup_by(|a, b| a.name() == b.name());

    let mut count = 0usize;
    let mut last = None;
    let remaining = entries
        .into_iter()
        .filter(|e| query.start_after.is_empty() || e.name() > query.start_after.as_str());

    for entry in remaining {
        if count >= query.max_keys {
            page.is_truncated = true;
            break;
        }
        match entry {
            Entry::Prefix(prefix) => {
                last = Some(prefix.clone());
                page.common_prefixes.push(prefix);
            }
            Entry::Object(key) => {
                let Ok(parsed) = ObjectKey::parse(&key) else {
                    continue;
                };
                // A payload without a sidecar is mid-publish or foreign.
                let Some(record) = read_json_blocking::<ObjectRecord>(&layout.meta_path(&parsed))?
                else {
                    continue;
                };
                last = Some(key.clone());
                page.objects.push(record.into_summary(key));
            }
        }
        count += 1;
    }

    if page.is_truncated {
        page.next_marker = last;
    }
    Ok(page)
}

fn walk(
    layout: &BucketLayout,
    dir_rel: &str,
    query: &ListQuery,
    out: &mut Vec<Entry>,
) -> BackendResult<()> {
    let read_dir = match std::fs::read_dir(layout.dir().join(dir_rel)) {
        Ok(read_dir) => read_dir,
        Err(e) if is_missing(&e) => return Ok(()),
        Err(e) => return Err(e.into()),
    };

    let prefix = query.prefix.as_str();
    for entry in read_dir {
        let entry = entry?;
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        if dir_rel.is_empty() && name == INTERNAL_DIR {
            continue;
        }
        let file_type = entry.file_type()?;
        let key = format!("{dir_rel}{name}");

        if file_type.is_dir() {
            let sub = format!("{key}/");
            if sub.starts_with(prefix) {
                if query.delimiter == "/" {
                    if is_marker(layout, &sub) || holds_objects(layout, &sub)? {
                        out.push(Entry::Prefix(sub));
                    }
                    continue;
                }
                if is_marker(layout, &sub) {
                    out.push(classify(sub.clone(), query));
                }
            } else if !prefix.starts_with(&sub) {
                continue;
            }
            walk(layout, &sub, query, out)?;
        } else if file_type.is_file() && key.starts_with(prefix) {
            out.push(classify(key, query));
        }
    }
    Ok(())
}

/// An object key as listed: itself, or the common prefix it rolls up into.
fn classify(key: String, query: &ListQuery) -> Entry {
    match roll_up(&key, &query.prefix, &query.delimiter) {
        Some(common) => Entry::Prefix(common),
        None => Entry::Object(key),
    }
}

/// Whether the directory `dir_rel` (`a/b/`) carries a marker sidecar.
fn is_marker(layout: &BucketLayout, dir_rel: &str) -> bool {
    let path = layout.marker_meta_path(Path::new(dir_rel.trim_end_matches('/')));
    std::fs::metadata(path).is_ok_and(|m| m.is_file())
}

/// The common prefix `key` collapses into, if the delimiter occurs after `prefix`.
fn roll_up(key: &str, prefix: &str, delimiter: &str) -> Option<String> {
    if delimiter.is_empty() {
        return None;
    }
    let after = &key[prefix.len()..];
    after
        .find(delimiter)
        .map(|pos| format!("{prefix}{}{delimiter}", &after[..pos]))
}

/// Whether the bucket holds any object or in-flight multipart upload.
pub(crate) fn has_objects(layout: &BucketLayout) -> BackendResult<bool> {
    match std::fs::read_dir(layout.multipart_root()) {
        Ok(mut uploads) => {
            if uploads.next().is_some() {
                return Ok(true);
            }
        }
        Err(e) if is_missing(&e) => {}
        Err(e) => return Err(e.into()),
    }
    holds_objects(layout, "")
}

/// Whether the directory `dir_rel` holds a payload file or a marked
/// directory at any depth. The root's internal directory is skipped.
fn holds_objects(layout: &BucketLayout, dir_rel: &str) -> BackendResult<bool> {
    let read_dir = match std::fs::read_dir(layout.dir().join(dir_rel)) {
        Ok(read_dir) => read_dir,
        Err(e) if is_missing(&e) => return Ok(false),
        Err(e) => return Err(e.into()),
    };
    for entry in read_dir {
        let entry = entry?;
        let name = entry.file_name();
        if dir_rel.is_empty() && name == INTERNAL_DIR {
            continue;
        }
        let file_type = entry.file_type()?;
        if file_type.is_file() {
            return Ok(true);
        }
        if file_type.is_dir() {
            let Some(name) = name.to_str() else {
                continue;
            };
            let sub = format!("{dir_rel}{name}/");
            if is_marker(layout, &sub) || holds_objects(layout, &sub)? {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_roll_up_at_first_delimiter_after_prefix() {
        assert_eq!(roll_up("a/b/c", "", "/"), Some("a/".to_owned()));
        assert_eq!(roll_up("a/b/c", "a/", "/"), Some("a/b/".to_owned()));
        assert_eq!(roll_up("a/b", "a/", "/"), None);
        assert_eq!(roll_up("2024-07-01.log", "", "-"), Some("2024-".to_owned()));
        assert_eq!(roll_up("a/b", "", ""), None);
    }

    #[test]
    fn test_should_detect_objects_in_nested_directories() {
        let dir = tempfile::tempdir().unwrap();
        let layout = BucketLayout::new(dir.path(), "b");
        std::fs::create_dir_all(layout.dir().join("empty/deeper")).unwrap();
        std::fs::create_dir_all(layout.dir().join("full/deeper")).unwrap();
        std::fs::write(layout.dir().join("full/deeper/obj"), b"x").unwrap();

        assert!(!holds_objects(&layout, "empty/").unwrap());
        assert!(holds_objects(&layout, "full/").unwrap());
        assert!(!holds_objects(&layout, "absent/").unwrap());

        let marker = layout.marker_meta_path(Path::new("empty/deeper"));
        std::fs::create_dir_all(marker.parent().unwrap()).unwrap();
        std::fs::write(&marker, b"{}").unwrap();
        assert!(holds_objects(&layout, "empty/").unwrap());
    }

    #[test]
    fn test_should_count_pending_uploads_as_content() {
        let dir = tempfile::tempdir().unwrap();
        let layout = BucketLayout::new(dir.path(), "b");
        for d in layout.all_dirs() {
            std::fs::create_dir_all(d).unwrap();
        }
        assert!(!has_objects(&layout).unwrap());
        std::fs::create_dir(layout.upload_dir("u1")).unwrap();
        assert!(has_objects(&layout).unwrap());
    }
}
