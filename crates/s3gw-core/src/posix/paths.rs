//! Key-to-path mapping and the on-disk layout of a bucket.
//!
//! ```text
//! <root>/<bucket>/<key...>                    payload files
//! <root>/<bucket>/.s3gw/bucket.json           bucket record (owner, ACL)
//! <root>/<bucket>/.s3gw/meta/<dir>.d/<name>.json   object sidecars
//! <root>/<bucket>/.s3gw/meta/<dir>.d/.json    sidecar of the marker `<dir>/`
//! <root>/<bucket>/.s3gw/multipart/<upload>/   staging: info.json, part-N, part-N.json
//! <root>/<bucket>/.s3gw/tmp/                  scratch files, same volume as payloads
//! ```

use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::error::{BackendError, BackendResult};

/// Name of the per-bucket directory holding gateway state.
pub(crate) const INTERNAL_DIR: &str = ".s3gw";

/// Root-level directory that deleted buckets are moved into before removal.
pub(crate) const TRASH_DIR: &str = ".s3gw-trash";

const SIDECAR_EXT: &str = ".json";
const META_DIR_EXT: &str = ".d";
const NAME_MAX: usize = 255;

/// A key that maps onto a relative filesystem path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ObjectKey<'a> {
    raw: &'a str,
    segments: Vec<&'a str>,
}

impl<'a> ObjectKey<'a> {
    /// Check that `key` can be stored under the bucket directory.
    ///
    /// A key ending in `/` is a directory marker and maps onto the directory
    /// itself. Rejected: other empty segments (leading or doubled `/`), `.`
    /// and `..` segments, a first segment naming the internal directory, NUL
    /// bytes, and segments longer than a filename may be.
    pub(crate) fn parse(key: &'a str) -> BackendResult<Self> {
        let invalid = |reason: &str| {
            Err(BackendError::InvalidArgument {
                message: format!("Object key '{key}' is not supported by this backend: {reason}"),
            })
        };
        if key.contains('\0') {
            return invalid("NUL byte");
        }
        let segments: Vec<&str> = key.split('/').collect();
        let last = segments.len() - 1;
        for (i, segment) in segments.iter().enumerate() {
            match *segment {
                "" if i == last && i > 0 => {}
                "" => return invalid("empty path segment"),
                "." | ".." => return invalid("relative path segment"),
                s if s.len() + SIDECAR_EXT.len() > NAME_MAX => {
                    return invalid("path segment too long");
                }
                _ => {}
            }
        }
        if segments.first() == Some(&INTERNAL_DIR) {
            return invalid("reserved prefix");
        }
        Ok(Self { raw: key, segments })
    }

    /// The key as given.
    pub(crate) fn as_str(&self) -> &'a str {
        self.raw
    }

    /// Whether the key names a directory (`photos/2024/`).
    pub(crate) fn is_dir_marker(&self) -> bool {
        self.raw.ends_with('/')
    }

    /// Segments of the filesystem path, without a marker's trailing empty one.
    fn path_segments(&self) -> &[&'a str] {
        if self.is_dir_marker() {
            &self.segments[..self.segments.len() - 1]
        } else {
            &self.segments
        }
    }

    /// Proper ancestors as relative paths, shortest first: `a`, `a/b` for
    /// `a/b/c` and for `a/b/c/`.
    pub(crate) fn ancestors(&self) -> impl Iterator<Item = PathBuf> + '_ {
        let segments = self.path_segments();
        (1..segments.len()).map(|n| segments[..n].iter().collect())
    }

    fn relative(&self) -> PathBuf {
        self.path_segments().iter().collect()
    }
}

/// Paths belonging to one bucket.
#[derive(Debug, Clone)]
pub(crate) struct BucketLayout {
    dir: PathBuf,
    internal: PathBuf,
}

impl BucketLayout {
    pub(crate) fn new(root: &Path, bucket: &str) -> Self {
        let dir = root.join(bucket);
        let internal = dir.join(INTERNAL_DIR);
        Self { dir, internal }
    }

    /// The bucket directory; payload files live below it.
    pub(crate) fn dir(&self) -> &Path {
        &self.dir
    }

    pub(crate) fn record(&self) -> PathBuf {
        self.internal.join("bucket.json")
    }

    pub(crate) fn meta_root(&self) -> PathBuf {
        self.internal.join("meta")
    }

    pub(crate) fn multipart_root(&self) -> PathBuf {
        self.internal.join("multipart")
    }

    pub(crate) fn tmp_dir(&self) -> PathBuf {
        self.internal.join("tmp")
    }

    /// A fresh scratch path in the bucket's tmp directory.
    pub(crate) fn scratch(&self, suffix: &str) -> PathBuf {
        self.tmp_dir()
            .join(format!("{}{suffix}", Uuid::new_v4().simple()))
    }

    pub(crate) fn object_path(&self, key: &ObjectKey<'_>) -> PathBuf {
        self.dir.join(key.relative())
    }

    /// Sidecar path. Directory segments carry `.d` and the file `.json`, so
    /// the sidecar of `x` never collides with the directory of `x.json/y`.
    /// A marker's empty last segment yields `.json`, which no other key can.
    pub(crate) fn meta_path(&self, key: &ObjectKey<'_>) -> PathBuf {
        let mut path = self.meta_root();
        let (last, dirs) = key
            .segments
            .split_last()
            .map_or(("", &[][..]), |(last, dirs)| (*last, dirs));
        for dir in dirs {
            path.push(format!("{dir}{META_DIR_EXT}"));
        }
        path.push(format!("{last}{SIDECAR_EXT}"));
        path
    }

    /// Sidecar of the marker for the directory `rel` (relative to the bucket).
    pub(crate) fn marker_meta_path(&self, rel: &Path) -> PathBuf {
        let mut path = self.meta_root();
        for component in rel.iter() {
            let mut name = component.to_os_string();
            name.push(META_DIR_EXT);
            path.push(name);
        }
        path.push(SIDECAR_EXT);
        path
    }

    pub(crate) fn upload_dir(&self, upload_id: &str) -> PathBuf {
        self.multipart_root().join(upload_id)
    }

    pub(crate) fn all_dirs(&self) -> [PathBuf; 4] {
        [
            self.internal.clone(),
            self.meta_root(),
            self.multipart_root(),
            self.tmp_dir(),
        ]
    }
}

pub(crate) fn upload_info_path(upload_dir: &Path) -> PathBuf {
    upload_dir.join("info.json")
}

pub(crate) fn part_path(upload_dir: &Path, part_number: u32) -> PathBuf {
    upload_dir.join(format!("part-{part_number}"))
}

pub(crate) fn part_record_path(upload_dir: &Path, part_number: u32) -> PathBuf {
    upload_dir.join(format!("part-{part_number}{SIDECAR_EXT}"))
}

/// Inverse of [`part_record_path`]'s file name.
pub(crate) fn parse_part_record_name(name: &str) -> Option<u32> {
    name.strip_prefix("part-")?
        .strip_suffix(SIDECAR_EXT)?
        .parse()
        .ok()
}
