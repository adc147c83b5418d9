//! Listing engine: prefix/delimiter grouping with stable lexicographic
//! pagination over the sidecar index.
//!
//! Keys are enumerated lazily from sorted directory scans (directories sort
//! with a virtual trailing `/` so traversal order equals byte-wise key
//! order) and enumeration stops as soon as `max_keys` result slots are
//! filled, so a large bucket is never materialized in memory.

use std::collections::{BTreeSet, HashSet, VecDeque};
use std::path::PathBuf;

use crate::error::StorageResult;
use crate::meta::store::{MetadataStore, resolve_latest, scan_dir};
use crate::paths;
use crate::types::VersionRecord;

// ---------------------------------------------------------------------------
// Page types
// ---------------------------------------------------------------------------

/// One page of a `listObjects` result.
#[derive(Debug, Clone)]
pub struct ListObjectsPage {
    /// The latest non-delete-marker record per listed key.
    pub objects: Vec<VersionRecord>,
    /// Collapsed key groups when a delimiter is used (sorted, deduplicated).
    pub common_prefixes: Vec<String>,
    /// Whether more results remain.
    pub is_truncated: bool,
    /// Marker for the next page (the last emitted item).
    pub next_marker: Option<String>,
    /// Continuation token for the next page (the last emitted item).
    pub next_continuation_token: Option<String>,
}

/// One page of a `listObjectVersions` result.
#[derive(Debug, Clone)]
pub struct VersionListPage {
    /// Version records (delete markers included), keys ascending and
    /// versions newest-first within a key.
    pub versions: Vec<VersionRecord>,
    /// Collapsed key groups when a delimiter is used.
    pub common_prefixes: Vec<String>,
    /// Whether more results remain.
    pub is_truncated: bool,
    /// Key marker for the next page.
    pub next_key_marker: Option<String>,
    /// Version-ID marker for the next page.
    pub next_version_id_marker: Option<String>,
}

// ---------------------------------------------------------------------------
// KeyWalker
// ---------------------------------------------------------------------------

/// An item inside one directory frame, pre-sorted into key order.
#[derive(Debug)]
enum WalkItem {
    /// A subdirectory to descend into.
    Dir(String),
    /// A key (derived from its metadata sidecars) rooted in this directory.
    Key(String),
}

/// One directory being traversed.
#[derive(Debug)]
struct Frame {
    /// Key prefix of this directory (empty at the bucket root, otherwise
    /// ends with `/`).
    rel: String,
    /// Filesystem path of the directory.
    path: PathBuf,
    /// Remaining items in key order.
    items: VecDeque<WalkItem>,
}

/// Lazy lexicographic key enumerator over a bucket directory.
#[derive(Debug)]
pub(crate) struct KeyWalker {
    bucket_dir: PathBuf,
    prefix: String,
    start_after: String,
    stack: Vec<Frame>,
    started: bool,
}

impl KeyWalker {
    /// Create a walker over `bucket_dir`, pruning subtrees that cannot
    /// contain keys matching `prefix` or lying after `start_after`.
    pub(crate) fn new(bucket_dir: PathBuf, prefix: &str, start_after: &str) -> Self {
        Self {
            bucket_dir,
            prefix: prefix.to_owned(),
            start_after: start_after.to_owned(),
            stack: Vec::new(),
            started: false,
        }
    }

    /// The next key in lexicographic order, or `None` when exhausted.
    ///
    /// Emitted keys are guaranteed to be strictly greater than
    /// `start_after`; prefix filtering is the caller's responsibility (the
    /// walker only prunes whole subtrees).
    pub(crate) async fn next_key(&mut self) -> StorageResult<Option<String>> {
        if !self.started {
            self.started = true;
            let frame = build_frame(self.bucket_dir.clone(), String::new(), true).await?;
            self.stack.push(frame);
        }

        loop {
            let Some(frame) = self.stack.last_mut() else {
                return Ok(None);
            };
            let Some(item) = frame.items.pop_front() else {
                self.stack.pop();
                continue;
            };

            match item {
                WalkItem::Key(base) => {
                    let key = format!("{}{base}", frame.rel);
                    if key.as_str() <= self.start_after.as_str() {
                        continue;
                    }
                    return Ok(Some(key));
                }
                WalkItem::Dir(name) => {
                    let rel = format!("{}{name}/", frame.rel);
                    let path = frame.path.join(&name);
                    if self.prune_dir(&rel) {
                        continue;
                    }
                    let next = build_frame(path, rel, false).await?;
                    self.stack.push(next);
                }
            }
        }
    }

    /// Whether the subtree rooted at `dir_rel` can be skipped entirely.
    fn prune_dir(&self, dir_rel: &str) -> bool {
        // No overlap with the prefix interval.
        if !self.prefix.is_empty()
            && !dir_rel.starts_with(self.prefix.as_str())
            && !self.prefix.starts_with(dir_rel)
        {
            return true;
        }
        // Every key in the subtree starts with dir_rel; when the marker is
        // beyond the subtree and not inside it, nothing there can follow
        // the marker.
        if !self.start_after.is_empty()
            && dir_rel <= self.start_after.as_str()
            && !self.start_after.starts_with(dir_rel)
        {
            return true;
        }
        false
    }
}

/// Scan one directory into a frame: keys come from metadata sidecar names
/// (deduplicated across versions), subdirectories are descended in key
/// order via a virtual trailing `/`.
async fn build_frame(path: PathBuf, rel: String, at_root: bool) -> StorageResult<Frame> {
    let mut dirs = Vec::new();
    let mut bases = BTreeSet::new();

    for entry in scan_dir(&path).await? {
        if at_root && paths::is_reserved_entry(&entry.name) {
            continue;
        }
        if entry.is_dir {
            dirs.push(entry.name);
        } else if let Some(stem) = entry.name.strip_suffix(paths::METADATA_SUFFIX) {
            let (base, _) = paths::parse_version_stem(stem);
            bases.insert(base.to_owned());
        }
    }

    let mut items: Vec<(String, WalkItem)> = Vec::with_capacity(dirs.len() + bases.len());
    for dir in dirs {
        items.push((format!("{dir}/"), WalkItem::Dir(dir)));
    }
    for base in bases {
        items.push((base.clone(), WalkItem::Key(base)));
    }
    items.sort_by(|a, b| a.0.cmp(&b.0));

    Ok(Frame {
        rel,
        path,
        items: items.into_iter().map(|(_, item)| item).collect(),
    })
}

// ---------------------------------------------------------------------------
// Listing
// ---------------------------------------------------------------------------

/// Compute the common prefix a key collapses into, if the delimiter occurs
/// in the portion after `prefix`.
fn common_prefix_of(key: &str, prefix: &str, delimiter: &str) -> Option<String> {
    if delimiter.is_empty() {
        return None;
    }
    let rest = &key[prefix.len()..];
    rest.find(delimiter)
        .map(|pos| format!("{prefix}{}", &rest[..pos + delimiter.len()]))
}

/// Whether `key`, in sorted order, lies beyond every key matching `prefix`.
fn beyond_prefix(key: &str, prefix: &str) -> bool {
    !prefix.is_empty() && key > prefix && !key.starts_with(prefix)
}

/// List the current objects of a bucket.
///
/// `start_after` is the resolved pagination cursor (continuation token,
/// else marker, else empty). Emits at most `max_keys` items, where objects
/// and unique common prefixes each fill one slot.
///
/// # Errors
///
/// Returns [`crate::error::StorageError::Internal`] on I/O failure.
pub async fn list_objects(
    store: &MetadataStore,
    bucket: &str,
    prefix: &str,
    delimiter: &str,
    start_after: &str,
    max_keys: usize,
) -> StorageResult<ListObjectsPage> {
    let mut walker = KeyWalker::new(
        store.resolver().bucket_dir(bucket),
        prefix,
        start_after,
    );

    let mut objects = Vec::new();
    let mut common_prefixes = Vec::new();
    let mut seen_prefixes = HashSet::new();
    let mut last_item: Option<String> = None;
    let mut is_truncated = false;

    while let Some(key) = walker.next_key().await? {
        if beyond_prefix(&key, prefix) {
            break;
        }
        if !key.starts_with(prefix) {
            continue;
        }

        if let Some(cp) = common_prefix_of(&key, prefix, delimiter) {
            // A group emitted on a previous page (its prefix is the
            // cursor) or already on this page fills no new slot.
            if cp.as_str() <= start_after || seen_prefixes.contains(&cp) {
                continue;
            }
            if objects.len() + common_prefixes.len() >= max_keys {
                is_truncated = true;
                break;
            }
            seen_prefixes.insert(cp.clone());
            last_item = Some(cp.clone());
            common_prefixes.push(cp);
            continue;
        }

        let records = store.list_key_versions(bucket, &key).await?;
        let Some(latest) = resolve_latest(&records) else {
            continue;
        };
        if latest.is_delete_marker {
            continue;
        }

        if objects.len() + common_prefixes.len() >= max_keys {
            is_truncated = true;
            break;
        }
        last_item = Some(key.clone());
        objects.push(latest.clone());
    }

    let token = if is_truncated { last_item } else { None };
    Ok(ListObjectsPage {
        objects,
        common_prefixes,
        is_truncated,
        next_marker: token.clone(),
        next_continuation_token: token,
    })
}

/// List all versions (objects and delete markers) of a bucket.
///
/// Versions are ordered by key ascending, then `last_modified` descending
/// (then version ID ascending). Every emitted version and unique common
/// prefix fills one `max_keys` slot.
///
/// # Errors
///
/// Returns [`crate::error::StorageError::Internal`] on I/O failure.
pub async fn list_object_versions(
    store: &MetadataStore,
    bucket: &str,
    prefix: &str,
    delimiter: &str,
    key_marker: &str,
    version_id_marker: &str,
    max_keys: usize,
) -> StorageResult<VersionListPage> {
    // Resume inside the marker key only when a version marker narrows it;
    // otherwise the key marker itself is exclusive.
    let walk_after = if key_marker.is_empty() || version_id_marker.is_empty() {
        key_marker.to_owned()
    } else {
        // Start the walk at the marker key itself.
        let mut before = key_marker.to_owned();
        before.pop();
        before
    };

    let mut walker = KeyWalker::new(store.resolver().bucket_dir(bucket), prefix, &walk_after);

    let mut versions: Vec<VersionRecord> = Vec::new();
    let mut common_prefixes = Vec::new();
    let mut seen_prefixes = HashSet::new();
    let mut is_truncated = false;
    let mut next_key_marker = None;
    let mut next_version_id_marker = None;

    'outer: while let Some(key) = walker.next_key().await? {
        if beyond_prefix(&key, prefix) {
            break;
        }
        if !key.starts_with(prefix) || key.as_str() < key_marker {
            continue;
        }

        if let Some(cp) = common_prefix_of(&key, prefix, delimiter) {
            if cp.as_str() <= key_marker || seen_prefixes.contains(&cp) {
                continue;
            }
            if versions.len() + common_prefixes.len() >= max_keys {
                is_truncated = true;
                break;
            }
            seen_prefixes.insert(cp.clone());
            next_key_marker = Some(cp.clone());
            next_version_id_marker = None;
            common_prefixes.push(cp);
            continue;
        }

        let records = store.list_key_versions(bucket, &key).await?;

        // Within the marker key, resume strictly after the marker version.
        let mut skipping = key == key_marker && !version_id_marker.is_empty();

        for record in records {
            if skipping {
                if record.version_id == version_id_marker {
                    skipping = false;
                }
                continue;
            }
            if versions.len() + common_prefixes.len() >= max_keys {
                is_truncated = true;
                break 'outer;
            }
            next_key_marker = Some(record.key.clone());
            next_version_id_marker = Some(record.version_id.clone());
            versions.push(record);
        }
    }

    if !is_truncated {
        next_key_marker = None;
        next_version_id_marker = None;
    }

    Ok(VersionListPage {
        versions,
        common_prefixes,
        is_truncated,
        next_key_marker,
        next_version_id_marker,
    })
}

/// Whether the bucket has any version records at all (delete markers
/// count: a versioned bucket with markers is not empty).
///
/// # Errors
///
/// Returns [`crate::error::StorageError::Internal`] on I/O failure.
pub async fn has_any_record(store: &MetadataStore, bucket: &str) -> StorageResult<bool> {
    let mut walker = KeyWalker::new(store.resolver().bucket_dir(bucket), "", "");
    Ok(walker.next_key().await?.is_some())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
