//
// walker.rs
//
// Deterministic enumeration of TypeScript sources under a root directory
//

use std::path::{Path, PathBuf};

use walkdir::{DirEntry, WalkDir};

use crate::parser_pool::SOURCE_EXTENSIONS;

fn is_source_file(entry: &DirEntry) -> bool {
    if !entry.file_type().is_file() {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    SOURCE_EXTENSIONS
        .iter()
        .any(|ext| name.len() > ext.len() + 1 && name.ends_with(&format!(".{ext}")))
}

/// Lazily walk `root` depth-first, yielding `.ts`/`.tsx` files.
///
/// Entries are sorted by file name at each directory level and directories
/// are descended fully before their later siblings, so repeated walks over an
/// unchanged tree yield the same sequence. Directories whose name appears in
/// `ignored_dirs` are pruned. Unreadable entries are logged and skipped.
pub fn walk_sources<'a>(
    root: &Path,
    ignored_dirs: &'a [String],
) -> impl Iterator<Item = PathBuf> + 'a {
    WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(move |entry| {
            // Never prune the root itself
            entry.depth() == 0
                || !entry.file_type().is_dir()
                || !ignored_dirs
                    .iter()
                    .any(|d| entry.file_name().to_str() == Some(d.as_str()))
        })
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                log::warn!("Skipping unreadable entry during walk: {}", e);
                None
            }
        })
        .filter(is_source_file)
        .map(DirEntry::into_path)
}
