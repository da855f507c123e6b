use std::io::{Cursor, Read, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::commands::store::FileEntry;
use crate::error::{Result, WpaiError};

/// Prefix of the content directory inside an exported site archive.
pub const WP_CONTENT_PREFIX: &str = "wp-content/";

fn file_options() -> SimpleFileOptions {
    SimpleFileOptions::default().compression_method(CompressionMethod::Deflated)
}

fn open(source: &[u8]) -> Result<ZipArchive<Cursor<&[u8]>>> {
    ZipArchive::new(Cursor::new(source)).map_err(|e| WpaiError::ArchiveFormat(e.to_string()))
}

/// Archive path for a project file.
///
/// Everything up to and including `<marker>/<slug>/` is dropped so the archive
/// is rooted at the plugin or theme itself. Paths without a marker keep their
/// location, minus any leading slash.
pub fn archive_path(path: &str, markers: &[&str]) -> String {
    let parts: Vec<&str> = path.split('/').collect();
    if let Some(index) = parts.iter().position(|p| markers.contains(p)) {
        let relative = parts.get(index + 2..).map(|rest| rest.join("/"));
        if let Some(relative) = relative.filter(|r| !r.is_empty()) {
            return relative;
        }
    }
    path.trim_start_matches('/').to_string()
}

/// Zips a project's files, re-rooted with [`archive_path`].
pub fn package_project_files(files: &[FileEntry], markers: &[&str]) -> Result<Vec<u8>> {
    let bytes = write_archive(
        files
            .iter()
            .map(|f| (archive_path(&f.path, markers), f.content.as_bytes())),
    )?;
    tracing::debug!("Packaged {} files into {} bytes", files.len(), bytes.len());
    Ok(bytes)
}

/// Writes `(path, bytes)` pairs into a new archive, keeping first-seen order.
///
/// When two entries share a path the later bytes win.
pub fn write_archive<'a>(entries: impl IntoIterator<Item = (String, &'a [u8])>) -> Result<Vec<u8>> {
    let mut unique: Vec<(String, &[u8])> = Vec::new();
    for (name, bytes) in entries {
        match unique.iter_mut().find(|(n, _)| *n == name) {
            Some(existing) => existing.1 = bytes,
            None => unique.push((name, bytes)),
        }
    }

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, bytes) in unique {
        writer.start_file(name, file_options())?;
        writer.write_all(bytes)?;
    }
    Ok(writer.finish()?.into_inner())
}

/// Copies the entries of `source` whose path starts with `path_prefix` into a new archive.
///
/// Kept entries are re-keyed by removing `strip_prefix` from the front when
/// given. Entry bytes are copied untouched, binary or not. A filter that keeps
/// nothing still yields a valid, empty archive.
pub fn extract_and_filter_archive(
    source: &[u8],
    path_prefix: &str,
    strip_prefix: Option<&str>,
) -> Result<Vec<u8>> {
    let entries = filtered_entries(source, path_prefix, strip_prefix)?;
    write_archive(
        entries
            .iter()
            .map(|(name, bytes)| (name.clone(), bytes.as_slice())),
    )
}

/// File entries under `path_prefix` with their bytes, re-keyed like
/// [`extract_and_filter_archive`].
///
/// When two entries end up with the same name the later bytes win, keeping the
/// position of the first.
pub fn filtered_entries(
    source: &[u8],
    path_prefix: &str,
    strip_prefix: Option<&str>,
) -> Result<Vec<(String, Vec<u8>)>> {
    let mut archive = open(source)?;
    let mut entries: Vec<(String, Vec<u8>)> = Vec::new();

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| WpaiError::ArchiveFormat(e.to_string()))?;
        if entry.is_dir() || !entry.name().starts_with(path_prefix) {
            continue;
        }

        let name = entry.name().to_string();
        let new_name = match strip_prefix {
            Some(strip) => name.strip_prefix(strip).unwrap_or(&name).to_string(),
            None => name.clone(),
        };
        if new_name.is_empty() {
            continue;
        }

        let mut bytes = Vec::new();
        entry
            .read_to_end(&mut bytes)
            .map_err(|e| WpaiError::ArchiveFormat(format!("{name}: {e}")))?;
        match entries.iter_mut().find(|(n, _)| *n == new_name) {
            Some(existing) => existing.1 = bytes,
            None => entries.push((new_name, bytes)),
        }
    }

    tracing::debug!(
        "Filtered {} entries by {path_prefix:?}: {} kept",
        archive.len(),
        entries.len()
    );
    Ok(entries)
}

/// Text files under `path_prefix`, keyed by their full archive path.
///
/// Entries that are not UTF-8, or that contain NUL bytes, are binary and skipped.
pub fn text_entries(source: &[u8], path_prefix: &str) -> Result<Vec<FileEntry>> {
    let mut archive = open(source)?;
    let mut files = Vec::new();

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| WpaiError::ArchiveFormat(e.to_string()))?;
        if entry.is_dir() || !entry.name().starts_with(path_prefix) {
            continue;
        }

        let name = entry.name().to_string();
        let mut bytes = Vec::new();
        entry
            .read_to_end(&mut bytes)
            .map_err(|e| WpaiError::ArchiveFormat(format!("{name}: {e}")))?;

        match String::from_utf8(bytes) {
            Ok(text) if !text.contains('\0') => files.push(FileEntry::new(name, text)),
            _ => tracing::debug!("Skipping metadata for {name}: not UTF-8 text"),
        }
    }

    Ok(files)
}

/// Names of the file entries in an archive, in archive order.
pub fn list_entries(source: &[u8]) -> Result<Vec<String>> {
    let archive = open(source)?;
    Ok(archive
        .file_names()
        .filter(|n| !n.ends_with('/'))
        .map(str::to_string)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::sanitize::PROJECT_ROOT_MARKERS;

    fn zip_of(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .add_directory("wp-content/", SimpleFileOptions::default())
            .unwrap();
        for (name, bytes) in entries {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(bytes).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    fn read(bytes: &[u8], name: &str) -> Vec<u8> {
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut entry = archive.by_name(name).unwrap();
        let mut out = Vec::new();
        entry.read_to_end(&mut out).unwrap();
        out
    }

    fn sorted(mut names: Vec<String>) -> Vec<String> {
        names.sort();
        names
    }

    #[test]
    fn test_package_strips_plugin_prefix() {
        let files = vec![
            FileEntry::new("/wordpress/wp-content/plugins/hello-world/hello-world.php", "<?php"),
            FileEntry::new("/wordpress/wp-content/plugins/hello-world/js/app.js", "let a;"),
        ];
        let bytes = package_project_files(&files, &PROJECT_ROOT_MARKERS).unwrap();
        assert_eq!(
            sorted(list_entries(&bytes).unwrap()),
            vec!["hello-world.php", "js/app.js"]
        );
        assert_eq!(read(&bytes, "hello-world.php"), b"<?php");
    }

    #[test]
    fn test_package_falls_back_to_original_path() {
        let files = vec![FileEntry::new("hello-world/hello-world.php", "<?php")];
        let bytes = package_project_files(&files, &PROJECT_ROOT_MARKERS).unwrap();
        assert_eq!(list_entries(&bytes).unwrap(), vec!["hello-world/hello-world.php"]);
    }

    #[test]
    fn test_package_theme_and_collisions() {
        let files = vec![
            FileEntry::new("themes/dark/style.css", "old"),
            FileEntry::new("/x/themes/dark/style.css", "new"),
        ];
        let bytes = package_project_files(&files, &PROJECT_ROOT_MARKERS).unwrap();
        assert_eq!(list_entries(&bytes).unwrap(), vec!["style.css"]);
        assert_eq!(read(&bytes, "style.css"), b"new");
    }

    #[test]
    fn test_archive_path_marker_without_file() {
        assert_eq!(archive_path("/a/plugins/shop", &PROJECT_ROOT_MARKERS), "a/plugins/shop");
        assert_eq!(archive_path("plugins", &PROJECT_ROOT_MARKERS), "plugins");
    }

    #[test]
    fn test_package_empty_is_valid() {
        let bytes = package_project_files(&[], &PROJECT_ROOT_MARKERS).unwrap();
        assert!(list_entries(&bytes).unwrap().is_empty());
    }

    #[test]
    fn test_filter_keeps_wp_content_only() {
        let source = zip_of(&[
            ("wp-content/plugins/x/a.php", b"<?php a"),
            ("wp-content/themes/y/b.css", b"body{}"),
            ("readme.txt", b"readme"),
        ]);
        let bytes = extract_and_filter_archive(&source, WP_CONTENT_PREFIX, None).unwrap();
        assert_eq!(
            sorted(list_entries(&bytes).unwrap()),
            vec!["wp-content/plugins/x/a.php", "wp-content/themes/y/b.css"]
        );
        assert_eq!(read(&bytes, "wp-content/themes/y/b.css"), b"body{}");
    }

    #[test]
    fn test_filter_strips_prefix_and_keeps_binary() {
        let binary: &[u8] = &[0x89, b'P', b'N', b'G', 0, 0xff, 0xfe];
        let source = zip_of(&[
            ("wp-content/uploads/logo.png", binary),
            ("wp-config.php", b"<?php"),
        ]);
        let bytes =
            extract_and_filter_archive(&source, WP_CONTENT_PREFIX, Some(WP_CONTENT_PREFIX))
                .unwrap();
        assert_eq!(list_entries(&bytes).unwrap(), vec!["uploads/logo.png"]);
        assert_eq!(read(&bytes, "uploads/logo.png"), binary);
    }

    #[test]
    fn test_filter_collision_keeps_later_entry() {
        let source = zip_of(&[
            ("a.php", b"first"),
            ("b.php", b"b"),
            ("wp-content/a.php", b"second"),
        ]);
        let bytes = extract_and_filter_archive(&source, "", Some(WP_CONTENT_PREFIX)).unwrap();
        assert_eq!(list_entries(&bytes).unwrap(), vec!["a.php", "b.php"]);
        assert_eq!(read(&bytes, "a.php"), b"second");

        let entries = filtered_entries(&source, "", Some(WP_CONTENT_PREFIX)).unwrap();
        assert_eq!(entries[0], ("a.php".to_string(), b"second".to_vec()));
    }

    #[test]
    fn test_filter_with_no_matches_is_empty_archive() {
        let source = zip_of(&[("readme.txt", b"readme")]);
        let bytes = extract_and_filter_archive(&source, WP_CONTENT_PREFIX, None).unwrap();
        assert!(list_entries(&bytes).unwrap().is_empty());
    }

    #[test]
    fn test_malformed_source_is_an_error() {
        let err = extract_and_filter_archive(b"definitely not a zip", WP_CONTENT_PREFIX, None)
            .unwrap_err();
        assert!(matches!(err, WpaiError::ArchiveFormat(_)));
        assert!(matches!(
            text_entries(b"", WP_CONTENT_PREFIX),
            Err(WpaiError::ArchiveFormat(_))
        ));
    }

    #[test]
    fn test_text_entries_skip_binary() {
        let source = zip_of(&[
            ("wp-content/plugins/x/a.php", b"<?php echo 1;"),
            ("wp-content/uploads/blob.bin", b"\xff\xfe\x00"),
            ("wp-content/uploads/nul.txt", b"a\0b"),
            ("other/c.php", b"<?php"),
        ]);
        let files = text_entries(&source, WP_CONTENT_PREFIX).unwrap();
        assert_eq!(
            files,
            vec![FileEntry::new("wp-content/plugins/x/a.php", "<?php echo 1;")]
        );
    }
}
