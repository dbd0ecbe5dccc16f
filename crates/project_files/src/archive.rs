use std::io::{Cursor, Read};
use std::sync::Arc;

use core_types::{ProjectFile, ProjectFileSet};
use futures::{StreamExt, TryStreamExt, stream};
use tracing::{debug, info, warn};
use zip::ZipArchive;

use crate::IngestError;
use crate::filter::{MAX_FILE_BYTES, file_type, skip_reason};

const EXTRACT_CONCURRENCY: usize = 8;

type SharedArchive = ZipArchive<Cursor<Arc<[u8]>>>;

/// Decompresses a ZIP held in memory into project files.
///
/// Entries are inflated concurrently on the blocking pool; the result keeps
/// archive order. Directories, filtered entries, and entries that are not
/// UTF-8 text are skipped. Duplicate paths keep the last entry.
pub async fn extract_zip(bytes: Vec<u8>) -> Result<Vec<ProjectFile>, IngestError> {
    let data: Arc<[u8]> = bytes.into();
    let archive = ZipArchive::new(Cursor::new(data))?;
    let total = archive.len();

    let entries: Vec<Option<ProjectFile>> = stream::iter(0..total)
        .map(|index| {
            let mut archive = archive.clone();
            tokio::task::spawn_blocking(move || read_entry(&mut archive, index))
        })
        .buffered(EXTRACT_CONCURRENCY)
        .map_err(IngestError::from)
        .try_collect()
        .await?;

    let files: ProjectFileSet = entries.into_iter().flatten().collect();
    info!(entries = total, extracted = files.len(), "archive extracted");
    Ok(files.into_vec())
}

fn read_entry(archive: &mut SharedArchive, index: usize) -> Option<ProjectFile> {
    let entry = match archive.by_index(index) {
        Ok(entry) => entry,
        Err(err) => {
            warn!(index, "unreadable archive entry: {err}");
            return None;
        }
    };
    if entry.is_dir() {
        return None;
    }

    let path = normalize_path(entry.name());
    if path.is_empty() {
        return None;
    }
    if let Some(reason) = skip_reason(&path, entry.size()) {
        debug!(path = %path, reason = reason.as_str(), "skipping archive entry");
        return None;
    }

    let mut buf = Vec::with_capacity(entry.size() as usize);
    if let Err(err) = entry.take(MAX_FILE_BYTES + 1).read_to_end(&mut buf) {
        warn!(path = %path, "failed to inflate archive entry: {err}");
        return None;
    }
    if buf.len() as u64 > MAX_FILE_BYTES {
        debug!(path = %path, reason = "too_large", "skipping archive entry");
        return None;
    }

    match String::from_utf8(buf) {
        Ok(content) => {
            let file_type = file_type(&path);
            Some(ProjectFile::new(path, content, file_type))
        }
        Err(_) => {
            debug!(path = %path, reason = "not_utf8", "skipping archive entry");
            None
        }
    }
}

fn normalize_path(name: &str) -> String {
    let name = name.replace('\\', "/");
    let mut trimmed = name.as_str();
    while let Some(rest) = trimmed.strip_prefix("./") {
        trimmed = rest;
    }
    trimmed.trim_start_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use zip::ZipWriter;
    use zip::write::SimpleFileOptions;

    use super::*;

    fn build_zip(entries: &[(&str, Option<&[u8]>)]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
        for (name, content) in entries {
            match content {
                Some(bytes) => {
                    writer.start_file(*name, options).expect("start file");
                    writer.write_all(bytes).expect("write");
                }
                None => writer.add_directory(*name, options).expect("dir"),
            }
        }
        writer.finish().expect("finish").into_inner()
    }

    #[tokio::test]
    async fn extracts_text_entries_in_archive_order() {
        let zip = build_zip(&[
            ("src/", None),
            ("src/main.rs", Some(&b"fn main() {}"[..])),
            ("README.md", Some(&b"# demo"[..])),
            ("assets/logo.png", Some(&b"\x89PNG"[..])),
            ("blob.dat", Some(&[0xff, 0xfe, 0x00][..])),
            ("./Cargo.toml", Some(&b"[package]"[..])),
        ]);

        let files = extract_zip(zip).await.expect("extract");
        let paths: Vec<_> = files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["src/main.rs", "README.md", "Cargo.toml"]);
        assert_eq!(files[0].file_type, "rust");
        assert_eq!(files[1].content, "# demo");
    }

    #[tokio::test]
    async fn duplicate_paths_collapse_to_last_entry() {
        let zip = build_zip(&[
            ("a.txt", Some(&b"first"[..])),
            ("b.txt", Some(&b"b"[..])),
            ("./a.txt", Some(&b"second"[..])),
        ]);

        let files = extract_zip(zip).await.expect("extract");
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].path, "a.txt");
        assert_eq!(files[0].content, "second");
    }

    #[tokio::test]
    async fn rejects_non_archive_bytes() {
        let err = extract_zip(b"definitely not a zip".to_vec())
            .await
            .expect_err("invalid");
        assert!(matches!(err, IngestError::Zip(_)));
    }

    #[test]
    fn normalizes_windows_and_relative_paths() {
        assert_eq!(normalize_path("src\\lib.rs"), "src/lib.rs");
        assert_eq!(normalize_path("././a/b.txt"), "a/b.txt");
        assert_eq!(normalize_path("/abs.txt"), "abs.txt");
    }
}
