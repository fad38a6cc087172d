//! File system helpers: BOM-aware source reading and source discovery.

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::errors::{PreprocessError, Result};

/// Reads a source file with encoding detection.
///
/// UTF-16 files (detected by BOM) are transcoded, invalid UTF-8 falls back to
/// Windows-1252. A UTF-8 BOM is kept: the printer must reproduce the file
/// byte for byte, and the lexer treats the BOM as leading inline text.
pub fn read_source_file(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path).map_err(|e| PreprocessError::io(path, e))?;

    let content = match bytes.as_slice() {
        [0xFF, 0xFE, ..] => {
            let (decoded, _, had_errors) = encoding_rs::UTF_16LE.decode(&bytes);
            if had_errors {
                tracing::warn!("Errors detected while decoding UTF-16LE file {}", path.display());
            }
            decoded.into_owned()
        }
        [0xFE, 0xFF, ..] => {
            let (decoded, _, had_errors) = encoding_rs::UTF_16BE.decode(&bytes);
            if had_errors {
                tracing::warn!("Errors detected while decoding UTF-16BE file {}", path.display());
            }
            decoded.into_owned()
        }
        _ => match String::from_utf8(bytes) {
            Ok(s) => s,
            Err(e) => {
                tracing::debug!("UTF-8 decoding failed for {}, trying Windows-1252", path.display());
                let (decoded, _, had_errors) = encoding_rs::WINDOWS_1252.decode(e.as_bytes());
                if had_errors {
                    tracing::warn!("Errors detected while decoding Windows-1252 file {}", path.display());
                }
                decoded.into_owned()
            }
        },
    };

    Ok(content)
}

/// Returns true when `path` carries one of `extensions` (compared case-insensitively).
pub fn has_source_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| extensions.iter().any(|wanted| wanted.eq_ignore_ascii_case(ext)))
}

/// Collects source files below `directory`, sorted for deterministic batch order.
pub fn discover_sources(directory: &Path, extensions: &[String], recursive: bool) -> Result<Vec<PathBuf>> {
    if !directory.is_dir() {
        return Err(PreprocessError::MissingDirectory(directory.to_path_buf()));
    }

    let max_depth = if recursive { usize::MAX } else { 1 };
    let mut files = Vec::new();
    for entry in WalkDir::new(directory).max_depth(max_depth).follow_links(true) {
        let entry = entry.map_err(|e| {
            let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| directory.to_path_buf());
            PreprocessError::io(path, std::io::Error::other(e.to_string()))
        })?;
        if entry.file_type().is_file() && has_source_extension(entry.path(), extensions) {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_discover_respects_depth_and_extension() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.php"), "<?php\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "x").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub").join("b.PHP"), "<?php\n").unwrap();

        let exts = vec!["php".to_string()];
        let flat = discover_sources(dir.path(), &exts, false).unwrap();
        assert_eq!(flat.len(), 1);
        let deep = discover_sources(dir.path(), &exts, true).unwrap();
        assert_eq!(deep.len(), 2);
    }

    #[test]
    fn test_missing_directory() {
        let err = discover_sources(Path::new("/definitely/not/here"), &[], true).unwrap_err();
        assert!(matches!(err, PreprocessError::MissingDirectory(_)));
    }

    #[test]
    fn test_read_utf16_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("u16.php");
        let mut bytes = vec![0xFF, 0xFE];
        for unit in "<?php".encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        fs::write(&path, bytes).unwrap();
        assert_eq!(read_source_file(&path).unwrap(), "<?php");
    }
}
