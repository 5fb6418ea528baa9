//! Document loading from a local directory.
//!
//! Walks `[documents].root`, keeps files matching the include globs and
//! not matching the exclude globs, and turns each into a [`Document`]
//! whose source is the path relative to the root. Markdown and plain text
//! are read as UTF-8; PDFs go through `pdf-extract`. Files that cannot be
//! read or decoded are skipped with a warning rather than failing the load.

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use rag_agent_core::models::Document;
use std::path::Path;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::DocumentsConfig;

pub fn load_documents(config: &DocumentsConfig) -> Result<Vec<Document>> {
    let root = &config.root;
    if !root.exists() {
        bail!("Documents root does not exist: {}", root.display());
    }

    let include_set = build_globset(&config.include_globs)?;

    let mut excludes = vec![
        "**/.git/**".to_string(),
        "**/target/**".to_string(),
        "**/node_modules/**".to_string(),
    ];
    excludes.extend(config.exclude_globs.clone());
    let exclude_set = build_globset(&excludes)?;

    let mut documents = Vec::new();

    for entry in WalkDir::new(root).follow_links(config.follow_symlinks) {
        let entry = entry.with_context(|| format!("Failed to walk {}", root.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().replace('\\', "/");

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }

        match read_text(path) {
            Ok(text) => {
                debug!(source = %rel_str, chars = text.chars().count(), "loaded document");
                documents.push(Document::new(rel_str, text));
            }
            Err(e) => warn!(source = %rel_str, error = %e, "skipping unreadable document"),
        }
    }

    documents.sort_by(|a, b| a.source.cmp(&b.source));
    Ok(documents)
}

fn read_text(path: &Path) -> Result<String> {
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "pdf" => {
            let bytes = std::fs::read(path)?;
            pdf_extract::extract_text_from_mem(&bytes)
                .map_err(|e| anyhow::anyhow!("PDF extraction failed: {}", e))
        }
        "md" | "markdown" | "txt" | "text" | "" => std::fs::read_to_string(path)
            .with_context(|| format!("{} is not valid UTF-8 text", path.display())),
        other => bail!("unsupported file type: .{}", other),
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("Invalid glob: {}", pattern))?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn config(root: &Path) -> DocumentsConfig {
        DocumentsConfig {
            root: root.to_path_buf(),
            include_globs: vec!["**/*.md".to_string(), "**/*.txt".to_string()],
            exclude_globs: vec!["**/drafts/**".to_string()],
            follow_symlinks: false,
        }
    }

    #[test]
    fn test_loads_matching_files_sorted() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("guides")).unwrap();
        fs::create_dir_all(tmp.path().join("drafts")).unwrap();
        fs::create_dir_all(tmp.path().join(".git")).unwrap();
        fs::write(tmp.path().join("zeta.md"), "# Zeta").unwrap();
        fs::write(tmp.path().join("guides/alpha.txt"), "alpha text").unwrap();
        fs::write(tmp.path().join("drafts/wip.md"), "unfinished").unwrap();
        fs::write(tmp.path().join(".git/notes.md"), "internal").unwrap();
        fs::write(tmp.path().join("image.png"), [0u8, 1, 2]).unwrap();

        let docs = load_documents(&config(tmp.path())).unwrap();
        let sources: Vec<&str> = docs.iter().map(|d| d.source.as_str()).collect();
        assert_eq!(sources, vec!["guides/alpha.txt", "zeta.md"]);
        assert_eq!(docs[0].text, "alpha text");
    }

    #[test]
    fn test_invalid_utf8_skipped() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("bad.txt"), [0xffu8, 0xfe, 0xfd]).unwrap();
        fs::write(tmp.path().join("good.txt"), "fine").unwrap();
        let docs = load_documents(&config(tmp.path())).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].source, "good.txt");
    }

    #[test]
    fn test_missing_root_fails() {
        let tmp = TempDir::new().unwrap();
        let err = load_documents(&config(&tmp.path().join("nope"))).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }
}
