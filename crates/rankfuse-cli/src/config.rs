//! Configuration and path resolution for the CLI.
//!
//! Pipeline and corpus files are resolved in this order:
//! 1. `--pipeline` / `--corpus` flags
//! 2. `$RANKFUSE_PIPELINE` / `$RANKFUSE_CORPUS` (handled by clap)
//! 3. Well-known file names in the data directory

use anyhow::{anyhow, Result};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

/// Tree file looked up in the data directory
const PIPELINE_FILENAME: &str = "pipeline.json";

/// Corpus files looked up in the data directory, in order
const CORPUS_FILENAMES: [&str; 2] = ["corpus.jsonl", "corpus.json"];

/// Environment variable for the corpus file
const CORPUS_ENV: &str = "RANKFUSE_CORPUS";

/// Returns the data directory.
///
/// - macOS: `~/Library/Application Support/dev.rankfuse.rankfuse/`
/// - Linux: `~/.local/share/rankfuse/`
/// - Windows: `%APPDATA%\rankfuse\rankfuse\data\`
pub fn get_data_dir(custom_dir: Option<&PathBuf>) -> Result<PathBuf> {
    if let Some(dir) = custom_dir {
        return Ok(dir.clone());
    }

    ProjectDirs::from("dev", "rankfuse", "rankfuse")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .ok_or_else(|| anyhow!("Could not determine data directory"))
}

/// Returns the tree file to load, or `None` for the built-in tree.
pub fn resolve_pipeline(flag: Option<&PathBuf>, data_dir: &Path) -> Option<PathBuf> {
    if let Some(path) = flag {
        return Some(path.clone());
    }
    let default = data_dir.join(PIPELINE_FILENAME);
    default.exists().then_some(default)
}

/// Returns the corpus file to load.
pub fn resolve_corpus(flag: Option<&PathBuf>, data_dir: &Path) -> Result<PathBuf> {
    if let Some(path) = flag {
        return Ok(path.clone());
    }

    CORPUS_FILENAMES
        .iter()
        .map(|name| data_dir.join(name))
        .find(|path| path.exists())
        .ok_or_else(|| {
            anyhow!(
                "No corpus found.\n\
                 Searched locations:\n\
                 - --corpus flag\n\
                 - ${} environment variable\n\
                 - {}",
                CORPUS_ENV,
                data_dir.join(CORPUS_FILENAMES[0]).display()
            )
        })
}
