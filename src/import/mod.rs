use crate::models::Activity;
use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub mod csv;
pub mod fit;
pub mod validation;

/// Trait for importing activities from different file formats
pub trait ImportFormat: Send + Sync {
    /// Check if this importer can handle the given file
    fn can_import(&self, file_path: &Path) -> bool;

    /// Import activities from the file
    fn import_file(&self, file_path: &Path) -> Result<Vec<Activity>>;

    /// Get the format name for this importer
    fn get_format_name(&self) -> &'static str;
}

/// Outcome of a directory import
#[derive(Debug, Default)]
pub struct DirectoryImport {
    pub activities: Vec<Activity>,
    pub failures: Vec<(PathBuf, String)>,
}

impl DirectoryImport {
    pub fn is_fully_successful(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Manager for coordinating different import formats
pub struct ImportManager {
    importers: Vec<Box<dyn ImportFormat>>,
}

impl ImportManager {
    /// Create a new import manager with all available importers
    pub fn new() -> Self {
        let importers: Vec<Box<dyn ImportFormat>> = vec![
            Box::new(csv::CsvImporter::new()),
            Box::new(fit::FitImporter::new()),
        ];

        Self { importers }
    }

    fn importer_for(&self, file_path: &Path) -> Option<&dyn ImportFormat> {
        self.importers
            .iter()
            .find(|importer| importer.can_import(file_path))
            .map(|importer| importer.as_ref())
    }

    /// Import a single file, auto-detecting the format
    pub fn import_file(&self, file_path: &Path) -> Result<Vec<Activity>> {
        if !file_path.exists() {
            return Err(crate::error::ImportError::FileNotFound {
                path: file_path.to_path_buf(),
            }
            .into());
        }

        match self.importer_for(file_path) {
            Some(importer) => {
                info!(
                    file = %file_path.display(),
                    format = importer.get_format_name(),
                    "Importing activity"
                );
                importer.import_file(file_path)
            }
            None => Err(crate::error::ImportError::UnsupportedFormat {
                path: file_path.to_path_buf(),
            }
            .into()),
        }
    }

    /// Import all supported files from a directory in parallel
    pub fn import_directory(&self, dir_path: &Path, show_progress: bool) -> Result<DirectoryImport> {
        let files = self.collect_importable_files(dir_path)?;
        if files.is_empty() {
            warn!(dir = %dir_path.display(), "No importable files found");
            return Ok(DirectoryImport::default());
        }

        let pb = if show_progress {
            let bar = ProgressBar::new(files.len() as u64);
            bar.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({msg})")?
                    .progress_chars("#>-"),
            );
            bar
        } else {
            ProgressBar::hidden()
        };

        let results: Vec<(PathBuf, Result<Vec<Activity>>)> = files
            .into_par_iter()
            .map(|path| {
                let result = self.import_file(&path);
                pb.inc(1);
                (path, result)
            })
            .collect();

        let mut outcome = DirectoryImport::default();
        for (path, result) in results {
            match result {
                Ok(mut activities) => outcome.activities.append(&mut activities),
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "Failed to import file");
                    outcome.failures.push((path, e.to_string()));
                }
            }
        }
        // Parallel import order is arbitrary
        outcome
            .activities
            .sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.id.cmp(&b.id)));

        pb.finish_with_message("Import complete");
        info!(
            activities = outcome.activities.len(),
            failures = outcome.failures.len(),
            "Directory import finished"
        );
        Ok(outcome)
    }

    /// Collect all files that can be imported from a directory
    fn collect_importable_files(&self, dir_path: &Path) -> Result<Vec<PathBuf>> {
        if !dir_path.is_dir() {
            anyhow::bail!("Path is not a directory: {}", dir_path.display());
        }

        let mut files = Vec::new();
        for entry in std::fs::read_dir(dir_path)? {
            let path = entry?.path();
            if path.is_file() && self.can_import_file(&path) {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// Check if this manager can import a given file
    pub fn can_import_file(&self, file_path: &Path) -> bool {
        self.importer_for(file_path).is_some()
    }
}

impl Default for ImportManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Extension check shared by the importers
pub(crate) fn has_extension(file_path: &Path, ext: &str) -> bool {
    file_path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case(ext))
        .unwrap_or(false)
}
