//! # File Management Module
//!
//! Enumerazione della directory di input e selezione dei file da processare.
//!
//! ## Responsabilità:
//! - Mappa directory → nomi file (con o senza sottodirectory) via `walkdir`
//! - Selezione per directory (di default tutte) e per tipo di file (estensione), in ordine stabile
//!
//! La selezione è solo un filtro di comodo: ogni file selezionato passa
//! comunque dalla catena di sicurezza completa prima di essere toccato.
//!
//! ## Esempio:
//! ```rust,ignore
//! let structure = FileManager::scan_directory(&root, true);
//! let files = FileManager::select_files(&structure, &["jpg".to_string(), "png".to_string()], &[]);
//! ```

use crate::security::classifier::extension_of;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// File types offered for selection when none are given
pub const DEFAULT_FILE_TYPES: &[&str] = &[
    "mp4", "webm", "avi", "mov", "mkv", "jpg", "jpeg", "png", "webp", "tiff", "bmp", "gif",
];

/// Directory → file names, both sorted
pub type FolderStructure = BTreeMap<PathBuf, Vec<String>>;

/// Directory enumeration and selection
pub struct FileManager;

impl FileManager {
    /// Map every visited directory to the names of the non-directory entries it holds.
    /// Symlinks are listed but not followed; unreadable entries are logged and skipped.
    pub fn scan_directory(root: &Path, recursive: bool) -> FolderStructure {
        let mut structure = FolderStructure::new();
        let max_depth = if recursive { usize::MAX } else { 1 };

        for entry in WalkDir::new(root).max_depth(max_depth).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable directory entry");
                    continue;
                }
            };

            if entry.file_type().is_dir() {
                structure.entry(entry.path().to_path_buf()).or_default();
            } else if let Some(parent) = entry.path().parent() {
                structure
                    .entry(parent.to_path_buf())
                    .or_default()
                    .push(entry.file_name().to_string_lossy().into_owned());
            }
        }

        debug!(
            root = %root.display(),
            directories = structure.len(),
            files = structure.values().map(Vec::len).sum::<usize>(),
            "Directory scanned"
        );
        structure
    }

    /// Files whose lowercased extension is one of `file_types`, directories in
    /// sorted order and names sorted within each directory.
    ///
    /// `directories` limits the selection to those exact directories (their
    /// subdirectories are not implied); an empty slice selects every directory.
    pub fn select_files(
        structure: &FolderStructure,
        file_types: &[String],
        directories: &[PathBuf],
    ) -> Vec<PathBuf> {
        let wanted: Vec<String> = file_types
            .iter()
            .map(|t| t.trim().trim_start_matches('.').to_lowercase())
            .collect();

        for dir in directories {
            if !structure.contains_key(dir) {
                warn!(directory = %dir.display(), "Selected directory was not found in the scan");
            }
        }

        structure
            .iter()
            .filter(|(dir, _)| directories.is_empty() || directories.contains(dir))
            .flat_map(|(dir, names)| names.iter().map(move |name| dir.join(name)))
            .filter(|path| wanted.contains(&extension_of(path)))
            .collect()
    }

    /// `DEFAULT_FILE_TYPES` as owned strings
    pub fn default_file_types() -> Vec<String> {
        DEFAULT_FILE_TYPES.iter().map(|t| t.to_string()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn populate(root: &Path) {
        fs::create_dir_all(root.join("sub")).unwrap();
        fs::write(root.join("b.PNG"), b"x").unwrap();
        fs::write(root.join("a.jpg"), b"x").unwrap();
        fs::write(root.join("notes.txt"), b"x").unwrap();
        fs::write(root.join("sub").join("clip.mp4"), b"x").unwrap();
    }

    #[test]
    fn test_recursive_scan_lists_every_directory() {
        let temp_dir = TempDir::new().unwrap();
        populate(temp_dir.path());

        let structure = FileManager::scan_directory(temp_dir.path(), true);
        assert_eq!(structure.len(), 2);
        assert_eq!(structure[temp_dir.path()], vec!["a.jpg", "b.PNG", "notes.txt"]);
        assert_eq!(structure[&temp_dir.path().join("sub")], vec!["clip.mp4"]);
    }

    #[test]
    fn test_non_recursive_scan_stays_at_top_level() {
        let temp_dir = TempDir::new().unwrap();
        populate(temp_dir.path());

        let structure = FileManager::scan_directory(temp_dir.path(), false);
        let files = FileManager::select_files(&structure, &FileManager::default_file_types(), &[]);
        assert_eq!(files, vec![temp_dir.path().join("a.jpg"), temp_dir.path().join("b.PNG")]);
    }

    #[test]
    fn test_selection_filters_by_type_in_stable_order() {
        let temp_dir = TempDir::new().unwrap();
        populate(temp_dir.path());

        let structure = FileManager::scan_directory(temp_dir.path(), true);
        let files = FileManager::select_files(&structure, &["mp4".to_string(), ".png".to_string()], &[]);
        assert_eq!(
            files,
            vec![temp_dir.path().join("b.PNG"), temp_dir.path().join("sub").join("clip.mp4")]
        );

        assert!(FileManager::select_files(&structure, &[], &[]).is_empty());
    }

    #[test]
    fn test_selection_limited_to_chosen_directories() {
        let temp_dir = TempDir::new().unwrap();
        populate(temp_dir.path());
        fs::write(temp_dir.path().join("sub").join("still.png"), b"x").unwrap();

        let structure = FileManager::scan_directory(temp_dir.path(), true);
        let types = FileManager::default_file_types();

        let only_sub = FileManager::select_files(&structure, &types, &[temp_dir.path().join("sub")]);
        assert_eq!(
            only_sub,
            vec![temp_dir.path().join("sub").join("clip.mp4"), temp_dir.path().join("sub").join("still.png")]
        );

        // The root alone does not pull in its subdirectories
        let only_root = FileManager::select_files(&structure, &types, &[temp_dir.path().to_path_buf()]);
        assert_eq!(only_root, vec![temp_dir.path().join("a.jpg"), temp_dir.path().join("b.PNG")]);

        let missing = FileManager::select_files(&structure, &types, &[temp_dir.path().join("nope")]);
        assert!(missing.is_empty());
    }
}
