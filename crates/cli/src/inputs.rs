//! Input discovery
//!
//! Files named on the command line are taken as given. Directories are walked
//! recursively for video files, skipping hidden subdirectories.

use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Video file extensions picked up from directories (case-insensitive)
pub const VIDEO_EXTENSIONS: &[&str] = &["mkv", "mp4", "avi", "mov", "m4v", "ts", "m2ts", "webm", "flv", "wmv"];

pub fn is_video_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| VIDEO_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Expand the command line inputs into the list of files to convert.
///
/// Order follows the arguments; directory contents are sorted by name.
/// Duplicates are kept only once.
pub fn collect_inputs(inputs: &[PathBuf]) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = Vec::new();

    for input in inputs {
        if input.is_file() {
            push_unique(&mut files, input.clone());
            continue;
        }
        if !input.is_dir() {
            warn!(path = %input.display(), "input does not exist, skipping");
            continue;
        }

        let walker = WalkDir::new(input)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                // The root itself may be hidden
                !(entry.depth() > 0
                    && entry.file_type().is_dir()
                    && entry.file_name().to_string_lossy().starts_with('.'))
            });

        for entry in walker.filter_map(|e| e.ok()) {
            if entry.file_type().is_file() && is_video_file(entry.path()) {
                push_unique(&mut files, entry.into_path());
            }
        }
    }

    debug!(count = files.len(), "inputs collected");
    files
}

fn push_unique(files: &mut Vec<PathBuf>, path: PathBuf) {
    if !files.contains(&path) {
        files.push(path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::fs::{self, File};
    use tempfile::TempDir;

    #[test]
    fn test_is_video_file() {
        assert!(is_video_file(Path::new("/media/movie.mkv")));
        assert!(is_video_file(Path::new("/media/movie.MP4")));
        assert!(!is_video_file(Path::new("/media/notes.txt")));
        assert!(!is_video_file(Path::new("/media/movie")));
    }

    #[test]
    fn test_walks_directories_and_skips_hidden() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("season1")).unwrap();
        fs::create_dir_all(root.join(".cache")).unwrap();
        File::create(root.join("b.mkv")).unwrap();
        File::create(root.join("a.mp4")).unwrap();
        File::create(root.join("cover.jpg")).unwrap();
        File::create(root.join("season1/e01.avi")).unwrap();
        File::create(root.join(".cache/tmp.mkv")).unwrap();

        let files = collect_inputs(&[root.to_path_buf()]);
        assert_eq!(
            files,
            vec![root.join("a.mp4"), root.join("b.mkv"), root.join("season1/e01.avi")]
        );
    }

    #[test]
    fn test_explicit_files_kept_in_order_once() {
        let dir = TempDir::new().unwrap();
        let first = dir.path().join("z.mkv");
        let second = dir.path().join("clip.raw");
        File::create(&first).unwrap();
        File::create(&second).unwrap();

        let files = collect_inputs(&[
            first.clone(),
            second.clone(),
            dir.path().join("missing.mkv"),
            first.clone(),
        ]);
        // Explicit files bypass the extension filter
        assert_eq!(files, vec![first, second]);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_extension_match_ignores_case(
            stem in "[a-zA-Z0-9_-]{1,20}",
            idx in 0usize..VIDEO_EXTENSIONS.len(),
            upper in any::<bool>(),
        ) {
            let ext = if upper {
                VIDEO_EXTENSIONS[idx].to_uppercase()
            } else {
                VIDEO_EXTENSIONS[idx].to_string()
            };
            let path = PathBuf::from(format!("/media/{}.{}", stem, ext));
            prop_assert!(is_video_file(&path));

            let other = PathBuf::from(format!("/media/{}.{}x", stem, ext));
            prop_assert!(!is_video_file(&other));
        }
    }
}
