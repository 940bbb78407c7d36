//! Job kinds
//!
//! A [`JobSpecProvider`] turns an opaque work item into what the scheduler needs
//! to launch it: an output path, an optional duration hint and the tool
//! arguments. Each job kind (convert, merge, download, ...) implements it.

use std::path::{Path, PathBuf};
use std::time::Duration;

pub trait JobSpecProvider: Send + Sync + 'static {
    /// Work item type
    type Item: Send + 'static;

    /// File the job will write
    fn output_path(&self, item: &Self::Item, index: usize) -> PathBuf;

    /// Known media length, if the caller has probed it already
    fn duration_hint(&self, _item: &Self::Item) -> Option<Duration> {
        None
    }

    /// Arguments passed to the tool
    fn arguments(&self, item: &Self::Item, index: usize, output: &Path) -> Vec<String>;
}

/// Converts input files into another container/extension
#[derive(Debug, Clone)]
pub struct ConvertProvider {
    /// Directory receiving the converted files
    pub output_dir: PathBuf,
    /// Target extension without the dot, e.g. `mp4`
    pub extension: String,
    /// Extra tool arguments inserted between input and output
    pub extra_args: Vec<String>,
}

impl ConvertProvider {
    pub fn new(output_dir: PathBuf, extension: impl Into<String>) -> Self {
        Self {
            output_dir,
            extension: extension.into().trim_start_matches('.').to_string(),
            extra_args: Vec::new(),
        }
    }

    pub fn with_extra_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }
}

impl JobSpecProvider for ConvertProvider {
    type Item = PathBuf;

    fn output_path(&self, item: &PathBuf, index: usize) -> PathBuf {
        let stem = item
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| format!("output_{}", index));

        let mut output = self.output_dir.join(format!("{}.{}", stem, self.extension));
        // Never overwrite the input in place
        if output == *item {
            output = self
                .output_dir
                .join(format!("{}_converted.{}", stem, self.extension));
        }
        output
    }

    fn arguments(&self, item: &PathBuf, _index: usize, output: &Path) -> Vec<String> {
        let mut args = vec![
            "-hide_banner".to_string(),
            "-y".to_string(),
            "-i".to_string(),
            item.to_string_lossy().into_owned(),
        ];
        args.extend(self.extra_args.iter().cloned());
        args.push(output.to_string_lossy().into_owned());
        args
    }
}
