//! Destinations for finished downloads

use std::io::Write;
use std::path::PathBuf;

use tempfile::NamedTempFile;
use tracing::info;

use crate::error::{EpaperError, Result};

/// A finished watermarked PDF, ready to hand to a sink.
#[derive(Debug, Clone)]
pub struct WatermarkedOutput {
    pub edition_id: String,
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl WatermarkedOutput {
    pub fn new(edition_id: &str, bytes: Vec<u8>) -> Self {
        Self {
            edition_id: edition_id.to_string(),
            filename: download_filename(edition_id),
            bytes,
        }
    }
}

/// `epaper-<editionId>-watermarked.pdf`, with anything that is not safe in a
/// file name replaced by `_`.
pub fn download_filename(edition_id: &str) -> String {
    let safe: String = edition_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("epaper-{}-watermarked.pdf", safe)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedDownload {
    pub filename: String,
    /// Where the file ended up, for sinks that write to disk
    pub path: Option<PathBuf>,
    pub size: usize,
}

/// Takes ownership of a finished download.
pub trait SaveSink {
    fn save(&mut self, output: WatermarkedOutput) -> Result<SavedDownload>;
}

/// Writes downloads into a directory. Files appear atomically.
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl SaveSink for DirectorySink {
    fn save(&mut self, output: WatermarkedOutput) -> Result<SavedDownload> {
        std::fs::create_dir_all(&self.dir).map_err(|e| EpaperError::Sink(e.to_string()))?;

        let target = self.dir.join(&output.filename);
        let mut tmp =
            NamedTempFile::new_in(&self.dir).map_err(|e| EpaperError::Sink(e.to_string()))?;
        tmp.write_all(&output.bytes)
            .map_err(|e| EpaperError::Sink(e.to_string()))?;
        tmp.persist(&target)
            .map_err(|e| EpaperError::Sink(e.to_string()))?;

        info!("Saved {} ({} bytes)", target.display(), output.bytes.len());

        Ok(SavedDownload {
            filename: output.filename,
            path: Some(target),
            size: output.bytes.len(),
        })
    }
}

/// Keeps downloads in memory until taken.
#[derive(Default)]
pub struct MemorySink {
    outputs: Vec<WatermarkedOutput>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take_last(&mut self) -> Option<WatermarkedOutput> {
        self.outputs.pop()
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }
}

impl SaveSink for MemorySink {
    fn save(&mut self, output: WatermarkedOutput) -> Result<SavedDownload> {
        let saved = SavedDownload {
            filename: output.filename.clone(),
            path: None,
            size: output.bytes.len(),
        };
        self.outputs.push(output);
        Ok(saved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_download_filename() {
        assert_eq!(download_filename("90001"), "epaper-90001-watermarked.pdf");
        assert_eq!(
            download_filename("../etc/passwd"),
            "epaper-___etc_passwd-watermarked.pdf"
        );
    }

    #[test]
    fn test_directory_sink_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = DirectorySink::new(dir.path().join("downloads"));
        let saved = sink
            .save(WatermarkedOutput::new("42", b"%PDF-1.7".to_vec()))
            .unwrap();

        let path = saved.path.unwrap();
        assert_eq!(path, dir.path().join("downloads/epaper-42-watermarked.pdf"));
        assert_eq!(std::fs::read(&path).unwrap(), b"%PDF-1.7");
        assert_eq!(saved.size, 8);
    }

    #[test]
    fn test_directory_sink_overwrites_previous_download() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = DirectorySink::new(dir.path());
        sink.save(WatermarkedOutput::new("7", b"old".to_vec())).unwrap();
        let saved = sink.save(WatermarkedOutput::new("7", b"new".to_vec())).unwrap();
        assert_eq!(std::fs::read(saved.path.unwrap()).unwrap(), b"new");
    }

    #[test]
    fn test_memory_sink_keeps_output() {
        let mut sink = MemorySink::new();
        sink.save(WatermarkedOutput::new("1", vec![1, 2, 3])).unwrap();
        assert_eq!(sink.len(), 1);
        let output = sink.take_last().unwrap();
        assert_eq!(output.bytes, vec![1, 2, 3]);
        assert!(sink.is_empty());
    }
}
