//! Numbered, append-only record directories
//!
//! Each record lives in its own file named after its zero-padded sequence
//! number. A record is written to a temp file, synced, and then hard-linked
//! to its final name; linking fails if the name is taken, so two writers
//! can never claim the same number and a crash leaves either a complete
//! record or none. The next number is always derived from what is on disk.

use std::path::{Path, PathBuf};

use tokio::fs::{self, OpenOptions};
use tokio::io::{self, AsyncWriteExt};
use tracing::{debug, warn};

use crate::{error::FileError, fsutil};

const RECORD_DIGITS: usize = 20;
const RECORD_SUFFIX: &str = ".json";

/// A directory of sequentially numbered records
#[derive(Debug, Clone)]
pub(crate) struct SequenceDir {
    dir: PathBuf,
}

impl SequenceDir {
    pub(crate) fn new(dir: &Path) -> Self {
        SequenceDir {
            dir: dir.to_path_buf(),
        }
    }

    /// Highest number in use, 0 when the directory is empty or missing
    pub(crate) async fn highest(&self) -> Result<u64, FileError> {
        Ok(self.numbers().await?.last().copied().unwrap_or(0))
    }

    /// All numbers in use, ascending
    pub(crate) async fn numbers(&self) -> Result<Vec<u64>, FileError> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if fsutil::is_missing(&e) => return Ok(Vec::new()),
            Err(e) => return Err(FileError::IoError(e)),
        };
        let mut numbers = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if let Some(number) = entry.file_name().to_str().and_then(parse_record_name) {
                numbers.push(number);
            }
        }
        numbers.sort_unstable();
        Ok(numbers)
    }

    /// Raw bytes of record `number`, `None` if it does not exist
    pub(crate) async fn read(&self, number: u64) -> Result<Option<Vec<u8>>, FileError> {
        match fs::read(self.dir.join(record_name(number))).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if fsutil::is_missing(&e) => Ok(None),
            Err(e) => Err(FileError::IoError(e)),
        }
    }

    /// Durably stores the next record
    ///
    /// `encode` is called with the number being claimed and may be called
    /// again with a higher number if another writer took it first. Callers
    /// serialize appends within the process; the retry only covers other
    /// processes sharing the directory.
    pub(crate) async fn append<F>(&self, mut encode: F) -> Result<u64, FileError>
    where
        F: FnMut(u64) -> Result<Vec<u8>, FileError>,
    {
        fs::create_dir_all(&self.dir).await?;
        let mut number = self.highest().await? + 1;
        loop {
            let bytes = encode(number)?;
            let target = self.dir.join(record_name(number));
            let temp = fsutil::temp_path(&target);

            let linked = match write_synced(&temp, &bytes).await {
                Ok(()) => fs::hard_link(&temp, &target).await,
                Err(e) => Err(e),
            };
            if let Err(e) = fs::remove_file(&temp).await {
                if !fsutil::is_missing(&e) {
                    warn!(temp = %temp.display(), error = %e, "Failed to remove temp record");
                }
            }

            match linked {
                Ok(()) => {
                    sync_dir(&self.dir).await?;
                    debug!(dir = %self.dir.display(), number, "Appended record");
                    return Ok(number);
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    debug!(dir = %self.dir.display(), number, "Record number taken, retrying");
                    number += 1;
                }
                Err(e) => return Err(FileError::IoError(e)),
            }
        }
    }
}

fn record_name(number: u64) -> String {
    format!("{:0width$}{}", number, RECORD_SUFFIX, width = RECORD_DIGITS)
}

fn parse_record_name(name: &str) -> Option<u64> {
    let digits = name.strip_suffix(RECORD_SUFFIX)?;
    if digits.len() != RECORD_DIGITS || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok().filter(|number| *number > 0)
}

async fn write_synced(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;
    file.write_all(bytes).await?;
    file.sync_all().await
}

#[cfg(unix)]
async fn sync_dir(dir: &Path) -> io::Result<()> {
    fs::File::open(dir).await?.sync_all().await
}

#[cfg(not(unix))]
async fn sync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_record_names() {
        assert_eq!(record_name(7), "00000000000000000007.json");
        assert_eq!(parse_record_name("00000000000000000007.json"), Some(7));
        assert_eq!(parse_record_name("7.json"), None);
        assert_eq!(parse_record_name(".tmp-abc-00000000000000000007.json"), None);
        assert_eq!(parse_record_name("00000000000000000000.json"), None);
    }

    #[tokio::test]
    async fn test_missing_dir_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let seq = SequenceDir::new(&temp_dir.path().join("none"));
        assert_eq!(seq.highest().await.unwrap(), 0);
        assert!(seq.read(1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_append_is_contiguous_and_durable() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("records");
        let seq = SequenceDir::new(&dir);

        for expected in 1..=3 {
            let number = seq
                .append(|n| Ok(format!("record {}", n).into_bytes()))
                .await
                .unwrap();
            assert_eq!(number, expected);
        }
        assert_eq!(seq.numbers().await.unwrap(), vec![1, 2, 3]);
        assert_eq!(seq.read(2).await.unwrap().unwrap(), b"record 2");

        // A fresh handle derives the counter from disk
        let reopened = SequenceDir::new(&dir);
        assert_eq!(reopened.append(|_| Ok(Vec::new())).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_taken_number_is_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("records");
        let seq = SequenceDir::new(&dir);
        seq.append(|_| Ok(b"first".to_vec())).await.unwrap();

        let mut calls = Vec::new();
        let number = seq
            .append(|n| {
                calls.push(n);
                if calls.len() == 1 {
                    // Another writer claims the number between scan and link
                    std::fs::write(dir.join(record_name(n)), b"other").unwrap();
                }
                Ok(format!("mine {}", n).into_bytes())
            })
            .await
            .unwrap();

        assert_eq!(number, 3);
        assert_eq!(calls, vec![2, 3]);
        assert_eq!(seq.read(2).await.unwrap().unwrap(), b"other");
        assert_eq!(seq.read(3).await.unwrap().unwrap(), b"mine 3");
    }

    #[tokio::test]
    async fn test_no_temp_files_left_behind() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("records");
        let seq = SequenceDir::new(&dir);
        seq.append(|_| Ok(b"x".to_vec())).await.unwrap();

        let names: Vec<_> = std::fs::read_dir(&dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec![record_name(1)]);
    }
}
