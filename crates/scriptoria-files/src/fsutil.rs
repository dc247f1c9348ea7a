//! Small helpers over `std::io::Error` and temp-file naming

use std::ffi::OsStr;
use std::io;
use std::path::{Path, PathBuf};

use uuid::Uuid;

/// Prefix of in-flight temporary files
pub const TEMP_PREFIX: &str = ".tmp-";

const UUID_LEN: usize = 36;

/// True when the error means the path (or one of its parents) does not exist
pub fn is_missing(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::NotADirectory
    )
}

/// True when a rename failed because source and destination are on different volumes
pub fn is_cross_device(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::CrossesDevices
}

/// True for names produced by [`temp_path`]: the prefix, a UUID, then `-`
///
/// Other names that merely start with [`TEMP_PREFIX`] are ordinary entries.
pub fn is_temp_name(name: &OsStr) -> bool {
    let Some(rest) = name.to_str().and_then(|n| n.strip_prefix(TEMP_PREFIX)) else {
        return false;
    };
    match (rest.get(..UUID_LEN), rest.get(UUID_LEN..)) {
        (Some(id), Some(tail)) => tail.starts_with('-') && Uuid::parse_str(id).is_ok(),
        _ => false,
    }
}

/// Temporary sibling of `path`, unique per call
pub fn temp_path(path: &Path) -> PathBuf {
    let mut temp_path = path.to_path_buf();
    let file_name = format!(
        "{}{}-{}",
        TEMP_PREFIX,
        Uuid::new_v4(),
        path.file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("file")
    );
    temp_path.set_file_name(file_name);
    temp_path
}
