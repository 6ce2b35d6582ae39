use std::path::{Path, PathBuf};

pub const STORAGE_DIR: &str = ".chat-session";

#[must_use]
pub fn storage_root(cwd: &Path) -> PathBuf {
    cwd.join(STORAGE_DIR)
}

#[must_use]
pub fn sanitize_key_for_filename(key: &str) -> String {
    key.chars()
        .map(|c| match c {
            ':' | '/' | '\\' | ' ' | '.' => '-',
            _ => c,
        })
        .collect()
}

#[must_use]
pub fn slot_file_name(key: &str) -> String {
    format!("{}.json", sanitize_key_for_filename(key))
}
