use serde::Serialize;
use std::fmt::Write;
use std::io;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct FileEntry {
    pub name: String,
    pub size: u64,
    pub url: String,
}

fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

/// Regular, non-hidden files directly inside `dir`, sorted by name. A
/// missing directory lists as empty.
pub fn list_files(dir: &Path) -> io::Result<Vec<FileEntry>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    let walker = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name();

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) if err.depth() == 0 => return Err(io::Error::from(err)),
            Err(err) => {
                tracing::warn!(error = %err, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if is_hidden(&name) {
            continue;
        }
        let size = entry.metadata().map_err(io::Error::from)?.len();
        files.push(FileEntry {
            url: format!("/downloads/{}", name),
            name,
            size,
        });
    }

    Ok(files)
}

/// Maps a requested name onto a path inside `dir`, refusing anything that is
/// not a single visible path component.
pub fn resolve_download(dir: &Path, name: &str) -> Option<PathBuf> {
    if name.is_empty() || is_hidden(name) || name.contains(['/', '\\']) {
        return None;
    }
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Some(dir.join(name)),
        _ => None,
    }
}

fn is_attr_char(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || b"!#$&+-.^_`|~".contains(&byte)
}

/// `Content-Disposition` value with an ASCII fallback name plus the exact
/// UTF-8 name in RFC 5987 form.
pub fn content_disposition(name: &str) -> String {
    let fallback: String = name
        .chars()
        .map(|c| {
            if c.is_ascii() && !c.is_ascii_control() && c != '"' && c != '\\' {
                c
            } else {
                '_'
            }
        })
        .collect();

    let mut encoded = String::with_capacity(name.len());
    for byte in name.bytes() {
        if is_attr_char(byte) {
            encoded.push(byte as char);
        } else {
            let _ = write!(encoded, "%{:02X}", byte);
        }
    }

    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback, encoded
    )
}
