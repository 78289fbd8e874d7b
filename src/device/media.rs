//! Deciding which listed files are photos/videos worth copying

use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

/// Row printed by `gphoto2 --list-files` without `-q`:
/// `#12    IMG_0012.JPG    rd  5342 KB image/jpeg 1694012345`
fn file_row_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^#(\d+)\s+(\S+)").expect("valid file row pattern"))
}

/// File name of one listing line: the name column of a `#N` row, else the path's basename
pub fn file_name(line: &str) -> &str {
    let line = line.trim();
    if let Some(caps) = file_row_regex().captures(line) {
        if let Some(name) = caps.get(2) {
            return name.as_str();
        }
    }
    line.rsplit('/').next().unwrap_or(line)
}

/// Whether `name` carries one of `extensions` (case-insensitive)
pub fn is_copyable(name: &str, extensions: &[String]) -> bool {
    let Some(ext) = Path::new(name).extension().and_then(|e| e.to_str()) else {
        return false;
    };
    let ext = ext.to_lowercase();
    extensions.iter().any(|allowed| allowed.eq_ignore_ascii_case(&ext))
}

/// 1-based positions of the copyable entries, as gphoto2 numbers them
pub fn copyable_indexes(files: &[String], extensions: &[String]) -> Vec<usize> {
    files
        .iter()
        .enumerate()
        .filter(|(_, line)| is_copyable(file_name(line), extensions))
        .map(|(i, _)| i + 1)
        .collect()
}

/// Folder-safe form of a camera name: lowercase ASCII words joined by `-`
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    if slug.is_empty() {
        slug.push_str("camera");
    }
    slug
}
