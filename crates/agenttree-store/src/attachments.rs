//! Attachment handling (spec §4.2): filename sanitization and the
//! Markdown appendix appended to `problem.md`.

use std::path::{Path, PathBuf};

use agenttree_core::Result;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "svg", "bmp"];

/// Strip path components, replace unsafe characters, preserve extension.
pub fn sanitize_filename(original: &str) -> String {
    let base = Path::new(original)
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "attachment".to_string());

    const UNSAFE: &[char] = &['<', '>', ':', '"', '|', '?', '*', '\\', '/', '\0'];
    base.chars().map(|c| if UNSAFE.contains(&c) { '_' } else { c }).collect()
}

pub fn attachment_filename(unix_timestamp: i64, original: &str) -> String {
    format!("{unix_timestamp}_{}", sanitize_filename(original))
}

fn is_image(filename: &str) -> bool {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Save `bytes` under `<issue_dir>/attachments/<ts>_<sanitized>` and return
/// the Markdown appendix snippet to append to `problem.md`.
pub fn save_attachment(issue_dir: &Path, unix_timestamp: i64, original_name: &str, bytes: &[u8]) -> Result<(PathBuf, String)> {
    let filename = attachment_filename(unix_timestamp, original_name);
    let attachments_dir = issue_dir.join("attachments");
    std::fs::create_dir_all(&attachments_dir)?;
    let dest = attachments_dir.join(&filename);
    std::fs::write(&dest, bytes)?;

    let rel = format!("attachments/{filename}");
    let snippet = if is_image(&filename) {
        format!("![{original_name}]({rel})")
    } else {
        format!("[{original_name}]({rel})")
    };
    Ok((dest, snippet))
}
