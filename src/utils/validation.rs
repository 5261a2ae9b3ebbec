use std::path::Path;
use thiserror::Error;

/// Longest file name we will write to disk
pub const MAX_FILENAME_LEN: usize = 255;

/// Longest accepted target format token (e.g. "pdf", "docx", "webp")
pub const MAX_FORMAT_LEN: usize = 16;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("No files")]
    NoFiles,

    #[error("Invalid target format '{0}'")]
    InvalidFormat(String),
}

/// Reduce a client supplied filename to a safe single path component.
///
/// Any directory part is dropped, reserved characters become `_`, and the result is
/// capped at [`MAX_FILENAME_LEN`] bytes. Names that end up empty or hidden are
/// replaced so the result is always usable on disk.
pub fn sanitize_filename(filename: &str) -> String {
    if filename.contains("..") || filename.contains('/') || filename.contains('\\') {
        tracing::warn!("Path components stripped from upload name: {}", filename);
    }

    // Split on both separators, browsers on Windows send full paths
    let name = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or("")
        .trim();

    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_control()
                || c == ':'
                || c == '*'
                || c == '?'
                || c == '"'
                || c == '<'
                || c == '>'
                || c == '|'
                || c == ';'
            {
                '_'
            } else {
                c
            }
        })
        .collect();

    let sanitized = truncate_utf8(sanitized.trim_start_matches('.'), MAX_FILENAME_LEN);

    if sanitized.is_empty() {
        "unnamed".to_string()
    } else {
        sanitized.to_string()
    }
}

/// Cut `s` to at most `max` bytes without splitting a character.
pub fn truncate_utf8(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Output base name for a converted file: the original name without its extension.
pub fn output_base_name(original_name: &str) -> String {
    let name = sanitize_filename(original_name);
    Path::new(&name)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or(&name)
        .to_string()
}

/// Normalize and check a requested target format.
pub fn normalize_format(raw: &str) -> Result<String, ValidationError> {
    let format = raw.trim().to_lowercase();
    let valid = !format.is_empty()
        && format.len() <= MAX_FORMAT_LEN
        && format.chars().all(|c| c.is_ascii_alphanumeric());

    if valid {
        Ok(format)
    } else {
        Err(ValidationError::InvalidFormat(raw.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("test.pdf"), "test.pdf");
        assert_eq!(sanitize_filename("my file.doc"), "my file.doc");
        assert_eq!(sanitize_filename("test<script>.pdf"), "test_script_.pdf");
        assert_eq!(sanitize_filename("测试.txt"), "测试.txt");
    }

    #[test]
    fn test_sanitize_filename_strips_paths() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\Users\\me\\report.docx"), "report.docx");
        assert_eq!(sanitize_filename(".hidden"), "hidden");
        assert_eq!(sanitize_filename(""), "unnamed");
        assert_eq!(sanitize_filename("dir/"), "unnamed");
    }

    #[test]
    fn test_sanitize_filename_length() {
        let long = "a".repeat(300) + ".txt";
        assert_eq!(sanitize_filename(&long).len(), MAX_FILENAME_LEN);
        assert_eq!(truncate_utf8("日本語", 4), "日");
    }

    #[test]
    fn test_output_base_name() {
        assert_eq!(output_base_name("a.txt"), "a");
        assert_eq!(output_base_name("b.png"), "b");
        assert_eq!(output_base_name("archive.tar.gz"), "archive.tar");
        assert_eq!(output_base_name("README"), "README");
    }

    #[test]
    fn test_normalize_format() {
        assert_eq!(normalize_format("PDF").unwrap(), "pdf");
        assert_eq!(normalize_format(" docx ").unwrap(), "docx");
        assert!(normalize_format("").is_err());
        assert!(normalize_format("../pdf").is_err());
        assert!(normalize_format("p df").is_err());
    }
}
