//! Static registry of supported conversion format pairs.
//!
//! Pure lookup tables, no state. The registry decides which submissions are
//! accepted and which external converter a worker selects for a claimed job.

use serde::{Deserialize, Serialize};

/// Broad classification of a file format.
///
/// The kind selects which external converter runs a job; it is never used
/// for anything format-specific beyond that.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatKind {
    Image,
    Audio,
    Video,
    Document,
}

impl FormatKind {
    /// Stable lowercase name, used in logs and API responses.
    pub fn as_str(&self) -> &'static str {
        match self {
            FormatKind::Image => "image",
            FormatKind::Audio => "audio",
            FormatKind::Video => "video",
            FormatKind::Document => "document",
        }
    }
}

impl std::fmt::Display for FormatKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Image formats accepted as source or target.
pub const IMAGE_FORMATS: &[&str] = &["jpeg", "png", "webp", "bmp", "tiff", "gif", "ico"];

/// Audio formats accepted as source or target.
pub const AUDIO_FORMATS: &[&str] = &[
    "mp3", "wav", "aac", "flac", "ogg", "opus", "m4a", "wma", "amr", "ac3",
];

/// Video container formats accepted as source or target.
pub const VIDEO_FORMATS: &[&str] = &["mp4", "mkv", "mov", "avi", "webm", "flv", "wmv", "mpeg"];

/// Document formats accepted as source or target.
pub const DOCUMENT_FORMATS: &[&str] = &["pdf", "docx", "txt", "rtf", "odt"];

/// Image targets a pdf source may be rendered to.
const PDF_IMAGE_TARGETS: &[&str] = &["jpeg", "png", "tiff", "webp", "bmp"];

/// Normalizes a format string: lowercase, common aliases collapsed.
pub fn normalize(format: &str) -> String {
    let lower = format.trim().trim_start_matches('.').to_ascii_lowercase();
    match lower.as_str() {
        "jpg" => "jpeg".to_string(),
        "tif" => "tiff".to_string(),
        "mpg" => "mpeg".to_string(),
        _ => lower,
    }
}

/// Classifies a (normalized) format into a kind, or `None` if unknown.
pub fn kind_of(format: &str) -> Option<FormatKind> {
    let norm = normalize(format);
    let f = norm.as_str();
    if IMAGE_FORMATS.contains(&f) {
        Some(FormatKind::Image)
    } else if AUDIO_FORMATS.contains(&f) {
        Some(FormatKind::Audio)
    } else if VIDEO_FORMATS.contains(&f) {
        Some(FormatKind::Video)
    } else if DOCUMENT_FORMATS.contains(&f) {
        Some(FormatKind::Document)
    } else {
        None
    }
}

/// Returns whether the (source, target) pair is a supported conversion.
///
/// Same-kind pairs are supported, plus pdf rendered to a raster image.
/// The identity pair is allowed (remuxing/metadata stripping is a valid job).
pub fn supported(source: &str, target: &str) -> bool {
    let (source, target) = (normalize(source), normalize(target));
    let (Some(src_kind), Some(dst_kind)) = (kind_of(&source), kind_of(&target)) else {
        return false;
    };

    if src_kind == dst_kind {
        return true;
    }

    src_kind == FormatKind::Document
        && source == "pdf"
        && dst_kind == FormatKind::Image
        && PDF_IMAGE_TARGETS.contains(&target.as_str())
}

/// All known formats grouped by kind, for the formats listing endpoint.
pub fn all_formats() -> Vec<(FormatKind, &'static [&'static str])> {
    vec![
        (FormatKind::Image, IMAGE_FORMATS),
        (FormatKind::Audio, AUDIO_FORMATS),
        (FormatKind::Video, VIDEO_FORMATS),
        (FormatKind::Document, DOCUMENT_FORMATS),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        assert_eq!(kind_of("png"), Some(FormatKind::Image));
        assert_eq!(kind_of("flac"), Some(FormatKind::Audio));
        assert_eq!(kind_of("mkv"), Some(FormatKind::Video));
        assert_eq!(kind_of("pdf"), Some(FormatKind::Document));
        assert_eq!(kind_of("midi"), None);
    }

    #[test]
    fn test_normalize_aliases() {
        assert_eq!(normalize("JPG"), "jpeg");
        assert_eq!(normalize(".PNG"), "png");
        assert_eq!(normalize("tif"), "tiff");
        assert_eq!(kind_of("jpg"), Some(FormatKind::Image));
    }

    #[test]
    fn test_same_kind_pairs_supported() {
        assert!(supported("png", "webp"));
        assert!(supported("flac", "mp3"));
        assert!(supported("mkv", "mp4"));
        assert!(supported("docx", "pdf"));
    }

    #[test]
    fn test_identity_pair_supported() {
        assert!(supported("mp3", "mp3"));
    }

    #[test]
    fn test_cross_kind_pairs_rejected() {
        assert!(!supported("mp3", "png"));
        assert!(!supported("mkv", "flac"));
        assert!(!supported("png", "pdf"));
    }

    #[test]
    fn test_unknown_formats_rejected() {
        assert!(!supported("heif", "midi"));
        assert!(!supported("png", "midi"));
        assert!(!supported("", "png"));
    }

    #[test]
    fn test_pdf_to_image_supported() {
        assert!(supported("pdf", "png"));
        assert!(supported("pdf", "jpeg"));
        // Only pdf gets the raster escape hatch, and only to raster targets.
        assert!(!supported("docx", "png"));
        assert!(!supported("pdf", "gif"));
    }
}
