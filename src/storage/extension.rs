//! Content type to file extension mapping.

use phf::phf_map;

/// Extension used when the content type is not one we recognise.
pub const DEFAULT_EXTENSION: &str = ".jpg";

static EXTENSIONS: phf::Map<&'static str, &'static str> = phf_map! {
    "image/jpeg" => ".jpg",
    "image/png" => ".png",
    "image/webp" => ".webp",
    "image/gif" => ".gif",
};

/// Map a MIME type to the extension stored files get.
///
/// Total over all inputs: unknown types get [`DEFAULT_EXTENSION`].
pub fn resolve_extension(content_type: &str) -> &'static str {
    EXTENSIONS
        .get(content_type)
        .copied()
        .unwrap_or(DEFAULT_EXTENSION)
}
