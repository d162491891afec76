/// Extension used in the stored object key: the text after the last `.`
/// (the whole name when there is no dot), reduced to ASCII alphanumerics.
pub fn file_extension(filename: &str) -> String {
    let raw = filename.rsplit('.').next().unwrap_or_default();
    let ext: String = raw
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(16)
        .collect::<String>()
        .to_lowercase();

    if ext.is_empty() { "bin".to_string() } else { ext }
}

/// Object key for an upload: `{uploaderId}/{epochMillis}.{ext}`.
pub fn storage_path(uploader_id: &str, epoch_millis: i64, filename: &str) -> String {
    format!("{}/{}.{}", uploader_id, epoch_millis, file_extension(filename))
}

/// MIME type sniffed from the magic bytes, falling back to octet-stream.
pub fn detect_content_type(data: &[u8]) -> String {
    infer::get(data)
        .map(|kind| kind.mime_type().to_string())
        .unwrap_or_else(|| mime::APPLICATION_OCTET_STREAM.to_string())
}

pub fn is_blank(value: Option<&str>) -> bool {
    value.map(|v| v.trim().is_empty()).unwrap_or(true)
}
