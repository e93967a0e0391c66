/// Extension used when the content type is not in the table.
pub const FALLBACK_EXTENSION: &str = ".bin";

/// Strip parameters: `"audio/ogg; codecs=opus"` → `"audio/ogg"`.
pub fn normalize(mimetype: &str) -> &str {
    mimetype.split(';').next().unwrap_or(mimetype).trim()
}

/// File extension (with leading dot) for a content type. Parameters are
/// ignored; unknown types map to [`FALLBACK_EXTENSION`].
pub fn extension_for(mimetype: &str) -> &'static str {
    match normalize(mimetype).to_ascii_lowercase().as_str() {
        "image/jpeg" => ".jpeg",
        "image/jpg" => ".jpg",
        "image/png" => ".png",
        "image/gif" => ".gif",
        "image/webp" => ".webp",
        "audio/mpeg" => ".mp3",
        "audio/wav" => ".wav",
        "audio/ogg" => ".ogg",
        "audio/mp4" => ".m4a",
        "video/mp4" => ".mp4",
        "video/x-msvideo" => ".avi",
        "video/quicktime" => ".mov",
        "video/webm" => ".webm",
        "video/x-flv" => ".flv",
        "application/pdf" => ".pdf",
        "application/msword" => ".doc",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => ".docx",
        "application/vnd.ms-excel" => ".xls",
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet" => ".xlsx",
        "application/vnd.ms-powerpoint" => ".ppt",
        "application/vnd.openxmlformats-officedocument.presentationml.presentation" => ".pptx",
        "application/zip" => ".zip",
        "application/rtf" => ".rtf",
        "application/json" => ".json",
        "application/xml" => ".xml",
        "text/plain" => ".txt",
        _ => FALLBACK_EXTENSION,
    }
}

/// Media type reported downstream for a provider message type. Voice notes
/// are plain audio to the receiver.
pub fn media_type_for(message_kind: &str) -> &str {
    match message_kind {
        "ptt" => "audio",
        other => other,
    }
}
