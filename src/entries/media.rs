use base64ct::{Base64, Encoding};

use crate::error::FieldError;

pub const MAX_ATTACHMENTS: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    fn top_level(self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
        }
    }

    fn accepts(self, subtype: &str) -> bool {
        match self {
            MediaKind::Image => matches!(subtype, "jpeg" | "jpg" | "png" | "webp" | "heic" | "gif"),
            MediaKind::Video => matches!(subtype, "mp4" | "webm" | "quicktime" | "ogg"),
        }
    }
}

/// Checks `data:<type>/<subtype>[;params];base64,<payload>` and returns the
/// mime type on success.
pub fn check_data_uri(uri: &str, kind: MediaKind) -> Result<String, String> {
    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| "must be a data URI".to_string())?;
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| "missing data URI payload".to_string())?;
    let meta = meta
        .strip_suffix(";base64")
        .ok_or_else(|| "data URI must be base64 encoded".to_string())?;

    let mime = meta.split(';').next().unwrap_or_default().to_ascii_lowercase();
    let (top, subtype) = mime
        .split_once('/')
        .ok_or_else(|| format!("invalid mime type {mime:?}"))?;
    if top != kind.top_level() || !kind.accepts(subtype) {
        return Err(format!("unsupported {} type {mime:?}", kind.top_level()));
    }

    if payload.is_empty() {
        return Err("empty payload".into());
    }
    Base64::decode_vec(payload).map_err(|_| "invalid base64 payload".to_string())?;
    Ok(mime)
}

pub fn validate_attachments(
    field: &str,
    uris: &[String],
    kind: MediaKind,
    details: &mut Vec<FieldError>,
) {
    if uris.len() > MAX_ATTACHMENTS {
        details.push(FieldError::new(
            field,
            format!("at most {MAX_ATTACHMENTS} attachments are allowed"),
        ));
        return;
    }
    for (i, uri) in uris.iter().enumerate() {
        if let Err(msg) = check_data_uri(uri, kind) {
            details.push(FieldError::new(format!("{field}[{i}]"), msg));
        }
    }
}
