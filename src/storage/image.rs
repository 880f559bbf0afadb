use crate::audio::base64_to_bytes;
use crate::{ReverieError, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Image bytes decoded from a data URL
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedImage {
    pub mime: String,
    pub bytes: Vec<u8>,
}

/// Split `data:<mime>;base64,<body>` into its mime type and body
pub fn parse_data_url(url: &str) -> Option<(&str, &str)> {
    let rest = url.strip_prefix("data:")?;
    let (header, body) = rest.split_once(',')?;
    let mime = header.strip_suffix(";base64")?;
    Some((mime, body))
}

/// Decoded size in bytes of a base64 payload or data URL
pub fn base64_size(data: &str) -> usize {
    let body = data.split_once(',').map(|(_, body)| body).unwrap_or(data);
    (body.len() * 3).div_ceil(4)
}

/// Human-readable byte count, e.g. `1.5 KB`
pub fn format_bytes(bytes: usize) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 B".to_string();
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let text = format!("{:.2}", value);
    let text = text.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", text, UNITS[unit])
}

/// Decoded images keyed by their data URL
#[derive(Default)]
pub struct ImageCache {
    entries: Mutex<HashMap<String, Arc<DecodedImage>>>,
}

impl ImageCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode `url` once and share the result afterwards
    pub fn get_or_decode(&self, url: &str) -> Result<Arc<DecodedImage>> {
        if let Some(image) = self.entries.lock().get(url) {
            return Ok(image.clone());
        }

        let (mime, body) = parse_data_url(url)
            .ok_or_else(|| ReverieError::Decode("Not a base64 data URL".into()))?;
        let image = Arc::new(DecodedImage {
            mime: mime.to_string(),
            bytes: base64_to_bytes(body)?,
        });
        debug!("Decoded {} image of {}", image.mime, format_bytes(image.bytes.len()));
        self.entries.lock().insert(url.to_string(), image.clone());
        Ok(image)
    }

    /// Release one image; returns whether it was cached
    pub fn revoke(&self, url: &str) -> bool {
        self.entries.lock().remove(url).is_some()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_data_url() {
        assert_eq!(
            parse_data_url("data:image/png;base64,AAAA"),
            Some(("image/png", "AAAA"))
        );
        assert_eq!(parse_data_url("data:image/png,AAAA"), None);
        assert_eq!(parse_data_url("AAAA"), None);
    }

    #[test]
    fn test_sizes() {
        assert_eq!(base64_size("data:image/png;base64,AAAA"), 3);
        assert_eq!(base64_size("AAAAA"), 4);
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3 MB");
    }

    #[test]
    fn test_cache_decodes_once() {
        let cache = ImageCache::new();
        let url = "data:image/jpeg;base64,aGVsbG8=";
        let first = cache.get_or_decode(url).unwrap();
        let second = cache.get_or_decode(url).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.bytes, b"hello");
        assert_eq!(first.mime, "image/jpeg");

        assert!(cache.revoke(url));
        assert!(cache.is_empty());
        assert!(cache.get_or_decode("plain").is_err());
    }
}
