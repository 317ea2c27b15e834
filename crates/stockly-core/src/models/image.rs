//! Generated image records from the Image service.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// A prompt and the images generated for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
pub struct GeneratedImage {
    pub id: String,
    pub user_id: String,
    pub original_prompt: String,
    #[serde(default)]
    pub enhanced_prompt: Option<String>,
    #[serde(default, deserialize_with = "deserialize_image_urls")]
    pub image_urls: Vec<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(deserialize_with = "deserialize_timestamp")]
    #[cfg_attr(feature = "ts", ts(type = "string"))]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub is_deleted: bool,
}

impl GeneratedImage {
    /// The prompt the images were actually generated from.
    pub fn effective_prompt(&self) -> &str {
        self.enhanced_prompt
            .as_deref()
            .filter(|p| !p.is_empty())
            .unwrap_or(&self.original_prompt)
    }

    /// First image, used as the gallery thumbnail.
    pub fn cover_url(&self) -> Option<&str> {
        self.image_urls.first().map(String::as_str)
    }
}

/// The service stores `image_urls` as a JSON-encoded string and does not always
/// decode it before responding. Accept both shapes; undecodable strings yield
/// an empty list.
fn deserialize_image_urls<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum UrlsField {
        List(Vec<String>),
        Encoded(String),
        Null(()),
    }

    Ok(match UrlsField::deserialize(deserializer)? {
        UrlsField::List(urls) => urls,
        UrlsField::Encoded(raw) => serde_json::from_str(&raw).unwrap_or_default(),
        UrlsField::Null(()) => Vec::new(),
    })
}

/// Parse an RFC 3339 timestamp, or a naive ISO timestamp interpreted as UTC.
pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {}", raw)))
}

pub(crate) fn deserialize_optional_timestamp<'de, D>(
    deserializer: D,
) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(raw) => parse_timestamp(&raw)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {}", raw))),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image_json(urls: &str) -> String {
        format!(
            r#"{{"id":"img-1","user_id":"u-1","original_prompt":"a red fox","enhanced_prompt":null,"image_urls":{},"category":"animals","created_at":"2025-06-02T08:30:00.123456","is_deleted":false}}"#,
            urls
        )
    }

    #[test]
    fn test_image_urls_as_list() {
        let image: GeneratedImage = serde_json::from_str(&image_json(r#"["https://cdn/1.png","https://cdn/2.png"]"#))
            .expect("Failed to parse image JSON");
        assert_eq!(image.image_urls.len(), 2);
        assert_eq!(image.cover_url(), Some("https://cdn/1.png"));
        assert_eq!(image.effective_prompt(), "a red fox");
    }

    #[test]
    fn test_image_urls_as_encoded_string() {
        let image: GeneratedImage = serde_json::from_str(&image_json(r#""[\"https://cdn/1.png\"]""#))
            .expect("Failed to parse image JSON");
        assert_eq!(image.image_urls, vec!["https://cdn/1.png".to_string()]);
    }

    #[test]
    fn test_image_urls_undecodable_string_is_empty() {
        let image: GeneratedImage = serde_json::from_str(&image_json(r#""not json""#))
            .expect("Failed to parse image JSON");
        assert!(image.image_urls.is_empty());
        assert!(image.cover_url().is_none());
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let aware = parse_timestamp("2025-06-02T08:30:00+02:00").expect("rfc3339");
        assert_eq!(aware.to_rfc3339(), "2025-06-02T06:30:00+00:00");

        let naive = parse_timestamp("2025-06-02T08:30:00").expect("naive");
        assert_eq!(naive.to_rfc3339(), "2025-06-02T08:30:00+00:00");

        assert!(parse_timestamp("yesterday").is_none());
    }
}
