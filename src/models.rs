use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub const DEFAULT_START_DATE: &str = "2022-12-25";
pub const MAX_ITEM_IMAGES: usize = 9;
pub const UPLOADS_URI_PREFIX: &str = "/uploads/";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TimelineDocument {
    #[serde(default = "default_start_date", deserialize_with = "null_as_start_date")]
    pub start_date: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub items: Vec<TimelineItem>,
}

impl Default for TimelineDocument {
    fn default() -> Self {
        Self {
            start_date: default_start_date(),
            items: Vec::new(),
        }
    }
}

impl TimelineDocument {
    pub fn find_item(&self, id: &str) -> Option<&TimelineItem> {
        self.items.iter().find(|item| item.id == id)
    }

    pub fn position_of(&self, id: &str) -> Option<usize> {
        self.items.iter().position(|item| item.id == id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TimelineItem {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub date: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub images: Vec<String>,
    /// Single-image field written by older versions; read but never migrated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub views: ItemViews,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ItemViews {
    #[serde(default, deserialize_with = "null_as_default")]
    pub zhl: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub yxh: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ViewsPatch {
    pub zhl: Option<String>,
    pub yxh: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CreateItemRequest {
    pub title: Option<String>,
    pub date: Option<String>,
    pub images: Option<Vec<String>>,
    pub views: Option<ViewsPatch>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdateItemRequest {
    pub title: Option<String>,
    pub date: Option<String>,
    pub images: Option<Vec<String>>,
    pub views: Option<ViewsPatch>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StartDateResponse {
    pub start_date: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UploadListing {
    pub uploads: Vec<String>,
    pub cleaned: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StoredUpload {
    pub uri: String,
    pub filename: String,
    pub bytes: usize,
}

pub fn upload_uri(filename: &str) -> String {
    format!("{}{}", UPLOADS_URI_PREFIX, filename)
}

pub fn truncate_images(mut images: Vec<String>) -> Vec<String> {
    images.truncate(MAX_ITEM_IMAGES);
    images
}

fn default_start_date() -> String {
    DEFAULT_START_DATE.to_string()
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn null_as_start_date<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_else(default_start_date))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn legacy_item_keeps_single_image_and_unknown_fields() {
        let item: TimelineItem = serde_json::from_value(json!({
            "id": "item-1",
            "date": "2023-01-01",
            "title": "Old",
            "image": "/uploads/old.png",
            "mood": "sunny"
        }))
        .expect("legacy item parses");

        assert!(item.images.is_empty());
        assert_eq!(item.image.as_deref(), Some("/uploads/old.png"));
        assert_eq!(item.views, ItemViews::default());

        let written = serde_json::to_value(&item).expect("serialize item");
        assert_eq!(written["image"], "/uploads/old.png");
        assert_eq!(written["mood"], "sunny");
        assert_eq!(written["images"], json!([]));
    }

    #[test]
    fn nulls_fall_back_to_defaults() {
        let document: TimelineDocument = serde_json::from_value(json!({
            "startDate": null,
            "items": [{"title": "x", "images": null, "views": {"zhl": null}}]
        }))
        .expect("document parses");

        assert_eq!(document.start_date, DEFAULT_START_DATE);
        assert_eq!(document.items[0].images, Vec::<String>::new());
        assert_eq!(document.items[0].views.zhl, "");
        assert!(document.items[0].id.is_empty());
    }

    #[test]
    fn truncates_to_nine_images() {
        let images = (0..12).map(|i| format!("/uploads/{i}.png")).collect();
        let kept = truncate_images(images);
        assert_eq!(kept.len(), MAX_ITEM_IMAGES);
        assert_eq!(kept[8], "/uploads/8.png");
    }
}
