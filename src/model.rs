use std::collections::HashMap;

use serde::Serialize;

#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    Null,
    Boolean(bool),
    Number(f64),
    Name(String),
    String(Vec<u8>),
    HexString(Vec<u8>),
    Array(Vec<Object>),
    Dictionary(HashMap<String, Object>),
    Stream {
        dict: HashMap<String, Object>,
        data: Vec<u8>,
    },
    Reference {
        obj_num: u32,
        gen_num: u16,
    },
    Keyword(String),
}

impl Object {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Object::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Object::Number(v) => Some(*v as i64),
            _ => None,
        }
    }

    /// Name with its leading slash, e.g. `/Type`.
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Object::Name(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&HashMap<String, Object>> {
        match self {
            Object::Dictionary(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Object]> {
        match self {
            Object::Array(v) => Some(v),
            _ => None,
        }
    }

    /// Raw payload of either string flavor.
    pub fn as_string_bytes(&self) -> Option<&[u8]> {
        match self {
            Object::String(v) | Object::HexString(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_keyword(&self) -> Option<&str> {
        match self {
            Object::Keyword(v) => Some(v),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Document {
    pub metadata: Metadata,
    pub pages: Vec<Page>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Metadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creator: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub producer: Option<String>,
    pub encrypted: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Page {
    pub page_number: usize,
    pub content: String,
    pub char_count: usize,
    pub width: f64,
    pub height: f64,
    /// `None` when image extraction was disabled, empty when enabled but
    /// nothing was found on the page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<Image>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Image {
    #[serde(rename = "type")]
    pub kind: ImageKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// `[x, y, width, height]` in user space, taken from the CTM in effect
    /// when the image was painted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rect: Option<[f64; 4]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color_space: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageKind {
    Image,
    InlineImage,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optional_output_fields_are_omitted() {
        let page = Page {
            page_number: 1,
            content: "Hi".to_string(),
            char_count: 2,
            width: 612.0,
            height: 792.0,
            images: None,
        };
        let json = serde_json::to_string(&page).expect("serialize");
        assert!(!json.contains("images"));

        let image = Image {
            kind: ImageKind::InlineImage,
            id: None,
            rect: Some([1.0, 2.0, 3.0, 4.0]),
            width: None,
            height: None,
            color_space: None,
        };
        let json = serde_json::to_string(&image).expect("serialize");
        assert!(json.contains("\"type\":\"inline_image\""));
        assert!(json.contains("\"rect\":[1.0,2.0,3.0,4.0]"));
        assert!(!json.contains("\"id\""));
        assert!(!json.contains("color_space"));
    }

    #[test]
    fn metadata_always_reports_the_encrypted_flag() {
        let metadata = Metadata::default();
        let json = serde_json::to_string(&metadata).expect("serialize");
        assert_eq!(json, "{\"encrypted\":false}");
    }
}
