use crate::config::GeminiConfig;
use crate::models::{Category, Condition, ContactMethod, ImageRef, ListingDetails, SaleType};
use serde_json::json;

pub const GEMINI_PATH: &str = "/v1beta/models/gemini-test:generateContent";

pub fn gemini_config(base_url: &str) -> GeminiConfig {
    GeminiConfig {
        base_url: base_url.to_string(),
        api_key: "test-key".to_string(),
        model: "gemini-test".to_string(),
    }
}

/// A `generateContent` response whose only part is `text`.
pub fn gemini_reply(text: &str) -> String {
    json!({
        "candidates": [{
            "content": {"role": "model", "parts": [{"text": text}]},
            "finishReason": "STOP"
        }],
        "usageMetadata": {"promptTokenCount": 12, "candidatesTokenCount": 8, "totalTokenCount": 20}
    })
    .to_string()
}

pub fn accept_reply() -> String {
    r#"{"isGenuine": true, "validationMessage": "Looks like a genuine product photo"}"#.to_string()
}

pub fn sample_details() -> ListingDetails {
    ListingDetails {
        title: "Hercules cycle".into(),
        description: "Single speed, new tyres".into(),
        category: Some(Category::Cycles),
        condition: Some(Condition::Good),
        sale_type: SaleType::FixedPrice,
        price: 450.0,
        contact_method: Some(ContactMethod::Phone),
        phone: Some("9876543210".into()),
        email: None,
        meeting_location: "Main gate".into(),
        auction_days: None,
    }
}

pub fn sample_image(stem: &str) -> ImageRef {
    ImageRef::local(
        format!("{stem}.jpg"),
        "image/jpeg",
        format!("bytes-of-{stem}").into_bytes(),
    )
}
