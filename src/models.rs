use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::skip_serializing_none;
use thiserror::Error;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Books,
    Electronics,
    Cycles,
    #[serde(rename = "hostel", alias = "hostel essentials", alias = "hostel_essentials")]
    HostelEssentials,
    Projects,
    Other,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Books => "books",
            Category::Electronics => "electronics",
            Category::Cycles => "cycles",
            Category::HostelEssentials => "hostel",
            Category::Projects => "projects",
            Category::Other => "other",
        }
    }

    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_lowercase().as_str() {
            "books" | "books & notes" => Some(Category::Books),
            "electronics" => Some(Category::Electronics),
            "cycles" => Some(Category::Cycles),
            "hostel" | "hostel essentials" | "hostel_essentials" => {
                Some(Category::HostelEssentials)
            }
            "projects" | "project kits" => Some(Category::Projects),
            "other" => Some(Category::Other),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Condition {
    #[serde(rename = "like new", alias = "like_new")]
    LikeNew,
    #[serde(rename = "good")]
    Good,
    #[serde(rename = "fair")]
    Fair,
    #[serde(rename = "poor")]
    Poor,
}

impl Condition {
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_lowercase().replace('_', " ").as_str() {
            "like new" => Some(Condition::LikeNew),
            "good" => Some(Condition::Good),
            "fair" => Some(Condition::Fair),
            "poor" => Some(Condition::Poor),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, Hash)]
pub enum SaleType {
    #[default]
    #[serde(rename = "fixed price", alias = "fixed")]
    FixedPrice,
    #[serde(rename = "auction")]
    Auction,
    #[serde(rename = "open to offers", alias = "offers")]
    OpenToOffers,
}

impl SaleType {
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_lowercase().as_str() {
            "fixed price" | "fixed" => Some(SaleType::FixedPrice),
            "auction" => Some(SaleType::Auction),
            "open to offers" | "offers" => Some(SaleType::OpenToOffers),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ContactMethod {
    Phone,
    Email,
    Both,
}

impl ContactMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContactMethod::Phone => "phone",
            ContactMethod::Email => "email",
            ContactMethod::Both => "both",
        }
    }

    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_lowercase().as_str() {
            "phone" => Some(ContactMethod::Phone),
            "email" => Some(ContactMethod::Email),
            "both" => Some(ContactMethod::Both),
            _ => None,
        }
    }

    pub fn requires_phone(&self) -> bool {
        matches!(self, ContactMethod::Phone | ContactMethod::Both)
    }

    pub fn requires_email(&self) -> bool {
        matches!(self, ContactMethod::Email | ContactMethod::Both)
    }
}

/// Everything a listing carries except its images. Field names follow the
/// backend's product schema.
#[skip_serializing_none]
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ListingDetails {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: Option<Category>,
    #[serde(default)]
    pub condition: Option<Condition>,
    #[serde(rename = "saletype", default)]
    pub sale_type: SaleType,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub contact_method: Option<ContactMethod>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub meeting_location: String,
    #[serde(default)]
    pub auction_days: Option<u8>,
}

/// Body of `POST /api/product` and `PUT /api/product/:id`.
#[derive(Debug, Serialize)]
pub struct ListingPayload<'a> {
    #[serde(flatten)]
    pub details: &'a ListingDetails,
    pub images: &'a [String],
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ImageState {
    Local,
    Validated,
    Rejected { message: String },
    Uploaded { public_url: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("image `{name}` cannot move from {from} to {to}")]
pub struct ImageTransitionError {
    pub name: String,
    pub from: &'static str,
    pub to: &'static str,
}

/// One image slot of a draft. Local images carry their bytes until they are
/// uploaded; images that came back from the backend only carry a URL.
#[derive(Debug, Clone)]
pub struct ImageRef {
    pub name: String,
    pub content_type: String,
    pub bytes: Bytes,
    state: ImageState,
}

impl ImageRef {
    pub fn local(
        name: impl Into<String>,
        content_type: impl Into<String>,
        bytes: impl Into<Bytes>,
    ) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            bytes: bytes.into(),
            state: ImageState::Local,
        }
    }

    pub fn remote(public_url: impl Into<String>) -> Self {
        let public_url = public_url.into();
        let name = public_url
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or("remote-image")
            .to_string();
        Self {
            name,
            content_type: String::new(),
            bytes: Bytes::new(),
            state: ImageState::Uploaded { public_url },
        }
    }

    pub fn state(&self) -> &ImageState {
        &self.state
    }

    pub fn public_url(&self) -> Option<&str> {
        match &self.state {
            ImageState::Uploaded { public_url } => Some(public_url),
            _ => None,
        }
    }

    pub fn rejection(&self) -> Option<&str> {
        match &self.state {
            ImageState::Rejected { message } => Some(message),
            _ => None,
        }
    }

    pub fn is_uploaded(&self) -> bool {
        matches!(self.state, ImageState::Uploaded { .. })
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self.state, ImageState::Rejected { .. })
    }

    pub fn mark_validated(&mut self) -> Result<(), ImageTransitionError> {
        match self.state {
            ImageState::Local | ImageState::Validated => {
                self.state = ImageState::Validated;
                Ok(())
            }
            _ => Err(self.transition_error("validated")),
        }
    }

    pub fn reject(&mut self, message: impl Into<String>) -> Result<(), ImageTransitionError> {
        match self.state {
            ImageState::Local | ImageState::Validated => {
                self.state = ImageState::Rejected {
                    message: message.into(),
                };
                Ok(())
            }
            _ => Err(self.transition_error("rejected")),
        }
    }

    pub fn mark_uploaded(
        &mut self,
        public_url: impl Into<String>,
    ) -> Result<(), ImageTransitionError> {
        match self.state {
            ImageState::Validated => {
                self.state = ImageState::Uploaded {
                    public_url: public_url.into(),
                };
                // the bytes now live in storage
                self.bytes = Bytes::new();
                Ok(())
            }
            _ => Err(self.transition_error("uploaded")),
        }
    }

    fn transition_error(&self, to: &'static str) -> ImageTransitionError {
        let from = match self.state {
            ImageState::Local => "local",
            ImageState::Validated => "validated",
            ImageState::Rejected { .. } => "rejected",
            ImageState::Uploaded { .. } => "uploaded",
        };
        ImageTransitionError {
            name: self.name.clone(),
            from,
            to,
        }
    }
}

/// The AI's judgment on one image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    #[serde(rename = "isGenuine")]
    pub accepted: bool,
    #[serde(rename = "validationMessage")]
    pub message: String,
    #[serde(default)]
    pub suggested_category: Option<String>,
    #[serde(default)]
    pub suggested_title: Option<String>,
    #[serde(default)]
    pub issues: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductAnalysis {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub condition: String,
    #[serde(default)]
    pub estimated_price: f64,
    pub is_genuine: bool,
    #[serde(default)]
    pub validation_message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadTarget {
    pub upload_url: String,
    pub public_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub content_type: String,
}

impl From<&ImageRef> for FileDescriptor {
    fn from(image: &ImageRef) -> Self {
        Self {
            name: image.name.clone(),
            content_type: image.content_type.clone(),
        }
    }
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub condition: String,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub owner: Option<Owner>,
    #[serde(rename = "saletype", default)]
    pub sale_type: Option<String>,
    #[serde(default)]
    pub contact_method: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub meeting_location: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Owner {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductPage {
    #[serde(default)]
    pub data: Vec<Product>,
    #[serde(default = "ProductPage::single_page")]
    pub total_pages: u32,
    #[serde(default)]
    pub college: Option<String>,
}

impl ProductPage {
    fn single_page() -> u32 {
        1
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub email: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SubmitReport {
    pub submission_id: String,
    pub mode: String,
    pub images: Vec<String>,
    pub record: Value,
    pub stages: Vec<StageReport>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StageReport {
    pub name: String,
    pub elapsed_ms: u128,
    pub timestamp: DateTime<Utc>,
    pub output: Value,
}

impl StageReport {
    pub fn new(name: &str, elapsed_ms: u128, output: Value) -> Self {
        Self {
            name: name.to_string(),
            elapsed_ms,
            timestamp: Utc::now(),
            output,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn listing_payload_uses_backend_field_names() {
        let details = ListingDetails {
            title: "Study Desk Lamp".into(),
            description: "Warm light, barely used".into(),
            category: Some(Category::HostelEssentials),
            condition: Some(Condition::LikeNew),
            sale_type: SaleType::OpenToOffers,
            price: 750.0,
            contact_method: Some(ContactMethod::Email),
            phone: None,
            email: Some("seller@campus.edu".into()),
            meeting_location: "library".into(),
            auction_days: None,
        };
        let images = vec!["https://cdn.test/a.jpg".to_string()];
        let body = serde_json::to_value(ListingPayload {
            details: &details,
            images: &images,
        })
        .unwrap();
        assert_eq!(
            body,
            json!({
                "title": "Study Desk Lamp",
                "description": "Warm light, barely used",
                "category": "hostel",
                "condition": "like new",
                "saletype": "open to offers",
                "price": 750.0,
                "contactMethod": "email",
                "email": "seller@campus.edu",
                "meetingLocation": "library",
                "images": ["https://cdn.test/a.jpg"],
            })
        );
    }

    #[test]
    fn condition_accepts_snake_case_from_ai() {
        let parsed: Condition = serde_json::from_value(json!("like_new")).unwrap();
        assert_eq!(parsed, Condition::LikeNew);
        assert_eq!(Condition::parse("Like_New"), Some(Condition::LikeNew));
        assert_eq!(Category::parse("Hostel Essentials"), Some(Category::HostelEssentials));
        assert_eq!(Category::parse("furniture"), None);
    }

    #[test]
    fn image_lifecycle_rejects_illegal_transitions() {
        let mut image = ImageRef::local("lamp.jpg", "image/jpeg", b"lamp".to_vec());
        let err = image.mark_uploaded("https://cdn.test/lamp.jpg").unwrap_err();
        assert_eq!(err.from, "local");
        assert_eq!(image.state(), &ImageState::Local);

        image.mark_validated().unwrap();
        image.mark_uploaded("https://cdn.test/lamp.jpg").unwrap();
        assert_eq!(image.public_url(), Some("https://cdn.test/lamp.jpg"));
        assert!(image.bytes.is_empty());
        assert!(image.reject("too late").is_err());
    }

    #[test]
    fn rejected_images_stay_rejected() {
        let mut image = ImageRef::local("selfie.jpg", "image/jpeg", b"me".to_vec());
        image.reject("contains a person").unwrap();
        assert!(image.mark_validated().is_err());
        assert_eq!(image.rejection(), Some("contains a person"));
    }

    #[test]
    fn product_accepts_mongo_style_ids() {
        let product: Product = serde_json::from_value(json!({
            "_id": "665f1c",
            "title": "Calculus Textbook",
            "price": 450,
            "images": ["https://cdn.test/c.jpg"],
            "owner": {"username": "asha", "email": "asha@campus.edu"},
            "views": 24
        }))
        .unwrap();
        assert_eq!(product.id, "665f1c");
        assert_eq!(product.owner.unwrap().username, "asha");
    }
}
