use crate::models::{
    Category, Condition, ContactMethod, ImageRef, ListingDetails, Product, ProductAnalysis,
    SaleType,
};
use std::path::Path;
use thiserror::Error;

pub const MAX_IMAGES: usize = 5;

const AUCTION_DAYS: [u8; 4] = [1, 3, 5, 7];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DraftError {
    #[error("You can only upload up to {MAX_IMAGES} images ({current} attached, {requested} more requested)")]
    TooManyImages { current: usize, requested: usize },
    #[error("listing has {0} stored images; at most {MAX_IMAGES} can be kept")]
    TooManyStoredImages(usize),
    #[error("no image at position {0}")]
    NoSuchImage(usize),
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
    #[error("price must be a non-negative number")]
    InvalidPrice,
    #[error("contact method `{method}` requires a {field}")]
    MissingContact {
        method: &'static str,
        field: &'static str,
    },
    #[error("auction duration must be one of 1, 3, 5 or 7 days")]
    InvalidAuctionDuration,
    #[error("`{0}` is not an image file")]
    NotAnImage(String),
    #[error("unable to read `{path}`: {reason}")]
    Io { path: String, reason: String },
}

/// The in-memory listing being edited. The image list is private so the
/// five-image ceiling cannot be bypassed.
#[derive(Debug, Clone, Default)]
pub struct DraftListing {
    pub details: ListingDetails,
    images: Vec<ImageRef>,
}

impl DraftListing {
    pub fn new(details: ListingDetails) -> Self {
        Self {
            details,
            images: Vec::new(),
        }
    }

    /// Draft for editing an existing record. Its images are already in
    /// storage; fields the backend stores in a shape we don't recognise are
    /// left empty and must be filled in before submitting. A record holding
    /// more images than a draft can carry is refused rather than truncated.
    pub fn from_product(product: &Product) -> Result<Self, DraftError> {
        if product.images.len() > MAX_IMAGES {
            return Err(DraftError::TooManyStoredImages(product.images.len()));
        }
        let details = ListingDetails {
            title: product.title.clone(),
            description: product.description.clone(),
            category: Category::parse(&product.category),
            condition: Condition::parse(&product.condition),
            sale_type: product
                .sale_type
                .as_deref()
                .and_then(SaleType::parse)
                .unwrap_or_default(),
            price: product.price,
            contact_method: product.contact_method.as_deref().and_then(ContactMethod::parse),
            phone: product.phone.clone(),
            email: product.email.clone(),
            meeting_location: product.meeting_location.clone().unwrap_or_default(),
            auction_days: None,
        };
        Ok(Self {
            details,
            images: product.images.iter().map(ImageRef::remote).collect(),
        })
    }

    pub fn images(&self) -> &[ImageRef] {
        &self.images
    }

    /// Mutable access to existing slots. A slice, so it can't grow the list.
    pub fn images_mut(&mut self) -> &mut [ImageRef] {
        &mut self.images
    }

    pub fn remaining_slots(&self) -> usize {
        MAX_IMAGES.saturating_sub(self.images.len())
    }

    pub fn check_capacity(&self, requested: usize) -> Result<(), DraftError> {
        if requested > self.remaining_slots() {
            return Err(DraftError::TooManyImages {
                current: self.images.len(),
                requested,
            });
        }
        Ok(())
    }

    /// Appends the whole batch or nothing.
    pub fn add_images(&mut self, images: Vec<ImageRef>) -> Result<(), DraftError> {
        self.check_capacity(images.len())?;
        self.images.extend(images);
        Ok(())
    }

    pub fn remove_image(&mut self, index: usize) -> Result<ImageRef, DraftError> {
        if index >= self.images.len() {
            return Err(DraftError::NoSuchImage(index));
        }
        Ok(self.images.remove(index))
    }

    /// Checks everything that must hold before a submit touches the network.
    pub fn validate(&self) -> Result<(), DraftError> {
        let d = &self.details;
        if d.title.trim().is_empty() {
            return Err(DraftError::MissingField("title"));
        }
        if d.description.trim().is_empty() {
            return Err(DraftError::MissingField("description"));
        }
        if d.category.is_none() {
            return Err(DraftError::MissingField("category"));
        }
        if d.condition.is_none() {
            return Err(DraftError::MissingField("condition"));
        }
        if !d.price.is_finite() || d.price < 0.0 {
            return Err(DraftError::InvalidPrice);
        }
        self.check_seller_fields()
    }

    /// The fields only the seller can supply: contact details, meeting place
    /// and auction length. Autofill never sets these.
    pub fn check_seller_fields(&self) -> Result<(), DraftError> {
        let d = &self.details;
        let method = d
            .contact_method
            .ok_or(DraftError::MissingField("contactMethod"))?;
        if method.requires_phone() && is_blank(d.phone.as_deref()) {
            return Err(DraftError::MissingContact {
                method: method.as_str(),
                field: "phone",
            });
        }
        if method.requires_email() && is_blank(d.email.as_deref()) {
            return Err(DraftError::MissingContact {
                method: method.as_str(),
                field: "email",
            });
        }
        if d.meeting_location.trim().is_empty() {
            return Err(DraftError::MissingField("meetingLocation"));
        }
        if d.sale_type == SaleType::Auction {
            match d.auction_days {
                Some(days) if AUCTION_DAYS.contains(&days) => {}
                _ => return Err(DraftError::InvalidAuctionDuration),
            }
        }
        Ok(())
    }

    /// Overwrites the editable fields with an AI analysis. Category and
    /// condition values outside the known sets are ignored.
    pub fn apply_analysis(&mut self, analysis: &ProductAnalysis) {
        self.details.title = analysis.title.clone();
        self.details.description = analysis.description.clone();
        self.details.category = Category::parse(&analysis.category);
        self.details.condition = Condition::parse(&analysis.condition);
        self.details.price = if analysis.estimated_price.is_finite() && analysis.estimated_price > 0.0
        {
            analysis.estimated_price
        } else {
            0.0
        };
    }
}

fn is_blank(value: Option<&str>) -> bool {
    value.map(|v| v.trim().is_empty()).unwrap_or(true)
}

/// Reads an image from disk, guessing its MIME type from the extension.
pub async fn load_image(path: &Path) -> Result<ImageRef, DraftError> {
    let display = path.display().to_string();
    let content_type = mime_guess::from_path(path)
        .first()
        .map(|mime| mime.essence_str().to_string())
        .filter(|mime| mime.starts_with("image/"))
        .ok_or_else(|| DraftError::NotAnImage(display.clone()))?;
    let bytes = tokio::fs::read(path).await.map_err(|err| DraftError::Io {
        path: display.clone(),
        reason: err.to_string(),
    })?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or(display);
    Ok(ImageRef::local(name, content_type, bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{sample_details, sample_image};

    #[test]
    fn adding_past_the_limit_leaves_draft_untouched() {
        let mut draft = DraftListing::new(sample_details());
        draft
            .add_images((0..4).map(|i| sample_image(&format!("img-{i}"))).collect())
            .unwrap();

        let err = draft
            .add_images(vec![sample_image("img-4"), sample_image("img-5")])
            .unwrap_err();
        assert_eq!(
            err,
            DraftError::TooManyImages {
                current: 4,
                requested: 2
            }
        );
        assert_eq!(draft.images().len(), 4);

        draft.add_images(vec![sample_image("img-4")]).unwrap();
        assert_eq!(draft.images().len(), MAX_IMAGES);
        assert!(draft.add_images(vec![sample_image("img-6")]).is_err());
        assert_eq!(draft.images().len(), MAX_IMAGES);
    }

    #[test]
    fn remove_image_keeps_order() {
        let mut draft = DraftListing::new(sample_details());
        draft
            .add_images(vec![sample_image("a"), sample_image("b"), sample_image("c")])
            .unwrap();
        let removed = draft.remove_image(1).unwrap();
        assert_eq!(removed.name, "b.jpg");
        let names: Vec<_> = draft.images().iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["a.jpg", "c.jpg"]);
        assert_eq!(draft.remove_image(7).unwrap_err(), DraftError::NoSuchImage(7));
    }

    #[test]
    fn contact_method_requires_matching_fields() {
        let mut draft = DraftListing::new(sample_details());
        draft.details.contact_method = Some(ContactMethod::Both);
        draft.details.phone = Some("98765 43210".into());
        draft.details.email = Some("  ".into());
        assert_eq!(
            draft.validate().unwrap_err(),
            DraftError::MissingContact {
                method: "both",
                field: "email"
            }
        );

        draft.details.email = Some("seller@campus.edu".into());
        assert!(draft.validate().is_ok());

        draft.details.contact_method = Some(ContactMethod::Phone);
        draft.details.phone = None;
        assert!(matches!(
            draft.validate(),
            Err(DraftError::MissingContact { field: "phone", .. })
        ));
    }

    #[test]
    fn validate_rejects_negative_price_and_bad_auction() {
        let mut draft = DraftListing::new(sample_details());
        draft.details.price = -1.0;
        assert_eq!(draft.validate().unwrap_err(), DraftError::InvalidPrice);

        draft.details.price = 0.0;
        draft.details.sale_type = SaleType::Auction;
        draft.details.auction_days = Some(2);
        assert_eq!(
            draft.validate().unwrap_err(),
            DraftError::InvalidAuctionDuration
        );
        draft.details.auction_days = Some(3);
        assert!(draft.validate().is_ok());
    }

    #[test]
    fn apply_analysis_ignores_unknown_enums() {
        let mut draft = DraftListing::new(sample_details());
        draft.apply_analysis(&ProductAnalysis {
            title: "Hero Sprint Cycle".into(),
            description: "21-speed, minor scratches".into(),
            category: "vehicles".into(),
            condition: "like_new".into(),
            estimated_price: 3200.0,
            is_genuine: true,
            validation_message: String::new(),
        });
        assert_eq!(draft.details.title, "Hero Sprint Cycle");
        assert_eq!(draft.details.category, None);
        assert_eq!(draft.details.condition, Some(Condition::LikeNew));
        assert_eq!(draft.details.price, 3200.0);
    }

    #[test]
    fn seller_fields_are_checked_without_item_fields() {
        let mut draft = DraftListing::default();
        assert_eq!(
            draft.check_seller_fields().unwrap_err(),
            DraftError::MissingField("contactMethod")
        );

        let seller = sample_details();
        draft.details.contact_method = seller.contact_method;
        draft.details.phone = seller.phone;
        draft.details.meeting_location = seller.meeting_location;
        assert!(draft.check_seller_fields().is_ok());
        assert_eq!(draft.validate().unwrap_err(), DraftError::MissingField("title"));
    }

    #[test]
    fn from_product_refuses_more_images_than_a_draft_holds() {
        let urls: Vec<String> = (0..7).map(|i| format!("https://cdn.test/{i}.jpg")).collect();
        let product: Product = serde_json::from_value(serde_json::json!({
            "_id": "p2",
            "title": "Lab coat",
            "images": urls
        }))
        .unwrap();
        assert_eq!(
            DraftListing::from_product(&product).unwrap_err(),
            DraftError::TooManyStoredImages(7)
        );
    }

    #[test]
    fn from_product_keeps_remote_images_uploaded() {
        let product: Product = serde_json::from_value(serde_json::json!({
            "_id": "p1",
            "title": "Arduino kit",
            "description": "Complete starter kit",
            "category": "projects",
            "condition": "good",
            "price": 900,
            "saletype": "fixed price",
            "contactMethod": "email",
            "email": "maker@campus.edu",
            "meetingLocation": "student-center",
            "images": ["https://cdn.test/k1.jpg", "https://cdn.test/k2.jpg"]
        }))
        .unwrap();
        let draft = DraftListing::from_product(&product).unwrap();
        assert!(draft.validate().is_ok());
        assert!(draft.images().iter().all(ImageRef::is_uploaded));
        assert_eq!(draft.images()[1].public_url(), Some("https://cdn.test/k2.jpg"));
    }

    #[tokio::test]
    async fn load_image_rejects_non_images() {
        let err = load_image(Path::new("notes.txt")).await.unwrap_err();
        assert!(matches!(err, DraftError::NotAnImage(_)));
    }

    #[tokio::test]
    async fn load_image_reads_bytes_and_mime() {
        let path = std::env::temp_dir().join(format!("{}.png", uuid::Uuid::new_v4()));
        tokio::fs::write(&path, b"png-bytes").await.unwrap();
        let image = load_image(&path).await.unwrap();
        assert_eq!(image.content_type, "image/png");
        assert_eq!(&image.bytes[..], b"png-bytes");
        let _ = tokio::fs::remove_file(&path).await;
    }
}
