use crate::llm::{GeminiClient, LlmError};
use crate::models::{Category, ImageRef, ProductAnalysis, ValidationResult};
use futures::future::join_all;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, warn};

const VALIDATION_PROMPT: &str = r#"
Analyze this product image and validate if it's appropriate for a second-hand marketplace listing.
The seller says the item is titled "{title}" in the category "{category}".

Check for the following issues:
1. Is this a genuine product image (not a stock photo or fake)?
2. Does the image contain inappropriate content (people, personal photos, or non-product images)?
3. Is the image clear and does it show the actual product?
4. Are there any signs of manipulation or editing?
5. Does the image match the title and category?
6. Is the image quality good enough for a marketplace listing?
7. Is the product clearly visible and well-lit?
8. Are there any safety concerns or inappropriate items in the image?

Provide your analysis in JSON format with these fields:
{
  "isGenuine": boolean,
  "validationMessage": "string explaining the validation result",
  "suggestedCategory": "suggested category if different from provided",
  "suggestedTitle": "suggested title if different from provided",
  "issues": ["list of specific issues found in the image"]
}

Return ONLY valid JSON with these fields and no other text.
"#;

const ANALYSIS_PROMPT: &str = r#"
Analyze this product image for a second-hand marketplace listing on a college campus.

First, validate if this is an appropriate product image:
1. Check if it's a genuine product image (not a stock photo, fake, or inappropriate content)
2. Verify it's not a personal photo and contains no people
3. Ensure the product is clearly visible and well-lit
4. Check for any safety concerns or inappropriate items

If the image is valid, respond with a JSON object with these fields:
- title: a concise title for the product
- description: a detailed description including features, specifications, and any visible wear or damage
- category: one of "books", "electronics", "cycles", "hostel", "projects", "other"
- condition: one of "like_new", "good", "fair", "poor"
- estimatedPrice: estimated value in Indian Rupees as a number
- isGenuine: boolean indicating if the image appears to be genuine
- validationMessage: string explaining the validation result

If the image is invalid or inappropriate, return:
{"isGenuine": false, "validationMessage": "why the image is invalid", "title": "", "description": "", "category": "", "condition": "", "estimatedPrice": 0}

Return ONLY valid JSON with these fields and no other text.
"#;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("image validation service failed: {0}")]
    Service(String),
    #[error("unable to parse AI validation response: {0}")]
    Parse(String),
}

impl From<LlmError> for ValidationError {
    fn from(value: LlmError) -> Self {
        ValidationError::Service(value.to_string())
    }
}

/// Asks the vision model whether `image` is an acceptable product photo for
/// a listing with the given title and category.
pub async fn validate_image(
    model: &GeminiClient,
    image: &ImageRef,
    title: &str,
    category: Option<Category>,
) -> Result<ValidationResult, ValidationError> {
    let prompt = validation_prompt(title, category);
    let response = model
        .generate_with_image(&prompt, &image.bytes, &image.content_type)
        .await;
    crate::metrics::ai_call("validate_image", response.is_ok());
    let response = response?;

    let result = parse_validation(&response.text).inspect_err(|err| {
        warn!(target = "market.validation", image = %image.name, error = %err, "validation_reply_unparseable");
    })?;
    debug!(
        target = "market.validation",
        image = %image.name,
        accepted = result.accepted,
        "image_validated"
    );
    Ok(result)
}

/// The seller's title goes in last so its text is never treated as a
/// placeholder.
fn validation_prompt(title: &str, category: Option<Category>) -> String {
    VALIDATION_PROMPT
        .replace("{category}", category.map(|c| c.as_str()).unwrap_or("unspecified"))
        .replace("{title}", title.trim())
}

/// Validates every image concurrently. The output is aligned with the input.
pub async fn validate_all(
    model: &GeminiClient,
    images: &[&ImageRef],
    title: &str,
    category: Option<Category>,
) -> Vec<Result<ValidationResult, ValidationError>> {
    join_all(
        images
            .iter()
            .map(|image| validate_image(model, image, title, category)),
    )
    .await
}

/// Drafts listing fields from a single image.
pub async fn analyze_product(
    model: &GeminiClient,
    image: &ImageRef,
) -> Result<ProductAnalysis, ValidationError> {
    let response = model
        .generate_with_image(ANALYSIS_PROMPT, &image.bytes, &image.content_type)
        .await;
    crate::metrics::ai_call("analyze_product", response.is_ok());
    parse_reply(&response?.text)
}

pub fn parse_validation(reply: &str) -> Result<ValidationResult, ValidationError> {
    parse_reply(reply)
}

fn parse_reply<T: DeserializeOwned>(reply: &str) -> Result<T, ValidationError> {
    let object = extract_json_object(reply)
        .ok_or_else(|| ValidationError::Parse("no JSON object in reply".into()))?;
    serde_json::from_str(object).map_err(|err| ValidationError::Parse(err.to_string()))
}

/// Returns the first balanced `{...}` in `text`. Braces inside JSON string
/// literals are not counted.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}
