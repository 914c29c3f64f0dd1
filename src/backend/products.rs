use super::{BackendError, Envelope, ensure_success, read_json};
use crate::config::BackendConfig;
use crate::http::build_client;
use crate::models::{FileDescriptor, ListingDetails, ListingPayload, Product, ProductPage, UploadTarget};
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct ProductsClient {
    http: Client,
    config: BackendConfig,
    token: Option<String>,
}

#[derive(Debug, Serialize)]
struct SignedUrlsRequest<'a> {
    filenames: &'a [FileDescriptor],
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignedUrlsResponse {
    #[serde(default)]
    signed_urls: Option<Vec<UploadTarget>>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ProductBody {
    Bare(Product),
    Wrapped(Envelope<Product>),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ProductListBody {
    Bare(Vec<Product>),
    Wrapped(Envelope<Vec<Product>>),
}

impl ProductsClient {
    pub fn new(config: BackendConfig, token: Option<String>) -> Self {
        Self {
            http: build_client(),
            config,
            token,
        }
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// `POST /api/product/pre-signed-urls`: one target per file, in order.
    pub async fn request_upload_targets(
        &self,
        files: &[FileDescriptor],
    ) -> Result<Vec<UploadTarget>, BackendError> {
        let url = self.config.product_url("/pre-signed-urls");
        let response = self
            .authorize(self.http.post(url))
            .json(&SignedUrlsRequest { filenames: files })
            .send()
            .await
            .map_err(|err| BackendError::Request(err.to_string()))?;
        let response = ensure_success(response).await?;
        let payload: SignedUrlsResponse = read_json(response).await?;
        let targets = payload.signed_urls.ok_or_else(|| {
            BackendError::Rejected(
                payload
                    .message
                    .unwrap_or_else(|| "no signed URLs returned".into()),
            )
        })?;
        debug!(target = "market.backend", requested = files.len(), issued = targets.len(), "upload_targets_issued");
        Ok(targets)
    }

    /// `POST /api/product`. Returns the backend's `data` payload.
    pub async fn create_product(
        &self,
        details: &ListingDetails,
        images: &[String],
    ) -> Result<Value, BackendError> {
        let url = self.config.product_url("");
        let request = self
            .authorize(self.http.post(url))
            .json(&ListingPayload { details, images });
        let record = self.send_listing(request, "Failed to create listing").await?;
        info!(target = "market.backend", title = %details.title, images = images.len(), "listing_created");
        Ok(record)
    }

    /// `PUT /api/product/:id`.
    pub async fn update_product(
        &self,
        id: &str,
        details: &ListingDetails,
        images: &[String],
    ) -> Result<Value, BackendError> {
        let url = self
            .config
            .product_url(&format!("/{}", urlencoding::encode(id)));
        let request = self
            .authorize(self.http.put(url))
            .json(&ListingPayload { details, images });
        let record = self.send_listing(request, "Failed to update listing").await?;
        info!(target = "market.backend", product_id = %id, images = images.len(), "listing_updated");
        Ok(record)
    }

    async fn send_listing(
        &self,
        request: RequestBuilder,
        fallback: &str,
    ) -> Result<Value, BackendError> {
        let response = request
            .send()
            .await
            .map_err(|err| BackendError::Request(err.to_string()))?;
        let response = ensure_success(response).await?;
        let envelope: Envelope<Value> = read_json(response).await?;
        if !envelope.success {
            return Err(BackendError::Rejected(
                envelope.message.unwrap_or_else(|| fallback.to_string()),
            ));
        }
        Ok(envelope.data.unwrap_or(Value::Null))
    }

    /// `GET /api/product?page&limit`.
    pub async fn list_products(&self, page: u32, limit: u32) -> Result<ProductPage, BackendError> {
        let url = self.config.product_url("");
        let response = self
            .authorize(self.http.get(url))
            .query(&[("page", page.max(1)), ("limit", limit.max(1))])
            .send()
            .await
            .map_err(|err| BackendError::Request(err.to_string()))?;
        let response = ensure_success(response).await?;
        let body: Value = read_json(response).await?;
        if body.get("success").and_then(Value::as_bool) == Some(false) {
            let message = body
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("Failed to fetch products");
            return Err(BackendError::Rejected(message.to_string()));
        }
        serde_json::from_value(body).map_err(|err| BackendError::Deserialize(err.to_string()))
    }

    /// `GET /api/product/:id`. Accepts both a bare record and the usual
    /// envelope.
    pub async fn get_product(&self, id: &str) -> Result<Product, BackendError> {
        let url = self
            .config
            .product_url(&format!("/{}", urlencoding::encode(id)));
        let response = self
            .authorize(self.http.get(url))
            .send()
            .await
            .map_err(|err| BackendError::Request(err.to_string()))?;
        let response = ensure_success(response).await?;
        match read_json::<ProductBody>(response).await? {
            ProductBody::Bare(product) => Ok(product),
            ProductBody::Wrapped(envelope) => envelope.into_data("Product not found"),
        }
    }

    /// `GET /api/user/product`: listings owned by the signed-in user.
    pub async fn my_products(&self) -> Result<Vec<Product>, BackendError> {
        let url = self.config.user_url("/product");
        let response = self
            .authorize(self.http.get(url))
            .send()
            .await
            .map_err(|err| BackendError::Request(err.to_string()))?;
        let response = ensure_success(response).await?;
        match read_json::<ProductListBody>(response).await? {
            ProductListBody::Bare(products) => Ok(products),
            ProductListBody::Wrapped(envelope) => envelope.into_data("Error while fetching your products"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::sample_details;
    use mockito::Matcher;
    use serde_json::json;

    fn client(server: &mockito::ServerGuard, token: Option<&str>) -> ProductsClient {
        ProductsClient::new(BackendConfig::new(&server.url()), token.map(str::to_string))
    }

    #[tokio::test]
    async fn signed_urls_request_sends_names_and_types_in_order() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/product/pre-signed-urls")
            .match_header("authorization", "Bearer tok-1")
            .match_body(Matcher::Json(json!({
                "filenames": [
                    {"name": "front.jpg", "type": "image/jpeg"},
                    {"name": "back.png", "type": "image/png"}
                ]
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({"signedUrls": [
                    {"uploadUrl": "https://s3.test/u/front", "publicUrl": "https://cdn.test/front.jpg"},
                    {"uploadUrl": "https://s3.test/u/back", "publicUrl": "https://cdn.test/back.png"}
                ]})
                .to_string(),
            )
            .expect(1)
            .create_async()
            .await;

        let files = vec![
            FileDescriptor { name: "front.jpg".into(), content_type: "image/jpeg".into() },
            FileDescriptor { name: "back.png".into(), content_type: "image/png".into() },
        ];
        let targets = client(&server, Some("tok-1"))
            .request_upload_targets(&files)
            .await
            .unwrap();
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[1].public_url, "https://cdn.test/back.png");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn create_product_surfaces_backend_message() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/product")
            .with_status(400)
            .with_header("content-type", "application/json")
            .with_body(json!({"success": false, "message": "Price is required"}).to_string())
            .create_async()
            .await;

        let err = client(&server, None)
            .create_product(&sample_details(), &[])
            .await
            .unwrap_err();
        assert_eq!(err.backend_message(), Some("Price is required"));
    }

    #[tokio::test]
    async fn create_product_rejects_unsuccessful_envelope() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/product")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({"success": false, "message": "Not logged in"}).to_string())
            .create_async()
            .await;

        let err = client(&server, None)
            .create_product(&sample_details(), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Rejected(ref m) if m == "Not logged in"));
    }

    #[tokio::test]
    async fn update_product_puts_to_product_id() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PUT", "/api/product/p-42")
            .match_body(Matcher::PartialJson(json!({"images": ["https://cdn.test/x.jpg"]})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({"success": true, "data": {"_id": "p-42"}}).to_string())
            .expect(1)
            .create_async()
            .await;

        let record = client(&server, None)
            .update_product("p-42", &sample_details(), &["https://cdn.test/x.jpg".to_string()])
            .await
            .unwrap();
        assert_eq!(record["_id"], "p-42");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn list_products_reads_page_metadata() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/product")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("page".into(), "2".into()),
                Matcher::UrlEncoded("limit".into(), "8".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "success": true,
                    "data": [{"_id": "p1", "title": "Cycle", "price": 2500, "images": []}],
                    "totalPages": 3,
                    "college": "NIT Trichy"
                })
                .to_string(),
            )
            .create_async()
            .await;

        let page = client(&server, None).list_products(2, 8).await.unwrap();
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.data[0].title, "Cycle");
        assert_eq!(page.college.as_deref(), Some("NIT Trichy"));
    }

    #[tokio::test]
    async fn get_product_accepts_bare_and_wrapped_bodies() {
        let mut server = mockito::Server::new_async().await;
        let _bare = server
            .mock("GET", "/api/product/p1")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({"_id": "p1", "title": "Lamp"}).to_string())
            .create_async()
            .await;
        let _wrapped = server
            .mock("GET", "/api/product/p2")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({"success": true, "data": {"_id": "p2", "title": "Desk"}}).to_string())
            .create_async()
            .await;

        let api = client(&server, None);
        assert_eq!(api.get_product("p1").await.unwrap().title, "Lamp");
        assert_eq!(api.get_product("p2").await.unwrap().title, "Desk");
    }

    #[tokio::test]
    async fn my_products_requires_auth_header() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/user/product")
            .match_header("authorization", "Bearer tok-9")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!([{"_id": "p1", "title": "Notes"}]).to_string())
            .create_async()
            .await;

        let products = client(&server, Some("tok-9")).my_products().await.unwrap();
        assert_eq!(products.len(), 1);
    }
}
