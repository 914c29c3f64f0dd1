use crate::backend::ProductsClient;
use crate::http::build_upload_client;
use crate::models::{FileDescriptor, ImageRef, UploadTarget};
use futures::future::join_all;
use reqwest::Client;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("could not obtain upload URLs: {0}")]
    Signing(String),
    #[error("{} of {} uploads failed: {}", failed.len(), total, describe(failed))]
    Incomplete {
        total: usize,
        failed: Vec<FailedUpload>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadedFile {
    pub index: usize,
    pub name: String,
    pub public_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedUpload {
    pub index: usize,
    pub name: String,
    pub reason: String,
}

/// Aggregated result of one upload batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// Public URLs in the order the files were given.
    AllSucceeded(Vec<String>),
    PartialFailure {
        succeeded: Vec<UploadedFile>,
        failed: Vec<FailedUpload>,
    },
}

impl UploadOutcome {
    pub fn into_result(self) -> Result<Vec<String>, UploadError> {
        match self {
            UploadOutcome::AllSucceeded(urls) => Ok(urls),
            UploadOutcome::PartialFailure { succeeded, failed } => Err(UploadError::Incomplete {
                total: succeeded.len() + failed.len(),
                failed,
            }),
        }
    }
}

fn describe(failed: &[FailedUpload]) -> String {
    failed
        .iter()
        .map(|f| format!("{} ({})", f.name, f.reason))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Obtains pre-signed targets from the backend and pushes file bytes
/// straight to storage.
#[derive(Debug, Clone)]
pub struct UploadCoordinator {
    products: ProductsClient,
    http: Client,
}

impl UploadCoordinator {
    pub fn new(products: ProductsClient) -> Self {
        Self {
            products,
            http: build_upload_client(),
        }
    }

    /// One batched signing call; the result is aligned with `files`.
    pub async fn request_targets(
        &self,
        files: &[&ImageRef],
    ) -> Result<Vec<UploadTarget>, UploadError> {
        let descriptors: Vec<FileDescriptor> = files.iter().map(|f| FileDescriptor::from(*f)).collect();
        let targets = self
            .products
            .request_upload_targets(&descriptors)
            .await
            .map_err(|err| UploadError::Signing(err.to_string()))?;
        if targets.len() != files.len() {
            return Err(UploadError::Signing(format!(
                "requested {} upload URLs, received {}",
                files.len(),
                targets.len()
            )));
        }
        Ok(targets)
    }

    /// Uploads every file to its target concurrently. A failed file does not
    /// stop its siblings; the outcome lists every failure.
    pub async fn upload_all(&self, files: &[&ImageRef], targets: Vec<UploadTarget>) -> UploadOutcome {
        let mut targets = targets.into_iter();
        let uploads = files.iter().enumerate().map(|(index, file)| {
            let target = targets.next();
            async move {
                let Some(target) = target else {
                    return Err(FailedUpload {
                        index,
                        name: file.name.clone(),
                        reason: "no pre-signed URL for file".into(),
                    });
                };
                match self.put(file, &target.upload_url).await {
                    Ok(()) => Ok(UploadedFile {
                        index,
                        name: file.name.clone(),
                        public_url: target.public_url,
                    }),
                    Err(reason) => {
                        warn!(target = "market.upload", file = %file.name, error = %reason, "upload_failed");
                        Err(FailedUpload {
                            index,
                            name: file.name.clone(),
                            reason,
                        })
                    }
                }
            }
        });

        let mut succeeded = Vec::new();
        let mut failed = Vec::new();
        for result in join_all(uploads).await {
            match result {
                Ok(done) => succeeded.push(done),
                Err(fail) => failed.push(fail),
            }
        }

        info!(
            target = "market.upload",
            succeeded = succeeded.len(),
            failed = failed.len(),
            "upload_batch_finished"
        );
        if failed.is_empty() {
            UploadOutcome::AllSucceeded(succeeded.into_iter().map(|f| f.public_url).collect())
        } else {
            UploadOutcome::PartialFailure { succeeded, failed }
        }
    }

    async fn put(&self, file: &ImageRef, upload_url: &str) -> Result<(), String> {
        let response = self
            .http
            .put(upload_url)
            .header(reqwest::header::CONTENT_TYPE, &file.content_type)
            .body(file.bytes.clone())
            .send()
            .await
            .map_err(|err| err.to_string())?;
        if !response.status().is_success() {
            return Err(format!("HTTP {}", response.status()));
        }
        Ok(())
    }
}
