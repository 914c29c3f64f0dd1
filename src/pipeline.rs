use crate::backend::{BackendError, ProductsClient};
use crate::draft::{DraftError, DraftListing};
use crate::llm::GeminiClient;
use crate::models::{ImageRef, ProductAnalysis, StageReport, SubmitReport, ValidationResult};
use crate::upload::{UploadCoordinator, UploadError};
use crate::validation;
use serde::Serialize;
use serde_json::{Value, json};
use std::{future::Future, sync::Arc, time::Instant};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Where a submit attempt currently is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SubmitState {
    Idle,
    Validating,
    Uploading,
    Submitting,
    Done,
    Failed { stage: String, error: String },
}

impl SubmitState {
    fn can_advance_to(&self, next: &SubmitState) -> bool {
        use SubmitState::*;
        matches!(
            (self, next),
            (Idle, Validating)
                | (Validating, Uploading)
                | (Uploading, Submitting)
                | (Submitting, Done)
                | (Validating | Uploading | Submitting, Failed { .. })
                | (Done | Failed { .. }, Idle)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitMode {
    Create,
    Update { id: String },
}

impl SubmitMode {
    fn label(&self) -> &'static str {
        match self {
            SubmitMode::Create => "create",
            SubmitMode::Update { .. } => "update",
        }
    }
}

/// Drives a draft through validate, sign, upload and create/update.
pub struct SubmitPipeline {
    vision: Arc<GeminiClient>,
    products: ProductsClient,
    uploads: UploadCoordinator,
    state: SubmitState,
    history: Vec<SubmitState>,
}

impl SubmitPipeline {
    pub fn new(vision: Arc<GeminiClient>, products: ProductsClient) -> Self {
        let uploads = UploadCoordinator::new(products.clone());
        Self {
            vision,
            products,
            uploads,
            state: SubmitState::Idle,
            history: vec![SubmitState::Idle],
        }
    }

    pub fn state(&self) -> &SubmitState {
        &self.state
    }

    /// Every state the last attempt went through, starting at `Idle`.
    pub fn history(&self) -> &[SubmitState] {
        &self.history
    }

    fn transition(&mut self, next: SubmitState) {
        if !self.state.can_advance_to(&next) {
            warn!(target = "market.pipeline", from = ?self.state, to = ?next, "unexpected_state_transition");
        }
        debug!(target = "market.pipeline", from = ?self.state, to = ?next, "state_transition");
        self.history.push(next.clone());
        self.state = next;
    }

    fn fail(&mut self, err: &PipelineError) {
        self.transition(SubmitState::Failed {
            stage: err.stage().to_string(),
            error: err.detail().to_string(),
        });
    }

    /// Add-time admission: validates the candidates and appends them only if
    /// every one is accepted. On any rejection or error the draft is left as
    /// it was.
    pub async fn admit_images(
        &self,
        draft: &mut DraftListing,
        candidates: Vec<ImageRef>,
    ) -> Result<Vec<ValidationResult>, PipelineError> {
        draft
            .check_capacity(candidates.len())
            .map_err(|err| PipelineError::invalid_input("add_images", err.to_string()))?;
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let refs: Vec<&ImageRef> = candidates.iter().collect();
        let results = validation::validate_all(
            &self.vision,
            &refs,
            &draft.details.title,
            draft.details.category,
        )
        .await;

        let mut accepted = Vec::with_capacity(results.len());
        let mut rejections = Vec::new();
        let mut failures = Vec::new();
        for (image, result) in candidates.iter().zip(results) {
            match result {
                Ok(result) if result.accepted => accepted.push(result),
                Ok(result) => rejections.push(format!("{}: {}", image.name, result.message)),
                Err(err) => {
                    warn!(target = "market.pipeline", image = %image.name, error = %err, "admission_validation_failed");
                    failures.push(format!("{}: {}", image.name, err));
                }
            }
        }

        if !failures.is_empty() {
            failures.extend(rejections);
            return Err(PipelineError::internal(
                "add_images",
                format!(
                    "Failed to validate images. Please try again.\n{}",
                    failures.join("\n")
                ),
            ));
        }
        if !rejections.is_empty() {
            return Err(PipelineError::invalid_input(
                "add_images",
                format!(
                    "Some images were rejected:\n{}\n\nPlease upload appropriate product images only.",
                    rejections.join("\n")
                ),
            ));
        }

        let mut admitted = candidates;
        for image in &mut admitted {
            image
                .mark_validated()
                .map_err(|err| PipelineError::internal("add_images", err.to_string()))?;
        }
        draft
            .add_images(admitted)
            .map_err(|err| PipelineError::invalid_input("add_images", err.to_string()))?;
        Ok(accepted)
    }

    /// Fills the draft's fields from an AI reading of its first image. The
    /// seller-only fields must already be present, since the analysis cannot
    /// supply them.
    pub async fn autofill(&self, draft: &mut DraftListing) -> Result<ProductAnalysis, PipelineError> {
        draft
            .check_seller_fields()
            .map_err(|err| PipelineError::invalid_input("analyze", err.to_string()))?;
        let first = draft
            .images()
            .iter()
            .find(|image| !image.bytes.is_empty())
            .ok_or_else(|| {
                PipelineError::invalid_input("analyze", "Please upload at least one image to analyze")
            })?;
        let analysis = validation::analyze_product(&self.vision, first)
            .await
            .map_err(|err| {
                PipelineError::internal(
                    "analyze",
                    format!("Failed to analyze image ({err}). Please try again or fill in details manually."),
                )
            })?;
        draft.apply_analysis(&analysis);
        Ok(analysis)
    }

    /// One user-initiated submit. Each call is a distinct attempt; a draft
    /// that already went through is sent again if submitted again.
    pub async fn submit(
        &mut self,
        draft: &mut DraftListing,
        mode: SubmitMode,
    ) -> Result<SubmitReport, PipelineError> {
        self.history.clear();
        self.state = SubmitState::Idle;
        self.history.push(SubmitState::Idle);

        let submission_id = Uuid::new_v4().simple().to_string();
        info!(target = "market.pipeline", submission_id = %submission_id, mode = mode.label(), images = draft.images().len(), "submit_started");

        let mut stages = Vec::new();
        match self.drive(draft, &mode, &mut stages).await {
            Ok((images, record)) => {
                self.transition(SubmitState::Done);
                info!(target = "market.pipeline", submission_id = %submission_id, "submit_done");
                Ok(SubmitReport {
                    submission_id,
                    mode: mode.label().to_string(),
                    images,
                    record,
                    stages,
                })
            }
            Err(err) => {
                warn!(target = "market.pipeline", submission_id = %submission_id, stage = err.stage(), error = %err, "submit_failed");
                self.fail(&err);
                Err(err)
            }
        }
    }

    async fn drive(
        &mut self,
        draft: &mut DraftListing,
        mode: &SubmitMode,
        stages: &mut Vec<StageReport>,
    ) -> Result<(Vec<String>, Value), PipelineError> {
        self.transition(SubmitState::Validating);

        capture_stage("validate_draft", stages, {
            let draft = &*draft;
            async move { stages::validate_draft(draft) }
        })
        .await?;

        let verdicts = capture_stage("validate_images", stages, {
            let vision = &*self.vision;
            let draft = &*draft;
            async move { stages::validate_images(vision, draft).await }
        })
        .await?;
        apply_verdicts(draft, verdicts)?;

        self.transition(SubmitState::Uploading);

        let pending: Vec<usize> = draft
            .images()
            .iter()
            .enumerate()
            .filter(|(_, image)| !image.is_uploaded())
            .map(|(index, _)| index)
            .collect();

        let targets = capture_stage("request_targets", stages, {
            let uploads = &self.uploads;
            let files: Vec<&ImageRef> = pending.iter().map(|&i| &draft.images()[i]).collect();
            async move { stages::request_targets(uploads, &files).await }
        })
        .await?;

        let urls = capture_stage("upload_images", stages, {
            let uploads = &self.uploads;
            let files: Vec<&ImageRef> = pending.iter().map(|&i| &draft.images()[i]).collect();
            async move { stages::upload_images(uploads, &files, targets).await }
        })
        .await?;

        for (&index, url) in pending.iter().zip(urls) {
            draft.images_mut()[index]
                .mark_uploaded(url)
                .map_err(|err| PipelineError::internal("upload_images", err.to_string()))?;
        }

        self.transition(SubmitState::Submitting);

        let image_urls = draft
            .images()
            .iter()
            .map(|image| {
                image.public_url().map(str::to_string).ok_or_else(|| {
                    PipelineError::internal(
                        "submit_listing",
                        format!("image `{}` has no public URL", image.name),
                    )
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let record = capture_stage("submit_listing", stages, {
            let products = &self.products;
            let details = &draft.details;
            let image_urls = image_urls.clone();
            async move { stages::submit_listing(products, mode, details, image_urls).await }
        })
        .await?;

        Ok((image_urls, record))
    }
}

/// Runs one stage, timing it and appending its report.
async fn capture_stage<T, Fut>(
    name: &'static str,
    stages: &mut Vec<StageReport>,
    fut: Fut,
) -> Result<T, PipelineError>
where
    Fut: Future<Output = Result<StageOutcome<T>, PipelineError>>,
{
    let started = Instant::now();
    let outcome = fut.await?;
    let elapsed_ms = started.elapsed().as_millis();
    crate::metrics::stage_elapsed(name, elapsed_ms);
    stages.push(StageReport::new(name, elapsed_ms, outcome.output));
    Ok(outcome.value)
}

/// Verdict for one image from the submit-time validation pass.
#[derive(Debug)]
enum Verdict {
    Accepted,
    Rejected(String),
    Unavailable(String),
}

fn apply_verdicts(
    draft: &mut DraftListing,
    verdicts: Vec<(usize, Verdict)>,
) -> Result<(), PipelineError> {
    let mut problems = Vec::new();
    let mut service_failure = false;

    for (index, verdict) in verdicts {
        let image = &mut draft.images_mut()[index];
        let outcome = match verdict {
            Verdict::Accepted => image.mark_validated(),
            Verdict::Rejected(message) => {
                problems.push(format!("{}: {}", image.name, message));
                if image.is_rejected() {
                    Ok(())
                } else {
                    image.reject(message)
                }
            }
            Verdict::Unavailable(reason) => {
                service_failure = true;
                problems.push(format!("{}: {}", image.name, reason));
                Ok(())
            }
        };
        outcome.map_err(|err| PipelineError::internal("validate_images", err.to_string()))?;
    }

    if problems.is_empty() {
        return Ok(());
    }
    let message = format!(
        "Some images appear to be invalid or don't match the product description. Please review and update your images.\n{}",
        problems.join("\n")
    );
    if service_failure {
        Err(PipelineError::internal("validate_images", message))
    } else {
        Err(PipelineError::invalid_input("validate_images", message))
    }
}

#[derive(Debug, Error)]
#[error("stage `{stage}` failed: {message}")]
pub struct PipelineError {
    stage: &'static str,
    message: String,
    kind: PipelineErrorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineErrorKind {
    InvalidInput,
    Internal,
}

impl PipelineError {
    pub fn invalid_input(stage: &'static str, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            kind: PipelineErrorKind::InvalidInput,
        }
    }

    pub fn internal(stage: &'static str, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            kind: PipelineErrorKind::Internal,
        }
    }

    pub fn stage(&self) -> &'static str {
        self.stage
    }

    pub fn kind(&self) -> PipelineErrorKind {
        self.kind
    }

    pub fn detail(&self) -> &str {
        &self.message
    }
}

#[derive(Debug)]
pub struct StageOutcome<T> {
    pub value: T,
    pub output: Value,
}

impl<T> StageOutcome<T> {
    fn new(value: T, output: Value) -> Self {
        Self { value, output }
    }
}

mod stages {
    use super::*;
    use crate::models::UploadTarget;

    pub(super) fn validate_draft(
        draft: &DraftListing,
    ) -> Result<StageOutcome<()>, PipelineError> {
        draft
            .validate()
            .map_err(|err: DraftError| PipelineError::invalid_input("validate_draft", err.to_string()))?;
        Ok(StageOutcome::new((), json!({ "images": draft.images().len() })))
    }

    /// Re-validates every image that is not in storage yet. Images rejected
    /// earlier keep their verdict without another model call.
    pub(super) async fn validate_images(
        vision: &GeminiClient,
        draft: &DraftListing,
    ) -> Result<StageOutcome<Vec<(usize, Verdict)>>, PipelineError> {
        let mut verdicts = Vec::new();
        let mut to_check = Vec::new();
        for (index, image) in draft.images().iter().enumerate() {
            if let Some(message) = image.rejection() {
                verdicts.push((index, Verdict::Rejected(message.to_string())));
            } else if !image.is_uploaded() {
                to_check.push(index);
            }
        }

        let refs: Vec<&ImageRef> = to_check.iter().map(|&i| &draft.images()[i]).collect();
        let results = validation::validate_all(
            vision,
            &refs,
            &draft.details.title,
            draft.details.category,
        )
        .await;

        for (&index, result) in to_check.iter().zip(results) {
            let verdict = match result {
                Ok(result) if result.accepted => Verdict::Accepted,
                Ok(result) => Verdict::Rejected(result.message),
                Err(err) => Verdict::Unavailable(err.to_string()),
            };
            verdicts.push((index, verdict));
        }
        verdicts.sort_by_key(|(index, _)| *index);

        let rejected = verdicts
            .iter()
            .filter(|(_, v)| !matches!(v, Verdict::Accepted))
            .count();
        Ok(StageOutcome::new(
            verdicts,
            json!({
                "checked": to_check.len(),
                "rejected": rejected,
            }),
        ))
    }

    pub(super) async fn request_targets(
        uploads: &UploadCoordinator,
        files: &[&ImageRef],
    ) -> Result<StageOutcome<Vec<UploadTarget>>, PipelineError> {
        if files.is_empty() {
            return Ok(StageOutcome::new(Vec::new(), json!({ "requested": 0 })));
        }
        let targets = uploads.request_targets(files).await.map_err(|err| {
            PipelineError::internal(
                "request_targets",
                format!("{err}. Please try again."),
            )
        })?;
        Ok(StageOutcome::new(
            targets,
            json!({ "requested": files.len() }),
        ))
    }

    pub(super) async fn upload_images(
        uploads: &UploadCoordinator,
        files: &[&ImageRef],
        targets: Vec<UploadTarget>,
    ) -> Result<StageOutcome<Vec<String>>, PipelineError> {
        if files.is_empty() {
            return Ok(StageOutcome::new(Vec::new(), json!({ "uploaded": 0 })));
        }
        let urls = uploads
            .upload_all(files, targets)
            .await
            .into_result()
            .map_err(|err: UploadError| {
                PipelineError::internal("upload_images", format!("{err}. Please try again."))
            })?;
        Ok(StageOutcome::new(
            urls.clone(),
            json!({ "uploaded": urls.len() }),
        ))
    }

    pub(super) async fn submit_listing(
        products: &ProductsClient,
        mode: &SubmitMode,
        details: &crate::models::ListingDetails,
        image_urls: Vec<String>,
    ) -> Result<StageOutcome<Value>, PipelineError> {
        let result = match mode {
            SubmitMode::Create => products.create_product(details, &image_urls).await,
            SubmitMode::Update { id } => products.update_product(id, details, &image_urls).await,
        };
        let record = result.map_err(submission_error)?;
        Ok(StageOutcome::new(
            record.clone(),
            json!({
                "mode": mode.label(),
                "images": image_urls,
                "id": record.get("_id").or_else(|| record.get("id")),
            }),
        ))
    }

    fn submission_error(err: BackendError) -> PipelineError {
        let message = match err.backend_message() {
            Some(message) => message.to_string(),
            None => format!("Failed to submit listing ({err}). Please try again."),
        };
        PipelineError::internal("submit_listing", message)
    }
}
