//! The image upload job.
//!
//! One request can upload any number of images and remove old ones. Images
//! are normalized on the blocking pool, placed by the resolver, then all
//! puts and deletes run concurrently under one deadline.
//!
//! Nothing is rolled back: if one upload fails the others stay stored and
//! the request still reports an error.

use std::time::Duration;

use bytes::Bytes;
use futures::future::join_all;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{info, warn};

use super::executor::BatchExecutor;
use super::form::{FilePart, UploadForm};
use super::item::{BatchItem, BatchKind, BatchOutcome};
use super::resolver::{resolve_deletions, FormContext, PartRef, ResolvedTarget};
use super::response::{ImageUploadSummary, InsertedImage};
use crate::imaging::{extension_or_bin, ImageNormalizer, NormalizedImage};
use crate::store::{join_key, BlobStore, DEFAULT_CONTENT_TYPE};

/// Failures of an image upload request.
///
/// The display text is what the client sees in the `msg` field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImageUploadError {
    #[error("upload images: userId is required")]
    MissingUser,

    #[error("upload images: folder is required")]
    MissingFolder,

    /// At least one image could not be stored
    #[error("upload images: upload error")]
    UploadFailed,

    /// Every image was stored but at least one old path could not be removed
    #[error("upload images: delete error")]
    DeleteFailed,
}

impl ImageUploadError {
    /// Whether the request itself was malformed.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::MissingUser | Self::MissingFolder)
    }
}

/// Uploads normalized images into one bucket under a namespace prefix.
pub struct ImageUploadJob<S: BlobStore> {
    executor: BatchExecutor<S>,
    normalizer: ImageNormalizer,
    prefix: String,
    budget: Duration,
}

impl<S: BlobStore> Clone for ImageUploadJob<S> {
    fn clone(&self) -> Self {
        Self {
            executor: self.executor.clone(),
            normalizer: self.normalizer,
            prefix: self.prefix.clone(),
            budget: self.budget,
        }
    }
}

impl<S: BlobStore + 'static> ImageUploadJob<S> {
    /// Create a job that stores under `prefix` (may be empty).
    pub fn new(executor: BatchExecutor<S>, prefix: impl Into<String>, budget: Duration) -> Self {
        Self {
            executor,
            normalizer: ImageNormalizer::new(),
            prefix: prefix.into(),
            budget,
        }
    }

    /// Use a custom normalizer.
    pub fn with_normalizer(mut self, normalizer: ImageNormalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    /// Namespace prefix of every key this job writes or deletes.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Run the job for one decoded form.
    pub async fn run(&self, form: UploadForm) -> Result<ImageUploadSummary, ImageUploadError> {
        let deadline = Instant::now() + self.budget;

        let user = form
            .value("userId")
            .ok_or(ImageUploadError::MissingUser)?
            .to_string();
        let folder = form
            .value("folder")
            .ok_or(ImageUploadError::MissingFolder)?
            .to_string();

        let deletions = resolve_deletions(form.value("imgPathsToDelete"), &folder, &self.prefix);
        let context = FormContext::from_form(&form, form.upload_parts().len());
        let parts = form.into_upload_parts();

        if parts.is_empty() && deletions.is_empty() {
            return Ok(ImageUploadSummary::nothing_to_do());
        }

        let file_names: Vec<String> = parts.iter().map(|p| p.file_name.clone()).collect();
        let images = self.normalize_all(parts).await;

        let targets: Vec<ResolvedTarget> = {
            let refs: Vec<PartRef<'_>> = images
                .iter()
                .zip(&file_names)
                .enumerate()
                .map(|(index, (image, file_name))| PartRef {
                    index,
                    file_name,
                    extension: &image.extension,
                })
                .collect();
            context.resolve_all(&refs, &user)
        };

        let uploads: Vec<BatchItem> = images
            .into_iter()
            .zip(&targets)
            .map(|(image, target)| {
                let key = join_key(&[&self.prefix, &folder, &target.destination]);
                BatchItem::upload(key, image.data, image.content_type)
                    .with_correlation_id(target.correlation_id.clone())
            })
            .collect();
        let removals: Vec<BatchItem> = deletions
            .iter()
            .map(|d| BatchItem::keyed(d.key.clone()))
            .collect();

        let (uploaded, removed) = tokio::join!(
            self.run_if_any(BatchKind::Upload, uploads, deadline),
            self.run_if_any(BatchKind::Delete, removals, deadline),
        );

        if uploaded.failed_count() > 0 {
            return Err(ImageUploadError::UploadFailed);
        }
        if removed.failed_count() > 0 {
            return Err(ImageUploadError::DeleteFailed);
        }

        let deleted: Vec<String> = deletions
            .into_iter()
            .zip(&removed.results)
            .filter(|(_, result)| result.ok && !result.absent)
            .map(|(target, _)| target.requested)
            .collect();

        info!(
            user = %user,
            folder = %folder,
            inserted = targets.len(),
            deleted = deleted.len(),
            "Image upload complete"
        );

        Ok(ImageUploadSummary {
            msg: None,
            inserted: targets.into_iter().map(inserted).collect(),
            deleted,
        })
    }

    /// Normalize every payload on the blocking pool, in order.
    async fn normalize_all(&self, parts: Vec<FilePart>) -> Vec<NormalizedImage> {
        let handles = parts.into_iter().map(|part| {
            let normalizer = self.normalizer;
            let raw = part.data.clone();
            let file_name = part.file_name.clone();
            let handle = tokio::task::spawn_blocking(move || {
                normalizer.normalize(part.data, &part.file_name, part.content_type.as_deref())
            });
            async move {
                match handle.await {
                    Ok(image) => image,
                    Err(e) => {
                        warn!(
                            file_name = %file_name,
                            error = %e,
                            "Normalization task failed, storing raw bytes"
                        );
                        raw_image(raw, &file_name)
                    }
                }
            }
        });

        join_all(handles).await
    }

    async fn run_if_any(
        &self,
        kind: BatchKind,
        items: Vec<BatchItem>,
        deadline: Instant,
    ) -> BatchOutcome {
        if items.is_empty() {
            return BatchOutcome {
                kind,
                results: Vec::new(),
            };
        }
        self.executor.run(kind, items, deadline).await
    }
}

fn inserted(target: ResolvedTarget) -> InsertedImage {
    InsertedImage {
        id: target.correlation_id,
        img_path: target.destination,
    }
}

fn raw_image(data: Bytes, file_name: &str) -> NormalizedImage {
    NormalizedImage {
        data,
        content_type: DEFAULT_CONTENT_TYPE,
        extension: extension_or_bin(file_name),
    }
}

// =============================================================================
// Tests
// =============================================================================
