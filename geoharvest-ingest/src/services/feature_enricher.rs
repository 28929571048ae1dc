//! Feature enricher
//!
//! Computes one [`Feature`] per photo from three independent sources:
//! terrain elevation, the validity classifier (fed the stored medium
//! rendition) and road proximity. GPS altitude comes from EXIF and is
//! optional; everything else is required.
//!
//! **Failure policy:** failed photos are left out and stay featureless for
//! a later batch. If failures exceed `max(10, total / 10)` the whole batch
//! fails with `BatchAborted`.

use crate::clients::{ElevationLookup, ImageSource, ValidityClassifier};
use crate::error::{IngestError, IngestResult};
use crate::services::gps_altitude::gps_altitude_meters;
use crate::services::road_proximity::RoadProximity;
use crate::utils::run_bounded;
use geoharvest_common::{Feature, Photo};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Collaborators shared by every enrichment task
struct Sources {
    elevation: Arc<dyn ElevationLookup>,
    images: Arc<dyn ImageSource>,
    classifier: Arc<dyn ValidityClassifier>,
    roads: RoadProximity,
}

pub struct FeatureEnricher {
    sources: Arc<Sources>,
    concurrency: usize,
}

/// Most failures a batch of `total` may have and still succeed
pub fn failure_budget(total: usize) -> usize {
    (total / 10).max(10)
}

impl FeatureEnricher {
    pub fn new(
        elevation: Arc<dyn ElevationLookup>,
        images: Arc<dyn ImageSource>,
        classifier: Arc<dyn ValidityClassifier>,
        roads: RoadProximity,
        concurrency: usize,
    ) -> Self {
        Self {
            sources: Arc::new(Sources {
                elevation,
                images,
                classifier,
                roads,
            }),
            concurrency,
        }
    }

    /// Enrich a batch of photos
    pub async fn compute(
        &self,
        photos: Vec<Photo>,
        cancel: &CancellationToken,
    ) -> IngestResult<Vec<Feature>> {
        let total = photos.len();
        if total == 0 {
            return Ok(Vec::new());
        }

        let sources = Arc::clone(&self.sources);
        let results = run_bounded(photos, self.concurrency, cancel, move |photo| {
            let sources = Arc::clone(&sources);
            async move {
                sources.compute_one(&photo).await.map_err(|e| {
                    tracing::error!(photo_id = %photo.id, error = %e, "Feature computation failed");
                    e
                })
            }
        })
        .await?;

        let mut features = Vec::with_capacity(total);
        let mut failed = 0;
        for result in results {
            match result {
                Ok(feature) => features.push(feature),
                Err(_) => failed += 1,
            }
        }

        if failed > failure_budget(total) {
            tracing::error!(failed, total, "Too many feature failures, aborting batch");
            return Err(IngestError::BatchAborted {
                operation: "feature enrichment",
                failed,
                total,
            });
        }

        tracing::info!(computed = features.len(), failed, total, "Features computed");
        Ok(features)
    }
}

impl Sources {
    async fn compute_one(&self, photo: &Photo) -> IngestResult<Feature> {
        let context = || format!("photo {}", photo.id);

        let (lng, lat) = photo
            .parse_lng_lat()
            .map_err(|e| IngestError::permanent(context(), e))?;

        let terrain = self.elevation.lookup_elevation(lng, lat).await?;
        let gps_altitude = gps_altitude_meters(photo);

        if photo.medium.source.is_empty() {
            return Err(IngestError::permanent(context(), "no stored medium rendition"));
        }
        let image = self.images.fetch_image(&photo.medium.source).await?;
        let validity = self.classifier.classify(&image).await?;

        let road_meters = self.roads.distance_to_road(lng, lat).await?;

        tracing::debug!(
            photo_id = %photo.id,
            terrain,
            ?gps_altitude,
            score = validity.score,
            road_meters,
            "Feature computed"
        );

        Ok(Feature {
            photo_id: photo.id.clone(),
            terrain_elevation_meters: terrain.round() as i32,
            gps_altitude_meters: gps_altitude,
            validity_score: validity.score,
            validity_model: validity.model,
            nearest_road_meters: road_meters,
        })
    }
}
