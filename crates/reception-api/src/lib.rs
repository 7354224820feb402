use std::path::Path;

use reception_core::{
    compute_status, report_file_name, shelf_life_months, total_units, NewReception,
    ReceptionDraft, ReceptionError, ReceptionId, ReceptionPatch, ReceptionRecord, ReceptionReport,
    ReceptionView, ReportFormat, ViewQuery,
};
use reception_store_json::{
    FileBackend, MemoryBackend, PersistenceError, ReceptionStore, StorageBackend, StoreError,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

pub const API_CONTRACT_VERSION: &str = "api.v1";

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Validation(#[from] ReceptionError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Invalid(err) => Self::Validation(err),
            StoreError::Persistence(err) => Self::Persistence(err),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubmitResult {
    pub record: ReceptionRecord,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeleteResult {
    pub id: ReceptionId,
    pub deleted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExportResult {
    pub file_name: String,
    pub format: ReportFormat,
    pub record_count: usize,
    pub total_units: u128,
    pub content: String,
}

/// Facade the presentation layer talks to. Each call reads the current blob, so
/// two facades over the same backend see each other's completed writes.
#[derive(Debug)]
pub struct ReceptionApi<B> {
    store: ReceptionStore<B>,
}

impl ReceptionApi<FileBackend> {
    /// Open the file-backed collection under `data_dir`.
    ///
    /// # Errors
    /// Returns [`ApiError::Persistence`] when the data directory cannot be created.
    pub fn open(data_dir: &Path) -> Result<Self, ApiError> {
        Ok(Self::new(FileBackend::open(data_dir)?))
    }
}

impl ReceptionApi<MemoryBackend> {
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(MemoryBackend::new())
    }
}

impl<B: StorageBackend> ReceptionApi<B> {
    pub fn new(backend: B) -> Self {
        Self { store: ReceptionStore::new(backend) }
    }

    pub fn store(&self) -> &ReceptionStore<B> {
        &self.store
    }

    /// Validate the form, derive the computed fields at `now` and persist.
    ///
    /// # Errors
    /// Returns [`ApiError::Validation`] for a rejected draft (nothing is written)
    /// and [`ApiError::Persistence`] when the write fails.
    pub fn submit(
        &mut self,
        draft: &ReceptionDraft,
        now: OffsetDateTime,
    ) -> Result<SubmitResult, ApiError> {
        let validated = draft.validate().inspect_err(|err| {
            tracing::debug!("Rejected reception draft: {}", err);
        })?;

        let mut warnings = Vec::new();
        if validated.expires_before_production() {
            tracing::warn!(
                "Reception {} expires ({}) before it was produced ({})",
                validated.product_name,
                validated.expiration_date,
                validated.production_date
            );
            warnings.push("expiration_date is before production_date".to_string());
        }

        let record = self.store.insert_at(NewReception::from_validated(validated, now), now)?;
        Ok(SubmitResult { record, warnings })
    }

    /// # Errors
    /// Returns [`ApiError::Persistence`] when storage cannot be read.
    pub fn list(&self) -> Result<Vec<ReceptionRecord>, ApiError> {
        Ok(self.store.list()?)
    }

    /// # Errors
    /// Returns [`ApiError::Persistence`] when storage cannot be read.
    pub fn get(&self, id: &ReceptionId) -> Result<Option<ReceptionRecord>, ApiError> {
        Ok(self.store.get(id)?)
    }

    /// The displayed table: newest first, filtered, then sorted per `query`.
    ///
    /// # Errors
    /// Returns [`ApiError::Persistence`] when storage cannot be read.
    pub fn view(&self, query: &ViewQuery) -> Result<ReceptionView, ApiError> {
        let records = self.store.list()?;
        Ok(reception_core::build_view(&records, query))
    }

    /// # Errors
    /// Returns [`ApiError::Persistence`] when storage cannot be read or written.
    pub fn delete(&mut self, id: &ReceptionId) -> Result<DeleteResult, ApiError> {
        let deleted = self.store.delete_by_id(id)?;
        Ok(DeleteResult { id: id.clone(), deleted })
    }

    /// Merge `patch` into the matching record. Total units and shelf life are
    /// recomputed when their inputs change; a date change also reclassifies the
    /// status at `now`. Returns `None` when the id is unknown.
    ///
    /// # Errors
    /// Returns [`ApiError::Validation`] when the merged record is malformed and
    /// [`ApiError::Persistence`] when storage cannot be read or written.
    pub fn update(
        &mut self,
        id: &ReceptionId,
        patch: &ReceptionPatch,
        now: OffsetDateTime,
    ) -> Result<Option<ReceptionRecord>, ApiError> {
        if patch.is_empty() {
            return Ok(self.store.get(id)?);
        }
        let Some(mut merged) = self.store.get(id)? else {
            tracing::debug!("Update of unknown reception {} ignored", id);
            return Ok(None);
        };
        merged.apply_patch(patch);

        let mut patch = patch.clone();
        if patch.touches_quantities() {
            patch.total_units =
                Some(total_units(Some(merged.cartons), Some(merged.units_per_carton)));
        }
        if patch.touches_dates() {
            let production = Some(merged.production_date);
            let expiration = Some(merged.expiration_date);
            if merged.expiration_date < merged.production_date {
                tracing::warn!(
                    "Reception {} now expires ({}) before it was produced ({})",
                    id,
                    merged.expiration_date,
                    merged.production_date
                );
            }
            patch.shelf_life_months = Some(shelf_life_months(production, expiration));
            if patch.status.is_none() {
                patch.status = Some(compute_status(production, expiration, now));
            }
        }

        Ok(self.store.update_by_id(id, &patch)?)
    }

    /// Render the report for exactly the rows `query` displays.
    ///
    /// # Errors
    /// Returns [`ApiError::Validation`] when the view is empty and
    /// [`ApiError::Persistence`] when storage cannot be read.
    pub fn export(
        &self,
        query: &ViewQuery,
        format: ReportFormat,
        now: OffsetDateTime,
    ) -> Result<ExportResult, ApiError> {
        let view = self.view(query)?;
        let report = ReceptionReport::build(&view.rows, now)?;
        let content = report.render(format)?;
        tracing::info!("Exported {} receptions as {}", report.record_count, format.extension());

        Ok(ExportResult {
            file_name: report_file_name(now, format),
            format,
            record_count: report.record_count,
            total_units: report.total_units,
            content,
        })
    }
}
