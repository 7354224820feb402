use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use reception_core::{
    NewReception, ReceptionError, ReceptionId, ReceptionPatch, ReceptionRecord, STORAGE_KEY,
};
use time::OffsetDateTime;

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("storage quota exceeded: {attempted} bytes requested, limit is {limit}")]
    QuotaExceeded { limit: usize, attempted: usize },
    #[error("stored receptions are corrupt: {0}")]
    Corrupt(String),
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Invalid(#[from] ReceptionError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

/// One key holding the whole serialized collection. Implementations either
/// replace the blob completely or leave the previous one in place.
pub trait StorageBackend {
    /// # Errors
    /// Returns [`PersistenceError`] when the backing storage cannot be read.
    fn read(&self) -> Result<Option<String>, PersistenceError>;

    /// # Errors
    /// Returns [`PersistenceError`] when the blob cannot be written in full.
    fn write(&mut self, blob: &str) -> Result<(), PersistenceError>;
}

/// In-process backend with optional quota and outage injection.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    blob: Option<String>,
    quota_bytes: Option<usize>,
    unavailable: bool,
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_blob(blob: impl Into<String>) -> Self {
        Self { blob: Some(blob.into()), ..Self::default() }
    }

    #[must_use]
    pub fn with_quota(mut self, quota_bytes: usize) -> Self {
        self.quota_bytes = Some(quota_bytes);
        self
    }

    pub fn set_unavailable(&mut self, unavailable: bool) {
        self.unavailable = unavailable;
    }

    #[must_use]
    pub fn blob(&self) -> Option<&str> {
        self.blob.as_deref()
    }
}

impl StorageBackend for MemoryBackend {
    fn read(&self) -> Result<Option<String>, PersistenceError> {
        if self.unavailable {
            return Err(PersistenceError::Unavailable("memory backend is offline".to_string()));
        }
        Ok(self.blob.clone())
    }

    fn write(&mut self, blob: &str) -> Result<(), PersistenceError> {
        if self.unavailable {
            return Err(PersistenceError::Unavailable("memory backend is offline".to_string()));
        }
        if let Some(limit) = self.quota_bytes {
            if blob.len() > limit {
                return Err(PersistenceError::QuotaExceeded { limit, attempted: blob.len() });
            }
        }
        self.blob = Some(blob.to_string());
        Ok(())
    }
}

/// `<dir>/warehouse-receptions.json`, replaced atomically through a temp file.
#[derive(Debug, Clone)]
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    /// # Errors
    /// Returns [`PersistenceError::Io`] when the data directory cannot be created.
    pub fn open(data_dir: &Path) -> Result<Self, PersistenceError> {
        fs::create_dir_all(data_dir)?;
        Ok(Self { path: data_dir.join(format!("{STORAGE_KEY}.json")) })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StorageBackend for FileBackend {
    fn read(&self) -> Result<Option<String>, PersistenceError> {
        match fs::read_to_string(&self.path) {
            Ok(blob) => Ok(Some(blob)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(PersistenceError::Io(err)),
        }
    }

    fn write(&mut self, blob: &str) -> Result<(), PersistenceError> {
        let mut tmp_path = self.path.clone().into_os_string();
        tmp_path.push(".tmp");
        let tmp_path = PathBuf::from(tmp_path);

        let written = write_synced(&tmp_path, blob).and_then(|()| fs::rename(&tmp_path, &self.path));
        if let Err(err) = written {
            if let Err(cleanup) = fs::remove_file(&tmp_path) {
                if cleanup.kind() != ErrorKind::NotFound {
                    tracing::warn!("Failed to remove {}: {}", tmp_path.display(), cleanup);
                }
            }
            return Err(PersistenceError::Io(err));
        }
        Ok(())
    }
}

fn write_synced(path: &Path, blob: &str) -> std::io::Result<()> {
    let mut file: File = OpenOptions::new().create(true).write(true).truncate(true).open(path)?;
    file.write_all(blob.as_bytes())?;
    file.sync_all()
}

/// Ordered reception collection over a single-blob backend. Every mutation is a
/// full read-modify-write; concurrent writers are not coordinated and the last
/// completed write wins.
#[derive(Debug)]
pub struct ReceptionStore<B> {
    backend: B,
}

impl<B: StorageBackend> ReceptionStore<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// All records in storage order.
    ///
    /// # Errors
    /// Returns [`PersistenceError`] when the blob cannot be read or decoded.
    pub fn list(&self) -> Result<Vec<ReceptionRecord>, PersistenceError> {
        let Some(blob) = self.backend.read()? else {
            return Ok(Vec::new());
        };
        if blob.trim().is_empty() {
            return Ok(Vec::new());
        }
        let records: Vec<ReceptionRecord> = serde_json::from_str(&blob)
            .map_err(|err| PersistenceError::Corrupt(err.to_string()))?;
        tracing::debug!("Loaded {} receptions", records.len());
        Ok(records)
    }

    /// # Errors
    /// Returns [`PersistenceError`] when the blob cannot be read or decoded.
    pub fn get(&self, id: &ReceptionId) -> Result<Option<ReceptionRecord>, PersistenceError> {
        Ok(self.list()?.into_iter().find(|record| &record.id == id))
    }

    /// Assign a fresh id and the current time, then append.
    ///
    /// # Errors
    /// Returns [`StoreError::Invalid`] for a malformed record and
    /// [`StoreError::Persistence`] when storage cannot be read or written.
    pub fn insert(&mut self, data: NewReception) -> Result<ReceptionRecord, StoreError> {
        self.insert_at(data, OffsetDateTime::now_utc())
    }

    /// [`Self::insert`] with an explicit `created_at`.
    ///
    /// # Errors
    /// Same as [`Self::insert`].
    pub fn insert_at(
        &mut self,
        data: NewReception,
        created_at: OffsetDateTime,
    ) -> Result<ReceptionRecord, StoreError> {
        let mut records = self.list()?;

        let mut id = ReceptionId::generate();
        while records.iter().any(|record| record.id == id) {
            id = ReceptionId::generate();
        }

        let record = ReceptionRecord::from_new(id, created_at, data);
        record.validate()?;
        records.push(record.clone());
        self.persist(&records)?;

        tracing::info!("Stored reception {} ({})", record.id, record.product_name);
        Ok(record)
    }

    /// Remove the matching record. Returns whether anything was removed; an
    /// unknown id leaves storage untouched.
    ///
    /// # Errors
    /// Returns [`PersistenceError`] when storage cannot be read or written.
    pub fn delete_by_id(&mut self, id: &ReceptionId) -> Result<bool, PersistenceError> {
        let mut records = self.list()?;
        let before = records.len();
        records.retain(|record| &record.id != id);
        if records.len() == before {
            tracing::debug!("Delete of unknown reception {} ignored", id);
            return Ok(false);
        }

        self.persist(&records)?;
        tracing::info!("Deleted reception {}", id);
        Ok(true)
    }

    /// Merge `patch` into the matching record. Returns the updated record, or
    /// `None` without writing when the id is unknown.
    ///
    /// # Errors
    /// Returns [`StoreError::Invalid`] when the merged record is malformed and
    /// [`StoreError::Persistence`] when storage cannot be read or written.
    pub fn update_by_id(
        &mut self,
        id: &ReceptionId,
        patch: &ReceptionPatch,
    ) -> Result<Option<ReceptionRecord>, StoreError> {
        let mut records = self.list()?;
        let Some(record) = records.iter_mut().find(|record| &record.id == id) else {
            tracing::debug!("Update of unknown reception {} ignored", id);
            return Ok(None);
        };

        record.apply_patch(patch);
        record.validate()?;
        let updated = record.clone();
        self.persist(&records)?;

        tracing::info!("Updated reception {}", id);
        Ok(Some(updated))
    }

    fn persist(&mut self, records: &[ReceptionRecord]) -> Result<(), PersistenceError> {
        let blob = serde_json::to_string(records)
            .map_err(|err| PersistenceError::Corrupt(format!("failed to serialize: {err}")))?;
        self.backend.write(&blob).inspect_err(|err| {
            tracing::error!("Failed to persist {} receptions: {}", records.len(), err);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reception_core::StatusKind;
    use time::macros::{date, datetime};

    fn mk_new(product_name: &str, cartons: u32) -> NewReception {
        NewReception {
            product_name: product_name.to_string(),
            pallet_number: Some("P-1".to_string()),
            cartons,
            units_per_carton: 12,
            total_units: u64::from(cartons) * 12,
            barcode: "123456".to_string(),
            production_date: date!(2024 - 01 - 15),
            expiration_date: date!(2024 - 07 - 15),
            shelf_life_months: 6,
            status: StatusKind::Fresh,
        }
    }

    fn unique_temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("reception-store-{}", ulid::Ulid::new()))
    }

    #[test]
    fn empty_storage_lists_nothing() -> Result<(), StoreError> {
        let store = ReceptionStore::new(MemoryBackend::new());
        assert!(store.list()?.is_empty());

        let store = ReceptionStore::new(MemoryBackend::with_blob("  "));
        assert!(store.list()?.is_empty());
        Ok(())
    }

    #[test]
    fn list_is_idempotent() -> Result<(), StoreError> {
        let mut store = ReceptionStore::new(MemoryBackend::new());
        store.insert(mk_new("Milk", 2))?;
        store.insert(mk_new("Butter", 3))?;

        assert_eq!(store.list()?, store.list()?);
        Ok(())
    }

    #[test]
    fn insert_round_trips_all_supplied_fields() -> Result<(), StoreError> {
        let mut store = ReceptionStore::new(MemoryBackend::new());
        let data = mk_new("Milk", 2);
        let created_at = datetime!(2024-02-01 09:30 UTC);

        let stored = store.insert_at(data.clone(), created_at)?;
        let listed = store.list()?;

        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0], stored);
        assert_eq!(listed[0].to_new(), data);
        assert_eq!(listed[0].created_at, created_at);
        Ok(())
    }

    #[test]
    fn insert_appends_in_storage_order_with_distinct_ids() -> Result<(), StoreError> {
        let mut store = ReceptionStore::new(MemoryBackend::new());
        let a = store.insert(mk_new("A", 1))?;
        let b = store.insert(mk_new("B", 1))?;
        let c = store.insert(mk_new("C", 1))?;

        let ids = store.list()?.into_iter().map(|record| record.id).collect::<Vec<_>>();
        assert_eq!(ids, vec![a.id.clone(), b.id.clone(), c.id.clone()]);
        assert_ne!(a.id, b.id);
        assert_ne!(b.id, c.id);
        Ok(())
    }

    #[test]
    fn insert_rejects_malformed_records_without_writing() -> Result<(), StoreError> {
        let mut store = ReceptionStore::new(MemoryBackend::new());
        let mut data = mk_new("Milk", 2);
        data.total_units = 999;

        assert!(matches!(store.insert(data), Err(StoreError::Invalid(_))));
        assert!(store.backend().blob().is_none());
        Ok(())
    }

    #[test]
    fn delete_removes_exactly_one() -> Result<(), StoreError> {
        let mut store = ReceptionStore::new(MemoryBackend::new());
        let mut ids = Vec::new();
        for index in 1..=4 {
            ids.push(store.insert(mk_new(&format!("Product {index}"), index))?.id);
        }

        assert!(store.delete_by_id(&ids[1])?);
        let remaining = store.list()?;
        assert_eq!(remaining.len(), 3);
        assert!(remaining.iter().all(|record| record.id != ids[1]));
        Ok(())
    }

    #[test]
    fn delete_of_unknown_id_is_a_no_op() -> Result<(), StoreError> {
        let mut store = ReceptionStore::new(MemoryBackend::new());
        store.insert(mk_new("Milk", 2))?;
        let before = store.backend().blob().map(str::to_string);

        assert!(!store.delete_by_id(&ReceptionId::from("missing"))?);
        assert_eq!(store.backend().blob().map(str::to_string), before);
        Ok(())
    }

    #[test]
    fn update_merges_partial_fields() -> Result<(), StoreError> {
        let mut store = ReceptionStore::new(MemoryBackend::new());
        let stored = store.insert(mk_new("Milk", 2))?;

        let patch = ReceptionPatch {
            product_name: Some("Milk 1L".to_string()),
            pallet_number: Some(None),
            ..ReceptionPatch::default()
        };
        let updated = store.update_by_id(&stored.id, &patch)?;

        let listed = store.list()?;
        assert_eq!(updated.as_ref(), listed.first());
        assert_eq!(listed[0].product_name, "Milk 1L");
        assert_eq!(listed[0].pallet_number, None);
        assert_eq!(listed[0].cartons, 2);
        assert_eq!(listed[0].created_at, stored.created_at);
        Ok(())
    }

    #[test]
    fn update_of_unknown_id_is_a_no_op() -> Result<(), StoreError> {
        let mut store = ReceptionStore::new(MemoryBackend::new());
        let patch = ReceptionPatch { cartons: Some(3), ..ReceptionPatch::default() };

        assert!(store.update_by_id(&ReceptionId::from("missing"), &patch)?.is_none());
        assert!(store.backend().blob().is_none());
        Ok(())
    }

    #[test]
    fn update_leaving_derived_fields_stale_is_rejected() -> Result<(), StoreError> {
        let mut store = ReceptionStore::new(MemoryBackend::new());
        let stored = store.insert(mk_new("Milk", 2))?;
        let patch = ReceptionPatch { cartons: Some(3), ..ReceptionPatch::default() };

        assert!(matches!(store.update_by_id(&stored.id, &patch), Err(StoreError::Invalid(_))));
        assert_eq!(store.list()?, vec![stored]);
        Ok(())
    }

    #[test]
    fn quota_failure_leaves_previous_blob() -> Result<(), StoreError> {
        let mut store = ReceptionStore::new(MemoryBackend::new());
        store.insert(mk_new("Milk", 2))?;
        let before = store.list()?;
        let blob = store.backend().blob().map(str::to_string).unwrap_or_default();
        let limit = blob.len() + 10;
        *store.backend_mut() = MemoryBackend::with_blob(blob).with_quota(limit);

        let result = store.insert(mk_new("Butter", 3));
        assert!(matches!(
            result,
            Err(StoreError::Persistence(PersistenceError::QuotaExceeded { .. }))
        ));
        assert_eq!(store.list()?, before);
        Ok(())
    }

    #[test]
    fn unavailable_storage_surfaces_persistence_errors() {
        let mut backend = MemoryBackend::new();
        backend.set_unavailable(true);
        let mut store = ReceptionStore::new(backend);

        assert!(matches!(store.list(), Err(PersistenceError::Unavailable(_))));
        assert!(matches!(
            store.insert(mk_new("Milk", 2)),
            Err(StoreError::Persistence(PersistenceError::Unavailable(_)))
        ));
        assert!(matches!(
            store.delete_by_id(&ReceptionId::from("x")),
            Err(PersistenceError::Unavailable(_))
        ));
    }

    #[test]
    fn corrupt_blob_fails_instead_of_reading_empty() {
        let mut store = ReceptionStore::new(MemoryBackend::with_blob("{not json"));
        assert!(matches!(store.list(), Err(PersistenceError::Corrupt(_))));
        assert!(matches!(
            store.insert(mk_new("Milk", 2)),
            Err(StoreError::Persistence(PersistenceError::Corrupt(_)))
        ));
        assert_eq!(store.backend().blob(), Some("{not json"));
    }

    #[test]
    fn legacy_blob_with_base36_ids_and_status_labels_is_readable() -> Result<(), StoreError> {
        let blob = r#"[{
            "id": "k3j9x0a1b",
            "product_name": "Yogurt",
            "pallet_number": null,
            "cartons": 4,
            "units_per_carton": 12,
            "total_units": 48,
            "barcode": "123456",
            "production_date": "2024-01-15",
            "expiration_date": "2024-07-15",
            "shelf_life_months": 6,
            "status": "OK",
            "created_at": "2024-01-15T10:00:00.000Z"
        }, {
            "id": "k3j9x0a1c",
            "product_name": "Cream",
            "pallet_number": "P-2",
            "cartons": 1,
            "units_per_carton": 6,
            "total_units": 6,
            "barcode": "654321",
            "production_date": "2024-01-15",
            "expiration_date": "2024-04-15",
            "shelf_life_months": 3,
            "status": "Passed 1/3",
            "created_at": "2024-02-20T10:00:00.000Z"
        }]"#;
        let mut store = ReceptionStore::new(MemoryBackend::with_blob(blob));

        let listed = store.list()?;
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id.as_str(), "k3j9x0a1b");
        assert_eq!(listed[0].status, StatusKind::Fresh);
        assert_eq!(listed[1].status, StatusKind::NearExpiry);

        // rewritten blobs carry status names
        assert!(store.delete_by_id(&ReceptionId::from("k3j9x0a1b"))?);
        let rewritten = store.backend().blob().unwrap_or_default().to_string();
        assert!(rewritten.contains(r#""status":"near_expiry""#), "unexpected blob: {rewritten}");
        assert!(!rewritten.contains("k3j9x0a1b"));
        Ok(())
    }

    #[test]
    fn file_backend_persists_across_reopen() -> Result<(), StoreError> {
        let dir = unique_temp_dir();
        let stored = {
            let mut store = ReceptionStore::new(FileBackend::open(&dir)?);
            store.insert(mk_new("Milk", 2))?
        };

        let store = ReceptionStore::new(FileBackend::open(&dir)?);
        assert_eq!(store.backend().path(), dir.join("warehouse-receptions.json"));
        assert_eq!(store.list()?, vec![stored]);

        fs::remove_dir_all(&dir).map_err(PersistenceError::Io)?;
        Ok(())
    }

    #[test]
    fn file_backend_failed_replace_leaves_no_temp_file() -> Result<(), StoreError> {
        let dir = unique_temp_dir();
        let mut backend = FileBackend::open(&dir)?;
        // a directory in place of the blob makes the final rename fail
        fs::create_dir(backend.path()).map_err(PersistenceError::Io)?;

        assert!(matches!(backend.write("[]"), Err(PersistenceError::Io(_))));
        assert!(!dir.join("warehouse-receptions.json.tmp").exists());
        assert!(backend.path().is_dir());

        fs::remove_dir_all(&dir).map_err(PersistenceError::Io)?;
        Ok(())
    }

    #[test]
    fn file_backend_missing_file_reads_as_empty() -> Result<(), StoreError> {
        let dir = unique_temp_dir();
        let store = ReceptionStore::new(FileBackend::open(&dir)?);
        assert!(store.list()?.is_empty());
        assert!(!store.backend().path().exists());

        fs::remove_dir_all(&dir).map_err(PersistenceError::Io)?;
        Ok(())
    }
}
