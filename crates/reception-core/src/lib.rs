use std::fmt::{Display, Formatter};

use serde::{Deserialize, Deserializer, Serialize};
use time::{Date, OffsetDateTime};
use ulid::Ulid;

pub mod derive;
pub mod query;
pub mod report;

pub use derive::{
    compute_status, months_between, shelf_life_months, total_units, total_units_from_text,
};
pub use query::{
    apply_filters, apply_sort, build_view, total_units_displayed, ReceptionTable, ReceptionView,
    SortDirection, SortField, SortState, StatusFilter, ViewQuery,
};
pub use report::{report_file_name, ReceptionReport, ReportFormat, ReportRow};

/// Storage key the whole record collection is persisted under.
pub const STORAGE_KEY: &str = "warehouse-receptions";

/// Longest barcode accepted by the reception form.
pub const BARCODE_MAX_LEN: usize = 6;

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum ReceptionError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("query error: {0}")]
    Query(String),
}

time::serde::format_description!(ymd_date, Date, "[year]-[month]-[day]");

/// Opaque record identifier. Fresh ids are lowercase ULIDs; any string read back
/// from storage is accepted as-is.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(transparent)]
pub struct ReceptionId(pub String);

impl ReceptionId {
    #[must_use]
    pub fn generate() -> Self {
        Self(Ulid::new().to_string().to_lowercase())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ReceptionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ReceptionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Serialized by name. Reads also accept the display labels older blobs stored.
#[derive(Debug, Clone, Copy, Serialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StatusKind {
    Fresh,
    NearExpiry,
    Expired,
}

impl StatusKind {
    pub const ALL: [Self; 3] = [Self::Fresh, Self::NearExpiry, Self::Expired];

    /// Severity used when ordering by status.
    #[must_use]
    pub fn rank(self) -> u8 {
        match self {
            Self::Fresh => 1,
            Self::NearExpiry => 2,
            Self::Expired => 3,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fresh => "fresh",
            Self::NearExpiry => "near_expiry",
            Self::Expired => "expired",
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Fresh => "OK",
            Self::NearExpiry => "Passed 1/3",
            Self::Expired => "Expired",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "fresh" => Some(Self::Fresh),
            "near_expiry" => Some(Self::NearExpiry),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }

    /// Match a display label, ignoring ASCII case.
    #[must_use]
    pub fn from_label(value: &str) -> Option<Self> {
        let value = value.trim();
        Self::ALL.into_iter().find(|status| status.label().eq_ignore_ascii_case(value))
    }
}

impl<'de> Deserialize<'de> for StatusKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).or_else(|| Self::from_label(&raw)).ok_or_else(|| {
            serde::de::Error::unknown_variant(&raw, &["fresh", "near_expiry", "expired"])
        })
    }
}

impl Display for StatusKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A reception as supplied to the store, before an id and timestamp are assigned.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct NewReception {
    pub product_name: String,
    pub pallet_number: Option<String>,
    pub cartons: u32,
    pub units_per_carton: u32,
    pub total_units: u64,
    pub barcode: String,
    #[serde(with = "ymd_date")]
    pub production_date: Date,
    #[serde(with = "ymd_date")]
    pub expiration_date: Date,
    pub shelf_life_months: i32,
    pub status: StatusKind,
}

impl NewReception {
    /// Run the derivation engine over a validated draft. `now` is sampled once by
    /// the caller and the resulting status is frozen into the record.
    #[must_use]
    pub fn from_validated(draft: ValidatedDraft, now: OffsetDateTime) -> Self {
        let production = Some(draft.production_date);
        let expiration = Some(draft.expiration_date);
        Self {
            total_units: total_units(Some(draft.cartons), Some(draft.units_per_carton)),
            shelf_life_months: shelf_life_months(production, expiration),
            status: compute_status(production, expiration, now),
            product_name: draft.product_name,
            pallet_number: draft.pallet_number,
            cartons: draft.cartons,
            units_per_carton: draft.units_per_carton,
            barcode: draft.barcode,
            production_date: draft.production_date,
            expiration_date: draft.expiration_date,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct ReceptionRecord {
    pub id: ReceptionId,
    pub product_name: String,
    pub pallet_number: Option<String>,
    pub cartons: u32,
    pub units_per_carton: u32,
    pub total_units: u64,
    pub barcode: String,
    #[serde(with = "ymd_date")]
    pub production_date: Date,
    #[serde(with = "ymd_date")]
    pub expiration_date: Date,
    pub shelf_life_months: i32,
    pub status: StatusKind,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl ReceptionRecord {
    #[must_use]
    pub fn from_new(id: ReceptionId, created_at: OffsetDateTime, data: NewReception) -> Self {
        Self {
            id,
            product_name: data.product_name,
            pallet_number: data.pallet_number,
            cartons: data.cartons,
            units_per_carton: data.units_per_carton,
            total_units: data.total_units,
            barcode: data.barcode,
            production_date: data.production_date,
            expiration_date: data.expiration_date,
            shelf_life_months: data.shelf_life_months,
            status: data.status,
            created_at,
        }
    }

    /// Strip the store-assigned fields back off.
    #[must_use]
    pub fn to_new(&self) -> NewReception {
        NewReception {
            product_name: self.product_name.clone(),
            pallet_number: self.pallet_number.clone(),
            cartons: self.cartons,
            units_per_carton: self.units_per_carton,
            total_units: self.total_units,
            barcode: self.barcode.clone(),
            production_date: self.production_date,
            expiration_date: self.expiration_date,
            shelf_life_months: self.shelf_life_months,
            status: self.status,
        }
    }

    /// Merge every field present in `patch`, leaving the rest untouched.
    pub fn apply_patch(&mut self, patch: &ReceptionPatch) {
        if let Some(product_name) = &patch.product_name {
            self.product_name.clone_from(product_name);
        }
        if let Some(pallet_number) = &patch.pallet_number {
            self.pallet_number.clone_from(pallet_number);
        }
        if let Some(cartons) = patch.cartons {
            self.cartons = cartons;
        }
        if let Some(units_per_carton) = patch.units_per_carton {
            self.units_per_carton = units_per_carton;
        }
        if let Some(total_units) = patch.total_units {
            self.total_units = total_units;
        }
        if let Some(barcode) = &patch.barcode {
            self.barcode.clone_from(barcode);
        }
        if let Some(production_date) = patch.production_date {
            self.production_date = production_date;
        }
        if let Some(expiration_date) = patch.expiration_date {
            self.expiration_date = expiration_date;
        }
        if let Some(shelf_life_months) = patch.shelf_life_months {
            self.shelf_life_months = shelf_life_months;
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
    }

    /// Check the fields the store refuses to persist in a malformed state.
    ///
    /// # Errors
    /// Returns [`ReceptionError::Validation`] when a required field is empty or
    /// out of range, or when a derived field disagrees with its inputs.
    pub fn validate(&self) -> Result<(), ReceptionError> {
        if self.id.as_str().trim().is_empty() {
            return Err(ReceptionError::Validation("id MUST be non-empty".to_string()));
        }

        if self.product_name.trim().is_empty() {
            return Err(ReceptionError::Validation("product_name MUST be provided".to_string()));
        }

        if self.cartons == 0 || self.units_per_carton == 0 {
            return Err(ReceptionError::Validation(
                "cartons and units_per_carton MUST be positive".to_string(),
            ));
        }

        validate_barcode(&self.barcode)?;

        let expected_total = total_units(Some(self.cartons), Some(self.units_per_carton));
        if self.total_units != expected_total {
            return Err(ReceptionError::Validation(format!(
                "total_units {} does not match cartons * units_per_carton = {expected_total}",
                self.total_units
            )));
        }

        let expected_shelf_life =
            shelf_life_months(Some(self.production_date), Some(self.expiration_date));
        if self.shelf_life_months != expected_shelf_life {
            return Err(ReceptionError::Validation(format!(
                "shelf_life_months {} does not match the date range ({expected_shelf_life})",
                self.shelf_life_months
            )));
        }

        Ok(())
    }
}

/// Partial update. `pallet_number: Some(None)` clears the pallet number.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct ReceptionPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_name: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present_or_null"
    )]
    pub pallet_number: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cartons: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub units_per_carton: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_units: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub barcode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "ymd_date::option")]
    pub production_date: Option<Date>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "ymd_date::option")]
    pub expiration_date: Option<Date>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shelf_life_months: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<StatusKind>,
}

/// A present key (even `null`) is `Some`; only a missing key stays `None`.
fn present_or_null<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<Option<String>>, D::Error> {
    Option::<String>::deserialize(deserializer).map(Some)
}

impl ReceptionPatch {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    #[must_use]
    pub fn touches_quantities(&self) -> bool {
        self.cartons.is_some() || self.units_per_carton.is_some()
    }

    #[must_use]
    pub fn touches_dates(&self) -> bool {
        self.production_date.is_some() || self.expiration_date.is_some()
    }
}

/// Raw reception form input, exactly as typed.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct ReceptionDraft {
    pub product_name: String,
    pub pallet_number: Option<String>,
    pub cartons: String,
    pub units_per_carton: String,
    pub barcode: String,
    pub production_date: Option<String>,
    pub expiration_date: Option<String>,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ValidatedDraft {
    pub product_name: String,
    pub pallet_number: Option<String>,
    pub cartons: u32,
    pub units_per_carton: u32,
    pub barcode: String,
    pub production_date: Date,
    pub expiration_date: Date,
}

impl ValidatedDraft {
    #[must_use]
    pub fn expires_before_production(&self) -> bool {
        self.expiration_date < self.production_date
    }
}

/// Live figures shown next to the form while it is being filled in.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
pub struct DraftPreview {
    pub total_units: u64,
    pub shelf_life_months: i32,
    pub status: StatusKind,
}

impl ReceptionDraft {
    /// Validate the form before anything is written.
    ///
    /// # Errors
    /// Returns [`ReceptionError::Validation`] naming the first missing or malformed field.
    pub fn validate(&self) -> Result<ValidatedDraft, ReceptionError> {
        let (Some(production_raw), Some(expiration_raw)) =
            (non_blank(self.production_date.as_deref()), non_blank(self.expiration_date.as_deref()))
        else {
            return Err(ReceptionError::Validation(
                "production_date and expiration_date are required".to_string(),
            ));
        };
        let production_date = parse_date(production_raw)?;
        let expiration_date = parse_date(expiration_raw)?;

        let product_name = self.product_name.trim();
        if product_name.is_empty() {
            return Err(ReceptionError::Validation("product_name MUST be provided".to_string()));
        }

        let cartons = parse_positive("cartons", &self.cartons)?;
        let units_per_carton = parse_positive("units_per_carton", &self.units_per_carton)?;

        let barcode = self.barcode.trim();
        validate_barcode(barcode)?;

        Ok(ValidatedDraft {
            product_name: product_name.to_string(),
            pallet_number: non_blank(self.pallet_number.as_deref()).map(str::to_string),
            cartons,
            units_per_carton,
            barcode: barcode.to_string(),
            production_date,
            expiration_date,
        })
    }

    /// Permissive derivation over whatever has been typed so far: unparsable
    /// quantities count as zero and missing dates yield a zero shelf life.
    #[must_use]
    pub fn preview(&self, now: OffsetDateTime) -> DraftPreview {
        let production =
            non_blank(self.production_date.as_deref()).and_then(|raw| parse_date(raw).ok());
        let expiration =
            non_blank(self.expiration_date.as_deref()).and_then(|raw| parse_date(raw).ok());
        DraftPreview {
            total_units: total_units_from_text(&self.cartons, &self.units_per_carton),
            shelf_life_months: shelf_life_months(production, expiration),
            status: compute_status(production, expiration, now),
        }
    }
}

/// Apply the form's input mask: keep digits only, at most [`BARCODE_MAX_LEN`].
#[must_use]
pub fn sanitize_barcode(raw: &str) -> String {
    raw.chars().filter(char::is_ascii_digit).take(BARCODE_MAX_LEN).collect()
}

/// Parse a `YYYY-MM-DD` calendar date.
///
/// # Errors
/// Returns [`ReceptionError::Validation`] when `raw` is not a valid date in that form.
pub fn parse_date(raw: &str) -> Result<Date, ReceptionError> {
    Date::parse(raw.trim(), time::macros::format_description!("[year]-[month]-[day]"))
        .map_err(|err| ReceptionError::Validation(format!("invalid date `{raw}`: {err}")))
}

/// Render a date in its stored `YYYY-MM-DD` form.
#[must_use]
pub fn format_date(date: Date) -> String {
    format!("{:04}-{:02}-{:02}", date.year(), u8::from(date.month()), date.day())
}

fn validate_barcode(barcode: &str) -> Result<(), ReceptionError> {
    if barcode.is_empty() {
        return Err(ReceptionError::Validation("barcode MUST be provided".to_string()));
    }
    if !barcode.chars().all(|c| c.is_ascii_digit()) {
        return Err(ReceptionError::Validation("barcode MUST contain digits only".to_string()));
    }
    if barcode.len() > BARCODE_MAX_LEN {
        return Err(ReceptionError::Validation(format!(
            "barcode MUST be at most {BARCODE_MAX_LEN} digits"
        )));
    }
    Ok(())
}

fn parse_positive(field: &str, raw: &str) -> Result<u32, ReceptionError> {
    match raw.trim().parse::<u32>() {
        Ok(value) if value > 0 => Ok(value),
        _ => Err(ReceptionError::Validation(format!("{field} MUST be a positive integer"))),
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}
