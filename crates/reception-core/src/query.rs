use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};

use crate::{format_date, ReceptionError, ReceptionRecord, StatusKind};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    Id,
    ProductName,
    PalletNumber,
    Cartons,
    UnitsPerCarton,
    TotalUnits,
    Barcode,
    ProductionDate,
    ExpirationDate,
    ShelfLifeMonths,
    Status,
    CreatedAt,
}

impl SortField {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::ProductName => "product_name",
            Self::PalletNumber => "pallet_number",
            Self::Cartons => "cartons",
            Self::UnitsPerCarton => "units_per_carton",
            Self::TotalUnits => "total_units",
            Self::Barcode => "barcode",
            Self::ProductionDate => "production_date",
            Self::ExpirationDate => "expiration_date",
            Self::ShelfLifeMonths => "shelf_life_months",
            Self::Status => "status",
            Self::CreatedAt => "created_at",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "id" => Some(Self::Id),
            "product_name" => Some(Self::ProductName),
            "pallet_number" => Some(Self::PalletNumber),
            "cartons" => Some(Self::Cartons),
            "units_per_carton" => Some(Self::UnitsPerCarton),
            "total_units" => Some(Self::TotalUnits),
            "barcode" => Some(Self::Barcode),
            "production_date" => Some(Self::ProductionDate),
            "expiration_date" => Some(Self::ExpirationDate),
            "shelf_life_months" => Some(Self::ShelfLifeMonths),
            "status" => Some(Self::Status),
            "created_at" => Some(Self::CreatedAt),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            Self::Asc => ordering,
            Self::Desc => ordering.reverse(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
pub struct SortState {
    pub field: SortField,
    pub direction: SortDirection,
}

impl Default for SortState {
    /// Newest receptions first.
    fn default() -> Self {
        Self { field: SortField::CreatedAt, direction: SortDirection::Desc }
    }
}

impl SortState {
    /// Header-click semantics: re-selecting the ascending field flips it to
    /// descending, anything else sorts ascending.
    #[must_use]
    pub fn toggle(self, field: SortField) -> Self {
        let direction = if self.field == field && self.direction == SortDirection::Asc {
            SortDirection::Desc
        } else {
            SortDirection::Asc
        };
        Self { field, direction }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case", tag = "kind", content = "status")]
pub enum StatusFilter {
    #[default]
    All,
    Only(StatusKind),
}

impl StatusFilter {
    /// Parse `all` or a stored status name.
    ///
    /// # Errors
    /// Returns [`ReceptionError::Query`] for any other value.
    pub fn parse(value: &str) -> Result<Self, ReceptionError> {
        if value == "all" {
            return Ok(Self::All);
        }
        StatusKind::parse(value)
            .map(Self::Only)
            .ok_or_else(|| ReceptionError::Query(format!("unknown status filter: {value}")))
    }

    #[must_use]
    pub fn matches(self, record: &ReceptionRecord) -> bool {
        match self {
            Self::All => true,
            Self::Only(status) => record.status == status,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct ViewQuery {
    #[serde(default)]
    pub search_term: String,
    #[serde(default)]
    pub status_filter: StatusFilter,
    #[serde(default)]
    pub sort: SortState,
}

impl ViewQuery {
    /// Distinguishes "no results for this filter" from "nothing recorded yet".
    #[must_use]
    pub fn has_active_filters(&self) -> bool {
        !self.search_term.is_empty() || self.status_filter != StatusFilter::All
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct ReceptionView {
    pub query: ViewQuery,
    pub count: usize,
    pub total_units_displayed: u128,
    pub rows: Vec<ReceptionRecord>,
}

/// Text forms a search term is matched against. An absent pallet number
/// contributes nothing.
fn searchable_text(record: &ReceptionRecord) -> Vec<String> {
    let mut fields = vec![
        record.id.to_string(),
        record.product_name.clone(),
        record.cartons.to_string(),
        record.units_per_carton.to_string(),
        record.total_units.to_string(),
        record.barcode.clone(),
        format_date(record.production_date),
        format_date(record.expiration_date),
        record.shelf_life_months.to_string(),
        record.status.as_str().to_string(),
        record.status.label().to_string(),
        record
            .created_at
            .format(&time::format_description::well_known::Rfc3339)
            .unwrap_or_default(),
    ];
    if let Some(pallet_number) = &record.pallet_number {
        fields.push(pallet_number.clone());
    }
    fields
}

fn matches_search(record: &ReceptionRecord, needle: &str) -> bool {
    needle.is_empty()
        || searchable_text(record).iter().any(|field| field.to_lowercase().contains(needle))
}

/// Keep the records matching both the free-text search and the status filter.
#[must_use]
pub fn apply_filters(
    records: &[ReceptionRecord],
    search_term: &str,
    status_filter: StatusFilter,
) -> Vec<ReceptionRecord> {
    let needle = search_term.to_lowercase();
    records
        .iter()
        .filter(|record| matches_search(record, &needle))
        .filter(|record| status_filter.matches(record))
        .cloned()
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum SortKey<'a> {
    Missing,
    Number(i64),
    Text(&'a str),
    Day(Date),
    Timestamp(OffsetDateTime),
    Severity(u8),
}

fn sort_key(record: &ReceptionRecord, field: SortField) -> SortKey<'_> {
    match field {
        SortField::Id => SortKey::Text(record.id.as_str()),
        SortField::ProductName => SortKey::Text(&record.product_name),
        SortField::PalletNumber => {
            record.pallet_number.as_deref().map_or(SortKey::Missing, SortKey::Text)
        }
        SortField::Cartons => SortKey::Number(i64::from(record.cartons)),
        SortField::UnitsPerCarton => SortKey::Number(i64::from(record.units_per_carton)),
        SortField::TotalUnits => {
            SortKey::Number(i64::try_from(record.total_units).unwrap_or(i64::MAX))
        }
        SortField::Barcode => SortKey::Text(&record.barcode),
        SortField::ProductionDate => SortKey::Day(record.production_date),
        SortField::ExpirationDate => SortKey::Day(record.expiration_date),
        SortField::ShelfLifeMonths => SortKey::Number(i64::from(record.shelf_life_months)),
        SortField::Status => SortKey::Severity(record.status.rank()),
        SortField::CreatedAt => SortKey::Timestamp(record.created_at),
    }
}

/// Missing values sort first whichever way the direction points.
fn compare_keys(lhs: &SortKey<'_>, rhs: &SortKey<'_>, direction: SortDirection) -> Ordering {
    match (lhs, rhs) {
        (SortKey::Missing, SortKey::Missing) => Ordering::Equal,
        (SortKey::Missing, _) => Ordering::Less,
        (_, SortKey::Missing) => Ordering::Greater,
        _ => direction.apply(lhs.cmp(rhs)),
    }
}

/// Stable sort on one field.
#[must_use]
pub fn apply_sort(
    records: &[ReceptionRecord],
    field: SortField,
    direction: SortDirection,
) -> Vec<ReceptionRecord> {
    let mut sorted = records.to_vec();
    sorted.sort_by(|lhs, rhs| {
        compare_keys(&sort_key(lhs, field), &sort_key(rhs, field), direction)
    });
    sorted
}

/// Sum of `total_units` over `records`. Each record fits `u64`; the sum is
/// widened so any number of them cannot overflow.
#[must_use]
pub fn total_units_displayed(records: &[ReceptionRecord]) -> u128 {
    records.iter().map(|record| u128::from(record.total_units)).sum()
}

/// Full pipeline: newest-first base order, filters, then the requested sort.
/// Ties under the requested sort keep the newest-first order.
#[must_use]
pub fn build_view(records: &[ReceptionRecord], query: &ViewQuery) -> ReceptionView {
    let base = apply_sort(records, SortField::CreatedAt, SortDirection::Desc);
    let filtered = apply_filters(&base, &query.search_term, query.status_filter);
    let rows = apply_sort(&filtered, query.sort.field, query.sort.direction);
    ReceptionView {
        query: query.clone(),
        count: rows.len(),
        total_units_displayed: total_units_displayed(&rows),
        rows,
    }
}

/// Table state: search box, status dropdown and the active sort column.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct ReceptionTable {
    query: ViewQuery,
}

impl ReceptionTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn query(&self) -> &ViewQuery {
        &self.query
    }

    pub fn set_search(&mut self, search_term: impl Into<String>) {
        self.query.search_term = search_term.into();
    }

    pub fn set_status_filter(&mut self, status_filter: StatusFilter) {
        self.query.status_filter = status_filter;
    }

    pub fn sort_by(&mut self, field: SortField) {
        self.query.sort = self.query.sort.toggle(field);
    }

    pub fn clear_filters(&mut self) {
        self.query.search_term.clear();
        self.query.status_filter = StatusFilter::All;
    }

    #[must_use]
    pub fn has_active_filters(&self) -> bool {
        self.query.has_active_filters()
    }

    #[must_use]
    pub fn view(&self, records: &[ReceptionRecord]) -> ReceptionView {
        build_view(records, &self.query)
    }
}
