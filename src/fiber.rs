//! # Fiber-Line Module
//!
//! Lookups over the fiber-optic line (ВОЛС) dataset: which providers have
//! contracts at a transformer station, and which stations a provider serves.
//! Rows are limited to the user's fiber sub-scope unless that scope is `ALL`.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use tracing::{debug, warn};

use crate::cache::SheetCache;
use crate::config::FiberSchema;
use crate::errors::{BotError, SourceError};
use crate::normalize::canonical_station_id;
use crate::sheet::{Row, Sheet};

/// Cache entry name of the fiber sheet
pub const FIBER_SHEET: &str = "fiber";

const PROVIDER_HEADER_HINTS: &[&str] = &["провайдер", "контрагент", "подрядчик"];

/// Field name and value (`None` when empty) of one printed row
pub type FieldList = Vec<(String, Option<String>)>;

/// A group label with its row count
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    pub name: String,
    pub count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Columns {
    station: usize,
    provider: usize,
    region: Option<usize>,
}

/// Columns detected on one cached sheet
struct Resolved {
    sheet: Arc<Sheet>,
    columns: Columns,
}

/// Fiber-line lookups backed by the cached fiber sheet
pub struct FiberDirectory {
    cache: Arc<SheetCache>,
    schema: FiberSchema,
    resolved: ArcSwapOption<Resolved>,
}

impl FiberDirectory {
    /// `cache` must hold the fiber sheet under [`FIBER_SHEET`]
    pub fn new(cache: Arc<SheetCache>, schema: FiberSchema) -> Self {
        Self {
            cache,
            schema,
            resolved: ArcSwapOption::empty(),
        }
    }

    pub fn canonical_station(&self, raw: &str) -> String {
        canonical_station_id(raw, &self.schema.station_prefix)
    }

    /// Current sheet with its columns; detection runs once per snapshot
    async fn sheet(&self) -> Result<(Arc<Sheet>, Columns), BotError> {
        let sheet = self.cache.get(FIBER_SHEET).await?.ok_or(BotError::NotFound)?;

        if let Some(resolved) = self.resolved.load_full() {
            if Arc::ptr_eq(&resolved.sheet, &sheet) {
                return Ok((sheet, resolved.columns));
            }
        }

        let columns = self.columns(&sheet)?;
        self.resolved.store(Some(Arc::new(Resolved {
            sheet: Arc::clone(&sheet),
            columns,
        })));
        Ok((sheet, columns))
    }

    fn columns(&self, sheet: &Sheet) -> Result<Columns, SourceError> {
        let station = match &self.schema.station_column {
            Some(name) => sheet
                .column_index(name)
                .ok_or_else(|| SourceError::MissingColumn(name.clone()))?,
            None => {
                let idx = sheet
                    .find_column_containing("тп")
                    .ok_or_else(|| SourceError::MissingColumn("ТП".to_string()))?;
                warn!(column = %sheet.headers()[idx], "Station column detected by header match");
                idx
            }
        };

        let provider = match &self.schema.provider_column {
            Some(name) => sheet
                .column_index(name)
                .ok_or_else(|| SourceError::MissingColumn(name.clone()))?,
            None => {
                let idx = PROVIDER_HEADER_HINTS
                    .iter()
                    .find_map(|hint| sheet.find_column_containing(hint))
                    .ok_or_else(|| SourceError::MissingColumn("Провайдер".to_string()))?;
                warn!(column = %sheet.headers()[idx], "Provider column detected by header match");
                idx
            }
        };

        Ok(Columns {
            station,
            provider,
            region: sheet.column_index(&self.schema.region_column),
        })
    }

    /// Rows visible under `fiber_scope`
    fn scoped_rows<'a>(
        &self,
        sheet: &'a Sheet,
        columns: &Columns,
        fiber_scope: &str,
    ) -> Result<Vec<Row<'a>>, SourceError> {
        if fiber_scope.trim().eq_ignore_ascii_case("all") {
            return Ok(sheet.rows().collect());
        }
        let region_idx = columns
            .region
            .ok_or_else(|| SourceError::MissingColumn(self.schema.region_column.clone()))?;
        let scope = fiber_scope.trim().to_lowercase();
        Ok(sheet
            .rows()
            .filter(|row| row.raw(region_idx).to_lowercase() == scope)
            .collect())
    }

    fn print_fields(&self, row: &Row<'_>) -> FieldList {
        self.schema
            .fields
            .iter()
            .map(|field| (field.clone(), row.get(field).map(str::to_string)))
            .collect()
    }

    /// Providers with rows at the station, in first-appearance order.
    /// Returns the canonical station id alongside.
    pub async fn providers_at_station(
        &self,
        raw_station: &str,
        fiber_scope: &str,
    ) -> Result<(String, Vec<Group>), BotError> {
        let station = self.canonical_station(raw_station);
        let (sheet, columns) = self.sheet().await?;

        let providers = group_counts(
            self.scoped_rows(&sheet, &columns, fiber_scope)?
                .iter()
                .filter(|row| self.canonical_station(row.raw(columns.station)) == station)
                .map(|row| row.raw(columns.provider).to_string()),
        );

        debug!(station = %station, providers = providers.len(), "Station lookup finished");
        if providers.is_empty() {
            return Err(BotError::NotFound);
        }
        Ok((station, providers))
    }

    /// Every row of `provider` at the (canonical) `station`
    pub async fn station_contracts(
        &self,
        station: &str,
        provider: &str,
        fiber_scope: &str,
    ) -> Result<Vec<FieldList>, BotError> {
        let (sheet, columns) = self.sheet().await?;

        let rows: Vec<FieldList> = self
            .scoped_rows(&sheet, &columns, fiber_scope)?
            .iter()
            .filter(|row| self.canonical_station(row.raw(columns.station)) == station)
            .filter(|row| row.raw(columns.provider) == provider)
            .map(|row| self.print_fields(row))
            .collect();

        if rows.is_empty() {
            return Err(BotError::NotFound);
        }
        Ok(rows)
    }

    /// Stations served by providers whose name contains `query` (case-insensitive)
    pub async fn stations_for_provider(
        &self,
        query: &str,
        fiber_scope: &str,
    ) -> Result<Vec<Group>, BotError> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Err(BotError::InvalidInput(query.to_string()));
        }
        let (sheet, columns) = self.sheet().await?;

        let stations = group_counts(
            self.scoped_rows(&sheet, &columns, fiber_scope)?
                .iter()
                .filter(|row| row.raw(columns.provider).to_lowercase().contains(&needle))
                .map(|row| self.canonical_station(row.raw(columns.station))),
        );

        debug!(query = %query, stations = stations.len(), "Provider lookup finished");
        if stations.is_empty() {
            return Err(BotError::NotFound);
        }
        Ok(stations)
    }

    /// Rows of providers matching `query` at the (canonical) `station`
    pub async fn provider_contracts(
        &self,
        query: &str,
        station: &str,
        fiber_scope: &str,
    ) -> Result<Vec<FieldList>, BotError> {
        let needle = query.trim().to_lowercase();
        let (sheet, columns) = self.sheet().await?;

        let rows: Vec<FieldList> = self
            .scoped_rows(&sheet, &columns, fiber_scope)?
            .iter()
            .filter(|row| row.raw(columns.provider).to_lowercase().contains(&needle))
            .filter(|row| self.canonical_station(row.raw(columns.station)) == station)
            .map(|row| self.print_fields(row))
            .collect();

        if rows.is_empty() {
            return Err(BotError::NotFound);
        }
        Ok(rows)
    }
}

/// Count occurrences, keeping first-appearance order; blank names are skipped
fn group_counts(names: impl Iterator<Item = String>) -> Vec<Group> {
    let mut groups: Vec<Group> = Vec::new();
    for name in names.filter(|n| !n.trim().is_empty()) {
        match groups.iter_mut().find(|g| g.name == name) {
            Some(group) => group.count += 1,
            None => groups.push(Group { name, count: 1 }),
        }
    }
    groups
}
