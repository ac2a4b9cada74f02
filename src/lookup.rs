//! # Record Lookup Module
//!
//! Finds a meter number in the region datasets and pulls the whitelisted
//! fields of a record for one display category.

use std::sync::Arc;

use tracing::{debug, info};

use crate::access::Scope;
use crate::cache::SheetCache;
use crate::dialogue::ResolvedRecord;
use crate::errors::{BotError, SourceError};
use crate::normalize::normalize_identifier;
use crate::sheet::Sheet;

/// Rendered in place of a missing or empty field
pub const NO_DATA: &str = "Нет данных";

const CONTRACT_FIELDS: &[&str] = &[
    "ТУ",
    "Номер ТУСТЕК",
    "Номер ТУ",
    "ЛС / ЛС СТЕК",
    "Наименование договора",
    "Вид потребителя",
    "Субабонент",
];

const ADDRESS_FIELDS: &[&str] = &["Сетевой участок", "Населенный пункт", "Улица", "Дом", "ТП"];

const DEVICE_FIELDS: &[&str] = &[
    "Номер счетчика",
    "Состояние ТУ",
    "Максимальная мощность",
    "Вид счетчика",
    "Фазность",
    "Госповерка счетчика",
    "Межповерочный интервал ПУ",
    "Окончание срок поверки",
    "Проверка схемы дата",
    "Последнее активное событие дата",
    "Первичный ток ТТ (А)",
    "Госповерка ТТ (А)",
    "Межповерочный интервал ТТ",
];

/// Fixed display groups of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Contract,
    Address,
    Device,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Contract, Category::Address, Category::Device];

    /// Button label, matched literally against incoming text
    pub fn label(self) -> &'static str {
        match self {
            Category::Contract => "Информация по договору",
            Category::Address => "Информация по адресу подключения",
            Category::Device => "Информация по прибору учёта",
        }
    }

    /// Inline-keyboard callback payload
    pub fn callback_data(self) -> &'static str {
        match self {
            Category::Contract => "category:contract",
            Category::Address => "category:address",
            Category::Device => "category:device",
        }
    }

    pub fn fields(self) -> &'static [&'static str] {
        match self {
            Category::Contract => CONTRACT_FIELDS,
            Category::Address => ADDRESS_FIELDS,
            Category::Device => DEVICE_FIELDS,
        }
    }

    pub fn from_label(text: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.label() == text)
    }

    pub fn from_callback_data(data: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.callback_data() == data)
    }
}

/// First stored value in `column` whose normalized form equals `normalized_query`
pub fn find_in_sheet(
    sheet: &Sheet,
    column: &str,
    normalized_query: &str,
) -> Result<Option<String>, SourceError> {
    let idx = sheet
        .column_index(column)
        .ok_or_else(|| SourceError::MissingColumn(column.to_string()))?;

    Ok(sheet
        .rows()
        .map(|row| row.raw(idx))
        .find(|value| !value.is_empty() && normalize_identifier(value) == normalized_query)
        .map(str::to_string))
}

/// Meter lookups over the region datasets
pub struct RecordLookup {
    datasets: Arc<SheetCache>,
    meter_column: String,
}

impl RecordLookup {
    pub fn new(datasets: Arc<SheetCache>, meter_column: impl Into<String>) -> Self {
        Self {
            datasets,
            meter_column: meter_column.into(),
        }
    }

    pub fn meter_column(&self) -> &str {
        &self.meter_column
    }

    /// Find `raw_query` within the user's scope.
    ///
    /// A single-region scope searches only that region; `All`/`Admin` walk the
    /// regions in configured order and stop at the first hit.
    pub async fn find(&self, raw_query: &str, scope: &Scope) -> Result<ResolvedRecord, BotError> {
        let normalized = normalize_identifier(raw_query.trim());
        debug!(query = %raw_query, normalized = %normalized, scope = ?scope, "Looking up meter");

        let regions: Vec<String> = match scope.region() {
            Some(region) => vec![region.to_string()],
            None => self.datasets.names().map(str::to_string).collect(),
        };

        for region in regions {
            let Some(sheet) = self.datasets.get(&region).await? else {
                debug!(region = %region, "No dataset registered for region");
                continue;
            };
            if let Some(key) = find_in_sheet(&sheet, &self.meter_column, &normalized)? {
                info!(key = %key, region = %region, "Meter found");
                return Ok(ResolvedRecord { key, region });
            }
        }

        Err(BotError::NotFound)
    }

    /// Whitelisted fields of `category` for a resolved record, in whitelist
    /// order; `None` values are missing or empty cells.
    pub async fn category_fields(
        &self,
        record: &ResolvedRecord,
        category: Category,
    ) -> Result<Vec<(&'static str, Option<String>)>, BotError> {
        let sheet = self
            .datasets
            .get(&record.region)
            .await?
            .ok_or(BotError::NotFound)?;
        let idx = sheet
            .column_index(&self.meter_column)
            .ok_or_else(|| SourceError::MissingColumn(self.meter_column.clone()))?;

        let row = sheet
            .rows()
            .find(|row| row.raw(idx) == record.key)
            .ok_or(BotError::NotFound)?;

        Ok(category
            .fields()
            .iter()
            .map(|field| (*field, row.get(field).map(str::to_string)))
            .collect())
    }
}
