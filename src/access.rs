//! # Access Module
//!
//! Resolves a chat user to a permission scope and display name using the
//! roster sheet. The roster is cached like the region datasets and refreshed
//! on its own timer; it is parsed once per fetched snapshot.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use tracing::{debug, warn};

use crate::cache::SheetCache;
use crate::config::RosterSchema;
use crate::errors::{BotError, SourceError};
use crate::sheet::Sheet;

/// Cache entry name of the roster sheet
pub const ROSTER_SHEET: &str = "roster";

/// Header names tried, in order, for the display-name column
pub const NAME_COLUMN_CANDIDATES: &[&str] = &["ФИО", "Имя", "Name", "Пользователь", "Сотрудник"];

/// What a user may search
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// One region dataset
    Region(String),
    /// Every configured region dataset
    All,
    /// Every region dataset, plus broadcasting
    Admin,
}

impl Scope {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.eq_ignore_ascii_case("all") {
            Scope::All
        } else if raw.eq_ignore_ascii_case("admin") {
            Scope::Admin
        } else {
            Scope::Region(raw.to_string())
        }
    }

    /// Single region to search, `None` when every region is in scope
    pub fn region(&self) -> Option<&str> {
        match self {
            Scope::Region(region) => Some(region),
            Scope::All | Scope::Admin => None,
        }
    }

    pub fn can_broadcast(&self) -> bool {
        matches!(self, Scope::Admin)
    }

    /// Fiber sub-scope implied by the main scope
    fn as_fiber_scope(&self) -> String {
        match self {
            Scope::Region(region) => region.clone(),
            Scope::All | Scope::Admin => "ALL".to_string(),
        }
    }
}

/// A roster entry as the conversation sees it
#[derive(Debug, Clone, PartialEq)]
pub struct Access {
    pub user_id: String,
    pub scope: Scope,
    pub display_name: String,
    /// Sub-scope for the fiber-line lookup; `ALL` means unrestricted,
    /// `None` means no fiber access
    pub fiber_scope: Option<String>,
}

/// Parsed roster, keyed by user id, in sheet order
#[derive(Debug, Clone, Default)]
pub struct Roster {
    entries: HashMap<String, Access>,
    order: Vec<String>,
}

impl Roster {
    /// Build from the roster sheet. Explicit schema columns win; header
    /// heuristics are the logged fallback.
    ///
    /// With a fiber column, an empty cell means no fiber access. Without one,
    /// the fiber sub-scope follows the main scope.
    pub fn from_sheet(sheet: &Sheet, schema: &RosterSchema) -> Result<Self, SourceError> {
        let id_idx = sheet
            .column_index(&schema.id_column)
            .ok_or_else(|| SourceError::MissingColumn(schema.id_column.clone()))?;
        let scope_idx = sheet
            .column_index(&schema.scope_column)
            .ok_or_else(|| SourceError::MissingColumn(schema.scope_column.clone()))?;
        let name_idx = name_column(sheet, schema)?;
        let fiber_idx = fiber_column(sheet, schema)?;

        let mut roster = Roster::default();
        for row in sheet.rows() {
            let Some(user_id) = row.at(id_idx) else {
                continue;
            };
            let Some(scope) = row.at(scope_idx) else {
                debug!(user_id = %user_id, "Roster row without scope skipped");
                continue;
            };

            let scope = Scope::parse(scope);
            let fiber_scope = match fiber_idx {
                Some(i) => row.at(i).map(str::to_string),
                None => Some(scope.as_fiber_scope()),
            };
            let access = Access {
                user_id: user_id.to_string(),
                scope,
                display_name: name_idx
                    .and_then(|i| row.at(i))
                    .unwrap_or(user_id)
                    .to_string(),
                fiber_scope,
            };

            if roster.entries.insert(user_id.to_string(), access).is_none() {
                roster.order.push(user_id.to_string());
            }
        }

        Ok(roster)
    }

    pub fn get(&self, user_id: &str) -> Option<&Access> {
        self.entries.get(user_id)
    }

    /// User ids in sheet order
    pub fn user_ids(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

fn name_column(sheet: &Sheet, schema: &RosterSchema) -> Result<Option<usize>, SourceError> {
    if let Some(name) = &schema.name_column {
        return sheet
            .column_index(name)
            .map(Some)
            .ok_or_else(|| SourceError::MissingColumn(name.clone()));
    }
    if let Some(idx) = NAME_COLUMN_CANDIDATES
        .iter()
        .find_map(|candidate| sheet.column_index(candidate))
    {
        return Ok(Some(idx));
    }
    if sheet.headers().len() >= 3 {
        warn!(
            column = %sheet.headers()[2],
            "No known display-name header in roster, using the third column"
        );
        return Ok(Some(2));
    }
    Ok(None)
}

fn fiber_column(sheet: &Sheet, schema: &RosterSchema) -> Result<Option<usize>, SourceError> {
    if let Some(name) = &schema.fiber_column {
        return sheet
            .column_index(name)
            .map(Some)
            .ok_or_else(|| SourceError::MissingColumn(name.clone()));
    }
    let found = sheet.find_column_containing("волс");
    if let Some(idx) = found {
        warn!(column = %sheet.headers()[idx], "Fiber scope column detected by header match");
    }
    Ok(found)
}

/// Roster parsed from one cached sheet
struct Parsed {
    sheet: Arc<Sheet>,
    roster: Arc<Roster>,
}

/// Maps user ids to `Access`, or refuses them
pub struct AccessResolver {
    roster: Arc<SheetCache>,
    schema: RosterSchema,
    allow_list: Option<Vec<String>>,
    parsed: ArcSwapOption<Parsed>,
}

impl AccessResolver {
    /// `roster` must hold the roster sheet under [`ROSTER_SHEET`]
    pub fn new(
        roster: Arc<SheetCache>,
        schema: RosterSchema,
        allow_list: Option<Vec<String>>,
    ) -> Self {
        Self {
            roster,
            schema,
            allow_list,
            parsed: ArcSwapOption::empty(),
        }
    }

    /// Current roster, fetched on first use and re-parsed only when the
    /// cached sheet changes
    pub async fn roster(&self) -> Result<Arc<Roster>, SourceError> {
        let sheet = self
            .roster
            .get(ROSTER_SHEET)
            .await?
            .ok_or_else(|| SourceError::Fetch {
                url: ROSTER_SHEET.to_string(),
                message: "roster source is not configured".to_string(),
            })?;

        if let Some(parsed) = self.parsed.load_full() {
            if Arc::ptr_eq(&parsed.sheet, &sheet) {
                return Ok(Arc::clone(&parsed.roster));
            }
        }

        let roster = Arc::new(Roster::from_sheet(&sheet, &self.schema)?);
        debug!(users = roster.len(), "Roster parsed");
        self.parsed.store(Some(Arc::new(Parsed {
            sheet,
            roster: Arc::clone(&roster),
        })));
        Ok(roster)
    }

    /// `BotError::Unauthorized` for users outside the allow-list or the roster
    pub async fn resolve(&self, user_id: &str) -> Result<Access, BotError> {
        if let Some(allowed) = &self.allow_list {
            if !allowed.iter().any(|id| id == user_id) {
                debug!(user_id = %user_id, "User not on allow-list");
                return Err(BotError::Unauthorized);
            }
        }

        let roster = self.roster().await?;
        roster.get(user_id).cloned().ok_or(BotError::Unauthorized)
    }
}
