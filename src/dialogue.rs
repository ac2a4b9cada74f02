//! Conversation mode for the meter lookup dialogue.

use serde::{Deserialize, Serialize};

/// A meter record resolved by a successful lookup
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedRecord {
    /// Meter number exactly as stored in the dataset (not the user's spelling)
    pub key: String,
    /// Region whose dataset holds the row
    pub region: String,
}

/// What the user is currently doing
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum Mode {
    #[default]
    Idle,
    AwaitingNumber,
    /// Category menu for a resolved record; the only way to hold a record
    ShowingMenu { record: ResolvedRecord },
    BrowsingHelp,
    Broadcasting,
    FiberMenu,
    AwaitingStationId,
    /// Providers found at a station, in first-appearance order
    ShowingStationContracts {
        station: String,
        providers: Vec<String>,
    },
    AwaitingProviderName,
    /// Stations served by providers matching `provider_query`
    ShowingProviderStations {
        provider_query: String,
        stations: Vec<String>,
    },
}

impl Mode {
    /// Resolved record, present only while showing the category menu
    pub fn record(&self) -> Option<&ResolvedRecord> {
        match self {
            Mode::ShowingMenu { record } => Some(record),
            _ => None,
        }
    }

    /// Whether this is one of the fiber-line sub-menus
    pub fn is_fiber(&self) -> bool {
        matches!(
            self,
            Mode::FiberMenu
                | Mode::AwaitingStationId
                | Mode::ShowingStationContracts { .. }
                | Mode::AwaitingProviderName
                | Mode::ShowingProviderStations { .. }
        )
    }

    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            Mode::Idle => "idle",
            Mode::AwaitingNumber => "awaiting_number",
            Mode::ShowingMenu { .. } => "showing_menu",
            Mode::BrowsingHelp => "browsing_help",
            Mode::Broadcasting => "broadcasting",
            Mode::FiberMenu => "fiber_menu",
            Mode::AwaitingStationId => "awaiting_station_id",
            Mode::ShowingStationContracts { .. } => "showing_station_contracts",
            Mode::AwaitingProviderName => "awaiting_provider_name",
            Mode::ShowingProviderStations { .. } => "showing_provider_stations",
        }
    }
}
