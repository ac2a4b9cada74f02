//! Dialogue Manager module for handling dialogue state transitions
//!
//! Every incoming text is resolved against the roster first; unauthorized
//! users get a refusal and nothing else runs. Then the text is matched in
//! priority order: `/start`, Back, category labels, menu commands, and
//! finally whatever the current mode expects.

use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::access::{Access, AccessResolver};
use crate::config::HelpImage;
use crate::dialogue::Mode;
use crate::errors::BotError;
use crate::fiber::FiberDirectory;
use crate::localization::{t, t_args};
use crate::lookup::{Category, RecordLookup};
use crate::normalize::{is_numeric_identifier, normalize_identifier};
use crate::request_log::RequestLog;
use crate::session::{Session, SessionStore};

use super::transport::{ChatTransport, Keyboard};
use super::ui_builder::{
    back_keyboard, category_keyboard, fiber_menu_keyboard, format_fiber_rows, format_fields,
    group_label, list_keyboard, main_menu_keyboard, pick_group, split_message, LABEL_BACK,
    LABEL_BROADCAST, LABEL_FIBER, LABEL_FIBER_BY_PROVIDER, LABEL_FIBER_BY_STATION, LABEL_HELP,
    LABEL_SEARCH, MAX_MESSAGE_CHARS,
};

/// Everything one turn needs to talk back
struct Turn<'a> {
    transport: &'a dyn ChatTransport,
    chat_id: i64,
    access: &'a Access,
}

impl Turn<'_> {
    async fn say(&self, text: &str, keyboard: Option<Keyboard>) -> Result<()> {
        self.transport.send_text(self.chat_id, text, keyboard).await
    }

    /// Send text that may exceed the Telegram limit; the keyboard goes on the last chunk
    async fn say_long(&self, text: &str, keyboard: Option<Keyboard>) -> Result<()> {
        let chunks = split_message(text, MAX_MESSAGE_CHARS);
        let last = chunks.len().saturating_sub(1);
        let mut keyboard = keyboard;
        for (i, chunk) in chunks.iter().enumerate() {
            let markup = if i == last { keyboard.take() } else { None };
            self.say(chunk, markup).await?;
        }
        Ok(())
    }
}

/// User-facing text for an error
fn error_text(err: &BotError) -> String {
    match err {
        BotError::Unauthorized => t("error-unauthorized"),
        BotError::SourceUnavailable(source) => {
            t_args("error-source-unavailable", &[("error", &source.to_string())])
        }
        BotError::NotFound => t("record-missing"),
        BotError::InvalidInput(_) => t("idle-hint"),
    }
}

/// The per-user conversation state machine
pub struct Conversation {
    sessions: Arc<dyn SessionStore>,
    access: Arc<AccessResolver>,
    lookup: Arc<RecordLookup>,
    fiber: Option<Arc<FiberDirectory>>,
    request_log: Option<Arc<RequestLog>>,
    help_images: Vec<HelpImage>,
    inline_categories: bool,
}

impl Conversation {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        access: Arc<AccessResolver>,
        lookup: Arc<RecordLookup>,
    ) -> Self {
        Self {
            sessions,
            access,
            lookup,
            fiber: None,
            request_log: None,
            help_images: Vec::new(),
            inline_categories: false,
        }
    }

    pub fn with_fiber(mut self, fiber: Arc<FiberDirectory>) -> Self {
        self.fiber = Some(fiber);
        self
    }

    pub fn with_request_log(mut self, request_log: Arc<RequestLog>) -> Self {
        self.request_log = Some(request_log);
        self
    }

    pub fn with_help_images(mut self, help_images: Vec<HelpImage>) -> Self {
        self.help_images = help_images;
        self
    }

    pub fn with_inline_categories(mut self, inline: bool) -> Self {
        self.inline_categories = inline;
        self
    }

    /// Handle one incoming text message
    pub async fn handle_text(
        &self,
        transport: &dyn ChatTransport,
        user_id: &str,
        chat_id: i64,
        text: &str,
    ) -> Result<()> {
        let Some(access) = self.authorize(transport, user_id, chat_id).await? else {
            return Ok(());
        };

        let mut session = self.sessions.get(user_id).await.unwrap_or_default();
        let before = session.mode.name();
        let turn = Turn {
            transport,
            chat_id,
            access: &access,
        };

        let result = self.step(&turn, &mut session, text.trim()).await;
        debug!(user_id = %user_id, from = before, to = session.mode.name(), "Dialogue transition");
        self.sessions.put(user_id, session).await;
        result
    }

    /// Handle inline-keyboard callback data (category selection)
    pub async fn handle_callback(
        &self,
        transport: &dyn ChatTransport,
        user_id: &str,
        chat_id: i64,
        data: &str,
    ) -> Result<()> {
        let Some(access) = self.authorize(transport, user_id, chat_id).await? else {
            return Ok(());
        };

        let Some(category) = Category::from_callback_data(data) else {
            debug!(user_id = %user_id, data = %data, "Ignoring unknown callback data");
            return Ok(());
        };

        let session = self.sessions.get(user_id).await.unwrap_or_default();
        let turn = Turn {
            transport,
            chat_id,
            access: &access,
        };
        let result = self.show_category(&turn, &session, category).await;
        self.sessions.put(user_id, session).await;
        result
    }

    /// Resolve the user; on refusal or roster failure the reply is already sent
    async fn authorize(
        &self,
        transport: &dyn ChatTransport,
        user_id: &str,
        chat_id: i64,
    ) -> Result<Option<Access>> {
        match self.access.resolve(user_id).await {
            Ok(access) => Ok(Some(access)),
            Err(BotError::Unauthorized) => {
                info!(user_id = %user_id, "Refusing unauthorized user");
                transport
                    .send_text(chat_id, &t("error-unauthorized"), Some(Keyboard::Remove))
                    .await?;
                Ok(None)
            }
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Failed to resolve user access");
                transport.send_text(chat_id, &error_text(&e), None).await?;
                Ok(None)
            }
        }
    }

    /// Fiber directory and sub-scope, when this user may search fiber lines
    fn fiber_for<'a>(&'a self, access: &'a Access) -> Option<(&'a FiberDirectory, &'a str)> {
        Some((self.fiber.as_deref()?, access.fiber_scope.as_deref()?))
    }

    fn main_menu(&self, access: &Access) -> Keyboard {
        main_menu_keyboard(access, self.fiber_for(access).is_some())
    }

    async fn step(&self, turn: &Turn<'_>, session: &mut Session, text: &str) -> Result<()> {
        if text == "/start" {
            session.reset();
            let greeting = t_args("welcome", &[("name", &turn.access.display_name)]);
            return turn.say(&greeting, Some(self.main_menu(turn.access))).await;
        }

        if text == LABEL_BACK {
            session.reset();
            return turn
                .say(&t("main-menu"), Some(self.main_menu(turn.access)))
                .await;
        }

        if let Some(category) = Category::from_label(text) {
            return self.show_category(turn, session, category).await;
        }

        match text {
            LABEL_SEARCH => {
                session.mode = Mode::AwaitingNumber;
                return turn.say(&t("meter-prompt"), Some(back_keyboard())).await;
            }
            LABEL_HELP => return self.enter_help(turn, session).await,
            LABEL_BROADCAST => {
                if !turn.access.scope.can_broadcast() {
                    return turn.say(&t("broadcast-forbidden"), None).await;
                }
                session.mode = Mode::Broadcasting;
                return turn.say(&t("broadcast-prompt"), Some(back_keyboard())).await;
            }
            LABEL_FIBER => return self.enter_fiber(turn, session).await,
            _ => {}
        }

        if session.mode.is_fiber() && self.fiber_for(turn.access).is_some() {
            match text {
                LABEL_FIBER_BY_STATION => {
                    session.mode = Mode::AwaitingStationId;
                    return turn.say(&t("fiber-station-prompt"), Some(back_keyboard())).await;
                }
                LABEL_FIBER_BY_PROVIDER => {
                    session.mode = Mode::AwaitingProviderName;
                    return turn.say(&t("fiber-provider-prompt"), Some(back_keyboard())).await;
                }
                _ => {}
            }
        }

        match session.mode.clone() {
            Mode::Broadcasting => self.broadcast(turn, session, text).await,
            Mode::AwaitingNumber => self.search_meter(turn, session, text).await,
            Mode::Idle | Mode::ShowingMenu { .. } if is_numeric_identifier(text) => {
                self.search_meter(turn, session, text).await
            }
            Mode::Idle => turn.say(&t("idle-hint"), Some(self.main_menu(turn.access))).await,
            Mode::ShowingMenu { .. } => {
                turn.say(&t("menu-hint"), Some(category_keyboard(self.inline_categories)))
                    .await
            }
            Mode::BrowsingHelp => self.send_help_image(turn, text).await,
            Mode::FiberMenu => turn.say(&t("fiber-menu-hint"), Some(fiber_menu_keyboard())).await,
            Mode::AwaitingStationId => self.find_station(turn, session, text).await,
            Mode::ShowingStationContracts { station, providers } => {
                self.show_station_contracts(turn, &station, &providers, text)
                    .await
            }
            Mode::AwaitingProviderName => self.find_provider(turn, session, text).await,
            Mode::ShowingProviderStations {
                provider_query,
                stations,
            } => {
                self.show_provider_contracts(turn, &provider_query, &stations, text)
                    .await
            }
        }
    }

    async fn show_category(
        &self,
        turn: &Turn<'_>,
        session: &Session,
        category: Category,
    ) -> Result<()> {
        let Some(record) = session.mode.record() else {
            return turn.say(&t("category-needs-record"), None).await;
        };

        let keyboard = self
            .inline_categories
            .then(|| category_keyboard(true));
        match self.lookup.category_fields(record, category).await {
            Ok(fields) => turn.say_long(&format_fields(&fields), keyboard).await,
            Err(e) => {
                warn!(user_id = %turn.access.user_id, error = %e, "Failed to load record category");
                turn.say(&error_text(&e), None).await
            }
        }
    }

    async fn search_meter(&self, turn: &Turn<'_>, session: &mut Session, text: &str) -> Result<()> {
        if !is_numeric_identifier(text) {
            session.mode = Mode::AwaitingNumber;
            return turn.say(&t("meter-invalid"), Some(back_keyboard())).await;
        }

        let normalized = normalize_identifier(text);
        turn.say(
            &t_args("meter-searching", &[("input", text), ("normalized", &normalized)]),
            None,
        )
        .await?;

        match self.lookup.find(text, &turn.access.scope).await {
            Ok(record) => {
                let mut log_failed = false;
                if let Some(log) = &self.request_log {
                    if let Err(e) = log.record(&turn.access.user_id, &record.key, &record.region) {
                        warn!(error = %e, "Failed to write request log");
                        log_failed = true;
                    }
                }

                let found = t_args(
                    "meter-found",
                    &[
                        ("name", &turn.access.display_name),
                        ("number", &record.key),
                        ("region", &record.region),
                    ],
                );
                session.show_record(record);
                turn.say(&found, None).await?;
                if log_failed {
                    turn.say(&t("request-log-failed"), None).await?;
                }
                turn.say(
                    &t("meter-choose-category"),
                    Some(category_keyboard(self.inline_categories)),
                )
                .await
            }
            Err(e) => {
                // A failed retry from the category menu keeps the record already shown
                if session.mode.record().is_none() {
                    session.mode = Mode::AwaitingNumber;
                }
                let reply = match &e {
                    BotError::NotFound => t("meter-not-found"),
                    other => {
                        warn!(
                            user_id = %turn.access.user_id,
                            error = %other,
                            "Meter lookup failed"
                        );
                        error_text(other)
                    }
                };
                let keyboard = if session.mode.record().is_some() {
                    category_keyboard(self.inline_categories)
                } else {
                    back_keyboard()
                };
                turn.say(&reply, Some(keyboard)).await
            }
        }
    }

    async fn broadcast(&self, turn: &Turn<'_>, session: &mut Session, text: &str) -> Result<()> {
        session.reset();
        let roster = match self.access.roster().await {
            Ok(roster) => roster,
            Err(e) => {
                warn!(error = %e, "Broadcast aborted, roster unavailable");
                let err = BotError::from(e);
                return turn.say(&error_text(&err), Some(self.main_menu(turn.access))).await;
            }
        };

        let message = t_args("broadcast-message", &[("text", text)]);
        let (mut delivered, mut failed) = (0usize, 0usize);
        for user_id in roster.user_ids() {
            let Ok(chat_id) = user_id.parse::<i64>() else {
                warn!(user_id = %user_id, "Skipping non-numeric roster id");
                failed += 1;
                continue;
            };
            match turn.transport.send_text(chat_id, &message, None).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!(user_id = %user_id, error = %e, "Broadcast delivery failed");
                    failed += 1;
                }
            }
        }

        info!(sender = %turn.access.user_id, delivered, failed, "Broadcast finished");
        let summary = t_args(
            "broadcast-done",
            &[
                ("delivered", &delivered.to_string()),
                ("failed", &failed.to_string()),
            ],
        );
        turn.say(&summary, Some(self.main_menu(turn.access))).await
    }

    fn help_keyboard(&self) -> Keyboard {
        list_keyboard(self.help_images.iter().map(|image| image.label.clone()))
    }

    async fn enter_help(&self, turn: &Turn<'_>, session: &mut Session) -> Result<()> {
        session.mode = Mode::BrowsingHelp;
        if self.help_images.is_empty() {
            return turn.say(&t("help-empty"), Some(back_keyboard())).await;
        }
        turn.say(&t("help-prompt"), Some(self.help_keyboard())).await
    }

    async fn send_help_image(&self, turn: &Turn<'_>, text: &str) -> Result<()> {
        let Some(image) = self.help_images.iter().find(|image| image.label == text) else {
            return turn.say(&t("help-hint"), Some(self.help_keyboard())).await;
        };

        if let Err(e) = turn
            .transport
            .send_photo(turn.chat_id, &image.source, Some(&image.label))
            .await
        {
            warn!(source = %image.source, error = %e, "Failed to send help image");
            return turn.say(&t("help-image-failed"), None).await;
        }
        Ok(())
    }

    async fn enter_fiber(&self, turn: &Turn<'_>, session: &mut Session) -> Result<()> {
        if self.fiber_for(turn.access).is_none() {
            return turn.say(&t("fiber-unavailable"), None).await;
        }
        session.mode = Mode::FiberMenu;
        turn.say(&t("fiber-menu"), Some(fiber_menu_keyboard())).await
    }

    async fn find_station(&self, turn: &Turn<'_>, session: &mut Session, text: &str) -> Result<()> {
        let Some((fiber, scope)) = self.fiber_for(turn.access) else {
            session.reset();
            return turn.say(&t("fiber-unavailable"), Some(self.main_menu(turn.access))).await;
        };

        match fiber.providers_at_station(text, scope).await {
            Ok((station, groups)) => {
                let reply = t_args(
                    "fiber-providers-found",
                    &[("station", &station), ("count", &groups.len().to_string())],
                );
                let keyboard = list_keyboard(groups.iter().map(group_label));
                session.mode = Mode::ShowingStationContracts {
                    station,
                    providers: groups.into_iter().map(|g| g.name).collect(),
                };
                turn.say(&reply, Some(keyboard)).await
            }
            Err(BotError::NotFound) => {
                let station = fiber.canonical_station(text);
                turn.say(
                    &t_args("fiber-station-not-found", &[("station", &station)]),
                    Some(back_keyboard()),
                )
                .await
            }
            Err(e) => {
                warn!(error = %e, "Station lookup failed");
                turn.say(&error_text(&e), Some(back_keyboard())).await
            }
        }
    }

    async fn show_station_contracts(
        &self,
        turn: &Turn<'_>,
        station: &str,
        providers: &[String],
        text: &str,
    ) -> Result<()> {
        let Some((fiber, scope)) = self.fiber_for(turn.access) else {
            return turn.say(&t("fiber-unavailable"), None).await;
        };
        let Some(provider) = pick_group(text, providers) else {
            return turn
                .say(&t("fiber-pick-hint"), Some(list_keyboard(providers.iter().cloned())))
                .await;
        };

        match fiber.station_contracts(station, provider, scope).await {
            Ok(rows) => turn.say_long(&format_fiber_rows(&rows), None).await,
            Err(e) => turn.say(&error_text(&e), None).await,
        }
    }

    async fn find_provider(
        &self,
        turn: &Turn<'_>,
        session: &mut Session,
        text: &str,
    ) -> Result<()> {
        let Some((fiber, scope)) = self.fiber_for(turn.access) else {
            session.reset();
            return turn.say(&t("fiber-unavailable"), Some(self.main_menu(turn.access))).await;
        };

        match fiber.stations_for_provider(text, scope).await {
            Ok(groups) => {
                let reply = t_args("fiber-stations-found", &[("count", &groups.len().to_string())]);
                let keyboard = list_keyboard(groups.iter().map(group_label));
                session.mode = Mode::ShowingProviderStations {
                    provider_query: text.to_string(),
                    stations: groups.into_iter().map(|g| g.name).collect(),
                };
                turn.say(&reply, Some(keyboard)).await
            }
            Err(BotError::NotFound) | Err(BotError::InvalidInput(_)) => {
                turn.say(
                    &t_args("fiber-provider-not-found", &[("query", text)]),
                    Some(back_keyboard()),
                )
                .await
            }
            Err(e) => {
                warn!(error = %e, "Provider lookup failed");
                turn.say(&error_text(&e), Some(back_keyboard())).await
            }
        }
    }

    async fn show_provider_contracts(
        &self,
        turn: &Turn<'_>,
        provider_query: &str,
        stations: &[String],
        text: &str,
    ) -> Result<()> {
        let Some((fiber, scope)) = self.fiber_for(turn.access) else {
            return turn.say(&t("fiber-unavailable"), None).await;
        };
        let Some(station) = pick_group(text, stations) else {
            return turn
                .say(&t("fiber-pick-hint"), Some(list_keyboard(stations.iter().cloned())))
                .await;
        };

        match fiber.provider_contracts(provider_query, station, scope).await {
            Ok(rows) => turn.say_long(&format_fiber_rows(&rows), None).await,
            Err(e) => turn.say(&error_text(&e), None).await,
        }
    }
}
