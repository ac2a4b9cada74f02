//! Shared fixtures: an in-memory sheet source and a transport that records replies.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use meter_lookup_bot::access::{AccessResolver, ROSTER_SHEET};
use meter_lookup_bot::bot::{ChatTransport, Conversation, Keyboard};
use meter_lookup_bot::cache::SheetCache;
use meter_lookup_bot::config::{FiberSchema, RosterSchema};
use meter_lookup_bot::errors::SourceError;
use meter_lookup_bot::fiber::{FiberDirectory, FIBER_SHEET};
use meter_lookup_bot::lookup::RecordLookup;
use meter_lookup_bot::session::{InMemorySessionStore, SessionStore};
use meter_lookup_bot::sheet::{Sheet, SheetSource};

pub const ROSTER_URL: &str = "mem://roster";
pub const FIBER_URL: &str = "mem://fiber";
pub const METER_COLUMN: &str = "Номер счетчика";

pub fn region_url(region: &str) -> String {
    format!("mem://region/{region}")
}

/// Roster: 42 is a single-region user, 7 sees every region, 1 is an admin,
/// 5 is a single-region user without fiber access
pub const ROSTER_CSV: &str = "\
ID,Region,ФИО,ВОЛС
42,RegionX,Пётр Сидоров,RegionX
7,ALL,Анна,ALL
1,admin,Админ,ALL
5,RegionY,Ольга,
";

pub const REGION_X_CSV: &str = "\
Номер счетчика,owner,ТУ,Наименование договора,Улица,Дом,Вид счетчика
0099,Ivan,ТУ-1,Договор 1,Ленина,5,Меркурий
0042,Olga,ТУ-2,,Мира,,СЕ-101
";

pub const REGION_Y_CSV: &str = "\
Номер счетчика,ТУ,Улица
42,ТУ-Y,Садовая
555,ТУ-Y2,Полевая
";

pub const FIBER_CSV: &str = "\
РЭС,ТП,Провайдер,Номер договора,Дата договора,Адрес
RegionX,ТП-12,Ростелеком,Д-1,01.01.2024,Ленина 5
RegionX,тп 12,Ростелеком,Д-2,02.01.2024,Ленина 7
RegionX,ТП12,МТС,Д-3,03.01.2024,Мира 1
RegionY,ТП-40,Ростелеком,Д-4,04.01.2024,Садовая 2
";

/// Serves CSV bodies by URL and records every fetch
#[derive(Default)]
pub struct FakeSheetSource {
    bodies: Mutex<HashMap<String, String>>,
    fetched: Mutex<Vec<String>>,
}

impl FakeSheetSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, url: impl Into<String>, body: &str) -> Self {
        self.set(url, body);
        self
    }

    pub fn set(&self, url: impl Into<String>, body: &str) {
        self.bodies
            .lock()
            .unwrap()
            .insert(url.into(), body.to_string());
    }

    pub fn remove(&self, url: &str) {
        self.bodies.lock().unwrap().remove(url);
    }

    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }

    pub fn fetch_count(&self, url: &str) -> usize {
        self.fetched().iter().filter(|u| *u == url).count()
    }
}

#[async_trait]
impl SheetSource for FakeSheetSource {
    async fn fetch(&self, url: &str) -> Result<Sheet, SourceError> {
        self.fetched.lock().unwrap().push(url.to_string());
        let body = self.bodies.lock().unwrap().get(url).cloned();
        match body {
            Some(body) => Sheet::from_csv(&body).map_err(|e| SourceError::Parse {
                url: url.to_string(),
                message: e.to_string(),
            }),
            None => Err(SourceError::Status {
                url: url.to_string(),
                status: 404,
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    Text {
        chat_id: i64,
        text: String,
        keyboard: Option<Keyboard>,
    },
    Photo {
        chat_id: i64,
        source: String,
        caption: Option<String>,
    },
}

/// Records outgoing messages; chats listed in `unreachable` fail to deliver
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<Sent>>,
    unreachable: Mutex<Vec<i64>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_for(&self, chat_id: i64) {
        self.unreachable.lock().unwrap().push(chat_id);
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    /// Texts sent to `chat_id`, oldest first
    pub fn texts_to(&self, chat_id: i64) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Text { chat_id: c, text, .. } if c == chat_id => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn last_text(&self) -> String {
        self.sent()
            .into_iter()
            .rev()
            .find_map(|s| match s {
                Sent::Text { text, .. } => Some(text),
                _ => None,
            })
            .unwrap_or_default()
    }

    pub fn last_keyboard(&self) -> Option<Keyboard> {
        self.sent().into_iter().rev().find_map(|s| match s {
            Sent::Text { keyboard, .. } => keyboard,
            _ => None,
        })
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }
}

#[async_trait]
impl ChatTransport for RecordingTransport {
    async fn send_text(&self, chat_id: i64, text: &str, keyboard: Option<Keyboard>) -> Result<()> {
        if self.unreachable.lock().unwrap().contains(&chat_id) {
            return Err(anyhow!("chat {chat_id} is unreachable"));
        }
        self.sent.lock().unwrap().push(Sent::Text {
            chat_id,
            text: text.to_string(),
            keyboard,
        });
        Ok(())
    }

    async fn send_photo(&self, chat_id: i64, source: &str, caption: Option<&str>) -> Result<()> {
        if source.contains("missing") {
            return Err(anyhow!("no such file {source}"));
        }
        self.sent.lock().unwrap().push(Sent::Photo {
            chat_id,
            source: source.to_string(),
            caption: caption.map(str::to_string),
        });
        Ok(())
    }
}

/// A wired conversation over in-memory data
pub struct Harness {
    pub conversation: Conversation,
    pub source: Arc<FakeSheetSource>,
    pub sessions: Arc<InMemorySessionStore>,
}

pub struct HarnessBuilder {
    source: FakeSheetSource,
    regions: Vec<(String, String)>,
    fiber: bool,
    allow_list: Option<Vec<String>>,
    ttl: Duration,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        Self {
            source: FakeSheetSource::new().with(ROSTER_URL, ROSTER_CSV),
            regions: Vec::new(),
            fiber: false,
            allow_list: None,
            ttl: Duration::from_secs(600),
        }
    }

    pub fn region(mut self, name: &str, csv: &str) -> Self {
        self.source.set(region_url(name), csv);
        self.regions.push((name.to_string(), region_url(name)));
        self
    }

    pub fn fiber(mut self) -> Self {
        self.source.set(FIBER_URL, FIBER_CSV);
        self.fiber = true;
        self
    }

    pub fn allow_list(mut self, ids: &[&str]) -> Self {
        self.allow_list = Some(ids.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn build(self) -> Harness {
        self.build_with(|c| c)
    }

    pub fn build_with(self, configure: impl FnOnce(Conversation) -> Conversation) -> Harness {
        let source = Arc::new(self.source);
        let dyn_source: Arc<dyn SheetSource> = source.clone();

        let roster = Arc::new(SheetCache::new(
            "roster",
            vec![(ROSTER_SHEET.to_string(), ROSTER_URL.to_string())],
            dyn_source.clone(),
        ));
        let datasets = Arc::new(SheetCache::new("datasets", self.regions, dyn_source.clone()));

        let sessions = Arc::new(InMemorySessionStore::new(self.ttl));
        let store: Arc<dyn SessionStore> = sessions.clone();

        let access = Arc::new(AccessResolver::new(
            roster,
            RosterSchema::default(),
            self.allow_list,
        ));
        let lookup = Arc::new(RecordLookup::new(datasets, METER_COLUMN));

        let mut conversation = Conversation::new(store, access, lookup);
        if self.fiber {
            let cache = Arc::new(SheetCache::new(
                "fiber",
                vec![(FIBER_SHEET.to_string(), FIBER_URL.to_string())],
                dyn_source,
            ));
            let fiber = FiberDirectory::new(cache, FiberSchema::default());
            conversation = conversation.with_fiber(Arc::new(fiber));
        }

        Harness {
            conversation: configure(conversation),
            source,
            sessions,
        }
    }
}

impl Harness {
    /// Send `text` as `user_id`, whose private chat id equals the user id
    pub async fn say(&self, transport: &RecordingTransport, user_id: i64, text: &str) {
        self.conversation
            .handle_text(transport, &user_id.to_string(), user_id, text)
            .await
            .expect("turn should not fail");
    }

    pub async fn press(&self, transport: &RecordingTransport, user_id: i64, data: &str) {
        self.conversation
            .handle_callback(transport, &user_id.to_string(), user_id, data)
            .await
            .expect("callback should not fail");
    }

    pub fn region_fetches(&self) -> usize {
        self.source
            .fetched()
            .iter()
            .filter(|u| u.starts_with("mem://region/"))
            .count()
    }
}
