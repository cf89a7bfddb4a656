use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, FixedOffset, Utc};
use tracing::{debug, info, warn};

use crate::config::AlertThresholds;
use crate::format;
use crate::platform::{InboundMessage, Messenger};
use crate::session::{fingerprint, ReplyCategory, SessionStore};
use crate::subscribers::SubscriberStore;
use crate::weather::{Coordinate, Location, WeatherProvider};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Now,
    Later,
    Tomorrow,
    Alerts,
    RequestLocation,
    Where,
    Subscribe,
    Unsubscribe,
}

const COMMANDS: &[(&str, Command)] = &[
    ("/start", Command::Start),
    ("/help", Command::Start),
    ("/ayuda", Command::Start),
    ("/ahora", Command::Now),
    ("/a", Command::Now),
    ("/mas-tarde", Command::Later),
    ("/mastarde", Command::Later),
    ("/mt", Command::Later),
    ("/mañana", Command::Tomorrow),
    ("/manana", Command::Tomorrow),
    ("/m", Command::Tomorrow),
    ("/alertas", Command::Alerts),
    ("/al", Command::Alerts),
    ("/ubicacion", Command::RequestLocation),
    ("/ubicación", Command::RequestLocation),
    ("/ub", Command::RequestLocation),
    ("/donde", Command::Where),
    ("/dónde", Command::Where),
    ("/subscribe", Command::Subscribe),
    ("/suscribir", Command::Subscribe),
    ("/unsubscribe", Command::Unsubscribe),
    ("/desuscribir", Command::Unsubscribe),
];

impl Command {
    /// Match a whole message against the command table. Case-insensitive;
    /// a `@botname` suffix (group chats) is ignored.
    pub fn parse(text: &str) -> Option<Self> {
        let token = text.trim().to_lowercase();
        let token = token.split('@').next().unwrap_or_default();
        COMMANDS
            .iter()
            .find(|(name, _)| *name == token)
            .map(|(_, cmd)| *cmd)
    }
}

/// What kind of message this is. Variants are listed in precedence order.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Location(Coordinate),
    Command(Command),
    Voice,
    FreeText(String),
    Empty,
}

pub fn classify(msg: &InboundMessage) -> Inbound {
    if let Some(coord) = msg.location {
        return Inbound::Location(coord);
    }
    let text = msg.text.as_deref().map(str::trim).unwrap_or_default();
    if let Some(cmd) = Command::parse(text) {
        return Inbound::Command(cmd);
    }
    if msg.voice && text.is_empty() {
        return Inbound::Voice;
    }
    if !text.is_empty() {
        return Inbound::FreeText(text.to_string());
    }
    Inbound::Empty
}

#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Text(String),
    /// Text plus a keyboard asking the user to share their location
    LocationRequest(String),
}

/// A reply on its way out, with the fingerprint to record once delivered
#[derive(Debug, Clone, PartialEq)]
pub struct Outgoing {
    pub reply: Reply,
    remember: Option<(ReplyCategory, String)>,
}

impl From<Reply> for Outgoing {
    fn from(reply: Reply) -> Self {
        Self {
            reply,
            remember: None,
        }
    }
}

type Clock = Box<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Turns one inbound message into at most one reply and sends it.
pub struct CommandRouter {
    weather: Arc<dyn WeatherProvider>,
    messenger: Arc<dyn Messenger>,
    sessions: Arc<dyn SessionStore>,
    subscribers: Arc<dyn SubscriberStore>,
    default_city: String,
    timezone: FixedOffset,
    thresholds: AlertThresholds,
    clock: Clock,
}

impl CommandRouter {
    pub fn new(
        weather: Arc<dyn WeatherProvider>,
        messenger: Arc<dyn Messenger>,
        sessions: Arc<dyn SessionStore>,
        subscribers: Arc<dyn SubscriberStore>,
        default_city: &str,
        timezone: FixedOffset,
        thresholds: AlertThresholds,
    ) -> Self {
        Self {
            weather,
            messenger,
            sessions,
            subscribers,
            default_city: default_city.to_string(),
            timezone,
            thresholds,
            clock: Box::new(Utc::now),
        }
    }

    /// Replace the wall clock (tests)
    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> DateTime<Utc> + Send + Sync + 'static,
    {
        self.clock = Box::new(clock);
        self
    }

    fn now(&self) -> DateTime<FixedOffset> {
        (self.clock)().with_timezone(&self.timezone)
    }

    /// Route and deliver. Weather failures have already been turned into the
    /// fallback reply by the time this returns; send failures are logged and
    /// dropped. Only store failures come back as errors. A reply counts for
    /// deduplication only after it was sent.
    pub async fn handle(&self, msg: &InboundMessage) -> Result<()> {
        let chat_id = match msg.chat_id {
            Some(id) => id,
            None => return Ok(()),
        };

        let inbound = classify(msg);
        info!("Update {} from chat {}: {:?}", msg.update_id, chat_id, inbound);

        let Outgoing { reply, remember } = match self.route(chat_id, inbound).await? {
            Some(out) => out,
            None => return Ok(()),
        };

        let sent = match &reply {
            Reply::Text(text) => self.messenger.send_text(chat_id, text).await,
            Reply::LocationRequest(text) => self.messenger.request_location(chat_id, text).await,
        };
        match sent {
            Ok(()) => {
                if let Some((category, fp)) = remember {
                    self.sessions.set_last_reply(chat_id, category, fp).await;
                }
            }
            Err(e) => warn!("Dropping reply to chat {}: {:#}", chat_id, e),
        }
        Ok(())
    }

    pub async fn route(&self, chat_id: i64, inbound: Inbound) -> Result<Option<Outgoing>> {
        let out: Option<Outgoing> = match inbound {
            Inbound::Location(coord) => Some(self.on_location(chat_id, coord).await.into()),
            Inbound::Command(cmd) => self.on_command(chat_id, cmd).await?,
            Inbound::Voice => Some(self.on_voice().await.into()),
            Inbound::FreeText(_) => self.on_free_text(chat_id).await.map(Outgoing::from),
            Inbound::Empty => None,
        };
        Ok(out)
    }

    async fn location_for(&self, chat_id: i64) -> Location {
        match self.sessions.location(chat_id).await {
            Some(coord) => Location::Point(coord),
            None => Location::Named(self.default_city.clone()),
        }
    }

    async fn on_location(&self, chat_id: i64, coord: Coordinate) -> Reply {
        self.sessions.set_location(chat_id, coord).await;
        match self.weather.current(&Location::Point(coord)).await {
            Ok(current) => Reply::Text(format::location_weather(&current, coord)),
            Err(e) => self.fallback(&e),
        }
    }

    async fn on_command(&self, chat_id: i64, cmd: Command) -> Result<Option<Outgoing>> {
        let reply = match cmd {
            Command::Start => Reply::Text(format::help_text()),
            Command::Now => self.now_reply(chat_id).await,
            Command::Later => return Ok(self.later_reply(chat_id).await),
            Command::Tomorrow => return Ok(self.tomorrow_reply(chat_id).await),
            Command::Alerts => self.alerts_reply(chat_id).await,
            Command::RequestLocation => Reply::LocationRequest(format::LOCATION_PROMPT.to_string()),
            Command::Where => {
                let text = match self.sessions.location(chat_id).await {
                    Some(coord) => format::saved_location(coord),
                    None => format::NO_LOCATION.to_string(),
                };
                Reply::Text(text)
            }
            Command::Subscribe => {
                if self.subscribers.add(chat_id).await? {
                    info!("Chat {} subscribed", chat_id);
                }
                Reply::Text(format::SUBSCRIBED.to_string())
            }
            Command::Unsubscribe => {
                if self.subscribers.remove(chat_id).await? {
                    info!("Chat {} unsubscribed", chat_id);
                }
                Reply::Text(format::UNSUBSCRIBED.to_string())
            }
        };
        Ok(Some(reply.into()))
    }

    async fn now_reply(&self, chat_id: i64) -> Reply {
        let location = self.location_for(chat_id).await;
        match self.weather.current(&location).await {
            Ok(current) => Reply::Text(format::current_summary(&current, &self.default_city)),
            Err(e) => self.fallback(&e),
        }
    }

    async fn later_reply(&self, chat_id: i64) -> Option<Outgoing> {
        let location = self.location_for(chat_id).await;
        let points = match self.weather.forecast(&location).await {
            Ok(p) => p,
            Err(e) => return Some(self.fallback(&e).into()),
        };
        let text = format::short_range(&points, self.now())
            .unwrap_or_else(|| "🕒 No hay pronóstico disponible para las próximas horas.".to_string());
        self.unless_repeated(chat_id, ReplyCategory::Later, text).await
    }

    async fn tomorrow_reply(&self, chat_id: i64) -> Option<Outgoing> {
        let location = self.location_for(chat_id).await;
        let points = match self.weather.forecast(&location).await {
            Ok(p) => p,
            Err(e) => return Some(self.fallback(&e).into()),
        };
        let text = format::tomorrow(&points, self.now())
            .map(|day| format::tomorrow_text(&day))
            .unwrap_or_else(|| "📅 No hay pronóstico disponible para mañana.".to_string());
        self.unless_repeated(chat_id, ReplyCategory::Tomorrow, text).await
    }

    async fn alerts_reply(&self, chat_id: i64) -> Reply {
        let location = self.location_for(chat_id).await;
        let current = match self.weather.current(&location).await {
            Ok(c) => c,
            Err(e) => return self.fallback(&e),
        };
        let points = match self.weather.forecast(&location).await {
            Ok(p) => p,
            Err(e) => return self.fallback(&e),
        };
        let found = format::alerts(&current, &points, &self.thresholds);
        Reply::Text(format::alerts_text(&found))
    }

    async fn full_weather(&self) -> Reply {
        let location = Location::Named(self.default_city.clone());
        match self.weather.current(&location).await {
            Ok(current) => Reply::Text(format::full_weather(
                &current,
                &self.default_city,
                self.now(),
            )),
            Err(e) => self.fallback(&e),
        }
    }

    async fn on_voice(&self) -> Reply {
        match self.full_weather().await {
            Reply::Text(text) => Reply::Text(format!("{}\n\n{}", format::VOICE_PREFIX, text)),
            other => other,
        }
    }

    async fn on_free_text(&self, chat_id: i64) -> Option<Reply> {
        let bucket = self.now().format("%Y-%m-%d %H:%M").to_string();
        if self.sessions.ambient_bucket(chat_id).await.as_deref() == Some(bucket.as_str()) {
            debug!("Ambient reply already sent to chat {} at {}", chat_id, bucket);
            return None;
        }
        self.sessions.set_ambient_bucket(chat_id, bucket).await;
        Some(self.full_weather().await)
    }

    /// Suppress a reply identical to the last one of the same category that
    /// reached the chat.
    async fn unless_repeated(
        &self,
        chat_id: i64,
        category: ReplyCategory,
        text: String,
    ) -> Option<Outgoing> {
        let fp = fingerprint(&text);
        if self.sessions.last_reply(chat_id, category).await.as_deref() == Some(fp.as_str()) {
            debug!("Suppressing repeated {:?} reply to chat {}", category, chat_id);
            return None;
        }
        Some(Outgoing {
            reply: Reply::Text(text),
            remember: Some((category, fp)),
        })
    }

    fn fallback(&self, err: &anyhow::Error) -> Reply {
        warn!("Weather lookup failed: {:#}", err);
        Reply::Text(format::FALLBACK.to_string())
    }
}
