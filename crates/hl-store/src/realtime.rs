//! Realtime change channel.
//!
//! Speaks the Phoenix channel protocol (JSON serializer, `vsn=1.0.0`) used
//! by the hosted store's realtime service:
//!
//! ```text
//! connect ws(s)://host/realtime/v1/websocket?apikey=..&vsn=1.0.0
//!   -> phx_join  realtime:{schema}:{table}   (postgres_changes filter id=eq.{subject})
//!   <- phx_reply status=ok
//!   <- postgres_changes {data: {type, record}}      (repeated)
//!   -> heartbeat on topic "phoenix" every interval
//! ```
//!
//! The channel task owns the socket. Any failure (join refused, socket
//! error, missed heartbeat, server close) ends the session; the task backs
//! off and reconnects until the feed is dropped or the attempt limit is hit.

use futures_util::{SinkExt, StreamExt};
use hl_core::{LocationRecord, SubjectId};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{ChangeFeed, RealtimeConfig, ReconnectHandler, StoreError, StoreResult};

/// Serializer version requested in the connect URL.
pub const PROTOCOL_VERSION: &str = "1.0.0";

const PHOENIX_TOPIC: &str = "phoenix";
const JOIN_REF: &str = "1";
/// Row events the channel listens for. INSERT is included so the very first
/// report of a subject is observed too.
const WATCHED_EVENTS: [&str; 2] = ["INSERT", "UPDATE"];

/// One Phoenix frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhoenixMessage {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "ref", default)]
    pub msg_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_ref: Option<String>,
}

/// What to join and on whose behalf.
#[derive(Debug, Clone)]
pub struct ChannelSpec {
    pub url: Url,
    pub access_token: String,
    pub schema: String,
    pub table: String,
    pub subject: SubjectId,
}

impl ChannelSpec {
    #[must_use]
    pub fn topic(&self) -> String {
        format!("realtime:{}:{}", self.schema, self.table)
    }

    #[must_use]
    pub fn filter(&self) -> String {
        format!("id=eq.{}", self.subject)
    }

    /// The `phx_join` frame for this channel.
    #[must_use]
    pub fn join_message(&self) -> PhoenixMessage {
        let changes: Vec<Value> = WATCHED_EVENTS
            .iter()
            .map(|event| {
                json!({
                    "event": event,
                    "schema": self.schema,
                    "table": self.table,
                    "filter": self.filter(),
                })
            })
            .collect();

        PhoenixMessage {
            topic: self.topic(),
            event: "phx_join".to_string(),
            payload: json!({
                "config": {
                    "broadcast": { "ack": false, "self": false },
                    "presence": { "key": "" },
                    "postgres_changes": changes,
                    "private": false,
                },
                "access_token": self.access_token,
            }),
            msg_ref: Some(JOIN_REF.to_string()),
            join_ref: Some(JOIN_REF.to_string()),
        }
    }
}

fn heartbeat_message(msg_ref: &str) -> PhoenixMessage {
    PhoenixMessage {
        topic: PHOENIX_TOPIC.to_string(),
        event: "heartbeat".to_string(),
        payload: json!({}),
        msg_ref: Some(msg_ref.to_string()),
        join_ref: None,
    }
}

/// Meaning of an inbound frame for this channel.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// The server accepted the join.
    Joined,
    /// The server refused the join.
    JoinRefused(String),
    /// Reply to the heartbeat with this ref.
    HeartbeatAck(String),
    /// A row change for the subject.
    Change(LocationRecord),
    /// The server errored or closed the channel.
    ChannelDown(String),
    /// Anything else (presence, other topics, other subjects).
    Ignored,
}

/// Classify a frame received on a socket joined per `spec`.
#[must_use]
pub fn classify(message: &PhoenixMessage, spec: &ChannelSpec) -> Inbound {
    let topic = spec.topic();

    if message.event == "phx_reply" {
        let status = message.payload.get("status").and_then(Value::as_str);
        let reply_ref = message.msg_ref.clone().unwrap_or_default();
        if message.topic == PHOENIX_TOPIC {
            return Inbound::HeartbeatAck(reply_ref);
        }
        if message.topic == topic && reply_ref == JOIN_REF {
            return match status {
                Some("ok") => Inbound::Joined,
                _ => Inbound::JoinRefused(
                    message
                        .payload
                        .get("response")
                        .map_or_else(|| "join refused".to_string(), Value::to_string),
                ),
            };
        }
        return Inbound::Ignored;
    }

    if message.topic != topic {
        return Inbound::Ignored;
    }

    let record_value = match message.event.as_str() {
        "postgres_changes" => message.payload.pointer("/data/record"),
        // Legacy servers push the row event name with the record inline.
        "INSERT" | "UPDATE" => message.payload.get("record"),
        "phx_error" => return Inbound::ChannelDown("channel error".to_string()),
        "phx_close" => return Inbound::ChannelDown("channel closed by server".to_string()),
        "system" => {
            return match message.payload.get("status").and_then(Value::as_str) {
                Some("error") => Inbound::ChannelDown(
                    message
                        .payload
                        .get("message")
                        .and_then(Value::as_str)
                        .unwrap_or("system error")
                        .to_string(),
                ),
                _ => Inbound::Ignored,
            };
        }
        _ => None,
    };

    let Some(record_value) = record_value else {
        return Inbound::Ignored;
    };

    match serde_json::from_value::<LocationRecord>(record_value.clone()) {
        Ok(record) if record.subject_id == spec.subject => Inbound::Change(record),
        Ok(_) => Inbound::Ignored,
        Err(err) => {
            warn!(error = %err, "undecodable change record");
            Inbound::Ignored
        }
    }
}

enum SessionEnd {
    /// The feed was dropped; stop for good.
    ReceiverGone,
    /// The session ended; reconnect.
    Disconnected { joined: bool, reason: String },
}

/// Spawn the channel task and return its feed.
#[must_use]
pub fn spawn_channel(spec: ChannelSpec, config: RealtimeConfig) -> ChangeFeed {
    let (tx, rx) = mpsc::unbounded_channel();
    let driver = tokio::spawn(run_channel(spec, config, tx));
    ChangeFeed::with_driver(rx, driver)
}

async fn run_channel(
    spec: ChannelSpec,
    config: RealtimeConfig,
    tx: mpsc::UnboundedSender<LocationRecord>,
) {
    let mut handler = ReconnectHandler::new(config.reconnect());
    let topic = spec.topic();

    loop {
        match run_session(&spec, &config, &tx).await {
            Ok(SessionEnd::ReceiverGone) => {
                debug!(%topic, "change feed dropped; closing channel");
                return;
            }
            Ok(SessionEnd::Disconnected { joined, reason }) => {
                if joined {
                    handler.reset();
                }
                warn!(%topic, %reason, "realtime channel disconnected");
            }
            Err(err) => {
                warn!(%topic, error = %err, "realtime session failed");
            }
        }

        if !handler.can_reconnect() {
            error!(%topic, attempts = handler.attempts(), "realtime reconnect limit reached");
            return;
        }
        let delay = handler.record_failure();
        debug!(%topic, attempt = handler.attempts(), ?delay, "reconnecting realtime channel");
        tokio::select! {
            () = tx.closed() => return,
            () = tokio::time::sleep(delay) => {}
        }
    }
}

async fn run_session(
    spec: &ChannelSpec,
    config: &RealtimeConfig,
    tx: &mpsc::UnboundedSender<LocationRecord>,
) -> StoreResult<SessionEnd> {
    let connect = tokio::time::timeout(config.connect_timeout(), connect_async(spec.url.as_str()))
        .await
        .map_err(|_| StoreError::Realtime(format!("connect timed out after {:?}", config.connect_timeout())))?;
    let (socket, _response) = connect.map_err(|e| StoreError::Realtime(e.to_string()))?;
    let (mut sink, mut stream) = socket.split();

    send(&mut sink, &spec.join_message()).await?;

    let mut heartbeat = config.heartbeat_interval().map(|every| {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + every, every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker
    });
    let mut next_ref: u64 = 1;
    let mut pending_heartbeat: Option<String> = None;
    let mut joined = false;

    let end = loop {
        tokio::select! {
            () = tx.closed() => break SessionEnd::ReceiverGone,
            () = next_heartbeat(heartbeat.as_mut()) => {
                if pending_heartbeat.is_some() {
                    break SessionEnd::Disconnected { joined, reason: "heartbeat timeout".into() };
                }
                next_ref += 1;
                let msg_ref = next_ref.to_string();
                send(&mut sink, &heartbeat_message(&msg_ref)).await?;
                pending_heartbeat = Some(msg_ref);
            }
            frame = stream.next() => {
                let message = match frame {
                    None => break SessionEnd::Disconnected { joined, reason: "socket closed".into() },
                    Some(Err(err)) => break SessionEnd::Disconnected { joined, reason: err.to_string() },
                    Some(Ok(Message::Close(frame))) => {
                        let reason = frame.map_or_else(|| "close frame".to_string(), |f| f.reason.as_str().to_string());
                        break SessionEnd::Disconnected { joined, reason };
                    }
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(_)) => continue,
                };
                let parsed: PhoenixMessage = match serde_json::from_str(message.as_str()) {
                    Ok(parsed) => parsed,
                    Err(err) => {
                        warn!(error = %err, "unparseable realtime frame");
                        continue;
                    }
                };
                match classify(&parsed, spec) {
                    Inbound::Joined => {
                        joined = true;
                        info!(topic = %spec.topic(), subject = %spec.subject, "realtime channel joined");
                    }
                    Inbound::JoinRefused(reason) => {
                        return Err(StoreError::Realtime(format!("join refused: {reason}")));
                    }
                    Inbound::HeartbeatAck(reply_ref) => {
                        if pending_heartbeat.as_deref() == Some(reply_ref.as_str()) {
                            pending_heartbeat = None;
                        }
                    }
                    Inbound::Change(record) => {
                        if tx.send(record).is_err() {
                            break SessionEnd::ReceiverGone;
                        }
                    }
                    Inbound::ChannelDown(reason) => {
                        break SessionEnd::Disconnected { joined, reason };
                    }
                    Inbound::Ignored => {}
                }
            }
        }
    };

    let _ = sink.send(Message::Close(None)).await;
    Ok(end)
}

/// Next heartbeat tick; never resolves when heartbeats are disabled.
async fn next_heartbeat(ticker: Option<&mut tokio::time::Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn send<S>(sink: &mut S, message: &PhoenixMessage) -> StoreResult<()>
where
    S: futures_util::Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
{
    let text = serde_json::to_string(message)?;
    sink.send(Message::text(text))
        .await
        .map_err(|e| StoreError::Realtime(e.to_string()))
}
