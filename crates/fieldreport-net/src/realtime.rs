//! Realtime change feed over the backend's Phoenix-channel websocket.
//!
//! [`subscribe`] joins a `postgres_changes` channel for one table and spawns a
//! socket task that keeps the channel alive with heartbeats and forwards every
//! decoded row change through an unbounded channel. Changes queue there until
//! the consumer starts draining, so nothing is lost while an initial fetch is
//! still in flight.
//!
//! Dropping the [`Subscription`] makes the socket task leave the channel and
//! close the connection.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};
use url::Url;

use fieldreport_shared::constants::PUBLIC_SCHEMA;
use fieldreport_shared::protocol::{ChangeEvent, ChangeKind};
use fieldreport_shared::types::{Report, ReportId};

use crate::error::{NetError, Result};
use crate::rest::BackendClient;

/// Protocol version negotiated in the websocket URL.
const PROTOCOL_VSN: &str = "1.0.0";

/// Topic used for socket-level heartbeats.
const PHOENIX_TOPIC: &str = "phoenix";

/// How long a dropped subscription may spend leaving its channel.
const LEAVE_TIMEOUT: Duration = Duration::from_secs(2);

// ---------------------------------------------------------------------------
// Filter
// ---------------------------------------------------------------------------

/// Which row changes a subscription receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeFilter {
    pub schema: String,
    pub table: String,
    /// Server-side row filter in PostgREST syntax, e.g. `user_id=eq.42`.
    pub filter: Option<String>,
}

impl ChangeFilter {
    pub fn table(table: &str) -> Self {
        Self {
            schema: PUBLIC_SCHEMA.to_string(),
            table: table.to_string(),
            filter: None,
        }
    }

    pub fn eq(mut self, column: &str, value: impl std::fmt::Display) -> Self {
        self.filter = Some(format!("{column}=eq.{value}"));
        self
    }

    pub fn topic(&self) -> String {
        format!("realtime:{}:{}", self.schema, self.table)
    }

    fn join_payload(&self) -> Value {
        let mut change = json!({
            "event": "*",
            "schema": self.schema,
            "table": self.table,
        });
        if let Some(filter) = &self.filter {
            change["filter"] = json!(filter);
        }
        json!({
            "config": {
                "broadcast": { "self": false },
                "presence": { "key": "" },
                "postgres_changes": [change],
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Subscription handle
// ---------------------------------------------------------------------------

/// A live change feed. Changes are yielded in arrival order.
pub struct Subscription {
    events: mpsc::UnboundedReceiver<ChangeEvent>,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Wrap a plain channel, for feeds that are not backed by a socket.
    pub fn from_receiver(events: mpsc::UnboundedReceiver<ChangeEvent>) -> Self {
        Self { events, task: None }
    }

    /// Next change, or `None` once the feed has ended.
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        self.events.recv().await
    }

    pub fn close(mut self) {
        self.shutdown();
    }

    /// Closing the receiver wakes the socket task, which leaves the channel
    /// and closes the socket on its own.
    fn shutdown(&mut self) {
        self.events.close();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("socket", &self.task.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct PhoenixMessage {
    topic: String,
    event: String,
    #[serde(default)]
    payload: Value,
    #[serde(rename = "ref", default)]
    reference: Option<Value>,
}

fn outgoing(topic: &str, event: &str, payload: Value, reference: u64) -> Message {
    let frame = json!({
        "topic": topic,
        "event": event,
        "payload": payload,
        "ref": reference.to_string(),
    });
    Message::Text(frame.to_string())
}

/// What an incoming text frame means for the subscription.
#[derive(Debug, PartialEq)]
enum Frame {
    Change(ChangeEvent),
    Reply {
        reference: Option<String>,
        ok: bool,
        response: Value,
    },
    Closed(String),
    Ignored,
}

fn reference_str(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn parse_frame(text: &str, topic: &str) -> Result<Frame> {
    let msg: PhoenixMessage = serde_json::from_str(text)?;
    if msg.topic != topic {
        return Ok(Frame::Ignored);
    }

    match msg.event.as_str() {
        "postgres_changes" => {
            let data = msg
                .payload
                .get("data")
                .ok_or_else(|| NetError::Decode("postgres_changes without data".into()))?;
            decode_change(data).map(Frame::Change)
        }
        "phx_reply" => Ok(Frame::Reply {
            reference: msg.reference.as_ref().and_then(reference_str),
            ok: msg.payload.get("status").and_then(Value::as_str) == Some("ok"),
            response: msg.payload.get("response").cloned().unwrap_or(Value::Null),
        }),
        "phx_error" => Ok(Frame::Closed("channel error".into())),
        "phx_close" => Ok(Frame::Closed("channel closed by server".into())),
        _ => Ok(Frame::Ignored),
    }
}

/// Decode the `data` object of a `postgres_changes` payload.
pub fn decode_change(data: &Value) -> Result<ChangeEvent> {
    #[derive(Deserialize)]
    struct ChangeData {
        #[serde(rename = "type")]
        kind: ChangeKind,
        #[serde(default)]
        record: Option<Value>,
        #[serde(default)]
        old_record: Option<Value>,
    }

    #[derive(Deserialize)]
    struct OldKey {
        id: ReportId,
    }

    let data = ChangeData::deserialize(data)?;
    let record = |raw: Option<Value>| -> Result<Report> {
        let raw = raw.ok_or_else(|| NetError::Decode("change without record".into()))?;
        Ok(serde_json::from_value(raw)?)
    };

    Ok(match data.kind {
        ChangeKind::Insert => ChangeEvent::Insert(record(data.record)?),
        ChangeKind::Update => ChangeEvent::Update(record(data.record)?),
        ChangeKind::Delete => {
            let old = data
                .old_record
                .ok_or_else(|| NetError::Decode("delete without old_record".into()))?;
            let OldKey { id } = serde_json::from_value(old)?;
            ChangeEvent::Delete { id }
        }
    })
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

impl BackendClient {
    /// Websocket endpoint of the realtime service.
    pub fn realtime_url(&self) -> Result<Url> {
        let mut url = self.base_url().clone();
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme)
            .map_err(|_| NetError::Config(format!("cannot derive websocket URL from {url}")))?;
        let path = format!("{}/realtime/v1/websocket", url.path().trim_end_matches('/'));
        url.set_path(&path);
        url.query_pairs_mut()
            .clear()
            .append_pair("apikey", self.anon_key())
            .append_pair("vsn", PROTOCOL_VSN);
        Ok(url)
    }

    pub async fn subscribe_changes(
        &self,
        filter: &ChangeFilter,
        heartbeat: Duration,
    ) -> Result<Subscription> {
        subscribe(&self.realtime_url()?, filter, heartbeat).await
    }
}

/// Connect, join the filter's channel and wait for the join to be accepted.
pub async fn subscribe(
    url: &Url,
    filter: &ChangeFilter,
    heartbeat: Duration,
) -> Result<Subscription> {
    let (ws, _) = tokio_tungstenite::connect_async(url.as_str()).await?;
    let (mut sink, mut stream) = ws.split();

    let topic = filter.topic();
    let join_ref: u64 = 1;
    let join_ref_str = join_ref.to_string();
    sink.send(outgoing(&topic, "phx_join", filter.join_payload(), join_ref))
        .await?;

    let (tx, rx) = mpsc::unbounded_channel();

    // Changes can race the join reply; they are queued, not dropped.
    loop {
        let text = match stream.next().await {
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Close(_))) | None => {
                return Err(NetError::JoinRejected("socket closed before join reply".into()))
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(e.into()),
        };

        let frame = match parse_frame(&text, &topic) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "undecodable frame skipped");
                continue;
            }
        };

        match frame {
            Frame::Reply {
                reference,
                ok,
                response,
            } if reference.as_deref() == Some(join_ref_str.as_str()) => {
                if !ok {
                    return Err(NetError::JoinRejected(response.to_string()));
                }
                break;
            }
            Frame::Change(event) => {
                let _ = tx.send(event);
            }
            Frame::Closed(reason) => return Err(NetError::JoinRejected(reason)),
            _ => {}
        }
    }

    info!(topic = %topic, filter = ?filter.filter, "subscribed to change feed");

    let task = tokio::spawn(async move {
        let mut next_ref = join_ref;
        let mut ticker = tokio::time::interval(heartbeat.max(Duration::from_secs(1)));
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    next_ref += 1;
                    let beat = outgoing(PHOENIX_TOPIC, "heartbeat", json!({}), next_ref);
                    if let Err(e) = sink.send(beat).await {
                        warn!(error = %e, "heartbeat failed, closing feed");
                        break;
                    }
                }
                _ = tx.closed() => {
                    debug!(topic = %topic, "subscriber gone, leaving channel");
                    next_ref += 1;
                    let leave = outgoing(&topic, "phx_leave", json!({}), next_ref);
                    let teardown = async {
                        sink.send(leave).await?;
                        sink.close().await
                    };
                    match tokio::time::timeout(LEAVE_TIMEOUT, teardown).await {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => debug!(error = %e, "leave failed"),
                        Err(_) => debug!(topic = %topic, "leave timed out"),
                    }
                    break;
                }
                frame = stream.next() => match frame {
                    Some(Ok(Message::Text(text))) => match parse_frame(&text, &topic) {
                        Ok(Frame::Change(event)) => {
                            debug!(kind = %event.kind(), id = %event.id(), "change received");
                            if tx.send(event).is_err() {
                                break;
                            }
                        }
                        Ok(Frame::Closed(reason)) => {
                            warn!(topic = %topic, reason = %reason, "channel closed");
                            break;
                        }
                        Ok(_) => {}
                        Err(e) => warn!(error = %e, "undecodable frame skipped"),
                    },
                    Some(Ok(Message::Close(_))) | None => {
                        info!(topic = %topic, "change feed socket closed");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(error = %e, "change feed socket error");
                        break;
                    }
                },
            }
        }
    });

    Ok(Subscription {
        events: rx,
        task: Some(task),
    })
}
