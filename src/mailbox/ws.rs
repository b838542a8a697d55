//! Websocket mailbox client.
//!
//! The broker matches both ends of a pairing on a stream id derived from the
//! pairing phrase, then forwards frames opaquely. After the plaintext hello
//! exchange pins the peer's static key, every frame is sealed with the link
//! cipher. The first encrypted frame from the peer is its auth-data message;
//! afterwards the link serves strictly serialized unary calls.
//!
//! A driver task owns the socket. [`WsLink`] hands it one call at a time
//! through a bounded channel and the driver answers through a oneshot, so a
//! dropped link (or daemon shutdown) closes the socket cleanly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;
use x25519_dalek::PublicKey;

use super::crypto::{self, LinkCipher};
use super::{ConnectOpts, ConnStatus, Handshake, Link, Transport};
use crate::error::{Error, Result};

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Outer frame, exchanged as websocket text messages. `data` payloads are
/// sealed by the link cipher; `hello` is the one plaintext exchange.
#[derive(Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Frame {
    Hello { pubkey: String },
    Data { payload: String },
}

/// Inner plaintext of an outgoing `data` frame.
#[derive(Serialize)]
struct CallFrame<'a> {
    method: &'a str,
    payload: &'a str,
}

/// Inner plaintext of an incoming `data` frame.
#[derive(Deserialize)]
struct CallReply {
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

struct CallRequest {
    method: String,
    payload: String,
    done: oneshot::Sender<Result<String>>,
}

pub struct WebsocketTransport;

impl WebsocketTransport {
    pub fn new() -> Self {
        Self
    }
}

impl Default for WebsocketTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for WebsocketTransport {
    async fn connect(&self, opts: ConnectOpts) -> Result<Handshake> {
        let sid = hex::encode(crypto::stream_id(&opts.pairing_phrase));
        let url = format!("wss://{}/v1/mailbox?sid={sid}", opts.addr);

        let (ws, _) = connect_async(url.as_str())
            .await
            .map_err(|e| Error::Handshake(format!("mailbox dial failed: {e}")))?;
        let (mut sink, mut stream) = ws.split();

        // Plaintext hello exchange: swap static public keys.
        let local_pub = PublicKey::from(&opts.local_key);
        send_frame(
            &mut sink,
            &Frame::Hello {
                pubkey: hex::encode(local_pub.as_bytes()),
            },
        )
        .await?;

        let remote_key = match recv_frame(&mut stream).await? {
            Frame::Hello { pubkey } => parse_pubkey(&pubkey)?,
            Frame::Data { .. } => {
                return Err(Error::Handshake("peer sent data before hello".into()))
            }
        };
        if let Some(pinned) = opts.remote_key {
            if pinned != remote_key {
                return Err(Error::Handshake(
                    "remote key does not match the pinned key".into(),
                ));
            }
        }

        let cipher = LinkCipher::client(&opts.local_key, &remote_key)?;

        // The first sealed frame from the peer carries its auth data.
        let auth_data = match recv_frame(&mut stream).await? {
            Frame::Data { payload } => cipher.open(&payload)?,
            Frame::Hello { .. } => {
                return Err(Error::Handshake("peer sent a second hello".into()))
            }
        };

        let connected = Arc::new(AtomicBool::new(true));
        // Capacity 1: one call in flight, the next sender waits its turn.
        let (calls_tx, calls_rx) = mpsc::channel(1);
        tokio::spawn(drive(sink, stream, cipher, calls_rx, connected.clone()));

        Ok(Handshake {
            link: Arc::new(WsLink {
                calls: Mutex::new(Some(calls_tx)),
                connected,
            }),
            remote_key,
            auth_data,
            status: ConnStatus::Connected,
        })
    }
}

/// Live link handle. Cheap to share; the socket lives in the driver task.
pub struct WsLink {
    calls: Mutex<Option<mpsc::Sender<CallRequest>>>,
    connected: Arc<AtomicBool>,
}

#[async_trait]
impl Link for WsLink {
    async fn call(&self, method: &str, payload: &str) -> Result<String> {
        let tx = self
            .calls
            .lock()
            .expect("link mutex")
            .clone()
            .ok_or(Error::ConnectionClosed)?;

        let (done_tx, done_rx) = oneshot::channel();
        tx.send(CallRequest {
            method: method.to_string(),
            payload: payload.to_string(),
            done: done_tx,
        })
        .await
        .map_err(|_| Error::ConnectionClosed)?;

        done_rx.await.map_err(|_| Error::ConnectionClosed)?
    }

    fn status(&self) -> ConnStatus {
        if self.connected.load(Ordering::SeqCst) {
            ConnStatus::Connected
        } else {
            ConnStatus::NotConnected
        }
    }

    async fn close(&self) {
        // Dropping the sender ends the driver loop, which closes the socket.
        self.calls.lock().expect("link mutex").take();
    }
}

/// Socket owner: answers queued calls one at a time, then closes the socket
/// when the last sender is gone.
async fn drive(
    mut sink: SplitSink<Ws, Message>,
    mut stream: SplitStream<Ws>,
    cipher: LinkCipher,
    mut calls: mpsc::Receiver<CallRequest>,
    connected: Arc<AtomicBool>,
) {
    while let Some(call) = calls.recv().await {
        let reply = roundtrip(&mut sink, &mut stream, &cipher, &call).await;
        let failed = reply.is_err();
        // The caller may have given up; a dead oneshot is fine.
        let _ = call.done.send(reply);
        if failed {
            break;
        }
    }
    connected.store(false, Ordering::SeqCst);
    let _ = sink.send(Message::Close(None)).await;
}

async fn roundtrip(
    sink: &mut SplitSink<Ws, Message>,
    stream: &mut SplitStream<Ws>,
    cipher: &LinkCipher,
    call: &CallRequest,
) -> Result<String> {
    let inner = serde_json::to_string(&CallFrame {
        method: &call.method,
        payload: &call.payload,
    })
    .map_err(|e| Error::Upstream(format!("encode request: {e}")))?;

    send_data(sink, cipher.seal(&inner)?).await?;

    loop {
        match stream.next().await {
            None => return Err(Error::Upstream("mailbox stream ended".into())),
            Some(Err(e)) => return Err(Error::Upstream(format!("mailbox read: {e}"))),
            Some(Ok(Message::Text(text))) => {
                let frame: Frame = serde_json::from_str(&text)
                    .map_err(|e| Error::Upstream(format!("malformed frame: {e}")))?;
                let Frame::Data { payload } = frame else {
                    debug!("ignoring stray hello frame on live link");
                    continue;
                };
                let inner = cipher.open(&payload)?;
                let reply: CallReply = serde_json::from_str(&inner)
                    .map_err(|e| Error::Upstream(format!("malformed reply: {e}")))?;
                return match reply.error {
                    Some(e) => Err(Error::Upstream(e)),
                    None => Ok(reply.result.unwrap_or_default()),
                };
            }
            Some(Ok(Message::Close(_))) => return Err(Error::ConnectionClosed),
            // Control and binary frames carry nothing for us.
            Some(Ok(_)) => continue,
        }
    }
}

async fn send_frame(sink: &mut SplitSink<Ws, Message>, frame: &Frame) -> Result<()> {
    let text =
        serde_json::to_string(frame).map_err(|e| Error::Handshake(format!("encode frame: {e}")))?;
    sink.send(Message::Text(text))
        .await
        .map_err(|e| Error::Handshake(format!("mailbox write: {e}")))
}

async fn send_data(sink: &mut SplitSink<Ws, Message>, payload: String) -> Result<()> {
    let text = serde_json::to_string(&Frame::Data { payload })
        .map_err(|e| Error::Upstream(format!("encode frame: {e}")))?;
    sink.send(Message::Text(text))
        .await
        .map_err(|e| Error::Upstream(format!("mailbox write: {e}")))
}

async fn recv_frame(stream: &mut SplitStream<Ws>) -> Result<Frame> {
    loop {
        match stream.next().await {
            None => return Err(Error::Handshake("mailbox closed during handshake".into())),
            Some(Err(e)) => return Err(Error::Handshake(format!("mailbox read: {e}"))),
            Some(Ok(Message::Text(text))) => {
                return serde_json::from_str(&text)
                    .map_err(|e| Error::Handshake(format!("malformed frame: {e}")))
            }
            Some(Ok(Message::Close(_))) => {
                // The broker closes the stream when no peer ever joined it.
                return Err(Error::Handshake("session not found at mailbox".into()));
            }
            Some(Ok(_)) => continue,
        }
    }
}

fn parse_pubkey(s: &str) -> Result<PublicKey> {
    let raw = hex::decode(s).map_err(|e| Error::Handshake(format!("invalid peer key: {e}")))?;
    let bytes: [u8; 32] = raw
        .try_into()
        .map_err(|_| Error::Handshake("peer key must be 32 bytes".into()))?;
    Ok(PublicKey::from(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_round_trip_through_json() {
        let hello = serde_json::to_string(&Frame::Hello {
            pubkey: "ab".repeat(32),
        })
        .unwrap();
        assert!(hello.contains(r#""type":"hello""#));
        match serde_json::from_str(&hello).unwrap() {
            Frame::Hello { pubkey } => assert_eq!(pubkey.len(), 64),
            Frame::Data { .. } => panic!("wrong frame kind"),
        }

        let data: Frame = serde_json::from_str(r#"{"type":"data","payload":"AAAA"}"#).unwrap();
        assert!(matches!(data, Frame::Data { payload } if payload == "AAAA"));
    }

    #[test]
    fn peer_keys_must_be_32_byte_hex() {
        assert!(parse_pubkey(&"ab".repeat(32)).is_ok());
        assert!(matches!(
            parse_pubkey("abcd"),
            Err(Error::Handshake(_))
        ));
        assert!(matches!(
            parse_pubkey("not hex"),
            Err(Error::Handshake(_))
        ));
    }

    #[test]
    fn call_replies_decode_result_or_error() {
        let ok: CallReply = serde_json::from_str(r#"{"result":"{\"ok\":true}"}"#).unwrap();
        assert_eq!(ok.result.as_deref(), Some(r#"{"ok":true}"#));
        assert!(ok.error.is_none());

        let err: CallReply = serde_json::from_str(r#"{"error":"no route"}"#).unwrap();
        assert_eq!(err.error.as_deref(), Some("no route"));
    }
}
