//! One live session: a mailbox link plus the loop that serializes actions
//! on it.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::creds::{self, Credential};
use crate::error::{Error, Result};
use crate::keys;
use crate::mailbox::{ConnectOpts, Link, Transport};
use crate::perms::PermissionManager;
use crate::rpc::{MethodRegistry, RpcCodec};

/// Reserved method name: check a batch of URIs against the session's
/// credential instead of calling the remote node.
pub const CHECK_PERMS_METHOD: &str = "checkPerms";

/// The action queue is deliberately tiny: one queued action per session is
/// the backpressure knob that keeps a slow remote from buffering work.
const ACTION_QUEUE_CAP: usize = 1;

/// Wire value describing one remote node, as sent by callers and echoed back
/// updated. After a handshake the key fields hold what was actually used and
/// the credential rides along internally, never serialized.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionInfo {
    #[serde(rename = "Mailbox", default)]
    pub mailbox: String,
    #[serde(rename = "PairingPhrase", default)]
    pub pairing_phrase: String,
    #[serde(rename = "LocalKey", default)]
    pub local_key: String,
    #[serde(rename = "RemoteKey", default)]
    pub remote_key: String,
    #[serde(rename = "Status", default)]
    pub status: String,
    #[serde(skip)]
    pub(crate) credential: Credential,
}

/// Pool cache key. Two requests naming the same mailbox and pairing phrase
/// address the same session, whatever their key fields say.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionKey {
    mailbox: String,
    pairing_phrase: String,
}

impl ConnectionKey {
    pub fn from_info(info: &ConnectionInfo) -> Self {
        Self {
            mailbox: info.mailbox.clone(),
            pairing_phrase: info.pairing_phrase.clone(),
        }
    }
}

/// What an action resolves to: the updated connection info plus the result
/// JSON, or the error that stopped it.
pub type ActionOutcome = Result<(ConnectionInfo, String)>;

/// One unit of work queued against a session. Completion is a oneshot, so
/// exactly one outcome is delivered and a second would not compile.
pub struct Action {
    pub method: String,
    pub payload: String,
    done: oneshot::Sender<ActionOutcome>,
}

impl Action {
    pub fn new(
        method: impl Into<String>,
        payload: impl Into<String>,
    ) -> (Self, oneshot::Receiver<ActionOutcome>) {
        let (done, outcome) = oneshot::channel();
        (
            Self {
                method: method.into(),
                payload: payload.into(),
                done,
            },
            outcome,
        )
    }

    pub fn complete(self, info: ConnectionInfo, result: String) {
        // The submitter may have gone away; nobody left to tell is fine.
        let _ = self.done.send(Ok((info, result)));
    }

    pub fn fail(self, err: Error) {
        let _ = self.done.send(Err(err));
    }
}

/// A live session in the pool. The link and registry are owned exclusively
/// by the consumer task; this handle only enqueues, counts, and closes.
pub struct Connection {
    info: ConnectionInfo,
    queue: Mutex<Option<mpsc::Sender<Action>>>,
}

impl Connection {
    /// Build a session: derive keys, run the mailbox handshake, stash the
    /// credential, populate the method registry, and start the action loop.
    ///
    /// On error nothing is spawned and nothing needs cleanup: the caller
    /// simply never inserts the session into the pool.
    pub async fn open(
        mut info: ConnectionInfo,
        transport: &dyn Transport,
        codec: &dyn RpcCodec,
        unsafe_log: bool,
    ) -> Result<Arc<Self>> {
        let (secret, pinned_remote) = keys::parse_keys(&info.local_key, &info.remote_key)?;
        info.local_key = keys::secret_to_hex(&secret);
        if unsafe_log {
            debug!(local_key = %info.local_key, "derived local key");
        }

        let handshake = transport
            .connect(ConnectOpts {
                addr: info.mailbox.clone(),
                pairing_phrase: info.pairing_phrase.clone(),
                local_key: secret,
                remote_key: pinned_remote,
            })
            .await?;

        info.remote_key = keys::public_to_hex(&handshake.remote_key);
        info.status = handshake.status.to_string();
        info.credential = creds::parse_auth_data(&handshake.auth_data)?;

        let mut registry = MethodRegistry::new();
        codec.register(&mut registry);

        let (queue_tx, queue_rx) = mpsc::channel(ACTION_QUEUE_CAP);
        let connection = Arc::new(Self {
            info: info.clone(),
            queue: Mutex::new(Some(queue_tx)),
        });

        tokio::spawn(run_loop(
            queue_rx,
            registry,
            handshake.link,
            info,
            PermissionManager::new(),
            unsafe_log,
        ));

        Ok(connection)
    }

    pub fn info(&self) -> &ConnectionInfo {
        &self.info
    }

    pub fn status(&self) -> &str {
        &self.info.status
    }

    /// Actions enqueued but not yet pulled by the loop.
    pub fn pending(&self) -> usize {
        self.queue
            .lock()
            .expect("queue mutex")
            .as_ref()
            .map(|tx| tx.max_capacity() - tx.capacity())
            .unwrap_or(0)
    }

    /// Enqueue an action, waiting for queue space. Returns the action back
    /// if the session was closed before it could be accepted.
    pub async fn submit(&self, action: Action) -> std::result::Result<(), Action> {
        let sender = self.queue.lock().expect("queue mutex").clone();
        let Some(sender) = sender else {
            return Err(action);
        };
        sender.send(action).await.map_err(|rejected| rejected.0)
    }

    /// Close the queue. The loop finishes whatever was already accepted,
    /// then closes the link.
    pub fn close(&self) {
        self.queue.lock().expect("queue mutex").take();
    }
}

/// Single consumer: actions on one session run strictly in enqueue order.
async fn run_loop(
    mut queue: mpsc::Receiver<Action>,
    registry: MethodRegistry,
    link: Arc<dyn Link>,
    info: ConnectionInfo,
    perms: PermissionManager,
    unsafe_log: bool,
) {
    while let Some(action) = queue.recv().await {
        if action.method == CHECK_PERMS_METHOD {
            debug!(payload = %action.payload, "checking permissions");
            check_perms(&perms, &info, action);
            continue;
        }

        let Some(dispatcher) = registry.get(&action.method) else {
            warn!(method = %action.method, "method not in registry");
            let method = action.method.clone();
            action.fail(Error::UnknownMethod(method));
            continue;
        };

        info!(method = %action.method, "executing method");
        if unsafe_log {
            debug!(info = ?info, method = %action.method, payload = %action.payload, "execution");
        }
        match dispatcher.dispatch(link.as_ref(), &action.payload).await {
            Ok(result) => action.complete(info.clone(), result),
            Err(e) => action.fail(e),
        }
    }

    link.close().await;
}

/// Payload: a JSON array of dotted URIs. Reply: a JSON array of booleans,
/// same length and order. Per-URI failures are logged and count as deny;
/// only a malformed payload fails the whole action.
fn check_perms(perms: &PermissionManager, info: &ConnectionInfo, action: Action) {
    let uris: Vec<String> = match serde_json::from_str(&action.payload) {
        Ok(uris) => uris,
        Err(e) => {
            action.fail(Error::Payload(e.to_string()));
            return;
        }
    };

    let mut allowed = Vec::with_capacity(uris.len());
    for uri in &uris {
        match perms.check(uri, &info.credential) {
            Ok(ok) => allowed.push(ok),
            Err(e) => {
                error!(%uri, err = %e, "error checking permission");
                allowed.push(false);
            }
        }
    }

    match serde_json::to_string(&allowed) {
        Ok(result) => action.complete(info.clone(), result),
        Err(e) => action.fail(Error::Payload(e.to_string())),
    }
}
