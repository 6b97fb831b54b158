//! Socket-mode transport: discover the websocket endpoint, hold the
//! connection open, and feed message frames into the dispatcher.
//! Connection loss triggers a delayed reconnect until the account stops.

use std::time::Duration;

use {
    futures::{SinkExt, StreamExt},
    tokio_tungstenite::{connect_async, tungstenite::Message},
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use crate::{accounts::ResolvedAccount, error::Result, monitor::Dispatcher};

const RECONNECT_DELAY: Duration = Duration::from_secs(5);

pub(crate) fn spawn(dispatcher: Dispatcher, account: ResolvedAccount, cancel: CancellationToken) {
    tokio::spawn(run(dispatcher, account, cancel));
}

async fn run(dispatcher: Dispatcher, account: ResolvedAccount, cancel: CancellationToken) {
    let account_id = account.account_id.clone();
    loop {
        if cancel.is_cancelled() {
            break;
        }
        match connect_once(&dispatcher, &account, &cancel).await {
            Ok(()) => {
                // Clean close; either we were cancelled or the server hung
                // up and a reconnect is due.
                if cancel.is_cancelled() {
                    break;
                }
                debug!(account_id = %account_id, "socket closed, reconnecting");
            },
            Err(err) => {
                warn!(account_id = %account_id, error = %err, "socket connection failed");
                dispatcher.context().state.mark_error(&account_id, &err.to_string());
            },
        }
        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(RECONNECT_DELAY) => {},
        }
    }
    debug!(account_id = %account_id, "socket loop exited");
}

async fn connect_once(
    dispatcher: &Dispatcher,
    account: &ResolvedAccount,
    cancel: &CancellationToken,
) -> Result<()> {
    let client = dispatcher.context().cache.get(
        &account.app_id,
        &account.app_secret,
        account.config.domain,
        false,
    )?;
    let endpoint = client.ws_endpoint().await?;
    let (mut stream, _) = connect_async(endpoint.as_str()).await?;
    info!(account_id = %account.account_id, "socket connected");

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                let _ = stream.close(None).await;
                return Ok(());
            },
            frame = stream.next() => {
                let Some(frame) = frame else {
                    return Ok(());
                };
                match frame? {
                    Message::Text(text) => {
                        handle_payload(dispatcher, &account.account_id, text.as_bytes()).await;
                    },
                    Message::Binary(bytes) => {
                        handle_payload(dispatcher, &account.account_id, &bytes).await;
                    },
                    Message::Ping(payload) => {
                        stream.send(Message::Pong(payload)).await?;
                    },
                    Message::Close(_) => return Ok(()),
                    _ => {},
                }
            },
        }
    }
}

async fn handle_payload(dispatcher: &Dispatcher, account_id: &str, payload: &[u8]) {
    let value: serde_json::Value = match serde_json::from_slice(payload) {
        Ok(value) => value,
        Err(err) => {
            debug!(account_id, error = %err, "ignoring non-JSON socket frame");
            return;
        },
    };
    dispatcher.dispatch(account_id, value).await;
}
