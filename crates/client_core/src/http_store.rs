use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::{Client, Response};
use shared::{
    domain::{Bookmark, BookmarkDraft, BookmarkId, OwnerId},
    error::{ApiError, ApiException},
    protocol::{CreateBookmarkRequest, LoginRequest, LoginResponse, ServerEvent},
};
use tokio::sync::mpsc;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{Error as WsError, Message},
};
use tracing::{debug, warn};
use url::Url;

use crate::store::{Change, RemoteFeed, RemoteStore};

const FEED_BUFFER: usize = 256;
const SUBSCRIBE_ACK_TIMEOUT: Duration = Duration::from_secs(10);

/// Talks to the bookmark server over REST, with the change feed on `/ws`.
#[derive(Clone)]
pub struct HttpRemoteStore {
    http: Client,
    server_url: String,
}

impl HttpRemoteStore {
    pub fn new(server_url: impl Into<String>) -> Self {
        let server_url: String = server_url.into();
        Self {
            http: Client::new(),
            server_url: server_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn login(&self, username: &str) -> Result<OwnerId> {
        let res = self
            .http
            .post(format!("{}/login", self.server_url))
            .json(&LoginRequest {
                username: username.to_string(),
            })
            .send()
            .await
            .context("login request failed")?;
        let body: LoginResponse = check_status(res).await?.json().await?;
        Ok(body.owner_id)
    }

    fn feed_url(&self, owner_id: OwnerId) -> Result<Url> {
        let mut url = Url::parse(&self.server_url)
            .with_context(|| format!("invalid server url: {}", self.server_url))?;
        let scheme = match url.scheme() {
            "https" => "wss",
            "http" => "ws",
            other => return Err(anyhow!("server_url must be http or https, got {other}")),
        };
        url.set_scheme(scheme)
            .map_err(|_| anyhow!("cannot switch {} to {scheme}", self.server_url))?;
        url.set_path("/ws");
        url.query_pairs_mut()
            .clear()
            .append_pair("owner_id", &owner_id.0.to_string());
        Ok(url)
    }
}

async fn check_status(res: Response) -> Result<Response> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    match res.json::<ApiError>().await {
        Ok(api_error) => Err(ApiException::from(api_error).into()),
        Err(_) => Err(anyhow!("server returned {status}")),
    }
}

async fn await_acknowledgement<S>(reader: &mut S, owner_id: OwnerId) -> Result<()>
where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    while let Some(msg) = reader.next().await {
        match msg? {
            Message::Text(text) => match serde_json::from_str::<ServerEvent>(&text)? {
                ServerEvent::Subscribed { owner_id: acked } if acked == owner_id => return Ok(()),
                ServerEvent::Error(err) => return Err(ApiException::from(err).into()),
                other => debug!(?other, "feed: ignoring frame before acknowledgement"),
            },
            Message::Close(_) => break,
            _ => {}
        }
    }
    Err(anyhow!(
        "websocket closed before subscription was acknowledged"
    ))
}

fn change_for_owner(owner_id: OwnerId, event: ServerEvent) -> Option<Change> {
    match event {
        ServerEvent::BookmarkInserted { bookmark } if bookmark.owner_id == owner_id => {
            Some(Change::Inserted(bookmark))
        }
        ServerEvent::BookmarkDeleted {
            owner_id: event_owner,
            bookmark_id,
        } if event_owner == owner_id => Some(Change::Deleted(bookmark_id)),
        ServerEvent::Error(err) => {
            warn!(
                owner_id = owner_id.0,
                code = ?err.code,
                message = %err.message,
                "feed: server error"
            );
            None
        }
        _ => None,
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn list(&self, owner_id: OwnerId) -> Result<Vec<Bookmark>> {
        let res = self
            .http
            .get(format!("{}/bookmarks", self.server_url))
            .query(&[("owner_id", owner_id.0)])
            .send()
            .await
            .context("list bookmarks request failed")?;
        Ok(check_status(res).await?.json().await?)
    }

    async fn create(&self, owner_id: OwnerId, draft: &BookmarkDraft) -> Result<Bookmark> {
        let res = self
            .http
            .post(format!("{}/bookmarks", self.server_url))
            .json(&CreateBookmarkRequest {
                owner_id,
                title: draft.title.clone(),
                url: draft.url.clone(),
            })
            .send()
            .await
            .context("create bookmark request failed")?;
        Ok(check_status(res).await?.json().await?)
    }

    async fn delete(&self, owner_id: OwnerId, bookmark_id: BookmarkId) -> Result<()> {
        let res = self
            .http
            .delete(format!("{}/bookmarks/{}", self.server_url, bookmark_id.0))
            .query(&[("owner_id", owner_id.0)])
            .send()
            .await
            .context("delete bookmark request failed")?;
        check_status(res).await?;
        Ok(())
    }

    /// Returns once the server has acknowledged the subscription, so no
    /// change committed afterwards can be missed.
    async fn subscribe(&self, owner_id: OwnerId) -> Result<RemoteFeed> {
        let url = self.feed_url(owner_id)?;
        let (ws_stream, _) = connect_async(url.as_str())
            .await
            .with_context(|| format!("failed to connect websocket: {url}"))?;
        let (_, mut ws_reader) = ws_stream.split();

        tokio::time::timeout(
            SUBSCRIBE_ACK_TIMEOUT,
            await_acknowledgement(&mut ws_reader, owner_id),
        )
        .await
        .map_err(|_| anyhow!("timed out waiting for subscription acknowledgement"))??;

        let (tx, rx) = mpsc::channel(FEED_BUFFER);
        let reader = tokio::spawn(async move {
            while let Some(msg) = ws_reader.next().await {
                match msg {
                    Ok(Message::Text(text)) => match serde_json::from_str::<ServerEvent>(&text) {
                        Ok(event) => {
                            let Some(change) = change_for_owner(owner_id, event) else {
                                continue;
                            };
                            if tx.send(change).await.is_err() {
                                break;
                            }
                        }
                        Err(err) => {
                            warn!(
                                owner_id = owner_id.0,
                                error = %err,
                                "feed: invalid server event"
                            );
                        }
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(err) => {
                        warn!(
                            owner_id = owner_id.0,
                            error = %err,
                            "feed: websocket receive failed"
                        );
                        break;
                    }
                }
            }
        });

        Ok(RemoteFeed::with_reader(rx, reader))
    }
}
