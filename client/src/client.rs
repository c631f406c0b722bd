//! HTTP implementation of the remote block-store interface.
//!
//! Every endpoint is a POST of a bincode-encoded request; single blocks are
//! fetched as `GET /content/<hex hash>`. Transport-level failures are
//! retried a few times, failures the server actually answered with are not.

use {
    anyhow::{format_err, Error, Result},
    async_trait::async_trait,
    blockhaus_protocol::{
        encoding,
        endpoints::{BulkHeadBlock, BulkPostBlock, GetTree, PostTree, RequestToResponse},
        BlockHash, EncryptedPath, Provider, TreeItem,
    },
    reqwest::Method,
    serde::{de::DeserializeOwned, Serialize},
    std::{future::Future, time::Duration},
    tokio::time::sleep,
    tracing::warn,
    url::Url,
};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// Block batch uploads may take a while on slow uplinks.
pub const UPLOAD_TIMEOUT: Duration = Duration::from_secs(3600);

/// Reuse a created client or clone it in order to reuse its connection pool.
#[derive(Clone)]
pub struct Client {
    reqwest: reqwest::Client,
    server_url: Url,
    token: String,
}

impl Client {
    pub fn new(server_url: Url, token: String) -> Result<Self> {
        Ok(Self {
            server_url,
            token,
            reqwest: reqwest::Client::builder()
                .timeout(DEFAULT_TIMEOUT)
                .build()?,
        })
    }

    async fn request_with_timeout<R>(
        &self,
        request: &R,
        timeout: Option<Duration>,
    ) -> Result<R::Response>
    where
        R: RequestToResponse + Serialize + Send + Sync,
        R::Response: DeserializeOwned + Send,
    {
        let url = self.server_url.join(R::PATH)?;
        let body = encoding::serialize(request)?;
        let bytes = ok_or_retry(|| async {
            let mut post = self
                .reqwest
                .request(Method::POST, url.clone())
                .bearer_auth(&self.token)
                .body(body.clone());
            if let Some(timeout) = timeout {
                post = post.timeout(timeout);
            }
            post.send()
                .await
                .map_err(RequestError::transport)?
                .error_for_status()
                .map_err(RequestError::application)?
                .bytes()
                .await
                .map_err(RequestError::transport)
        })
        .await?;
        encoding::deserialize::<Result<R::Response, String>>(&bytes)?
            .map_err(|msg| format_err!("server error: {msg}"))
    }

    async fn request<R>(&self, request: &R) -> Result<R::Response>
    where
        R: RequestToResponse + Serialize + Send + Sync,
        R::Response: DeserializeOwned + Send,
    {
        self.request_with_timeout(request, None).await
    }

    fn content_url(&self, hash: &BlockHash) -> Result<Url> {
        let mut url = self.server_url.clone();
        url.path_segments_mut()
            .map_err(|()| format_err!("cannot extend server URL"))?
            .push("content")
            .push(&hash.to_hex());
        Ok(url)
    }
}

#[async_trait]
impl Provider for Client {
    async fn get_tree(&self) -> Result<Vec<TreeItem>> {
        self.request(&GetTree).await
    }

    async fn bulk_head_block(&self, hashes: &[BlockHash]) -> Result<Vec<bool>> {
        self.request(&BulkHeadBlock(hashes.to_vec())).await
    }

    async fn bulk_post_block(&self, blocks: Vec<Vec<u8>>) -> Result<()> {
        self.request_with_timeout(&BulkPostBlock(blocks), Some(UPLOAD_TIMEOUT))
            .await
    }

    async fn get_block(&self, hash: &BlockHash) -> Result<Vec<u8>> {
        let url = self.content_url(hash)?;
        let bytes = ok_or_retry(|| async {
            self.reqwest
                .get(url.clone())
                .bearer_auth(&self.token)
                .send()
                .await
                .map_err(RequestError::transport)?
                .error_for_status()
                .map_err(RequestError::application)?
                .bytes()
                .await
                .map_err(RequestError::transport)
        })
        .await?;
        Ok(bytes.to_vec())
    }

    async fn post_tree(
        &self,
        put_items: Vec<TreeItem>,
        delete_paths: Vec<EncryptedPath>,
    ) -> Result<bool> {
        self.request(&PostTree {
            put_items,
            delete_paths,
        })
        .await
    }
}

/// Retries the request if an error arises due to the transport.
async fn ok_or_retry<T, F, Fut>(mut f: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RequestError>>,
{
    const NUM_RETRIES: u32 = 5;
    const RETRY_PERIOD: Duration = Duration::from_secs(10);
    let mut attempt = 0;
    loop {
        attempt += 1;
        let transport_err = match f().await {
            Ok(value) => break Ok(value),
            Err(RequestError::Application(err)) => break Err(err),
            Err(RequestError::Transport(err)) => err,
        };
        if attempt >= NUM_RETRIES {
            break Err(transport_err);
        }
        warn!(error = %transport_err, attempt, "transport failed, will retry");
        sleep(RETRY_PERIOD).await;
    }
}

enum RequestError {
    Transport(Error),
    Application(Error),
}

impl RequestError {
    fn application(err: impl Into<Error>) -> Self {
        Self::Application(err.into())
    }

    fn transport(err: impl Into<Error>) -> Self {
        Self::Transport(err.into())
    }
}
