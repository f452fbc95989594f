//! Toxiproxy REST client over HTTP/1.1.
//!
//! Each call opens a fresh connection to the daemon, performs one request and
//! lets the connection close. The controller issues a handful of requests per
//! tick, so connection reuse is not worth the state it would need.

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::header::{CONTENT_TYPE, HOST};
use hyper::{Method, Request, StatusCode};
use hyper_util::rt::TokioIo;
use serde::de::DeserializeOwned;
use tokio::net::TcpStream;

use crate::daemon::error::{DaemonError, DaemonResult};
use crate::daemon::traits::ProxyDaemon;
use crate::daemon::types::{Proxy, Toxic};

/// Client for the Toxiproxy HTTP API.
#[derive(Clone, Debug)]
pub struct ToxiproxyClient {
    authority: String,
}

impl ToxiproxyClient {
    /// Create a client for `addr` (`host:port`, optionally `http://host:port/`).
    pub fn new(addr: &str) -> Self {
        let authority = addr
            .trim_start_matches("http://")
            .trim_end_matches('/')
            .to_string();
        Self { authority }
    }

    /// `host:port` the client connects to.
    pub fn authority(&self) -> &str {
        &self.authority
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> DaemonResult<(StatusCode, Bytes)> {
        let stream = TcpStream::connect(&self.authority).await?;
        let io = TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io).await?;

        // Drive the connection in the background
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                tracing::debug!(error = %e, "daemon connection closed with error");
            }
        });

        let mut builder = Request::builder()
            .method(method.clone())
            .uri(path)
            .header(HOST, self.authority.as_str());
        let body = match body {
            Some(bytes) => {
                builder = builder.header(CONTENT_TYPE, "application/json");
                Full::new(Bytes::from(bytes))
            }
            None => Full::new(Bytes::new()),
        };
        let req = builder
            .body(body)
            .map_err(|e| DaemonError::Transport(format!("request build error: {e}")))?;

        let res = sender.send_request(req).await?;
        let status = res.status();
        let bytes = res.into_body().collect().await?.to_bytes();
        tracing::trace!(%method, path, status = status.as_u16(), "daemon request");
        Ok((status, bytes))
    }

    async fn send_json<B: serde::Serialize>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> DaemonResult<(StatusCode, Bytes)> {
        let payload = serde_json::to_vec(body)?;
        self.request(method, path, Some(payload)).await
    }
}

/// Map a non-2xx status to the matching error.
fn check_status(status: StatusCode, body: &Bytes, subject: &str) -> DaemonResult<()> {
    if status.is_success() {
        return Ok(());
    }
    match status {
        StatusCode::NOT_FOUND => Err(DaemonError::NotFound(subject.to_string())),
        StatusCode::CONFLICT => Err(DaemonError::AlreadyExists(subject.to_string())),
        _ => Err(DaemonError::Status {
            status: status.as_u16(),
            body: String::from_utf8_lossy(body).trim().to_string(),
        }),
    }
}

fn decode<T: DeserializeOwned>(body: &Bytes) -> DaemonResult<T> {
    Ok(serde_json::from_slice(body)?)
}

#[async_trait(?Send)]
impl ProxyDaemon for ToxiproxyClient {
    async fn get_proxy(&self, name: &str) -> DaemonResult<Proxy> {
        let (status, body) = self
            .request(Method::GET, &format!("/proxies/{name}"), None)
            .await?;
        check_status(status, &body, name)?;
        decode(&body)
    }

    async fn create_proxy(&self, name: &str, listen: &str, upstream: &str) -> DaemonResult<Proxy> {
        let (status, body) = self
            .send_json(Method::POST, "/proxies", &Proxy::new(name, listen, upstream))
            .await?;
        check_status(status, &body, name)?;
        decode(&body)
    }

    async fn delete_proxy(&self, proxy: &Proxy) -> DaemonResult<()> {
        let (status, body) = self
            .request(Method::DELETE, &format!("/proxies/{}", proxy.name), None)
            .await?;
        check_status(status, &body, &proxy.name)
    }

    async fn list_toxics(&self, proxy: &Proxy) -> DaemonResult<Vec<Toxic>> {
        let (status, body) = self
            .request(Method::GET, &format!("/proxies/{}/toxics", proxy.name), None)
            .await?;
        check_status(status, &body, &proxy.name)?;
        decode(&body)
    }

    async fn add_toxic(&self, proxy: &Proxy, toxic: &Toxic) -> DaemonResult<Toxic> {
        let (status, body) = self
            .send_json(
                Method::POST,
                &format!("/proxies/{}/toxics", proxy.name),
                toxic,
            )
            .await?;
        check_status(status, &body, &format!("{}/{}", proxy.name, toxic.name))?;
        decode(&body)
    }

    async fn remove_toxic(&self, proxy: &Proxy, toxic_name: &str) -> DaemonResult<()> {
        let (status, body) = self
            .request(
                Method::DELETE,
                &format!("/proxies/{}/toxics/{toxic_name}", proxy.name),
                None,
            )
            .await?;
        check_status(status, &body, &format!("{}/{toxic_name}", proxy.name))
    }

    async fn save(&self, proxy: &Proxy) -> DaemonResult<()> {
        let (status, body) = self
            .send_json(Method::POST, &format!("/proxies/{}", proxy.name), proxy)
            .await?;
        check_status(status, &body, &proxy.name)
    }
}
