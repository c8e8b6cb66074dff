//! API client library.
//!
//! A small reqwest client for the gateway's HTTP API, used by the CLI. Error
//! replies from the server are JSON too, so bodies are decoded regardless of
//! the HTTP status and the caller decides what to show.

use reqwest::{Client, Url};
use serde::de::DeserializeOwned;

use crate::{
    api::v1::{ActionResponse, CommandRequest, CommandResponse, PortsResponse, StatusResponse},
    error::{Error, Result},
};

/// Default address of a local daemon.
pub const DEFAULT_URL: &str = "http://127.0.0.1:5000";

/// Client for one gateway daemon.
#[derive(Debug, Clone)]
pub struct ApiClient {
    base: Url,
    http: Client,
}

impl ApiClient {
    pub fn new(base: &str) -> Result<Self> {
        let base = Url::parse(base).map_err(|e| Error::Api(format!("invalid URL {base}: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(Error::Api(format!("{base} cannot be used as a base URL")));
        }
        Ok(Self {
            base,
            http: Client::new(),
        })
    }

    pub async fn status(&self) -> Result<StatusResponse> {
        self.get(&["status"]).await
    }

    pub async fn ports(&self) -> Result<PortsResponse> {
        self.get(&["ports"]).await
    }

    /// Connect to `port`, or to the remembered/discovered port if `None`.
    pub async fn connect(&self, port: Option<&str>) -> Result<ActionResponse> {
        match port {
            Some(port) => self.post(&["connect", port], None).await,
            None => self.post(&["connect"], None).await,
        }
    }

    pub async fn disconnect(&self) -> Result<ActionResponse> {
        self.post(&["disconnect"], None).await
    }

    pub async fn led(&self, on: bool) -> Result<CommandResponse> {
        self.post(&["led", if on { "on" } else { "off" }], None).await
    }

    pub async fn send(&self, command: char) -> Result<CommandResponse> {
        let request = CommandRequest {
            command: command.to_string(),
        };
        self.post(&["command"], Some(&request)).await
    }

    /// URL for `/api/v1/<segments>`. Each segment is percent-encoded, so
    /// port names like `/dev/ttyUSB0` stay a single segment.
    pub fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(["api", "v1"]).extend(segments);
        }
        url
    }

    async fn get<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T> {
        let response = self
            .http
            .get(self.endpoint(segments))
            .send()
            .await
            .map_err(api_error)?;
        response.json().await.map_err(api_error)
    }

    async fn post<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        body: Option<&CommandRequest>,
    ) -> Result<T> {
        let mut request = self.http.post(self.endpoint(segments));
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await.map_err(api_error)?;
        response.json().await.map_err(api_error)
    }
}

fn api_error(e: reqwest::Error) -> Error {
    Error::Api(e.to_string())
}
