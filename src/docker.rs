//! Container metadata from the Docker Engine API.
//!
//! A minimal HTTP/1.0 client over the daemon's unix socket: list the running
//! containers, inspect each one for its init PID, and turn the result into the
//! [`ContainerLabelCache`] used to label cgroup and network samples. Every
//! request is bounded by the configured timeout.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::{Config, DEFAULT_DOCKER_TIMEOUT_MS};
use crate::identity::{ContainerInfo, ContainerLabelCache};

#[derive(Debug, Error)]
pub enum DockerError {
    #[error("failed to connect to {path}: {source}")]
    Connect {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error talking to the Docker daemon: {0}")]
    Io(#[from] std::io::Error),

    #[error("timed out after {timeout_ms}ms waiting for {request}")]
    Timeout { request: String, timeout_ms: u64 },

    #[error("Docker API returned '{status}' for {request}")]
    Status { request: String, status: String },

    #[error("invalid HTTP response from Docker")]
    MalformedResponse,

    #[error("failed to decode Docker API response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Entry of `GET /containers/json`.
#[derive(Debug, Clone, Deserialize)]
pub struct ContainerSummary {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "Names", default)]
    pub names: Vec<String>,
    #[serde(rename = "Image", default)]
    pub image: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContainerState {
    #[serde(rename = "Pid", default)]
    pub pid: i64,
}

/// The parts of `GET /containers/<id>/json` we use.
#[derive(Debug, Clone, Deserialize)]
pub struct ContainerDetails {
    #[serde(rename = "Name", default)]
    pub name: String,
    #[serde(rename = "State", default)]
    pub state: ContainerState,
}

/// Splits a raw HTTP response and returns the body of a `200` reply.
pub fn response_body<'a>(request: &str, raw: &'a [u8]) -> Result<&'a [u8], DockerError> {
    let header_end = raw
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .ok_or(DockerError::MalformedResponse)?;
    let head = std::str::from_utf8(&raw[..header_end]).map_err(|_| DockerError::MalformedResponse)?;

    let status_line = head.lines().next().unwrap_or_default();
    let mut parts = status_line.splitn(3, ' ');
    let (Some(version), Some(code)) = (parts.next(), parts.next()) else {
        return Err(DockerError::MalformedResponse);
    };
    if !version.starts_with("HTTP/") {
        return Err(DockerError::MalformedResponse);
    }
    if code != "200" {
        return Err(DockerError::Status {
            request: request.to_string(),
            status: status_line.trim_start_matches(version).trim().to_string(),
        });
    }
    Ok(&raw[header_end + 4..])
}

/// Minimal HTTP client for the Docker Engine API over a unix socket.
#[derive(Debug, Clone)]
pub struct DockerClient {
    socket: PathBuf,
    timeout: Duration,
}

impl DockerClient {
    pub fn new(socket: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            socket: socket.into(),
            timeout,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let timeout_ms = config.docker_timeout_ms.unwrap_or(DEFAULT_DOCKER_TIMEOUT_MS);
        Self::new(config.docker_socket(), Duration::from_millis(timeout_ms))
    }

    pub fn socket(&self) -> &Path {
        &self.socket
    }

    /// Sends a GET request and returns the response body.
    pub async fn get(&self, request: &str) -> Result<Vec<u8>, DockerError> {
        match timeout(self.timeout, self.round_trip(request)).await {
            Ok(result) => result,
            Err(_) => Err(DockerError::Timeout {
                request: request.to_string(),
                timeout_ms: self.timeout.as_millis() as u64,
            }),
        }
    }

    async fn round_trip(&self, request: &str) -> Result<Vec<u8>, DockerError> {
        let mut stream = UnixStream::connect(&self.socket)
            .await
            .map_err(|source| DockerError::Connect {
                path: self.socket.clone(),
                source,
            })?;

        // The daemon closes the connection after the body.
        let head = format!(
            "GET {} HTTP/1.0\r\nHost: localhost\r\nAccept: application/json\r\nConnection: close\r\n\r\n",
            request
        );
        stream.write_all(head.as_bytes()).await?;

        let mut raw = Vec::new();
        stream.read_to_end(&mut raw).await?;
        Ok(response_body(request, &raw)?.to_vec())
    }

    pub async fn list_containers(&self) -> Result<Vec<ContainerSummary>, DockerError> {
        let body = self.get("/containers/json").await?;
        Ok(serde_json::from_slice(&body)?)
    }

    pub async fn inspect_container(&self, id: &str) -> Result<ContainerDetails, DockerError> {
        let body = self.get(&format!("/containers/{}/json", id)).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Lists running containers with their names, images and init PIDs.
    /// Containers that cannot be inspected are left out.
    pub async fn containers(&self) -> Result<Vec<ContainerInfo>, DockerError> {
        let summaries = self.list_containers().await?;
        let mut containers = Vec::with_capacity(summaries.len());

        for summary in summaries {
            match self.inspect_container(&summary.id).await {
                Ok(details) => {
                    let name = if details.name.is_empty() {
                        summary.names.first().cloned().unwrap_or_default()
                    } else {
                        details.name
                    };
                    containers.push(ContainerInfo {
                        id: summary.id,
                        name,
                        image: summary.image,
                        pid: details.state.pid,
                    });
                }
                Err(e) => debug!(container = %summary.id, error = %e, "inspect failed, skipping"),
            }
        }
        Ok(containers)
    }
}

/// Builds the container label cache for one scrape. Any failure is logged and
/// yields an empty cache, which only removes container labels from the output.
pub async fn load_label_cache(config: &Config) -> ContainerLabelCache {
    if !config.enable_docker.unwrap_or(true) {
        debug!("Docker metadata disabled");
        return ContainerLabelCache::new();
    }

    let client = DockerClient::from_config(config);
    match client.containers().await {
        Ok(containers) => {
            info!(
                socket = %client.socket().display(),
                containers = containers.len(),
                "loaded container metadata"
            );
            ContainerLabelCache::from_containers(containers)
        }
        Err(e) => {
            warn!(socket = %client.socket().display(), error = %e, "container metadata unavailable");
            ContainerLabelCache::new()
        }
    }
}
