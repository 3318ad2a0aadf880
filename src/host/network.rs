//! Appliance network endpoints

use crate::host::{HostError, PackageEndpoint, ReachabilityProbe};
use async_trait::async_trait;
use regex::Regex;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::debug;

/// Reachability probe that opens a TCP connection
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpProbe;

#[async_trait]
impl ReachabilityProbe for TcpProbe {
    async fn reachable(&self, ip: Ipv4Addr, port: u16, timeout: Duration) -> bool {
        let addr = SocketAddr::from((ip, port));
        match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                debug!("Connecting to {} failed: {}", addr, e);
                false
            }
            Err(_) => {
                debug!("Connecting to {} timed out after {:?}", addr, timeout);
                false
            }
        }
    }
}

/// HTTP client for the appliance package endpoint
#[derive(Debug, Clone, Default)]
pub struct HttpPackageEndpoint {
    client: reqwest::Client,
}

impl HttpPackageEndpoint {
    pub fn new() -> Self {
        Self::default()
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response, HostError> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(HostError::Http(format!("HTTP {} from {}", response.status(), url)));
        }
        Ok(response)
    }
}

#[async_trait]
impl PackageEndpoint for HttpPackageEndpoint {
    async fn fetch_index(&self, url: &str) -> Result<String, HostError> {
        let body = self.get(url).await?.text().await?;
        Ok(body)
    }

    async fn install_archive(&self, url: &str, dest: &Path) -> Result<(), HostError> {
        let bytes = self.get(url).await?.bytes().await?;
        debug!("Downloaded {} bytes from {}", bytes.len(), url);

        let dest = dest.to_path_buf();
        tokio::task::spawn_blocking(move || unpack_tar_gz(&bytes, &dest))
            .await
            .map_err(|e| HostError::Filesystem(format!("unpack task failed: {}", e)))?
    }
}

/// Unpack a gzip'd tarball into `dest`
pub fn unpack_tar_gz(data: &[u8], dest: &Path) -> Result<(), HostError> {
    std::fs::create_dir_all(dest).map_err(|e| HostError::io(dest, e))?;
    let decoder = flate2::read::GzDecoder::new(data);
    let mut archive = tar::Archive::new(decoder);
    archive.set_preserve_permissions(true);
    archive.unpack(dest).map_err(|e| HostError::io(dest, e))
}

/// Find the newest version of `package` listed in a package index page
///
/// Entries look like `tvault-contego-4.1.94/`; trailing dots left over from
/// archive suffixes are dropped.
pub fn parse_latest_version(index: &str, package: &str) -> Option<String> {
    let pattern = format!(r"{}-\s*([\d.]+)", regex::escape(package));
    let re = Regex::new(&pattern).ok()?;

    re.captures_iter(index)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().trim_matches('.').to_string())
        .filter(|v| !v.is_empty())
        .max_by(|a, b| version_key(a).cmp(&version_key(b)))
}

fn version_key(version: &str) -> Vec<u64> {
    version
        .split('.')
        .map(|part| part.parse::<u64>().unwrap_or(0))
        .collect()
}
