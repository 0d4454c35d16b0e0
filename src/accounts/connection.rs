//! Client connection details shown alongside managed accounts

use crate::textfile;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

/// Shown when the domain file is absent or empty
pub const DOMAIN_NOT_SET: &str = "Not Set";

/// Shown when the public IP cannot be determined
pub const IP_UNKNOWN: &str = "Unknown";

const PUBLIC_IP_PROBE_URL: &str = "https://ifconfig.me";

/// Front host placeholder clients replace with their own SNI host
const FRONT_HOST_PLACEHOLDER: &str = "example.com";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ports {
    pub ssh_ws: u16,
    pub ssh_ssl_ws: u16,
    pub ssl_tls: u16,
    pub squid: u16,
    pub udpgw: Vec<u16>,
}

impl Default for Ports {
    fn default() -> Self {
        Self {
            ssh_ws: 80,
            ssh_ssl_ws: 443,
            ssl_tls: 443,
            squid: 8080,
            udpgw: vec![7200, 7300],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Payloads {
    pub wss: String,
    pub ws: String,
}

impl Payloads {
    pub fn for_domain(domain: &str) -> Self {
        Self {
            wss: format!(
                "GET wss://{} HTTP/1.1[crlf]Host: {}[crlf]Upgrade: websocket[crlf][crlf]",
                FRONT_HOST_PLACEHOLDER, domain
            ),
            ws: format!(
                "GET / HTTP/1.1[crlf]Host: {}[crlf]Upgrade: websocket[crlf][crlf]",
                domain
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionInfo {
    pub domain: String,
    pub public_ip: String,
    pub ports: Ports,
    pub payloads: Payloads,
}

/// Reads the configured domain and resolves the public address
pub struct ConnectionSource {
    domain_file: PathBuf,
    public_ip: Option<String>,
    http: reqwest::Client,
}

impl ConnectionSource {
    pub fn new(domain_file: PathBuf, public_ip: Option<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_default();

        Self {
            domain_file,
            public_ip,
            http,
        }
    }

    pub fn domain(&self) -> String {
        match textfile::read_optional(&self.domain_file) {
            Ok(Some(content)) if !content.trim().is_empty() => content.trim().to_string(),
            _ => DOMAIN_NOT_SET.to_string(),
        }
    }

    /// Configured address, else a probe of an external echo service
    pub async fn public_ip(&self) -> String {
        if let Some(ip) = &self.public_ip {
            return ip.clone();
        }

        let probe = async {
            let response = self.http.get(PUBLIC_IP_PROBE_URL).send().await?;
            response.error_for_status()?.text().await
        };

        match probe.await {
            Ok(body) if !body.trim().is_empty() => body.trim().to_string(),
            Ok(_) => IP_UNKNOWN.to_string(),
            Err(e) => {
                debug!("Public IP probe failed: {}", e);
                IP_UNKNOWN.to_string()
            }
        }
    }

    pub async fn info(&self) -> ConnectionInfo {
        let domain = self.domain();
        ConnectionInfo {
            payloads: Payloads::for_domain(&domain),
            public_ip: self.public_ip().await,
            ports: Ports::default(),
            domain,
        }
    }
}
