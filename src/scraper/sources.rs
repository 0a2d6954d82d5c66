//! Remote text-list sources.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::domain::{Protocol, ProxyCandidate};
use crate::infra::ShutdownSignal;

use super::{parse_proxy_list, Source, SourceError};

/// Sent on every fetch; the public list hosts block obvious bots.
pub const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Build the HTTP client shared by all text-list sources.
pub fn http_client() -> reqwest::Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(FETCH_TIMEOUT)
        .build()
}

/// A raw text file of `host:port` lines at a fixed URL, with the protocol
/// declared out-of-band at registration.
pub struct TextListSource {
    name: String,
    url: String,
    protocol: Option<Protocol>,
    client: Client,
}

impl TextListSource {
    pub fn new(
        client: Client,
        name: impl Into<String>,
        url: impl Into<String>,
        protocol: Protocol,
    ) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            protocol: Some(protocol),
            client,
        }
    }
}

#[async_trait]
impl Source for TextListSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(
        &self,
        shutdown: &ShutdownSignal,
    ) -> Result<Vec<ProxyCandidate>, SourceError> {
        let response = tokio::select! {
            _ = shutdown.wait() => return Err(SourceError::Cancelled),
            response = self.client.get(&self.url).send() => {
                response.map_err(SourceError::Unavailable)?
            }
        };

        if !response.status().is_success() {
            return Err(SourceError::Status(response.status()));
        }

        let body = tokio::select! {
            _ = shutdown.wait() => return Err(SourceError::Cancelled),
            body = response.bytes() => body.map_err(SourceError::Unavailable)?,
        };
        let payload = std::str::from_utf8(&body)
            .map_err(|err| SourceError::Malformed(err.to_string()))?;

        // A list that currently parses to nothing is a successful empty
        // fetch, not a malformed payload; bad lines are skipped silently.
        Ok(parse_proxy_list(payload, self.protocol))
    }
}

/// The production source registry: public raw lists, each hard-coding its
/// protocol. HTTPS capability is only ever declared here, never detected.
pub fn default_sources(client: &Client) -> Vec<Arc<dyn Source>> {
    let entries: [(&str, &str, Protocol); 16] = [
        (
            "TheSpeedX-HTTP",
            "https://raw.githubusercontent.com/TheSpeedX/PROXY-LIST/master/http.txt",
            Protocol::Http,
        ),
        (
            "TheSpeedX-SOCKS4",
            "https://raw.githubusercontent.com/TheSpeedX/PROXY-LIST/master/socks4.txt",
            Protocol::Socks4,
        ),
        (
            "TheSpeedX-SOCKS5",
            "https://raw.githubusercontent.com/TheSpeedX/PROXY-LIST/master/socks5.txt",
            Protocol::Socks5,
        ),
        (
            "ProxyScraper-HTTP",
            "https://raw.githubusercontent.com/ProxyScraper/ProxyScraper/refs/heads/main/http.txt",
            Protocol::Http,
        ),
        (
            "ProxyScraper-SOCKS4",
            "https://raw.githubusercontent.com/ProxyScraper/ProxyScraper/refs/heads/main/socks4.txt",
            Protocol::Socks4,
        ),
        (
            "ProxyScraper-SOCKS5",
            "https://raw.githubusercontent.com/ProxyScraper/ProxyScraper/refs/heads/main/socks5.txt",
            Protocol::Socks5,
        ),
        (
            "monosans-HTTP",
            "https://raw.githubusercontent.com/monosans/proxy-list/main/proxies/http.txt",
            Protocol::Http,
        ),
        (
            "monosans-SOCKS4",
            "https://raw.githubusercontent.com/monosans/proxy-list/main/proxies/socks4.txt",
            Protocol::Socks4,
        ),
        (
            "monosans-SOCKS5",
            "https://raw.githubusercontent.com/monosans/proxy-list/main/proxies/socks5.txt",
            Protocol::Socks5,
        ),
        (
            "komutan234-HTTP",
            "https://raw.githubusercontent.com/komutan234/Proxy-List-Free/main/proxies/http.txt",
            Protocol::Http,
        ),
        (
            "komutan234-SOCKS4",
            "https://raw.githubusercontent.com/komutan234/Proxy-List-Free/main/proxies/socks4.txt",
            Protocol::Socks4,
        ),
        (
            "komutan234-SOCKS5",
            "https://raw.githubusercontent.com/komutan234/Proxy-List-Free/main/proxies/socks5.txt",
            Protocol::Socks5,
        ),
        (
            "hookzof-SOCKS5",
            "https://raw.githubusercontent.com/hookzof/socks5_list/master/proxy.txt",
            Protocol::Socks5,
        ),
        (
            "sunny9577-HTTP",
            "https://sunny9577.github.io/proxy-scraper/generated/http_proxies.txt",
            Protocol::Http,
        ),
        (
            "sunny9577-SOCKS4",
            "https://sunny9577.github.io/proxy-scraper/generated/socks4_proxies.txt",
            Protocol::Socks4,
        ),
        (
            "sunny9577-SOCKS5",
            "https://sunny9577.github.io/proxy-scraper/generated/socks5_proxies.txt",
            Protocol::Socks5,
        ),
    ];

    entries
        .into_iter()
        .map(|(name, url, protocol)| {
            Arc::new(TextListSource::new(client.clone(), name, url, protocol)) as Arc<dyn Source>
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn registry_names_are_unique() {
        let client = http_client().unwrap();
        let sources = default_sources(&client);
        let names: HashSet<&str> = sources.iter().map(|s| s.name()).collect();
        assert_eq!(names.len(), sources.len());
    }

    #[test]
    fn registry_covers_all_declared_protocols() {
        let client = http_client().unwrap();
        assert_eq!(default_sources(&client).len(), 16);
    }
}
