//! Product image lookup for shop links.

use std::{
    io,
    net::{IpAddr, SocketAddr},
    sync::{Arc, LazyLock},
    time::Duration,
};

use regex::Regex;
use reqwest::{
    dns::{Addrs, Name, Resolve, Resolving},
    redirect::Policy,
    Response, Url,
};

use crate::error::{AppError, Result};

static OG_IMAGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)<meta[^>]+(?:property|name)\s*=\s*["']og:image(?::secure_url|:url)?["'][^>]*content\s*=\s*["']([^"']+)["']"#,
    )
    .expect("valid regex")
});

static OG_IMAGE_REVERSED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)<meta[^>]+content\s*=\s*["']([^"']+)["'][^>]*(?:property|name)\s*=\s*["']og:image(?::secure_url|:url)?["']"#,
    )
    .expect("valid regex")
});

static TWITTER_IMAGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)<meta[^>]+name\s*=\s*["']twitter:image(?::src)?["'][^>]*content\s*=\s*["']([^"']+)["']"#,
    )
    .expect("valid regex")
});

static IMG_SRC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<img[^>]+src\s*=\s*["']([^"']+)["']"#).expect("valid regex")
});

/// Finds the most likely product image on a page, resolved against `base`.
///
/// Preference: `og:image`, `twitter:image`, then the first non-inline `<img>`.
pub fn extract_image_url(html: &str, base: &Url) -> Option<String> {
    let meta = [&*OG_IMAGE_RE, &*OG_IMAGE_REVERSED_RE, &*TWITTER_IMAGE_RE]
        .into_iter()
        .find_map(|re| re.captures(html).map(|c| c[1].to_string()));

    let candidate = meta.or_else(|| {
        IMG_SRC_RE
            .captures_iter(html)
            .map(|c| c[1].to_string())
            .find(|src| !src.starts_with("data:"))
    })?;

    base.join(candidate.trim().replace("&amp;", "&").as_str())
        .ok()
        .filter(|url| matches!(url.scheme(), "http" | "https"))
        .map(String::from)
}

/// Product pages larger than this are not scanned.
const MAX_PAGE_BYTES: usize = 2 * 1024 * 1024;
const MAX_REDIRECTS: usize = 5;

/// Whether the scraper may connect to `ip`. Loopback, private, link-local,
/// carrier-grade NAT and other non-routable ranges are refused.
fn is_public_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            let [a, b, ..] = v4.octets();
            !(v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_unspecified()
                || v4.is_broadcast()
                || v4.is_multicast()
                || v4.is_documentation()
                || a == 0
                || (a == 100 && (b & 0xc0) == 64))
        }
        IpAddr::V6(v6) => {
            if let Some(v4) = v6.to_ipv4_mapped() {
                return is_public_ip(IpAddr::V4(v4));
            }
            let first = v6.segments()[0];
            !(v6.is_loopback()
                || v6.is_unspecified()
                || v6.is_multicast()
                || (first & 0xfe00) == 0xfc00
                || (first & 0xffc0) == 0xfe80)
        }
    }
}

/// IP literal in the URL host, if the host is one.
fn host_ip(url: &Url) -> Option<IpAddr> {
    url.host_str()?
        .trim_start_matches('[')
        .trim_end_matches(']')
        .parse()
        .ok()
}

/// Resolves `host`. `Ok(None)` means some address it points at is not public.
async fn resolve_public(host: &str) -> io::Result<Option<Vec<SocketAddr>>> {
    let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, 0)).await?.collect();
    Ok(addrs
        .iter()
        .all(|addr| is_public_ip(addr.ip()))
        .then_some(addrs))
}

/// DNS resolver for the scraper's client. Every connection, including
/// redirect hops, goes through it, so a host cannot re-resolve to an
/// internal address after the first check.
struct PublicResolver;

impl Resolve for PublicResolver {
    fn resolve(&self, name: Name) -> Resolving {
        Box::pin(resolve_for_client(name))
    }
}

async fn resolve_for_client(
    name: Name,
) -> std::result::Result<Addrs, Box<dyn std::error::Error + Send + Sync>> {
    match resolve_public(name.as_str()).await? {
        Some(addrs) => Ok(Box::new(addrs.into_iter()) as Addrs),
        None => Err(format!("{} resolves to a non-public address", name.as_str()).into()),
    }
}

fn redirect_policy() -> Policy {
    Policy::custom(|attempt| {
        if attempt.previous().len() >= MAX_REDIRECTS {
            return attempt.error("too many redirects");
        }
        let url = attempt.url();
        let blocked = !matches!(url.scheme(), "http" | "https")
            || host_ip(url).is_some_and(|ip| !is_public_ip(ip));
        if blocked {
            attempt.stop()
        } else {
            attempt.follow()
        }
    })
}

/// Reads at most `limit` bytes of body. Larger pages yield `None`.
async fn read_page(mut response: Response, limit: usize) -> reqwest::Result<Option<String>> {
    if response.content_length().is_some_and(|len| len > limit as u64) {
        return Ok(None);
    }

    let mut body = Vec::new();
    while let Some(chunk) = response.chunk().await? {
        if body.len() + chunk.len() > limit {
            return Ok(None);
        }
        body.extend_from_slice(&chunk);
    }

    Ok(Some(String::from_utf8_lossy(&body).into_owned()))
}

#[derive(Clone)]
pub struct ImageScraper {
    client: reqwest::Client,
}

impl ImageScraper {
    pub fn new(timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(concat!("renobudget/", env!("CARGO_PKG_VERSION")))
            .redirect(redirect_policy())
            .dns_resolver(Arc::new(PublicResolver))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    pub async fn fetch_image_url(&self, link: &str) -> Result<Option<String>> {
        let url = Url::parse(link)
            .map_err(|_| AppError::Validation("Invalid product link".to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(AppError::Validation(
                "Product link must be http or https".to_string(),
            ));
        }
        let host = url
            .host_str()
            .ok_or_else(|| AppError::Validation("Invalid product link".to_string()))?;

        let blocked = match host_ip(&url) {
            Some(ip) => !is_public_ip(ip),
            None => matches!(resolve_public(host).await, Ok(None)),
        };
        if blocked {
            tracing::warn!(link = %url, "Refused product link to a non-public address");
            return Err(AppError::Validation(
                "Product link must point to a public address".to_string(),
            ));
        }

        let response = match self.client.get(url.clone()).send().await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(link = %url, error = %e, "Failed to fetch product page");
                return Ok(None);
            }
        };

        if !response.status().is_success() {
            tracing::warn!(link = %url, status = %response.status(), "Product page returned an error");
            return Ok(None);
        }

        // Redirects may move relative image paths.
        let base = response.url().clone();
        let html = match read_page(response, MAX_PAGE_BYTES).await {
            Ok(Some(body)) => body,
            Ok(None) => {
                tracing::warn!(link = %url, "Product page too large");
                return Ok(None);
            }
            Err(e) => {
                tracing::warn!(link = %url, error = %e, "Failed to read product page");
                return Ok(None);
            }
        };

        Ok(extract_image_url(&html, &base))
    }
}
