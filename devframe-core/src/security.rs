// Target validation for anything that makes server-side requests

use crate::error::{ProxyError, Result};
use std::net::{Ipv4Addr, Ipv6Addr};
use url::{Host, Url};

/// Cloud instance-metadata hostnames.
const METADATA_HOSTS: &[&str] = &[
    "metadata.google.internal",
    "metadata.goog",
    "metadata.azure.com",
    "instance-data",
    "instance-data.ec2.internal",
];

const METADATA_IPV4: &[Ipv4Addr] = &[
    Ipv4Addr::new(169, 254, 169, 254),
    Ipv4Addr::new(169, 254, 170, 2),
    Ipv4Addr::new(100, 100, 100, 200),
];

const METADATA_IPV6: &[Ipv6Addr] = &[Ipv6Addr::new(0xfd00, 0x0ec2, 0, 0, 0, 0, 0, 0x0254)];

pub fn is_metadata_host(host: &Host<&str>) -> bool {
    match host {
        Host::Domain(domain) => {
            let domain = domain.trim_end_matches('.').to_ascii_lowercase();
            METADATA_HOSTS.contains(&domain.as_str())
        }
        Host::Ipv4(ip) => METADATA_IPV4.contains(ip),
        Host::Ipv6(ip) => {
            METADATA_IPV6.contains(ip)
                || ip
                    .to_ipv4_mapped()
                    .is_some_and(|v4| METADATA_IPV4.contains(&v4))
        }
    }
}

/// Parse an absolute `http`/`https` URL that is safe for the server to fetch or browse.
pub fn validate_target_url(raw: &str) -> Result<Url> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ProxyError::InvalidTarget("URL is required".to_string()));
    }

    let url = Url::parse(raw).map_err(|e| ProxyError::InvalidTarget(format!("{}: {}", raw, e)))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ProxyError::InvalidTarget(format!(
            "only http and https URLs are allowed, got {}",
            url.scheme()
        )));
    }

    let Some(host) = url.host() else {
        return Err(ProxyError::InvalidTarget(format!("{} has no host", raw)));
    };
    if is_metadata_host(&host) {
        return Err(ProxyError::InvalidTarget(format!(
            "{} is a cloud metadata address",
            host
        )));
    }

    Ok(url)
}
