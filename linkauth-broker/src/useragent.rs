//! Device description from request metadata
//!
//! Only the coarse facts shown in a session list are extracted: operating
//! system, browser and whether the device is mobile.

use std::net::{IpAddr, SocketAddr};

use woothee::parser::{Parser, WootheeResult};

use crate::store::ClientMetadata;

/// woothee's marker for a field it could not determine
const WOOTHEE_UNKNOWN: &str = "UNKNOWN";

const UNKNOWN: &str = "Unknown";

/// Coarse device facts for one user agent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub os: String,
    pub browser: String,
    pub is_mobile: bool,
}

impl Device {
    pub fn parse(user_agent: &str) -> Self {
        match Parser::new().parse(user_agent) {
            Some(result) => Self::from_woothee(&result),
            None => Self::unknown(),
        }
    }

    fn unknown() -> Self {
        Self {
            os: UNKNOWN.to_string(),
            browser: UNKNOWN.to_string(),
            is_mobile: false,
        }
    }

    fn from_woothee(result: &WootheeResult<'_>) -> Self {
        Self {
            os: os_label(result.os, &result.os_version),
            browser: with_version(result.name, result.version),
            is_mobile: matches!(result.category, "smartphone" | "mobilephone"),
        }
    }
}

fn known(value: &str) -> Option<&str> {
    (!value.is_empty() && value != WOOTHEE_UNKNOWN).then_some(value)
}

fn with_version(name: &str, version: &str) -> String {
    match (known(name), known(version)) {
        (Some(name), Some(version)) => format!("{} {}", name, version),
        (Some(name), None) => name.to_string(),
        (None, _) => UNKNOWN.to_string(),
    }
}

/// Windows names already carry the release; its NT kernel version is noise
fn os_label(os: &str, version: &str) -> String {
    if os.starts_with("Windows") {
        return known(os).unwrap_or(UNKNOWN).to_string();
    }
    with_version(os, version)
}

/// Client IP: first `X-Forwarded-For` hop when one is passed, else the peer address
pub fn client_ip(peer: Option<SocketAddr>, forwarded_for: Option<&str>) -> String {
    let forwarded = forwarded_for
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|v| {
            v.parse::<SocketAddr>()
                .map(|addr| addr.ip().to_string())
                .or_else(|_| v.parse::<IpAddr>().map(|ip| ip.to_string()))
                .unwrap_or_else(|_| v.to_string())
        });

    forwarded
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_default()
}

impl ClientMetadata {
    /// `forwarded_for` must only be passed when the broker sits behind a trusted proxy
    pub fn from_request(peer: Option<SocketAddr>, forwarded_for: Option<&str>, user_agent: &str) -> Self {
        let device = Device::parse(user_agent);
        Self {
            ip: client_ip(peer, forwarded_for),
            os: device.os,
            browser: device.browser,
            is_mobile: device.is_mobile,
        }
    }
}
