//! Click enrichment: User-Agent parsing, device classification and referer host
//!
//! Every function here is total: unparseable input yields empty strings or the
//! desktop default, never an error.

use url::Url;
use woothee::parser::Parser;

use crate::analytics::models::DeviceType;

/// Browser / OS information extracted from a User-Agent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserAgentInfo {
    pub browser: String,
    pub browser_version: String,
    pub os: String,
    pub device_type: DeviceType,
}

const UNKNOWN: &str = "UNKNOWN";

fn known(value: &str) -> String {
    if value == UNKNOWN {
        String::new()
    } else {
        value.to_string()
    }
}

/// Parse a User-Agent with woothee.
///
/// Device precedence: crawler → `Bot`, then smartphone/mobilephone →
/// `Mobile`, everything else → `Desktop`.
pub fn parse_user_agent(user_agent: &str) -> UserAgentInfo {
    let Some(result) = Parser::new().parse(user_agent) else {
        return UserAgentInfo {
            browser: String::new(),
            browser_version: String::new(),
            os: String::new(),
            device_type: DeviceType::Desktop,
        };
    };

    let device_type = match result.category {
        "crawler" => DeviceType::Bot,
        "smartphone" | "mobilephone" => DeviceType::Mobile,
        _ => DeviceType::Desktop,
    };

    UserAgentInfo {
        browser: known(result.name),
        browser_version: known(result.version),
        os: known(result.os),
        device_type,
    }
}

/// Hostname of a referer URL; empty if the referer is empty or unparseable.
pub fn referer_host(referer: &str) -> String {
    if referer.is_empty() {
        return String::new();
    }

    Url::parse(referer)
        .ok()
        .and_then(|url| url.host_str().map(str::to_string))
        .unwrap_or_default()
}
