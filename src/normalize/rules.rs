//! The individual extraction rules.

use std::net::Ipv4Addr;
use std::sync::LazyLock;

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use regex::Regex;

use super::{CandidateSet, ProxyProtocol};

// Every scheme must start a word, so `ss://` is not found inside `vless://`.
static SCHEME_URI_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?P<scheme>socks5|socks4|http|https|mtproto|ss)://(?:[\w.~%-]+:[\w.~%-]+@)?(?P<host>[a-zA-Z0-9_.-]+):(?P<port>\d{2,5})",
    )
    .expect("invalid regex")
});

static SS_URI_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bss://(?P<payload>[A-Za-z0-9+/=_-]+)(?:@(?P<host>[a-zA-Z0-9_.-]+):(?P<port>\d{2,5}))?")
        .expect("invalid regex")
});

static VMESS_URI_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bvmess://(?P<payload>[A-Za-z0-9+/=_-]+)")
        .expect("invalid regex")
});

static SERVER_FRAGMENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""server"\s*:\s*"(?P<host>[^"]+)"\s*,\s*"server_port"\s*:\s*"?(?P<port>\d{2,5})"#)
        .expect("invalid regex")
});

static WHITESPACE_PAIR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*(?P<host>\d{1,3}(?:\.\d{1,3}){3})[ \t]+(?P<port>\d{2,5})[ \t]*\r?$")
        .expect("invalid regex")
});

static BARE_PAIR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?P<host>(?:\d{1,3}\.){3}\d{1,3}):(?P<port>\d{2,5})")
        .expect("invalid regex")
});

/// Accepts padded, unpadded and sloppily padded input with non-canonical trailing bits.
fn lenient_config() -> GeneralPurposeConfig {
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true)
}

static STANDARD_LENIENT: LazyLock<GeneralPurpose> =
    LazyLock::new(|| GeneralPurpose::new(&alphabet::STANDARD, lenient_config()));
static URL_SAFE_LENIENT: LazyLock<GeneralPurpose> =
    LazyLock::new(|| GeneralPurpose::new(&alphabet::URL_SAFE, lenient_config()));

pub(super) fn decode_base64(payload: &str) -> Option<String> {
    let payload = payload.trim();
    let bytes = STANDARD_LENIENT
        .decode(payload)
        .or_else(|_| URL_SAFE_LENIENT.decode(payload))
        .ok()?;
    Some(String::from_utf8_lossy(&bytes).into_owned())
}

/// Parses a port in 1..=65535.
fn parse_port(raw: &str) -> Option<u16> {
    raw.trim().parse::<u16>().ok().filter(|p| *p > 0)
}

/// Hostname, IPv4 literal or bracketed IPv6 literal.
fn is_plausible_host(host: &str) -> bool {
    !host.is_empty()
        && host
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | ':' | '[' | ']'))
}

fn is_ipv4(host: &str) -> bool {
    host.parse::<Ipv4Addr>().is_ok()
}

/// Rule 1: `scheme://[user:pass@]host:port`. Credentials are dropped.
pub(super) fn scheme_uris(text: &str, set: &mut CandidateSet<'_>) {
    for caps in SCHEME_URI_RE.captures_iter(text) {
        let Ok(protocol) = caps["scheme"].parse::<ProxyProtocol>() else {
            continue;
        };
        if let Some(port) = parse_port(&caps["port"]) {
            set.push(protocol, &caps["host"], port);
        }
    }
}

/// Rule 2: Shadowsocks share links.
///
/// Handles both the legacy form, where the whole `method:password@host:port`
/// is base64, and the form with only the credentials encoded.
pub(super) fn shadowsocks_uris(text: &str, set: &mut CandidateSet<'_>) {
    for caps in SS_URI_RE.captures_iter(text) {
        if let (Some(host), Some(port)) = (caps.name("host"), caps.name("port")) {
            if let Some(port) = parse_port(port.as_str()) {
                set.push(ProxyProtocol::Shadowsocks, host.as_str(), port);
            }
            continue;
        }

        let Some(decoded) = decode_base64(&caps["payload"]) else {
            continue;
        };
        let server_part = decoded.rsplit_once('@').map_or(decoded.as_str(), |(_, server)| server);
        let Some((host, port)) = server_part.trim().rsplit_once(':') else {
            continue;
        };
        if let Some(port) = parse_port(port) {
            if is_plausible_host(host) {
                set.push(ProxyProtocol::Shadowsocks, host, port);
            }
        }
    }
}

/// Rule 3: loosely matched `"server": "...", "server_port": N` fragments.
pub(super) fn server_fragments(text: &str, set: &mut CandidateSet<'_>) {
    for caps in SERVER_FRAGMENT_RE.captures_iter(text) {
        let host = caps["host"].trim();
        if let Some(port) = parse_port(&caps["port"]) {
            if is_plausible_host(host) {
                set.push(ProxyProtocol::Shadowsocks, host, port);
            }
        }
    }
}

/// Rule 4: VMess share links carrying a base64 JSON document.
pub(super) fn vmess_uris(text: &str, set: &mut CandidateSet<'_>) {
    for caps in VMESS_URI_RE.captures_iter(text) {
        let Some(decoded) = decode_base64(&caps["payload"]) else {
            continue;
        };
        let Ok(document) = serde_json::from_str::<serde_json::Value>(&decoded) else {
            continue;
        };
        let host = match document.get("add") {
            Some(serde_json::Value::String(s)) => s.trim().to_string(),
            _ => continue,
        };
        // Share-link generators disagree on whether the port is a number or a string.
        let port = match document.get("port") {
            Some(serde_json::Value::Number(n)) => n.as_u64().and_then(|p| u16::try_from(p).ok()),
            Some(serde_json::Value::String(s)) => parse_port(s),
            _ => None,
        };
        if let Some(port) = port.filter(|p| *p > 0) {
            if is_plausible_host(&host) {
                set.push(ProxyProtocol::VMess, &host, port);
            }
        }
    }
}

/// Rule 5: one `ipv4<space|tab>port` pair per line.
pub(super) fn whitespace_pairs(text: &str, default: ProxyProtocol, set: &mut CandidateSet<'_>) {
    for caps in WHITESPACE_PAIR_RE.captures_iter(text) {
        let host = &caps["host"];
        if !is_ipv4(host) {
            continue;
        }
        if let Some(port) = parse_port(&caps["port"]) {
            set.push(default, host, port);
        }
    }
}

/// Rule 6: bare `ipv4:port` that is not part of a URI or a longer token.
pub(super) fn bare_pairs(text: &str, default: ProxyProtocol, set: &mut CandidateSet<'_>) {
    for caps in BARE_PAIR_RE.captures_iter(text) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        let before = text[..whole.start()].chars().next_back();
        if before.is_some_and(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '/' | '@' | ':')) {
            continue;
        }
        let after = text[whole.end()..].chars().next();
        if after.is_some_and(|c| c.is_ascii_digit()) {
            continue;
        }

        let host = &caps["host"];
        if !is_ipv4(host) {
            continue;
        }
        if let Some(port) = parse_port(&caps["port"]) {
            set.push(default, host, port);
        }
    }
}
