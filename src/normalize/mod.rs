//! Candidate extraction from raw text.
//!
//! [`extract`] runs six independent rules over the same text and merges the
//! results, deduplicated by `(protocol, host, port)` with the first
//! occurrence kept:
//!
//! 1. `scheme://[user:pass@]host:port`
//! 2. `ss://<base64 of method:password@host:port>` (and `ss://<b64>@host:port`)
//! 3. `"server": "<host>", "server_port": <port>` fragments
//! 4. `vmess://<base64 of a JSON document with add/port>`
//! 5. `<ipv4> <port>` lines, space or tab separated
//! 6. bare `<ipv4>:<port>` outside of any URI
//!
//! Rules 5 and 6 carry no scheme and use the caller's default protocol.
//! Malformed matches are skipped one by one.

mod rules;


use std::collections::HashSet;
use std::fmt;

use serde::Serialize;
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

/// Closed set of proxy protocols the pipeline understands.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display, EnumString, AsRefStr, EnumIter,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum ProxyProtocol {
    /// Plain HTTP proxy
    Http,
    /// HTTP proxy reached over TLS
    Https,
    Socks4,
    Socks5,
    /// Telegram MTProto proxy
    MtProto,
    #[strum(serialize = "ss")]
    #[serde(rename = "ss")]
    Shadowsocks,
    VMess,
}

/// How liveness of a protocol is established.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationStrategy {
    /// GET a verification endpoint through the candidate as an HTTP proxy.
    FullProxy,
    /// GET a verification endpoint through the candidate as a SOCKS proxy.
    TunneledProxy,
    /// Open a TCP connection and nothing more.
    ///
    /// This only proves that something listens on the port, not that the
    /// proxy works: no handshake is attempted for these protocols.
    ConnectivityOnly,
}

impl ProxyProtocol {
    /// Total mapping from protocol to validation strategy.
    pub fn strategy(self) -> ValidationStrategy {
        match self {
            ProxyProtocol::Http | ProxyProtocol::Https => ValidationStrategy::FullProxy,
            ProxyProtocol::Socks4 | ProxyProtocol::Socks5 => ValidationStrategy::TunneledProxy,
            ProxyProtocol::MtProto | ProxyProtocol::Shadowsocks | ProxyProtocol::VMess => {
                ValidationStrategy::ConnectivityOnly
            }
        }
    }
}

/// A syntactically extracted, not yet verified proxy endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndpointCandidate {
    pub protocol: ProxyProtocol,
    pub host: String,
    pub port: u16,
    /// Identifier of the document the candidate was found in
    pub source: String,
}

/// Identity of an endpoint: `(protocol, host, port)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EndpointKey {
    pub protocol: ProxyProtocol,
    pub host: String,
    pub port: u16,
}

impl EndpointCandidate {
    pub fn key(&self) -> EndpointKey {
        EndpointKey {
            protocol: self.protocol,
            host: self.host.clone(),
            port: self.port,
        }
    }
}

impl fmt::Display for EndpointCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.protocol, self.host, self.port)
    }
}

/// Accumulates candidates, keeping the first occurrence of every key.
struct CandidateSet<'a> {
    source: &'a str,
    seen: HashSet<EndpointKey>,
    out: Vec<EndpointCandidate>,
}

impl<'a> CandidateSet<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            seen: HashSet::new(),
            out: Vec::new(),
        }
    }

    fn push(&mut self, protocol: ProxyProtocol, host: &str, port: u16) {
        let key = EndpointKey {
            protocol,
            host: host.to_string(),
            port,
        };
        if self.seen.insert(key) {
            self.out.push(EndpointCandidate {
                protocol,
                host: host.to_string(),
                port,
                source: self.source.to_string(),
            });
        }
    }
}

/// Extracts every endpoint candidate found in `text`.
///
/// # Arguments
///
/// * `text` - Raw document body
/// * `source` - Identifier recorded on every candidate
/// * `default_protocol` - Protocol for scheme-less matches (rules 5 and 6)
///
/// # Returns
///
/// Candidates in discovery order, one per `(protocol, host, port)`. Text
/// without any recognizable endpoint yields an empty vector.
pub fn extract(text: &str, source: &str, default_protocol: ProxyProtocol) -> Vec<EndpointCandidate> {
    let mut set = CandidateSet::new(source);
    if text.is_empty() {
        return set.out;
    }

    rules::scheme_uris(text, &mut set);
    rules::shadowsocks_uris(text, &mut set);
    rules::server_fragments(text, &mut set);
    rules::vmess_uris(text, &mut set);
    rules::whitespace_pairs(text, default_protocol, &mut set);
    rules::bare_pairs(text, default_protocol, &mut set);

    set.out
}

/// Merges per-document candidate lists, deduplicating by key across sources.
///
/// The first occurrence wins. A non-zero `limit` caps the result length.
pub fn prepare_candidates<I>(batches: I, limit: usize) -> Vec<EndpointCandidate>
where
    I: IntoIterator<Item = Vec<EndpointCandidate>>,
{
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for candidate in batches.into_iter().flatten() {
        if limit > 0 && out.len() >= limit {
            break;
        }
        if seen.insert(candidate.key()) {
            out.push(candidate);
        }
    }
    out
}
