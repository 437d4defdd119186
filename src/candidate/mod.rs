
use std::cmp::Ordering;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

use crc::{Crc, CRC_32_ISCSI};

use crate::error::{Error, Result};
use crate::tcp_type::TcpCandidateType;

/// Indicates that the candidate is used for RTP.
pub const COMPONENT_RTP: u32 = 1;
/// Indicates that the candidate is used for RTCP.
pub const COMPONENT_RTCP: u32 = 2;

/// RFC 6544 recommended type preferences for TCP candidates
/// (section 4.2): host, server reflexive, relayed.
pub const TCP_TYPE_PREFERENCE_HOST: u32 = 90;
pub const TCP_TYPE_PREFERENCE_SRFLX: u32 = 75;
pub const TCP_TYPE_PREFERENCE_RELAY: u32 = 60;

const MAX_FOUNDATION_SIZE: usize = 32;

/// One ICE candidate, the value form of an SDP `candidate:` attribute
/// (RFC 5245 section 15.1, with the RFC 6544 TCP extensions).
///
/// A candidate is either decoded from SDP text with
/// [`unmarshal`](Self::unmarshal) or built from a local transport address
/// with [`new`](Self::new)/[`from_addr`](Self::from_addr), and then only
/// read. The string form of the connection address is authoritative; the
/// resolved socket address is a best-effort parse of it.
#[derive(Debug, Clone)]
pub struct IceCandidate {
    foundation: String,
    component_id: u32,
    transport: String,
    priority: u32,
    address: String,
    port: u16,
    resolved_addr: Option<SocketAddr>,
    candidate_type: String,
    rel_addr: String,
    rel_port: u16,
    extensions: Vec<(String, String)>,
    tcp_type: TcpCandidateType,
}

impl IceCandidate {
    /// Creates a host candidate for a local transport address. The
    /// remaining fields keep their defaults until the caller fills them in.
    pub fn new(transport: &str, address: &str, port: u16) -> Self {
        IceCandidate {
            foundation: "0".to_owned(),
            component_id: COMPONENT_RTP,
            transport: transport.to_ascii_uppercase(),
            priority: 0,
            resolved_addr: resolve(address, port),
            address: address.to_owned(),
            port,
            candidate_type: "host".to_owned(),
            rel_addr: String::new(),
            rel_port: 0,
            extensions: Vec::new(),
            tcp_type: TcpCandidateType::Unspecified,
        }
    }

    /// Creates a host candidate from an already-resolved socket address.
    pub fn from_addr(transport: &str, addr: SocketAddr) -> Self {
        let mut candidate = Self::new(transport, &addr.ip().to_string(), addr.port());
        candidate.resolved_addr = Some(addr);
        candidate
    }

    /// Creates a candidate from its SDP attribute value.
    ///
    /// The leading `candidate:` prefix is accepted but not required.
    ///
    /// RFC 5245 - 15.1.  "candidate" Attribute
    /// candidate-attribute   = "candidate" ":" foundation SP component-id SP
    ///                         transport SP
    ///                         priority SP
    ///                         connection-address SP     ;from RFC 4566
    ///                         port         ;port from RFC 4566
    ///                         SP cand-type
    ///                         [SP rel-addr]
    ///                         [SP rel-port]
    ///                         *(SP extension-att-name SP
    ///                              extension-att-value)
    pub fn unmarshal(raw: &str) -> Result<Self> {
        let raw = raw.strip_prefix("candidate:").unwrap_or(raw);

        let split: Vec<&str> = raw.split_whitespace().collect();
        if split.len() < 8 {
            return Err(Error::ErrAttributeTooShortIceCandidate);
        }

        // foundation = 1*32ice-char
        let foundation = split[0];
        if foundation.is_empty()
            || foundation.len() > MAX_FOUNDATION_SIZE
            || !foundation.bytes().all(is_ice_char)
        {
            return Err(Error::ErrInvalidFoundation);
        }

        let component_id: u32 = split[1].parse()?;

        // transport is matched case-insensitively, canonical form is upper.
        let transport = split[2].to_ascii_uppercase();

        let priority: u32 = split[3].parse()?;

        let address = split[4].to_owned();
        let port: u16 = split[5].parse()?;

        if split[6] != "typ" {
            return Err(Error::ErrParseType);
        }

        // candidate-types = "host" / "srflx" / "prflx" / "relay" / token
        let candidate_type = split[7];
        if !is_token(candidate_type) {
            return Err(Error::ErrUnknownCandidateType);
        }

        let mut rel_addr = String::new();
        let mut rel_port = 0u16;
        let mut tcp_type = TcpCandidateType::Unspecified;
        let mut extensions: Vec<(String, String)> = Vec::new();

        let mut rest = &split[8..];

        if rest.first() == Some(&"raddr") {
            if rest.len() < 2 {
                return Err(Error::ErrParseRelatedAddr);
            }
            rel_addr = rest[1].to_owned();
            rest = &rest[2..];
        }

        if rest.first() == Some(&"rport") {
            if rest.len() < 2 {
                return Err(Error::ErrParseRelatedAddr);
            }
            rel_port = rest[1].parse()?;
            rest = &rest[2..];
        }

        // Remaining tokens pair up into extension attributes.
        let mut pairs = rest.chunks_exact(2);
        for pair in pairs.by_ref() {
            let (name, value) = (pair[0], pair[1]);
            if name == "tcptype" {
                tcp_type = TcpCandidateType::from(value);
            }
            extensions.push((name.to_owned(), value.to_owned()));
        }
        if !pairs.remainder().is_empty() {
            return Err(Error::ErrTrailingExtensionAttribute);
        }

        Ok(IceCandidate {
            foundation: foundation.to_owned(),
            component_id,
            priority,
            resolved_addr: resolve(&address, port),
            address,
            port,
            candidate_type: candidate_type.to_owned(),
            rel_addr,
            rel_port,
            extensions,
            tcp_type,
            transport,
        })
    }

    /// Returns the SDP attribute value, without the `candidate:` prefix.
    pub fn marshal(&self) -> String {
        let mut val = format!(
            "{} {} {} {} {} {} typ {}",
            self.foundation,
            self.component_id,
            self.transport,
            self.priority,
            self.address,
            self.port,
            self.candidate_type
        );

        if !self.rel_addr.is_empty() {
            val += format!(" raddr {} rport {}", self.rel_addr, self.rel_port).as_str();
        }

        for (name, value) in &self.extensions {
            val += format!(" {name} {value}").as_str();
        }

        val
    }

    /// Returns the full SDP attribute, `candidate:` prefix included.
    pub fn candidate_string(&self) -> String {
        format!("candidate:{}", self.marshal())
    }

    pub fn foundation(&self) -> &str {
        &self.foundation
    }

    pub fn set_foundation(&mut self, foundation: &str) {
        self.foundation = foundation.to_owned();
    }

    /// Derives a foundation from the grouping fields, so that candidates
    /// sharing a type, base address and transport get the same value
    /// (RFC 5245 section 4.1.1.3).
    pub fn derive_foundation(&self) -> String {
        let mut buf = vec![];
        buf.extend_from_slice(self.candidate_type.as_bytes());
        buf.extend_from_slice(self.address.as_bytes());
        buf.extend_from_slice(self.transport.as_bytes());

        let checksum = Crc::<u32>::new(&CRC_32_ISCSI).checksum(&buf);

        format!("{checksum}")
    }

    pub fn component_id(&self) -> u32 {
        self.component_id
    }

    pub fn set_component_id(&mut self, component_id: u32) {
        self.component_id = component_id;
    }

    pub fn transport(&self) -> &str {
        &self.transport
    }

    pub fn set_transport(&mut self, transport: &str) {
        self.transport = transport.to_ascii_uppercase();
    }

    pub fn is_tcp(&self) -> bool {
        self.transport == "TCP"
    }

    pub fn priority(&self) -> u32 {
        self.priority
    }

    pub fn set_priority(&mut self, priority: u32) {
        self.priority = priority;
    }

    /// The connection address as it appeared (or will appear) on the wire.
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn set_address(&mut self, address: &str) {
        self.address = address.to_owned();
        self.resolved_addr = resolve(&self.address, self.port);
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn set_port(&mut self, port: u16) {
        self.port = port;
        self.resolved_addr = resolve(&self.address, self.port);
    }

    /// The connection address parsed into a socket address, when it parses.
    pub fn resolved_addr(&self) -> Option<SocketAddr> {
        self.resolved_addr
    }

    pub fn candidate_type(&self) -> &str {
        &self.candidate_type
    }

    pub fn set_candidate_type(&mut self, candidate_type: &str) {
        self.candidate_type = candidate_type.to_owned();
    }

    pub fn rel_addr(&self) -> &str {
        &self.rel_addr
    }

    pub fn set_rel_addr(&mut self, rel_addr: &str) {
        self.rel_addr = rel_addr.to_owned();
    }

    pub fn rel_port(&self) -> u16 {
        self.rel_port
    }

    pub fn set_rel_port(&mut self, rel_port: u16) {
        self.rel_port = rel_port;
    }

    /// Extension attributes in insertion order. Names may repeat.
    pub fn extensions(&self) -> &[(String, String)] {
        &self.extensions
    }

    /// The value of the first extension attribute with the given name.
    pub fn extension(&self, name: &str) -> Option<&str> {
        self.extensions
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn add_extension(&mut self, name: &str, value: &str) {
        self.extensions.push((name.to_owned(), value.to_owned()));
    }

    /// Removes every extension attribute with the given name. Returns
    /// whether anything was removed.
    pub fn remove_extension(&mut self, name: &str) -> bool {
        let before = self.extensions.len();
        self.extensions.retain(|(n, _)| n != name);
        self.extensions.len() != before
    }

    pub fn clear_extensions(&mut self) {
        self.extensions.clear();
    }

    pub fn tcp_type(&self) -> TcpCandidateType {
        self.tcp_type
    }

    /// Sets the RFC 6544 connection role and keeps the `tcptype` extension
    /// attribute in step, since emission is driven by the extension list.
    pub fn set_tcp_type(&mut self, tcp_type: TcpCandidateType) {
        self.tcp_type = tcp_type;

        if tcp_type == TcpCandidateType::Unspecified {
            self.remove_extension("tcptype");
            return;
        }

        let value = tcp_type.to_string();
        if let Some(entry) = self.extensions.iter_mut().find(|(n, _)| n == "tcptype") {
            entry.1 = value;
        } else {
            self.extensions.push(("tcptype".to_owned(), value));
        }
    }

    /// Computes a candidate priority (RFC 5245 section 4.1.2.1).
    ///
    /// `type_preference` is 0..=126, `local_preference` 0..=65535 and
    /// `component_id` 1..=256; within those ranges the arithmetic cannot
    /// overflow 32 bits.
    pub fn calculate_priority(
        type_preference: u32,
        local_preference: u32,
        component_id: u32,
    ) -> u32 {
        (1 << 24) * type_preference + (1 << 8) * local_preference + (256 - component_id)
    }

    /// Computes a TCP candidate priority (RFC 6544 section 4.2).
    ///
    /// The local preference folds in the connection role:
    /// `(2^13) * direction-pref + other-pref`, with direction-pref 6 for
    /// simultaneous-open, 4 for active and 2 for passive.
    /// `local_preference` supplies the 13-bit other-pref; the host TCP type
    /// preference is applied.
    pub fn calculate_tcp_priority(
        tcp_type: TcpCandidateType,
        local_preference: u32,
        component_id: u32,
    ) -> u32 {
        let direction_pref: u32 = match tcp_type {
            TcpCandidateType::SimultaneousOpen => 6,
            TcpCandidateType::Active => 4,
            TcpCandidateType::Passive => 2,
            TcpCandidateType::Unspecified => 0,
        };

        Self::calculate_priority(
            TCP_TYPE_PREFERENCE_HOST,
            (direction_pref << 13) | local_preference,
            component_id,
        )
    }

    /// Orders candidates for connectivity checks: priority descending, ties
    /// broken by foundation and then component id.
    pub fn checklist_order(&self, other: &Self) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| self.foundation.cmp(&other.foundation))
            .then_with(|| self.component_id.cmp(&other.component_id))
    }
}

// String makes the IceCandidate printable
impl fmt::Display for IceCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.marshal())
    }
}

impl PartialEq for IceCandidate {
    fn eq(&self, other: &Self) -> bool {
        // The resolved address is a cache of (address, port) and extension
        // order does not matter, only the multiset of pairs.
        self.foundation == other.foundation
            && self.component_id == other.component_id
            && self.transport == other.transport
            && self.priority == other.priority
            && self.address == other.address
            && self.port == other.port
            && self.candidate_type == other.candidate_type
            && self.rel_addr == other.rel_addr
            && self.rel_port == other.rel_port
            && self.tcp_type == other.tcp_type
            && extensions_eq(&self.extensions, &other.extensions)
    }
}

impl Eq for IceCandidate {}

fn extensions_eq(a: &[(String, String)], b: &[(String, String)]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut a: Vec<_> = a.iter().collect();
    let mut b: Vec<_> = b.iter().collect();
    a.sort();
    b.sort();
    a == b
}

fn resolve(address: &str, port: u16) -> Option<SocketAddr> {
    address
        .parse::<IpAddr>()
        .ok()
        .map(|ip| SocketAddr::new(ip, port))
}

/// ice-char = ALPHA / DIGIT / "+" / "/"
fn is_ice_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'+' || b == b'/'
}

/// token, from RFC 3261.
fn is_token(s: &str) -> bool {
    !s.is_empty()
        && s.bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"-.!%*_+`'~".contains(&b))
}
