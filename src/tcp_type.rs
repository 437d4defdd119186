use std::fmt;

use serde::{Deserialize, Serialize};

/// The connection role of an ICE TCP candidate, carried by the `tcptype`
/// SDP attribute (RFC 6544 section 4.5). UDP candidates have no role and
/// stay [`TcpCandidateType::Unspecified`].
#[derive(Default, PartialEq, Eq, Debug, Copy, Clone, Serialize, Deserialize)]
pub enum TcpCandidateType {
    /// The default value, used for UDP candidates.
    #[default]
    #[serde(rename = "unspecified")]
    Unspecified,
    /// Initiates outbound connections, advertised with the discard port.
    #[serde(rename = "active")]
    Active,
    /// Accepts inbound connections on the advertised port.
    #[serde(rename = "passive")]
    Passive,
    /// Both agents connect simultaneously.
    #[serde(rename = "so")]
    SimultaneousOpen,
}

impl From<&str> for TcpCandidateType {
    fn from(raw: &str) -> Self {
        match raw {
            "active" => Self::Active,
            "passive" => Self::Passive,
            "so" => Self::SimultaneousOpen,
            _ => Self::Unspecified,
        }
    }
}

impl fmt::Display for TcpCandidateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            Self::Active => "active",
            Self::Passive => "passive",
            Self::SimultaneousOpen => "so",
            Self::Unspecified => "unspecified",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tcp_candidate_type_from_str() {
        assert_eq!(TcpCandidateType::from("active"), TcpCandidateType::Active);
        assert_eq!(TcpCandidateType::from("passive"), TcpCandidateType::Passive);
        assert_eq!(
            TcpCandidateType::from("so"),
            TcpCandidateType::SimultaneousOpen
        );
        assert_eq!(
            TcpCandidateType::from("invalid"),
            TcpCandidateType::Unspecified
        );
    }

    #[test]
    fn test_tcp_candidate_type_serde() {
        assert_eq!(
            serde_json::to_string(&TcpCandidateType::SimultaneousOpen).unwrap(),
            "\"so\""
        );
        assert_eq!(
            serde_json::from_str::<TcpCandidateType>("\"passive\"").unwrap(),
            TcpCandidateType::Passive
        );
    }
}
