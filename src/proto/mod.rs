pub mod chandata;
pub mod stun;

use std::fmt;

/// The message family a packet on an ICE transport belongs to, judged from
/// its leading byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    Stun,
    TurnChannelData,
    Unknown,
}

impl fmt::Display for PacketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            PacketKind::Stun => "stun",
            PacketKind::TurnChannelData => "turn-channel-data",
            PacketKind::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

/// match_range is a MatchFunc that accepts packets with the first byte in [lower..upper]
fn match_range(lower: u8, upper: u8, buf: &[u8]) -> bool {
    if buf.is_empty() {
        return false;
    }
    let b = buf[0];
    b >= lower && b <= upper
}

/// MatchFuncs as described in RFC7983
/// <https://tools.ietf.org/html/rfc7983>
///              +----------------+
///              |        [0..3] -+--> forward to STUN
///              |                |
///              |      [16..19] -+--> forward to ZRTP
///              |                |
///  packet -->  |      [20..63] -+--> forward to DTLS
///              |                |
///              |      [64..79] -+--> forward to TURN Channel
///              |                |
///              |    [128..191] -+--> forward to RTP/RTCP
///              +----------------+
/// match_stun is a MatchFunc that accepts packets with the first byte in [0..3]
pub fn match_stun(b: &[u8]) -> bool {
    match_range(0, 3, b)
}

/// match_channel_data is a MatchFunc that accepts packets with the first byte in [64..79]
pub fn match_channel_data(b: &[u8]) -> bool {
    match_range(64, 79, b)
}

/// match_dtls is a MatchFunc that accepts packets with the first byte in [20..63]
pub fn match_dtls(b: &[u8]) -> bool {
    match_range(20, 63, b)
}

/// match_srtp is a MatchFunc that accepts packets with the first byte in [128..191]
pub fn match_srtp(b: &[u8]) -> bool {
    match_range(128, 191, b)
}

/// Labels a packet by the RFC 7983 table. Anything that is neither STUN nor
/// TURN Channel Data (DTLS, SRTP, ...) is reported as [`PacketKind::Unknown`].
pub fn classify(buf: &[u8]) -> PacketKind {
    if match_stun(buf) {
        PacketKind::Stun
    } else if match_channel_data(buf) {
        PacketKind::TurnChannelData
    } else {
        PacketKind::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_boundaries() {
        let tests = vec![
            (0x00u8, PacketKind::Stun),
            (0x03, PacketKind::Stun),
            (0x04, PacketKind::Unknown),
            (0x14, PacketKind::Unknown), // DTLS
            (0x3f, PacketKind::Unknown),
            (0x40, PacketKind::TurnChannelData),
            (0x4f, PacketKind::TurnChannelData),
            (0x50, PacketKind::Unknown),
            (0x80, PacketKind::Unknown), // RTP
        ];

        for (first_byte, expected) in tests {
            let buf = [first_byte, 0x00, 0x00, 0x00];
            assert_eq!(
                classify(&buf),
                expected,
                "first byte 0x{first_byte:02x}"
            );
        }
    }

    #[test]
    fn test_classify_empty() {
        assert_eq!(classify(&[]), PacketKind::Unknown);
    }

    #[test]
    fn test_match_dtls_srtp() {
        assert!(match_dtls(&[0x16, 0xfe, 0xfd]));
        assert!(!match_dtls(&[0x13]));
        assert!(match_srtp(&[0x80, 0x60]));
        assert!(!match_srtp(&[0xc0]));
    }
}
