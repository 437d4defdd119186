
use std::collections::VecDeque;
use std::fmt;

use bytes::{Buf, Bytes, BytesMut};
use log::{debug, error, warn};

use crate::error::{Error, Result};
use crate::proto::{self, chandata, stun, PacketKind};

/// RFC 4571 framing header size, a 2-byte big-endian length prefix.
const FRAMING_HEADER_SIZE: usize = 2;

/// Smallest header any TURN-mode message can have (Channel Data).
const MIN_PACKET_HEADER_SIZE: usize = 4;

/// Initial accumulator capacity, one maximum-size framed payload.
const INITIAL_BUFFER_CAPACITY: usize = 65535;

/// The framing convention in use on one ICE TCP connection.
///
/// Detected from the first bytes of the stream and fixed for the lifetime
/// of the connection: once a mode other than `Unknown` is observed it never
/// changes.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionMode {
    /// Not enough of the stream seen to decide.
    #[default]
    Unknown,
    /// TURN relay: raw STUN messages and Channel Data framing (RFC 5766).
    TurnRelay,
    /// Direct ICE TCP: RFC 4571 length-prefixed frames.
    IceTcpDirect,
}

impl fmt::Display for ConnectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            ConnectionMode::Unknown => "unknown",
            ConnectionMode::TurnRelay => "turn-relay",
            ConnectionMode::IceTcpDirect => "ice-tcp-direct",
        };
        write!(f, "{s}")
    }
}

/// One re-framed message taken off the TCP stream.
///
/// For RFC 4571 frames the length prefix is stripped and `payload` is the
/// framed packet; STUN and Channel Data messages keep their own headers,
/// which already describe their length.
#[derive(Debug, Clone)]
pub struct Packet {
    kind: PacketKind,
    payload: Bytes,
    channel_number: Option<u16>,
}

impl Packet {
    fn new(kind: PacketKind, payload: Bytes) -> Self {
        Packet {
            kind,
            payload,
            channel_number: None,
        }
    }

    fn with_channel_number(kind: PacketKind, payload: Bytes, channel_number: u16) -> Self {
        Packet {
            kind,
            payload,
            channel_number: Some(channel_number),
        }
    }

    pub fn kind(&self) -> PacketKind {
        self.kind
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn into_payload(self) -> Bytes {
        self.payload
    }

    /// The TURN channel this packet arrived on, for Channel Data packets.
    pub fn channel_number(&self) -> Option<u16> {
        self.channel_number
    }
}

/// Outcome of one extraction attempt against the head of the buffer.
enum Extract {
    /// One packet framed and queued.
    Packet,
    /// The buffer holds a valid prefix, wait for the next append.
    NeedMoreData,
    /// The stream cannot be re-framed, the connection must be torn down.
    Invalid(Error),
}

/// Turns one ICE TCP byte stream into discrete, typed packets.
///
/// WebRTC multiplexes STUN, TURN messages and Channel Data over a single
/// TCP connection using two incompatible framing conventions: direct
/// ICE-TCP wraps every packet in an RFC 4571 length prefix, while a TURN
/// relay stream carries raw STUN and Channel Data messages whose headers
/// are self-describing. The demultiplexer sniffs the convention from the
/// first bytes received and then re-frames the stream, tolerating partial
/// reads and back-to-back packets.
///
/// One instance per connection; feed it with [`append`](Self::append) and
/// drain it with [`pop_packet`](Self::pop_packet). A framing error is fatal
/// for the connection: the protocols are not self-synchronizing, so the
/// caller is expected to close the socket.
#[derive(Default)]
pub struct TcpDemultiplexer {
    buffer: BytesMut,
    packets: VecDeque<Packet>,
    mode: ConnectionMode,
}

impl TcpDemultiplexer {
    pub fn new() -> Self {
        Self::with_capacity(INITIAL_BUFFER_CAPACITY)
    }

    /// Creates a demultiplexer with a pre-allocated accumulator.
    pub fn with_capacity(capacity: usize) -> Self {
        TcpDemultiplexer {
            buffer: BytesMut::with_capacity(capacity),
            packets: VecDeque::new(),
            mode: ConnectionMode::Unknown,
        }
    }

    /// Appends raw stream bytes and extracts as many complete packets as
    /// possible.
    ///
    /// An `Err` means the stream is malformed beyond recovery and the
    /// connection must be torn down; partial data is never an error, the
    /// bytes are kept for the next call.
    pub fn append(&mut self, data: &[u8]) -> Result<()> {
        self.buffer.extend_from_slice(data);
        self.parse()
    }

    /// True when at least one packet is waiting to be popped.
    pub fn has_packet(&self) -> bool {
        !self.packets.is_empty()
    }

    /// Takes the next packet, in stream order.
    pub fn pop_packet(&mut self) -> Option<Packet> {
        self.packets.pop_front()
    }

    /// The framing convention detected (or set) for this connection.
    pub fn mode(&self) -> ConnectionMode {
        self.mode
    }

    pub fn is_ice_tcp_direct(&self) -> bool {
        self.mode == ConnectionMode::IceTcpDirect
    }

    /// Number of unconsumed bytes held in the accumulator.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Overrides automatic mode detection.
    ///
    /// Only legal on a pristine instance: fails once any bytes have been
    /// buffered or packets queued, and fails on an attempt to change an
    /// already-determined mode. Re-setting the current mode is a no-op.
    pub fn set_mode(&mut self, mode: ConnectionMode) -> Result<()> {
        if self.mode != ConnectionMode::Unknown && mode != self.mode {
            return Err(Error::ErrModeAlreadyDetermined);
        }
        if !self.buffer.is_empty() || !self.packets.is_empty() {
            return Err(Error::ErrModeChangeAfterData);
        }
        self.mode = mode;
        Ok(())
    }

    fn parse(&mut self) -> Result<()> {
        if self.mode == ConnectionMode::Unknown {
            match self.detect_mode() {
                Some(mode) => self.mode = mode,
                None => {
                    if self.buffer.len() <= FRAMING_HEADER_SIZE {
                        // Wait for more data.
                        return Ok(());
                    }
                    warn!("could not detect tcp connection mode, assuming ice-tcp direct (rfc 4571)");
                    self.mode = ConnectionMode::IceTcpDirect;
                }
            }
        }

        match self.mode {
            ConnectionMode::IceTcpDirect => self.parse_rfc4571_stream(),
            ConnectionMode::TurnRelay => self.parse_turn_stream(),
            ConnectionMode::Unknown => Ok(()),
        }
    }

    /// Decides the framing convention from the first three bytes of the
    /// stream. Returns `None` while the bytes are insufficient or match no
    /// known pattern.
    fn detect_mode(&self) -> Option<ConnectionMode> {
        if self.buffer.len() <= FRAMING_HEADER_SIZE {
            return None;
        }

        // RFC 4571 framing puts a big-endian length in the first two bytes,
        // so for a framed STUN message the first byte is 0x00, the second is
        // at least the 20-byte STUN header, and the byte after the prefix is
        // the STUN type high byte with its top two bits zero.
        if self.buffer[0] == 0x00
            && self.buffer[2] <= 0x03
            && self.buffer[1] as usize >= stun::MESSAGE_HEADER_SIZE
        {
            debug!("detected ice-tcp direct connection (rfc 4571 framing)");
            return Some(ConnectionMode::IceTcpDirect);
        }

        // A bare STUN header, the first message on a TURN connection.
        if self.buffer[0] <= 0x03 {
            debug!("detected turn relay connection (raw stun)");
            return Some(ConnectionMode::TurnRelay);
        }

        // A Channel Data message, channel numbers run 0x4000..=0x7FFF.
        if (0x40..=0x4f).contains(&self.buffer[0]) {
            debug!("detected turn relay connection (channel data)");
            return Some(ConnectionMode::TurnRelay);
        }

        None
    }

    fn parse_rfc4571_stream(&mut self) -> Result<()> {
        while self.buffer.len() >= FRAMING_HEADER_SIZE {
            match self.extract_rfc4571_frame() {
                Extract::Packet => continue,
                Extract::NeedMoreData => return Ok(()),
                Extract::Invalid(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn parse_turn_stream(&mut self) -> Result<()> {
        // Only STUN and Channel Data ever appear in band on a TURN stream;
        // anything else means the stream is corrupt.
        while self.buffer.len() > MIN_PACKET_HEADER_SIZE {
            let extract = match proto::classify(&self.buffer) {
                PacketKind::Stun => self.extract_stun_message(),
                PacketKind::TurnChannelData => self.extract_channel_message(),
                PacketKind::Unknown => Extract::Invalid(Error::ErrUnexpectedPacketType),
            };

            match extract {
                Extract::Packet => continue,
                Extract::NeedMoreData => return Ok(()),
                Extract::Invalid(e) => {
                    error!("turn stream cannot be re-framed: {e}");
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    fn extract_stun_message(&mut self) -> Extract {
        let message_length = match stun::parse_header(&self.buffer) {
            Ok(n) => n,
            Err(Error::ErrBufferShort) => return Extract::NeedMoreData,
            Err(e) => return Extract::Invalid(e),
        };

        let packet_size = stun::MESSAGE_HEADER_SIZE + message_length as usize;
        if self.buffer.len() < packet_size {
            return Extract::NeedMoreData;
        }

        let payload = self.buffer.split_to(packet_size).freeze();
        self.packets.push_back(Packet::new(PacketKind::Stun, payload));

        Extract::Packet
    }

    fn extract_channel_message(&mut self) -> Extract {
        let packet_size = match chandata::parse_header(&self.buffer) {
            Ok(n) => n,
            Err(Error::ErrBufferShort) => return Extract::NeedMoreData,
            Err(e) => return Extract::Invalid(e),
        };

        if self.buffer.len() < packet_size {
            return Extract::NeedMoreData;
        }

        let number = u16::from_be_bytes([self.buffer[0], self.buffer[1]]);
        let payload = self.buffer.split_to(packet_size).freeze();
        self.packets.push_back(Packet::with_channel_number(
            PacketKind::TurnChannelData,
            payload,
            number,
        ));

        Extract::Packet
    }

    fn extract_rfc4571_frame(&mut self) -> Extract {
        if self.buffer.len() < FRAMING_HEADER_SIZE {
            return Extract::NeedMoreData;
        }

        let frame_length =
            u16::from_be_bytes([self.buffer[0], self.buffer[1]]) as usize;

        // No packet framed this way is shorter than a STUN header.
        if frame_length < stun::MESSAGE_HEADER_SIZE {
            error!("rfc 4571: invalid frame length {frame_length}");
            return Extract::Invalid(Error::ErrInvalidFrameLength);
        }

        let total_size = FRAMING_HEADER_SIZE + frame_length;
        if self.buffer.len() < total_size {
            return Extract::NeedMoreData;
        }

        self.buffer.advance(FRAMING_HEADER_SIZE);
        let payload = self.buffer.split_to(frame_length).freeze();

        let kind = proto::classify(&payload);
        debug!("rfc 4571: extracted frame, length={frame_length}, kind={kind}");

        self.packets.push_back(Packet::new(kind, payload));

        Extract::Packet
    }
}
