use std::num::ParseIntError;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, PartialEq)]
#[non_exhaustive]
pub enum Error {
    #[error("attribute not long enough to be ICE candidate")]
    ErrAttributeTooShortIceCandidate,
    #[error("invalid ICE candidate foundation")]
    ErrInvalidFoundation,
    #[error("could not parse related addresses")]
    ErrParseRelatedAddr,
    #[error("could not parse typ")]
    ErrParseType,
    #[error("unknown candidate type")]
    ErrUnknownCandidateType,
    #[error("extension attribute name without a value")]
    ErrTrailingExtensionAttribute,

    #[error("buffer: short")]
    ErrBufferShort,
    #[error("invalid frame length")]
    ErrInvalidFrameLength,
    #[error("invalid stun message type")]
    ErrInvalidMessageType,
    #[error("invalid stun message length")]
    ErrInvalidMessageLength,
    #[error("invalid magic cookie")]
    ErrInvalidMagicCookie,
    #[error("invalid channel number")]
    ErrInvalidChannelNumber,
    #[error("unexpected packet type on turn stream")]
    ErrUnexpectedPacketType,
    #[error("connection mode already determined")]
    ErrModeAlreadyDetermined,
    #[error("connection mode must be set before data arrives")]
    ErrModeChangeAfterData,

    #[error("parse int: {0}")]
    ParseInt(#[from] ParseIntError),
    #[error("{0}")]
    Other(String),
}
