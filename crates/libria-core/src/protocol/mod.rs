//! Wire protocol spoken between the host and its UI processes.

pub mod codec;
pub mod messages;
pub mod sequence;

pub use codec::{
    decode_message, encode_message, encode_message_now, payload_len_from_header,
    sequence_from_header, validate_message, ProtocolError,
};
pub use messages::*;
pub use sequence::SequenceCounter;
