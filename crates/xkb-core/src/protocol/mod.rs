//! Protocol module containing notification types and the binary codec.

pub mod codec;
pub mod events;
pub mod sequence;

pub use codec::{decode_event, encode_event, encode_mapping_notify, CodecError, WireOrder};
pub use events::*;
pub use sequence::SequenceCounter;
