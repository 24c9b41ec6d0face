//! Binary frame protocol: packed wire header plus float payload codec.

pub mod codec;
pub mod header;

pub use codec::{decode, encode, Frame};
pub use header::{
    DataVersion, FrameHeader, ACTOR_NAME_LEN, END_TOKEN, HEADER_SIZE, MAX_VALUE_COUNT,
    START_TOKEN,
};
