//! Protocol layer: crypto primitives, pairing, and the control-protocol codec

pub mod crypto;
pub mod pairing;
pub mod rtsp;
