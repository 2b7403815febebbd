//! Protocol Module
//!
//! Binary command frames and the length-prefixed response record, with the
//! codec that moves them over a byte stream.

mod codec;
mod frame;


pub use codec::FrameCodec;
pub use frame::{Command, Frame, Response, Status, Tag};
