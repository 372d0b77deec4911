//! # ExoWire
//!
//! The session protocol spoken between a bridge and a remote object runtime.
//!
//! ## Architecture
//!
//! Frames are JSON documents carried in length-prefixed bodies. This crate
//! owns their shapes and the encode/decode entry points; moving the bytes is
//! the job of whatever link the bridge establishes.

mod error;
mod frame;
mod request;
mod value;


pub use error::Error;
pub use error::Result;
pub use frame::FaultBody;
pub use frame::Frame;
pub use frame::MAX_FRAME_LEN;
pub use frame::ReplyBody;
pub use frame::check_frame_len;
pub use frame::decode_seq;
pub use request::Affinity;
pub use request::MemberShape;
pub use request::Request;
pub use request::TypeShape;
pub use value::RefKind;
pub use value::WireValue;
