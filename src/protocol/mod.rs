//! Dispatcher ↔ worker message protocol.
//!
//! # Data Flow
//! ```text
//! Dispatcher                                   Worker
//!   config line ───────────────────────────────▶ validate, build routing state
//!   RequestDescriptor{correlationId=a} ────────▶
//!   RequestDescriptor{correlationId=b} ────────▶  (handled concurrently)
//!   ◀──────────────────────── ReplyDescriptor{correlationId=b}
//!   ◀──────────────────────── ReplyDescriptor{correlationId=a}
//! ```
//!
//! # Design Decisions
//! - Replies may come back in any order; the correlation id is the only link
//!   between a reply and the client waiting for it
//! - JSON lines keep the channel debuggable and transport-agnostic (child
//!   stdio or an in-memory pipe)

pub mod codec;
pub mod descriptor;

pub use codec::MalformedMessage;
pub use descriptor::{ErrorCode, ReplyDescriptor, RequestDescriptor, RequestType};
