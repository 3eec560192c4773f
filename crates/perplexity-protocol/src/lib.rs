//! # perplexity-protocol
//!
//! Wire dialect for Perplexity's socket.io-style transport.
//!
//! Pure and I/O-free — everything here operates on strings and
//! `serde_json` values:
//!
//! - **Frame codec**: [`frame::ServerFrame`] / [`frame::ClientFrame`] with
//!   the opcode-token + JSON framing (`2`, `3probe`, `40`, `42`, `43<seq>`)
//! - **Payloads**: [`payload::QueryUpdate`] envelope (double-encoded `text`
//!   decoded one extra level), [`payload::UploadTicket`]
//! - **Options**: [`options::AskOptions`] with decode-time validation and
//!   the outbound `perplexity_ask` / `get_upload_url` payload builders
//! - **Deltas**: [`text::DeltaExtractor`] for incremental answer text
//!
//! The session/transport layer lives in `perplexity-client`.

#![deny(unsafe_code)]

pub mod frame;
pub mod options;
pub mod payload;
pub mod text;

pub use frame::{ClientFrame, FrameError, PendingEvent, ServerFrame, decode_server_frame};
pub use options::{
    AskOptions, Mode, OptionsError, SearchFocus, ask_payload, autosuggest_payload,
    thread_list_payload, upload_url_payload,
};
pub use payload::{QueryUpdate, UploadTicket};
pub use text::DeltaExtractor;
