//! # perplexity-client
//!
//! Async client for Perplexity's conversational search.
//!
//! A [`Client`] owns one connected session: the long-poll handshake, the
//! WebSocket upgrade, and the receive loop all happen inside
//! [`Client::connect`]. Queries run one at a time; answers arrive either
//! as a pull-driven [`UpdateStream`] ([`Client::ask`]) or as the final
//! update only ([`Client::ask_sync`]).
//!
//! ```no_run
//! use perplexity_client::{AskOptions, Client, ClientConfig};
//!
//! # async fn demo() -> perplexity_client::Result<()> {
//! let client = Client::connect(ClientConfig::default()).await?;
//! let answer = client
//!     .ask_sync("capital of France", &AskOptions::default(), None)
//!     .await?;
//! println!("{:?}", answer.text);
//! client.close().await;
//! # Ok(())
//! # }
//! ```
//!
//! The wire dialect itself (frame codec, payload envelopes, option
//! validation) lives in `perplexity-protocol` and is re-exported here.

#![deny(unsafe_code)]

pub mod client;
pub mod config;
pub mod credentials;
pub mod error;
pub mod state;

mod handshake;
mod socket;
mod upload;

pub use client::{Client, UpdateStream};
pub use config::{ClientConfig, DEFAULT_BASE_URL, Identity};
pub use credentials::{CredentialStore, MemoryCredentialStore, StoredCredentials};
pub use error::{ClientError, Result};

pub use perplexity_protocol::{AskOptions, DeltaExtractor, Mode, QueryUpdate, SearchFocus};
