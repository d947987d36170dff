//! Sequential research pipeline over a hosted chat-completion model.
//!
//! A topic is decomposed into 2-4 subtopics, each subtopic is researched with
//! the model's web search and saved as a markdown note, and the notes are
//! synthesized into one report. The crate keeps a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (reply parsing, slugs, stages).
//!   No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (HTTP client, note/report files,
//!   transcript, config). The [`io::client::ChatClient`] trait is the seam
//!   tests replace with a scripted client.
//!
//! [`pipeline`] coordinates the two; [`chat`] wraps it in an interactive loop.

pub mod chat;
pub mod core;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod pipeline;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
