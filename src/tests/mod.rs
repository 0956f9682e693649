//! Media-backed tests
//!
//! End-to-end tests against files generated at test time:
//! - Probing tracks, tags and cover art
//! - The decode/encode state machine, trimming and teardown
//! - The async byte stream

pub mod pipeline;
pub mod stream;
