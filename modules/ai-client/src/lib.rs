//! Minimal chat-completion client. opsgraph only needs one call shape:
//! a fixed system prompt plus one user message, answered deterministically.

pub mod error;
pub mod openai;
pub mod util;

pub use error::AiError;
pub use openai::OpenAi;
pub use util::{strip_code_blocks, truncate_to_char_boundary};
