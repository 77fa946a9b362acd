//! Keystorm Core — shared foundation for the workspace subsystems.
//!
//! Houses the pieces every other crate leans on: the workspace [`Config`],
//! byte-level [`encoding`] helpers, gitignore-style [`IgnoreMatcher`],
//! the language-id table, and the cooperative [`CancelToken`].

pub mod cancel;
pub mod config;
pub mod encoding;
pub mod ignore;
pub mod language;

pub use cancel::CancelToken;
pub use config::{Config, ConfigError, EditorConfig, DEFAULT_MAX_FILE_SIZE, DEFAULT_WORKER_COUNT};
pub use encoding::{Encoding, EncodingInfo, LineEnding};
pub use ignore::{IgnoreError, IgnoreMatcher, DEFAULT_IGNORE_PATTERNS};
pub use language::{language_id_for_path, LanguageMap, PLAINTEXT};
