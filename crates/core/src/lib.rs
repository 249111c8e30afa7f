pub mod config;
pub mod error;
pub mod export;
pub mod logging;
pub mod markup;
pub mod params;
pub mod transcript;

pub use config::{
    ApiKey, Config, DatabaseConfig, ExportConfig, ProviderConfig, ProviderKind, RetrySettings, SessionDefaults,
};
pub use error::{Error, RemoteError, RemoteErrorKind, Result};
pub use export::{ExportedMessage, parse_plain, write_export};
pub use params::RequestParameters;
pub use transcript::{ContextEntry, Message, Role, SequenceIndex, Transcript, TranscriptView};
