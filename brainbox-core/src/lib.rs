//! # BrainBox Core
//!
//! Client library for the BrainBox DSA tutoring backend.
//! Provides the streaming response assembler, its HTTP transport, artifact
//! extraction, session identity, the REST client for problem data and
//! history, configuration, and error types.

pub mod api;
pub mod assembler;
pub mod config;
pub mod decode;
pub mod error;
pub mod extract;
pub mod pacing;
pub mod problem;
pub mod session;
pub mod transport;
pub mod types;

// Re-export commonly used types at the crate root.
pub use api::BackendClient;
pub use assembler::{
    AssemblerOptions, AssemblyObserver, AssemblyState, FnObserver, NoOpObserver,
    RecordingObserver, ResponseAssembly, StreamingResponseAssembler,
};
pub use config::{ClientConfig, load_config, store_login};
pub use error::{ApiError, BrainboxError, ConfigError, Result, StreamError};
pub use extract::{HintBoard, extract_artifacts};
pub use session::Session;
pub use transport::{ChatTransport, HttpTransport, MockTransport};
pub use types::{AssembledResponse, Credentials, StreamRequest, Token};
