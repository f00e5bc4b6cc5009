//! Clients for the generative services behind the composition pipeline.
//!
//! Every client takes an injected [`AiServicesConfig`]; nothing reads the
//! environment at call sites. Each service sits behind a trait so the
//! orchestrator can be driven by fakes in tests.

pub mod config;
pub mod error;
pub mod http;
pub mod images;
pub mod lipsync;
pub mod poll;
pub mod speech;
pub mod transcribe;

pub use config::{AiServicesConfig, ServiceEndpoint};
pub use error::{AiError, AiResult};
pub use http::ServiceClient;
pub use images::{generate_all, HttpImageGenerator, ImageGenerator};
pub use lipsync::{HttpLipSyncer, LipSyncer};
pub use poll::{poll_until_done, PollStatus};
pub use speech::{HttpSpeechSynthesizer, SpeechSynthesizer};
pub use transcribe::{HttpTranscriber, Transcriber};
