// Audio extraction core: multi-strategy yt-dlp orchestration, proxy probing,
// external conversion fallback, and an ephemeral artifact store.
//
// The serving layer wires `AudioExtractor::new` from `Settings`, spawns the
// store sweeper once, and calls `extract` / `peek_metadata` /
// `proxy_pool_status`. Everything else is internal plumbing behind those
// three calls.

pub mod config;
pub mod diagnostics;
pub mod errors;
pub mod fallback;
pub mod models;
pub mod orchestrator;
pub mod proxy;
pub mod store;
pub mod strategy;
pub mod ytdlp;

pub use config::Settings;
pub use errors::{AggregateFailure, AttemptRecord, ExtractError, FailureCategory};
pub use fallback::{ConvertApiClient, FallbackService};
pub use models::{mime_type_for, Extraction, MediaMetadata, ProxyPoolStatus, VideoDetails};
pub use orchestrator::{is_supported_source, AudioExtractor};
pub use proxy::{ProxyCandidate, ProxyProber};
pub use store::{ArtifactId, ArtifactStore};
pub use strategy::{build_chain, ExtractionStrategy};
pub use ytdlp::{MediaFetcher, YtDlpFetcher};
