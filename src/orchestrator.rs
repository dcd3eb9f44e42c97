// Extraction orchestrator - walks the strategy chain, first success wins
//
// Per-strategy failures are recorded values, never early exits; only total
// chain exhaustion plus external-fallback failure surfaces an aggregate
// failure. Each strategy runs exactly once per request: resilience comes
// from strategy diversity, not repetition, to bound worst-case latency.

use lazy_static::lazy_static;
use regex::Regex;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::diagnostics::{classify, Phase};
use crate::errors::{AggregateFailure, AttemptRecord, ExtractError, FailureCategory};
use crate::fallback::{download_to_file, ConvertApiClient, FallbackService};
use crate::models::{mime_type_for, Extraction, MediaMetadata, ProxyPoolStatus, VideoDetails};
use crate::proxy::{ProxyCandidate, ProxyProber};
use crate::store::{ArtifactId, ArtifactStore};
use crate::strategy::{build_chain, ExtractionStrategy};
use crate::ytdlp::{MediaFetcher, YtDlpFetcher};

const FALLBACK_LABEL: &str = "external-service";

lazy_static! {
    static ref SOURCE_RE: Regex =
        Regex::new(r"(?i)^https?://(?:[a-z0-9-]+\.)*(?:youtube\.com|youtu\.be)(?:[/?#]|$)")
            .unwrap();
}

/// Whether the URL belongs to the supported media domain family. Checked once
/// per request, outside the chain: no strategy can fix an invalid URL.
pub fn is_supported_source(url: &str) -> bool {
    SOURCE_RE.is_match(url)
}

/// The single entry point the serving layer talks to.
pub struct AudioExtractor {
    store: Arc<ArtifactStore>,
    fetcher: Box<dyn MediaFetcher>,
    fallback: Option<Box<dyn FallbackService>>,
    prober: ProxyProber,
    pool: Vec<ProxyCandidate>,
    http: reqwest::Client,
}

impl AudioExtractor {
    /// Production wiring from settings: yt-dlp fetcher, optional conversion
    /// API client, proxy pool from config.
    pub fn new(settings: &Settings) -> Result<Self, ExtractError> {
        let store = Arc::new(ArtifactStore::new(
            &settings.store_root,
            settings.retention,
            settings.sweep_interval,
        )?);
        let fetcher = Box::new(YtDlpFetcher::new(
            settings.metadata_timeout,
            settings.transfer_timeout,
        ));
        let fallback: Option<Box<dyn FallbackService>> = match &settings.fallback_endpoint {
            Some(endpoint) => Some(Box::new(ConvertApiClient::new(
                endpoint,
                settings.fallback_timeout,
            )?)),
            None => None,
        };
        let pool = settings
            .proxy_pool
            .iter()
            .map(|addr| ProxyCandidate::new(addr.clone()))
            .collect();
        let http = reqwest::Client::builder()
            .timeout(settings.fallback_timeout)
            .build()?;
        Ok(Self {
            store,
            fetcher,
            fallback,
            prober: ProxyProber::new(settings.probe_url.clone(), settings.probe_timeout),
            pool,
            http,
        })
    }

    /// Explicit wiring, for embedders and tests that supply their own
    /// collaborators behind the trait seams.
    pub fn with_parts(
        store: Arc<ArtifactStore>,
        fetcher: Box<dyn MediaFetcher>,
        fallback: Option<Box<dyn FallbackService>>,
        prober: ProxyProber,
        pool: Vec<ProxyCandidate>,
    ) -> Self {
        Self {
            store,
            fetcher,
            fallback,
            prober,
            pool,
            http: reqwest::Client::new(),
        }
    }

    /// Handle to the artifact store, e.g. for spawning the sweeper.
    pub fn store(&self) -> &Arc<ArtifactStore> {
        &self.store
    }

    /// Extract an audio artifact for the URL. Walks the strategy chain in
    /// order, short-circuits on the first full success, falls through to the
    /// external conversion service on exhaustion.
    pub async fn extract(&self, url: &str) -> Result<Extraction, AggregateFailure> {
        if !is_supported_source(url) {
            warn!("rejecting unsupported source URL: {}", url);
            return Err(AggregateFailure::invalid_source());
        }

        let id = self.store.allocate();
        let proxy = self.prober.find_usable(&self.pool).await;
        let proxy_unavailable = !self.pool.is_empty() && proxy.is_none();
        let chain = build_chain(
            self.store.root(),
            id.as_str(),
            proxy.as_ref().map(|c| c.address.as_str()),
        );
        info!(
            "built {} strategies for {} (proxy: {})",
            chain.len(),
            url,
            proxy.as_ref().map(|c| c.address.as_str()).unwrap_or("none")
        );

        let mut attempts = Vec::new();
        let mut last_meta: Option<MediaMetadata> = None;

        self.store.mark_in_use(&id);
        for strategy in &chain {
            match self.attempt(url, &id, strategy, &mut last_meta).await {
                Ok(extraction) => {
                    self.store.release(&id);
                    info!("strategy {} succeeded for {}", strategy.label, url);
                    return Ok(extraction);
                }
                Err(record) => {
                    warn!(
                        "strategy {} failed ({}): {}",
                        record.strategy, record.category, record.detail
                    );
                    attempts.push(record);
                }
            }
        }
        self.store.release(&id);

        if proxy_unavailable {
            attempts.push(AttemptRecord::new(
                "proxy-probe",
                FailureCategory::ProxyUnavailable,
                "no candidate in the proxy pool passed the reachability check",
            ));
        }

        // Chain exhausted: the external service gets exactly one shot.
        let fallback_record = match self.try_fallback(url, &last_meta).await {
            Ok(extraction) => {
                info!("external fallback succeeded for {}", url);
                return Ok(extraction);
            }
            Err(record) => record,
        };
        Err(AggregateFailure::exhausted(attempts, fallback_record))
    }

    /// One strategy, attempted exactly once: metadata probe first, transfer
    /// only if the probe succeeded, partial output removed on failure so the
    /// next strategy never sees stale bytes at the shared target path.
    async fn attempt(
        &self,
        url: &str,
        id: &ArtifactId,
        strategy: &ExtractionStrategy,
        last_meta: &mut Option<MediaMetadata>,
    ) -> Result<Extraction, AttemptRecord> {
        debug!("attempting strategy {}", strategy.label);
        let meta = match self.fetcher.probe(url, strategy).await {
            Ok(meta) => meta,
            Err(e) => {
                let text = e.to_string();
                return Err(AttemptRecord::new(
                    &strategy.label,
                    classify(&text, Phase::Metadata),
                    &text,
                ));
            }
        };
        *last_meta = Some(meta.clone());

        if let Err(e) = self.fetcher.transfer(url, strategy).await {
            self.store.remove_partial(id);
            let text = e.to_string();
            return Err(AttemptRecord::new(
                &strategy.label,
                classify(&text, Phase::Transfer),
                &text,
            ));
        }

        match self.store.resolve(id) {
            Some(path) => Ok(Extraction {
                title: meta.title,
                duration_seconds: meta.duration_seconds,
                uploader: meta.uploader,
                mime_type: mime_type_for(&path),
                file_path: path,
                method: strategy.label.clone(),
            }),
            None => Err(AttemptRecord::new(
                &strategy.label,
                FailureCategory::ArtifactMissing,
                "transfer reported success but no artifact is resolvable",
            )),
        }
    }

    async fn try_fallback(
        &self,
        url: &str,
        last_meta: &Option<MediaMetadata>,
    ) -> Result<Extraction, AttemptRecord> {
        let service = self.fallback.as_ref().ok_or_else(|| {
            AttemptRecord::new(
                FALLBACK_LABEL,
                FailureCategory::ExternalServiceFailed,
                "no conversion endpoint configured",
            )
        })?;

        let link = service.convert(url).await.map_err(|e| {
            AttemptRecord::new(
                FALLBACK_LABEL,
                FailureCategory::ExternalServiceFailed,
                &e.to_string(),
            )
        })?;

        // Fresh identity for the converted artifact, shielded from the
        // sweeper for the duration of the streamed transfer.
        let id = self.store.allocate();
        let dest = self.store.root().join(format!("{}.mp3", id));
        self.store.mark_in_use(&id);
        let result = download_to_file(&self.http, &link, &dest).await;
        self.store.release(&id);

        match result {
            Ok(()) => {
                let meta = last_meta.clone().unwrap_or(MediaMetadata {
                    title: "audio".into(),
                    duration_seconds: 0,
                    uploader: "Unknown".into(),
                });
                Ok(Extraction {
                    title: meta.title,
                    duration_seconds: meta.duration_seconds,
                    uploader: meta.uploader,
                    mime_type: mime_type_for(&dest),
                    file_path: dest,
                    method: FALLBACK_LABEL.into(),
                })
            }
            Err(e) => {
                self.store.remove_partial(&id);
                Err(AttemptRecord::new(
                    FALLBACK_LABEL,
                    FailureCategory::ExternalServiceFailed,
                    &e.to_string(),
                ))
            }
        }
    }

    /// Metadata-only path: no transfer, no artifact allocation.
    pub async fn peek_metadata(&self, url: &str) -> Result<VideoDetails, ExtractError> {
        if !is_supported_source(url) {
            return Err(ExtractError::InvalidSource(url.to_string()));
        }
        self.fetcher.video_details(url).await
    }

    /// Diagnostic snapshot of the proxy pool.
    pub async fn proxy_pool_status(&self) -> ProxyPoolStatus {
        let survey = self.prober.survey_all(&self.pool).await;
        ProxyPoolStatus {
            total: self.pool.len(),
            usable: survey
                .into_iter()
                .filter(|(_, usable)| *usable)
                .map(|(candidate, _)| candidate.address)
                .collect(),
        }
    }
}
