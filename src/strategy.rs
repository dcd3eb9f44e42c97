// Extraction strategies and the chain builder
//
// Ordering policy: attempt the least conspicuous, highest-fidelity identity
// first, degrading fidelity and stealth together down the chain. Proxy-backed
// variants are inserted after the direct ones, and only when the prober
// confirmed a usable proxy for this chain build. The raw strategy comes last.

use rand::Rng;
use std::path::Path;

/// Extension placeholder resolved by the extractor at write time.
pub const EXT_PLACEHOLDER: &str = "%(ext)s";

/// Simulated client identity: player clients plus matching headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientProfile {
    pub player_clients: &'static str,
    pub user_agent: &'static str,
    /// Extra request headers, sent verbatim
    pub extra_headers: Vec<(String, String)>,
    /// Skip DASH/HLS manifests (mobile clients don't need them)
    pub skip_manifests: bool,
}

/// Network path for a strategy's outbound requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Egress {
    Direct,
    Proxy(String),
}

/// Post-transfer processing. `None` keeps whatever container the source offers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostProcessing {
    Transcode {
        codec: &'static str,
        /// Target bitrate in kbit/s, as the transcoder expects it
        quality: &'static str,
    },
    None,
}

/// One fully-specified recipe for requesting the resource. Built once per
/// request, never mutated, safe to evaluate concurrently across requests.
#[derive(Debug, Clone)]
pub struct ExtractionStrategy {
    pub label: String,
    pub client: ClientProfile,
    /// Declarative preference order over available encodings
    pub format_selector: &'static str,
    pub egress: Egress,
    pub post_processing: PostProcessing,
    /// Target path with `%(ext)s` placeholder (or a fixed extension for raw)
    pub output_template: String,
}

impl ExtractionStrategy {
    pub fn is_proxied(&self) -> bool {
        matches!(self.egress, Egress::Proxy(_))
    }
}

fn android_music_profile() -> ClientProfile {
    ClientProfile {
        player_clients: "android_music,android",
        user_agent: "com.google.android.apps.youtube.music/5.16.51 (Linux; U; Android 11) gzip",
        extra_headers: vec![
            ("Accept-Language".into(), "en-US,en;q=0.9".into()),
            ("Accept".into(), "*/*".into()),
        ],
        skip_manifests: true,
    }
}

fn android_vr_profile() -> ClientProfile {
    ClientProfile {
        player_clients: "android_vr,android_creator",
        user_agent:
            "com.google.android.apps.youtube.vr.oculus/1.37.35 (Linux; U; Android 10; eureka-user 7.1.2) gzip",
        extra_headers: Vec::new(),
        skip_manifests: true,
    }
}

fn mobile_web_profile() -> ClientProfile {
    ClientProfile {
        player_clients: "android,web",
        user_agent: "Mozilla/5.0 (Android 11; Mobile; rv:104.0) Gecko/104.0 Firefox/104.0",
        extra_headers: vec![
            ("Accept-Language".into(), "en-US,en;q=0.9".into()),
            (
                "Accept".into(),
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8".into(),
            ),
        ],
        skip_manifests: true,
    }
}

fn web_profile() -> ClientProfile {
    ClientProfile {
        player_clients: "web",
        user_agent:
            "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
        extra_headers: Vec::new(),
        skip_manifests: false,
    }
}

/// Forwarded-address style headers carrying a randomized public-looking IP,
/// layered onto proxy-backed strategies.
fn spoofed_address_headers() -> Vec<(String, String)> {
    let mut rng = rand::rng();
    let addr = format!(
        "{}.{}.{}.{}",
        rng.random_range(1..=223),
        rng.random_range(0..=255),
        rng.random_range(0..=255),
        rng.random_range(1..=254)
    );
    vec![
        ("X-Forwarded-For".into(), addr.clone()),
        ("X-Real-IP".into(), addr),
    ]
}

fn mp3_192() -> PostProcessing {
    PostProcessing::Transcode {
        codec: "mp3",
        quality: "192",
    }
}

/// Assemble the ordered strategy chain for one request. All strategies target
/// the same artifact identity; only the extension placeholder and processing
/// pipeline vary. Never returns an empty chain, and always includes at least
/// one direct strategy.
pub fn build_chain(
    store_root: &Path,
    artifact_id: &str,
    usable_proxy: Option<&str>,
) -> Vec<ExtractionStrategy> {
    let templated = store_root
        .join(format!("{}.{}", artifact_id, EXT_PLACEHOLDER))
        .to_string_lossy()
        .into_owned();
    let raw_target = store_root
        .join(format!("{}.m4a", artifact_id))
        .to_string_lossy()
        .into_owned();

    let mut chain = vec![
        ExtractionStrategy {
            label: "android-music".into(),
            client: android_music_profile(),
            format_selector: "bestaudio/best",
            egress: Egress::Direct,
            post_processing: mp3_192(),
            output_template: templated.clone(),
        },
        ExtractionStrategy {
            label: "android-vr".into(),
            client: android_vr_profile(),
            format_selector: "bestaudio/best",
            egress: Egress::Direct,
            post_processing: mp3_192(),
            output_template: templated.clone(),
        },
        ExtractionStrategy {
            label: "mobile-web".into(),
            client: mobile_web_profile(),
            format_selector: "bestaudio/best",
            egress: Egress::Direct,
            post_processing: mp3_192(),
            output_template: templated.clone(),
        },
        ExtractionStrategy {
            label: "degraded".into(),
            client: web_profile(),
            format_selector: "worst[ext=mp4]/worst",
            egress: Egress::Direct,
            post_processing: PostProcessing::Transcode {
                codec: "mp3",
                quality: "128",
            },
            output_template: templated.clone(),
        },
    ];

    if let Some(addr) = usable_proxy {
        let mut proxied_music = android_music_profile();
        proxied_music
            .extra_headers
            .extend(spoofed_address_headers());
        chain.push(ExtractionStrategy {
            label: "android-music-proxy".into(),
            client: proxied_music,
            format_selector: "bestaudio/best",
            egress: Egress::Proxy(addr.to_string()),
            post_processing: mp3_192(),
            output_template: templated.clone(),
        });

        let mut proxied_web = mobile_web_profile();
        proxied_web.extra_headers.extend(spoofed_address_headers());
        chain.push(ExtractionStrategy {
            label: "mobile-web-proxy".into(),
            client: proxied_web,
            format_selector: "bestaudio/best",
            egress: Egress::Proxy(addr.to_string()),
            post_processing: mp3_192(),
            output_template: templated,
        });
    }

    // Last resort: deliver whatever raw container the source offers, so
    // something downloadable exists even if transcoding is unavailable.
    chain.push(ExtractionStrategy {
        label: "raw".into(),
        client: web_profile(),
        format_selector: "bestaudio[ext=m4a]/bestaudio/best[ext=m4a]/best",
        egress: Egress::Direct,
        post_processing: PostProcessing::None,
        output_template: raw_target,
    });

    chain
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn root() -> PathBuf {
        PathBuf::from("/tmp/store")
    }

    #[test]
    fn chain_is_never_empty_and_has_direct_strategies() {
        let chain = build_chain(&root(), "abc", None);
        assert!(!chain.is_empty());
        assert!(chain.iter().any(|s| s.egress == Egress::Direct));
    }

    #[test]
    fn empty_pool_yields_no_proxy_strategies() {
        let chain = build_chain(&root(), "abc", None);
        assert!(chain.iter().all(|s| !s.is_proxied()));
        assert_eq!(chain.len(), 5);
    }

    #[test]
    fn proxy_strategies_sit_between_direct_and_raw() {
        let chain = build_chain(&root(), "abc", Some("socks5h://10.0.0.1:1080"));
        assert_eq!(chain.len(), 7);
        // Direct high-fidelity strategies first
        assert!(chain[..4].iter().all(|s| !s.is_proxied()));
        // Proxy-backed variants after the direct ones
        assert!(chain[4].is_proxied());
        assert!(chain[5].is_proxied());
        // Raw last, direct, no post-processing
        let raw = chain.last().unwrap();
        assert_eq!(raw.label, "raw");
        assert_eq!(raw.post_processing, PostProcessing::None);
        assert!(!raw.is_proxied());
    }

    #[test]
    fn proxied_strategies_carry_spoofed_address_headers() {
        let chain = build_chain(&root(), "abc", Some("socks5h://10.0.0.1:1080"));
        for strategy in chain.iter().filter(|s| s.is_proxied()) {
            assert!(strategy
                .client
                .extra_headers
                .iter()
                .any(|(k, _)| k == "X-Forwarded-For"));
        }
    }

    #[test]
    fn all_strategies_target_the_same_identity() {
        let chain = build_chain(&root(), "abc123", Some("socks5h://10.0.0.1:1080"));
        for strategy in &chain {
            assert!(strategy.output_template.contains("abc123"));
        }
        // Only the raw strategy pins its extension
        let raw = chain.last().unwrap();
        assert!(raw.output_template.ends_with(".m4a"));
        assert!(chain[0].output_template.ends_with(EXT_PLACEHOLDER));
    }

    #[test]
    fn ordering_degrades_fidelity() {
        let chain = build_chain(&root(), "abc", None);
        assert_eq!(chain[0].label, "android-music");
        assert_eq!(chain[1].label, "android-vr");
        assert_eq!(chain[2].label, "mobile-web");
        assert_eq!(chain[3].label, "degraded");
        assert_eq!(
            chain[3].post_processing,
            PostProcessing::Transcode {
                codec: "mp3",
                quality: "128"
            }
        );
    }
}
