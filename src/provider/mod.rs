//! SSID provider matching
//!
//! Two stages:
//! 1. case-insensitive substring match of provider names and aliases
//! 2. embedding similarity against the whole roster, accepted at or above
//!    a threshold
//!
//! A third, optional source is the BSSID memory in the vendor store: a
//! provider learned for one access point is reused for its siblings.

pub mod embedding;

use std::path::Path;
use std::sync::Arc;

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::cache::VendorStore;
use crate::cache::key::{is_mac_shaped, provider_ids};
use crate::config::ProviderConfig;
use crate::error::{ApiError, ConfigError, Result};
use embedding::{EmbeddingCache, Embedder, HashingEmbedder, HttpEmbedder, cosine_similarity};

/// Default similarity threshold for the embedding stage
pub const DEFAULT_THRESHOLD: f32 = 0.75;

/// A network provider and the alternative spellings seen in SSIDs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provider {
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl Provider {
    pub fn new(name: &str, aliases: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            aliases: aliases.iter().map(|a| a.to_string()).collect(),
        }
    }

    /// Name first, then aliases, lower-cased, empty entries skipped
    fn patterns(&self) -> impl Iterator<Item = String> + '_ {
        std::iter::once(&self.name)
            .chain(self.aliases.iter())
            .map(|p| p.trim().to_lowercase())
            .filter(|p| !p.is_empty())
    }

    /// Name and aliases as embedded, one text each
    fn embedding_texts(&self) -> Vec<String> {
        let mut texts: Vec<String> = Vec::new();
        for text in std::iter::once(&self.name)
            .chain(self.aliases.iter())
            .map(|p| normalize_for_embedding(p))
        {
            if !text.is_empty() && !texts.contains(&text) {
                texts.push(text);
            }
        }
        texts
    }
}

/// Ordered list of providers; order decides ties
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderRoster {
    providers: Vec<Provider>,
}

impl ProviderRoster {
    pub fn new(providers: Vec<Provider>) -> Self {
        Self { providers }
    }

    /// Providers common in Dutch, German and Italian captures
    pub fn builtin() -> Self {
        Self::new(vec![
            Provider::new("KPN", &[]),
            Provider::new("Ziggo", &["UPC"]),
            Provider::new("Vodafone", &[]),
            Provider::new("Odido", &["Tele2"]),
            Provider::new("TMNL", &[]),
            Provider::new("T-Mobile", &["TMobile", "Telekom"]),
            Provider::new("Trinet", &[]),
            Provider::new("Delta", &[]),
            Provider::new("Fibercop", &["TIM"]),
            Provider::new("Fastweb", &[]),
            Provider::new("Deutsche Glasfaser", &["Glasfaser"]),
        ])
    }

    /// Load a YAML list of `{name, aliases}` entries
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()).into());
        }
        let contents = std::fs::read_to_string(path)?;
        let roster: ProviderRoster = serde_yaml::from_str(&contents).map_err(ConfigError::from)?;
        if roster.providers.iter().any(|p| p.name.trim().is_empty()) {
            return Err(ConfigError::Invalid(format!(
                "{}: provider names must not be empty",
                path.display()
            ))
            .into());
        }
        Ok(roster)
    }

    /// Roster from `--providers`, the config file, or the built-in list
    pub fn resolve(explicit: Option<&Path>, config: &ProviderConfig) -> Result<Self> {
        match explicit.or(config.roster_path.as_deref()) {
            Some(path) => Self::load_from(path),
            None => Ok(Self::builtin()),
        }
    }

    pub fn providers(&self) -> &[Provider] {
        &self.providers
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Stable identity of the roster contents, used as the embedding cache key
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for p in &self.providers {
            hasher.update(p.name.as_bytes());
            hasher.update([0x1f]);
            for alias in &p.aliases {
                hasher.update(alias.as_bytes());
                hasher.update([0x1e]);
            }
            hasher.update([0x1d]);
        }
        format!("{:x}", hasher.finalize())
    }
}

/// Which stage produced a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMethod {
    Alias,
    Embedding,
    /// Recovered from the BSSID memory
    Memory,
}

impl std::fmt::Display for MatchMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Alias => "alias",
            Self::Embedding => "embedding",
            Self::Memory => "memory",
        };
        f.write_str(s)
    }
}

/// Result of matching one SSID
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderMatch {
    pub provider: Option<String>,
    /// 1.0 for alias hits, cosine similarity for embedding hits
    pub score: f32,
    pub method: Option<MatchMethod>,
}

impl ProviderMatch {
    fn none(score: f32) -> Self {
        Self {
            provider: None,
            score,
            method: None,
        }
    }

    fn hit(provider: &str, score: f32, method: MatchMethod) -> Self {
        Self {
            provider: Some(provider.to_string()),
            score,
            method: Some(method),
        }
    }
}

/// Lower-case, drop digits, and reduce punctuation to single spaces
pub fn normalize_for_embedding(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| if c.is_alphabetic() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Texts compared against the providers: the whole query, every token and
/// every pair of adjacent tokens
pub fn query_windows(query: &str) -> Vec<String> {
    let tokens: Vec<&str> = query.split_whitespace().collect();
    let mut windows = vec![query.to_string()];
    for (i, token) in tokens.iter().enumerate() {
        windows.push(token.to_string());
        if let Some(next) = tokens.get(i + 1) {
            windows.push(format!("{} {}", token, next));
        }
    }

    let mut unique: Vec<String> = Vec::with_capacity(windows.len());
    for w in windows {
        if !unique.contains(&w) {
            unique.push(w);
        }
    }
    unique
}

/// Two-stage SSID matcher
pub struct ProviderMatcher {
    embedder: Arc<dyn Embedder>,
    cache: EmbeddingCache,
    threshold: f32,
}

impl ProviderMatcher {
    pub fn new(embedder: Arc<dyn Embedder>, threshold: f32) -> Self {
        Self {
            embedder,
            cache: EmbeddingCache::new(),
            threshold,
        }
    }

    /// Matcher configured from settings: HTTP embedder when a URL is set
    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        let embedder: Arc<dyn Embedder> = match &config.embedding_url {
            Some(url) => Arc::new(HttpEmbedder::new(url, std::time::Duration::from_secs(30))?),
            None => Arc::new(HashingEmbedder::default()),
        };
        Ok(Self::new(embedder, config.similarity_threshold))
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn embedder_name(&self) -> &str {
        self.embedder.name()
    }

    /// Forget memoised provider vectors
    pub async fn clear_cache(&self) {
        self.cache.clear().await;
    }

    /// Match an SSID against `roster`.
    ///
    /// Embedding backend failures degrade to "no match".
    pub async fn match_provider(&self, ssid: &str, roster: &ProviderRoster) -> ProviderMatch {
        let ssid = ssid.trim();
        if ssid.is_empty() || roster.is_empty() || is_mac_shaped(ssid) {
            return ProviderMatch::none(0.0);
        }

        if let Some(provider) = Self::fast_match(ssid, roster) {
            debug!("SSID '{}' matched {} by alias", ssid, provider.name);
            return ProviderMatch::hit(&provider.name, 1.0, MatchMethod::Alias);
        }

        match self.semantic_match(ssid, roster).await {
            Ok(Some((provider, score))) if score >= self.threshold => {
                debug!("SSID '{}' matched {} by embedding ({:.3})", ssid, provider, score);
                ProviderMatch::hit(&provider, score, MatchMethod::Embedding)
            }
            Ok(Some((_, score))) => ProviderMatch::none(score),
            Ok(None) => ProviderMatch::none(0.0),
            Err(e) => {
                warn!("Embedding match for '{}' failed: {}", ssid, e);
                ProviderMatch::none(0.0)
            }
        }
    }

    /// Match, then fall back to the BSSID memory; remembers new matches
    pub async fn match_with_memory(
        &self,
        ssid: &str,
        mac: &str,
        roster: &ProviderRoster,
        store: &dyn VendorStore,
    ) -> ProviderMatch {
        let found = self.match_provider(ssid, roster).await;
        let Some((mac_id, sub_prefix)) = provider_ids(mac) else {
            return found;
        };

        match &found.provider {
            Some(name) => {
                if let Err(e) = store.put_provider(&mac_id, &sub_prefix, name) {
                    warn!("Could not remember provider for {}: {}", mac_id, e);
                }
                found
            }
            None => match store.get_provider(&mac_id, &sub_prefix) {
                Ok(Some(name)) => ProviderMatch::hit(&name, found.score, MatchMethod::Memory),
                Ok(None) => found,
                Err(e) => {
                    warn!("Provider memory lookup for {} failed: {}", mac_id, e);
                    found
                }
            },
        }
    }

    /// First provider whose name or alias occurs in the SSID
    pub fn fast_match<'a>(ssid: &str, roster: &'a ProviderRoster) -> Option<&'a Provider> {
        let folded = ssid.to_lowercase();
        roster
            .providers()
            .iter()
            .find(|p| p.patterns().any(|pattern| folded.contains(&pattern)))
    }

    /// Best provider by cosine similarity, regardless of the threshold.
    ///
    /// A provider scores the best similarity between any of its names and
    /// any window of the SSID, so decorations around the name do not dilute it.
    pub async fn semantic_match(
        &self,
        ssid: &str,
        roster: &ProviderRoster,
    ) -> std::result::Result<Option<(String, f32)>, ApiError> {
        let query = normalize_for_embedding(ssid);
        if query.is_empty() || roster.is_empty() {
            return Ok(None);
        }

        let mut texts: Vec<String> = Vec::new();
        let mut owners: Vec<usize> = Vec::new();
        for (idx, provider) in roster.providers().iter().enumerate() {
            for text in provider.embedding_texts() {
                texts.push(text);
                owners.push(idx);
            }
        }
        let provider_vectors = self
            .cache
            .get_or_build(&roster.fingerprint(), &texts, self.embedder.as_ref())
            .await?;

        let windows = query_windows(&query);
        let window_vectors = self.embedder.embed(&windows).await?;
        if window_vectors.len() != windows.len() {
            return Err(ApiError::Embedding(format!(
                "Expected {} embeddings, got {}",
                windows.len(),
                window_vectors.len()
            )));
        }

        let mut scores = vec![f32::MIN; roster.len()];
        for (owner, vector) in owners.iter().zip(provider_vectors.iter()) {
            for window in &window_vectors {
                let score = cosine_similarity(window, vector);
                if score > scores[*owner] {
                    scores[*owner] = score;
                }
            }
        }

        let best = roster
            .providers()
            .iter()
            .zip(scores)
            .filter(|(_, score)| *score > f32::MIN)
            .fold(None::<(&Provider, f32)>, |best, (p, score)| match best {
                Some((_, top)) if top >= score => best,
                _ => Some((p, score)),
            });

        Ok(best.map(|(p, score)| (p.name.clone(), score)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::SqliteVendorStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Puts known provider words on their own axis and everything else on
    /// a few shared noise buckets, so similarities are predictable.
    struct KeywordEmbedder {
        axes: Vec<&'static str>,
        calls: AtomicUsize,
    }

    const NOISE_BUCKETS: usize = 8;

    impl KeywordEmbedder {
        fn new(axes: &[&'static str]) -> Self {
            Self {
                axes: axes.to_vec(),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Embedder for KeywordEmbedder {
        async fn embed(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(texts
                .iter()
                .map(|text| {
                    let mut v = vec![0.0f32; self.axes.len() + NOISE_BUCKETS];
                    for token in text.split_whitespace() {
                        match self.axes.iter().position(|a| *a == token) {
                            Some(i) => v[i] += 1.0,
                            None => {
                                let bucket = token.bytes().map(usize::from).sum::<usize>() % NOISE_BUCKETS;
                                v[self.axes.len() + bucket] += 0.3;
                            }
                        }
                    }
                    v
                })
                .collect())
        }

        fn name(&self) -> &str {
            "keyword"
        }
    }

    fn roster() -> ProviderRoster {
        ProviderRoster::new(vec![
            Provider::new("KPN", &[]),
            Provider::new("Vodafone", &[]),
            Provider::new("TMNL", &[]),
        ])
    }

    fn matcher() -> (ProviderMatcher, Arc<KeywordEmbedder>) {
        let embedder = Arc::new(KeywordEmbedder::new(&["kpn", "vodafone", "tmnl"]));
        (ProviderMatcher::new(embedder.clone(), DEFAULT_THRESHOLD), embedder)
    }

    #[tokio::test]
    async fn test_alias_match_skips_embeddings() {
        let (matcher, embedder) = matcher();
        let m = matcher.match_provider("Vodafone-A1B2C3", &roster()).await;

        assert_eq!(m.provider.as_deref(), Some("Vodafone"));
        assert_eq!(m.method, Some(MatchMethod::Alias));
        assert_eq!(m.score, 1.0);
        assert_eq!(embedder.calls(), 0);
    }

    #[test]
    fn test_alias_match_is_case_insensitive_and_ordered() {
        let roster = ProviderRoster::new(vec![
            Provider::new("Ziggo", &["upc"]),
            Provider::new("UPC Legacy", &["UPC"]),
        ]);
        let found = ProviderMatcher::fast_match("UPC1234567", &roster).unwrap();
        assert_eq!(found.name, "Ziggo");
    }

    #[tokio::test]
    async fn test_embedding_recovers_decorated_ssid() {
        let (matcher, _embedder) = matcher();
        let (provider, score) = matcher
            .semantic_match("TMNL-AC11C1_guest1", &roster())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(provider, "TMNL");
        assert!(score >= DEFAULT_THRESHOLD, "score {score}");
    }

    #[tokio::test]
    async fn test_embedding_fallback_used_when_no_alias_hits() {
        let embedder = Arc::new(KeywordEmbedder::new(&["odido"]));
        let matcher = ProviderMatcher::new(embedder.clone(), DEFAULT_THRESHOLD);
        let roster = ProviderRoster::new(vec![Provider::new("Odido NL", &[])]);

        // "odido nl" is not a substring of the SSID
        let m = matcher.match_provider("Odido-guest", &roster).await;
        assert_eq!(m.provider.as_deref(), Some("Odido NL"));
        assert_eq!(m.method, Some(MatchMethod::Embedding));
        assert!(m.score >= DEFAULT_THRESHOLD);
        assert_eq!(embedder.calls(), 2);
    }

    #[tokio::test]
    async fn test_default_embedder_matches_misspelled_names() {
        let config = ProviderConfig::default();
        let matcher = ProviderMatcher::from_config(&config).unwrap();
        assert_eq!(matcher.embedder_name(), "hashing");
        let roster = ProviderRoster::builtin();

        for (ssid, expected) in [
            ("Vodafon-123", "Vodafone"),
            ("Zigo-5G", "Ziggo"),
            ("T Mobile Home", "T-Mobile"),
            ("Deutsch-Glasfasr", "Deutsche Glasfaser"),
        ] {
            let m = matcher.match_provider(ssid, &roster).await;
            assert_eq!(m.provider.as_deref(), Some(expected), "{ssid}");
            assert_eq!(m.method, Some(MatchMethod::Embedding), "{ssid}");
            assert!(m.score >= DEFAULT_THRESHOLD, "{ssid}: {}", m.score);
        }

        for ssid in ["Linksys", "cafe", "Random-SSID-xyz"] {
            let m = matcher.match_provider(ssid, &roster).await;
            assert!(m.provider.is_none(), "{ssid} matched {:?}", m.provider);
        }
    }

    #[test]
    fn test_query_windows() {
        assert_eq!(
            query_windows("tmnl ac guest"),
            vec!["tmnl ac guest", "tmnl", "tmnl ac", "ac", "ac guest", "guest"]
        );
        assert_eq!(query_windows("kpn"), vec!["kpn"]);
    }

    #[tokio::test]
    async fn test_unrelated_ssid_has_no_match() {
        let (matcher, _embedder) = matcher();
        let m = matcher.match_provider("Random-SSID-xyz", &roster()).await;
        assert!(m.provider.is_none());
        assert!(m.score < DEFAULT_THRESHOLD);
    }

    #[tokio::test]
    async fn test_mac_shaped_ssid_is_opaque() {
        let (matcher, embedder) = matcher();
        let m = matcher.match_provider("a4:5e:60:01:02:03", &roster()).await;
        assert!(m.provider.is_none());
        assert_eq!(embedder.calls(), 0);
    }

    #[tokio::test]
    async fn test_provider_vectors_are_cached_per_roster() {
        let (matcher, embedder) = matcher();
        matcher.match_provider("random one", &roster()).await;
        matcher.match_provider("random two", &roster()).await;
        // One roster batch plus one call per SSID
        assert_eq!(embedder.calls(), 3);

        let mut other = roster().providers().to_vec();
        other.push(Provider::new("Ziggo", &[]));
        matcher
            .match_provider("random three", &ProviderRoster::new(other))
            .await;
        assert_eq!(embedder.calls(), 5);

        matcher.clear_cache().await;
        matcher.match_provider("random four", &roster()).await;
        assert_eq!(embedder.calls(), 7);
    }

    #[tokio::test]
    async fn test_memory_fallback_by_bssid() {
        let (matcher, _embedder) = matcher();
        let store = SqliteVendorStore::open_in_memory().unwrap();

        let learned = matcher
            .match_with_memory("KPN-Modem", "A4:5E:60:01:02:03", &roster(), &store)
            .await;
        assert_eq!(learned.provider.as_deref(), Some("KPN"));

        let recalled = matcher
            .match_with_memory("Random-SSID-xyz", "A4:5E:60:01:99:99", &roster(), &store)
            .await;
        assert_eq!(recalled.provider.as_deref(), Some("KPN"));
        assert_eq!(recalled.method, Some(MatchMethod::Memory));
    }

    #[test]
    fn test_normalize_for_embedding() {
        assert_eq!(normalize_for_embedding("TMNL-AC11C1_guest1"), "tmnl ac c guest");
        assert_eq!(normalize_for_embedding("  KPN!!  "), "kpn");
        assert_eq!(normalize_for_embedding("1234"), "");
    }

    #[test]
    fn test_fingerprint_tracks_contents() {
        let a = ProviderRoster::builtin();
        let mut providers = a.providers().to_vec();
        providers[0].aliases.push("extra".into());
        assert_ne!(a.fingerprint(), ProviderRoster::new(providers).fingerprint());
        assert_eq!(a.fingerprint(), ProviderRoster::builtin().fingerprint());
    }

    #[test]
    fn test_roster_yaml_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("providers.yaml");
        std::fs::write(
            &path,
            "- name: KPN\n  aliases: [KPN-Modem]\n- name: Ziggo\n",
        )
        .unwrap();

        let roster = ProviderRoster::load_from(&path).unwrap();
        assert_eq!(roster.len(), 2);
        assert_eq!(roster.providers()[1].aliases.len(), 0);
    }

    #[test]
    fn test_builtin_roster_contents() {
        let roster = ProviderRoster::builtin();
        let names: Vec<&str> = roster.providers().iter().map(|p| p.name.as_str()).collect();
        assert!(names.contains(&"TMNL"));
        assert!(names.contains(&"Deutsche Glasfaser"));
        assert_eq!(roster.len(), 11);
    }
}
