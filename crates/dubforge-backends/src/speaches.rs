//! Speaches text-to-speech backend.
//!
//! Talks to a Speaches server over HTTP: `POST /synthesize` returns the audio
//! bytes, `GET /voices` lists what the server can speak.

use std::collections::BTreeMap;
use std::net::TcpStream;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use dubforge_core::config::SpeachesConfig;
use dubforge_core::{
    Backend, BackendInfo, CapabilityKind, Error, QualityTier, Result, SynthesisRequest,
    TextToSpeech,
};
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;

const CONNECT_TIMEOUT: Duration = Duration::from_millis(500);
const FALLBACK_VOICE: &str = "default";

#[derive(Debug, Serialize)]
struct SynthesizeBody<'a> {
    text: &'a str,
    voice: &'a str,
    language: &'a str,
    quality: &'a str,
    speed: f64,
}

#[derive(Debug, Deserialize)]
struct VoiceList {
    #[serde(default)]
    voices: Vec<VoiceEntry>,
}

#[derive(Debug, Deserialize)]
struct VoiceEntry {
    id: String,
}

#[derive(Debug)]
pub struct SpeachesTts {
    client: reqwest::Client,
    base_url: String,
    voices: BTreeMap<String, String>,
    languages: Vec<String>,
    speed: f64,
    server_voices: OnceCell<Vec<String>>,
}

impl SpeachesTts {
    pub const NAME: &'static str = "speaches";

    pub fn new(config: &SpeachesConfig, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "falling back to default HTTP client for speaches");
                reqwest::Client::new()
            });

        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            voices: config.voices.clone(),
            languages: config.languages.clone(),
            speed: config.speed,
            server_voices: OnceCell::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn supports(&self, language: &str) -> bool {
        self.languages.is_empty() || self.languages.iter().any(|l| l == language)
    }

    /// Voice ids the server reports, fetched once. An unreachable or
    /// malformed listing leaves the list empty.
    async fn server_voices(&self) -> &[String] {
        self.server_voices
            .get_or_init(|| async {
                match self.fetch_voices().await {
                    Ok(voices) => voices,
                    Err(e) => {
                        tracing::warn!(error = %e, "could not list speaches voices");
                        Vec::new()
                    }
                }
            })
            .await
    }

    async fn fetch_voices(&self) -> Result<Vec<String>> {
        let list: VoiceList = self
            .client
            .get(self.url("/voices"))
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| Error::tool(Self::NAME, e.to_string()))?
            .json()
            .await
            .map_err(|e| Error::parse("speaches voice list", e))?;
        Ok(list.voices.into_iter().map(|v| v.id).collect())
    }

    async fn resolve_voice(&self, language: &str, quality: QualityTier, hint: Option<&str>) -> String {
        if let Some(hint) = hint {
            return hint.to_string();
        }
        if let Some(voice) = self.voices.get(language) {
            return voice.clone();
        }
        select_voice(self.server_voices().await, language, quality)
    }
}

/// Prefer a voice naming the language, then one also naming the quality
/// tier, then whatever the server lists first.
fn select_voice(available: &[String], language: &str, quality: QualityTier) -> String {
    let matching: Vec<&String> = available
        .iter()
        .filter(|v| v.to_lowercase().contains(language))
        .collect();

    matching
        .iter()
        .find(|v| v.to_lowercase().contains(quality.as_str()))
        .or_else(|| matching.first())
        .map(|v| v.to_string())
        .or_else(|| available.first().cloned())
        .unwrap_or_else(|| FALLBACK_VOICE.to_string())
}

impl Backend for SpeachesTts {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn info(&self) -> BackendInfo {
        BackendInfo::new("Speaches HTTP text-to-speech server")
            .with_languages(self.languages.iter().cloned())
            .with_quality_tiers(QualityTier::ALL)
            .with_requirement(format!("Speaches server reachable at {}", self.base_url))
    }

    /// Reachable when the server's port accepts a TCP connection.
    fn is_available(&self) -> bool {
        let Ok(url) = reqwest::Url::parse(&self.base_url) else {
            return false;
        };
        let Ok(addrs) = url.socket_addrs(|| None) else {
            return false;
        };
        addrs
            .iter()
            .any(|addr| TcpStream::connect_timeout(addr, CONNECT_TIMEOUT).is_ok())
    }
}

#[async_trait]
impl TextToSpeech for SpeachesTts {
    async fn synthesize(&self, request: SynthesisRequest<'_>) -> Result<PathBuf> {
        let text = request.text.trim();
        if text.is_empty() {
            return Err(Error::EmptyInput("no text to synthesize".into()));
        }
        if !self.supports(request.language) {
            return Err(Error::UnsupportedLanguage {
                backend: Self::NAME.to_string(),
                language: request.language.to_string(),
            });
        }

        let voice = self
            .resolve_voice(request.language, request.quality, request.voice)
            .await;

        tracing::info!(
            output = %request.output.display(),
            language = request.language,
            voice = %voice,
            chars = text.len(),
            "synthesizing with speaches"
        );

        let body = SynthesizeBody {
            text,
            voice: &voice,
            language: request.language,
            quality: request.quality.as_str(),
            speed: self.speed,
        };
        let resp = self
            .client
            .post(self.url("/synthesize"))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    Error::backend_unavailable(CapabilityKind::TextToSpeech, Self::NAME)
                } else {
                    Error::tool(Self::NAME, e.to_string())
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            return Err(Error::tool(
                Self::NAME,
                format!("HTTP {status}: {}", detail.trim()),
            ));
        }

        let audio = resp
            .bytes()
            .await
            .map_err(|e| Error::tool(Self::NAME, format!("reading response: {e}")))?;
        if audio.is_empty() {
            return Err(Error::tool(Self::NAME, "server returned no audio"));
        }

        tokio::fs::write(request.output, &audio).await?;
        tracing::debug!(bytes = audio.len(), "speaches synthesis finished");
        Ok(request.output.to_path_buf())
    }
}
