//! Capability registry: which backends exist, which are usable right now,
//! and which one to pick.
//!
//! The registry is populated once at startup and shared read-only by every
//! in-flight task. Availability is never cached; each query re-runs the
//! descriptor's probe.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use dubforge_core::{
    BackendHandle, BackendInfo, CapabilityKind, Error, LipSyncer, QualityTier, Result,
    SpeechToText, TextToSpeech, VoiceCloner,
};

/// Availability predicate, re-evaluated on every call.
pub type AvailabilityProbe = Arc<dyn Fn() -> bool + Send + Sync>;

/// Metadata and availability probe for one registered backend.
#[derive(Clone)]
pub struct CapabilityDescriptor {
    name: String,
    handle: BackendHandle,
    info: BackendInfo,
    probe: AvailabilityProbe,
}

impl CapabilityDescriptor {
    /// Describe `handle` under its own name, probing the backend itself.
    pub fn new(handle: BackendHandle) -> Self {
        let name = handle.name().to_string();
        Self::named(name, handle)
    }

    /// Describe `handle` under an explicit registry name.
    pub fn named(name: impl Into<String>, handle: BackendHandle) -> Self {
        let info = handle.info();
        let probed = handle.clone();
        Self {
            name: name.into(),
            handle,
            info,
            probe: Arc::new(move || probed.is_available()),
        }
    }

    /// Replace the availability predicate.
    pub fn with_availability(mut self, probe: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        self.probe = Arc::new(probe);
        self
    }

    pub fn kind(&self) -> CapabilityKind {
        self.handle.kind()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.info.description
    }

    pub fn languages(&self) -> &BTreeSet<String> {
        &self.info.languages
    }

    pub fn quality_tiers(&self) -> &BTreeSet<QualityTier> {
        &self.info.quality_tiers
    }

    pub fn info(&self) -> &BackendInfo {
        &self.info
    }

    pub fn handle(&self) -> &BackendHandle {
        &self.handle
    }

    pub fn is_available(&self) -> bool {
        (self.probe)()
    }

    pub fn satisfies(&self, constraints: &SelectionConstraints) -> bool {
        let language_ok = constraints
            .language
            .as_deref()
            .map_or(true, |l| self.info.supports_language(l));
        let quality_ok = constraints
            .quality
            .map_or(true, |q| self.info.supports_quality(q));
        language_ok && quality_ok
    }
}

impl fmt::Debug for CapabilityDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityDescriptor")
            .field("kind", &self.kind())
            .field("name", &self.name)
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

/// Requirements a selected backend should meet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionConstraints {
    pub language: Option<String>,
    pub quality: Option<QualityTier>,
}

impl SelectionConstraints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn quality(mut self, quality: QualityTier) -> Self {
        self.quality = Some(quality);
        self
    }
}

/// Per-kind backend registry.
#[derive(Debug, Clone, Default)]
pub struct CapabilityRegistry {
    by_kind: BTreeMap<CapabilityKind, Vec<CapabilityDescriptor>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a descriptor under `kind`.
    ///
    /// # Errors
    ///
    /// - [`Error::DuplicateBackend`] if `(kind, name)` is already registered.
    /// - [`Error::Validation`] if the descriptor's backend is of another kind.
    pub fn register(&mut self, kind: CapabilityKind, descriptor: CapabilityDescriptor) -> Result<()> {
        if descriptor.kind() != kind {
            return Err(Error::Validation(format!(
                "backend '{}' is a {} backend, not {kind}",
                descriptor.name(),
                descriptor.kind()
            )));
        }

        let entries = self.by_kind.entry(kind).or_default();
        if entries.iter().any(|d| d.name == descriptor.name) {
            return Err(Error::DuplicateBackend {
                kind,
                name: descriptor.name,
            });
        }

        tracing::debug!(kind = kind.as_str(), name = %descriptor.name, "registered backend");
        entries.push(descriptor);
        Ok(())
    }

    /// Register a handle under its own name and kind.
    pub fn register_handle(&mut self, handle: BackendHandle) -> Result<()> {
        let kind = handle.kind();
        self.register(kind, CapabilityDescriptor::new(handle))
    }

    /// Descriptors of `kind` in registration order.
    pub fn list(&self, kind: CapabilityKind) -> &[CapabilityDescriptor] {
        self.by_kind.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn get(&self, kind: CapabilityKind, name: &str) -> Option<&CapabilityDescriptor> {
        self.list(kind).iter().find(|d| d.name == name)
    }

    /// Re-run the availability probe. Unregistered names are unavailable.
    pub fn is_available(&self, kind: CapabilityKind, name: &str) -> bool {
        self.get(kind, name).is_some_and(CapabilityDescriptor::is_available)
    }

    /// Pick a backend of `kind`.
    ///
    /// Preferred names are tried first, then every registered backend in
    /// registration order; both passes require availability and the
    /// constraints. If nothing satisfies the constraints, the first available
    /// backend in registration order is returned anyway.
    ///
    /// # Errors
    ///
    /// [`Error::NoBackendAvailable`] when no backend of `kind` is available.
    pub fn select<S: AsRef<str>>(
        &self,
        kind: CapabilityKind,
        preferences: &[S],
        constraints: &SelectionConstraints,
    ) -> Result<String> {
        let entries = self.list(kind);
        // Probe each backend once per call.
        let available: Vec<bool> = entries.iter().map(CapabilityDescriptor::is_available).collect();
        let usable = |i: usize| available[i] && entries[i].satisfies(constraints);

        for preferred in preferences {
            let preferred = preferred.as_ref();
            if let Some(i) = entries.iter().position(|d| d.name == preferred) {
                if usable(i) {
                    tracing::debug!(kind = kind.as_str(), name = preferred, "selected preferred backend");
                    return Ok(preferred.to_string());
                }
            }
        }

        if let Some(i) = (0..entries.len()).find(|&i| usable(i)) {
            tracing::debug!(kind = kind.as_str(), name = %entries[i].name, "selected backend by registration order");
            return Ok(entries[i].name.clone());
        }

        if let Some(i) = available.iter().position(|&a| a) {
            tracing::info!(
                kind = kind.as_str(),
                name = %entries[i].name,
                ?constraints,
                "no backend satisfies constraints, using first available"
            );
            return Ok(entries[i].name.clone());
        }

        Err(Error::NoBackendAvailable(kind))
    }

    /// Look up `name` and require it to be available right now.
    pub fn resolve(&self, kind: CapabilityKind, name: &str) -> Result<&CapabilityDescriptor> {
        match self.get(kind, name) {
            Some(d) if d.is_available() => Ok(d),
            _ => Err(Error::backend_unavailable(kind, name)),
        }
    }

    pub fn speech_to_text(&self, name: &str) -> Result<Arc<dyn SpeechToText>> {
        self.resolve(CapabilityKind::SpeechToText, name)?
            .handle()
            .as_speech_to_text()
            .ok_or_else(|| Error::backend_unavailable(CapabilityKind::SpeechToText, name))
    }

    pub fn text_to_speech(&self, name: &str) -> Result<Arc<dyn TextToSpeech>> {
        self.resolve(CapabilityKind::TextToSpeech, name)?
            .handle()
            .as_text_to_speech()
            .ok_or_else(|| Error::backend_unavailable(CapabilityKind::TextToSpeech, name))
    }

    pub fn voice_cloner(&self, name: &str) -> Result<Arc<dyn VoiceCloner>> {
        self.resolve(CapabilityKind::VoiceCloning, name)?
            .handle()
            .as_voice_cloner()
            .ok_or_else(|| Error::backend_unavailable(CapabilityKind::VoiceCloning, name))
    }

    pub fn lip_syncer(&self, name: &str) -> Result<Arc<dyn LipSyncer>> {
        self.resolve(CapabilityKind::LipSync, name)?
            .handle()
            .as_lip_syncer()
            .ok_or_else(|| Error::backend_unavailable(CapabilityKind::LipSync, name))
    }
}
