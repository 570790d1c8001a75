//! Voice cloning through a user-configured command line.
//!
//! Any converter that can be driven from a shell (OpenVoice, RVC, so-vits
//! wrappers, ...) plugs in through an argument template.

use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use dubforge_av::{TemplateContext, ToolCommand};
use dubforge_core::config::VoiceCloneConfig;
use dubforge_core::media::has_extension;
use dubforge_core::{
    Backend, BackendInfo, CapabilityKind, Error, Result, VoiceCloner, VoiceModel,
};

#[derive(Debug, Clone)]
pub struct CommandVoiceCloner {
    program: Option<String>,
    args: Vec<String>,
    train_args: Vec<String>,
    model_dir: PathBuf,
    reference_range: RangeInclusive<f64>,
    timeout: Duration,
}

impl CommandVoiceCloner {
    pub const NAME: &'static str = "voice_clone";

    pub fn new(config: &VoiceCloneConfig, timeout: Duration) -> Self {
        Self {
            program: config.program.clone(),
            args: config.args.clone(),
            train_args: config.train_args.clone(),
            model_dir: config.model_dir.clone(),
            reference_range: config.min_reference_secs..=config.max_reference_secs,
            timeout,
        }
    }

    /// Configured program. Whether it is installed is left to
    /// `is_available`; a missing binary surfaces as a spawn failure.
    fn program(&self) -> Result<&str> {
        match self.program.as_deref() {
            Some(p) if !self.args.is_empty() => Ok(p),
            _ => Err(Error::backend_unavailable(CapabilityKind::VoiceCloning, Self::NAME)),
        }
    }

    fn render(&self, templates: &[String], ctx: &TemplateContext) -> Result<Vec<String>> {
        let missing = ctx.unresolved(templates);
        if !missing.is_empty() {
            return Err(Error::Validation(format!(
                "voice_clone command uses unknown placeholders: {}",
                missing.join(", ")
            )));
        }
        Ok(ctx.substitute_all(templates))
    }

    fn check_reference(&self, reference: &Path) -> Result<()> {
        if !reference.exists() {
            return Err(Error::ReferenceAudioInvalid(format!(
                "{} does not exist",
                reference.display()
            )));
        }
        if !has_extension(reference, self.reference_formats()) {
            return Err(Error::ReferenceAudioInvalid(format!(
                "{} is not one of {}",
                reference.display(),
                self.reference_formats().join(", ")
            )));
        }
        Ok(())
    }
}

impl Backend for CommandVoiceCloner {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn info(&self) -> BackendInfo {
        let program = self.program.as_deref().unwrap_or("<unset>");
        BackendInfo::new("external voice conversion command")
            .with_requirement(format!("{program} on PATH"))
            .with_requirement(format!(
                "reference audio of {:.0}-{:.0} seconds",
                self.reference_range.start(),
                self.reference_range.end()
            ))
    }

    fn is_available(&self) -> bool {
        self.program().is_ok_and(|p| which::which(p).is_ok())
    }
}

#[async_trait]
impl VoiceCloner for CommandVoiceCloner {
    async fn clone_voice(&self, source: &Path, reference: &Path, output: &Path) -> Result<PathBuf> {
        let program = self.program()?;
        self.check_reference(reference)?;

        let ctx = TemplateContext::new()
            .with_path("source", source)
            .with_path("reference", reference)
            .with_path("output", output);
        let args = self.render(&self.args, &ctx)?;

        tracing::info!(
            source = %source.display(),
            reference = %reference.display(),
            program,
            "cloning voice"
        );

        ToolCommand::new(program)
            .timeout(self.timeout)
            .args(args)
            .execute()
            .await?;

        if !output.exists() {
            return Err(Error::tool(
                program,
                format!("no audio written to {}", output.display()),
            ));
        }
        Ok(output.to_path_buf())
    }

    async fn train_voice_model(&self, references: &[PathBuf], name: &str) -> Result<VoiceModel> {
        let program = self.program()?;
        if self.train_args.is_empty() {
            return Err(Error::Validation(
                "backends.voice_clone.train_args is not configured".into(),
            ));
        }
        if references.is_empty() {
            return Err(Error::ReferenceAudioInvalid("no reference audio given".into()));
        }
        for reference in references {
            self.check_reference(reference)?;
        }

        let model_path = self.model_dir.join(name);
        tokio::fs::create_dir_all(&model_path).await?;

        let joined = references
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(",");
        let ctx = TemplateContext::new()
            .with_var("references", joined)
            .with_var("name", name)
            .with_path("model_dir", &model_path);
        let args = self.render(&self.train_args, &ctx)?;

        tracing::info!(name, references = references.len(), "training voice model");

        ToolCommand::new(program)
            .timeout(self.timeout)
            .args(args)
            .execute()
            .await?;

        Ok(VoiceModel {
            name: name.to_string(),
            path: model_path,
            references: references.to_vec(),
        })
    }

    fn reference_duration_range(&self) -> RangeInclusive<f64> {
        self.reference_range.clone()
    }
}
