//! Artifact generation
//!
//! The generative services sit behind [`GenerationPipeline`]. The
//! [`ArtifactGenerator`] runs the steps in order, reports each one to the
//! reducer as a loading step and assembles the final [`GeneratedArtifact`].

use super::rate_limit::{RateLimit, RateLimiter};
use super::reducer::SharedAppState;
use super::types::{AppAction, Gender, GeneratedArtifact, LoadingStep, Scenario};
use crate::storage::MusicLibrary;
use crate::{ReverieError, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

const IMAGE_BUCKET: &str = "image";
const ANALYSIS_BUCKET: &str = "analysis";
const TTS_BUCKET: &str = "tts";
const IMAGE_EDIT_BUCKET: &str = "image_edit";

/// Generative services used to build an artifact
///
/// Request and response formats are up to the implementation; only the
/// produced text and base64 payloads matter here.
#[async_trait]
pub trait GenerationPipeline: Send + Sync {
    /// Symbolic image for `prompt`, as a data URL
    async fn generate_image(&self, prompt: &str) -> Result<String>;

    async fn generate_analysis(&self, title: &str, prompt: &str, gender: Gender)
        -> Result<String>;

    async fn generate_affirmation(&self, analysis: &str, gender: Gender) -> Result<String>;

    /// Spoken analysis as base64 s16le PCM
    async fn generate_narration(&self, analysis: &str, gender: Gender) -> Result<String>;

    /// Edited copy of `image` (a data URL), as a data URL
    async fn edit_image(&self, image: &str, prompt: &str) -> Result<String>;
}

fn step_failure_message(step: LoadingStep) -> String {
    format!("Could not complete step '{}'. Please try again.", step)
}

pub struct ArtifactGenerator {
    pipeline: Arc<dyn GenerationPipeline>,
    limiter: RateLimiter,
    music: Option<Arc<MusicLibrary>>,
}

impl ArtifactGenerator {
    pub fn new(pipeline: Arc<dyn GenerationPipeline>) -> Self {
        Self {
            pipeline,
            limiter: RateLimiter::new(),
            music: None,
        }
    }

    /// Attach background music from `library` to every artifact
    pub fn with_music(mut self, library: Arc<MusicLibrary>) -> Self {
        self.music = Some(library);
        self
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Generate an artifact for `scenario` with the voice chosen in `state`
    ///
    /// Drives `state` through start, loading steps and success or failure.
    /// A failed step is named in the state's error message; rate-limit errors
    /// are returned as they are, everything else as `Generation`.
    pub async fn generate(
        &self,
        state: &SharedAppState,
        scenario: &Scenario,
    ) -> Result<GeneratedArtifact> {
        let gender = state.read().user_input.gender;
        state.dispatch(AppAction::StartGeneration);

        let request = Uuid::new_v4();
        info!("Generation {} started for scenario {}", request, scenario.id);

        let mut step = LoadingStep::Prompt;
        match self.run_steps(state, scenario, gender, &mut step).await {
            Ok(artifact) => {
                info!("Generation {} finished: {}", request, artifact.id);
                state.dispatch(AppAction::GenerationSuccess(artifact.clone()));
                Ok(artifact)
            }
            Err(e) => {
                error!("Generation {} failed at {}: {}", request, step, e);
                state.dispatch(AppAction::GenerationFailure(step_failure_message(step)));
                match e {
                    ReverieError::RateLimited { .. } => Err(e),
                    other => Err(ReverieError::Generation {
                        step: step.to_string(),
                        message: other.to_string(),
                    }),
                }
            }
        }
    }

    async fn run_steps(
        &self,
        state: &SharedAppState,
        scenario: &Scenario,
        gender: Gender,
        step: &mut LoadingStep,
    ) -> Result<GeneratedArtifact> {
        *step = LoadingStep::Image;
        state.dispatch(AppAction::SetLoadingStep(*step));
        self.limiter.acquire(IMAGE_BUCKET, RateLimit::IMAGE_GENERATION)?;
        let image = self.pipeline.generate_image(&scenario.prompt).await?;

        *step = LoadingStep::Analysis;
        state.dispatch(AppAction::SetLoadingStep(*step));
        self.limiter.acquire(ANALYSIS_BUCKET, RateLimit::ANALYSIS)?;
        let analysis = self
            .pipeline
            .generate_analysis(&scenario.title, &scenario.prompt, gender)
            .await?;

        *step = LoadingStep::Affirmation;
        state.dispatch(AppAction::SetLoadingStep(*step));
        self.limiter.acquire(ANALYSIS_BUCKET, RateLimit::ANALYSIS)?;
        let affirmation = self.pipeline.generate_affirmation(&analysis, gender).await?;
        self.limiter.acquire(TTS_BUCKET, RateLimit::TTS_GENERATION)?;
        let narration = self.pipeline.generate_narration(&analysis, gender).await?;

        let background_music_data = match &self.music {
            Some(library) => library.background_music(scenario.area).await,
            None => String::new(),
        };

        let timestamp = Utc::now();
        Ok(GeneratedArtifact {
            id: format!("{}-{}", scenario.id, timestamp.timestamp_millis()),
            timestamp,
            image,
            original_image: None,
            prompt: scenario.prompt.clone(),
            scenario_title: scenario.title.clone(),
            area: scenario.area,
            gender,
            analysis,
            affirmation,
            analysis_audio_data: narration,
            background_music_data,
        })
    }

    /// Edit the image of the artifact on the result screen
    ///
    /// Returns the new image data URL.
    pub async fn edit_image(&self, state: &SharedAppState, prompt: &str) -> Result<String> {
        let Some(artifact) = state.read().current_artifact().cloned() else {
            return Err(ReverieError::Generation {
                step: "edit".into(),
                message: "No image to edit".into(),
            });
        };
        if !state.dispatch(AppAction::EditImageStart) {
            warn!("Edit already in progress for {}", artifact.id);
            return Err(ReverieError::Generation {
                step: "edit".into(),
                message: "An edit is already in progress".into(),
            });
        }

        let result = match self
            .limiter
            .acquire(IMAGE_EDIT_BUCKET, RateLimit::IMAGE_EDIT)
        {
            Ok(()) => self.pipeline.edit_image(&artifact.image, prompt).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(new_image) => {
                info!("Edited image of {}", artifact.id);
                state.dispatch(AppAction::EditImageSuccess {
                    image_id: artifact.id.clone(),
                    new_image: new_image.clone(),
                });
                Ok(new_image)
            }
            Err(e) => {
                error!("Image edit failed for {}: {}", artifact.id, e);
                state.dispatch(AppAction::EditImageFailure(
                    "Could not edit the image. Please try again.".into(),
                ));
                Err(e)
            }
        }
    }
}
