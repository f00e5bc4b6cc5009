//! Composition orchestrator.
//!
//! Drives one run of a project: image generation, narration, transcription,
//! scene alignment, asset download, slideshow render, lip-sync, merge and
//! upload. The project's `Processing` status is the run's lock.
//!
//! Fatal failures mark the project `Failed` before the error is returned.
//! Slideshow and merge failures only cost their own output. Scratch files
//! are released exactly once per invocation.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tracing::Instrument;

use reel_ai::{generate_all, ImageGenerator, LipSyncer, SpeechSynthesizer, Transcriber};
use reel_media::{
    align, attach_image_urls, display_durations, BasicSlideshow, EnhancedSlideshow, MergeJob,
    PrimaryMerge, ProcessRunner, RawStackMerge, SlideshowJob, TierChain, TierOutcome,
};
use reel_models::{Project, ProjectId, ProjectStatus, RunReport, TimedScene, Transcript};
use reel_storage::{artifact_key, content_type_for, extension_from_url, new_run_id, ArtifactKind, AssetStore, StorageError};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::events::{EventBus, PipelineEvent, PipelineStep};
use crate::logging::RunLogger;
use crate::metrics;
use crate::repository::{ProfileRepository, ProjectRepository};
use crate::resources::RunResources;
use crate::retry::{retry_async, RetryConfig};

/// Collaborators of a run.
#[derive(Clone)]
pub struct Services {
    pub projects: Arc<dyn ProjectRepository>,
    pub profiles: Arc<dyn ProfileRepository>,
    pub images: Arc<dyn ImageGenerator>,
    pub speech: Arc<dyn SpeechSynthesizer>,
    pub transcriber: Arc<dyn Transcriber>,
    pub lipsync: Arc<dyn LipSyncer>,
    pub store: Arc<dyn AssetStore>,
    pub runner: Arc<dyn ProcessRunner>,
}

/// What a validated project needs from its owner.
struct RunInputs {
    prompts: Vec<String>,
    narration: String,
    voice_id: String,
    avatar_url: String,
}

/// Text sent to speech synthesis: the script, or the scene contents when
/// no script was stored.
fn narration_text(project: &Project) -> String {
    if !project.script.trim().is_empty() {
        return project.script.trim().to_string();
    }
    project
        .scenes
        .iter()
        .map(|s| s.content.trim())
        .filter(|c| !c.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

pub struct CompositionOrchestrator {
    services: Services,
    config: WorkerConfig,
    events: EventBus,
}

impl CompositionOrchestrator {
    pub fn new(services: Services, config: WorkerConfig) -> Self {
        Self {
            services,
            config,
            events: EventBus::default(),
        }
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Run the pipeline for one project.
    pub async fn run(&self, project_id: &ProjectId) -> WorkerResult<RunReport> {
        let logger = RunLogger::new(project_id, "compose");
        let span = logger.create_span();
        self.run_inner(project_id, &logger).instrument(span).await
    }

    async fn run_inner(&self, project_id: &ProjectId, logger: &RunLogger) -> WorkerResult<RunReport> {
        let project = self
            .services
            .projects
            .get(project_id)
            .await?
            .ok_or_else(|| WorkerError::NotFound(format!("project {}", project_id)))?;

        if project.status == ProjectStatus::Processing {
            logger.log_warning("project is already processing");
            return Err(WorkerError::AlreadyProcessing(project_id.clone()));
        }

        let inputs = match self.validate(&project).await {
            Ok(inputs) => inputs,
            Err(e) if e.is_precondition() => {
                logger.log_error(&e.to_string());
                let mut project = project;
                self.fail(&mut project, &e).await;
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        let mut project = self.services.projects.begin_run(project_id).await?;
        let run_id = new_run_id();
        logger.log_start(&format!("run {} with {} prompts", run_id, inputs.prompts.len()));

        // Outputs of an earlier run must not survive a partial rerun.
        project.slideshow_video_url = None;
        project.lipsync_video_url = None;
        project.final_video_url = None;

        let outcome = match RunResources::acquire(&self.config.work_dir, project_id) {
            Ok(mut resources) => {
                let outcome = self
                    .execute(&mut project, &inputs, &run_id, &mut resources, logger)
                    .await;
                resources.release();
                outcome
            }
            Err(e) => Err(e),
        };

        match outcome {
            Ok(report) => {
                metrics::record_run("completed");
                self.events.publish(PipelineEvent::RunFinished {
                    project_id: project_id.clone(),
                    status: ProjectStatus::Completed,
                    error: None,
                });
                logger.log_completion(&format!(
                    "slideshow={} final={}",
                    report.slideshow_url.is_some(),
                    report.final_video_url.is_some()
                ));
                Ok(report)
            }
            Err(e) => {
                logger.log_error(&e.to_string());
                self.fail(&mut project, &e).await;
                Err(e)
            }
        }
    }

    async fn validate(&self, project: &Project) -> WorkerResult<RunInputs> {
        let prompts = project.flattened_prompts();
        if prompts.is_empty() {
            return Err(WorkerError::precondition("Project has no image prompts"));
        }

        let narration = narration_text(project);
        if narration.is_empty() {
            return Err(WorkerError::precondition("Project has no script to narrate"));
        }

        let profile = self.services.profiles.get_profile(&project.user_id).await?;
        let avatar_url = profile
            .as_ref()
            .and_then(|p| p.avatar())
            .ok_or_else(|| WorkerError::precondition("No avatar video on file for this user"))?
            .to_string();
        let voice_id = profile
            .as_ref()
            .and_then(|p| p.voice())
            .ok_or_else(|| WorkerError::precondition("No voice profile on file for this user"))?
            .to_string();

        Ok(RunInputs {
            prompts,
            narration,
            voice_id,
            avatar_url,
        })
    }

    /// Record a fatal error on the project.
    async fn fail(&self, project: &mut Project, error: &WorkerError) {
        let reason = error.user_reason();
        project.mark_failed(reason.clone());
        if let Err(save_err) = self.services.projects.save(project).await {
            tracing::error!(project_id = %project.id, "Failed to persist failed status: {}", save_err);
        }
        metrics::record_run("failed");
        self.events.publish(PipelineEvent::RunFinished {
            project_id: project.id.clone(),
            status: ProjectStatus::Failed,
            error: Some(reason),
        });
    }

    async fn timed<T, Fut>(&self, project_id: &ProjectId, step: PipelineStep, fut: Fut) -> T
    where
        Fut: Future<Output = T>,
    {
        self.events.publish(PipelineEvent::StepStarted {
            project_id: project_id.clone(),
            step,
        });
        let started = Instant::now();
        let out = fut.await;
        let elapsed = started.elapsed();
        metrics::record_step_duration(step.as_str(), elapsed.as_secs_f64());
        self.events.publish(PipelineEvent::StepFinished {
            project_id: project_id.clone(),
            step,
            elapsed_ms: elapsed.as_millis() as u64,
        });
        out
    }

    async fn persist(&self, project: &mut Project) -> WorkerResult<()> {
        project.touch();
        self.services.projects.save(project).await
    }

    async fn execute(
        &self,
        project: &mut Project,
        inputs: &RunInputs,
        run_id: &str,
        resources: &mut RunResources,
        logger: &RunLogger,
    ) -> WorkerResult<RunReport> {
        let id = project.id.clone();
        self.persist(project).await?;
        let mode = self.config.mode_override.unwrap_or(project.mode);
        let frame = mode.frame_size();

        if project.generated_images.is_empty() {
            let images = self
                .timed(&id, PipelineStep::GenerateImages, async {
                    generate_all(self.services.images.as_ref(), &inputs.prompts, frame)
                        .await
                        .map_err(|e| WorkerError::external("Image generation", e))
                })
                .await?;
            logger.log_progress(&format!("generated {}x{} images for {} prompts", frame.width, frame.height, images.len()));
            project.generated_images = images;
            self.persist(project).await?;
        }

        let audio_url = self
            .timed(&id, PipelineStep::Synthesize, async {
                self.services
                    .speech
                    .synthesize(&inputs.narration, &inputs.voice_id)
                    .await
                    .map_err(|e| WorkerError::external("Speech synthesis", e))
            })
            .await?;

        let transcript = self
            .timed(&id, PipelineStep::Transcribe, async {
                self.services
                    .transcriber
                    .transcribe(&audio_url)
                    .await
                    .map_err(|e| WorkerError::external("Transcription", e))
            })
            .await?;
        logger.log_progress(&format!(
            "transcribed {} words over {:.2}s",
            transcript.words.len(),
            transcript.audio_duration_secs
        ));

        let scenes = self
            .timed(&id, PipelineStep::Align, async {
                let mut scenes = align(&transcript.words, &inputs.prompts, transcript.audio_duration_secs);
                attach_image_urls(&mut scenes, &project.generated_images);
                scenes
            })
            .await;

        let (scene_images, audio_path) = self
            .timed(&id, PipelineStep::Download, self.download_assets(&scenes, &audio_url, resources))
            .await?;

        let mut slideshow_tier = None;
        let mut slideshow_path = None;
        if scene_images.is_empty() {
            logger.log_warning("no timed scenes, skipping slideshow");
        } else {
            let job = SlideshowJob {
                durations: display_durations(&scenes, transcript.audio_duration_secs),
                images: scene_images,
                audio: audio_path,
                output: resources.scratch("slideshow.mp4"),
                work_dir: resources.dir().to_path_buf(),
                frame,
                encoding: self.config.encoding.clone(),
            };
            let chain = TierChain::new("slideshow")
                .with_tier(EnhancedSlideshow::new(self.config.slideshow.clone()))
                .with_tier(BasicSlideshow);
            for file in chain.scratch_files(&job) {
                resources.track(file);
            }

            let outcome = self
                .timed(&id, PipelineStep::Slideshow, chain.run(self.services.runner.as_ref(), &job))
                .await;
            self.report_failures(&id, chain.label(), &outcome);

            if let TierOutcome::Rendered { tier, output, .. } = outcome {
                metrics::record_tier_render(chain.label(), tier);
                slideshow_tier = Some(tier.to_string());
                match self.upload(&id, ArtifactKind::Slideshow, run_id, &output).await {
                    Ok(url) => {
                        project.slideshow_video_url = Some(url);
                        self.persist(project).await?;
                    }
                    Err(e) => logger.log_warning(&format!("slideshow upload failed: {}", e)),
                }
                slideshow_path = Some(output);
            } else {
                logger.log_warning("slideshow unavailable, merge will be skipped");
            }
        }

        let lipsync_remote = self
            .timed(&id, PipelineStep::LipSync, async {
                self.services
                    .lipsync
                    .lip_sync(&inputs.avatar_url, &audio_url)
                    .await
                    .map_err(|e| WorkerError::external("Lip-sync", e))
            })
            .await?;
        let lipsync_path = resources.scratch(&format!(
            "lipsync.{}",
            extension_from_url(&lipsync_remote).unwrap_or_else(|| "mp4".to_string())
        ));
        self.download(&lipsync_remote, &lipsync_path).await?;
        let lipsync_url = self
            .upload(&id, ArtifactKind::Lipsync, run_id, &lipsync_path)
            .await
            .map_err(|e| WorkerError::external("Lip-sync upload", e))?;
        project.lipsync_video_url = Some(lipsync_url);
        self.persist(project).await?;

        let mut merge_tier = None;
        if let Some(slideshow) = slideshow_path {
            let job = MergeJob {
                slideshow,
                lipsync: lipsync_path,
                output: resources.scratch("final.mp4"),
                frame,
                layout: self.config.merge_layout,
                encoding: self.config.encoding.clone(),
                lipsync_size: None,
            };
            let chain = TierChain::new("merge")
                .with_tier(PrimaryMerge)
                .with_tier(RawStackMerge);

            let outcome = self
                .timed(&id, PipelineStep::Merge, chain.run(self.services.runner.as_ref(), &job))
                .await;
            self.report_failures(&id, chain.label(), &outcome);

            if let TierOutcome::Rendered { tier, output, .. } = outcome {
                metrics::record_tier_render(chain.label(), tier);
                merge_tier = Some(tier.to_string());
                match self.upload(&id, ArtifactKind::Final, run_id, &output).await {
                    Ok(url) => project.final_video_url = Some(url),
                    Err(e) => logger.log_warning(&format!("final video upload failed: {}", e)),
                }
            } else {
                logger.log_warning("merge failed, final video unavailable");
            }
        }

        self.timed(&id, PipelineStep::Finalize, self.finalize(project, transcript, scenes))
            .await?;

        Ok(RunReport {
            project_id: id,
            slideshow_url: project.slideshow_video_url.clone(),
            lipsync_url: project.lipsync_video_url.clone(),
            final_video_url: project.final_video_url.clone(),
            slideshow_tier,
            merge_tier,
            timed_scene_count: project.timed_scenes.len(),
            audio_duration_secs: project.audio_duration.unwrap_or_default(),
        })
    }

    async fn finalize(&self, project: &mut Project, transcript: Transcript, scenes: Vec<TimedScene>) -> WorkerResult<()> {
        project.audio_duration = Some(transcript.audio_duration_secs);
        project.transcript = Some(transcript);
        project.timed_scenes = scenes;
        project.mark_completed()?;
        self.services.projects.save(project).await
    }

    /// Download each distinct scene image and the narration track.
    ///
    /// Returns one local image path per scene, in scene order.
    async fn download_assets(
        &self,
        scenes: &[TimedScene],
        audio_url: &str,
        resources: &mut RunResources,
    ) -> WorkerResult<(Vec<PathBuf>, PathBuf)> {
        let mut local: HashMap<&str, PathBuf> = HashMap::new();
        let mut scene_images = Vec::with_capacity(scenes.len());

        for (i, scene) in scenes.iter().enumerate() {
            let url = scene
                .image_urls
                .first()
                .ok_or_else(|| WorkerError::resource(format!("scene {} has no image", i)))?;
            if let Some(path) = local.get(url.as_str()) {
                scene_images.push(path.clone());
                continue;
            }
            let ext = extension_from_url(url).unwrap_or_else(|| "png".to_string());
            let path = resources.scratch(&format!("image_{:03}.{}", local.len(), ext));
            self.download(url, &path).await?;
            local.insert(url.as_str(), path.clone());
            scene_images.push(path);
        }

        let ext = extension_from_url(audio_url).unwrap_or_else(|| "mp3".to_string());
        let audio_path = resources.scratch(&format!("narration.{}", ext));
        self.download(audio_url, &audio_path).await?;

        Ok((scene_images, audio_path))
    }

    async fn download(&self, url: &str, dest: &Path) -> WorkerResult<u64> {
        let retry = RetryConfig::new(format!("download {}", url)).with_max_retries(self.config.transfer_max_retries);
        let store = self.services.store.as_ref();
        retry_async(&retry, StorageError::is_transient, move || store.download(url, dest))
            .await
            .into_result()
            .map_err(|e| WorkerError::resource(format!("download of {} failed: {}", url, e)))
    }

    async fn upload(&self, project_id: &ProjectId, kind: ArtifactKind, run_id: &str, path: &Path) -> WorkerResult<String> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("mp4");
        let key = artifact_key(project_id, kind, run_id, ext);
        let content_type = content_type_for(path);
        let retry = RetryConfig::new(format!("upload {}", key)).with_max_retries(self.config.transfer_max_retries);
        let (store, key_ref) = (self.services.store.as_ref(), key.as_str());
        let url = retry_async(&retry, StorageError::is_transient, move || {
            store.upload_file(path, key_ref, content_type)
        })
        .await
        .into_result()?;

        self.events.publish(PipelineEvent::ArtifactStored {
            project_id: project_id.clone(),
            kind: kind.as_str(),
            url: url.clone(),
        });
        Ok(url)
    }

    fn report_failures(&self, project_id: &ProjectId, chain: &'static str, outcome: &TierOutcome) {
        for failure in outcome.failures() {
            metrics::record_tier_failure(chain, failure.tier);
            self.events.publish(PipelineEvent::TierFailed {
                project_id: project_id.clone(),
                chain,
                tier: failure.tier,
                reason: failure
                    .error
                    .stderr_tail(3)
                    .filter(|t| !t.is_empty())
                    .unwrap_or_else(|| failure.error.to_string()),
            });
        }
    }
}
