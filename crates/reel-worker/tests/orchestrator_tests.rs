//! End-to-end runs of the orchestrator against scripted collaborators.

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use reel_ai::{AiError, AiResult, ImageGenerator, LipSyncer, SpeechSynthesizer, Transcriber};
use reel_media::{MediaResult, ProcessOutput, ProcessRunner};
use reel_models::{
    FrameSize, PipelineMode, Project, ProjectId, ProjectStatus, Scene, Transcript, UserProfile, WordTimestamp,
};
use reel_storage::{AssetStore, StorageError, StorageResult};
use reel_worker::{
    CompositionOrchestrator, InMemoryRepository, PipelineEvent, PipelineStep, Services, WorkerConfig, WorkerError,
};

const AUDIO_URL: &str = "https://tts.test/audio/narration.mp3";
const LIPSYNC_URL: &str = "https://lipsync.test/out/talking.mp4";
const AVATAR_URL: &str = "https://store.test/avatars/u1.mp4";

struct FakeImages {
    failing: HashSet<String>,
    sizes: Mutex<Vec<FrameSize>>,
}

#[async_trait]
impl ImageGenerator for FakeImages {
    async fn generate(&self, prompt: &str, size: FrameSize) -> AiResult<String> {
        self.sizes.lock().unwrap().push(size);
        if self.failing.contains(prompt) {
            return Err(AiError::job_failed("images", format!("rejected prompt {}", prompt)));
        }
        Ok(format!("https://cdn.test/img/{}.png", prompt))
    }
}

#[derive(Default)]
struct FakeSpeech {
    calls: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl SpeechSynthesizer for FakeSpeech {
    async fn synthesize(&self, text: &str, voice_id: &str) -> AiResult<String> {
        self.calls.lock().unwrap().push((text.to_string(), voice_id.to_string()));
        Ok(AUDIO_URL.to_string())
    }
}

struct FakeTranscriber;

#[async_trait]
impl Transcriber for FakeTranscriber {
    async fn transcribe(&self, audio_url: &str) -> AiResult<Transcript> {
        assert_eq!(audio_url, AUDIO_URL);
        Ok(Transcript {
            text: "hi there my friend".to_string(),
            words: vec![
                WordTimestamp::new("hi", 0, 500),
                WordTimestamp::new("there", 500, 1200),
                WordTimestamp::new("my", 1200, 1600),
                WordTimestamp::new("friend", 1600, 2400),
            ],
            audio_duration_secs: 2.5,
        })
    }
}

struct FakeLipSync {
    fail: bool,
    calls: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl LipSyncer for FakeLipSync {
    async fn lip_sync(&self, video_url: &str, audio_url: &str) -> AiResult<String> {
        self.calls
            .lock()
            .unwrap()
            .push((video_url.to_string(), audio_url.to_string()));
        if self.fail {
            Err(AiError::job_failed("lipsync", "no face detected"))
        } else {
            Ok(LIPSYNC_URL.to_string())
        }
    }
}

#[derive(Default)]
struct FakeStore {
    downloads: Mutex<Vec<String>>,
    uploads: Mutex<Vec<String>>,
    missing: HashSet<String>,
}

#[async_trait]
impl AssetStore for FakeStore {
    async fn upload_file(&self, path: &Path, key: &str, _content_type: &str) -> StorageResult<String> {
        assert!(path.exists(), "uploading missing file {}", path.display());
        self.uploads.lock().unwrap().push(key.to_string());
        Ok(format!("https://store.test/{}", key))
    }

    async fn download(&self, url: &str, dest: &Path) -> StorageResult<u64> {
        self.downloads.lock().unwrap().push(url.to_string());
        if self.missing.contains(url) {
            return Err(StorageError::not_found(url));
        }
        tokio::fs::write(dest, b"media").await?;
        Ok(5)
    }
}

/// One ffmpeg invocation as seen by the runner.
#[derive(Debug, Clone)]
struct Invocation {
    tier: &'static str,
    args: Vec<String>,
    concat_list: Option<String>,
}

impl Invocation {
    fn inputs(&self) -> Vec<String> {
        self.args
            .windows(2)
            .filter(|w| w[0] == "-i")
            .map(|w| w[1].clone())
            .collect()
    }
}

/// Creates each output file and fails the tiers it is told to.
#[derive(Default)]
struct FakeRunner {
    failing: HashSet<&'static str>,
    calls: Mutex<Vec<Invocation>>,
}

impl FakeRunner {
    fn failing(tiers: &[&'static str]) -> Self {
        Self {
            failing: tiers.iter().copied().collect(),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn tiers(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().iter().map(|c| c.tier).collect()
    }

    fn classify(args: &[String]) -> &'static str {
        let output = args.last().map(String::as_str).unwrap_or_default();
        let concat_input = args.windows(2).any(|w| w[0] == "-f" && w[1] == "concat");
        let scaled = args.iter().any(|a| a.contains("force_original_aspect_ratio"));
        if output.ends_with("slideshow.mp4") {
            if concat_input {
                "basic"
            } else {
                "enhanced"
            }
        } else if output.ends_with("final.mp4") {
            if scaled {
                "primary"
            } else {
                "raw_stack"
            }
        } else {
            "unknown"
        }
    }
}

#[async_trait]
impl ProcessRunner for FakeRunner {
    async fn run(&self, program: &str, args: &[String]) -> MediaResult<ProcessOutput> {
        assert_eq!(program, "ffmpeg");
        let tier = Self::classify(args);
        let concat_list = if tier == "basic" {
            let list = args
                .windows(2)
                .find(|w| w[0] == "-i")
                .map(|w| w[1].clone())
                .unwrap_or_default();
            std::fs::read_to_string(list).ok()
        } else {
            None
        };
        self.calls.lock().unwrap().push(Invocation {
            tier,
            args: args.to_vec(),
            concat_list,
        });

        if self.failing.contains(tier) {
            return Ok(ProcessOutput {
                exit_code: Some(1),
                stdout: String::new(),
                stderr: format!("{}: Invalid argument", tier),
            });
        }
        if let Some(output) = args.last() {
            std::fs::write(output, b"video")?;
        }
        Ok(ProcessOutput {
            exit_code: Some(0),
            ..Default::default()
        })
    }
}

struct Harness {
    repo: Arc<InMemoryRepository>,
    images: Arc<FakeImages>,
    speech: Arc<FakeSpeech>,
    lipsync: Arc<FakeLipSync>,
    store: Arc<FakeStore>,
    runner: Arc<FakeRunner>,
    work: tempfile::TempDir,
    orchestrator: CompositionOrchestrator,
}

struct Setup {
    prompts: Vec<&'static str>,
    mode: PipelineMode,
    profile: Option<UserProfile>,
    failing_images: Vec<&'static str>,
    failing_tiers: Vec<&'static str>,
    lipsync_fails: bool,
    missing_downloads: Vec<&'static str>,
}

impl Default for Setup {
    fn default() -> Self {
        Self {
            prompts: vec!["a", "b"],
            mode: PipelineMode::Portrait,
            profile: Some(UserProfile::new("u1").with_avatar(AVATAR_URL).with_voice("voice-1")),
            failing_images: Vec::new(),
            failing_tiers: Vec::new(),
            lipsync_fails: false,
            missing_downloads: Vec::new(),
        }
    }
}

fn harness(setup: Setup) -> (Harness, ProjectId) {
    let repo = Arc::new(InMemoryRepository::new());
    let scenes = vec![Scene {
        content: "Scene one.".to_string(),
        image_prompts: setup.prompts.iter().map(|p| p.to_string()).collect(),
    }];
    let mut project = Project::new("u1", "Hi there my friend.", scenes);
    project.mode = setup.mode;
    let project_id = project.id.clone();
    repo.insert_project(project);
    if let Some(profile) = setup.profile {
        repo.insert_profile(profile);
    }

    let images = Arc::new(FakeImages {
        failing: setup.failing_images.iter().map(|p| p.to_string()).collect(),
        sizes: Mutex::new(Vec::new()),
    });
    let speech = Arc::new(FakeSpeech::default());
    let lipsync = Arc::new(FakeLipSync {
        fail: setup.lipsync_fails,
        calls: Mutex::new(Vec::new()),
    });
    let store = Arc::new(FakeStore {
        missing: setup.missing_downloads.iter().map(|u| u.to_string()).collect(),
        ..Default::default()
    });
    let runner = Arc::new(FakeRunner::failing(&setup.failing_tiers));
    let work = tempfile::tempdir().unwrap();

    let services = Services {
        projects: repo.clone(),
        profiles: repo.clone(),
        images: images.clone(),
        speech: speech.clone(),
        transcriber: Arc::new(FakeTranscriber),
        lipsync: lipsync.clone(),
        store: store.clone(),
        runner: runner.clone(),
    };
    let config = WorkerConfig {
        work_dir: work.path().join("runs"),
        transfer_max_retries: 0,
        ..Default::default()
    };

    let harness = Harness {
        repo,
        images,
        speech,
        lipsync,
        store,
        runner,
        orchestrator: CompositionOrchestrator::new(services, config),
        work,
    };
    (harness, project_id)
}

fn scratch_entries(work: &Path) -> usize {
    std::fs::read_dir(work.join("runs"))
        .map(|entries| entries.count())
        .unwrap_or(0)
}

#[tokio::test]
async fn test_happy_path_delivers_all_outputs() {
    let (h, id) = harness(Setup::default());
    let mut events = h.orchestrator.events().subscribe();

    let report = h.orchestrator.run(&id).await.unwrap();

    assert_eq!(report.slideshow_tier.as_deref(), Some("enhanced"));
    assert_eq!(report.merge_tier.as_deref(), Some("primary"));
    assert_eq!(report.timed_scene_count, 2);
    assert!((report.audio_duration_secs - 2.5).abs() < 1e-9);

    let project = h.repo.project(&id).unwrap();
    assert_eq!(project.status, ProjectStatus::Completed);
    assert!(project.completed_at.is_some());
    assert!(project.error_message.is_none());
    assert_eq!(
        project.generated_images,
        vec!["https://cdn.test/img/a.png", "https://cdn.test/img/b.png"]
    );
    assert_eq!(project.timed_scenes.len(), 2);
    assert_eq!(project.timed_scenes[0].start_ms, 0);
    assert_eq!(project.timed_scenes[1].end_ms, 2500);
    assert_eq!(project.audio_duration, Some(2.5));
    assert!(project.transcript.is_some());

    let slideshow = project.slideshow_video_url.unwrap();
    let lipsync = project.lipsync_video_url.unwrap();
    let final_url = project.final_video_url.unwrap();
    assert!(slideshow.starts_with(&format!("https://store.test/projects/{}/slideshow-", id)));
    assert!(lipsync.contains("/lipsync-"));
    assert!(final_url.ends_with(".mp4") && final_url.contains("/final-"));

    assert_eq!(
        h.speech.calls.lock().unwrap().as_slice(),
        &[("Hi there my friend.".to_string(), "voice-1".to_string())]
    );
    assert_eq!(
        h.lipsync.calls.lock().unwrap().as_slice(),
        &[(AVATAR_URL.to_string(), AUDIO_URL.to_string())]
    );
    assert_eq!(h.runner.tiers(), vec!["enhanced", "primary"]);
    assert_eq!(h.store.uploads.lock().unwrap().len(), 3);

    let mut steps = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let PipelineEvent::StepStarted { step, .. } = event {
            steps.push(step);
        }
    }
    assert_eq!(
        steps,
        vec![
            PipelineStep::GenerateImages,
            PipelineStep::Synthesize,
            PipelineStep::Transcribe,
            PipelineStep::Align,
            PipelineStep::Download,
            PipelineStep::Slideshow,
            PipelineStep::LipSync,
            PipelineStep::Merge,
            PipelineStep::Finalize,
        ]
    );
}

#[tokio::test]
async fn test_enhanced_failure_falls_back_to_basic_with_same_inputs() {
    let (h, id) = harness(Setup {
        failing_tiers: vec!["enhanced"],
        ..Default::default()
    });
    let mut events = h.orchestrator.events().subscribe();

    let report = h.orchestrator.run(&id).await.unwrap();
    assert_eq!(report.slideshow_tier.as_deref(), Some("basic"));
    assert!(report.slideshow_url.is_some());
    assert!(report.final_video_url.is_some());

    let calls = h.runner.calls.lock().unwrap().clone();
    assert_eq!(calls[0].tier, "enhanced");
    assert_eq!(calls[1].tier, "basic");

    let enhanced_inputs = calls[0].inputs();
    let (audio, images) = enhanced_inputs.split_last().unwrap();
    let list = calls[1].concat_list.as_deref().unwrap();
    for image in images {
        assert!(list.contains(image.as_str()), "{} missing from concat list", image);
    }
    assert_eq!(&calls[1].inputs()[1], audio);

    let mut tier_failures = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let PipelineEvent::TierFailed { tier, .. } = event {
            tier_failures.push(tier);
        }
    }
    assert_eq!(tier_failures, vec!["enhanced"]);
}

#[tokio::test]
async fn test_lipsync_failure_fails_run_without_merge() {
    let (h, id) = harness(Setup {
        lipsync_fails: true,
        ..Default::default()
    });

    let err = h.orchestrator.run(&id).await.unwrap_err();
    assert!(matches!(err, WorkerError::ExternalCall { step: "Lip-sync", .. }));

    let project = h.repo.project(&id).unwrap();
    assert_eq!(project.status, ProjectStatus::Failed);
    assert!(project.error_message.unwrap().contains("no face detected"));
    assert!(project.final_video_url.is_none());
    assert!(project.lipsync_video_url.is_none());
    // Slideshow was rendered before lip-sync and stays referenced.
    assert!(project.slideshow_video_url.is_some());
    assert!(!h.runner.tiers().iter().any(|t| *t == "primary" || *t == "raw_stack"));
    assert_eq!(scratch_entries(h.work.path()), 0);
}

#[tokio::test]
async fn test_merge_failure_still_completes() {
    let (h, id) = harness(Setup {
        failing_tiers: vec!["primary", "raw_stack"],
        ..Default::default()
    });

    let report = h.orchestrator.run(&id).await.unwrap();
    assert!(report.merge_tier.is_none());

    let project = h.repo.project(&id).unwrap();
    assert_eq!(project.status, ProjectStatus::Completed);
    assert!(project.final_video_url.is_none());
    assert!(project.slideshow_video_url.is_some());
    assert!(project.lipsync_video_url.is_some());
    assert_eq!(h.runner.tiers(), vec!["enhanced", "primary", "raw_stack"]);
}

#[tokio::test]
async fn test_slideshow_failure_skips_merge_only() {
    let (h, id) = harness(Setup {
        failing_tiers: vec!["enhanced", "basic"],
        ..Default::default()
    });

    let report = h.orchestrator.run(&id).await.unwrap();
    assert!(report.slideshow_tier.is_none());

    let project = h.repo.project(&id).unwrap();
    assert_eq!(project.status, ProjectStatus::Completed);
    assert!(project.slideshow_video_url.is_none());
    assert!(project.final_video_url.is_none());
    assert!(project.lipsync_video_url.is_some());
    assert_eq!(h.runner.tiers(), vec!["enhanced", "basic"]);
}

#[tokio::test]
async fn test_missing_avatar_fails_before_any_work() {
    let (h, id) = harness(Setup {
        profile: Some(UserProfile::new("u1").with_voice("voice-1")),
        ..Default::default()
    });

    let err = h.orchestrator.run(&id).await.unwrap_err();
    assert!(err.is_precondition());

    let project = h.repo.project(&id).unwrap();
    assert_eq!(project.status, ProjectStatus::Failed);
    assert!(project.error_message.unwrap().contains("avatar"));
    assert!(project.generated_images.is_empty());
    assert!(h.speech.calls.lock().unwrap().is_empty());
    assert!(h.runner.tiers().is_empty());
}

#[tokio::test]
async fn test_missing_voice_profile_fails() {
    let (h, id) = harness(Setup {
        profile: Some(UserProfile::new("u1").with_avatar(AVATAR_URL)),
        ..Default::default()
    });

    let err = h.orchestrator.run(&id).await.unwrap_err();
    assert!(err.is_precondition());
    assert!(err.user_reason().contains("voice"));
    assert_eq!(h.repo.project(&id).unwrap().status, ProjectStatus::Failed);
    assert!(h.speech.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_prompts_fail() {
    let (h, id) = harness(Setup {
        prompts: Vec::new(),
        ..Default::default()
    });

    let err = h.orchestrator.run(&id).await.unwrap_err();
    assert!(err.is_precondition());
    assert_eq!(h.repo.project(&id).unwrap().status, ProjectStatus::Failed);
}

#[tokio::test]
async fn test_processing_project_is_not_reentered() {
    let (h, id) = harness(Setup::default());
    let mut project = h.repo.project(&id).unwrap();
    project.transition_to(ProjectStatus::Processing).unwrap();
    h.repo.insert_project(project);

    let err = h.orchestrator.run(&id).await.unwrap_err();
    assert!(matches!(err, WorkerError::AlreadyProcessing(_)));

    let project = h.repo.project(&id).unwrap();
    assert_eq!(project.status, ProjectStatus::Processing);
    assert!(project.error_message.is_none());
    assert!(h.speech.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_completed_project_can_be_rerun() {
    let (h, id) = harness(Setup::default());
    let first = h.orchestrator.run(&id).await.unwrap();
    let second = h.orchestrator.run(&id).await.unwrap();

    assert_ne!(first.final_video_url, second.final_video_url);
    assert_eq!(h.repo.project(&id).unwrap().status, ProjectStatus::Completed);
}

#[tokio::test]
async fn test_scratch_dir_is_cleaned_up() {
    let (h, id) = harness(Setup::default());
    h.orchestrator.run(&id).await.unwrap();
    assert_eq!(scratch_entries(h.work.path()), 0);
}

#[tokio::test]
async fn test_partial_images_stay_with_their_prompts() {
    let (h, id) = harness(Setup {
        prompts: vec!["a", "b", "c"],
        failing_images: vec!["b"],
        ..Default::default()
    });

    h.orchestrator.run(&id).await.unwrap();

    let project = h.repo.project(&id).unwrap();
    // "b" failed and borrows its earlier neighbour; "a" and "c" keep their own.
    assert_eq!(
        project.generated_images,
        vec![
            "https://cdn.test/img/a.png",
            "https://cdn.test/img/a.png",
            "https://cdn.test/img/c.png"
        ]
    );
    assert_eq!(project.timed_scenes.len(), 3);
    for (scene, prompt) in project.timed_scenes.iter().zip(["a", "b", "c"]) {
        assert_eq!(scene.image_prompts, vec![prompt.to_string()]);
    }
    let urls: Vec<&str> = project
        .timed_scenes
        .iter()
        .map(|s| s.image_urls[0].as_str())
        .collect();
    assert_eq!(urls[0], "https://cdn.test/img/a.png");
    assert_eq!(urls[2], "https://cdn.test/img/c.png");
    assert_ne!(urls[1], "https://cdn.test/img/c.png");

    let image_downloads = h
        .store
        .downloads
        .lock()
        .unwrap()
        .iter()
        .filter(|u| u.starts_with("https://cdn.test/img/"))
        .count();
    assert_eq!(image_downloads, 2);
}

#[tokio::test]
async fn test_images_are_sized_for_project_mode() {
    let (h, id) = harness(Setup {
        mode: PipelineMode::Landscape,
        ..Default::default()
    });

    h.orchestrator.run(&id).await.unwrap();

    let sizes = h.images.sizes.lock().unwrap().clone();
    assert_eq!(sizes, vec![FrameSize::LANDSCAPE, FrameSize::LANDSCAPE]);
}

#[tokio::test]
async fn test_all_images_failing_is_fatal() {
    let (h, id) = harness(Setup {
        failing_images: vec!["a", "b"],
        ..Default::default()
    });

    let err = h.orchestrator.run(&id).await.unwrap_err();
    assert!(matches!(err, WorkerError::ExternalCall { step: "Image generation", .. }));
    assert_eq!(h.repo.project(&id).unwrap().status, ProjectStatus::Failed);
    assert!(h.speech.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_download_failure_is_fatal_and_cleans_up() {
    let (h, id) = harness(Setup {
        missing_downloads: vec![AUDIO_URL],
        ..Default::default()
    });

    let err = h.orchestrator.run(&id).await.unwrap_err();
    assert!(matches!(err, WorkerError::Resource(_)));

    let project = h.repo.project(&id).unwrap();
    assert_eq!(project.status, ProjectStatus::Failed);
    assert!(h.runner.tiers().is_empty());
    assert!(h.lipsync.calls.lock().unwrap().is_empty());
    // Images generated before the failure stay on the project.
    assert_eq!(project.generated_images.len(), 2);
    assert_eq!(scratch_entries(h.work.path()), 0);
}
