use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use lipsync_core::{
    audio::duration::measure_duration,
    error::ExtractionError,
    lipsync::{
        parser::{parse_rhubarb_json, TimeScale},
        ExtractionInput, MouthShape, VisemeCue, VisemeExtractor, VisemeTrack,
    },
    settings::{EngineConfig, Settings},
    voice::stt::MockSpeechToText,
    voice::tts::MockTextToSpeech,
    SpeechPipeline, SpeechPipelineBuilder,
};
use tempfile::TempDir;

/// What the scripted extractor does when called
#[derive(Debug, Clone)]
#[allow(dead_code)]
pub enum ExtractorBehavior {
    /// Closed mouth, open mouth, closed mouth across the whole clip
    Track,
    /// Report cues whose start times go backwards
    DecreasingOutput,
    /// Never finish
    Hang,
}

/// In-process stand-in for the lip-sync tool
#[derive(Clone)]
pub struct ScriptedExtractor {
    behavior: Arc<Mutex<ExtractorBehavior>>,
    seen: Arc<Mutex<Vec<SeenInput>>>,
}

/// What the extractor observed about one call
#[derive(Debug, Clone)]
#[allow(dead_code)]
pub struct SeenInput {
    pub transcript: String,
    pub recognizer: String,
    pub file_existed: bool,
}

impl ScriptedExtractor {
    pub fn new(behavior: ExtractorBehavior) -> Self {
        Self {
            behavior: Arc::new(Mutex::new(behavior)),
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    #[allow(dead_code)]
    pub fn set_behavior(&self, behavior: ExtractorBehavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    #[allow(dead_code)]
    pub fn seen(&self) -> Vec<SeenInput> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl VisemeExtractor for ScriptedExtractor {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn extract(&self, input: ExtractionInput<'_>) -> Result<VisemeTrack, ExtractionError> {
        self.seen.lock().unwrap().push(SeenInput {
            transcript: input.transcript.to_string(),
            recognizer: input.recognizer.to_string(),
            file_existed: input.audio_path.is_file(),
        });
        let behavior = self.behavior.lock().unwrap().clone();

        match behavior {
            ExtractorBehavior::Track => {
                let duration = clip_duration(input.audio_path);
                let third = duration / 3.0;
                VisemeTrack::new(
                    duration,
                    vec![
                        VisemeCue {
                            start: 0.0,
                            end: third,
                            shape: MouthShape::X,
                        },
                        VisemeCue {
                            start: third,
                            end: 2.0 * third,
                            shape: MouthShape::D,
                        },
                        VisemeCue {
                            start: 2.0 * third,
                            end: duration,
                            shape: MouthShape::X,
                        },
                    ],
                )
            }
            ExtractorBehavior::DecreasingOutput => parse_rhubarb_json(
                br#"{"mouthCues": [
                    {"start": 0.4, "end": 0.5, "value": "B"},
                    {"start": 0.1, "end": 0.6, "value": "C"}
                ]}"#,
                TimeScale::default(),
            ),
            ExtractorBehavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(VisemeTrack::empty())
            }
        }
    }
}

fn clip_duration(path: &Path) -> f64 {
    let bytes = std::fs::read(path).unwrap();
    measure_duration(&bytes, None).unwrap()
}

pub struct Fixture {
    pub pipeline: SpeechPipeline,
    pub tts: MockTextToSpeech,
    pub stt: MockSpeechToText,
    pub extractor: ScriptedExtractor,
    pub storage_dir: TempDir,
}

/// Having a `Drop` impl makes `async move` test bodies capture the whole
/// fixture rather than only the fields they touch, so `storage_dir` lives as
/// long as the test body does.
impl Drop for Fixture {
    fn drop(&mut self) {}
}

impl Fixture {
    /// Pipeline whose default engine is the mock, with the scripted
    /// extractor and the mock transcriber injected.
    #[allow(dead_code)]
    pub async fn new() -> Self {
        Self::with_settings(|_| {}, true).await
    }

    /// `configure` adjusts the settings before the pipeline is built. When
    /// `scripted` is false the extractor is built from the lip-sync settings.
    pub async fn with_settings(configure: impl FnOnce(&mut Settings), scripted: bool) -> Self {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();

        let storage_dir = TempDir::new().unwrap();
        let mut settings = Settings::default();
        settings.add_engine(
            "mock".to_string(),
            EngineConfig::Mock {
                behavior: Default::default(),
            },
        );
        settings.set_default_engine("mock").unwrap();
        configure(&mut settings);

        let tts = MockTextToSpeech::default();
        let stt = MockSpeechToText::default();
        let extractor = ScriptedExtractor::new(ExtractorBehavior::Track);

        let mut builder = SpeechPipelineBuilder::new(settings)
            .with_engine("mock", Arc::new(tts.clone()))
            .with_transcriber(Arc::new(stt.clone()))
            .with_storage_dir(storage_dir.path());
        if scripted {
            builder = builder.with_extractor(Arc::new(extractor.clone()));
        }
        let pipeline = builder.build().await.unwrap();

        Fixture {
            pipeline,
            tts,
            stt,
            extractor,
            storage_dir,
        }
    }

    /// Files currently in the storage directory
    #[allow(dead_code)]
    pub fn stored_files(&self) -> Vec<String> {
        std::fs::read_dir(self.storage_dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().to_string())
            .collect()
    }
}

/// Runs an async test body on a fresh runtime with a 30 second limit.
#[allow(dead_code)]
pub fn run<F, Fut>(test_fn: F)
where
    F: FnOnce(Fixture) -> Fut,
    Fut: std::future::Future<Output = ()>,
{
    run_with(|_| {}, true, test_fn)
}

pub fn run_with<C, F, Fut>(configure: C, scripted: bool, test_fn: F)
where
    C: FnOnce(&mut Settings),
    F: FnOnce(Fixture) -> Fut,
    Fut: std::future::Future<Output = ()>,
{
    use tokio::time::timeout;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("Failed to create tokio runtime");

    runtime.block_on(async {
        let fixture = Fixture::with_settings(configure, scripted).await;
        let test_future = test_fn(fixture);
        timeout(Duration::from_secs(30), test_future)
            .await
            .expect("Test timed out after 30 seconds");
    });
}
