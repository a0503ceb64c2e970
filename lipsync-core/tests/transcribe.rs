#[path = "fixture.rs"]
mod fixture;

use fixture::run;
use lipsync_core::{
    voice::stt::mock::MockBehavior, voice::tts::mock::render_tone, PipelineError,
    SpeechPipeline, TranscriptionError,
};

fn clip() -> Vec<u8> {
    render_tone(16_000, 0.5).unwrap()
}

#[test]
fn transcribes_with_language_hint() {
    run(|fixture| async move {
        fixture.stt.set_behavior(MockBehavior::Text {
            text: "  Hello world \n".to_string(),
        });

        let result = fixture
            .pipeline
            .transcribe(&clip(), Some("en-us"))
            .await
            .unwrap();

        assert_eq!(result.text, "Hello world");
        assert_eq!(result.language.as_deref(), Some("en-us"));
        assert_eq!(fixture.stt.call_count(), 1);
    });
}

#[test]
fn auto_detects_without_hint() {
    run(|fixture| async move {
        let result = fixture.pipeline.transcribe(&clip(), None).await.unwrap();
        assert_eq!(result.text, "hello world");
        assert_eq!(result.language, None);
    });
}

#[test]
fn silence_is_reported_explicitly() {
    run(|fixture| async move {
        fixture.stt.set_behavior(MockBehavior::Silence);
        let err = fixture
            .pipeline
            .transcribe(&clip(), Some("en_US"))
            .await
            .unwrap_err();
        assert!(
            matches!(
                err,
                PipelineError::Transcription(TranscriptionError::NoSpeechDetected)
            ),
            "{err:?}"
        );
        assert_eq!(err.code(), "transcription_no_speech");
    });
}

#[test]
fn bad_input_never_reaches_the_engine() {
    run(|fixture| async move {
        let cases: [(&[u8], TranscriptionError); 3] = [
            (&[], TranscriptionError::EmptyInput),
            (b"plain text, not audio", TranscriptionError::CorruptInput),
            (b"RIFF\x10\x00\x00\x00WAVEjunk", TranscriptionError::CorruptInput),
        ];
        for (input, expected) in cases {
            let err = fixture.pipeline.transcribe(input, None).await.unwrap_err();
            match err {
                PipelineError::Transcription(actual) => assert_eq!(actual, expected),
                other => panic!("unexpected error {other:?}"),
            }
        }

        assert_eq!(fixture.stt.call_count(), 0);
    });
}

#[test]
fn engine_errors_are_tagged() {
    run(|fixture| async move {
        fixture.stt.set_behavior(MockBehavior::Fail {
            message: "quota exceeded".to_string(),
        });
        let err = fixture.pipeline.transcribe(&clip(), None).await.unwrap_err();
        assert_eq!(err.code(), "transcription_failed");
        assert!(err.to_string().contains("quota exceeded"));
    });
}

#[test]
fn unconfigured_transcription_is_an_engine_error() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    runtime.block_on(async {
        let storage = tempfile::TempDir::new().unwrap();
        let mut settings = lipsync_core::Settings::default();
        settings.transcription = None;
        let pipeline = SpeechPipeline::builder(settings)
            .with_storage_dir(storage.path())
            .without_sweeper()
            .build()
            .await
            .unwrap();

        let err = pipeline.transcribe(&clip(), None).await.unwrap_err();
        assert_eq!(err.code(), "transcription_failed");
    });
}
