#[path = "fixture.rs"]
mod fixture;

use std::time::Duration;

use fixture::{run, run_with, ExtractorBehavior};
use lipsync_core::{
    settings::EngineConfig,
    voice::tts::mock::{MockBehavior, MockTextToSpeech},
    AudioFormat, ExtractionError, PipelineError, SpeechRequest, StorageKey, SynthesisFailure,
};

fn hello() -> SpeechRequest {
    SpeechRequest::new("Hello world", "en_US")
        .with_voice("0")
        .with_speed("1.0")
}

#[test]
fn synthesizes_inline_audio() {
    run(|fixture| async move {
        let audio = fixture.pipeline.synthesize_speech(&hello()).await.unwrap();

        assert!(audio.duration_seconds > 0.0);
        let expected = MockTextToSpeech::expected_duration("Hello world", 1.0);
        assert!((audio.duration_seconds - expected).abs() < 0.01);
        assert_eq!(audio.format, AudioFormat::Wav);
        assert_eq!(audio.mime_type(), "audio/wav");
        assert!(audio.storage_key.is_none());
        assert!(fixture.stored_files().is_empty());

        let (text, voice) = fixture.tts.last_call().unwrap();
        assert_eq!(text, "Hello world");
        assert_eq!(voice.voice.id, "en-US-GuyNeural");
        assert_eq!(voice.speed, 1.0);
    });
}

#[test]
fn empty_text_fails_before_any_engine_call() {
    run(|fixture| async move {
        for text in ["", "   \n\t"] {
            let request = SpeechRequest::new(text, "en_US");
            let err = fixture.pipeline.synthesize_speech(&request).await.unwrap_err();
            assert!(matches!(err, PipelineError::EmptyText), "{err:?}");

            let err = fixture
                .pipeline
                .synthesize_with_lipsync(&request)
                .await
                .unwrap_err();
            assert!(matches!(err, PipelineError::EmptyText), "{err:?}");
        }
        assert_eq!(fixture.tts.call_count(), 0);
        assert!(fixture.extractor.seen().is_empty());
    });
}

#[test]
fn invalid_parameters_fail_before_any_engine_call() {
    run(|fixture| async move {
        let cases = [
            (SpeechRequest::new("Hi", "vi_VN").with_voice("1"), "invalid_voice"),
            (SpeechRequest::new("Hi", "fr_FR"), "invalid_voice"),
            (SpeechRequest::new("Hi", "en_US").with_voice("robot"), "invalid_voice"),
            (SpeechRequest::new("Hi", "en_US").with_speed("2.5"), "invalid_speed"),
            (SpeechRequest::new("Hi", "en_US").with_speed("slow"), "invalid_speed"),
            (SpeechRequest::new("x".repeat(5001), "en_US"), "text_too_long"),
        ];
        for (request, code) in cases {
            let err = fixture.pipeline.synthesize_speech(&request).await.unwrap_err();
            assert_eq!(err.code(), code, "{err}");
            assert!(err.is_validation());
        }
        assert_eq!(fixture.tts.call_count(), 0);
    });
}

#[test]
fn speed_boundaries_are_accepted() {
    run(|fixture| async move {
        for speed in ["0.5", "2.0"] {
            let request = hello().with_speed(speed);
            let audio = fixture.pipeline.synthesize_speech(&request).await.unwrap();
            assert!(audio.duration_seconds > 0.0);
        }
        let slow = fixture
            .pipeline
            .synthesize_speech(&hello().with_speed("0.5"))
            .await
            .unwrap();
        let fast = fixture
            .pipeline
            .synthesize_speech(&hello().with_speed("2"))
            .await
            .unwrap();
        assert!(slow.duration_seconds > fast.duration_seconds);
    });
}

#[test]
fn lipsync_returns_track_spanning_the_audio() {
    run(|fixture| async move {
        let result = fixture
            .pipeline
            .synthesize_with_lipsync(&hello())
            .await
            .unwrap();

        assert!(result.audio.duration_seconds > 0.0);
        assert!(result.audio.storage_key.is_none());
        assert_eq!(result.track.cues()[0].start, 0.0);
        assert!((result.track.span_end() - result.audio.duration_seconds).abs() < 0.01);

        let seen = fixture.extractor.seen();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].transcript, "Hello world");
        assert_eq!(seen[0].recognizer, "pocketSphinx");
        assert!(seen[0].file_existed);

        assert!(fixture.stored_files().is_empty());
    });
}

#[test]
fn lipsync_uses_language_recognizer() {
    run(|fixture| async move {
        let request = SpeechRequest::new("Xin chào", "vi").with_voice("female");
        fixture
            .pipeline
            .synthesize_with_lipsync(&request)
            .await
            .unwrap();
        assert_eq!(fixture.extractor.seen()[0].recognizer, "phonetic");
    });
}

#[test]
fn decreasing_timestamps_surface_as_parse_failure() {
    run(|fixture| async move {
        fixture
            .extractor
            .set_behavior(ExtractorBehavior::DecreasingOutput);

        let err = fixture
            .pipeline
            .synthesize_with_lipsync(&hello())
            .await
            .unwrap_err();

        match &err {
            PipelineError::Extraction { source, .. } => {
                assert!(matches!(source, ExtractionError::ParseFailed { .. }), "{source:?}");
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(err.code(), "extraction_parse_failed");
        assert!(fixture.stored_files().is_empty());
    });
}

#[test]
fn missing_executable_leaves_no_audio_behind() {
    run_with(
        |settings| settings.lipsync.command = "/nonexistent/rhubarb/rhubarb".to_string(),
        false,
        |fixture| async move {
            let err = fixture
                .pipeline
                .synthesize_with_lipsync(&hello())
                .await
                .unwrap_err();

            let PipelineError::Extraction { key, source } = &err else {
                panic!("unexpected error {err:?}");
            };
            assert!(
                matches!(source, ExtractionError::ExecutableMissing { tool } if tool == "rhubarb"),
                "{source:?}"
            );
            assert!(err.to_string().contains(key.as_str()));
            assert!(!err.to_string().contains("/nonexistent"));
            assert!(fixture.stored_files().is_empty());
        },
    );
}

#[test]
fn cancelled_lipsync_releases_audio() {
    run(|fixture| async move {
        fixture.extractor.set_behavior(ExtractorBehavior::Hang);

        let outcome = tokio::time::timeout(
            Duration::from_secs(1),
            fixture.pipeline.synthesize_with_lipsync(&hello()),
        )
        .await;

        assert!(outcome.is_err());
        assert_eq!(fixture.extractor.seen().len(), 1);
        assert!(fixture.extractor.seen()[0].file_existed);
        assert!(fixture.stored_files().is_empty());
    });
}

#[test]
fn concurrent_requests_do_not_interfere() {
    run(|fixture| async move {
        let mut tasks = tokio::task::JoinSet::new();
        for i in 0..8 {
            let pipeline = fixture.pipeline.clone();
            tasks.spawn(async move {
                let words = vec!["word"; i + 1].join(" ");
                let request = SpeechRequest::new(words, "en_US");
                let result = pipeline.synthesize_with_lipsync(&request).await.unwrap();
                (i, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            let (i, result) = joined.unwrap();
            let expected = MockTextToSpeech::expected_duration(&vec!["w"; i + 1].join(" "), 1.0);
            assert!((result.audio.duration_seconds - expected).abs() < 0.01);
        }
        assert_eq!(fixture.extractor.seen().len(), 8);
        assert!(fixture.extractor.seen().iter().all(|seen| seen.file_existed));
        assert!(fixture.stored_files().is_empty());
    });
}

#[test]
fn engine_failures_are_tagged() {
    run(|fixture| async move {
        let cases = [
            (MockBehavior::EmptyOutput, SynthesisFailure::EmptyOutput),
            (MockBehavior::Garbage, SynthesisFailure::UndecodableAudio),
            (
                MockBehavior::Fail {
                    message: "voice server at 10.0.0.7 refused".to_string(),
                },
                SynthesisFailure::EngineFailed,
            ),
        ];
        for (behavior, expected) in cases {
            fixture.tts.set_behavior(behavior);
            let err = fixture.pipeline.synthesize_speech(&hello()).await.unwrap_err();
            match &err {
                PipelineError::Synthesis { engine, reason } => {
                    assert_eq!(engine, "mock");
                    assert_eq!(reason, &expected);
                }
                other => panic!("unexpected error {other:?}"),
            }
            assert!(!err.to_string().contains("10.0.0.7"));

            let err = fixture
                .pipeline
                .synthesize_with_lipsync(&hello())
                .await
                .unwrap_err();
            assert_eq!(err.code(), "synthesis_failed");
        }
        assert!(fixture.extractor.seen().is_empty());
        assert!(fixture.stored_files().is_empty());
    });
}

#[test]
fn engine_native_speed_limits_apply() {
    run_with(
        |settings| {
            settings.add_engine(
                "eleven".to_string(),
                EngineConfig::ElevenLabs {
                    api_key: "unused".to_string(),
                    model_id: None,
                },
            );
            settings.languages.get_mut("vi_VN").unwrap().engine = Some("eleven".to_string());
        },
        true,
        |fixture| async move {
            let request = SpeechRequest::new("Xin chào", "vi_VN").with_speed("1.5");
            let err = fixture.pipeline.synthesize_speech(&request).await.unwrap_err();
            assert!(
                matches!(
                    err,
                    PipelineError::Synthesis {
                        reason: SynthesisFailure::UnsupportedSpeed(_),
                        ..
                    }
                ),
                "{err:?}"
            );
            assert_eq!(fixture.tts.call_count(), 0);
        },
    );
}

#[test]
fn downloads_live_until_released() {
    run(|fixture| async move {
        let audio = fixture
            .pipeline
            .synthesize_for_download(&hello())
            .await
            .unwrap();
        let key = audio.storage_key.clone().unwrap();
        assert_eq!(fixture.stored_files().len(), 1);

        let fetched = fixture.pipeline.retrieve_audio(&key).await.unwrap();
        assert_eq!(fetched.bytes, audio.bytes);
        assert_eq!(fetched.format, AudioFormat::Wav);
        assert!((fetched.duration_seconds - audio.duration_seconds).abs() < 1e-9);

        fixture.pipeline.release_audio(&key).await;
        fixture.pipeline.release_audio(&key).await;
        let err = fixture.pipeline.retrieve_audio(&key).await.unwrap_err();
        assert!(matches!(err, PipelineError::NotFound(_)), "{err:?}");

        let unknown: StorageKey = "20200101000000000-feed".parse().unwrap();
        fixture.pipeline.release_audio(&unknown).await;
        assert_eq!(
            fixture.pipeline.retrieve_audio(&unknown).await.unwrap_err().code(),
            "not_found"
        );
    });
}

#[test]
fn damaged_download_is_a_storage_error() {
    run(|fixture| async move {
        let audio = fixture
            .pipeline
            .synthesize_for_download(&hello())
            .await
            .unwrap();
        let key = audio.storage_key.unwrap();
        let (path, _) = fixture.pipeline.store().locate(&key).unwrap();
        std::fs::write(&path, b"RIFF\x10\x00\x00\x00WAVEjunk").unwrap();

        let err = fixture.pipeline.retrieve_audio(&key).await.unwrap_err();
        assert!(matches!(err, PipelineError::Storage(_)), "{err:?}");
        assert_eq!(err.code(), "storage_failed");
        assert!(err.to_string().contains(key.as_str()));
    });
}

#[test]
fn shutdown_removes_pending_downloads() {
    run(|fixture| async move {
        for _ in 0..3 {
            fixture
                .pipeline
                .synthesize_for_download(&hello())
                .await
                .unwrap();
        }
        assert_eq!(fixture.stored_files().len(), 3);

        fixture.pipeline.shutdown().await.unwrap();
        fixture.pipeline.shutdown().await.unwrap();
        assert!(fixture.stored_files().is_empty());
    });
}

#[test]
fn voices_are_listed_by_reader() {
    run(|fixture| async move {
        let all = fixture.pipeline.voices(None).unwrap();
        assert_eq!(all.len(), 2);

        let english = fixture.pipeline.voices(Some("en")).unwrap();
        assert_eq!(english.len(), 1);
        assert_eq!(english[0].language.as_str(), "en_US");
        assert_eq!(english[0].engine, "mock");
        let readers: Vec<(usize, &str)> = english[0]
            .voices
            .iter()
            .map(|voice| (voice.reader, voice.name.as_str()))
            .collect();
        assert_eq!(
            readers,
            vec![(0, "Guy"), (1, "Jenny"), (2, "Ryan"), (3, "Sonia")]
        );

        let json = serde_json::to_value(&english[0]).unwrap();
        assert_eq!(json["recognizer"], "pocketSphinx");
        assert_eq!(json["voices"][1]["gender"], "female");

        let err = fixture.pipeline.voices(Some("xx")).unwrap_err();
        assert_eq!(err.code(), "invalid_voice");
    });
}

#[test]
fn unknown_language_engine_fails_to_build() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    runtime.block_on(async {
        let mut settings = lipsync_core::Settings::default();
        settings.languages.get_mut("en_US").unwrap().engine = Some("missing".to_string());
        let result = lipsync_core::SpeechPipeline::builder(settings)
            .with_storage_dir(tempfile::TempDir::new().unwrap().path())
            .without_sweeper()
            .build()
            .await;
        let err = result.err().unwrap();
        assert!(err.to_string().contains("missing"), "{err}");
    });
}
