//! Serves one [`SpeechPipeline`] over line-delimited JSON.
//!
//! Requests are read from the input one per line and handled concurrently;
//! each produces exactly one response line on the output. The loop ends when
//! the input closes, after every in-flight request has answered.

pub mod protocol;

use lipsync_core::{SpeechPipeline, StorageKey};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};

use protocol::{decode_audio, AudioPayload, ErrorBody, LipSyncPayload, Operation, WorkerResponse};

pub async fn run_worker<R, W>(pipeline: SpeechPipeline, input: R, output: W) -> anyhow::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (response_tx, mut response_rx) = mpsc::unbounded_channel::<WorkerResponse>();

    let writer = tokio::spawn(async move {
        let mut output = output;
        while let Some(response) = response_rx.recv().await {
            let json = serde_json::to_string(&response)?;
            let json = format!("{json}\n");
            output.write_all(json.as_bytes()).await?;
            output.flush().await?;
        }
        anyhow::Ok(())
    });

    let mut handlers: JoinSet<()> = JoinSet::new();
    let mut input = BufReader::new(input);
    let mut buf = Vec::new();
    let mut read_error = None;
    loop {
        tokio::select! {
            // Partial reads stay in `buf` if the other branch wins
            read = input.read_until(b'\n', &mut buf) => {
                match read {
                    Ok(0) if buf.is_empty() => break,
                    Ok(_) => {}
                    Err(e) => {
                        tracing::error!("Failed reading requests: {e}");
                        read_error = Some(e);
                        break;
                    }
                }
                let raw = std::mem::take(&mut buf);
                let line = match String::from_utf8(raw) {
                    Ok(line) => line,
                    Err(e) => {
                        tracing::warn!("Request line is not valid UTF-8: {e}");
                        let response = WorkerResponse::failure(
                            Value::Null,
                            ErrorBody::bad_request("request line is not valid UTF-8"),
                        );
                        if response_tx.send(response).is_err() {
                            tracing::warn!("Response dropped: output closed");
                        }
                        continue;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                let pipeline = pipeline.clone();
                let response_tx = response_tx.clone();
                handlers.spawn(async move {
                    let response = handle_line(&pipeline, &line).await;
                    if response_tx.send(response).is_err() {
                        tracing::warn!("Response dropped: output closed");
                    }
                });
            }
            Some(joined) = handlers.join_next(), if !handlers.is_empty() => {
                report_handler(joined);
            }
        }
    }

    tracing::info!(in_flight = handlers.len(), "Input closed, draining requests");
    while let Some(joined) = handlers.join_next().await {
        report_handler(joined);
    }
    drop(response_tx);
    writer.await??;
    match read_error {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}

fn report_handler(joined: Result<(), JoinError>) {
    if let Err(e) = joined {
        tracing::error!("Request handler panicked: {e}");
    }
}

/// Parses one request line and runs it. Never fails: every problem becomes
/// an error response, with `id` echoed whenever the line was valid JSON.
pub async fn handle_line(pipeline: &SpeechPipeline, line: &str) -> WorkerResponse {
    let request: Value = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!("Malformed request line: {e}");
            return WorkerResponse::failure(
                Value::Null,
                ErrorBody::bad_request(format!("malformed JSON: {e}")),
            );
        }
    };
    let id = request.get("id").cloned().unwrap_or(Value::Null);

    let operation: Operation = match serde_json::from_value(request) {
        Ok(operation) => operation,
        Err(e) => return WorkerResponse::failure(id, ErrorBody::bad_request(e)),
    };

    match execute(pipeline, operation).await {
        Ok(result) => WorkerResponse::success(id, result),
        Err(error) => {
            tracing::info!(%id, code = %error.code, "Request failed: {}", error.message);
            WorkerResponse::failure(id, error)
        }
    }
}

async fn execute(pipeline: &SpeechPipeline, operation: Operation) -> Result<Value, ErrorBody> {
    match operation {
        Operation::Speak(request) => {
            let artifact = pipeline.synthesize_speech(&request).await?;
            to_result(AudioPayload::inline(&artifact))
        }
        Operation::Lipsync(request) => {
            let result = pipeline.synthesize_with_lipsync(&request).await?;
            to_result(LipSyncPayload {
                audio: AudioPayload::inline(&result.audio),
                lipsync: &result.track,
            })
        }
        Operation::Download(request) => {
            let artifact = pipeline.synthesize_for_download(&request).await?;
            to_result(AudioPayload::reference(&artifact))
        }
        Operation::Retrieve { key } => {
            let artifact = pipeline.retrieve_audio(&parse_key(&key)?).await?;
            to_result(AudioPayload::inline(&artifact))
        }
        Operation::Release { key } => {
            let key = parse_key(&key)?;
            pipeline.release_audio(&key).await;
            Ok(serde_json::json!({ "released": key }))
        }
        Operation::Transcribe { audio, language } => {
            let audio = decode_audio(&audio)?;
            let result = pipeline.transcribe(&audio, language.as_deref()).await?;
            to_result(result)
        }
        Operation::Voices { language } => to_result(pipeline.voices(language.as_deref())?),
    }
}

fn parse_key(raw: &str) -> Result<StorageKey, ErrorBody> {
    raw.parse()
        .map_err(|e| ErrorBody::new(ErrorBody::INVALID_KEY, e))
}

fn to_result(value: impl serde::Serialize) -> Result<Value, ErrorBody> {
    serde_json::to_value(value).map_err(|e| ErrorBody::new(ErrorBody::INTERNAL, e))
}
