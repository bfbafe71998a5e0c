use axum::{
    body::Body,
    extract::State,
    http::header::{CACHE_CONTROL, CONTENT_TYPE},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use bytes::Bytes;
use futures::Stream;
use railtalk::models::message::Message;
use railtalk::orchestrator::{Turn, TurnOutcome};
use railtalk::transport::encode_line;
use std::{
    convert::Infallible,
    pin::Pin,
    task::{Context, Poll},
};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::state::AppState;

/// Chunked plain text response with one JSON event per line.
///
/// There is no end marker, the turn is over when the body ends.
pub struct NdjsonResponse {
    rx: ReceiverStream<Message>,
}

impl NdjsonResponse {
    fn new(rx: ReceiverStream<Message>) -> Self {
        Self { rx }
    }
}

impl Stream for NdjsonResponse {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            match Pin::new(&mut self.rx).poll_next(cx) {
                Poll::Ready(Some(message)) => match encode_line(&message) {
                    Ok(line) => return Poll::Ready(Some(Ok(line))),
                    Err(e) => tracing::warn!(error = %e, "dropping event that could not be encoded"),
                },
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

impl IntoResponse for NdjsonResponse {
    fn into_response(self) -> axum::response::Response {
        let body = Body::from_stream(self);
        (
            [
                (CONTENT_TYPE, "text/plain; charset=utf-8"),
                (CACHE_CONTROL, "no-cache"),
            ],
            body,
        )
            .into_response()
    }
}

async fn handler(State(state): State<AppState>, Json(turn): Json<Turn>) -> NdjsonResponse {
    // Create channel for streaming
    let (tx, rx) = mpsc::channel(100);
    let stream = ReceiverStream::new(rx);
    let cancel = CancellationToken::new();

    tracing::info!(history = turn.history.len(), "chat turn started");

    // Spawn task to handle the turn
    tokio::spawn(async move {
        // the receiver goes away with the response body when the client disconnects
        let watcher = {
            let tx = tx.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tx.closed().await;
                tracing::info!("client disconnected, cancelling turn");
                cancel.cancel();
            })
        };

        let outcome = state.orchestrator.run(turn, &tx, cancel).await;
        watcher.abort();

        match outcome {
            TurnOutcome::Done => tracing::info!("chat turn finished"),
            TurnOutcome::Cancelled => tracing::info!("chat turn cancelled"),
            TurnOutcome::Failed(e) => tracing::warn!(error = %e, "chat turn failed"),
        }
    });

    NdjsonResponse::new(stream)
}

// Configure routes for this module
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/api/chat", post(handler))
        .with_state(state)
}
