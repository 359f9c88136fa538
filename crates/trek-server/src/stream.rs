//! NDJSON response bodies.

use axum::body::Body;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;

use trek_core::Frame;

/// NDJSON media type.
pub const NDJSON: &str = "application/x-ndjson";

/// Wrap a frame channel as a streaming NDJSON response.
///
/// Each frame serializes to one line, flushed as produced. A frame that
/// fails to serialize is skipped; the stream itself never errors, it just
/// ends when the sender side is dropped.
pub fn ndjson_response(rx: mpsc::Receiver<Frame>) -> Response {
    let lines = ReceiverStream::new(rx).filter_map(|frame| {
        serde_json::to_vec(&frame).ok().map(|mut line| {
            line.push(b'\n');
            Ok::<_, std::convert::Infallible>(Bytes::from(line))
        })
    });
    (
        [(header::CONTENT_TYPE, NDJSON)],
        Body::from_stream(lines),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[tokio::test]
    async fn frames_become_one_line_each() {
        let (tx, rx) = mpsc::channel(8);
        tx.send(Frame::Meta {
            thread_id: "thr_1".to_owned(),
        })
        .await
        .unwrap();
        tx.send(Frame::Done).await.unwrap();
        drop(tx);

        let response = ndjson_response(rx);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            NDJSON
        );
        let body = to_bytes(response.into_body(), 1024).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("\"meta\""));
        assert_eq!(lines[1], r#"{"type":"done"}"#);
    }
}
