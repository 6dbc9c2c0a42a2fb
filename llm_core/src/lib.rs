use anyhow::{Context, Result};
use async_stream::try_stream;
use bytes::Bytes;
use futures::{pin_mut, Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Structure for the Ollama-compatible chat API request
#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    stream: bool,
}

#[derive(Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

/// One NDJSON line of a streamed chat response
#[derive(Deserialize)]
struct ChatChunk {
    #[serde(default)]
    message: Option<ChunkMessage>,
    #[serde(default)]
    done: bool,
}

#[derive(Deserialize)]
struct ChunkMessage {
    content: String,
}

/// An event decoded from one line of the chat stream.
enum LineEvent {
    Delta(String),
    Done,
    Empty,
}

pub struct ChatClient {
    http: Client,
    base_url: String,
    model: String,
}

impl ChatClient {
    /// Create a new client against an Ollama-compatible base URL.
    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Send a prompt and stream the reply as text deltas, in arrival order.
    ///
    /// The stream ends at the `done` marker or when the connection closes.
    /// A transport failure mid-stream surfaces as an `Err` item and
    /// terminates the stream.
    pub fn stream_chat(&self, prompt: String) -> impl Stream<Item = Result<String>> + Send + 'static {
        let http = self.http.clone();
        let url = format!("{}/api/chat", self.base_url);
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
            stream: true,
        };

        try_stream! {
            let response = http
                .post(&url)
                .json(&request)
                .send()
                .await
                .with_context(|| format!("failed to reach chat endpoint {url}"))?
                .error_for_status()
                .context("chat endpoint returned an error status")?;

            let body = response
                .bytes_stream()
                .map(|item| item.context("chat stream interrupted"));
            let deltas = decode_deltas(body);
            pin_mut!(deltas);
            while let Some(delta) = deltas.next().await {
                yield delta?;
            }
        }
    }
}

/// Decode a raw byte stream of newline-delimited JSON chat chunks into text
/// deltas.
///
/// A network read may end mid-line, so incomplete trailing bytes are
/// buffered until the next read completes them; a final line without a
/// trailing newline is still decoded when the stream closes.
fn decode_deltas<S>(body: S) -> impl Stream<Item = Result<String>>
where
    S: Stream<Item = Result<Bytes>>,
{
    try_stream! {
        pin_mut!(body);
        let mut buffer: Vec<u8> = Vec::new();
        let mut done = false;

        while !done {
            let Some(chunk) = body.next().await else {
                break;
            };
            let chunk = chunk?;
            buffer.extend_from_slice(&chunk);

            while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=pos).collect();
                match parse_line(&line)? {
                    LineEvent::Delta(text) => yield text,
                    LineEvent::Done => {
                        done = true;
                        break;
                    }
                    LineEvent::Empty => {}
                }
            }
        }

        if !done {
            let tail = std::mem::take(&mut buffer);
            if let LineEvent::Delta(text) = parse_line(&tail)? {
                yield text;
            }
        }
    }
}

fn parse_line(line: &[u8]) -> Result<LineEvent> {
    let line = std::str::from_utf8(line)
        .context("chat stream line is not valid UTF-8")?
        .trim();
    if line.is_empty() {
        return Ok(LineEvent::Empty);
    }
    let chunk: ChatChunk =
        serde_json::from_str(line).with_context(|| format!("malformed chat stream line: {line}"))?;
    let content = chunk.message.map(|m| m.content).filter(|c| !c.is_empty());
    match (content, chunk.done) {
        (Some(text), _) => Ok(LineEvent::Delta(text)),
        (None, true) => Ok(LineEvent::Done),
        (None, false) => Ok(LineEvent::Empty),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn delta_line(content: &str) -> String {
        format!(
            "{}\n",
            serde_json::json!({ "message": { "role": "assistant", "content": content }, "done": false })
        )
    }

    async fn collect(chunks: Vec<&str>) -> Vec<Result<String>> {
        let body = stream::iter(
            chunks
                .into_iter()
                .map(|c| Ok(Bytes::copy_from_slice(c.as_bytes())))
                .collect::<Vec<_>>(),
        );
        decode_deltas(body).collect().await
    }

    fn unwrap_all(items: Vec<Result<String>>) -> Vec<String> {
        items.into_iter().map(|i| i.unwrap()).collect()
    }

    #[tokio::test]
    async fn yields_deltas_in_arrival_order() {
        let lines = format!("{}{}", delta_line("Hello"), delta_line(" world"));
        let deltas = unwrap_all(collect(vec![&lines]).await);
        assert_eq!(deltas, vec!["Hello", " world"]);
    }

    #[tokio::test]
    async fn buffers_lines_split_across_reads() {
        let line = delta_line("split across reads");
        let (head, tail) = line.split_at(17);
        let deltas = unwrap_all(collect(vec![head, tail]).await);
        assert_eq!(deltas, vec!["split across reads"]);
    }

    #[tokio::test]
    async fn stops_at_done_marker() {
        let body = format!(
            "{}{}\n{}",
            delta_line("before"),
            serde_json::json!({ "message": { "role": "assistant", "content": "" }, "done": true }),
            delta_line("after")
        );
        let deltas = unwrap_all(collect(vec![&body]).await);
        assert_eq!(deltas, vec!["before"]);
    }

    #[tokio::test]
    async fn decodes_final_line_without_newline() {
        let line = delta_line("tail");
        let deltas = unwrap_all(collect(vec![line.trim_end()]).await);
        assert_eq!(deltas, vec!["tail"]);
    }

    #[tokio::test]
    async fn malformed_line_surfaces_an_error() {
        let results = collect(vec!["{not json\n"]).await;
        assert_eq!(results.len(), 1);
        assert!(results[0].is_err());
    }

    #[test]
    fn parse_line_skips_blank_lines() {
        assert!(matches!(parse_line(b"  \r"), Ok(LineEvent::Empty)));
    }

    #[test]
    fn done_line_with_content_still_yields_delta() {
        let line = br#"{"message":{"role":"assistant","content":"bye"},"done":true}"#;
        match parse_line(line).unwrap() {
            LineEvent::Delta(text) => assert_eq!(text, "bye"),
            _ => panic!("content on the done line must not be dropped"),
        }
    }
}
