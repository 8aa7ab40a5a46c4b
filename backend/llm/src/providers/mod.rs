pub mod mock;
pub mod ollama;
pub mod openai;

use anyhow::Result;
use futures::stream::{self, Stream, StreamExt};

use hearth_core::TextStream;

/// What a single line of a streamed response body means.
pub(crate) enum LineEvent {
    Token(String),
    Skip,
    Done,
}

struct LineState<S, F> {
    body: S,
    buffer: Vec<u8>,
    parse: F,
    finished: bool,
}

/// Split a streamed HTTP body on newlines and turn each complete line into
/// at most one token. Nothing is buffered beyond the current partial line.
pub(crate) fn line_stream<S, B, E, F>(body: S, parse: F) -> TextStream
where
    S: Stream<Item = std::result::Result<B, E>> + Send + Unpin + 'static,
    B: AsRef<[u8]>,
    E: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Result<LineEvent> + Send + 'static,
{
    let state = LineState {
        body: body.fuse(),
        buffer: Vec::new(),
        parse,
        finished: false,
    };

    stream::unfold(state, |mut st| async move {
        loop {
            if st.finished {
                return None;
            }

            if let Some(pos) = st.buffer.iter().position(|b| *b == b'\n') {
                let raw: Vec<u8> = st.buffer.drain(..=pos).collect();
                let line = String::from_utf8_lossy(&raw);
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match (st.parse)(line) {
                    Ok(LineEvent::Token(token)) => return Some((Ok(token), st)),
                    Ok(LineEvent::Skip) => continue,
                    Ok(LineEvent::Done) => return None,
                    Err(e) => {
                        st.finished = true;
                        return Some((Err(e), st));
                    }
                }
            }

            match st.body.next().await {
                Some(Ok(bytes)) => st.buffer.extend_from_slice(bytes.as_ref()),
                Some(Err(e)) => {
                    st.finished = true;
                    let err = anyhow::Error::new(e).context("stream read failed");
                    return Some((Err(err), st));
                }
                None if st.buffer.is_empty() => return None,
                // Flush a trailing line that had no newline.
                None => st.buffer.push(b'\n'),
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunks(parts: &[&str]) -> impl Stream<Item = std::result::Result<Vec<u8>, std::io::Error>> + Unpin {
        stream::iter(
            parts
                .iter()
                .map(|p| Ok(p.as_bytes().to_vec()))
                .collect::<Vec<_>>(),
        )
    }

    fn passthrough(line: &str) -> Result<LineEvent> {
        match line {
            "END" => Ok(LineEvent::Done),
            "#" => Ok(LineEvent::Skip),
            other => Ok(LineEvent::Token(other.to_string())),
        }
    }

    #[tokio::test]
    async fn test_lines_split_across_chunks() {
        let tokens: Vec<String> = line_stream(chunks(&["hel", "lo\nwor", "ld\n#\nEND\nignored\n"]), passthrough)
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(tokens, vec!["hello", "world"]);
    }

    #[tokio::test]
    async fn test_trailing_line_without_newline() {
        let tokens: Vec<String> = line_stream(chunks(&["a\n", "b"]), passthrough)
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(tokens, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_parse_error_ends_stream() {
        let parse = |line: &str| -> Result<LineEvent> {
            if line == "bad" {
                anyhow::bail!("bad line")
            }
            Ok(LineEvent::Token(line.to_string()))
        };
        let items: Vec<Result<String>> = line_stream(chunks(&["ok\nbad\nnever\n"]), parse).collect().await;
        assert_eq!(items.len(), 2);
        assert!(items[1].is_err());
    }
}
