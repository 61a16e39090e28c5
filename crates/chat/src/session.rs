//! Interactive question loop

use crate::transcript::Transcript;
use citegraph_common::context::Retriever;
use std::io::Write;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, error};

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Exit,
    Skip,
    Ask(String),
}

fn parse_line(line: &str) -> Command {
    let line = line.trim();
    if line.is_empty() {
        return Command::Skip;
    }
    match line.to_lowercase().as_str() {
        "exit" | "quit" => Command::Exit,
        _ => Command::Ask(line.to_string()),
    }
}

/// Read questions from `input` until "exit", "quit" or end of input, streaming
/// each answer to `output`. Returns the number of questions answered.
pub async fn run<R, W>(
    retriever: &Retriever,
    transcript: &Transcript,
    input: R,
    output: &mut W,
) -> anyhow::Result<usize>
where
    R: AsyncBufRead + Unpin,
    W: Write + Send,
{
    let mut lines = input.lines();
    let mut answered = 0;

    loop {
        write!(output, "\nQuestion: ")?;
        output.flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };

        let question = match parse_line(&line) {
            Command::Exit => break,
            Command::Skip => continue,
            Command::Ask(question) => question,
        };

        write!(output, "Answer: ")?;
        let mut write_error = None;
        let result = retriever
            .answer_streaming(&question, |token| {
                if write_error.is_some() {
                    return;
                }
                if let Err(e) = output.write_all(token.as_bytes()).and_then(|_| output.flush()) {
                    write_error = Some(e);
                }
            })
            .await;
        if let Some(e) = write_error {
            debug!(error = %e, "Failed to write streamed answer");
        }
        writeln!(output)?;

        match result {
            Ok(answer) => {
                answered += 1;
                transcript.record(&question, &answer).await;
            }
            Err(e) => {
                error!(error = %e, "Failed to answer question");
                writeln!(output, "[error] {}", e)?;
            }
        }
    }

    Ok(answered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use citegraph_common::config::{AppConfig, TranscriptConfig};
    use citegraph_common::embeddings::MockEmbedder;
    use citegraph_common::graph::{GraphStore, MemoryGraphStore, NewChunk};
    use citegraph_common::llm::ScriptedLanguageModel;
    use citegraph_common::Embedder;
    use std::sync::Arc;
    use tempfile::TempDir;
    use tokio::io::BufReader;

    const DIM: usize = 32;

    #[test]
    fn test_parse_line() {
        assert_eq!(parse_line("  QUIT "), Command::Exit);
        assert_eq!(parse_line("exit"), Command::Exit);
        assert_eq!(parse_line("   "), Command::Skip);
        assert_eq!(parse_line(" When? "), Command::Ask("When?".into()));
    }

    async fn retriever(llm: ScriptedLanguageModel) -> Retriever {
        let store = Arc::new(MemoryGraphStore::new());
        let embedder = MockEmbedder::new(DIM);
        let document = store.get_or_create_document("Licensing Regulation").await.unwrap();
        let text = "Article 9\nFees are due in January.";
        store
            .get_or_create_chunk(
                &document,
                &NewChunk {
                    ordinal: 0,
                    text: text.into(),
                    embedding: embedder.embed(text).await.unwrap(),
                },
            )
            .await
            .unwrap();

        Retriever::new(store, Arc::new(embedder), Arc::new(llm), &AppConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_session_streams_answers_and_records_transcript() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("chat_history.txt");
        let transcript = Transcript::new(&TranscriptConfig {
            path: path.display().to_string(),
            enabled: true,
        });
        let retriever = retriever(ScriptedLanguageModel::new("Fees are due in January.")).await;

        let input = BufReader::new(&b"\nWhen are fees due?\nquit\nnever asked\n"[..]);
        let mut output = Vec::new();
        let answered = tokio_test::assert_ok!(run(&retriever, &transcript, input, &mut output).await);

        assert_eq!(answered, 1);
        let printed = String::from_utf8(output).unwrap();
        assert!(printed.contains("Answer: Fees are due in January.\n"));
        assert!(!printed.contains("never asked"));

        let log = std::fs::read_to_string(path).unwrap();
        assert!(log.contains("question: When are fees due?"));
        assert!(log.contains("answer: Fees are due in January."));
    }

    /// Rejects any write that contains `needle`
    struct RejectingWriter {
        needle: &'static str,
        written: Vec<u8>,
    }

    impl Write for RejectingWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if String::from_utf8_lossy(buf).contains(self.needle) {
                return Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed"));
            }
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_stream_write_failure_still_records_answer() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("chat_history.txt");
        let transcript = Transcript::new(&TranscriptConfig {
            path: path.display().to_string(),
            enabled: true,
        });
        let retriever = retriever(ScriptedLanguageModel::new("Fees are due in January.")).await;

        let input = BufReader::new(&b"When are fees due?\n"[..]);
        let mut output = RejectingWriter {
            needle: "January",
            written: Vec::new(),
        };
        let answered = tokio_test::assert_ok!(run(&retriever, &transcript, input, &mut output).await);

        assert_eq!(answered, 1);
        let printed = String::from_utf8(output.written).unwrap();
        assert!(printed.contains("Answer: Fees"));
        assert!(!printed.contains("January"));
        assert!(std::fs::read_to_string(path).unwrap().contains("answer: Fees are due in January."));
    }

    #[tokio::test]
    async fn test_failed_answer_keeps_session_alive() {
        let dir = TempDir::new().unwrap();
        let transcript = Transcript::new(&TranscriptConfig {
            path: dir.path().join("chat_history.txt").display().to_string(),
            enabled: true,
        });
        let retriever = retriever(
            ScriptedLanguageModel::new("Fees are due in January.").with_failure("penalty"),
        )
        .await;

        let input = BufReader::new(&b"What is the penalty?\nWhen are fees due?\n"[..]);
        let mut output = Vec::new();
        let answered = tokio_test::assert_ok!(run(&retriever, &transcript, input, &mut output).await);

        assert_eq!(answered, 1);
        assert!(String::from_utf8(output).unwrap().contains("[error]"));
    }
}
