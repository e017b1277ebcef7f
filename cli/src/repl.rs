//! Interactive REPL loop: read stdin, run one turn, print the reply, repeat
//! until EOF or `quit`. Keeps a stable `session_id` for the run of the REPL
//! so the agent's memory carries across turns.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};

use cli::{RunBackend, RunOptions};

/// Truncates reply for display. 0 means no truncation.
fn truncate_reply(reply: &str, max_len: usize) -> String {
    if max_len == 0 {
        return reply.to_string();
    }
    crate::truncate_message(reply, max_len)
}

/// Runs the REPL loop: prompt, read line, run one turn, print, repeat.
///
/// Exits on EOF (Ctrl+D), empty line, or `quit`/`exit`/`/quit`.
/// On run error, prints to stderr and continues.
pub async fn run_repl_loop(
    backend: &Arc<dyn RunBackend>,
    base_opts: &RunOptions,
    max_reply_len: usize,
    json_file: Option<PathBuf>,
    json_pretty: bool,
    stream_out: cli::StreamOut,
) -> Result<(), Box<dyn std::error::Error>> {
    let json_stream = stream_out.is_some();
    let mut reader = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let line = reader.next_line().await?;

        let line = match line {
            None => break,
            Some(s) if s.trim().is_empty() => continue,
            Some(s) if is_quit_command(&s) => break,
            Some(s) => s,
        };

        let mut opts = base_opts.clone();
        opts.message = line;

        match backend.run(&opts, stream_out.clone()).await {
            Ok(cli::RunOutput::Json { events, reply }) => {
                let out = serde_json::json!({ "events": events, "reply": reply });
                let s = write_json(&out, json_pretty);
                match &json_file {
                    Some(p) => std::fs::write(p, format!("{}\n", s))?,
                    None => println!("{}", s),
                }
            }
            Ok(cli::RunOutput::Reply(reply)) => {
                if json_stream {
                    let out = serde_json::json!({ "reply": reply });
                    let s = write_json(&out, json_pretty);
                    match &json_file {
                        Some(p) => {
                            use std::io::Write;
                            let mut f = std::fs::OpenOptions::new().create(true).append(true).open(p)?;
                            f.write_all(format!("{}\n", s).as_bytes())?;
                        }
                        None => println!("{}", s),
                    }
                } else {
                    println!("{}", truncate_reply(&reply, max_reply_len));
                }
            }
            Err(e) => eprintln!("error: {}", e),
        }
    }

    println!("Bye.");
    Ok(())
}

fn write_json(value: &serde_json::Value, pretty: bool) -> String {
    if pretty {
        serde_json::to_string_pretty(value).unwrap_or_default()
    } else {
        serde_json::to_string(value).unwrap_or_default()
    }
}

fn is_quit_command(s: &str) -> bool {
    let lower = s.trim().to_lowercase();
    matches!(lower.as_str(), "quit" | "exit" | "/quit")
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use cli::{RunError, ToolShowFormat};
    use std::sync::Mutex;

    struct DummyBackend {
        seen: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl RunBackend for DummyBackend {
        async fn run(&self, opts: &RunOptions, _stream_out: cli::StreamOut) -> Result<cli::RunOutput, RunError> {
            self.seen.lock().unwrap().push(opts.message.clone());
            Ok(cli::RunOutput::Reply("ok".to_string()))
        }

        async fn list_tools(&self, _output_json: bool) -> Result<(), RunError> {
            Ok(())
        }

        async fn show_tool(&self, _name: &str, _format: ToolShowFormat) -> Result<(), RunError> {
            Ok(())
        }
    }

    #[test]
    fn is_quit_command_matches_expected_tokens() {
        assert!(is_quit_command("quit"));
        assert!(is_quit_command(" EXIT "));
        assert!(is_quit_command("/quit"));
        assert!(!is_quit_command("continue"));
    }

    #[test]
    fn truncate_reply_respects_zero_and_limit() {
        assert_eq!(truncate_reply("hello world", 0), "hello world");
        let truncated = truncate_reply("abcdefghijk", 8);
        assert_eq!(truncated.chars().count(), 8);
        assert!(truncated.ends_with("..."));
    }

    #[tokio::test]
    async fn backend_run_receives_the_message_set_per_line() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let backend: Arc<dyn RunBackend> = Arc::new(DummyBackend { seen: Arc::clone(&seen) });
        let mut opts = RunOptions::default();
        opts.agent_id = "assistant".to_string();
        opts.message = "hello".to_string();
        let out = backend.run(&opts, None).await.unwrap();
        assert!(matches!(out, cli::RunOutput::Reply(reply) if reply == "ok"));
        assert_eq!(seen.lock().unwrap().first().unwrap(), "hello");
    }
}
