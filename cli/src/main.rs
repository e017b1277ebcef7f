//! Loom CLI binary: run an agent turn, one-shot or interactively, against
//! either an in-process runtime or a running `serve` process.
//!
//! Subcommands: `run` (default), `serve`, `tool` (list/show).

mod log_format;
mod logging;
mod repl;

use clap::{Parser, Subcommand};
use cli::{LocalBackend, RemoteBackend, RunBackend, RunOptions, StreamOut, ToolShowFormat};
use repl::run_repl_loop;
use std::path::PathBuf;
use std::sync::Arc;

const DEFAULT_WS_URL: &str = "ws://127.0.0.1:8080";

#[derive(Parser, Debug)]
#[command(name = "loom")]
#[command(about = "Loom — run an autonomous agent from the CLI")]
struct Args {
    #[command(subcommand)]
    cmd: Option<Command>,

    /// Agent id (registry name or stable id) to run
    #[arg(short, long, value_name = "ID", default_value = "assistant")]
    agent: String,

    /// User message (or pass as first positional argument)
    #[arg(short, long, value_name = "TEXT")]
    message: Option<String>,

    /// Positional args: user message when -m/--message is not used
    #[arg(trailing_var_arg = true)]
    rest: Vec<String>,

    /// Session id for the agent's working memory (new session if unset)
    #[arg(long, value_name = "ID")]
    session_id: Option<String>,

    /// Thread id for the user-message store, independent of session memory
    #[arg(long, value_name = "ID")]
    thread_id: Option<String>,

    /// Interactive REPL: after output, prompt for input and continue the session
    #[arg(short, long)]
    interactive: bool,

    /// Run against a `serve` process over WebSocket instead of in-process (default: local)
    #[arg(long)]
    remote: bool,

    /// Remote WebSocket URL to use with --remote (default: ws://127.0.0.1:8080 or LOOM_REMOTE_URL)
    #[arg(long, value_name = "URL")]
    remote_url: Option<String>,

    /// Do not auto-start server when --remote is used and no server is listening
    #[arg(long)]
    no_auto_start: bool,

    /// Output as JSON: stream events + reply for a run, JSON array/object for tool list/show
    #[arg(long)]
    json: bool,

    /// When using --json, write output to this file instead of stdout
    #[arg(long, value_name = "PATH")]
    file: Option<PathBuf>,

    /// When using --json, pretty-print (multi-line). Default: compact, one line
    #[arg(long)]
    pretty: bool,
}

fn resolve_remote_url(args: &Args) -> String {
    if let Some(ref u) = args.remote_url {
        return u.clone();
    }
    std::env::var("LOOM_REMOTE_URL").unwrap_or_else(|_| DEFAULT_WS_URL.to_string())
}

fn resolve_auto_start(args: &Args) -> bool {
    if args.no_auto_start {
        return false;
    }
    !matches!(
        std::env::var("LOOM_NO_AUTO_START").as_deref(),
        Ok("1") | Ok("true") | Ok("yes")
    )
}

/// Writes JSON to stdout or to the given file. When pretty is true, multi-line; else one line.
fn write_json_output(
    value: &serde_json::Value,
    file: Option<&std::path::Path>,
    pretty: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let s = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    match file {
        Some(path) => std::fs::write(path, format!("{}\n", s))?,
        None => {
            println!("{}", s);
            std::io::Write::flush(&mut std::io::stdout())?;
        }
    }
    Ok(())
}

/// Appends one JSON line to file or stdout (for NDJSON stream reply line).
fn write_json_line_append(
    value: &serde_json::Value,
    file: Option<&std::path::Path>,
    pretty: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let s = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    let line = format!("{}\n", s);
    match file {
        Some(path) => {
            use std::io::Write;
            let mut f = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
            f.write_all(line.as_bytes())?;
        }
        None => {
            println!("{}", s.trim_end());
            std::io::Write::flush(&mut std::io::stdout())?;
        }
    }
    Ok(())
}

/// Builds `StreamOut` for `--json`: writes each event as one JSON line to file or stdout.
fn make_stream_out(file: Option<&PathBuf>, pretty: bool) -> StreamOut {
    let file = file.cloned();
    Some(Arc::new(std::sync::Mutex::new(move |value: serde_json::Value| {
        let s = if pretty {
            serde_json::to_string_pretty(&value).unwrap_or_default()
        } else {
            serde_json::to_string(&value).unwrap_or_default()
        };
        match &file {
            Some(path) => drop(
                std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .and_then(|mut f| std::io::Write::write_all(&mut f, format!("{}\n", s).as_bytes())),
            ),
            None => {
                println!("{}", s);
                let _ = std::io::Write::flush(&mut std::io::stdout());
            }
        }
    })))
}

fn make_backend(args: &Args) -> Arc<dyn RunBackend> {
    if args.remote {
        Arc::new(RemoteBackend::new(resolve_remote_url(args)))
    } else {
        Arc::new(LocalBackend)
    }
}

#[derive(Subcommand, Debug, Clone)]
enum Command {
    /// Run a single agent turn (the default when no subcommand is given)
    Run,
    /// Run WebSocket server for remote mode (ws://127.0.0.1:8080)
    Serve(ServeArgs),
    /// List or show tool definitions available to agents
    Tool(ToolArgs),
}

#[derive(clap::Args, Debug, Clone)]
struct ToolArgs {
    #[command(subcommand)]
    sub: ToolCommand,
}

#[derive(Subcommand, Debug, Clone)]
enum ToolCommand {
    /// List all registered tools (name and description)
    List,
    /// Show full definition of one tool (name, description, input_schema)
    Show(ShowToolArgs),
}

#[derive(clap::Args, Debug, Clone)]
struct ShowToolArgs {
    /// Tool name (e.g. get_error_details, get_recent_messages)
    name: String,
    /// Output format: yaml (default) or json
    #[arg(long, value_name = "FORMAT", default_value = "yaml")]
    output: String,
}

#[derive(clap::Args, Debug, Clone)]
struct ServeArgs {
    /// WebSocket listen address (default 127.0.0.1:8080)
    #[arg(long, value_name = "ADDR")]
    addr: Option<String>,
    /// Keep server running after first connection (default: exit after first connection)
    #[arg(long)]
    keep_alive: bool,
}

/// Default max length for the assistant reply printed to stdout. 0 means no truncation.
const DEFAULT_MAX_REPLY_LEN: usize = 0;

/// Truncates `s` to at most `max` chars. When truncated, appends `...` (total length = max).
/// Uses character boundaries for safe UTF-8 handling.
fn truncate_message(s: &str, max: usize) -> String {
    const SUFFIX_LEN: usize = 3;
    if max <= SUFFIX_LEN {
        return s.chars().take(max).collect();
    }
    let content_max = max - SUFFIX_LEN;
    if s.chars().count() <= max {
        return s.to_string();
    }
    format!("{}...", s.chars().take(content_max).collect::<String>())
}

/// Reads max reply length from `LOOM_MAX_REPLY_LEN`. 0 means no truncation.
fn max_reply_len() -> usize {
    std::env::var("LOOM_MAX_REPLY_LEN")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_MAX_REPLY_LEN)
}

/// Generates a session-unique id for REPL mode when the user does not provide one.
fn generate_repl_session_id() -> String {
    format!(
        "repl-{}",
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_millis()
    )
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    config::load_and_apply("loom", None::<&std::path::Path>).ok();
    logging::init()?;

    let args = Args::parse();

    if let Some(Command::Serve(sa)) = &args.cmd {
        if let Err(e) = serve::run_serve(sa.addr.as_deref(), !sa.keep_alive).await {
            eprintln!("serve error: {}", e);
            std::process::exit(1);
        }
        return Ok(());
    }

    let backend = make_backend(&args);

    if args.remote && resolve_auto_start(&args) {
        let url = resolve_remote_url(&args);
        if let Err(e) = cli::ensure_server_or_spawn(&url).await {
            eprintln!("loom: {}", e);
            std::process::exit(1);
        }
    }

    if let Some(Command::Tool(ta)) = &args.cmd {
        match &ta.sub {
            ToolCommand::List => {
                if let Err(e) = backend.list_tools(args.json).await {
                    eprintln!("{}", e);
                    std::process::exit(1);
                }
                return Ok(());
            }
            ToolCommand::Show(show_args) => {
                let format = if args.json || show_args.output.eq_ignore_ascii_case("json") {
                    ToolShowFormat::Json
                } else {
                    ToolShowFormat::Yaml
                };
                if let Err(e) = backend.show_tool(&show_args.name, format).await {
                    eprintln!("{}", e);
                    std::process::exit(1);
                }
                return Ok(());
            }
        }
    }

    let message = args.message.clone().or_else(|| {
        if args.rest.is_empty() {
            None
        } else {
            Some(args.rest.join(" "))
        }
    });

    let interactive = args.interactive;
    if !interactive && message.is_none() {
        eprintln!("loom: provide a message via -m/--message or positional args");
        std::process::exit(1);
    }

    let mut opts = RunOptions {
        agent_id: args.agent.clone(),
        session_id: args.session_id.clone(),
        thread_id: args.thread_id.clone(),
        message: message.clone().unwrap_or_default(),
        output_json: args.json,
    };

    let reply_len = max_reply_len();
    let stream_out: StreamOut = if args.json { make_stream_out(args.file.as_ref(), args.pretty) } else { None };

    if interactive {
        if opts.session_id.is_none() {
            opts.session_id = Some(generate_repl_session_id());
        }
        if let Some(ref msg) = message {
            if !msg.trim().is_empty() {
                opts.message = msg.clone();
                match backend.run(&opts, stream_out.clone()).await {
                    Ok(cli::RunOutput::Reply(reply)) => {
                        if args.json {
                            let out = serde_json::json!({ "reply": reply });
                            write_json_line_append(&out, args.file.as_deref(), args.pretty)?;
                        } else {
                            let out = if reply_len == 0 { reply } else { truncate_message(&reply, reply_len) };
                            println!("{}", out);
                        }
                    }
                    Ok(cli::RunOutput::Json { events, reply }) => {
                        let out = serde_json::json!({ "events": events, "reply": reply });
                        write_json_output(&out, args.file.as_deref(), args.pretty)?;
                    }
                    Err(e) => {
                        eprintln!("error: {}", e);
                        std::process::exit(1);
                    }
                }
            }
        }
        run_repl_loop(&backend, &opts, reply_len, args.file.clone(), args.pretty, stream_out).await?;
    } else {
        let output = backend.run(&opts, stream_out).await?;
        match output {
            cli::RunOutput::Reply(reply) => {
                if args.json {
                    let out = serde_json::json!({ "reply": reply });
                    write_json_line_append(&out, args.file.as_deref(), args.pretty)?;
                } else {
                    let out = if reply_len == 0 { reply } else { truncate_message(&reply, reply_len) };
                    println!("{}", out);
                    let _ = std::io::Write::flush(&mut std::io::stdout());
                }
            }
            cli::RunOutput::Json { events, reply } => {
                let out = serde_json::json!({ "events": events, "reply": reply });
                write_json_output(&out, args.file.as_deref(), args.pretty)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{truncate_message, DEFAULT_MAX_REPLY_LEN};

    /// When message is shorter than max, returns unchanged.
    #[test]
    fn truncate_message_unchanged_when_short() {
        let s = "hello";
        assert_eq!(truncate_message(s, 200), "hello");
        assert_eq!(truncate_message(s, 10), "hello");
    }

    /// When message equals max, returns unchanged.
    #[test]
    fn truncate_message_unchanged_when_exact() {
        let s = "a".repeat(200);
        assert_eq!(truncate_message(&s, 200), s);
    }

    /// When message exceeds max, truncates to content_max + "..." (total = max).
    #[test]
    fn truncate_message_truncates_with_suffix() {
        let s = "a".repeat(250);
        let got = truncate_message(&s, 200);
        assert_eq!(got.len(), 200);
        assert!(got.ends_with("..."));
        assert_eq!(got.chars().count(), 200);
    }

    /// UTF-8 multi-byte chars are handled correctly (no panic, correct char count).
    #[test]
    fn truncate_message_utf8_safe() {
        let s = "Hello World ".repeat(20); // 240 chars
        let got = truncate_message(&s, 200);
        assert_eq!(got.chars().count(), 200);
        assert!(got.ends_with("..."));
    }

    /// Default reply length is 0 (no truncation; full assistant output).
    #[test]
    fn default_max_reply_len_is_zero() {
        assert_eq!(DEFAULT_MAX_REPLY_LEN, 0);
    }
}
