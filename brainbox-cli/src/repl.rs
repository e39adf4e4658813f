//! Interactive tutoring session on a single problem.

use crate::terminal::{print_artifacts, stream_answer};
use brainbox_core::{ClientConfig, HintBoard, Session, StreamRequest, StreamingResponseAssembler};
use std::future::Future;
use std::io::{self, BufRead, Write};
use tokio::sync::mpsc;

/// Commands available at the `you>` prompt.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum ReplInput<'a> {
    Question(&'a str),
    Hints,
    Code,
    New,
    Help,
    Quit,
    Empty,
    Unknown(&'a str),
}

pub(crate) fn parse_input(line: &str) -> ReplInput<'_> {
    let line = line.trim();
    if line.is_empty() {
        return ReplInput::Empty;
    }
    if !line.starts_with('/') {
        return ReplInput::Question(line);
    }
    match line {
        "/hints" => ReplInput::Hints,
        "/code" => ReplInput::Code,
        "/new" => ReplInput::New,
        "/help" => ReplInput::Help,
        "/quit" | "/exit" => ReplInput::Quit,
        other => ReplInput::Unknown(other),
    }
}

fn print_help() {
    println!("  /hints  list hints collected in this session");
    println!("  /code   show the last code example");
    println!("  /new    start a new conversation on this problem");
    println!("  /quit   leave");
    println!("  Ctrl-C  stop the current answer");
}

/// Read stdin lines on a plain thread so the prompt can be raced against Ctrl-C.
///
/// The thread is not joined; it ends with the process or on EOF.
fn spawn_line_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(1);
    std::thread::spawn(move || {
        let stdin = io::stdin();
        let mut lines = stdin.lock();
        loop {
            let mut line = String::new();
            match lines.read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    if tx.blocking_send(line).is_err() {
                        break;
                    }
                }
            }
        }
    });
    rx
}

/// The next input line, or `None` on EOF or once `interrupt` resolves.
async fn next_line<F: Future>(lines: &mut mpsc::Receiver<String>, interrupt: F) -> Option<String> {
    tokio::select! {
        biased;
        _ = interrupt => None,
        line = lines.recv() => line,
    }
}

pub(crate) async fn run_chat(
    config: ClientConfig,
    session: Session,
    problem_slug: String,
    conversation: Option<String>,
) -> anyhow::Result<()> {
    let mut assembler = StreamingResponseAssembler::from_config(&config)?;
    let language = config.stream.code_language.clone();
    let mut conversation_id = conversation.unwrap_or_else(new_conversation_id);
    let mut board = HintBoard::new();
    let mut last_code: Option<String> = None;

    println!(
        "\x1b[1mBrainBox\x1b[0m on \x1b[36m{}\x1b[0m (conversation {}). Type /help for commands.",
        problem_slug, conversation_id
    );

    let mut lines = spawn_line_reader();
    loop {
        print!("\n\x1b[34myou>\x1b[0m ");
        let _ = io::stdout().flush();

        let Some(input) = next_line(&mut lines, tokio::signal::ctrl_c()).await else {
            println!();
            break;
        };

        match parse_input(&input) {
            ReplInput::Empty => continue,
            ReplInput::Quit => break,
            ReplInput::Help => print_help(),
            ReplInput::Hints => {
                if board.is_empty() {
                    println!("No hints yet. Ask for one!");
                }
                for (i, hint) in board.hints().iter().enumerate() {
                    println!("\x1b[33m{}.\x1b[0m {}", i + 1, hint);
                }
            }
            ReplInput::Code => match &last_code {
                Some(code) => println!("{}", code.trim_matches('\n')),
                None => println!("No code example yet."),
            },
            ReplInput::New => {
                conversation_id = new_conversation_id();
                board.clear();
                last_code = None;
                println!("Started conversation {}", conversation_id);
            }
            ReplInput::Unknown(cmd) => {
                println!("Unknown command: {}. Type /help for commands.", cmd);
            }
            ReplInput::Question(question) => {
                let request =
                    StreamRequest::new(question, problem_slug.as_str(), conversation_id.as_str());
                match stream_answer(&assembler, &request, &session).await {
                    Ok(Some(response)) => {
                        print_artifacts(&response, &language, &mut board);
                        if response.extracted_code.is_some() {
                            last_code = response.extracted_code;
                        }
                    }
                    Ok(None) => assembler.reset_cancellation(),
                    // Already shown by the observer; the session goes on.
                    Err(_) => {}
                }
            }
        }
    }

    println!("Goodbye!");
    Ok(())
}

pub(crate) fn new_conversation_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
