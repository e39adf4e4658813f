//! CLI subcommand handlers.

use crate::repl::{new_conversation_id, run_chat};
use crate::terminal::{Reported, print_artifacts, stream_answer};
use crate::{Commands, ConfigAction, ConversationAction};
use brainbox_core::config::{store_login, user_config_path};
use brainbox_core::error::{ApiError, StreamError};
use brainbox_core::problem::{problem_slug_from_input, title_from_slug};
use brainbox_core::types::ConversationSummary;
use brainbox_core::{
    AssembledResponse, BackendClient, ClientConfig, Credentials, HintBoard, Session,
    StreamRequest, StreamingResponseAssembler,
};
use std::path::PathBuf;

/// Handle a CLI subcommand.
///
/// `config_file` is the file given with `--config`, if any; `login` stores its
/// token there instead of the user config.
pub async fn handle_command(
    command: Commands,
    mut config: ClientConfig,
    config_file: Option<PathBuf>,
) -> anyhow::Result<()> {
    let session = session_for(&config);
    match command {
        Commands::Ask {
            question,
            problem,
            conversation,
            delay_ms,
        } => {
            if let Some(ms) = delay_ms {
                config.stream.char_delay_ms = ms;
            }
            handle_ask(&config, &session, &question, &problem, conversation).await
        }
        Commands::Chat {
            problem,
            conversation,
            delay_ms,
        } => {
            if let Some(ms) = delay_ms {
                config.stream.char_delay_ms = ms;
            }
            let slug = parse_slug(&problem)?;
            run_chat(config, session, slug, conversation).await
        }
        Commands::Login {
            username,
            password,
            print,
        } => {
            let target = if print {
                None
            } else {
                config_file.or_else(user_config_path)
            };
            handle_login(&config, &username, password, target).await
        }
        Commands::Signup { username, password } => {
            handle_signup(&config, &username, password).await
        }
        Commands::Problem { problem, summary } => handle_problem(&config, &problem, summary).await,
        Commands::History { conversation } => {
            handle_history(&config, &session, &conversation).await
        }
        Commands::Conversations { action } => {
            handle_conversations(&config, &session, action.unwrap_or(ConversationAction::List))
                .await
        }
        Commands::Config { action } => handle_config(action, &config),
    }
}

fn session_for(config: &ClientConfig) -> Session {
    let session = Session::from_user_id(config.session.user_id.as_deref());
    match &config.backend.token {
        Some(token) => session.with_token(token.as_str()),
        None => session,
    }
}

fn parse_slug(input: &str) -> anyhow::Result<String> {
    problem_slug_from_input(input)
        .ok_or_else(|| anyhow::anyhow!("Not a problem slug or URL: '{}'", input))
}

async fn handle_ask(
    config: &ClientConfig,
    session: &Session,
    question: &str,
    problem: &str,
    conversation: Option<String>,
) -> anyhow::Result<()> {
    let slug = parse_slug(problem)?;
    let conversation_id = conversation.unwrap_or_else(new_conversation_id);
    let assembler = StreamingResponseAssembler::from_config(config)?;
    let request = StreamRequest::new(question, slug, conversation_id.as_str());

    tracing::info!(conversation_id = conversation_id.as_str(), "Asking tutor");
    let outcome = finish_turn(stream_answer(&assembler, &request, session).await)?;
    if let Some(response) = outcome {
        let mut board = HintBoard::new();
        print_artifacts(&response, &config.stream.code_language, &mut board);
        println!("\x1b[90mconversation: {}\x1b[0m", conversation_id);
    }
    Ok(())
}

/// Failures of a turn were already printed by the observer.
fn finish_turn(
    result: Result<Option<AssembledResponse>, StreamError>,
) -> anyhow::Result<Option<AssembledResponse>> {
    result.map_err(|err| Reported(err).into())
}

fn read_password(password: Option<String>, confirm: bool) -> anyhow::Result<String> {
    if let Some(password) = password {
        return Ok(password);
    }
    let mut prompt = dialoguer::Password::new().with_prompt("Password");
    if confirm {
        prompt = prompt.with_confirmation("Confirm password", "Passwords do not match");
    }
    Ok(prompt.interact()?)
}

async fn handle_login(
    config: &ClientConfig,
    username: &str,
    password: Option<String>,
    target: Option<PathBuf>,
) -> anyhow::Result<()> {
    let password = read_password(password, false)?;
    let client = BackendClient::new(&config.backend)?;
    let token = client
        .login(&Credentials::new(username, password))
        .await
        .map_err(friendly_api_error)?;

    match target {
        Some(path) => {
            store_login(&path, username, &token.access_token)?;
            println!("Logged in as {}. Token saved to {}", username, path.display());
            if std::env::var_os("BRAINBOX_BACKEND__TOKEN").is_some() {
                tracing::warn!("BRAINBOX_BACKEND__TOKEN is set and overrides the saved token");
            }
        }
        None => {
            println!("{}", token.access_token);
            eprintln!("Use it as backend.token or BRAINBOX_BACKEND__TOKEN.");
        }
    }
    Ok(())
}

async fn handle_signup(
    config: &ClientConfig,
    username: &str,
    password: Option<String>,
) -> anyhow::Result<()> {
    let password = read_password(password, true)?;
    let client = BackendClient::new(&config.backend)?;
    let ack = client
        .signup(&Credentials::new(username, password))
        .await
        .map_err(friendly_api_error)?;
    println!("{} Log in with `brainbox login {}`.", ack.message, username);
    Ok(())
}

async fn handle_problem(config: &ClientConfig, input: &str, summary: bool) -> anyhow::Result<()> {
    let slug = parse_slug(input)?;
    let client = BackendClient::new(&config.backend)?;

    if summary {
        let summary = client
            .fetch_problem_summary(&slug)
            .await
            .map_err(friendly_api_error)?;
        println!("\x1b[1m{}\x1b[0m\n", title_from_slug(&slug));
        println!("{}", summary.description);
        for example in &summary.examples {
            println!("\n\x1b[36mExample\x1b[0m {}", example);
        }
        return Ok(());
    }

    let problem = client
        .fetch_problem(&slug)
        .await
        .map_err(friendly_api_error)?;
    println!(
        "\x1b[1m{}\x1b[0m  [{}] {}",
        problem.title, problem.difficulty, problem.platform
    );
    if !problem.tags.is_empty() {
        println!("\x1b[90mTags: {}\x1b[0m", problem.tags.join(", "));
    }
    println!("\n{}", problem.description);
    Ok(())
}

async fn handle_history(
    config: &ClientConfig,
    session: &Session,
    conversation_id: &str,
) -> anyhow::Result<()> {
    let client = BackendClient::new(&config.backend)?;
    let entries = client
        .fetch_history(conversation_id, session)
        .await
        .map_err(friendly_api_error)?;

    if entries.is_empty() {
        println!("No messages in conversation {}.", conversation_id);
        return Ok(());
    }
    for entry in entries {
        println!("\x1b[34myou>\x1b[0m {}", entry.question);
        println!("\x1b[32mBrainBox:\x1b[0m {}\n", entry.response);
    }
    Ok(())
}

async fn handle_conversations(
    config: &ClientConfig,
    session: &Session,
    action: ConversationAction,
) -> anyhow::Result<()> {
    if !session.is_authenticated() {
        tracing::warn!("No backend token configured; run `brainbox login` first");
    }
    let client = BackendClient::new(&config.backend)?;

    match action {
        ConversationAction::List => {
            let conversations = client
                .list_conversations(session)
                .await
                .map_err(friendly_api_error)?;
            if conversations.is_empty() {
                println!("No conversations yet.");
            }
            for convo in &conversations {
                println!("{}", conversation_line(convo));
            }
        }
        ConversationAction::Rename {
            conversation,
            title,
        } => {
            let ack = client
                .rename_conversation(&conversation, &title, session)
                .await
                .map_err(friendly_api_error)?;
            let title = ack.title.unwrap_or(title);
            println!("Renamed {} to \"{}\"", conversation, title.trim());
        }
        ConversationAction::Delete { conversation, yes } => {
            let confirmed = yes
                || dialoguer::Confirm::new()
                    .with_prompt(format!("Delete conversation {}?", conversation))
                    .default(false)
                    .interact()?;
            if !confirmed {
                println!("Kept {}.", conversation);
                return Ok(());
            }
            let ack = client
                .delete_conversation(&conversation, session)
                .await
                .map_err(friendly_api_error)?;
            println!("{}", ack.message);
        }
    }
    Ok(())
}

fn conversation_line(convo: &ConversationSummary) -> String {
    let title = match (&convo.problem_slug, convo.title.trim()) {
        (Some(slug), "") => title_from_slug(slug),
        (_, title) => title.to_string(),
    };
    let when = convo.timestamp.as_deref().unwrap_or("-");
    format!(
        "{}  {}  \x1b[90m{}\x1b[0m  {}",
        convo.conversation_id,
        title,
        when,
        preview(&convo.last_message, 60)
    )
}

/// First `max` characters of `text` on one line.
fn preview(text: &str, max: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max {
        return flat;
    }
    let cut: String = flat.chars().take(max).collect();
    format!("{}...", cut.trim_end())
}

fn friendly_api_error(err: ApiError) -> anyhow::Error {
    let hint = match &err {
        ApiError::Unauthorized { .. } => {
            Some("run `brainbox login <username>` or set backend.token")
        }
        ApiError::RateLimited { .. } => Some("wait a moment and try again"),
        ApiError::Request { .. } => Some("is the backend running?"),
        _ => None,
    };
    match hint {
        Some(hint) => anyhow::anyhow!("{} ({})", err, hint),
        None => anyhow::Error::new(err),
    }
}

fn handle_config(action: ConfigAction, config: &ClientConfig) -> anyhow::Result<()> {
    match action {
        ConfigAction::Show => {
            let mut shown = config.clone();
            if shown.backend.token.is_some() {
                shown.backend.token = Some("********".to_string());
            }
            println!("{}", shown.to_toml()?);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_session_uses_configured_identity() {
        let mut config = ClientConfig::default();
        config.session.user_id = Some("ada".into());
        config.backend.token = Some("secret".into());

        let session = session_for(&config);
        assert_eq!(session.user_id, "ada");
        assert_eq!(session.token.as_deref(), Some("secret"));
    }

    #[test]
    fn test_session_without_identity_is_generated() {
        let session = session_for(&ClientConfig::default());
        assert!(!session.user_id.is_empty());
        assert!(!session.is_authenticated());
    }

    #[test]
    fn test_parse_slug_accepts_urls() {
        assert_eq!(
            parse_slug("https://leetcode.com/problems/two-sum/").unwrap(),
            "two-sum"
        );
        assert!(parse_slug("   ").is_err());
    }

    #[test]
    fn test_conversation_line_falls_back_to_slug_title() {
        let convo = ConversationSummary {
            conversation_id: "c1".into(),
            title: String::new(),
            last_message: "Try\na hash map".into(),
            timestamp: None,
            problem_slug: Some("two-sum".into()),
        };
        let line = conversation_line(&convo);
        assert!(line.contains("Two Sum"));
        assert!(line.contains("Try a hash map"));
    }

    #[test]
    fn test_preview_truncates_on_chars() {
        assert_eq!(preview("short", 10), "short");
        assert_eq!(preview("ééééé", 3), "ééé...");
    }

    #[test]
    fn test_failed_turn_is_marked_as_reported() {
        let err = finish_turn(Err(StreamError::transport("connection reset"))).unwrap_err();
        assert!(err.is::<Reported>());

        assert!(finish_turn(Ok(None)).unwrap().is_none());
    }

    #[test]
    fn test_given_password_skips_prompt() {
        assert_eq!(
            read_password(Some("lovelace".into()), true).unwrap(),
            "lovelace"
        );
    }

    #[test]
    fn test_unauthorized_error_suggests_token() {
        let err = friendly_api_error(ApiError::Unauthorized {
            endpoint: "/conversations".into(),
        });
        assert!(err.to_string().contains("backend.token"));
        assert!(err.to_string().contains("brainbox login"));
    }
}
