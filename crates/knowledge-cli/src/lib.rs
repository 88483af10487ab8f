//! Command surface for the knowledge base.
//!
//! Hosts can embed it through:
//! - [`run_cli`] for full parsed CLI execution.
//! - [`run_with_db`] for a single [`Command`] against a DB path.
//! - [`run_command`] for execution against an existing [`SqliteKnowledgeStore`].

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use knowledge_core::{
    KnowledgeRepository, Question, QuestionId, QuestionInput, QuestionStatus, Response,
    ResponseId, ResponseInput, ResponseStatus, UserId, UserInput, Viewer,
};
use knowledge_store_sqlite::SqliteKnowledgeStore;
use serde::Serialize;

#[derive(Debug, Parser)]
#[command(name = "kb")]
#[command(about = "Question and answer knowledge base")]
pub struct Cli {
    #[arg(long, env = "KB_DB", default_value = "./knowledge.sqlite3")]
    db: PathBuf,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

impl Cli {
    #[must_use]
    pub fn verbosity(&self) -> u8 {
        self.verbose
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    User {
        #[command(subcommand)]
        command: Box<UserCommand>,
    },
    Question {
        #[command(subcommand)]
        command: Box<QuestionCommand>,
    },
    Response {
        #[command(subcommand)]
        command: Box<ResponseCommand>,
    },
}

#[derive(Debug, Subcommand)]
pub enum UserCommand {
    Add(UserAddArgs),
}

#[derive(Debug, Args)]
pub struct UserAddArgs {
    #[arg(long)]
    username: String,
    #[arg(long)]
    email: String,
    #[arg(long, default_value = "")]
    first_name: String,
    #[arg(long, default_value = "")]
    last_name: String,
    #[arg(long)]
    staff: bool,
    #[arg(long)]
    superuser: bool,
}

#[derive(Debug, Subcommand)]
pub enum QuestionCommand {
    Ask(QuestionAskArgs),
    Show(QuestionShowArgs),
    List(ViewerArgs),
    Status(QuestionStatusArgs),
    Accept(QuestionAcceptArgs),
}

#[derive(Debug, Args)]
pub struct AuthorArgs {
    #[arg(long, conflicts_with_all = ["name", "email"])]
    user_id: Option<i64>,
    #[arg(long, requires = "email")]
    name: Option<String>,
    #[arg(long, requires = "name")]
    email: Option<String>,
}

#[derive(Debug, Args)]
pub struct ViewerArgs {
    /// View as this user; omitted means anonymous.
    #[arg(long)]
    as_user: Option<i64>,
}

#[derive(Debug, Args)]
pub struct QuestionAskArgs {
    #[arg(long)]
    title: String,
    #[arg(long)]
    body: String,
    #[command(flatten)]
    author: AuthorArgs,
    #[arg(long)]
    status: Option<QuestionStatusArg>,
}

#[derive(Debug, Args)]
pub struct QuestionShowArgs {
    #[arg(long)]
    id: i64,
    #[command(flatten)]
    viewer: ViewerArgs,
}

#[derive(Debug, Args)]
pub struct QuestionStatusArgs {
    #[arg(long)]
    id: i64,
    #[arg(long)]
    to: QuestionStatusArg,
}

#[derive(Debug, Args)]
pub struct QuestionAcceptArgs {
    #[arg(long)]
    id: i64,
    /// Response to accept; omitted clears the accepted response.
    #[arg(long)]
    response_id: Option<i64>,
}

#[derive(Debug, Subcommand)]
pub enum ResponseCommand {
    Add(ResponseAddArgs),
    Status(ResponseStatusArgs),
    List(ResponseListArgs),
}

#[derive(Debug, Args)]
pub struct ResponseAddArgs {
    #[arg(long)]
    question_id: i64,
    #[arg(long)]
    body: String,
    #[command(flatten)]
    author: AuthorArgs,
    #[arg(long)]
    status: Option<ResponseStatusArg>,
}

#[derive(Debug, Args)]
pub struct ResponseStatusArgs {
    #[arg(long)]
    id: i64,
    #[arg(long)]
    to: ResponseStatusArg,
}

#[derive(Debug, Args)]
pub struct ResponseListArgs {
    #[arg(long)]
    question_id: i64,
    #[command(flatten)]
    viewer: ViewerArgs,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum QuestionStatusArg {
    Public,
    Private,
    Internal,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ResponseStatusArg {
    Public,
    Private,
    Internal,
    Inherit,
}

#[derive(Debug, Serialize)]
struct QuestionView {
    #[serde(flatten)]
    question: Question,
    answered: bool,
    accepted: bool,
    url: String,
    author_name: String,
    author_email: String,
}

#[derive(Debug, Serialize)]
struct ResponseView {
    #[serde(flatten)]
    response: Response,
    accepted: bool,
    author_name: String,
    author_email: String,
}

/// Executes the parsed top-level CLI command graph.
///
/// # Errors
/// Returns an error when store open/migrate fails or the command fails.
pub fn run_cli(cli: Cli) -> Result<()> {
    run_with_db(&cli.db, cli.command)
}

/// Executes a parsed command using the provided `SQLite` DB path.
///
/// # Errors
/// Returns an error when store open/migrate fails or the requested command fails.
pub fn run_with_db(db_path: &Path, command: Command) -> Result<()> {
    let mut store = SqliteKnowledgeStore::open(db_path)?;
    store.migrate()?;
    run_command(command, &mut store)
}

/// Executes a parsed command against an existing store handle.
///
/// # Errors
/// Returns an error when validation, lookup, visibility or persistence fails.
pub fn run_command(command: Command, store: &mut SqliteKnowledgeStore) -> Result<()> {
    match command {
        Command::User { command } => run_user(*command, store),
        Command::Question { command } => run_question(*command, store),
        Command::Response { command } => run_response(*command, store),
    }
}

fn run_user(command: UserCommand, store: &mut SqliteKnowledgeStore) -> Result<()> {
    match command {
        UserCommand::Add(args) => {
            let user = store.create_user(&UserInput {
                username: args.username,
                first_name: args.first_name,
                last_name: args.last_name,
                email: args.email,
                is_staff: args.staff,
                is_superuser: args.superuser,
            })?;
            print_json(&user)
        }
    }
}

fn run_question(command: QuestionCommand, store: &mut SqliteKnowledgeStore) -> Result<()> {
    match command {
        QuestionCommand::Ask(args) => {
            let question = store.create_question(QuestionInput {
                user: args.author.user_id.map(UserId),
                name: args.author.name,
                email: args.author.email,
                title: args.title,
                body: args.body,
                status: args.status.map(map_question_status),
            })?;
            print_json(&question_view(store, question)?)
        }
        QuestionCommand::Show(args) => {
            let viewer = resolve_viewer(store, &args.viewer)?;
            let question = visible_question(store, QuestionId(args.id), viewer)?;
            print_json(&question_view(store, question)?)
        }
        QuestionCommand::List(args) => {
            let reader: &SqliteKnowledgeStore = store;
            let viewer = resolve_viewer(reader, &args)?;
            let views = reader
                .visible_questions(viewer)?
                .into_iter()
                .map(|question| question_view(reader, question))
                .collect::<Result<Vec<_>>>()?;
            print_json(&views)
        }
        QuestionCommand::Status(args) => {
            let question =
                store.set_question_status(QuestionId(args.id), map_question_status(args.to))?;
            print_json(&question_view(store, question)?)
        }
        QuestionCommand::Accept(args) => {
            let question =
                store.accept_response(QuestionId(args.id), args.response_id.map(ResponseId))?;
            print_json(&question_view(store, question)?)
        }
    }
}

fn run_response(command: ResponseCommand, store: &mut SqliteKnowledgeStore) -> Result<()> {
    match command {
        ResponseCommand::Add(args) => {
            let response = store.create_response(ResponseInput {
                question: QuestionId(args.question_id),
                user: args.author.user_id.map(UserId),
                name: args.author.name,
                email: args.author.email,
                body: args.body,
                status: args.status.map(map_response_status),
            })?;
            print_json(&response_view(store, response)?)
        }
        ResponseCommand::Status(args) => {
            let response =
                store.set_response_status(ResponseId(args.id), map_response_status(args.to))?;
            print_json(&response_view(store, response)?)
        }
        ResponseCommand::List(args) => {
            let reader: &SqliteKnowledgeStore = store;
            let viewer = resolve_viewer(reader, &args.viewer)?;
            let question = visible_question(reader, QuestionId(args.question_id), viewer)?;
            let views = reader
                .visible_responses(&question, viewer)?
                .into_iter()
                .map(|response| response_view(reader, response))
                .collect::<Result<Vec<_>>>()?;
            print_json(&views)
        }
    }
}

fn resolve_viewer(store: &SqliteKnowledgeStore, args: &ViewerArgs) -> Result<Viewer> {
    let viewer = store.viewer_for(args.as_user.map(UserId))?;
    tracing::debug!(?viewer, "resolved viewer");
    Ok(viewer)
}

/// Hidden and missing questions are reported the same way.
fn visible_question(
    store: &SqliteKnowledgeStore,
    id: QuestionId,
    viewer: Viewer,
) -> Result<Question> {
    match store.question(id)? {
        Some(question) if question.can_view(viewer) => Ok(question),
        Some(_) => {
            tracing::info!(question = %id, ?viewer, "question hidden from viewer");
            Err(anyhow!("question {id} not found"))
        }
        None => Err(anyhow!("question {id} not found")),
    }
}

fn question_view(store: &SqliteKnowledgeStore, question: Question) -> Result<QuestionView> {
    Ok(QuestionView {
        answered: question.answered(store)?,
        accepted: question.accepted(),
        url: question.get_absolute_url(),
        author_name: store.name_of(&question)?,
        author_email: store.email_of(&question)?,
        question,
    })
}

fn response_view(store: &SqliteKnowledgeStore, response: Response) -> Result<ResponseView> {
    let accepted = match store.question(response.question)? {
        Some(question) => response.is_accepted(&question),
        None => false,
    };
    Ok(ResponseView {
        accepted,
        author_name: store.name_of(&response)?,
        author_email: store.email_of(&response)?,
        response,
    })
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn map_question_status(value: QuestionStatusArg) -> QuestionStatus {
    match value {
        QuestionStatusArg::Public => QuestionStatus::Public,
        QuestionStatusArg::Private => QuestionStatus::Private,
        QuestionStatusArg::Internal => QuestionStatus::Internal,
    }
}

fn map_response_status(value: ResponseStatusArg) -> ResponseStatus {
    match value {
        ResponseStatusArg::Public => ResponseStatus::Public,
        ResponseStatusArg::Private => ResponseStatus::Private,
        ResponseStatusArg::Internal => ResponseStatus::Internal,
        ResponseStatusArg::Inherit => ResponseStatus::Inherit,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn must<T>(result: Result<T>) -> T {
        match result {
            Ok(value) => value,
            Err(err) => panic!("unexpected error: {err:#}"),
        }
    }

    fn parse(args: &[&str]) -> Result<Cli> {
        let mut argv = vec!["kb", "--db", ":memory:"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).map_err(|err| anyhow!(err.to_string()))
    }

    fn fixture_store() -> SqliteKnowledgeStore {
        let store = must(SqliteKnowledgeStore::open(Path::new(":memory:")));
        must(store.migrate());
        store
    }

    fn execute(store: &mut SqliteKnowledgeStore, args: &[&str]) -> Result<()> {
        let cli = parse(args)?;
        run_command(cli.command, store)
    }

    #[test]
    fn question_status_rejects_inherit() {
        assert!(parse(&["question", "status", "--id", "1", "--to", "inherit"]).is_err());
        assert!(parse(&["response", "status", "--id", "1", "--to", "inherit"]).is_ok());
    }

    #[test]
    fn author_flags_are_exclusive() {
        assert!(parse(&[
            "question", "ask", "--title", "t", "--body", "b", "--user-id", "1", "--name", "Joe",
            "--email", "joe@example.com",
        ])
        .is_err());
        assert!(parse(&["question", "ask", "--title", "t", "--body", "b", "--name", "Joe"]).is_err());
    }

    #[test]
    fn verbosity_counts_flags() {
        let cli = must(parse(&["-vv", "question", "list"]));
        assert_eq!(cli.verbosity(), 2);
    }

    #[test]
    fn hidden_question_reports_not_found() {
        let mut store = fixture_store();
        must(execute(
            &mut store,
            &[
                "user", "add", "--username", "joe", "--email", "joedirt@example.com",
                "--first-name", "Joe", "--last-name", "Dirt",
            ],
        ));
        must(execute(
            &mut store,
            &[
                "question", "ask", "--title", "What time is it?", "--body", "Watch trouble.",
                "--user-id", "1",
            ],
        ));

        must(execute(&mut store, &["question", "show", "--id", "1", "--as-user", "1"]));
        let err = match execute(&mut store, &["question", "show", "--id", "1"]) {
            Ok(()) => panic!("anonymous viewer must not see a private question"),
            Err(err) => err,
        };
        assert_eq!(err.to_string(), "question 1 not found");

        must(execute(&mut store, &["question", "status", "--id", "1", "--to", "public"]));
        must(execute(&mut store, &["question", "show", "--id", "1"]));
    }

    #[test]
    fn accept_flow_updates_view() {
        let mut store = fixture_store();
        must(execute(
            &mut store,
            &[
                "question", "ask", "--title", "Where is my cat?", "--body", "Whiskers.",
                "--name", "Joe Dirt", "--email", "joedirt@example.com",
            ],
        ));
        must(execute(
            &mut store,
            &[
                "response", "add", "--question-id", "1", "--body", "Under the bed.", "--name",
                "Bob", "--email", "bob@example.com",
            ],
        ));
        must(execute(&mut store, &["question", "accept", "--id", "1", "--response-id", "1"]));

        let question = match must(store.question(QuestionId(1))) {
            Some(question) => question,
            None => panic!("question 1 should exist"),
        };
        let view = must(question_view(&store, question));
        assert!(view.answered);
        assert!(view.accepted);
        assert_eq!(view.url, "/knowledge/questions/1/where-is-my-cat/");
        assert_eq!(view.author_name, "Joe Dirt");
        assert_eq!(view.author_email, "joedirt@example.com");

        must(execute(&mut store, &["question", "accept", "--id", "1"]));
        let question = match must(store.question(QuestionId(1))) {
            Some(question) => question,
            None => panic!("question 1 should exist"),
        };
        assert!(!question.accepted());
    }
}
