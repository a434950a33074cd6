use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use noteboard::config::{ConfigError, FirebaseConfig};
use noteboard::db::DbError;
use noteboard::db::auth::{AuthClient, AuthError, AuthSession};
use noteboard::db::rtdb::RtdbClient;
use noteboard::routes::{HOME_PATH, Navigator, Route, Router};
use noteboard::services::boards::{BoardSync, SyncError, init_shared, teardown_shared};
use noteboard::types::Board;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("config: {0}")]
    Config(#[from] ConfigError),
    #[error("auth: {0}")]
    Auth(#[from] AuthError),
    #[error("database: {0}")]
    Db(#[from] DbError),
    #[error("{0}")]
    Sync(#[from] SyncError),
    #[error("board not found: {0}")]
    BoardNotFound(String),
    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Parser, Debug)]
#[command(name = "noteboard", about = "List, watch, and edit live-synced note boards")]
struct Cli {
    #[arg(long, env = "NOTEBOARD_EMAIL")]
    email: String,

    #[arg(long, env = "NOTEBOARD_PASSWORD", hide_env_values = true)]
    password: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print boards newest first once the first sync completes.
    List,
    /// Print the board list on every remote change until interrupted.
    Watch,
    /// Print one board as JSON.
    Show { board_id: String },
    /// Create a board from the onboarding template.
    Create,
    /// Rename a board.
    Rename {
        board_id: String,
        #[arg(long)]
        name: String,
    },
    /// Delete a board.
    Delete { board_id: String },
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let cli = Cli::parse();
    let config = FirebaseConfig::from_env()?;

    let auth = AuthSession::new();
    let router = Arc::new(Router::new(auth.clone()));
    let db = Arc::new(RtdbClient::new(&config, auth.clone())?);
    let sync = init_shared(db, auth.clone(), router.clone());

    let client = AuthClient::new(&config)?;
    auth.sign_in(&client, &cli.email, &cli.password).await?;
    router.push(HOME_PATH).await;
    tracing::info!(location = %router.current(), "ready");

    let result = run(cli.command, &sync, &router).await;

    auth.sign_out(router.as_ref()).await;
    teardown_shared();
    result
}

async fn run(command: Command, sync: &BoardSync, router: &Router) -> Result<(), CliError> {
    match command {
        Command::List => {
            sync.synced().await?;
            print_boards(&sync.boards());
        }
        Command::Watch => {
            let mut rx = sync.subscribe();
            loop {
                tokio::select! {
                    changed = rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let boards = rx.borrow_and_update().boards.to_vec();
                        print_boards(&boards);
                    }
                    signal = tokio::signal::ctrl_c() => {
                        signal?;
                        break;
                    }
                }
            }
        }
        Command::Show { board_id } => {
            let board = open_board(sync, router, &board_id).await?;
            println!("{}", serde_json::to_string_pretty(&board)?);
        }
        Command::Create => {
            let id = sync.create_board().await?;
            println!("{id}");
        }
        Command::Rename { board_id, name } => {
            let mut record = open_board(sync, router, &board_id).await?.record();
            record.meta.name = name;
            sync.update_board(&board_id, &record).await?;
        }
        Command::Delete { board_id } => {
            sync.delete_board(&board_id).await?;
        }
    }
    Ok(())
}

/// Open `board_id` the way the editor view does and fail if the board view
/// gets sent to the not-found route.
async fn open_board(sync: &BoardSync, router: &Router, board_id: &str) -> Result<Board, CliError> {
    router.push(&Route::Board(board_id.to_string()).path()).await;
    sync.synced().await?;

    let handle = sync.use_board(board_id);
    let missing = sync.subscribe().borrow().is_missing(board_id);
    if missing {
        let mut location = router.subscribe();
        let _ = tokio::time::timeout(
            Duration::from_secs(1),
            location.wait_for(|l| l.route() == Some(Route::NotFound)),
        )
        .await;
        return Err(CliError::BoardNotFound(board_id.to_string()));
    }
    Ok(handle.get())
}

fn print_boards(boards: &[Board]) {
    if boards.is_empty() {
        println!("(no boards)");
        return;
    }
    for board in boards {
        println!("{:<34} {:>15.0} {} {}", board.key, board.meta.stamp, board.meta.cover, board.meta.name);
    }
}
