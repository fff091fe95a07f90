//! Terminal chat client built on the synchronization engine.
//!
//! Connects with a session token, follows one conversation and sends each
//! line typed at the prompt. Reconnects with exponential backoff and
//! re-authenticates on every reconnect.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin chatsync-client -- --token $TOKEN --user-id alice --conversation c1
//! ```

use clap::Parser;

use chatsync_client::{
    ConnectionConfig, StoreConfig,
    domain::{ConversationId, UserId},
    ui::{ClientOptions, run_client},
};
use chatsync_shared::logger::setup_logger;

#[derive(Parser, Debug)]
#[command(name = "chatsync-client")]
#[command(about = "Terminal client for the real-time messaging server", long_about = None)]
struct Args {
    /// WebSocket server URL
    #[arg(short = 'u', long, default_value = "ws://127.0.0.1:3000/ws")]
    url: String,

    /// Bearer token sent in the authentication handshake
    #[arg(short = 't', long, env = "CHATSYNC_TOKEN")]
    token: String,

    /// Id of the signed-in user
    #[arg(long)]
    user_id: String,

    /// Conversation to open on start
    #[arg(short = 'c', long)]
    conversation: Option<String>,

    /// Reconnection attempts before giving up
    #[arg(long, default_value_t = 5)]
    max_reconnect_attempts: u32,
}

#[tokio::main]
async fn main() {
    setup_logger(env!("CARGO_BIN_NAME"), "info");

    let args = Args::parse();

    let user_id = match UserId::new(args.user_id) {
        Ok(user_id) => user_id,
        Err(e) => {
            tracing::error!("Invalid --user-id: {}", e);
            std::process::exit(2);
        }
    };
    let conversation = match args.conversation.map(ConversationId::new).transpose() {
        Ok(conversation) => conversation,
        Err(e) => {
            tracing::error!("Invalid --conversation: {}", e);
            std::process::exit(2);
        }
    };

    let options = ClientOptions {
        url: args.url,
        token: args.token,
        user_id,
        conversation,
        connection: ConnectionConfig::default()
            .with_max_reconnect_attempts(args.max_reconnect_attempts),
        store: StoreConfig::default(),
    };

    if let Err(e) = run_client(options).await {
        tracing::error!("Client error: {}", e);
        std::process::exit(1);
    }
}
