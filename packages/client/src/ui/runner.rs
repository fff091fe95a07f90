//! Terminal client: follows one conversation and sends typed lines.

use std::{collections::HashSet, sync::Arc};

use rustyline::{DefaultEditor, error::ReadlineError};
use tokio::sync::{mpsc, oneshot};

use super::{MessageFormatter, redisplay_prompt};
use crate::{
    connection::{ConnectionConfig, ConnectionManager, ConnectionState},
    domain::{ConversationId, MessageId, MessageType, UserId},
    error::{ClientError, SyncError},
    session::{SessionBinding, SessionState},
    store::{StoreConfig, StoreSnapshot, SyncStore},
};

/// Everything the terminal client needs to start.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub url: String,
    pub token: String,
    pub user_id: UserId,
    pub conversation: Option<ConversationId>,
    pub connection: ConnectionConfig,
    pub store: StoreConfig,
}

#[derive(Debug, PartialEq, Eq)]
enum Command {
    List,
    Open(String),
    Quit,
    Send(String),
}

impl Command {
    fn parse(line: &str) -> Self {
        match line {
            "/list" => Command::List,
            "/quit" => Command::Quit,
            _ => match line.strip_prefix("/open ") {
                Some(id) => Command::Open(id.trim().to_string()),
                None => Command::Send(line.to_string()),
            },
        }
    }
}

#[derive(Debug, Default)]
struct Rendered {
    output: String,
    /// A message from someone else was printed
    has_incoming: bool,
}

/// Turns successive snapshots into incremental terminal output.
struct Printer {
    user_id: UserId,
    active: Option<ConversationId>,
    printed: HashSet<MessageId>,
    typing: Vec<UserId>,
    connection_state: Option<ConnectionState>,
    error: Option<SyncError>,
}

impl Printer {
    fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            active: None,
            printed: HashSet::new(),
            typing: Vec::new(),
            connection_state: None,
            error: None,
        }
    }

    fn render(&mut self, snapshot: &StoreSnapshot) -> Rendered {
        let mut rendered = Rendered::default();

        if self.connection_state != Some(snapshot.connection_state) {
            self.connection_state = Some(snapshot.connection_state);
            rendered
                .output
                .push_str(&MessageFormatter::format_connection_state(snapshot.connection_state));
        }

        if self.active != snapshot.active_conversation {
            self.active = snapshot.active_conversation.clone();
            self.printed.clear();
            self.typing.clear();
        }

        for message in &snapshot.messages {
            if self.printed.insert(message.id.clone()) {
                rendered
                    .output
                    .push_str(&MessageFormatter::format_message(message, &self.user_id));
                rendered.has_incoming |= message.sender_id != self.user_id;
            }
        }

        if let Some(active) = &self.active {
            let typing: Vec<UserId> = snapshot
                .typing_users(active)
                .into_iter()
                .filter(|user| user != &self.user_id)
                .collect();
            if typing != self.typing {
                if let Some(notice) = MessageFormatter::format_typing(&typing) {
                    rendered.output.push_str(&notice);
                }
                self.typing = typing;
            }
        }

        if self.error != snapshot.error {
            if let Some(error) = &snapshot.error {
                rendered.output.push_str(&MessageFormatter::format_error(error));
            }
            self.error = snapshot.error.clone();
        }

        rendered
    }
}

type PromptHandles = (
    mpsc::UnboundedReceiver<String>,
    oneshot::Receiver<Result<(), String>>,
);

fn spawn_prompt(prompt: String) -> PromptHandles {
    let (input_tx, input_rx) = mpsc::unbounded_channel::<String>();
    let (ready_tx, ready_rx) = oneshot::channel();

    // rustyline is synchronous, so it gets its own thread.
    std::thread::spawn(move || {
        let mut rl = match DefaultEditor::new() {
            Ok(rl) => {
                ready_tx.send(Ok(())).ok();
                rl
            }
            Err(e) => {
                ready_tx.send(Err(e.to_string())).ok();
                return;
            }
        };

        loop {
            match rl.readline(&prompt) {
                Ok(line) => {
                    let line = line.trim();
                    if !line.is_empty() {
                        rl.add_history_entry(line).ok();
                        if input_tx.send(line.to_string()).is_err() {
                            break;
                        }
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    tracing::info!("Interrupted");
                    break;
                }
                Err(ReadlineError::Eof) => {
                    tracing::info!("EOF");
                    break;
                }
                Err(err) => {
                    tracing::error!("Readline error: {}", err);
                    break;
                }
            }
        }
    });

    (input_rx, ready_rx)
}

/// Run the terminal client until the user quits.
pub async fn run_client(options: ClientOptions) -> Result<(), ClientError> {
    let connection = ConnectionManager::websocket(options.connection);
    let store = Arc::new(SyncStore::new(connection.clone(), options.store));
    let binding = SessionBinding::new(connection, options.url.clone());
    let prompt = format!("{}> ", options.user_id);

    if let Some(conversation) = options.conversation.clone()
        && store.set_active_conversation(Some(conversation)).is_err()
    {
        // History loads once authenticated.
        store.clear_error();
    }

    let (mut input_rx, ready_rx) = spawn_prompt(prompt.clone());
    match ready_rx.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => return Err(ClientError::Terminal(e)),
        Err(_) => return Err(ClientError::Terminal("prompt thread exited".to_string())),
    }

    let mut updates = store.subscribe();
    let mut printer = Printer::new(options.user_id.clone());
    let printer_store = store.clone();
    let printer_prompt = prompt.clone();
    let print_task = tokio::spawn(async move {
        while updates.changed().await.is_ok() {
            let snapshot = updates.borrow_and_update().clone();
            let rendered = printer.render(&snapshot);
            if !rendered.output.is_empty() {
                print!("{}", rendered.output);
                redisplay_prompt(&printer_prompt);
            }
            if rendered.has_incoming
                && let Some(active) = &snapshot.active_conversation
                && let Err(e) = printer_store.mark_messages_as_read(active)
            {
                tracing::debug!("Could not mark {} read: {}", active, e);
            }
        }
    });

    let session = SessionState::signed_in(options.user_id.clone(), options.token);
    if let Err(e) = binding.update(&session).await {
        tracing::warn!("Initial connect to {} failed: {}", options.url, e);
    }
    println!(
        "\nYou are '{}'. Type messages and press Enter to send. /list, /open <id>, /quit.\n",
        options.user_id
    );

    while let Some(line) = input_rx.recv().await {
        match Command::parse(&line) {
            Command::Quit => break,
            Command::List => {
                let snapshot = store.snapshot();
                print!(
                    "{}",
                    MessageFormatter::format_conversation_list(
                        &snapshot.conversations,
                        snapshot.active_conversation.as_ref()
                    )
                );
            }
            Command::Open(id) => match ConversationId::new(id) {
                Ok(id) => {
                    if let Err(e) = store.set_active_conversation(Some(id)) {
                        tracing::warn!("Failed to open conversation: {}", e);
                    }
                }
                Err(e) => println!("{}", e),
            },
            Command::Send(text) => {
                let Some(active) = store.active_conversation() else {
                    println!("No conversation selected. Use /open <id>.");
                    continue;
                };
                match store.send_message(&active, text, MessageType::Text) {
                    Ok(correlation) => {
                        print!("{}", MessageFormatter::format_sent_confirmation(&correlation))
                    }
                    Err(e) => println!("Failed to send: {}", e),
                }
            }
        }
    }

    binding.update(&SessionState::signed_out()).await.ok();
    print_task.abort();
    store.teardown();
    Ok(())
}
