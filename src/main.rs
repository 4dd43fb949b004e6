//! # ohero-chat
//!
//! Terminal client for the OHERO chat gateway. Loads configuration, connects,
//! prints incoming messages and notices to stdout and sends every input line
//! to the active channel. Logs go to stderr.
//!
//! ## Commands
//!
//! ```text
//! /channels                 list channels with unread counts
//! /join <channel-id>        switch the active channel
//! /threads                  list threads in the active channel
//! /reply <thread-id> <text> reply in a thread
//! /refresh                  request the channel directory
//! /connect, /disconnect     manage the connection
//! /quit                     exit
//! ```

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use ohero_chat::config::{self, Cli};
use ohero_chat::conversation::Message;
use ohero_chat::event::SessionEvent;
use ohero_chat::{SessionUpdate, WsSession};

/// One line of user input.
#[derive(Debug, PartialEq, Eq)]
enum Command {
    Send(String),
    Channels,
    Join(String),
    Threads,
    Reply { thread_id: String, text: String },
    Refresh,
    Connect,
    Disconnect,
    Help,
    Quit,
    Invalid(String),
}

fn parse_command(line: &str) -> Option<Command> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Some(Command::Send(line.to_string()));
    };

    let (name, args) = rest.split_once(' ').unwrap_or((rest, ""));
    let args = args.trim();
    let cmd = match name {
        "channels" => Command::Channels,
        "threads" => Command::Threads,
        "refresh" => Command::Refresh,
        "connect" => Command::Connect,
        "disconnect" => Command::Disconnect,
        "help" => Command::Help,
        "quit" | "exit" => Command::Quit,
        "join" if !args.is_empty() => Command::Join(args.to_string()),
        "join" => Command::Invalid("usage: /join <channel-id>".to_string()),
        "reply" => match args.split_once(' ') {
            Some((thread_id, text)) if !text.trim().is_empty() => Command::Reply {
                thread_id: thread_id.to_string(),
                text: text.trim().to_string(),
            },
            _ => Command::Invalid("usage: /reply <thread-id> <text>".to_string()),
        },
        other => Command::Invalid(format!("unknown command: /{other} (try /help)")),
    };
    Some(cmd)
}

enum Input {
    Event(Option<SessionEvent>),
    Line(Option<String>),
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    let config = match config::load_config(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("ohero-chat: configuration error: {e}");
            std::process::exit(1);
        }
    };

    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| config.logging.level.clone());
    tracing_subscriber::fmt()
        .with_env_filter(log_filter)
        .with_writer(std::io::stderr)
        .init();

    info!("ohero-chat v{} starting", env!("CARGO_PKG_VERSION"));
    info!(
        "Gateway: {}",
        config::mask_credential(&config.websocket_url, &config.api_key)
    );

    let (mut session, mut updates) = WsSession::websocket(&config);
    let mut pending_channel = cli.channel.clone();

    if let Err(e) = session.connect() {
        eprintln!("ohero-chat: {e}");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        while let Ok(update) = updates.try_recv() {
            render_update(&session, &update);
            if matches!(update, SessionUpdate::ChannelsUpdated) {
                if let Some(id) = pending_channel.take() {
                    if session.switch_active_channel(&id).is_err() {
                        pending_channel = Some(id);
                    }
                }
            }
        }

        let input = tokio::select! {
            event = session.recv_event() => Input::Event(event),
            line = lines.next_line() => Input::Line(line.ok().flatten()),
        };

        match input {
            Input::Event(Some(event)) => session.handle_event(event),
            Input::Event(None) => break,
            Input::Line(None) => break,
            Input::Line(Some(line)) => match parse_command(&line) {
                None => {}
                Some(Command::Quit) => break,
                Some(cmd) => run_command(&mut session, cmd),
            },
        }
    }

    session.disconnect();
    while let Ok(update) = updates.try_recv() {
        render_update(&session, &update);
    }
}

fn run_command(session: &mut WsSession, cmd: Command) {
    let result = match cmd {
        Command::Send(text) => session.send_message(&text, None).map(|_| ()),
        Command::Reply { thread_id, text } => {
            session.send_message(&text, Some(&thread_id)).map(|_| ())
        }
        Command::Join(id) => session.switch_active_channel(&id).map(|_| ()),
        Command::Refresh => session.request_channel_directory(),
        Command::Connect => session.connect(),
        Command::Disconnect => {
            session.disconnect();
            Ok(())
        }
        Command::Channels => {
            print_channels(session);
            Ok(())
        }
        Command::Threads => {
            print_threads(session);
            Ok(())
        }
        Command::Help => {
            println!("commands: /channels /join /threads /reply /refresh /connect /disconnect /quit");
            Ok(())
        }
        Command::Invalid(msg) => {
            println!("{msg}");
            Ok(())
        }
        Command::Quit => Ok(()),
    };
    if let Err(e) = result {
        println!("! {e}");
    }
}

fn render_update(session: &WsSession, update: &SessionUpdate) {
    match update {
        SessionUpdate::Notice(text) => println!("* {text}"),
        SessionUpdate::ConnectionStateChanged(state) => println!("[{state}]"),
        SessionUpdate::ActiveChannelChanged(id) => {
            println!("-- now in #{id} --");
            for (root, thread) in session.root_messages_of(id) {
                print_message(root, thread.and_then(|t| t.reply_label()).as_deref());
            }
        }
        SessionUpdate::MessageAdded { channel_id, thread_id } => {
            if channel_id != session.active_channel_id() {
                return;
            }
            let Some(thread) = session.thread(thread_id) else {
                return;
            };
            let latest = thread.replies.last().unwrap_or(&thread.root);
            print_message(latest, None);
        }
        SessionUpdate::ChannelsUpdated
        | SessionUpdate::ReconnectScheduled { .. }
        | SessionUpdate::ReconnectExhausted => {}
    }
}

fn print_message(msg: &Message, reply_label: Option<&str>) {
    let indent = if msg.is_reply { "    " } else { "" };
    println!("{indent}[{}] {}: {}", msg.thread_id, msg.author, msg.text);
    if let Some(event) = &msg.structured_payload {
        for (label, value) in event.detail_rows() {
            println!("{indent}    {label}: {value}");
        }
        for action in event.actions() {
            match action.target_url() {
                Some(url) => println!("{indent}    ({}) {url}", action.label),
                None => println!("{indent}    ({})", action.label),
            }
        }
    }
    if let Some(label) = reply_label {
        println!("{indent}    {label}");
    }
}

fn print_channels(session: &WsSession) {
    for channel in session.channels() {
        let marker = if channel.id == session.active_channel_id() { "*" } else { " " };
        let badge = channel
            .unread_badge()
            .map(|b| format!(" ({b})"))
            .unwrap_or_default();
        println!("{marker} {} - {}{badge}", channel.id, channel.display_name);
    }
}

fn print_threads(session: &WsSession) {
    let active = session.active_channel_id();
    for (root, thread) in session.root_messages_of(active) {
        let replies = thread.map_or(0, |t| t.reply_count());
        println!("{}  {} ({replies})", root.thread_id, root.text);
    }
}
