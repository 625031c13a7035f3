// Session Relay CLI Validation Tool
// Drives a running relay through its WebSocket protocol and HTTP endpoints

use clap::{Parser, Subcommand};
use colored::*;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::io::{self, Write};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout, Duration, Instant};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWrite = SplitSink<WsStream, Message>;
type WsRead = SplitStream<WsStream>;

const SCENARIOS: [(&str, &str); 6] = [
    ("connection", "Basic WebSocket connection test"),
    ("host-election", "First joiner becomes host, second a participant"),
    ("duplicate-name", "Second connection with the same name evicts the first"),
    ("signaling", "Offer and answer relayed between two peers"),
    ("chat", "Room chat reaches every member"),
    ("host-departure", "Host leaving closes every participant"),
];

#[derive(Parser)]
#[command(name = "session-cli")]
#[command(about = "Session Relay CLI Validation Tool", long_about = None)]
struct Cli {
    /// Server address (default: 127.0.0.1:5000)
    #[arg(short, long, default_value = "127.0.0.1:5000")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check server health endpoint
    Health,

    /// Get ICE configuration
    Config,

    /// Test WebSocket connection
    Connect,

    /// Join a room and print what the server sends
    Join {
        /// Room ID to join
        #[arg(short, long)]
        room: String,

        /// Display name
        #[arg(short, long)]
        name: String,

        /// Claimed role (host, teacher, participant)
        #[arg(long)]
        role: Option<String>,

        /// Email used for the session report when hosting
        #[arg(short, long)]
        email: Option<String>,

        /// Keep connection alive (press Ctrl+C to exit)
        #[arg(short, long)]
        keep_alive: bool,
    },

    /// Run automated validation scenarios
    Validate {
        /// Run all validation tests
        #[arg(short, long)]
        all: bool,

        /// Test specific scenario
        #[arg(short, long)]
        scenario: Option<String>,
    },

    /// Interactive mode - send custom messages
    Interactive,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Health => {
            check_health(&cli.server).await;
        }
        Commands::Config => {
            check_config(&cli.server).await;
        }
        Commands::Connect => {
            test_connection(&cli.server).await;
        }
        Commands::Join {
            room,
            name,
            role,
            email,
            keep_alive,
        } => {
            join_room(&cli.server, room, name, role.as_deref(), email.as_deref(), *keep_alive).await;
        }
        Commands::Validate { all, scenario } => {
            if *all {
                run_all_validations(&cli.server).await;
            } else if let Some(s) = scenario {
                run_scenario(&cli.server, s).await;
            } else {
                println!("{}", "Use --all or --scenario <name>".yellow());
                list_scenarios();
            }
        }
        Commands::Interactive => {
            interactive_mode(&cli.server).await;
        }
    }
}

async fn check_health(server: &str) {
    println!("{}", "Checking server health...".cyan());

    let url = format!("http://{}/session/health", server);
    let client = reqwest::Client::new();

    match client.get(&url).send().await {
        Ok(resp) => {
            let status = resp.status();
            if status.is_success() {
                println!("{} Health check passed", "✓".green());

                if let Ok(body) = resp.json::<Value>().await {
                    println!("  Status: {}", body["status"].as_str().unwrap_or("unknown"));
                    println!("  Service: {}", body["service"].as_str().unwrap_or("unknown"));
                    println!("  Version: {}", body["version"].as_str().unwrap_or("unknown"));
                    println!("  Connections: {}", body["connections"]);
                    println!("  Rooms: {}", body["rooms"]);
                }
            } else {
                println!("{} Health check failed: {}", "✗".red(), status);
            }
        }
        Err(e) => {
            println!("{} Cannot connect to server: {}", "✗".red(), e);
            println!("  Make sure the server is running on {}", server);
        }
    }
}

async fn check_config(server: &str) {
    println!("{}", "Fetching ICE configuration...".cyan());

    let url = format!("http://{}/session/config", server);
    let client = reqwest::Client::new();

    match client.get(&url).send().await {
        Ok(resp) => {
            if resp.status().is_success() {
                println!("{} Config endpoint accessible", "✓".green());

                if let Ok(body) = resp.json::<Value>().await {
                    println!("\nConfiguration:");
                    println!("{}", serde_json::to_string_pretty(&body).unwrap_or_default());
                }
            } else {
                println!("{} Config fetch failed: {}", "✗".red(), resp.status());
            }
        }
        Err(e) => {
            println!("{} Cannot connect to server: {}", "✗".red(), e);
        }
    }
}

async fn test_connection(server: &str) {
    println!("{}", "Testing WebSocket connection...".cyan());

    if connect(server).await.is_some() {
        println!("{} WebSocket connection established", "✓".green());
        println!("  URL: {}", ws_url(server));
        println!("{} Connection closed cleanly", "✓".green());
    }
}

async fn join_room(
    server: &str,
    room: &str,
    name: &str,
    role: Option<&str>,
    email: Option<&str>,
    keep_alive: bool,
) {
    println!("{}", "Joining room...".cyan());
    println!("  Room ID: {}", room);
    println!("  Name: {}", name);
    if let Some(r) = role {
        println!("  Claimed role: {}", r);
    }

    let Some((mut write, mut read)) = connect(server).await else {
        return;
    };

    if !send_join(&mut write, room, name, role, email).await {
        return;
    }
    println!("{} join-room sent", "✓".green());

    match expect_type(&mut read, "role-assigned", Duration::from_secs(5)).await {
        Some(frame) => {
            println!("\n{}", "═".repeat(50).green());
            println!("{} {}", "Role:".bold(), frame["role"].as_str().unwrap_or("unknown").green().bold());
            println!("{}", "═".repeat(50).green());
        }
        None => return,
    }

    if let Some(frame) = expect_type(&mut read, "all-users", Duration::from_secs(3)).await {
        let peers = frame["users"].as_array().map(|u| u.len()).unwrap_or(0);
        println!("  Peers already present: {}", peers);
    }

    if keep_alive {
        println!("\n{}", "Connection is being kept alive...".yellow());
        println!("Press {} to leave the room.", "Ctrl+C".bold());

        loop {
            match timeout(Duration::from_secs(30), read.next()).await {
                Ok(Some(Ok(Message::Text(text)))) => {
                    println!("{} {}", "◀".green(), text.bright_white());
                }
                Ok(Some(Ok(Message::Close(_)))) => {
                    println!("{} Server closed the connection", "✗".yellow());
                    break;
                }
                Ok(Some(Ok(_))) => continue,
                Ok(Some(Err(e))) => {
                    println!("{} Connection error: {}", "✗".red(), e);
                    break;
                }
                Ok(None) => {
                    println!("{} Connection closed", "✗".yellow());
                    break;
                }
                Err(_) => continue,
            }
        }
    } else {
        println!("\n{}", "⚠ Note: Connection closed. You have left the room.".yellow());
        println!("Use {} to stay in the room.", "--keep-alive".cyan());
    }
}

fn list_scenarios() {
    println!("\n{}", "Available Validation Scenarios:".bold());
    for (name, description) in SCENARIOS {
        println!("  {} - {}", name.cyan(), description);
    }
    println!("\nExample: session-cli validate --scenario host-departure");
}

async fn run_named(server: &str, scenario: &str) -> Option<bool> {
    let result = match scenario {
        "connection" => validate_connection(server).await,
        "host-election" => validate_host_election(server).await,
        "duplicate-name" => validate_duplicate_name(server).await,
        "signaling" => validate_signaling(server).await,
        "chat" => validate_chat(server).await,
        "host-departure" => validate_host_departure(server).await,
        _ => return None,
    };
    Some(result)
}

async fn run_scenario(server: &str, scenario: &str) {
    println!("\n{} {}", "Running scenario:".bold(), scenario.cyan());
    println!("{}", "─".repeat(60));

    match run_named(server, scenario).await {
        Some(true) => println!("\n{} Scenario passed", "✓".green().bold()),
        Some(false) => println!("\n{} Scenario failed", "✗".red().bold()),
        None => {
            println!("{} Unknown scenario: {}", "✗".red(), scenario);
            list_scenarios();
        }
    }
}

async fn run_all_validations(server: &str) {
    println!("\n{}", "Running All Validation Tests".bold().green());
    println!("{}\n", "═".repeat(60).green());

    let mut passed = 0;
    let mut failed = 0;

    for (scenario, _) in SCENARIOS {
        println!("\n{} Testing: {}", "▶".cyan(), scenario.bold());
        println!("{}", "─".repeat(60));

        if run_named(server, scenario).await.unwrap_or(false) {
            passed += 1;
        } else {
            failed += 1;
        }

        sleep(Duration::from_millis(500)).await;
    }

    println!("\n{}", "═".repeat(60).green());
    println!("{}", "Validation Summary".bold());
    println!("{}", "═".repeat(60).green());
    println!("  {} Passed: {}", "✓".green(), passed.to_string().green());
    println!("  {} Failed: {}", "✗".red(), failed.to_string().red());
    println!("  Total: {}", passed + failed);

    if failed == 0 {
        println!("\n{}", "All validations passed! 🎉".green().bold());
    } else {
        println!("\n{}", "Some validations failed. Check output above.".yellow());
    }
}

async fn validate_connection(server: &str) -> bool {
    match connect(server).await {
        Some(_) => {
            println!("{} WebSocket connection successful", "✓".green());
            true
        }
        None => false,
    }
}

async fn validate_host_election(server: &str) -> bool {
    let room = scratch_room("election");

    println!("  Step 1: First connection joins {}...", room);
    let Some((mut host_write, mut host_read)) = connect(server).await else {
        return false;
    };
    send_join(&mut host_write, &room, "Validator Host", None, None).await;
    if !expect_role(&mut host_read, "host").await {
        return false;
    }

    println!("  Step 2: Second connection claims host in the same room...");
    let Some((mut guest_write, mut guest_read)) = connect(server).await else {
        return false;
    };
    send_join(&mut guest_write, &room, "Validator Guest", Some("host"), None).await;
    if !expect_role(&mut guest_read, "teacher").await {
        return false;
    }

    println!("  Step 3: Host is told about the arrival...");
    match expect_type(&mut host_read, "user-joined", Duration::from_secs(3)).await {
        Some(frame) if frame["userName"] == "Validator Guest" => {
            println!("  {} Host received user-joined", "✓".green());
            true
        }
        _ => false,
    }
}

async fn validate_duplicate_name(server: &str) -> bool {
    let room = scratch_room("duplicate");

    let Some((mut host_write, mut host_read)) = connect(server).await else {
        return false;
    };
    send_join(&mut host_write, &room, "Validator Host", None, None).await;
    expect_role(&mut host_read, "host").await;

    println!("  Step 1: First tab joins as Dana...");
    let Some((mut first_write, mut first_read)) = connect(server).await else {
        return false;
    };
    send_join(&mut first_write, &room, "Dana", None, None).await;
    expect_role(&mut first_read, "participant").await;

    println!("  Step 2: Second tab joins with the same name...");
    let Some((mut second_write, mut second_read)) = connect(server).await else {
        return false;
    };
    send_join(&mut second_write, &room, "Dana", None, None).await;

    if expect_type(&mut first_read, "duplicate-connection", Duration::from_secs(3))
        .await
        .is_none()
    {
        return false;
    }
    println!("  {} First tab was evicted", "✓".green());

    expect_role(&mut second_read, "participant").await
}

async fn validate_signaling(server: &str) -> bool {
    let room = scratch_room("signal");

    let Some((mut a_write, mut a_read)) = connect(server).await else {
        return false;
    };
    send_join(&mut a_write, &room, "Validator A", None, None).await;
    expect_role(&mut a_read, "host").await;

    let Some((mut b_write, mut b_read)) = connect(server).await else {
        return false;
    };
    send_join(&mut b_write, &room, "Validator B", None, None).await;
    expect_role(&mut b_read, "participant").await;

    let Some(users) = expect_type(&mut b_read, "all-users", Duration::from_secs(3)).await else {
        return false;
    };
    let Some(a_id) = users["users"][0]["socketId"].as_str().map(String::from) else {
        println!("{} all-users did not list the host", "✗".red());
        return false;
    };

    println!("  Step 1: B sends an offer to A...");
    let offer = json!({
        "type": "sending-signal",
        "userToSignal": a_id,
        "signal": { "type": "offer", "sdp": "v=0 validator" },
        "userName": "Validator B",
    });
    send_json(&mut b_write, &offer).await;

    let Some(relayed) = expect_offer(&mut a_read).await else {
        return false;
    };
    let Some(b_id) = relayed["callerId"].as_str().map(String::from) else {
        return false;
    };
    println!("  {} A received the offer from {}", "✓".green(), b_id);

    println!("  Step 2: A answers...");
    let answer = json!({
        "type": "returning-signal",
        "callerId": b_id,
        "signal": { "type": "answer", "sdp": "v=0 validator" },
    });
    send_json(&mut a_write, &answer).await;

    match expect_type(&mut b_read, "receiving-returned-signal", Duration::from_secs(3)).await {
        Some(frame) if frame["id"] == a_id.as_str() => {
            println!("  {} B received the answer", "✓".green());
            true
        }
        _ => false,
    }
}

async fn validate_chat(server: &str) -> bool {
    let room = scratch_room("chat");

    let Some((mut a_write, mut a_read)) = connect(server).await else {
        return false;
    };
    send_join(&mut a_write, &room, "Validator A", None, None).await;
    expect_role(&mut a_read, "host").await;

    let Some((mut b_write, mut b_read)) = connect(server).await else {
        return false;
    };
    send_join(&mut b_write, &room, "Validator B", None, None).await;
    expect_role(&mut b_read, "participant").await;

    let chat = json!({
        "type": "send-message",
        "roomId": room,
        "userName": "Validator A",
        "message": "hello from the validator",
    });
    send_json(&mut a_write, &chat).await;

    match expect_type(&mut b_read, "receive-message", Duration::from_secs(3)).await {
        Some(frame) if frame["message"] == "hello from the validator" => {
            println!("  {} Message delivered", "✓".green());
            true
        }
        _ => false,
    }
}

async fn validate_host_departure(server: &str) -> bool {
    let room = scratch_room("departure");

    println!("  Step 1: Host and participant join {}...", room);
    let Some((mut host_write, mut host_read)) = connect(server).await else {
        return false;
    };
    send_join(&mut host_write, &room, "Validator Host", None, None).await;
    expect_role(&mut host_read, "host").await;

    let Some((mut guest_write, mut guest_read)) = connect(server).await else {
        return false;
    };
    send_join(&mut guest_write, &room, "Validator Guest", None, None).await;
    expect_role(&mut guest_read, "participant").await;

    println!("  Step 2: Host leaves...");
    send_json(&mut host_write, &json!({ "type": "leave-room", "roomId": room })).await;

    let Some(frame) = expect_type(&mut guest_read, "host-left", Duration::from_secs(3)).await else {
        return false;
    };
    println!("  {} Participant notified: {}", "✓".green(), frame["message"]);

    println!("  Step 3: Participant connection is closed by the server...");
    let deadline = Instant::now() + Duration::from_secs(3);
    loop {
        match timeout(deadline.saturating_duration_since(Instant::now()), guest_read.next()).await {
            Ok(Some(Ok(Message::Close(_)))) | Ok(None) | Ok(Some(Err(_))) => {
                println!("  {} Connection closed", "✓".green());
                return true;
            }
            Ok(Some(Ok(_))) => continue,
            Err(_) => {
                println!("{} Connection stayed open", "✗".red());
                return false;
            }
        }
    }
}

async fn interactive_mode(server: &str) {
    println!("\n{}", "Interactive Mode".bold().green());
    println!("{}", "═".repeat(60).green());
    println!("Type {} for help, {} to quit\n", "help".cyan(), "quit".cyan());

    let Some((mut write, mut read)) = connect(server).await else {
        return;
    };
    println!("{} Connected to server", "✓".green());

    let receive_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = read.next().await {
            if let Message::Text(text) = msg {
                println!("\n{} {}", "◀".green(), text.bright_white());
            }
        }
    });

    loop {
        print!("{} ", "►".cyan());
        let _ = io::stdout().flush();

        let mut input = String::new();
        if io::stdin().read_line(&mut input).is_err() {
            break;
        }

        let input = input.trim();

        if input.is_empty() {
            continue;
        }

        if input == "quit" || input == "exit" {
            println!("Goodbye!");
            break;
        }

        if input == "help" {
            print_interactive_help();
            continue;
        }

        if let Ok(parsed) = serde_json::from_str::<Value>(input) {
            if write.send(Message::Text(parsed.to_string())).await.is_ok() {
                println!("{} Message sent", "✓".green());
            } else {
                println!("{} Failed to send message", "✗".red());
                break;
            }
        } else {
            println!("{} Invalid JSON. Type 'help' for examples.", "✗".yellow());
        }
    }

    receive_task.abort();
}

fn print_interactive_help() {
    println!("\n{}", "Interactive Mode Commands".bold());
    println!("{}", "─".repeat(60));
    println!("Send JSON messages directly to the server.\n");

    println!("{}", "Example Messages:".bold());
    println!("\n{}:", "Join Room".cyan());
    println!(r#"  {{"type":"join-room","roomId":"R1","userName":"Ada","role":"host","email":"ada@example.com"}}"#);

    println!("\n{}:", "Chat".cyan());
    println!(r#"  {{"type":"chat-message","message":{{"text":"hi"}}}}"#);

    println!("\n{}:", "Attention".cyan());
    println!(r#"  {{"type":"attention-update","score":82}}"#);

    println!("\n{}:", "Kick".cyan());
    println!(r#"  {{"type":"kick-user","user":"Bea"}}"#);

    println!("\n{}:", "Leave".cyan());
    println!(r#"  {{"type":"leave-room","roomId":"R1"}}"#);

    println!("\n{}: quit, exit", "Commands".bold());
    println!();
}

fn ws_url(server: &str) -> String {
    format!("ws://{}/session", server)
}

fn scratch_room(prefix: &str) -> String {
    format!("validator-{}-{:08x}", prefix, rand::random::<u32>())
}

async fn connect(server: &str) -> Option<(WsWrite, WsRead)> {
    match connect_async(ws_url(server)).await {
        Ok((ws_stream, _)) => Some(ws_stream.split()),
        Err(e) => {
            println!("{} Cannot connect to server: {}", "✗".red(), e);
            None
        }
    }
}

async fn send_json(write: &mut WsWrite, frame: &Value) -> bool {
    if write.send(Message::Text(frame.to_string())).await.is_err() {
        println!("{} Failed to send {}", "✗".red(), frame["type"]);
        return false;
    }
    true
}

async fn send_join(
    write: &mut WsWrite,
    room: &str,
    name: &str,
    role: Option<&str>,
    email: Option<&str>,
) -> bool {
    let frame = json!({
        "type": "join-room",
        "roomId": room,
        "userName": name,
        "role": role,
        "email": email,
    });
    send_json(write, &frame).await
}

/// Reads frames until one of the given type arrives, skipping everything else
async fn expect_type(read: &mut WsRead, frame_type: &str, wait: Duration) -> Option<Value> {
    let deadline = Instant::now() + wait;
    loop {
        match timeout(deadline.saturating_duration_since(Instant::now()), read.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => {
                if let Ok(frame) = serde_json::from_str::<Value>(&text) {
                    if frame["type"] == frame_type {
                        return Some(frame);
                    }
                }
            }
            Ok(Some(Ok(_))) => continue,
            Ok(Some(Err(e))) => {
                println!("{} Error receiving message: {}", "✗".red(), e);
                return None;
            }
            Ok(None) => {
                println!("{} Connection closed by server", "✗".red());
                return None;
            }
            Err(_) => {
                println!("{} Timeout waiting for {}", "✗".red(), frame_type);
                return None;
            }
        }
    }
}

async fn expect_role(read: &mut WsRead, role: &str) -> bool {
    match expect_type(read, "role-assigned", Duration::from_secs(3)).await {
        Some(frame) if frame["role"] == role => {
            println!("  {} Assigned role {}", "✓".green(), role);
            true
        }
        Some(frame) => {
            println!("{} Expected role {}, got {}", "✗".red(), role, frame["role"]);
            false
        }
        None => false,
    }
}

/// A `user-joined` frame carrying a signal, as opposed to a bare arrival notice
async fn expect_offer(read: &mut WsRead) -> Option<Value> {
    let deadline = Instant::now() + Duration::from_secs(3);
    while let Some(frame) = expect_type(read, "user-joined", deadline.saturating_duration_since(Instant::now())).await {
        if !frame["signal"].is_null() {
            return Some(frame);
        }
    }
    None
}
