// End-to-end room lifecycle tests driven through the coordinator, no network

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::FixedOffset;
use rand::Rng;
use tokio::sync::mpsc;
use tokio::time::{sleep, Duration};

use session_relay::config::SessionConfig;
use session_relay::error::Result;
use session_relay::report::{ReportMailer, ReportQueue, ReportRequest, ReportSettings};
use session_relay::session::{
    ClientMessage, ConnectionId, Outbound, Role, RoomState, ServerMessage, SessionCoordinator,
};

/// Hands every delivered report back to the test
struct ChannelMailer {
    delivered: mpsc::UnboundedSender<ReportRequest>,
}

#[async_trait]
impl ReportMailer for ChannelMailer {
    async fn send(&self, request: &ReportRequest, _artifact: &Path) -> Result<()> {
        let _ = self.delivered.send(request.clone());
        Ok(())
    }
}

struct Client {
    id: ConnectionId,
    rx: mpsc::UnboundedReceiver<Outbound>,
}

impl Client {
    fn frames(&mut self) -> Vec<Outbound> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.rx.try_recv() {
            frames.push(frame);
        }
        frames
    }

    fn events(&mut self) -> Vec<ServerMessage> {
        self.frames()
            .into_iter()
            .filter_map(|frame| match frame {
                Outbound::Event(event) => Some(event),
                Outbound::Close => None,
            })
            .collect()
    }
}

fn coordinator() -> (SessionCoordinator, mpsc::UnboundedReceiver<ReportRequest>) {
    let (delivered, reports_rx) = mpsc::unbounded_channel();
    let reports = ReportQueue::new(
        Arc::new(ChannelMailer { delivered }),
        ReportSettings {
            output_dir: std::env::temp_dir().join(format!("session-relay-it-{}", ConnectionId::generate())),
            timezone: FixedOffset::east_opt(330 * 60).unwrap(),
        },
    );
    (SessionCoordinator::new(SessionConfig::default(), reports), reports_rx)
}

async fn connect(coordinator: &SessionCoordinator) -> Client {
    let (tx, rx) = mpsc::unbounded_channel();
    let id = coordinator.connect(tx).await;
    Client { id, rx }
}

async fn join(coordinator: &SessionCoordinator, client: &Client, room: &str, name: &str, email: Option<&str>) {
    coordinator
        .handle_message(
            &client.id,
            ClientMessage::JoinRoom {
                room_id: room.to_string(),
                user_name: Some(name.to_string()),
                name: None,
                role: None,
                email: email.map(str::to_string),
            },
        )
        .await;
}

async fn leave(coordinator: &SessionCoordinator, client: &Client, room: &str) {
    coordinator
        .handle_message(&client.id, ClientMessage::LeaveRoom { room_id: room.to_string() })
        .await;
}

async fn room_state(coordinator: &SessionCoordinator, room: &str) -> Option<RoomState> {
    let room = room.to_string();
    coordinator.inspect(move |store| store.room_state(&room)).await
}

#[tokio::test(start_paused = true)]
async fn test_host_departure_reports_and_purges() {
    let (coordinator, mut reports) = coordinator();
    let a = connect(&coordinator).await;
    let b = connect(&coordinator).await;
    let mut c = connect(&coordinator).await;

    join(&coordinator, &a, "R1", "Ada", Some("h@x.com")).await;
    join(&coordinator, &b, "R1", "Bea", None).await;
    join(&coordinator, &c, "R1", "Cal", None).await;

    leave(&coordinator, &b, "R1").await;
    let attendance = coordinator
        .inspect(|store| store.room("R1").map(|room| room.attendance().to_vec()))
        .await;
    assert_eq!(attendance, Some(vec!["Ada".to_string(), "Cal".to_string()]));
    assert_eq!(room_state(&coordinator, "R1").await, Some(RoomState::Active));

    c.frames();
    coordinator.disconnect(&a.id).await;
    assert_eq!(room_state(&coordinator, "R1").await, Some(RoomState::Draining));

    let frames = c.frames();
    assert!(matches!(frames.first(), Some(Outbound::Event(ServerMessage::HostLeft { .. }))));
    assert!(matches!(frames.last(), Some(Outbound::Close)));
    coordinator.disconnect(&c.id).await;

    sleep(Duration::from_secs(4)).await;
    assert_eq!(room_state(&coordinator, "R1").await, Some(RoomState::Draining));

    sleep(Duration::from_secs(2)).await;
    assert_eq!(room_state(&coordinator, "R1").await, None);
    assert!(coordinator.inspect(|store| store.ledger("R1").is_none()).await);

    let mut d = connect(&coordinator).await;
    join(&coordinator, &d, "R1", "Dov", None).await;
    assert_eq!(
        d.events().first(),
        Some(&ServerMessage::RoleAssigned { role: Role::Host })
    );

    let request = reports.recv().await.unwrap();
    assert_eq!(request.host_email, "h@x.com");
    let names: Vec<&str> = request.report.rows.iter().map(|row| row.name.as_str()).collect();
    assert_eq!(names, vec!["Bea", "Cal"]);
    assert_eq!(request.report.rows[1].leave_time, request.ended_at);
}

#[tokio::test(start_paused = true)]
async fn test_stale_teardown_spares_reused_room() {
    let (coordinator, _reports) = coordinator();
    let a = connect(&coordinator).await;
    let d = connect(&coordinator).await;

    join(&coordinator, &a, "R1", "Ada", None).await;
    leave(&coordinator, &a, "R1").await;
    assert_eq!(room_state(&coordinator, "R1").await, Some(RoomState::Draining));

    sleep(Duration::from_secs(2)).await;
    join(&coordinator, &d, "R1", "Dov", None).await;
    assert_eq!(room_state(&coordinator, "R1").await, Some(RoomState::Active));

    sleep(Duration::from_secs(10)).await;
    assert_eq!(room_state(&coordinator, "R1").await, Some(RoomState::Active));
    let host = coordinator
        .inspect(|store| store.room("R1").map(|room| room.is_host(&d.id)))
        .await;
    assert_eq!(host, Some(true));
}

#[tokio::test(start_paused = true)]
async fn test_report_skipped_without_host_email() {
    let (coordinator, mut reports) = coordinator();
    let a = connect(&coordinator).await;
    let b = connect(&coordinator).await;

    join(&coordinator, &a, "R2", "Ada", None).await;
    join(&coordinator, &b, "R2", "Bea", None).await;
    coordinator.disconnect(&a.id).await;

    sleep(Duration::from_secs(6)).await;
    assert!(reports.try_recv().is_err());
    assert_eq!(room_state(&coordinator, "R2").await, None);
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_name_keeps_single_attendance_entry() {
    let (coordinator, _reports) = coordinator();
    let host = connect(&coordinator).await;
    let mut first = connect(&coordinator).await;
    let second = connect(&coordinator).await;

    join(&coordinator, &host, "R3", "Ada", None).await;
    join(&coordinator, &first, "R3", "Bea", None).await;
    join(&coordinator, &second, "R3", "Bea", None).await;

    let frames = first.frames();
    assert!(frames
        .iter()
        .any(|f| matches!(f, Outbound::Event(ServerMessage::DuplicateConnection { .. }))));
    assert!(matches!(frames.last(), Some(Outbound::Close)));

    let attendance = coordinator
        .inspect(|store| store.room("R3").map(|room| room.attendance().to_vec()))
        .await
        .unwrap();
    assert_eq!(attendance.iter().filter(|name| *name == "Bea").count(), 1);
    let members = coordinator
        .inspect(|store| store.room("R3").map(|room| room.members().to_vec()))
        .await
        .unwrap();
    assert!(!members.contains(&first.id));
    assert!(members.contains(&second.id));
}

#[tokio::test(start_paused = true)]
async fn test_at_most_one_host_over_random_sequences() {
    let (coordinator, _reports) = coordinator();
    let mut clients = Vec::new();
    for _ in 0..6 {
        clients.push(connect(&coordinator).await);
    }
    let rooms = ["P1", "P2"];
    let mut rng = rand::thread_rng();

    for step in 0..300 {
        let client = &clients[rng.gen_range(0..clients.len())];
        let room = rooms[rng.gen_range(0..rooms.len())];
        if rng.gen_bool(0.6) {
            let name = format!("user-{}", rng.gen_range(0..4));
            join(&coordinator, client, room, &name, None).await;
        } else {
            leave(&coordinator, client, room).await;
        }

        if step % 25 == 0 {
            sleep(Duration::from_secs(3)).await;
        }

        for room in rooms {
            let hosts = coordinator.inspect(|store| store.count_role(room, Role::Host)).await;
            assert!(hosts <= 1, "room {} has {} hosts", room, hosts);
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_relay_to_missing_target_is_silent() {
    let (coordinator, _reports) = coordinator();
    let mut a = connect(&coordinator).await;
    join(&coordinator, &a, "R4", "Ada", None).await;
    a.frames();

    coordinator
        .handle_message(
            &a.id,
            ClientMessage::SendingSignal {
                user_to_signal: ConnectionId::from("gone"),
                signal: serde_json::json!({ "type": "offer" }),
                caller_id: None,
                user_name: None,
            },
        )
        .await;

    assert!(a.frames().is_empty());
}
