use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr, TcpStream};
use std::time::{Duration, Instant};

use tungstenite::protocol::Message;
use tungstenite::stream::MaybeTlsStream;

use super::*;
use crate::config::MonitorConfig;

type Client = WebSocket<MaybeTlsStream<TcpStream>>;

fn hub(timeout_ms: u64) -> (AgentHub, u16) {
    let mut config = MonitorConfig::default();
    config.push.timeout_ms = timeout_ms;
    let hub = AgentHub::new(ConfigHandle::new(config));
    let port = start_agent_server(IpAddr::V4(Ipv4Addr::LOCALHOST), 0, hub.clone()).unwrap();
    (hub, port)
}

fn connect_agent(port: u16, device: &str) -> Client {
    let (mut ws, _) = tungstenite::connect(format!("ws://127.0.0.1:{port}")).unwrap();
    let hello = AgentMessage::Hello {
        device: device.into(),
        application_id: "com.example".into(),
        api_level: 34,
        emulator: true,
    };
    ws.send(Message::Text(hello.to_json().unwrap().into())).unwrap();
    match ws.read().unwrap() {
        Message::Text(text) => assert!(matches!(
            AgentMessage::parse(&text).unwrap(),
            AgentMessage::Welcome { .. }
        )),
        other => panic!("expected welcome, got {other:?}"),
    }
    ws
}

/// Answer the next patch request with `ok`.
fn answer(mut ws: Client, ok: bool) -> std::thread::JoinHandle<PatchRequest> {
    std::thread::spawn(move || {
        loop {
            if let Message::Text(text) = ws.read().unwrap()
                && let AgentMessage::ApplyPatch { id, patch } = AgentMessage::parse(&text).unwrap()
            {
                let result = AgentMessage::PatchResult {
                    id,
                    ok,
                    error: (!ok).then(|| "schema change".to_string()),
                };
                ws.send(Message::Text(result.to_json().unwrap().into())).unwrap();
                return patch;
            }
        }
    })
}

fn wait_for_agents(hub: &AgentHub, count: usize) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while hub.live_targets("com.example").len() != count {
        assert!(Instant::now() < deadline, "agent did not register");
        std::thread::sleep(Duration::from_millis(10));
    }
}

fn request() -> PatchRequest {
    PatchRequest {
        class_name: "com/example/MainKt".into(),
        method_name: "Greeting".into(),
        method_desc: "()V".into(),
        partial: true,
        offset_start: 0,
        offset_end: 10,
        class_data: vec![0xca, 0xfe],
        support_classes: BTreeMap::new(),
        debug_mode: false,
    }
}

#[test]
fn test_registered_agent_is_live_target() {
    let (hub, port) = hub(1000);
    let _agent = connect_agent(port, "emulator-5554");
    wait_for_agents(&hub, 1);

    let targets = hub.live_targets("com.example");
    assert_eq!(targets[0].id.as_str(), "emulator-5554");
    assert_eq!(targets[0].api_level, 34);
    assert!(targets[0].emulator);
    assert!(hub.live_targets("com.other").is_empty());
}

#[test]
fn test_patch_applied_over_socket() {
    let (hub, port) = hub(2000);
    let agent = connect_agent(port, "pixel");
    wait_for_agents(&hub, 1);
    let replies = answer(agent, true);

    let target = hub.live_targets("com.example").remove(0);
    let mut session = hub.connect(&target).unwrap();
    session.apply_patch(&request()).unwrap();
    assert_eq!(replies.join().unwrap(), request());
}

#[test]
fn test_rejected_patch_carries_message() {
    let (hub, port) = hub(2000);
    let agent = connect_agent(port, "pixel");
    wait_for_agents(&hub, 1);
    let _replies = answer(agent, false);

    let target = hub.live_targets("com.example").remove(0);
    let err = hub.connect(&target).unwrap().apply_patch(&request()).unwrap_err();
    match err {
        PatchError::Rejected { artifact, message, .. } => {
            assert_eq!(artifact, "com/example/MainKt.Greeting()V");
            assert_eq!(message, "schema change");
        }
        other => panic!("expected rejection, got {other:?}"),
    }
}

#[test]
fn test_silent_agent_times_out() {
    let (hub, port) = hub(150);
    let _agent = connect_agent(port, "pixel");
    wait_for_agents(&hub, 1);

    let target = hub.live_targets("com.example").remove(0);
    let mut session = hub.connect(&target).unwrap();
    let err = session.apply_patch(&request()).unwrap_err();
    assert_eq!(
        err,
        PatchError::Timeout {
            target: target.id.clone(),
            ms: 150
        }
    );
    // A slow agent is still connected
    assert!(session.is_usable());
}

#[test]
fn test_dropped_agent_makes_session_unusable() {
    let (hub, port) = hub(2000);
    let agent = connect_agent(port, "pixel");
    wait_for_agents(&hub, 1);

    let target = hub.live_targets("com.example").remove(0);
    let mut session = hub.connect(&target).unwrap();
    drop(agent);

    let err = session.apply_patch(&request()).unwrap_err();
    assert!(matches!(err, PatchError::Transport { .. }));
    assert!(!session.is_usable());
}

#[test]
fn test_unknown_target_cannot_connect() {
    let (hub, _) = hub(1000);
    let err = hub
        .connect(&Target::new("ghost", "com.example", 34))
        .err()
        .unwrap();
    assert!(matches!(err, PatchError::Connect { .. }));
}
