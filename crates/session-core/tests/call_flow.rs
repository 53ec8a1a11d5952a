//! End-to-end call flows: two endpoint actors wired through a real
//! signaling hub over in-process channels.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use vkyc_session_core::{
    CallEndpoint, Decision, EndReason, EndpointConfig, EndpointEvent, LoopbackPeerTransport,
    NullVerdictSink, SessionResult, Verdict, VerdictSink,
};
use vkyc_infra_common::{setup_logging, LoggingConfig};
use vkyc_signal_core::{ControlMessage, DurableId, MediaFlags, MediaKind, ServerFrame, SignalHub};

fn init_logging() {
    // only the first test in the process wins; the rest is fine
    let _ = setup_logging(LoggingConfig::default());
}

#[derive(Default)]
struct RecordingSink {
    submitted: Mutex<Vec<(DurableId, Verdict)>>,
}

#[async_trait]
impl VerdictSink for RecordingSink {
    async fn submit_verdict(&self, durable_id: &DurableId, verdict: Verdict) -> SessionResult<()> {
        self.submitted.lock().push((durable_id.clone(), verdict));
        Ok(())
    }
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<EndpointEvent>) -> EndpointEvent {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for an endpoint event")
        .expect("endpoint task stopped")
}

/// Skip intermediate events until one matches.
async fn wait_for(
    rx: &mut mpsc::UnboundedReceiver<EndpointEvent>,
    pred: impl Fn(&EndpointEvent) -> bool,
) -> EndpointEvent {
    loop {
        let event = next_event(rx).await;
        if pred(&event) {
            return event;
        }
    }
}

fn spawn_customer(
    hub: &Arc<SignalHub>,
    name: &str,
) -> (CallEndpoint, mpsc::UnboundedReceiver<EndpointEvent>) {
    CallEndpoint::spawn(
        hub.clone(),
        Arc::new(LoopbackPeerTransport),
        Arc::new(NullVerdictSink),
        EndpointConfig::new(name),
    )
}

fn spawn_agent(
    hub: &Arc<SignalHub>,
    name: &str,
    sink: Arc<RecordingSink>,
    config: EndpointConfig,
) -> (CallEndpoint, mpsc::UnboundedReceiver<EndpointEvent>) {
    CallEndpoint::spawn(
        hub.clone(),
        Arc::new(LoopbackPeerTransport),
        sink,
        EndpointConfig {
            display_name: name.to_string(),
            ..config
        },
    )
}

#[tokio::test]
async fn full_call_flow_with_single_verdict_handoff() {
    init_logging();
    let hub = Arc::new(SignalHub::in_memory());
    let case = DurableId::from("CASE-1");

    // customer connects and publishes its case identity
    let (customer, mut customer_events) = spawn_customer(&hub, "Asha");
    wait_for(&mut customer_events, |e| {
        matches!(e, EndpointEvent::IdentityEstablished { degraded: false, .. })
    })
    .await;
    customer.bind_identity(case.clone()).unwrap();
    wait_for(&mut customer_events, |e| {
        matches!(e, EndpointEvent::IdentityBound { .. })
    })
    .await;

    // agent connects and invites the case
    let sink = Arc::new(RecordingSink::default());
    let (agent, mut agent_events) =
        spawn_agent(&hub, "Officer Rao", sink.clone(), EndpointConfig::default());
    wait_for(&mut agent_events, |e| {
        matches!(e, EndpointEvent::IdentityEstablished { .. })
    })
    .await;
    agent.call(case.clone()).unwrap();

    let invite = wait_for(&mut customer_events, |e| {
        matches!(e, EndpointEvent::IncomingInvite { .. })
    })
    .await;
    match invite {
        EndpointEvent::IncomingInvite { display_name, .. } => {
            assert_eq!(display_name, "Officer Rao")
        }
        _ => unreachable!(),
    }

    customer.accept().unwrap();
    wait_for(&mut agent_events, |e| {
        matches!(e, EndpointEvent::CallAccepted { .. })
    })
    .await;
    wait_for(&mut agent_events, |e| matches!(e, EndpointEvent::CallActive)).await;
    wait_for(&mut customer_events, |e| {
        matches!(e, EndpointEvent::CallActive)
    })
    .await;

    // chat flows while the session is active
    agent.send_chat("please hold your document up").unwrap();
    let chat = wait_for(&mut customer_events, |e| {
        matches!(e, EndpointEvent::ChatReceived { .. })
    })
    .await;
    match chat {
        EndpointEvent::ChatReceived {
            sender_name, text, ..
        } => {
            assert_eq!(sender_name, "Officer Rao");
            assert_eq!(text, "please hold your document up");
        }
        _ => unreachable!(),
    }

    // media toggles propagate
    customer.set_media(MediaKind::Video, false).unwrap();
    let media = wait_for(&mut agent_events, |e| {
        matches!(e, EndpointEvent::PeerMediaChanged { .. })
    })
    .await;
    match media {
        EndpointEvent::PeerMediaChanged { flags } => assert!(!flags.video),
        _ => unreachable!(),
    }

    // agent hangs up; both sides end
    agent.end_call().unwrap();
    assert!(matches!(
        wait_for(&mut agent_events, |e| matches!(e, EndpointEvent::CallEnded { .. })).await,
        EndpointEvent::CallEnded {
            reason: EndReason::Local
        }
    ));
    assert!(matches!(
        wait_for(&mut customer_events, |e| matches!(e, EndpointEvent::CallEnded { .. })).await,
        EndpointEvent::CallEnded {
            reason: EndReason::Remote
        }
    ));

    // exactly one verdict handoff
    agent.submit_verdict(Decision::Accept, "looks valid").unwrap();
    let submitted = wait_for(&mut agent_events, |e| {
        matches!(e, EndpointEvent::VerdictSubmitted { .. })
    })
    .await;
    assert!(matches!(
        submitted,
        EndpointEvent::VerdictSubmitted { durable_id } if durable_id == case
    ));

    agent.submit_verdict(Decision::Reject, "changed my mind").unwrap();
    wait_for(&mut agent_events, |e| {
        matches!(e, EndpointEvent::VerdictRejected { .. })
    })
    .await;

    let recorded = sink.submitted.lock();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].0, case);
    assert_eq!(recorded[0].1.decision, Decision::Accept);
    assert_eq!(recorded[0].1.remarks, "looks valid");
    assert_eq!(recorded[0].1.artifact_ref, None);
}

#[tokio::test]
async fn unknown_identity_surfaces_unreachable_and_routes_nothing() {
    init_logging();
    let hub = Arc::new(SignalHub::in_memory());

    let (_customer, mut customer_events) = spawn_customer(&hub, "Asha");
    wait_for(&mut customer_events, |e| {
        matches!(e, EndpointEvent::IdentityEstablished { .. })
    })
    .await;

    let sink = Arc::new(RecordingSink::default());
    let (agent, mut agent_events) =
        spawn_agent(&hub, "Officer Rao", sink, EndpointConfig::default());
    wait_for(&mut agent_events, |e| {
        matches!(e, EndpointEvent::IdentityEstablished { .. })
    })
    .await;

    agent.call(DurableId::from("CASE-404")).unwrap();
    let unreachable = wait_for(&mut agent_events, |e| {
        matches!(e, EndpointEvent::PeerUnreachable { .. })
    })
    .await;
    assert!(matches!(
        unreachable,
        EndpointEvent::PeerUnreachable { durable_id } if durable_id == DurableId::from("CASE-404")
    ));

    // the unbound customer saw no invite
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(customer_events.try_recv().is_err());
}

#[tokio::test]
async fn auto_invite_fires_exactly_once_despite_duplicate_identity_assignments() {
    init_logging();
    let hub = Arc::new(SignalHub::in_memory());
    let case = DurableId::from("CASE-9");

    let (customer, mut customer_events) = spawn_customer(&hub, "Asha");
    wait_for(&mut customer_events, |e| {
        matches!(e, EndpointEvent::IdentityEstablished { .. })
    })
    .await;
    customer.bind_identity(case.clone()).unwrap();
    wait_for(&mut customer_events, |e| {
        matches!(e, EndpointEvent::IdentityBound { .. })
    })
    .await;

    let sink = Arc::new(RecordingSink::default());
    let config = EndpointConfig {
        auto_invite_target: Some(case),
        auto_invite_delay: Duration::from_millis(50),
        ..Default::default()
    };
    let (_agent, mut agent_events) = spawn_agent(&hub, "Officer Rao", sink, config);
    let established = wait_for(&mut agent_events, |e| {
        matches!(e, EndpointEvent::IdentityEstablished { .. })
    })
    .await;
    let agent_handle = match established {
        EndpointEvent::IdentityEstablished { handle, .. } => handle,
        _ => unreachable!(),
    };

    // the relay re-announces the identity; the latch must absorb it
    hub.request_identity(agent_handle).unwrap();
    hub.request_identity(agent_handle).unwrap();

    wait_for(&mut customer_events, |e| {
        matches!(e, EndpointEvent::IncomingInvite { .. })
    })
    .await;

    // no second invite arrives
    tokio::time::sleep(Duration::from_millis(200)).await;
    while let Ok(event) = customer_events.try_recv() {
        assert!(
            !matches!(event, EndpointEvent::IncomingInvite { .. }),
            "auto-invite fired more than once"
        );
    }
}

#[tokio::test]
async fn declined_invite_returns_caller_to_idle_and_allows_retry() {
    init_logging();
    let hub = Arc::new(SignalHub::in_memory());
    let case = DurableId::from("CASE-5");

    let (customer, mut customer_events) = spawn_customer(&hub, "Asha");
    wait_for(&mut customer_events, |e| {
        matches!(e, EndpointEvent::IdentityEstablished { .. })
    })
    .await;
    customer.bind_identity(case.clone()).unwrap();
    wait_for(&mut customer_events, |e| {
        matches!(e, EndpointEvent::IdentityBound { .. })
    })
    .await;

    let sink = Arc::new(RecordingSink::default());
    let (agent, mut agent_events) =
        spawn_agent(&hub, "Officer Rao", sink, EndpointConfig::default());
    wait_for(&mut agent_events, |e| {
        matches!(e, EndpointEvent::IdentityEstablished { .. })
    })
    .await;

    agent.call(case.clone()).unwrap();
    wait_for(&mut customer_events, |e| {
        matches!(e, EndpointEvent::IncomingInvite { .. })
    })
    .await;
    customer.decline().unwrap();
    wait_for(&mut agent_events, |e| {
        matches!(e, EndpointEvent::CallDeclined)
    })
    .await;

    // the attempt resolved; a fresh invite is allowed
    agent.call(case).unwrap();
    wait_for(&mut customer_events, |e| {
        matches!(e, EndpointEvent::IncomingInvite { .. })
    })
    .await;
}

#[tokio::test]
async fn unanswered_invite_expires_as_missed_call_on_both_sides() {
    init_logging();
    let hub = Arc::new(SignalHub::in_memory());
    let case = DurableId::from("CASE-6");
    let short = Duration::from_millis(100);

    let (customer, mut customer_events) = CallEndpoint::spawn(
        hub.clone(),
        Arc::new(LoopbackPeerTransport),
        Arc::new(NullVerdictSink),
        EndpointConfig::new("Asha").with_invite_timeout(short),
    );
    wait_for(&mut customer_events, |e| {
        matches!(e, EndpointEvent::IdentityEstablished { .. })
    })
    .await;
    customer.bind_identity(case.clone()).unwrap();
    wait_for(&mut customer_events, |e| {
        matches!(e, EndpointEvent::IdentityBound { .. })
    })
    .await;

    let sink = Arc::new(RecordingSink::default());
    let config = EndpointConfig::default().with_invite_timeout(short);
    let (agent, mut agent_events) = spawn_agent(&hub, "Officer Rao", sink, config);
    wait_for(&mut agent_events, |e| {
        matches!(e, EndpointEvent::IdentityEstablished { .. })
    })
    .await;

    agent.call(case).unwrap();
    wait_for(&mut customer_events, |e| {
        matches!(e, EndpointEvent::IncomingInvite { .. })
    })
    .await;

    // nobody answers
    wait_for(&mut agent_events, |e| matches!(e, EndpointEvent::MissedCall)).await;
    wait_for(&mut customer_events, |e| {
        matches!(e, EndpointEvent::MissedCall)
    })
    .await;
}

#[tokio::test]
async fn stalled_negotiation_times_out_and_ends_the_session() {
    init_logging();
    let hub = Arc::new(SignalHub::in_memory());
    let case = DurableId::from("CASE-11");

    // a hand-rolled callee that accepts but never sends its answer
    let (stalled, mut stalled_frames) = hub.connect();
    hub.authenticate(&case, stalled).await.unwrap();

    let sink = Arc::new(RecordingSink::default());
    let config = EndpointConfig {
        negotiation_timeout: Duration::from_millis(150),
        ..Default::default()
    };
    let (agent, mut agent_events) = spawn_agent(&hub, "Officer Rao", sink, config);
    wait_for(&mut agent_events, |e| {
        matches!(e, EndpointEvent::IdentityEstablished { .. })
    })
    .await;

    agent.call(case).unwrap();
    let caller = loop {
        let frame = tokio::time::timeout(Duration::from_secs(2), stalled_frames.recv())
            .await
            .expect("timed out waiting for the invite")
            .expect("relay channel closed");
        if let ServerFrame::Relayed(envelope) = frame {
            assert!(matches!(envelope.message, ControlMessage::Invite { .. }));
            break envelope.from;
        }
    };

    // acceptance without the answer payload leaves negotiation hanging
    hub.route(
        stalled,
        caller,
        ControlMessage::Accept {
            display_name: "Asha".into(),
            payload: None,
            initial_media: MediaFlags::default(),
        },
    );
    wait_for(&mut agent_events, |e| {
        matches!(e, EndpointEvent::CallAccepted { .. })
    })
    .await;

    assert!(matches!(
        wait_for(&mut agent_events, |e| matches!(e, EndpointEvent::CallEnded { .. })).await,
        EndpointEvent::CallEnded {
            reason: EndReason::NegotiationTimeout
        }
    ));
}

#[tokio::test]
async fn peer_disconnect_ends_the_session_for_the_other_side() {
    init_logging();
    let hub = Arc::new(SignalHub::in_memory());
    let case = DurableId::from("CASE-8");

    let (customer, mut customer_events) = spawn_customer(&hub, "Asha");
    wait_for(&mut customer_events, |e| {
        matches!(e, EndpointEvent::IdentityEstablished { .. })
    })
    .await;
    customer.bind_identity(case.clone()).unwrap();
    wait_for(&mut customer_events, |e| {
        matches!(e, EndpointEvent::IdentityBound { .. })
    })
    .await;

    let sink = Arc::new(RecordingSink::default());
    let (agent, mut agent_events) =
        spawn_agent(&hub, "Officer Rao", sink, EndpointConfig::default());
    wait_for(&mut agent_events, |e| {
        matches!(e, EndpointEvent::IdentityEstablished { .. })
    })
    .await;

    agent.call(case).unwrap();
    wait_for(&mut customer_events, |e| {
        matches!(e, EndpointEvent::IncomingInvite { .. })
    })
    .await;
    customer.accept().unwrap();
    wait_for(&mut agent_events, |e| matches!(e, EndpointEvent::CallActive)).await;

    // the customer's transport drops mid-call
    customer.shutdown().unwrap();
    assert!(matches!(
        wait_for(&mut agent_events, |e| matches!(e, EndpointEvent::CallEnded { .. })).await,
        EndpointEvent::CallEnded {
            reason: EndReason::PeerConnectionLost
        }
    ));
}
