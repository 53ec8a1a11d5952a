//! Call endpoint actor
//!
//! One [`CallEndpoint`] per connected party. The endpoint owns its
//! session state machine and processes inputs strictly in arrival
//! order: relayed frames and local commands are consumed by a single
//! task, so concurrent transitions on the same state are impossible by
//! construction. The two endpoints of a call share no memory; all
//! coordination flows through the signaling hub.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use vkyc_signal_core::{
    ConnectionHandle, ControlMessage, DurableId, MediaFlags, MediaKind, MediaToggle, RouteOutcome,
    ServerFrame, SignalHub,
};

use crate::config::EndpointConfig;
use crate::error::{SessionError, SessionResult};
use crate::events::{EndReason, EndpointEvent};
use crate::identity::{establish_identity, OnceLatch};
use crate::media::MediaChannel;
use crate::negotiation::{CallRole, NegotiationCoordinator, PeerTransport};
use crate::state::{next_state, SessionInput, SessionState, Transition};
use crate::verdict::{CapturedArtifact, Decision, VerdictSink, VerdictTrigger};

/// Local user actions accepted by an endpoint.
#[derive(Debug)]
pub enum EndpointCommand {
    /// Publish the durable case identifier for this connection
    BindIdentity { durable_id: DurableId },
    /// Invite the party owning `target`
    Call { target: DurableId },
    /// Accept the ringing invite
    Accept,
    /// Decline the ringing invite
    Decline,
    /// Hang up the current call attempt
    EndCall,
    /// Send an in-call chat line
    SendChat { text: String },
    /// Toggle a local media track
    SetMedia { kind: MediaKind, enabled: bool },
    /// Record a moment-in-time capture taken during the session
    CaptureArtifact { artifact: CapturedArtifact },
    /// Record the business decision after the session ended
    SubmitVerdict { decision: Decision, remarks: String },
    /// Disconnect and stop the endpoint task
    Shutdown,
}

enum Input {
    Command(EndpointCommand),
    AutoInvite { target: DurableId },
    InviteExpired { generation: u64 },
    NegotiationExpired { generation: u64 },
}

/// Handle to a running endpoint task.
#[derive(Clone)]
pub struct CallEndpoint {
    inputs: mpsc::UnboundedSender<Input>,
}

impl CallEndpoint {
    /// Connect to the hub and start the endpoint task.
    ///
    /// Returns the command handle and the stream of
    /// [`EndpointEvent`]s for the application layer.
    pub fn spawn(
        hub: Arc<SignalHub>,
        peer: Arc<dyn PeerTransport>,
        sink: Arc<dyn VerdictSink>,
        config: EndpointConfig,
    ) -> (Self, mpsc::UnboundedReceiver<EndpointEvent>) {
        let (handle, frames) = hub.connect();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (input_tx, input_rx) = mpsc::unbounded_channel();

        let task = EndpointTask {
            hub,
            peer,
            sink,
            config,
            events: event_tx,
            inputs: input_tx.clone(),
            handle,
            state: SessionState::Idle,
            generation: 0,
            media: MediaFlags::default(),
            call: None,
            identity_latch: OnceLatch::new(),
            auto_invite_latch: OnceLatch::new(),
        };
        tokio::spawn(task.run(frames, input_rx));

        (Self { inputs: input_tx }, event_rx)
    }

    fn send(&self, command: EndpointCommand) -> SessionResult<()> {
        self.inputs
            .send(Input::Command(command))
            .map_err(|_| SessionError::ChannelClosed)
    }

    pub fn bind_identity(&self, durable_id: DurableId) -> SessionResult<()> {
        self.send(EndpointCommand::BindIdentity { durable_id })
    }

    pub fn call(&self, target: DurableId) -> SessionResult<()> {
        self.send(EndpointCommand::Call { target })
    }

    pub fn accept(&self) -> SessionResult<()> {
        self.send(EndpointCommand::Accept)
    }

    pub fn decline(&self) -> SessionResult<()> {
        self.send(EndpointCommand::Decline)
    }

    pub fn end_call(&self) -> SessionResult<()> {
        self.send(EndpointCommand::EndCall)
    }

    pub fn send_chat(&self, text: impl Into<String>) -> SessionResult<()> {
        self.send(EndpointCommand::SendChat { text: text.into() })
    }

    pub fn set_media(&self, kind: MediaKind, enabled: bool) -> SessionResult<()> {
        self.send(EndpointCommand::SetMedia { kind, enabled })
    }

    pub fn capture_artifact(&self, artifact: CapturedArtifact) -> SessionResult<()> {
        self.send(EndpointCommand::CaptureArtifact { artifact })
    }

    pub fn submit_verdict(&self, decision: Decision, remarks: impl Into<String>) -> SessionResult<()> {
        self.send(EndpointCommand::SubmitVerdict {
            decision,
            remarks: remarks.into(),
        })
    }

    pub fn shutdown(&self) -> SessionResult<()> {
        self.send(EndpointCommand::Shutdown)
    }
}

/// State for one call attempt. Replaced wholesale when a fresh attempt
/// begins; the session state machine never restarts in place.
struct CallContext {
    peer_handle: ConnectionHandle,
    remote_name: Option<String>,
    /// Durable case identifier of the remote party, known on the
    /// caller side from resolution
    case_id: Option<DurableId>,
    negotiation: NegotiationCoordinator,
    media: MediaChannel,
    pending_offer: Option<serde_json::Value>,
    artifact: Option<CapturedArtifact>,
    verdict: VerdictTrigger,
}

impl CallContext {
    fn new(
        role: CallRole,
        peer_handle: ConnectionHandle,
        case_id: Option<DurableId>,
        media: MediaFlags,
    ) -> Self {
        Self {
            peer_handle,
            remote_name: None,
            case_id,
            negotiation: NegotiationCoordinator::new(role),
            media: MediaChannel::new(media),
            pending_offer: None,
            artifact: None,
            verdict: VerdictTrigger::new(),
        }
    }
}

struct EndpointTask {
    hub: Arc<SignalHub>,
    peer: Arc<dyn PeerTransport>,
    sink: Arc<dyn VerdictSink>,
    config: EndpointConfig,
    events: mpsc::UnboundedSender<EndpointEvent>,
    inputs: mpsc::UnboundedSender<Input>,
    handle: ConnectionHandle,
    state: SessionState,
    /// Bumped whenever the current attempt resolves; timers carry the
    /// generation they were armed under and stale ones are ignored
    generation: u64,
    /// Baseline media flags carried into the next call attempt
    media: MediaFlags,
    call: Option<CallContext>,
    identity_latch: OnceLatch,
    auto_invite_latch: OnceLatch,
}

impl EndpointTask {
    async fn run(
        mut self,
        mut frames: mpsc::UnboundedReceiver<ServerFrame>,
        mut inputs: mpsc::UnboundedReceiver<Input>,
    ) {
        self.media = self.config.media;

        let mut pending = Vec::new();
        let identity = establish_identity(
            &mut frames,
            self.handle,
            self.config.identity_wait,
            &self.identity_latch,
            &mut pending,
        )
        .await;
        self.handle = identity.handle;
        self.emit(EndpointEvent::IdentityEstablished {
            handle: identity.handle,
            degraded: identity.degraded,
        });
        self.schedule_auto_invite();
        for frame in pending {
            self.on_frame(frame).await;
        }

        loop {
            tokio::select! {
                frame = frames.recv() => match frame {
                    Some(frame) => self.on_frame(frame).await,
                    None => break,
                },
                input = inputs.recv() => match input {
                    Some(Input::Command(EndpointCommand::Shutdown)) => {
                        if let Err(err) = self.hub.disconnect(self.handle).await {
                            warn!(handle = %self.handle, %err, "disconnect failed during shutdown");
                        }
                        break;
                    }
                    Some(input) => self.on_input(input).await,
                    None => break,
                },
            }
        }
        debug!(handle = %self.handle, "endpoint task stopped");
    }

    fn emit(&self, event: EndpointEvent) {
        let _ = self.events.send(event);
    }

    /// Apply one input to the state machine. Invalid inputs are logged
    /// and dropped; they never fault the machine.
    fn apply(&mut self, input: SessionInput) -> Option<SessionState> {
        match next_state(self.state, input) {
            Transition::To(next) => {
                debug!(handle = %self.handle, from = %self.state, to = %next, %input, "session transition");
                self.state = next;
                Some(next)
            }
            Transition::NoOp => {
                debug!(handle = %self.handle, %input, "duplicate terminal input ignored");
                None
            }
            Transition::Invalid => {
                warn!(handle = %self.handle, state = %self.state, %input, "invalid transition rejected");
                None
            }
        }
    }

    fn schedule_auto_invite(&self) {
        let Some(target) = self.config.auto_invite_target.clone() else {
            return;
        };
        // exactly once per endpoint lifetime, regardless of how many
        // identity assignments are observed
        if !self.auto_invite_latch.fire() {
            return;
        }
        let inputs = self.inputs.clone();
        let delay = self.config.auto_invite_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = inputs.send(Input::AutoInvite { target });
        });
    }

    fn arm_invite_timer(&self) {
        let inputs = self.inputs.clone();
        let generation = self.generation;
        let timeout = self.config.invite_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let _ = inputs.send(Input::InviteExpired { generation });
        });
    }

    fn arm_negotiation_timer(&self) {
        let inputs = self.inputs.clone();
        let generation = self.generation;
        let timeout = self.config.negotiation_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let _ = inputs.send(Input::NegotiationExpired { generation });
        });
    }

    async fn on_input(&mut self, input: Input) {
        match input {
            Input::Command(command) => self.on_command(command).await,
            Input::AutoInvite { target } => {
                if self.state == SessionState::Idle {
                    info!(handle = %self.handle, %target, "auto-invite firing");
                    self.start_call(target).await;
                } else {
                    debug!(state = %self.state, "auto-invite skipped, endpoint not idle");
                }
            }
            Input::InviteExpired { generation } => self.on_invite_expired(generation),
            Input::NegotiationExpired { generation } => {
                self.on_negotiation_expired(generation).await
            }
        }
    }

    async fn on_command(&mut self, command: EndpointCommand) {
        match command {
            EndpointCommand::BindIdentity { durable_id } => {
                match self.hub.authenticate(&durable_id, self.handle).await {
                    Ok(()) => self.emit(EndpointEvent::IdentityBound { durable_id }),
                    Err(err) => warn!(%durable_id, %err, "identity bind failed"),
                }
            }
            EndpointCommand::Call { target } => {
                if self.state == SessionState::Ended {
                    // a fresh attempt needs a fresh state instance
                    self.reset_attempt();
                }
                if self.state != SessionState::Idle {
                    warn!(state = %self.state, "second invite rejected locally, one call attempt per endpoint");
                    return;
                }
                self.start_call(target).await;
            }
            EndpointCommand::Accept => self.on_local_accept().await,
            EndpointCommand::Decline => {
                if self.state != SessionState::Ringing {
                    warn!(state = %self.state, "decline ignored, nothing is ringing");
                    return;
                }
                self.decline_ringing();
            }
            EndpointCommand::EndCall => self.on_local_end().await,
            EndpointCommand::SendChat { text } => self.on_send_chat(text),
            EndpointCommand::SetMedia { kind, enabled } => self.on_set_media(kind, enabled),
            EndpointCommand::CaptureArtifact { artifact } => {
                if self.state == SessionState::Active {
                    if let Some(call) = self.call.as_mut() {
                        debug!(reference = %artifact.reference.0, "artifact captured");
                        call.artifact = Some(artifact);
                    }
                } else {
                    warn!(state = %self.state, "artifact capture outside an active session ignored");
                }
            }
            EndpointCommand::SubmitVerdict { decision, remarks } => {
                self.on_submit_verdict(decision, remarks).await
            }
            // intercepted by the run loop before dispatch
            EndpointCommand::Shutdown => {}
        }
    }

    async fn start_call(&mut self, target: DurableId) {
        let peer_handle = match self.hub.resolve(&target).await {
            Ok(handle) => handle,
            Err(err) => {
                warn!(%target, %err, "target not currently connected");
                self.emit(EndpointEvent::PeerUnreachable { durable_id: target });
                return;
            }
        };
        let offer = match self.peer.create_offer().await {
            Ok(offer) => offer,
            Err(err) => {
                warn!(%err, "peer transport could not produce an offer");
                self.emit(EndpointEvent::CallFailed {
                    reason: err.to_string(),
                });
                return;
            }
        };

        let outcome = self.hub.route(
            self.handle,
            peer_handle,
            ControlMessage::Invite {
                display_name: self.config.display_name.clone(),
                payload: Some(offer),
            },
        );
        if outcome == RouteOutcome::TargetGone {
            warn!(%target, "target handle went away before the invite was routed");
            self.emit(EndpointEvent::PeerUnreachable { durable_id: target });
            return;
        }

        self.apply(SessionInput::SendInvite);
        let mut call = CallContext::new(CallRole::Caller, peer_handle, Some(target), self.media);
        // the offer travelled with the invite
        let _ = call.negotiation.record_offer();
        self.call = Some(call);
        self.generation += 1;
        self.arm_invite_timer();
    }

    async fn on_local_accept(&mut self) {
        if self.state != SessionState::Ringing {
            warn!(state = %self.state, "accept ignored, nothing is ringing");
            return;
        }
        let Some(call) = self.call.as_mut() else {
            return;
        };
        let Some(offer) = call.pending_offer.take() else {
            warn!("accept before the offer payload arrived, still waiting");
            return;
        };

        self.apply(SessionInput::LocalAccept);
        let Some(call) = self.call.as_mut() else {
            return;
        };
        call.negotiation.mark_accepted();

        let answer = match self.peer.answer_offer(&offer).await {
            Ok(answer) => answer,
            Err(err) => {
                self.fail_negotiation(err.to_string()).await;
                return;
            }
        };
        let Some(call) = self.call.as_mut() else {
            return;
        };
        if let Err(err) = call.negotiation.record_answer() {
            warn!(%err, "answer payload rejected");
            return;
        }

        let outcome = self.hub.route(
            self.handle,
            call.peer_handle,
            ControlMessage::Accept {
                display_name: self.config.display_name.clone(),
                payload: Some(answer),
                initial_media: call.media.local(),
            },
        );
        if outcome == RouteOutcome::TargetGone {
            self.on_peer_lost();
            return;
        }

        if self.call.as_ref().is_some_and(|c| c.negotiation.is_complete()) {
            // the acceptor's starting flags travelled in the accept
            // frame, so no extra sync is pushed here
            self.enter_active(false);
        }
    }

    fn decline_ringing(&mut self) {
        if let Some(call) = self.call.as_ref() {
            let _ = self
                .hub
                .route(self.handle, call.peer_handle, ControlMessage::Decline);
        }
        self.apply(SessionInput::LocalDecline);
        self.clear_attempt();
    }

    async fn on_local_end(&mut self) {
        match self.state {
            SessionState::Ringing => self.decline_ringing(),
            SessionState::Inviting | SessionState::Negotiating | SessionState::Active => {
                if let Some(call) = self.call.as_ref() {
                    let _ = self
                        .hub
                        .route(self.handle, call.peer_handle, ControlMessage::EndCall);
                }
                self.apply(SessionInput::LocalEndCall);
                self.finish_call(EndReason::Local).await;
            }
            _ => warn!(state = %self.state, "end-call ignored, no call attempt"),
        }
    }

    fn on_send_chat(&mut self, text: String) {
        if self.state != SessionState::Active {
            warn!(state = %self.state, "chat dropped outside an active session");
            return;
        }
        let Some(call) = self.call.as_mut() else {
            return;
        };
        call.media.push_sent(&self.config.display_name, &text);
        let outcome = self.hub.route(
            self.handle,
            call.peer_handle,
            ControlMessage::ChatText {
                text,
                sender_name: self.config.display_name.clone(),
            },
        );
        if outcome == RouteOutcome::TargetGone {
            self.on_peer_lost();
        }
    }

    fn on_set_media(&mut self, kind: MediaKind, enabled: bool) {
        // the baseline is kept current so the next attempt starts from
        // the user's latest choice
        match kind {
            MediaKind::Audio => self.media.mic = enabled,
            MediaKind::Video => self.media.video = enabled,
            MediaKind::Both => {
                self.media.mic = enabled;
                self.media.video = enabled;
            }
        }
        let active = self.state == SessionState::Active;
        if let Some(call) = self.call.as_mut() {
            let message = call.media.toggle_local(kind, enabled);
            if active {
                let peer_handle = call.peer_handle;
                if self.hub.route(self.handle, peer_handle, message) == RouteOutcome::TargetGone {
                    self.on_peer_lost();
                }
            }
        }
    }

    async fn on_submit_verdict(&mut self, decision: Decision, remarks: String) {
        if self.state != SessionState::Ended {
            warn!(state = %self.state, "verdict requested before the session ended");
            self.emit(EndpointEvent::VerdictRejected {
                reason: SessionError::SessionNotEnded.to_string(),
            });
            return;
        }
        let Some(call) = self.call.as_ref() else {
            self.emit(EndpointEvent::VerdictRejected {
                reason: SessionError::NoCaseBound.to_string(),
            });
            return;
        };
        let Some(case_id) = call.case_id.clone() else {
            warn!("no durable case is associated with this session");
            self.emit(EndpointEvent::VerdictRejected {
                reason: SessionError::NoCaseBound.to_string(),
            });
            return;
        };

        match call
            .verdict
            .fire(
                self.sink.as_ref(),
                &case_id,
                decision,
                &remarks,
                call.artifact.as_ref(),
            )
            .await
        {
            Ok(()) => self.emit(EndpointEvent::VerdictSubmitted {
                durable_id: case_id,
            }),
            Err(err) => {
                warn!(%err, "verdict handoff rejected");
                self.emit(EndpointEvent::VerdictRejected {
                    reason: err.to_string(),
                });
            }
        }
    }

    async fn on_frame(&mut self, frame: ServerFrame) {
        match frame {
            ServerFrame::IdentityAssigned { handle } => {
                if self.identity_latch.fire() {
                    self.handle = handle;
                } else {
                    debug!(%handle, "duplicate identity assignment ignored");
                }
                self.schedule_auto_invite();
            }
            ServerFrame::PeerDisconnected { handle } => {
                let is_peer = self
                    .call
                    .as_ref()
                    .is_some_and(|call| call.peer_handle == handle);
                if is_peer {
                    self.on_peer_lost();
                }
            }
            ServerFrame::Relayed(envelope) => {
                self.on_message(envelope.from, envelope.message).await
            }
        }
    }

    async fn on_message(&mut self, from: ConnectionHandle, message: ControlMessage) {
        match message {
            ControlMessage::Invite {
                display_name,
                payload,
            } => self.on_invite(from, display_name, payload),
            ControlMessage::Accept {
                display_name,
                payload,
                initial_media,
            } => self.on_accept(from, display_name, payload, initial_media).await,
            ControlMessage::Decline => self.on_decline(from),
            ControlMessage::NegotiationPayload { payload } => {
                self.on_negotiation_payload(from, payload).await
            }
            ControlMessage::MediaStatus { kind, toggle } => self.on_media_status(from, kind, toggle),
            ControlMessage::ChatText { text, sender_name } => self.on_chat(from, text, sender_name),
            ControlMessage::EndCall => self.on_end_call(from),
        }
    }

    fn on_invite(
        &mut self,
        from: ConnectionHandle,
        display_name: String,
        payload: Option<serde_json::Value>,
    ) {
        if self.state == SessionState::Ended {
            self.reset_attempt();
        }
        if self.state != SessionState::Idle {
            warn!(state = %self.state, %from, "invite while busy dropped");
            return;
        }
        self.apply(SessionInput::ReceiveInvite);
        let mut call = CallContext::new(CallRole::Callee, from, None, self.media);
        call.remote_name = Some(display_name.clone());
        if let Some(offer) = payload {
            let _ = call.negotiation.record_offer();
            call.pending_offer = Some(offer);
        }
        self.call = Some(call);
        self.generation += 1;
        self.arm_invite_timer();
        self.emit(EndpointEvent::IncomingInvite { from, display_name });
    }

    async fn on_accept(
        &mut self,
        from: ConnectionHandle,
        display_name: String,
        payload: Option<serde_json::Value>,
        initial_media: MediaFlags,
    ) {
        let expected = self.state == SessionState::Inviting
            && self.call.as_ref().is_some_and(|c| c.peer_handle == from);
        if !expected {
            warn!(state = %self.state, %from, "unexpected accept dropped");
            return;
        }
        self.apply(SessionInput::ReceiveAccept);
        let Some(call) = self.call.as_mut() else {
            return;
        };
        call.negotiation.mark_accepted();
        call.remote_name = Some(display_name.clone());
        call.media.set_remote(initial_media);
        self.emit(EndpointEvent::CallAccepted { display_name });

        match payload {
            Some(answer) => self.consume_answer(answer).await,
            None => {
                // answer travels in a standalone payload frame
                self.generation += 1;
                self.arm_negotiation_timer();
            }
        }
    }

    /// Caller side: apply the answer-direction payload and complete
    /// the handshake if both directions are now accounted for.
    async fn consume_answer(&mut self, answer: serde_json::Value) {
        if let Err(err) = self.peer.apply_answer(&answer).await {
            self.fail_negotiation(err.to_string()).await;
            return;
        }
        let complete = {
            let Some(call) = self.call.as_mut() else {
                return;
            };
            if let Err(err) = call.negotiation.record_answer() {
                warn!(%err, "answer payload rejected");
                return;
            }
            call.negotiation.is_complete()
        };
        if complete {
            self.enter_active(true);
        }
    }

    fn on_decline(&mut self, from: ConnectionHandle) {
        let expected = self.state == SessionState::Inviting
            && self.call.as_ref().is_some_and(|c| c.peer_handle == from);
        if !expected {
            warn!(state = %self.state, %from, "unexpected decline dropped");
            return;
        }
        self.apply(SessionInput::ReceiveDecline);
        self.clear_attempt();
        self.emit(EndpointEvent::CallDeclined);
    }

    async fn on_negotiation_payload(&mut self, from: ConnectionHandle, payload: serde_json::Value) {
        let from_peer = self.call.as_ref().is_some_and(|c| c.peer_handle == from);
        if !from_peer {
            warn!(%from, "negotiation payload from a non-peer dropped");
            return;
        }
        let role = self.call.as_ref().map(|c| c.negotiation.role());
        match (self.state, role) {
            (SessionState::Negotiating, Some(CallRole::Caller)) => {
                self.consume_answer(payload).await;
            }
            (SessionState::Ringing, Some(CallRole::Callee)) => {
                let Some(call) = self.call.as_mut() else {
                    return;
                };
                if call.pending_offer.is_some() {
                    warn!("duplicate offer payload dropped");
                    return;
                }
                let _ = call.negotiation.record_offer();
                call.pending_offer = Some(payload);
            }
            // nothing may resurrect a cancelled or ended session
            _ => debug!(state = %self.state, "negotiation payload dropped"),
        }
    }

    fn on_media_status(&mut self, from: ConnectionHandle, kind: MediaKind, toggle: MediaToggle) {
        let from_peer = self.call.as_ref().is_some_and(|c| c.peer_handle == from);
        if self.state != SessionState::Active || !from_peer {
            debug!(state = %self.state, "media status outside an active session dropped");
            return;
        }
        let Some(call) = self.call.as_mut() else {
            return;
        };
        let flags = call.media.apply_remote(kind, toggle);
        self.emit(EndpointEvent::PeerMediaChanged { flags });
    }

    fn on_chat(&mut self, from: ConnectionHandle, text: String, sender_name: String) {
        let from_peer = self.call.as_ref().is_some_and(|c| c.peer_handle == from);
        if self.state != SessionState::Active || !from_peer {
            debug!(state = %self.state, "chat outside an active session dropped");
            return;
        }
        let Some(call) = self.call.as_mut() else {
            return;
        };
        call.media.push_received(&sender_name, &text);
        self.emit(EndpointEvent::ChatReceived {
            sender_name,
            text,
            at: chrono::Utc::now(),
        });
    }

    fn on_end_call(&mut self, from: ConnectionHandle) {
        let from_peer = self.call.as_ref().is_some_and(|c| c.peer_handle == from);
        if self.state.in_call() && !from_peer {
            warn!(%from, "end-call from a non-peer dropped");
            return;
        }
        match next_state(self.state, SessionInput::ReceiveEndCall) {
            Transition::To(_) => {
                self.apply(SessionInput::ReceiveEndCall);
                self.finish_call_sync(EndReason::Remote);
            }
            Transition::NoOp => {
                debug!("duplicate end-call ignored, session already ended");
            }
            Transition::Invalid => {
                debug!(state = %self.state, "end-call with no session ignored");
            }
        }
    }

    fn on_peer_lost(&mut self) {
        if self.apply(SessionInput::PeerConnectionLost).is_some() {
            self.finish_call_sync(EndReason::PeerConnectionLost);
        }
    }

    fn on_invite_expired(&mut self, generation: u64) {
        if generation != self.generation {
            return;
        }
        match self.state {
            SessionState::Inviting | SessionState::Ringing => {
                self.apply(SessionInput::InviteTimeout);
                self.clear_attempt();
                info!(handle = %self.handle, "invite expired unanswered");
                self.emit(EndpointEvent::MissedCall);
            }
            _ => {}
        }
    }

    async fn on_negotiation_expired(&mut self, generation: u64) {
        if generation != self.generation || self.state != SessionState::Negotiating {
            return;
        }
        warn!(handle = %self.handle, "negotiation did not finish in time");
        if let Some(call) = self.call.as_ref() {
            let _ = self
                .hub
                .route(self.handle, call.peer_handle, ControlMessage::EndCall);
        }
        self.apply(SessionInput::NegotiationFailed);
        self.finish_call(EndReason::NegotiationTimeout).await;
    }

    async fn fail_negotiation(&mut self, reason: String) {
        warn!(%reason, "negotiation failed, ending session");
        if let Some(call) = self.call.as_ref() {
            let _ = self
                .hub
                .route(self.handle, call.peer_handle, ControlMessage::EndCall);
        }
        self.apply(SessionInput::NegotiationFailed);
        self.finish_call(EndReason::NegotiationFailed).await;
    }

    fn enter_active(&mut self, push_sync: bool) {
        self.generation += 1;
        if self.apply(SessionInput::NegotiationComplete).is_none() {
            return;
        }
        self.emit(EndpointEvent::CallActive);
        if push_sync {
            if let Some(call) = self.call.as_ref() {
                let _ = self
                    .hub
                    .route(self.handle, call.peer_handle, call.media.initial_sync());
            }
        }
    }

    /// Session resolved to `Ended`. The call context survives so the
    /// verdict can still be recorded against it.
    fn finish_call_sync(&mut self, reason: EndReason) {
        self.generation += 1;
        if let Some(call) = self.call.as_mut() {
            call.negotiation.cancel();
        }
        let peer = self.peer.clone();
        tokio::spawn(async move { peer.close().await });
        self.emit(EndpointEvent::CallEnded { reason });
    }

    async fn finish_call(&mut self, reason: EndReason) {
        self.generation += 1;
        if let Some(call) = self.call.as_mut() {
            call.negotiation.cancel();
        }
        self.peer.close().await;
        self.emit(EndpointEvent::CallEnded { reason });
    }

    /// Attempt resolved back to `Idle`; the context is destroyed.
    fn clear_attempt(&mut self) {
        self.generation += 1;
        self.call = None;
    }

    /// Fresh state instance for a fresh attempt after `Ended`.
    fn reset_attempt(&mut self) {
        debug!(handle = %self.handle, "starting a fresh session state");
        self.generation += 1;
        self.call = None;
        self.state = SessionState::Idle;
    }
}
