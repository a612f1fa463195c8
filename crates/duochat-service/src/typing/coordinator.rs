//! Typing coordinator
//!
//! Drives a [`TypingMachine`] for the local user in one conversation. One
//! task owns the machine and the single expiry timer; callers only send
//! commands, so keystrokes never block on the backend.

use std::sync::Arc;

use duochat_core::{Clock, ConversationId, LivenessError, LivenessResult, TypingSink, UserId};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::machine::{TypingEffect, TypingMachine};
use crate::context::SessionContext;

#[derive(Debug)]
enum Command {
    Input(String),
    Submit,
    Stop,
    Shutdown,
}

/// Handle to the typing driver of one conversation
#[derive(Debug)]
pub struct TypingCoordinator {
    conversation_id: ConversationId,
    user_id: UserId,
    commands: mpsc::UnboundedSender<Command>,
    announcing: watch::Receiver<bool>,
    task: Option<JoinHandle<()>>,
}

impl TypingCoordinator {
    /// Start the driver for the session's identity in `conversation_id`
    pub fn start(ctx: &SessionContext, conversation_id: ConversationId) -> LivenessResult<Self> {
        let user_id = ctx.require_identity()?;
        let (commands, receiver) = mpsc::unbounded_channel();
        let (announcing_tx, announcing) = watch::channel(false);

        let driver = Driver {
            conversation_id,
            user_id,
            sink: ctx.typing_sink().clone(),
            clock: ctx.clock().clone(),
            machine: TypingMachine::new(ctx.typing_config()),
            timer: None,
            announcing: announcing_tx,
        };
        let task = tokio::spawn(driver.run(receiver));

        Ok(Self {
            conversation_id,
            user_id,
            commands,
            announcing,
            task: Some(task),
        })
    }

    pub fn conversation_id(&self) -> ConversationId {
        self.conversation_id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// The composer text changed
    pub fn input(&self, text: impl Into<String>) -> LivenessResult<()> {
        self.send(Command::Input(text.into()))
    }

    /// The message was sent
    pub fn submit(&self) -> LivenessResult<()> {
        self.send(Command::Submit)
    }

    /// Stop announcing without sending
    pub fn stop(&self) -> LivenessResult<()> {
        self.send(Command::Stop)
    }

    /// Whether an announcement is currently out
    pub fn is_announcing(&self) -> bool {
        *self.announcing.borrow()
    }

    /// Tear down: the timer is cancelled and, if announcing, a retraction is
    /// fired without waiting for it. Safe to call more than once.
    pub async fn shutdown(&mut self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    fn send(&self, command: Command) -> LivenessResult<()> {
        self.commands
            .send(command)
            .map_err(|_| LivenessError::SessionClosed)
    }
}

impl Drop for TypingCoordinator {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

struct Driver {
    conversation_id: ConversationId,
    user_id: UserId,
    sink: Arc<dyn TypingSink>,
    clock: Arc<dyn Clock>,
    machine: TypingMachine,
    timer: Option<Instant>,
    announcing: watch::Sender<bool>,
}

impl Driver {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        loop {
            let effects = tokio::select! {
                biased;
                command = commands.recv() => match command {
                    Some(Command::Input(text)) => {
                        tracing::trace!(conversation_id = %self.conversation_id, "Composer input");
                        self.machine.on_input(&text, Instant::now())
                    }
                    Some(Command::Submit) => self.machine.on_submit(),
                    Some(Command::Stop) => self.machine.on_stop(),
                    Some(Command::Shutdown) | None => break,
                },
                () = expiry(self.timer) => {
                    self.timer = None;
                    self.machine.on_deadline(Instant::now())
                }
            };

            self.execute(effects).await;
            self.announcing.send_if_modified(|current| {
                let next = self.machine.is_announcing();
                let changed = *current != next;
                *current = next;
                changed
            });
        }

        self.teardown();
    }

    async fn execute(&mut self, effects: Vec<TypingEffect>) {
        for effect in effects {
            match effect {
                TypingEffect::Publish => {
                    let at = self.clock.now();
                    match self.sink.publish_typing(self.conversation_id, self.user_id, at).await {
                        Ok(()) => tracing::debug!(
                            conversation_id = %self.conversation_id,
                            user_id = %self.user_id,
                            "Typing announced"
                        ),
                        Err(e) => tracing::warn!(
                            conversation_id = %self.conversation_id,
                            error = %e,
                            "Typing publish failed"
                        ),
                    }
                }
                TypingEffect::Retract => {
                    match self.sink.retract_typing(self.conversation_id, self.user_id).await {
                        Ok(()) => tracing::debug!(
                            conversation_id = %self.conversation_id,
                            user_id = %self.user_id,
                            "Typing retracted"
                        ),
                        Err(e) => tracing::warn!(
                            conversation_id = %self.conversation_id,
                            error = %e,
                            "Typing retract failed"
                        ),
                    }
                }
                TypingEffect::ArmTimer(at) => self.timer = Some(at),
                TypingEffect::CancelTimer => self.timer = None,
            }
        }
    }

    fn teardown(&mut self) {
        let was_announcing = self.machine.is_announcing();
        for effect in self.machine.on_teardown() {
            if effect == TypingEffect::CancelTimer {
                self.timer = None;
            }
        }
        self.announcing.send_replace(false);

        if was_announcing {
            // Best effort; the peer's staleness bound covers a lost retraction
            let sink = self.sink.clone();
            let (conversation_id, user_id) = (self.conversation_id, self.user_id);
            tokio::spawn(async move {
                if let Err(e) = sink.retract_typing(conversation_id, user_id).await {
                    tracing::debug!(conversation_id = %conversation_id, error = %e, "Teardown retraction lost");
                }
            });
        }

        tracing::debug!(conversation_id = %self.conversation_id, "Typing coordinator stopped");
    }
}

async fn expiry(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
