// Ties a StreamConsumer to the session's authentication state.

use shop_models::{OrderSnapshot, UserId};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::consumer::{ConsumerExit, StreamConsumer};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthState {
    pub user: Option<UserId>,
    pub loading: bool,
}

impl AuthState {
    pub fn loading() -> Self {
        Self {
            user: None,
            loading: true,
        }
    }

    pub fn signed_in(user: UserId) -> Self {
        Self {
            user: Some(user),
            loading: false,
        }
    }

    pub fn signed_out() -> Self {
        Self::default()
    }

    /// A stream may only be opened for a resolved, signed-in session.
    pub fn is_ready(&self) -> bool {
        !self.loading && self.user.is_some()
    }
}

pub type UpdateCallback = Arc<dyn Fn(OrderSnapshot) + Send + Sync>;

struct ActiveRun {
    cancel: CancellationToken,
    task: JoinHandle<ConsumerExit>,
}

impl ActiveRun {
    async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            tracing::warn!("order stream task ended abnormally: {}", e);
        }
    }
}

/// Keeps at most one order stream open for the current session.
///
/// Every change of the auth state cancels the running stream (and waits for
/// it) before a new one is opened. A stream that ends on its own is not
/// reopened until the auth state changes again.
pub struct SessionStream {
    shutdown: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl SessionStream {
    pub fn spawn<F>(consumer: Arc<StreamConsumer>, auth: watch::Receiver<AuthState>, on_update: F) -> Self
    where
        F: Fn(OrderSnapshot) + Send + Sync + 'static,
    {
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(supervise(consumer, auth, Arc::new(on_update), shutdown.clone()));

        Self {
            shutdown,
            task: Some(task),
        }
    }

    /// Cancels the running stream and waits until it is gone.
    pub async fn shutdown(mut self) {
        self.shutdown.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!("session stream supervisor ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for SessionStream {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn supervise(
    consumer: Arc<StreamConsumer>,
    mut auth: watch::Receiver<AuthState>,
    on_update: UpdateCallback,
    shutdown: CancellationToken,
) {
    let mut active: Option<ActiveRun> = None;
    let mut current: Option<AuthState> = None;

    loop {
        let state = auth.borrow_and_update().clone();

        if current.as_ref() != Some(&state) {
            if let Some(run) = active.take() {
                run.stop().await;
            }

            if state.is_ready() {
                tracing::debug!(user = ?state.user, "activating order stream");
                let cancel = shutdown.child_token();
                let token = cancel.clone();
                let consumer = Arc::clone(&consumer);
                let on_update = Arc::clone(&on_update);
                let task = tokio::spawn(async move { consumer.run(&token, |order| on_update(order)).await });
                active = Some(ActiveRun { cancel, task });
            } else {
                tracing::debug!(loading = state.loading, "session not ready, order stream idle");
            }
            current = Some(state);
        }

        tokio::select! {
            _ = shutdown.cancelled() => break,
            changed = auth.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    if let Some(run) = active.take() {
        run.stop().await;
    }
}
