//! The per-connection scheduler.
//!
//! [`process`] is re-entered whenever a task was enqueued on a free
//! connection or the event loop reported readiness for the in-flight task.
//! Each call advances the head task by one step; whenever a task reaches a
//! terminal outcome it is dequeued, its completion is delivered, and the
//! next queued task is started immediately. The function never blocks: it
//! returns as soon as the head task waits for I/O or the queue is empty.
//!
//! The wrapped protocol is half-duplex, so the head task is the only task
//! that ever touches the session. Nothing behind it starts until its
//! completion has been delivered.

use std::time::Instant;

use pgq_protocol::Connector;

use crate::action::{self, ActionCx, Failure, Step};
use crate::config::Config;
use crate::connection::{Connection, Event};
use crate::error::{BrokenReason, Error};
use crate::event_loop::{EventLoop, Readiness};
use crate::instrumentation;
use crate::state::ConnectionStatus;
use crate::task::Reply;

/// Why the scheduler was entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// A task was enqueued (or the caller just wants the queue looked at).
    Kick,
    /// The event loop reported readiness for this connection.
    Ready(Readiness),
}

/// Collaborators the scheduler drives a connection with.
pub struct Context<'a, C, L> {
    /// Session factory for CONNECT tasks.
    pub connector: &'a C,
    /// Readiness registration.
    pub event_loop: &'a L,
    /// Timeouts and log settings.
    pub config: &'a Config,
}

/// Advance `conn` as far as possible without blocking.
pub fn process<C, L>(conn: &mut Connection<C::Session>, cx: &Context<'_, C, L>, trigger: Trigger)
where
    C: Connector,
    L: EventLoop,
{
    let mut readiness = match trigger {
        Trigger::Kick => None,
        Trigger::Ready(readiness) => Some(readiness),
    };

    loop {
        if conn.status == ConnectionStatus::Broken {
            fail_queued(conn);
            return;
        }

        let Some(task) = conn.queue.front() else {
            conn.status = ConnectionStatus::Free;
            conn.deadline = None;
            return;
        };
        let span = instrumentation::task_span(conn.id, task, &cx.config.sanitization);
        let _guard = span.enter();

        let mut action_cx = ActionCx {
            session: &mut conn.session,
            deadline: &mut conn.deadline,
            connector: cx.connector,
        };

        let step = if conn.status == ConnectionStatus::Free {
            let action = task.action();
            conn.status = ConnectionStatus::in_flight(action);
            conn.started_at = Some(Instant::now());
            *action_cx.deadline = cx
                .config
                .timeouts
                .for_action(action)
                .map(|timeout| Instant::now() + timeout);
            tracing::debug!(connection = %conn.id, status = %conn.status, "task started");
            action::begin(&mut action_cx, task)
        } else {
            match readiness.take() {
                Some(Readiness::TimedOut) => {
                    let after = conn.started_at.map(|t| t.elapsed()).unwrap_or_default();
                    tracing::warn!(connection = %conn.id, ?after, "task deadline passed");
                    Step::Failed(Failure::Fatal(BrokenReason::TimedOut(after)))
                }
                Some(ready) => {
                    tracing::trace!(connection = %conn.id, ?ready, "advancing task");
                    action::advance(&mut action_cx, task)
                }
                // Kicked while a task is in flight: the event loop will
                // re-enter once the socket is ready.
                None => return,
            }
        };
        // Any readiness belonged to the task that just stepped; a task
        // started later in this call has to wait for its own event.
        readiness = None;

        match step {
            Step::Pending(interest) => {
                match conn.session.as_ref().map(pgq_protocol::Session::socket) {
                    Some(socket) => {
                        tracing::trace!(connection = %conn.id, %socket, ?interest, "waiting for socket");
                        cx.event_loop.watch(conn.id, socket, interest, conn.deadline);
                        return;
                    }
                    None => {
                        let reason =
                            BrokenReason::Protocol("pending task without a session".to_string());
                        fail_head(conn, cx, reason);
                    }
                }
            }
            Step::Done(reply) => finish_head(conn, cx, Ok(reply)),
            Step::Failed(Failure::Task(err)) => {
                tracing::debug!(connection = %conn.id, error = %err, "task failed");
                finish_head(conn, cx, Err(err));
            }
            Step::Failed(Failure::Fatal(reason)) => fail_head(conn, cx, reason),
        }
    }
}

/// Dequeue the head task, mark the connection free and report the outcome.
fn finish_head<C: Connector, L: EventLoop>(
    conn: &mut Connection<C::Session>,
    cx: &Context<'_, C, L>,
    outcome: Result<Reply, Error>,
) {
    let Some(task) = conn.queue.pop_front() else {
        return;
    };
    cx.event_loop.unwatch(conn.id);
    conn.status = ConnectionStatus::Free;
    conn.deadline = None;
    conn.started_at = None;

    let completion = task.complete(outcome);
    tracing::debug!(
        connection = %conn.id,
        task = %completion.task_id,
        action = %completion.action,
        ok = completion.is_ok(),
        remaining = conn.queue.len(),
        "task completed"
    );
    conn.notify(Event::Completed(completion));
}

/// Break the connection, fail the head task and announce the transition.
fn fail_head<C: Connector, L: EventLoop>(
    conn: &mut Connection<C::Session>,
    cx: &Context<'_, C, L>,
    reason: BrokenReason,
) {
    tracing::warn!(
        connection = %conn.id,
        reason = %reason,
        queued = conn.queue.len(),
        "connection broken"
    );
    cx.event_loop.unwatch(conn.id);
    conn.status = ConnectionStatus::Broken;
    conn.deadline = None;
    conn.started_at = None;
    conn.session = None;
    conn.broken = Some(reason.clone());

    if let Some(task) = conn.queue.pop_front() {
        let completion = task.complete(Err(Error::ConnectionBroken(reason.clone())));
        conn.notify(Event::Completed(completion));
    }
    conn.notify(Event::Broken { reason });
}

/// Fail every queued task of a broken connection, in FIFO order.
fn fail_queued<S>(conn: &mut Connection<S>) {
    let reason = conn.broken.clone().unwrap_or(BrokenReason::Closed);
    while let Some(task) = conn.queue.pop_front() {
        tracing::debug!(connection = %conn.id, task = %task.id(), "failing task on broken connection");
        let completion = task.complete(Err(Error::ConnectionBroken(reason.clone())));
        conn.notify(Event::Completed(completion));
    }
}
