//! Subscription engine
//!
//! Races two producers inside a single stream:
//!
//! - a status poll that runs the status query every tick until it reports a
//!   terminal status, and
//! - a timeout watch that sleeps until the destination clock could have passed
//!   the timeout, then polls the destination until it has.
//!
//! Output never regresses: an item is yielded only if its milestone is
//! strictly greater than the last yielded one. Nothing is spawned, so
//! dropping the stream drops both producers and their timers.

use futures::future::{self, BoxFuture, FutureExt};
use futures::stream::{self, BoxStream, StreamExt};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

use crate::error::TrackerError;
use crate::indexer::EventHistory;
use crate::route::Route;
use crate::status::query_status;
use crate::types::{Message, MessageStatus};

/// Stream of status changes; an `Err` item is terminal
pub type StatusStream = BoxStream<'static, Result<MessageStatus, TrackerError>>;

struct PollState {
    route: Route,
    indexer: Option<Arc<dyn EventHistory>>,
    message: Message,
    reference_height: u64,
    poll_interval: Duration,
    first: bool,
    done: bool,
}

/// Status poll producer: one item per tick, ending after a terminal status or error
fn status_poll(state: PollState) -> StatusStream {
    stream::unfold(state, |mut state| async move {
        if state.done {
            return None;
        }
        if !state.first {
            tokio::time::sleep(state.poll_interval).await;
        }
        state.first = false;

        let result = query_status(
            &state.route,
            state.indexer.as_deref(),
            &state.message,
            state.reference_height,
        )
        .await;
        state.done = match &result {
            Ok(status) => status.is_terminal(),
            Err(_) => true,
        };
        Some((result, state))
    })
    .boxed()
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Timeout watch producer: resolves once the target clock passes the timeout
/// with no delivery on the target. Never resolves for a zero timeout.
fn timeout_watch(
    route: Route,
    message: Message,
    poll_interval: Duration,
) -> BoxFuture<'static, Result<(), TrackerError>> {
    let timeout = message.timeout_timestamp();
    if timeout == 0 {
        return future::pending().boxed();
    }

    async move {
        let now = unix_now();
        if now < timeout {
            debug!(seconds = timeout - now, "Sleeping until timeout could elapse");
            tokio::time::sleep(Duration::from_secs(timeout - now)).await;
        }

        let commitment = message.commitment();
        loop {
            let target_now = route.target_timestamp().await?;
            if target_now >= timeout {
                if route
                    .target_receipt(message.is_response(), commitment)
                    .await?
                    .is_some()
                {
                    // Delivered in time; the status poll reports it
                    return future::pending().await;
                }
                return Ok(());
            }
            tokio::time::sleep(poll_interval).await;
        }
    }
    .boxed()
}

enum Event {
    Poll(Option<Result<MessageStatus, TrackerError>>),
    Watch(Result<(), TrackerError>),
}

struct Race {
    polls: StatusStream,
    watch: BoxFuture<'static, Result<(), TrackerError>>,
    last: Option<u8>,
    done: bool,
}

impl Race {
    /// Accept `status` if it moves the lifecycle forward
    fn advance(&mut self, status: MessageStatus) -> Option<MessageStatus> {
        let milestone = status.milestone();
        if self.last.map_or(true, |last| milestone > last) {
            self.last = Some(milestone);
            self.done = status.is_terminal();
            info!(status = %status, "Message status changed");
            Some(status)
        } else {
            debug!(status = %status, "Suppressed non-advancing status");
            None
        }
    }
}

/// Merge the status poll and timeout watch for `message`
///
/// `reference_height` is the origin height the message was emitted at.
pub fn subscribe(
    route: Route,
    indexer: Option<Arc<dyn EventHistory>>,
    message: Message,
    reference_height: u64,
    poll_interval: Duration,
) -> StatusStream {
    let watch = timeout_watch(route.clone(), message.clone(), poll_interval);
    let polls = status_poll(PollState {
        route,
        indexer,
        message,
        reference_height,
        poll_interval,
        first: true,
        done: false,
    });

    let race = Race {
        polls,
        watch,
        last: None,
        done: false,
    };

    stream::unfold(race, |mut race| async move {
        if race.done {
            return None;
        }
        loop {
            let event = tokio::select! {
                biased;
                item = race.polls.next() => Event::Poll(item),
                fired = &mut race.watch => Event::Watch(fired),
            };

            match event {
                Event::Poll(None) => return None,
                Event::Poll(Some(Ok(status))) => {
                    if let Some(status) = race.advance(status) {
                        return Some((Ok(status), race));
                    }
                }
                Event::Watch(Ok(())) => {
                    race.done = true;
                    info!("Timeout elapsed before delivery");
                    return Some((Ok(MessageStatus::Timeout), race));
                }
                Event::Poll(Some(Err(e))) | Event::Watch(Err(e)) => {
                    race.done = true;
                    return Some((Err(e), race));
                }
            }
        }
    })
    .boxed()
}
