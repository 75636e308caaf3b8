use std::future::pending;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::time::{MissedTickBehavior, Sleep, interval, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::clock::Clock;
use crate::repository::ImageRepository;
use crate::rotation::{Effect, Phase, Rotation, RotationEvent, RotationOptions, TimerId};
use crate::sink::PresentationSink;

type DurationTimer = Option<(TimerId, Pin<Box<Sleep>>)>;
type FallbackTimer = Option<Pin<Box<Sleep>>>;

/// Drives a [`Rotation`] from two clocks: a fixed poll interval that rebuilds
/// the playlist from `repository`, and the per-image duration timer.
///
/// Rules:
/// - The first poll happens immediately.
/// - A poll due at the same instant as a duration expiry is handled first; the
///   expiry it replaces is then dropped unseen.
/// - The repository is read on the blocking pool.
/// - At most one duration sleep is held; arming replaces it, cancelling drops it.
/// - Timer expiries are fed back as events and never touch the sink directly.
/// - Sink calls are fire-and-forget; nothing here awaits the presentation side.
#[instrument(
    skip_all,
    fields(poll_secs = poll_interval.as_secs())
)]
pub async fn run<R, S, C>(
    repository: R,
    sink: S,
    clock: C,
    options: RotationOptions,
    poll_interval: Duration,
    cancel: CancellationToken,
) -> Result<()>
where
    R: ImageRepository + 'static,
    S: PresentationSink,
    C: Clock,
{
    let repository = Arc::new(repository);
    let mut rotation = Rotation::new(options);
    let mut poll = interval(poll_interval);
    poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut duration: DurationTimer = None;
    let mut fallback: FallbackTimer = None;

    loop {
        let event = tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                info!("cancel received; exiting scheduler task");
                break;
            }

            _ = poll.tick() => {
                let reader = Arc::clone(&repository);
                let snapshot = match tokio::task::spawn_blocking(move || reader.get()).await {
                    Ok(snapshot) => snapshot,
                    Err(err) => {
                        warn!("repository read failed: {err}; keeping current playlist");
                        continue;
                    }
                };
                let now = clock.now();
                debug!(records = snapshot.len(), %now, "poll tick");
                RotationEvent::Poll { snapshot, now }
            }

            timer = duration_expiry(&mut duration), if duration.is_some() => {
                RotationEvent::DurationElapsed(timer)
            }

            _ = fallback_expiry(&mut fallback), if fallback.is_some() => {
                RotationEvent::FallbackElapsed
            }
        };

        match &event {
            RotationEvent::DurationElapsed(_) => duration = None,
            RotationEvent::FallbackElapsed => fallback = None,
            RotationEvent::Poll { .. } => {}
        }

        let before = rotation.phase();
        let is_poll = matches!(event, RotationEvent::Poll { .. });
        let effects = rotation.handle(event);
        let after = rotation.phase();
        if is_poll {
            log_poll(&rotation, before, after);
        }
        apply(effects, &sink, &mut duration, &mut fallback);
    }

    Ok(())
}

async fn duration_expiry(pending_timer: &mut DurationTimer) -> TimerId {
    match pending_timer {
        Some((timer, delay)) => {
            delay.as_mut().await;
            *timer
        }
        None => pending().await,
    }
}

async fn fallback_expiry(pending_timer: &mut FallbackTimer) {
    match pending_timer {
        Some(delay) => delay.as_mut().await,
        None => pending().await,
    }
}

fn apply<S: PresentationSink>(
    effects: Vec<Effect>,
    sink: &S,
    duration: &mut DurationTimer,
    fallback: &mut FallbackTimer,
) {
    for effect in effects {
        match effect {
            Effect::Display(image) => {
                debug!(id = image.id, url = %image.url, "display");
                sink.display(&image);
            }
            Effect::ShowEmpty => sink.show_empty(),
            Effect::ShowNoData => sink.show_no_data(),
            Effect::ArmDuration { timer, after } => {
                debug!(?timer, secs = after.as_secs(), "duration timer armed");
                *duration = Some((timer, Box::pin(sleep(after))));
            }
            Effect::CancelDuration => {
                if duration.take().is_some() {
                    debug!("duration timer cancelled");
                }
            }
            Effect::ArmFallback { after } => {
                debug!(secs = after.as_secs(), "no-data fallback armed");
                *fallback = Some(Box::pin(sleep(after)));
            }
            Effect::RunFallback => {
                warn!("no-data grace period elapsed; running fallback");
                sink.fallback();
            }
        }
    }
}

fn log_poll(rotation: &Rotation, before: Phase, after: Phase) {
    let playlist = rotation.playlist();
    let changed = std::mem::discriminant(&before) != std::mem::discriminant(&after);
    if changed {
        info!(
            from = ?before,
            to = ?after,
            eligible = playlist.len(),
            ids = ?playlist.ids(),
            "rotation phase changed"
        );
    } else {
        debug!(
            phase = ?after,
            eligible = playlist.len(),
            ids = ?playlist.ids(),
            "playlist rebuilt"
        );
    }
}
