//! Decode task + render task.
//!
//! The decode task is the only owner of the `ThreatMonitor`, so every
//! notification is decoded, resolved and applied before the next one is
//! read. Diffs cross to the render task over a bounded channel; the render
//! task drains it on its own tick.

use std::future::Future;
use std::time::Duration;

use log::{debug, info};
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::time::MissedTickBehavior;

use rtl_core::monitor::ThreatMonitor;
use rtl_core::projector::Projector;
use rtl_core::registry::Diff;
use rtl_core::render::{HandleAllocator, Renderer, Scene, VisualId};

use crate::capture::NotificationSource;

#[derive(Debug, Clone, Copy)]
pub struct PipelineOptions {
    pub tick: Duration,
    pub queue_depth: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        PipelineOptions {
            tick: Duration::from_millis(100),
            queue_depth: 32,
        }
    }
}

/// Counters gathered over one run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineReport {
    pub notifications: u64,
    pub rejected: u64,
    pub diffs_sent: u64,
    pub diffs_rendered: u64,
    pub threats_added: u64,
    pub threats_removed: u64,
    pub peak_threats: usize,
    pub still_visible: usize,
}

#[derive(Debug, Default)]
struct DecodeStats {
    notifications: u64,
    rejected: u64,
    diffs_sent: u64,
    threats_added: u64,
    threats_removed: u64,
    peak_threats: usize,
}

/// Run until the source ends or `shutdown` resolves. Visuals still on
/// screen are destroyed before the renderer is handed back.
pub async fn run<R, F>(
    source: Box<dyn NotificationSource>,
    projector: Projector,
    renderer: R,
    options: PipelineOptions,
    shutdown: F,
) -> anyhow::Result<(PipelineReport, R)>
where
    R: Renderer + Send + 'static,
    R::Handle: Send,
    F: Future<Output = ()> + Send + 'static,
{
    let (tx, rx) = mpsc::channel::<Diff<VisualId>>(options.queue_depth.max(1));

    let decoder = tokio::spawn(decode_loop(source, projector, tx, shutdown));
    let render = tokio::spawn(render_loop(rx, Scene::new(renderer, projector), options.tick));

    let stats = decoder.await?;
    let (mut scene, rendered) = render.await?;
    let still_visible = scene.len();
    scene.clear();
    scene.renderer_mut().present();

    let report = PipelineReport {
        notifications: stats.notifications,
        rejected: stats.rejected,
        diffs_sent: stats.diffs_sent,
        diffs_rendered: rendered,
        threats_added: stats.threats_added,
        threats_removed: stats.threats_removed,
        peak_threats: stats.peak_threats,
        still_visible,
    };
    info!(
        "pipeline done: {} notifications ({} rejected), {} diffs, peak {} threats",
        report.notifications, report.rejected, report.diffs_sent, report.peak_threats
    );
    Ok((report, scene.into_renderer()))
}

async fn decode_loop<F>(
    mut source: Box<dyn NotificationSource>,
    projector: Projector,
    tx: mpsc::Sender<Diff<VisualId>>,
    shutdown: F,
) -> DecodeStats
where
    F: Future<Output = ()> + Send,
{
    let mut monitor: ThreatMonitor<VisualId> = ThreatMonitor::new(projector);
    let mut handles = HandleAllocator::new();
    let mut stats = DecodeStats::default();
    tokio::pin!(shutdown);

    loop {
        let notification = tokio::select! {
            _ = &mut shutdown => {
                info!("shutdown requested");
                break;
            }
            next = source.next_notification() => match next {
                Some(n) => n,
                None => {
                    info!("{} ended", source.describe());
                    break;
                }
            },
        };

        stats.notifications += 1;
        let diff = match monitor.process(&notification.payload, &mut handles) {
            Ok(d) => d,
            Err(_) => {
                stats.rejected += 1;
                continue;
            }
        };
        stats.peak_threats = stats.peak_threats.max(monitor.registry().len());

        if diff.is_empty() {
            continue;
        }
        debug!(
            "t={:.2}s +{} ~{} -{}",
            notification.timestamp,
            diff.added.len(),
            diff.updated.len(),
            diff.removed.len()
        );
        if tx.send(diff).await.is_err() {
            debug!("render task gone, stopping decode");
            break;
        }
        stats.diffs_sent += 1;
    }

    stats.threats_added = monitor.registry().total_added;
    stats.threats_removed = monitor.registry().total_removed;
    stats
}

async fn render_loop<R>(
    mut rx: mpsc::Receiver<Diff<VisualId>>,
    mut scene: Scene<R>,
    tick: Duration,
) -> (Scene<R>, u64)
where
    R: Renderer,
{
    let mut ticker = tokio::time::interval(tick.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut rendered = 0u64;

    loop {
        ticker.tick().await;

        let mut closed = false;
        loop {
            match rx.try_recv() {
                Ok(diff) => {
                    scene.apply(&diff);
                    rendered += 1;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    closed = true;
                    break;
                }
            }
        }
        scene.renderer_mut().present();

        if closed {
            break;
        }
    }

    (scene, rendered)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
