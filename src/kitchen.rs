//! Kitchen ticket spooler.
//!
//! Listens to every new order and drops its KOT into the spool directory as
//! `kot-<order_no>.txt`, where the kitchen printer bridge picks it up.
//! Failures are logged and skipped; they never block checkout.
//!
//! A subscriber that lagged gets current orders replayed as updates, so a
//! still-PLACED order created after the worker started and not yet spooled
//! is spooled from its update too.

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::PosResult;
use crate::models::{Order, OrderStatus};
use crate::realtime::{OrderEvent, Scope};
use crate::service::PosService;
use crate::tickets::render_kot;

pub fn spool_path(spool_dir: &Path, order: &Order) -> PathBuf {
    spool_dir.join(format!("kot-{}.txt", order.order_no))
}

fn spool_ticket(service: &PosService, spool_dir: &Path, order: &Order) -> PosResult<PathBuf> {
    std::fs::create_dir_all(spool_dir)?;
    let path = spool_path(spool_dir, order);
    let text = render_kot(order, &service.outlet(), service.paper_width());
    let tmp = path.with_extension("txt.tmp");
    std::fs::write(&tmp, text)?;
    std::fs::rename(&tmp, &path)?;
    Ok(path)
}

/// Orders this worker already sent to the kitchen.
#[derive(Debug)]
struct SpoolLedger {
    started_at: DateTime<Utc>,
    spooled: HashSet<String>,
}

impl SpoolLedger {
    fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            spooled: HashSet::new(),
        }
    }

    fn needs_ticket(&self, event: &OrderEvent) -> bool {
        match event {
            OrderEvent::Insert(order) => !self.spooled.contains(&order.id),
            OrderEvent::Update(order) => {
                order.status == OrderStatus::Placed
                    && order.created_at >= self.started_at
                    && !self.spooled.contains(&order.id)
            }
        }
    }

    fn record(&mut self, order: &Order) {
        self.spooled.insert(order.id.clone());
    }
}

/// Start the spooler. It runs until `cancel` fires or the notifier closes.
pub fn start_kitchen_worker(
    service: Arc<PosService>,
    spool_dir: PathBuf,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    let mut subscription = service.subscribe(Scope::All);
    let mut ledger = SpoolLedger::new(Utc::now());
    info!(spool_dir = %spool_dir.display(), "Kitchen ticket worker started");

    tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                event = subscription.next() => event,
            };
            match event {
                Some(event) if ledger.needs_ticket(&event) => {
                    let order = event.order();
                    match spool_ticket(&service, &spool_dir, order) {
                        Ok(path) => {
                            ledger.record(order);
                            info!(
                                order_no = order.order_no,
                                path = %path.display(),
                                "Kitchen ticket spooled"
                            )
                        }
                        Err(e) => error!(order_no = order.order_no, error = %e, "Kitchen ticket failed"),
                    }
                }
                Some(_) => {}
                None => {
                    warn!("Order notifications closed, kitchen worker exiting");
                    break;
                }
            }
        }
        info!("Kitchen ticket worker stopped");
    })
}
