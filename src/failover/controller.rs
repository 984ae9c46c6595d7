use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::interval;
use tokio::time::MissedTickBehavior;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::compute_active_leaders;
use super::ActiveLeaders;
use crate::membership::Membership;
use crate::metrics::FAILOVER_SWITCHOVERS;
use crate::topology::TopologyStore;
use crate::Result;

/// Keeps the active leader map in line with the committed document and
/// membership, and tracks whether this node accepts writes.
pub struct FailoverController {
    self_uri: String,
    store: Arc<TopologyStore>,
    membership: Arc<dyn Membership>,
    leaders: watch::Sender<Arc<ActiveLeaders>>,
    /// Last observed read/write mode of this node, `None` before the first computation
    rw: Mutex<Option<bool>>,
    reconcile_interval: Duration,
}

impl FailoverController {
    pub fn new(
        self_uri: impl Into<String>,
        store: Arc<TopologyStore>,
        membership: Arc<dyn Membership>,
        reconcile_interval: Duration,
    ) -> Self {
        let (leaders, _) = watch::channel(Arc::new(ActiveLeaders::new()));
        Self {
            self_uri: self_uri.into(),
            store,
            membership,
            leaders,
            rw: Mutex::new(None),
            reconcile_interval,
        }
    }

    pub fn active_leaders(&self) -> Arc<ActiveLeaders> {
        self.leaders.borrow().clone()
    }

    pub fn active_leader(
        &self,
        replicaset_uuid: &str,
    ) -> Option<String> {
        self.leaders.borrow().get(replicaset_uuid).cloned()
    }

    pub fn is_leader(
        &self,
        server_uuid: &str,
    ) -> bool {
        self.leaders.borrow().values().any(|l| l == server_uuid)
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<ActiveLeaders>> {
        self.leaders.subscribe()
    }

    /// Whether this node accepts writes: it leads its replicaset or the
    /// replicaset is `all_rw`.
    pub fn is_rw(&self) -> bool {
        let cfg = self.store.current();
        let Some(me) = cfg.server_by_uri(&self.self_uri) else {
            return false;
        };
        let all_rw = cfg.replicaset(&me.replicaset_uuid).map(|rs| rs.all_rw).unwrap_or(false);
        all_rw || self.active_leader(&me.replicaset_uuid).as_deref() == Some(me.uuid.as_str())
    }

    /// Recomputes active leaders from the committed snapshot.
    ///
    /// Returns `true` when the map changed.
    pub fn recompute(&self) -> bool {
        let cfg = self.store.current();
        let next = compute_active_leaders(&cfg, |s| s.uri == self.self_uri || self.membership.is_alive(&s.uri));

        let prev = self.active_leaders();
        let changed = *prev != next;
        if changed {
            for (rs, leader) in &next {
                match prev.get(rs) {
                    Some(old) if old != leader => {
                        FAILOVER_SWITCHOVERS.inc();
                        info!(replicaset = %rs, from = %old, to = %leader, "active leader switched");
                    }
                    None => debug!(replicaset = %rs, leader = %leader, "active leader elected"),
                    _ => {}
                }
            }
            for rs in prev.keys().filter(|rs| !next.contains_key(*rs)) {
                if cfg.replicaset(rs).is_some() {
                    warn!(replicaset = %rs, "no alive leader candidate");
                }
            }
            self.leaders.send_replace(Arc::new(next));
        }

        self.update_rw_mode();
        changed
    }

    fn update_rw_mode(&self) {
        let rw = self.is_rw();
        let mut last = self.rw.lock();
        if *last != Some(rw) {
            if last.is_some() {
                info!(read_only = !rw, "instance mode changed");
            }
            *last = Some(rw);
        }
    }

    /// Recomputes on every liveness change and every commit, plus a periodic
    /// tick, until `shutdown` fires.
    pub async fn run(
        self: Arc<Self>,
        mut shutdown: watch::Receiver<()>,
    ) -> Result<()> {
        let mut liveness = self.membership.subscribe();
        let mut commits = self.store.subscribe();
        let mut tick = interval(self.reconcile_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        self.recompute();
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("failover controller stopped");
                    return Ok(());
                }
                res = liveness.changed() => {
                    if res.is_err() {
                        return Ok(());
                    }
                    self.recompute();
                }
                res = commits.changed() => {
                    if res.is_err() {
                        return Ok(());
                    }
                    self.recompute();
                }
                _ = tick.tick() => {
                    self.recompute();
                }
            }
        }
    }
}
