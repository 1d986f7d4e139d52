//! Host connectivity signal.
//!
//! [`Connectivity`] holds the current online flag and notifies subscribers on
//! transitions only. A [`Subscription`] deregisters itself when dropped.
//! [`ConnectivityProbe`] feeds the signal from periodic reachability checks
//! against the remote service. A manual override pins the state and makes
//! probe results ignored until it is cleared.

use log::{debug, info, warn};
use reqwest::Client;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

#[derive(Clone)]
pub struct Connectivity {
    tx: Arc<watch::Sender<bool>>,
    overridden: Arc<AtomicBool>,
}

impl Connectivity {
    pub fn new(initially_online: bool) -> Self {
        let (tx, _rx) = watch::channel(initially_online);
        Self {
            tx: Arc::new(tx),
            overridden: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    /// Publish the current state. Returns true if this was a transition;
    /// subscribers are only woken on transitions.
    pub fn set_online(&self, online: bool) -> bool {
        let changed = self.tx.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if changed {
            if online {
                info!("Connectivity: ONLINE");
            } else {
                warn!("Connectivity: OFFLINE");
            }
        }
        changed
    }

    /// Pin the state to `Some(online)`, or hand control back to the probe
    /// with `None`. Returns true if pinning caused a transition.
    pub fn set_override(&self, online: Option<bool>) -> bool {
        match online {
            Some(online) => {
                self.overridden.store(true, Ordering::SeqCst);
                info!("Connectivity override: {}", if online { "online" } else { "offline" });
                self.set_online(online)
            }
            None => {
                if self.overridden.swap(false, Ordering::SeqCst) {
                    info!("Connectivity override cleared");
                }
                false
            }
        }
    }

    pub fn is_overridden(&self) -> bool {
        self.overridden.load(Ordering::SeqCst)
    }

    /// Publish a probe result unless an override is active
    pub fn report_probe(&self, online: bool) -> bool {
        if self.is_overridden() {
            debug!("Probe result {} ignored while overridden", online);
            return false;
        }
        self.set_online(online)
    }

    pub fn subscribe(&self) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
        }
    }

    /// Number of live subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// Registration on a [`Connectivity`] signal, released on drop
pub struct Subscription {
    rx: watch::Receiver<bool>,
}

impl Subscription {
    /// Wait for the next transition and return the new state.
    /// Returns `None` once the signal source is gone.
    pub async fn changed(&mut self) -> Option<bool> {
        self.rx.changed().await.ok()?;
        Some(*self.rx.borrow_and_update())
    }

    pub fn current(&self) -> bool {
        *self.rx.borrow()
    }
}

/// Considers the host online whenever the remote answers an HTTP request,
/// whatever the status code.
pub struct ConnectivityProbe {
    client: Client,
    url: String,
}

impl ConnectivityProbe {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }

    pub async fn probe_once(&self) -> bool {
        self.client.head(&self.url).send().await.is_ok()
    }

    /// Probe every `interval` and publish the result until the task is aborted
    pub fn spawn(self, connectivity: Connectivity, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let online = self.probe_once().await;
                connectivity.report_probe(online);
            }
        })
    }
}
