//! One-shot background probe for IPv6 internet connectivity.
//!
//! The pool only dials IPv6 nameservers when the probe has succeeded, so
//! the very first queries of a process may run IPv4-only until the answer
//! lands.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::net::UdpSocket;
use tracing::debug;

// k.root-servers.net, e.root-servers.net, a.root-servers.net.
const PROBE_TARGETS: [&str; 3] = ["2001:7fd::1", "2001:500:a8::e", "2001:503:ba3e::2:30"];

static ANSWERED: AtomicBool = AtomicBool::new(false);
static AVAILABLE: AtomicBool = AtomicBool::new(false);
static PROBE_STARTED: AtomicBool = AtomicBool::new(false);

/// True when IPv6 internet connectivity has been confirmed. Never blocks:
/// before the probe has answered this returns false and, at most once,
/// kicks the probe off in the background.
pub fn available() -> bool {
    if ANSWERED.load(Ordering::Acquire) {
        return AVAILABLE.load(Ordering::Acquire);
    }
    if AVAILABLE.load(Ordering::Acquire) {
        return true;
    }
    if !PROBE_STARTED.swap(true, Ordering::AcqRel) {
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(update_availability());
        } else {
            PROBE_STARTED.store(false, Ordering::Release);
        }
    }
    false
}

/// Forces the published probe result. Lets embedders on known-v4-only (or
/// known-v6) networks skip the probe, and keeps tests deterministic.
pub fn set_availability(available: bool) {
    AVAILABLE.store(available, Ordering::Release);
    ANSWERED.store(true, Ordering::Release);
    PROBE_STARTED.store(true, Ordering::Release);
}

pub async fn update_availability() {
    for address in PROBE_TARGETS {
        let target = format!("[{address}]:53");
        let reachable = probe(&target).await;
        AVAILABLE.store(reachable, Ordering::Release);
        if reachable {
            debug!(target = %target, "IPv6 connectivity confirmed");
            break;
        }
    }
    ANSWERED.store(true, Ordering::Release);
}

async fn probe(target: &str) -> bool {
    let attempt = async {
        let socket = UdpSocket::bind("[::]:0").await.ok()?;
        socket.connect(target).await.ok()
    };
    tokio::time::timeout(Duration::from_secs(1), attempt)
        .await
        .ok()
        .flatten()
        .is_some()
}
