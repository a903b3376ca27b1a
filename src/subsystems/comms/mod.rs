//! Comms subsystem: the relay's external I/O.
//!
//! # Architecture
//!
//! The axum channel implements [`runtime::Component`] and is spawned by
//! [`start`] via [`runtime::spawn_components`]. It captures its shared
//! [`Arc<CommsState>`] at construction time; no state is passed through the
//! generic `Component::run` signature.
//!
//! An intra-subsystem [`mpsc`] channel lets the running channel signal the
//! comms manager (connections opening and closing, shutdown). It is drained
//! in a background task that dies naturally when all senders are dropped.
//!
//! # Starting
//!
//! [`start`] is synchronous: it returns a [`SubsystemHandle`] as soon as
//! the tasks are spawned. The caller decides when (or whether) to await it.
//!
//! [`runtime::Component`]: crate::subsystems::runtime::Component
//! [`runtime::spawn_components`]: crate::subsystems::runtime::spawn_components

pub mod axum_channel;
mod state;

pub use state::{CommsEvent, CommsState, ConnectionRegistry, Outbound, RegistrySink};

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::Config;
use crate::relay::{DeliverySink, Dispatcher};
use crate::subsystems::runtime::{Component, SubsystemHandle, spawn_components};

/// Spawn the comms channels and return a [`SubsystemHandle`].
///
/// If the channel exits with an error the shared `shutdown` token is
/// cancelled. The handle resolves when every channel has exited.
pub fn start(
    config: &Config,
    dispatcher: Dispatcher,
    event_sink: Arc<dyn DeliverySink>,
    shutdown: CancellationToken,
) -> SubsystemHandle {
    let (event_tx, event_rx) = mpsc::channel::<CommsEvent>(64);
    let state = Arc::new(CommsState::new(
        dispatcher,
        event_sink,
        config.push.endpoint.as_str(),
        event_tx,
    ));

    info!(bind = %config.server.bind, "loading axum channel");
    let components: Vec<Box<dyn Component>> = vec![Box::new(axum_channel::AxumChannel::new(
        "axum0",
        config.server.bind.clone(),
        state,
    ))];

    // Monitoring only; does not affect lifecycle.
    tokio::spawn(async move {
        let mut rx = event_rx;
        while let Some(event) = rx.recv().await {
            match event {
                CommsEvent::ChannelShutdown { ref channel_id } => {
                    debug!(channel_id, "channel reported shutdown");
                }
                CommsEvent::ConnectionOpened { ref connection_id } => {
                    debug!(connection_id, "connection opened");
                }
                CommsEvent::ConnectionClosed { ref connection_id } => {
                    debug!(connection_id, "connection closed");
                }
            }
        }
    });

    spawn_components(components, shutdown)
}
