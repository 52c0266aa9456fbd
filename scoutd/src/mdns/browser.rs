use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use mdns_sd::{ServiceDaemon, ServiceEvent};
use futures::stream::{FuturesUnordered, StreamExt};
use futures::Future;
use anyhow::{Context, Result};
use shared::protocol::META_QUERY_TYPE;
use shared::types::DedupKey;
use crate::discovery::events::{DiscoveryEvent, ServiceBrowser};
use crate::mdns::resolver::{convert_service_info, ResolvedRecords};

type RecvResult = (usize, flume::Receiver<ServiceEvent>, std::result::Result<ServiceEvent, flume::RecvError>);
type RecvFuture = Pin<Box<dyn Future<Output = RecvResult> + Send>>;

/// Each future owns a clone of the receiver, so the pump holds no receiver list of its own.
fn make_recv_future(idx: usize, rx: flume::Receiver<ServiceEvent>) -> RecvFuture {
    Box::pin(async move {
        let result = rx.recv_async().await;
        (idx, rx, result)
    })
}

/// `ServiceBrowser` over the mdns-sd daemon. New receivers are handed to the pump.
#[derive(Clone)]
pub struct MdnsBrowser {
    daemon: ServiceDaemon,
    receivers: flume::Sender<flume::Receiver<ServiceEvent>>,
}

impl MdnsBrowser {
    /// Browser plus the receiver queue to pass to [`run_pump`]
    pub fn new(daemon: ServiceDaemon) -> (Self, flume::Receiver<flume::Receiver<ServiceEvent>>) {
        let (receivers, queue) = flume::unbounded();
        (Self { daemon, receivers }, queue)
    }
}

impl ServiceBrowser for MdnsBrowser {
    fn browse(&self, service_type: &str) -> Result<()> {
        let receiver = self
            .daemon
            .browse(service_type)
            .with_context(|| format!("Failed to start browse of {}", service_type))?;
        self.receivers
            .send(receiver)
            .context("mDNS event pump has stopped")?;
        Ok(())
    }
}

/// Translate daemon events into discovery events until cancelled.
///
/// Events on the meta-query receiver announce service types. Events on per-type receivers
/// update `records` before they are forwarded, so a resolver woken by the forwarded event
/// already sees the record.
pub async fn run_pump(
    queue: flume::Receiver<flume::Receiver<ServiceEvent>>,
    records: Arc<ResolvedRecords>,
    tx: mpsc::Sender<DiscoveryEvent>,
    cancel: CancellationToken,
) -> Result<()> {
    tracing::info!("Starting mDNS event pump");

    let mut next_idx = 0usize;
    let mut type_futures: FuturesUnordered<RecvFuture> = FuturesUnordered::new();

    loop {
        tokio::select! {
            receiver = queue.recv_async() => {
                match receiver {
                    Ok(receiver) => {
                        type_futures.push(make_recv_future(next_idx, receiver));
                        next_idx += 1;
                    }
                    Err(_) => {
                        tracing::info!("mDNS browser handle dropped");
                        break;
                    }
                }
            }

            Some((idx, rx, result)) = type_futures.next() => {
                match result {
                    Ok(event) => {
                        if let Some(event) = translate(event, &records) {
                            if let Err(e) = tx.send(event).await {
                                tracing::error!("Failed to forward discovery event: {}", e);
                                break;
                            }
                        }
                        type_futures.push(make_recv_future(idx, rx));
                    }
                    Err(e) => {
                        tracing::warn!("Receiver {} disconnected: {}", idx, e);
                    }
                }
            }

            _ = cancel.cancelled() => {
                tracing::info!("mDNS event pump shutting down");
                break;
            }
        }
    }

    records.close();
    Ok(())
}

/// Map one daemon event, recording resolved and removed instances on the way
pub(crate) fn translate(event: ServiceEvent, records: &ResolvedRecords) -> Option<DiscoveryEvent> {
    match event {
        ServiceEvent::ServiceFound(ty, fullname) if ty == META_QUERY_TYPE => {
            Some(DiscoveryEvent::TypeFound(fullname))
        }
        ServiceEvent::ServiceFound(ty, fullname) => {
            let key = DedupKey::new(ty, fullname);
            records.found(&key);
            Some(DiscoveryEvent::Added(key))
        }
        ServiceEvent::ServiceResolved(info) => {
            let key = DedupKey::new(info.get_type(), info.get_fullname());
            tracing::debug!("Resolved service: {}", key.instance_name);
            records.resolved(key.clone(), convert_service_info(&info));
            Some(DiscoveryEvent::Updated(key))
        }
        ServiceEvent::ServiceRemoved(ty, _) if ty == META_QUERY_TYPE => None,
        ServiceEvent::ServiceRemoved(ty, fullname) => {
            tracing::debug!("Service removed: {}", fullname);
            let key = DedupKey::new(ty, fullname);
            records.removed(key.clone());
            Some(DiscoveryEvent::Removed(key))
        }
        _ => None,
    }
}
