use std::io;
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use bizdesk_core::TenantId;
use bizdesk_events::{EventBus, EventEnvelope, ModuleEvent, Subscription, TenantScoped};

use crate::propagation::PropagationEngine;
use crate::store::Store;

/// Handle to control and join a background worker.
#[derive(Debug)]
pub struct WorkerHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
}

impl WorkerHandle {
    /// Request graceful shutdown and wait for the worker to stop.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

/// Applies module events from a bus through the propagation engine.
///
/// Delivery is at-least-once; the engine's handlers are idempotent, so
/// replays and events this process published itself are harmless.
#[derive(Debug)]
pub struct ModuleEventWorker;

impl ModuleEventWorker {
    /// Spawn a worker thread.
    ///
    /// - `tenant_id`: when provided, events for other tenants are ignored
    ///   (platform-wide events still pass)
    pub fn spawn<S, B>(
        name: &'static str,
        bus: B,
        engine: Arc<PropagationEngine<S>>,
        tenant_id: Option<TenantId>,
    ) -> io::Result<WorkerHandle>
    where
        S: Store + 'static,
        B: EventBus<EventEnvelope<ModuleEvent>>,
    {
        Self::spawn_with(name, bus, tenant_id, move |event: ModuleEvent| {
            engine.handle(&event)
        })
    }

    /// Spawn a worker thread with a custom handler.
    pub fn spawn_with<B, H, E>(
        name: &'static str,
        bus: B,
        tenant_id: Option<TenantId>,
        mut handler: H,
    ) -> io::Result<WorkerHandle>
    where
        B: EventBus<EventEnvelope<ModuleEvent>>,
        H: FnMut(ModuleEvent) -> Result<(), E> + Send + 'static,
        E: core::fmt::Display + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let sub = bus.subscribe();

        let join = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || worker_loop(name, sub, shutdown_rx, tenant_id, &mut handler))?;

        Ok(WorkerHandle {
            shutdown: shutdown_tx,
            join: Some(join),
        })
    }
}

fn worker_loop<H, E>(
    name: &'static str,
    sub: Subscription<EventEnvelope<ModuleEvent>>,
    shutdown_rx: mpsc::Receiver<()>,
    tenant_id: Option<TenantId>,
    handler: &mut H,
) where
    H: FnMut(ModuleEvent) -> Result<(), E>,
    E: core::fmt::Display,
{
    let tick = Duration::from_millis(250);

    loop {
        if shutdown_rx.try_recv().is_ok() {
            break;
        }

        match sub.recv_timeout(tick) {
            Ok(envelope) => {
                if let (Some(only), Some(event_tenant)) = (tenant_id, TenantScoped::tenant_id(&envelope)) {
                    if only != event_tenant {
                        continue;
                    }
                }

                let event_type = envelope.event_type().to_string();
                debug!(worker = name, event_type = %event_type, "handling module event");
                if let Err(err) = handler(envelope.into_payload()) {
                    warn!(worker = name, event_type = %event_type, error = %err, "module event handler failed");
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Instant;

    use bizdesk_core::ModuleKey;
    use bizdesk_events::{DefaultData, InMemoryEventBus};
    use chrono::Utc;

    fn signal(tenant: i64) -> EventEnvelope<ModuleEvent> {
        let event = ModuleEvent::DefaultData(DefaultData {
            tenant_id: TenantId::new(tenant),
            modules: vec![ModuleKey::from_static("Hrm")],
            occurred_at: Utc::now(),
        });
        EventEnvelope::wrap(event.tenant_id(), event)
    }

    #[test]
    fn tenant_pinned_worker_ignores_other_tenants() {
        let bus = Arc::new(InMemoryEventBus::<EventEnvelope<ModuleEvent>>::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();

        let handle = ModuleEventWorker::spawn_with("test-worker", bus.clone(), Some(TenantId::new(1)), move |e: ModuleEvent| {
            sink.lock().unwrap().push(e.tenant_id());
            Ok::<(), String>(())
        })
        .unwrap();

        bus.publish(signal(2)).unwrap();
        bus.publish(signal(1)).unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while seen.lock().unwrap().is_empty() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        handle.shutdown();

        assert_eq!(*seen.lock().unwrap(), vec![Some(TenantId::new(1))]);
    }
}
