//! BLE Connection Module
//!
//! Owns the single current-device slot: connects and authenticates devices,
//! disconnects them (optionally remembering the identity), and reacts to
//! adapter power changes by disconnecting and later reconnecting.

use crate::domain::device::{ConnectionCallback, Device, DeviceDriver};
use crate::domain::error::{LinkError, TransportError};
use crate::domain::models::{
    AdapterStatus, ConnectOptions, ConnectionEvent, ConnectionState, DeviceId, DeviceInfo,
    LinkEvent, MessageSeverity,
};
use crate::infrastructure::bluetooth::authentication::Authenticator;
use crate::infrastructure::bluetooth::events::EventSink;
use crate::infrastructure::bluetooth::registry::DeviceRegistry;
use crate::infrastructure::bluetooth::transport::{Notifications, Transport};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Configuration for connection behavior
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Options passed to every transport connect request
    pub connect_options: ConnectOptions,
    /// Upper bound on one authentication handshake
    pub auth_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_options: ConnectOptions::default(),
            auth_timeout: Duration::from_millis(30_000),
        }
    }
}

/// Background observers of adapter status. One of each kind at most.
#[derive(Default)]
struct Observers {
    adapter_changes: Option<JoinHandle<()>>,
    on_changed: Option<JoinHandle<()>>,
    on_ready: Option<JoinHandle<()>>,
}

impl Drop for Observers {
    fn drop(&mut self) {
        for task in [
            self.adapter_changes.take(),
            self.on_changed.take(),
            self.on_ready.take(),
        ]
        .into_iter()
        .flatten()
        {
            task.abort();
        }
    }
}

fn replace_observer(slot: &mut Option<JoinHandle<()>>, task: JoinHandle<()>) {
    if let Some(previous) = slot.replace(task) {
        previous.abort();
    }
}

struct Inner<T: Transport> {
    transport: Arc<T>,
    registry: Arc<DeviceRegistry>,
    config: ConnectionConfig,
    events: EventSink,
    current: Mutex<Option<Device>>,
    attempts: AtomicU64,
    adapter_status: Mutex<AdapterStatus>,
    observers: Mutex<Observers>,
}

/// Connection manager. Cheap to clone; clones share the same device slot.
pub struct ConnectionManager<T: Transport> {
    inner: Arc<Inner<T>>,
}

impl<T: Transport> Clone for ConnectionManager<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

fn lock<V>(mutex: &Mutex<V>) -> MutexGuard<'_, V> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl<T: Transport> ConnectionManager<T> {
    pub fn new(
        transport: Arc<T>,
        registry: Arc<DeviceRegistry>,
        config: ConnectionConfig,
        events: EventSink,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                registry,
                config,
                events,
                current: Mutex::new(None),
                attempts: AtomicU64::new(0),
                adapter_status: Mutex::new(AdapterStatus::Unknown),
                observers: Mutex::new(Observers::default()),
            }),
        }
    }

    /// Snapshot of the current (or remembered) device
    pub fn current_device(&self) -> Option<DeviceInfo> {
        lock(&self.inner.current).as_ref().map(Device::info)
    }

    /// Last adapter status seen by the adapter-change reaction
    pub fn adapter_status(&self) -> AdapterStatus {
        *lock(&self.inner.adapter_status)
    }

    /// Connect a device and, if it needs it, authenticate it.
    ///
    /// The device takes the current slot, replacing whatever was there. The
    /// callback (or the one the device already carries) is invoked with the
    /// outcome and kept for automatic reconnects.
    ///
    /// The attempt itself runs as a task owned by the device, so a
    /// `disconnect` issued meanwhile cancels it and this call returns
    /// [`LinkError::ConnectionCancelled`] without touching the slot.
    pub async fn connect(
        &self,
        mut device: Device,
        callback: Option<ConnectionCallback>,
    ) -> Result<(), LinkError> {
        if callback.is_some() {
            device.set_connection_callback(callback);
        }
        let id = device.id();
        let attempt = self.next_attempt();
        let needs_authentication = device.needs_authentication();
        let driver = device.driver().clone();
        info!("Connecting to {} ({})", device.name(), id);
        self.inner.events.log(
            format!("Connecting to {}...", device.name()),
            MessageSeverity::Info,
        );

        device.set_state(ConnectionState::Connecting);
        device.set_attempt(attempt);
        let previous = lock(&self.inner.current).replace(device);
        self.emit_state(id, ConnectionState::Connecting);

        if let Some(mut previous) = previous {
            let resources = std::mem::take(previous.resources_mut());
            resources.shutdown().await;
            if previous.id() != id {
                info!("Dropping previous device {}", previous.id());
                if let Err(e) = self.inner.transport.disconnect(previous.id()).await {
                    warn!("Failed to disconnect previous device: {}", e);
                }
            }
        }

        let (done_tx, done_rx) = oneshot::channel();
        let weak = Arc::downgrade(&self.inner);
        self.with_attempt(id, attempt, move |device| {
            let task = tokio::spawn(run_link(
                weak,
                id,
                attempt,
                needs_authentication,
                driver,
                done_tx,
            ));
            device.resources_mut().push(task);
        });

        // Sender dropped without a result: the attempt was torn down
        let result = done_rx
            .await
            .unwrap_or(Err(LinkError::ConnectionCancelled));
        let state = match &result {
            Ok(()) => ConnectionState::Ready,
            Err(_) => ConnectionState::Failed,
        };

        let finished = self.with_attempt(id, attempt, |device| {
            device.set_state(state);
            (device.info(), device.connection_callback().cloned())
        });
        let Some((info, callback)) = finished else {
            info!("Connect attempt for {} was cancelled", id);
            return Err(LinkError::ConnectionCancelled);
        };
        self.emit_state(id, state);

        match &result {
            Ok(()) => self
                .inner
                .events
                .log("Device ready", MessageSeverity::Success),
            Err(e) => {
                error!("Connecting {} failed: {}", id, e);
                self.inner
                    .events
                    .log(format!("Connection failed: {}", e), MessageSeverity::Error);
            }
        }

        if let Some(callback) = callback {
            callback(&info, &result);
        }
        result
    }

    /// Open the link and authenticate. Returns the live connection stream.
    async fn establish(
        &self,
        id: DeviceId,
        attempt: u64,
        needs_authentication: bool,
        driver: &dyn DeviceDriver,
    ) -> Result<Notifications<ConnectionEvent>, LinkError> {
        let mut link = self
            .inner
            .transport
            .connect(id, self.inner.config.connect_options)
            .await?;

        // Wait for the transport to accept or refuse
        match link.recv().await {
            Some(ConnectionEvent::Connected) => {}
            Some(ConnectionEvent::Failed(reason)) => {
                return Err(TransportError::Connect(reason).into());
            }
            Some(ConnectionEvent::Disconnected) | None => {
                return Err(TransportError::StreamClosed.into());
            }
        }
        info!("Connected to {}", id);
        self.advance(id, attempt, ConnectionState::Connected)?;

        if !needs_authentication {
            debug!("{} is a known device, skipping authentication", id);
            return Ok(link);
        }

        self.advance(id, attempt, ConnectionState::Authenticating)?;
        let mut authenticator =
            Authenticator::new(self.inner.transport.as_ref(), driver.auth_profile(), id);
        authenticator
            .authenticate(self.inner.config.auth_timeout)
            .await?;
        Ok(link)
    }

    /// Disconnect the current device.
    ///
    /// Every resource the device owns, including an unfinished connect
    /// attempt, is released before the transport is asked to drop the link.
    /// With `remember_device` the device stays in the slot as Disconnected so
    /// it can be reconnected later.
    pub async fn disconnect(&self, remember_device: bool) -> Result<(), LinkError> {
        let retired = self.next_attempt();
        let (id, resources) = {
            let mut current = lock(&self.inner.current);
            let device = current.as_mut().ok_or(LinkError::NoCurrentDevice)?;
            let id = device.id();
            let resources = std::mem::take(device.resources_mut());
            device.set_state(ConnectionState::Disconnected);
            device.set_attempt(retired);
            if !remember_device {
                *current = None;
            }
            (id, resources)
        };

        info!("Disconnecting device {} (remember: {})", id, remember_device);
        resources.shutdown().await;
        self.emit_state(id, ConnectionState::Disconnected);
        self.inner
            .events
            .log("Disconnected from device", MessageSeverity::Info);

        self.inner.transport.disconnect(id).await?;
        Ok(())
    }

    /// Look up a device the transport already knows. Such devices skip the
    /// handshake on connect.
    pub async fn get_known_device(&self, id: DeviceId) -> Result<Option<Device>, LinkError> {
        if id.is_nil() {
            return Ok(None);
        }

        let Some(peripheral) = self.inner.transport.known_device(id).await? else {
            debug!("Transport does not know device {}", id);
            return Ok(None);
        };

        Ok(self
            .inner
            .registry
            .resolve(peripheral.id, &peripheral.name)
            .map(|mut device| {
                device.set_needs_authentication(false);
                device
            }))
    }

    /// Put a device in the slot as remembered without connecting it.
    pub fn remember(&self, mut device: Device, callback: Option<ConnectionCallback>) {
        if callback.is_some() {
            device.set_connection_callback(callback);
        }
        device.set_state(ConnectionState::Disconnected);
        let id = device.id();
        let previous = lock(&self.inner.current).replace(device);
        drop(previous);
        debug!("Remembering device {}", id);
    }

    /// Start reacting to adapter status changes. Replaces a previous listener.
    ///
    /// PoweredOff disconnects the current device but remembers it. A later
    /// PoweredOn reconnects the remembered device; the very first PoweredOn
    /// observed by the listener is ignored.
    pub fn start_listening_for_adapter_changes(&self) {
        let mut statuses = self.inner.transport.status_stream();
        let weak = Arc::downgrade(&self.inner);

        let task = tokio::spawn(async move {
            let mut seen_powered_on = false;
            while let Some(status) = statuses.recv().await {
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let manager = ConnectionManager { inner };
                manager.on_adapter_status(status, &mut seen_powered_on).await;
            }
            debug!("Adapter status stream ended");
        });

        replace_observer(&mut lock(&self.inner.observers).adapter_changes, task);
    }

    /// Invoke `callback` on every adapter status change. Replaces a previous one.
    pub fn on_adapter_changed<F>(&self, callback: F)
    where
        F: Fn(AdapterStatus) + Send + 'static,
    {
        let mut statuses = self.inner.transport.status_stream();
        let task = tokio::spawn(async move {
            while let Some(status) = statuses.recv().await {
                callback(status);
            }
        });
        replace_observer(&mut lock(&self.inner.observers).on_changed, task);
    }

    /// Invoke `callback` whenever the adapter becomes powered on. Replaces a
    /// previous one.
    pub fn when_adapter_ready<F>(&self, callback: F)
    where
        F: Fn() + Send + 'static,
    {
        let mut statuses = self.inner.transport.status_stream();
        let task = tokio::spawn(async move {
            while let Some(status) = statuses.recv().await {
                if status == AdapterStatus::PoweredOn {
                    callback();
                }
            }
        });
        replace_observer(&mut lock(&self.inner.observers).on_ready, task);
    }

    async fn on_adapter_status(&self, status: AdapterStatus, seen_powered_on: &mut bool) {
        {
            let mut current = lock(&self.inner.adapter_status);
            if *current == status {
                return;
            }
            *current = status;
        }
        info!("Adapter status changed to {:?}", status);
        self.inner.events.send(LinkEvent::AdapterStatus(status));

        match status {
            AdapterStatus::PoweredOff => {
                if let Some(device) = self.current_device() {
                    info!("Adapter powered off, disconnecting {}", device.id);
                    if let Err(e) = self.disconnect(true).await {
                        warn!("Disconnect on power off failed: {}", e);
                    }
                }
            }
            AdapterStatus::PoweredOn => {
                if !*seen_powered_on {
                    *seen_powered_on = true;
                    debug!("Ignoring first PoweredOn");
                    return;
                }
                let remembered = self.current_device();
                if let Some(device) = remembered {
                    self.reconnect(device.id).await;
                }
            }
            _ => {}
        }
    }

    /// Reconnect a remembered device. Failures are logged, never raised.
    async fn reconnect(&self, id: DeviceId) {
        let callback = lock(&self.inner.current)
            .as_ref()
            .and_then(|device| device.connection_callback().cloned());

        match self.get_known_device(id).await {
            Ok(Some(device)) => {
                info!("Reconnecting remembered device {}", id);
                if let Err(e) = self.connect(device, callback).await {
                    warn!("Automatic reconnect of {} failed: {}", id, e);
                }
            }
            Ok(None) => warn!("Remembered device {} is no longer known", id),
            Err(e) => warn!("Lookup of remembered device {} failed: {}", id, e),
        }
    }

    fn next_attempt(&self) -> u64 {
        self.inner.attempts.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Run `f` on the current device if `attempt` still owns it.
    fn with_attempt<R>(
        &self,
        id: DeviceId,
        attempt: u64,
        f: impl FnOnce(&mut Device) -> R,
    ) -> Option<R> {
        let mut current = lock(&self.inner.current);
        current
            .as_mut()
            .filter(|device| device.id() == id && device.attempt() == attempt)
            .map(f)
    }

    fn advance(
        &self,
        id: DeviceId,
        attempt: u64,
        state: ConnectionState,
    ) -> Result<(), LinkError> {
        self.with_attempt(id, attempt, |device| device.set_state(state))
            .ok_or(LinkError::ConnectionCancelled)?;
        self.emit_state(id, state);
        Ok(())
    }

    fn emit_state(&self, id: DeviceId, state: ConnectionState) {
        self.inner.events.send(LinkEvent::ConnectionState(id, state));
    }
}

/// Body of the device-owned connect task: establish the link, report the
/// outcome, then follow the link until it is lost.
async fn run_link<T: Transport>(
    inner: Weak<Inner<T>>,
    id: DeviceId,
    attempt: u64,
    needs_authentication: bool,
    driver: Arc<dyn DeviceDriver>,
    done: oneshot::Sender<Result<(), LinkError>>,
) {
    let Some(strong) = inner.upgrade() else {
        return;
    };
    let outcome = ConnectionManager { inner: strong }
        .establish(id, attempt, needs_authentication, driver.as_ref())
        .await;

    match outcome {
        Ok(link) => {
            let _ = done.send(Ok(()));
            watch_link(inner, id, attempt, link).await;
        }
        Err(e) => {
            let _ = done.send(Err(e));
        }
    }
}

/// Record link loss on the device. The connection stream is released as soon
/// as the link is gone.
async fn watch_link<T: Transport>(
    inner: Weak<Inner<T>>,
    id: DeviceId,
    attempt: u64,
    mut link: Notifications<ConnectionEvent>,
) {
    while let Some(event) = link.recv().await {
        let state = match event {
            ConnectionEvent::Disconnected => ConnectionState::Disconnected,
            ConnectionEvent::Failed(reason) => {
                warn!("Link to {} failed: {}", id, reason);
                ConnectionState::Failed
            }
            ConnectionEvent::Connected => continue,
        };

        warn!("Link to {} lost", id);
        if let Some(inner) = inner.upgrade() {
            let manager = ConnectionManager { inner };
            if manager
                .with_attempt(id, attempt, |device| device.set_state(state))
                .is_some()
            {
                manager.emit_state(id, state);
            }
        }
        return;
    }
}
