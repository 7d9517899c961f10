//! In-memory transport used by the unit tests.

use crate::domain::error::TransportError;
use crate::domain::models::{
    AdapterStatus, Advertisement, Characteristic, ConnectOptions, ConnectionEvent, DeviceId,
    KnownPeripheral, WriteMode,
};
use crate::infrastructure::bluetooth::transport::{Notifications, Transport};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use uuid::Uuid;

type Responder = Box<dyn FnMut(&[u8]) -> Vec<Vec<u8>> + Send>;

pub(crate) struct FakeState {
    pub adapter_status: AdapterStatus,
    pub status_subscribers: Vec<mpsc::UnboundedSender<AdapterStatus>>,
    pub scan_subscribers: Vec<mpsc::UnboundedSender<Advertisement>>,
    pub connect_outcome: ConnectionEvent,
    pub connect_error: Option<TransportError>,
    /// Leave connect requests pending instead of answering them
    pub hold_connect: bool,
    pub connect_requests: Vec<(DeviceId, ConnectOptions)>,
    pub connections: HashMap<DeviceId, mpsc::UnboundedSender<ConnectionEvent>>,
    pub disconnects: Vec<DeviceId>,
    pub disconnect_error: Option<TransportError>,
    pub characteristics: HashSet<Uuid>,
    pub writes: Vec<(Characteristic, Vec<u8>, WriteMode)>,
    pub write_error: Option<TransportError>,
    pub notifications: Option<mpsc::UnboundedSender<Vec<u8>>>,
    pub responder: Option<Responder>,
    pub known: HashMap<DeviceId, String>,
}

#[derive(Clone)]
pub(crate) struct FakeTransport {
    state: Arc<Mutex<FakeState>>,
}

impl FakeTransport {
    pub fn new(adapter_status: AdapterStatus) -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeState {
                adapter_status,
                status_subscribers: Vec::new(),
                scan_subscribers: Vec::new(),
                connect_outcome: ConnectionEvent::Connected,
                connect_error: None,
                hold_connect: false,
                connect_requests: Vec::new(),
                connections: HashMap::new(),
                disconnects: Vec::new(),
                disconnect_error: None,
                characteristics: HashSet::new(),
                writes: Vec::new(),
                write_error: None,
                notifications: None,
                responder: None,
                known: HashMap::new(),
            })),
        }
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn with_characteristic(self, uuid: Uuid) -> Self {
        self.state().characteristics.insert(uuid);
        self
    }

    pub fn with_known_device(self, id: DeviceId, name: &str) -> Self {
        self.state().known.insert(id, name.to_string());
        self
    }

    /// Reply to every write with the notifications the closure returns
    pub fn respond_with(&self, responder: impl FnMut(&[u8]) -> Vec<Vec<u8>> + Send + 'static) {
        self.state().responder = Some(Box::new(responder));
    }

    pub fn set_status(&self, status: AdapterStatus) {
        let mut state = self.state();
        state.adapter_status = status;
        state
            .status_subscribers
            .retain(|subscriber| subscriber.send(status).is_ok());
    }

    pub fn advertise(&self, advertisement: Advertisement) {
        self.state()
            .scan_subscribers
            .retain(|subscriber| subscriber.send(advertisement.clone()).is_ok());
    }

    pub fn notify(&self, bytes: &[u8]) {
        if let Some(sender) = self.state().notifications.as_ref() {
            let _ = sender.send(bytes.to_vec());
        }
    }

    pub fn drop_link(&self, id: DeviceId) {
        if let Some(sender) = self.state().connections.get(&id) {
            let _ = sender.send(ConnectionEvent::Disconnected);
        }
    }

    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.state()
            .writes
            .iter()
            .map(|(_, bytes, _)| bytes.clone())
            .collect()
    }

    pub fn connect_count(&self) -> usize {
        self.state().connect_requests.len()
    }

    pub fn active_scans(&self) -> usize {
        self.state()
            .scan_subscribers
            .iter()
            .filter(|subscriber| !subscriber.is_closed())
            .count()
    }

    pub fn notifications_released(&self) -> bool {
        self.state()
            .notifications
            .as_ref()
            .map(|sender| sender.is_closed())
            .unwrap_or(true)
    }

    pub fn connection_released(&self, id: DeviceId) -> bool {
        self.state()
            .connections
            .get(&id)
            .map(|sender| sender.is_closed())
            .unwrap_or(true)
    }
}

#[async_trait]
impl Transport for FakeTransport {
    fn adapter_status(&self) -> AdapterStatus {
        self.state().adapter_status
    }

    fn status_stream(&self) -> Notifications<AdapterStatus> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.state().status_subscribers.push(tx);
        rx
    }

    fn scan(&self) -> Result<Notifications<Advertisement>, TransportError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.state().scan_subscribers.push(tx);
        Ok(rx)
    }

    async fn connect(
        &self,
        id: DeviceId,
        options: ConnectOptions,
    ) -> Result<Notifications<ConnectionEvent>, TransportError> {
        let mut state = self.state();
        state.connect_requests.push((id, options));
        if let Some(err) = state.connect_error.clone() {
            return Err(err);
        }
        let (tx, rx) = mpsc::unbounded_channel();
        if !state.hold_connect {
            let _ = tx.send(state.connect_outcome.clone());
        }
        state.connections.insert(id, tx);
        Ok(rx)
    }

    async fn disconnect(&self, id: DeviceId) -> Result<(), TransportError> {
        let mut state = self.state();
        state.disconnects.push(id);
        match state.disconnect_error.clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn characteristic(
        &self,
        id: DeviceId,
        uuid: Uuid,
    ) -> Result<Option<Characteristic>, TransportError> {
        let state = self.state();
        Ok(state
            .characteristics
            .contains(&uuid)
            .then_some(Characteristic { device: id, uuid }))
    }

    async fn write_characteristic(
        &self,
        characteristic: &Characteristic,
        bytes: &[u8],
        mode: WriteMode,
    ) -> Result<(), TransportError> {
        let mut state = self.state();
        if let Some(err) = state.write_error.clone() {
            return Err(err);
        }
        state.writes.push((*characteristic, bytes.to_vec(), mode));

        let replies = match state.responder.as_mut() {
            Some(responder) => responder(bytes),
            None => Vec::new(),
        };
        if let Some(sender) = state.notifications.as_ref() {
            for reply in replies {
                let _ = sender.send(reply);
            }
        }
        Ok(())
    }

    async fn subscribe_characteristic(
        &self,
        _characteristic: &Characteristic,
    ) -> Result<Notifications<Vec<u8>>, TransportError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.state().notifications = Some(tx);
        Ok(rx)
    }

    async fn known_device(&self, id: DeviceId) -> Result<Option<KnownPeripheral>, TransportError> {
        Ok(self.state().known.get(&id).map(|name| KnownPeripheral {
            id,
            name: name.clone(),
        }))
    }
}
