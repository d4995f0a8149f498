//! BLE transport for the headset.
//!
//! The device tunnels its whole protocol through one write and one notify
//! characteristic of the Nordic UART Service:
//! - `6e400001-b5a3-f393-e0a9-e50e24dcca9e` - service
//! - `6e400002-...` - write (commands, with response)
//! - `6e400003-...` - notify (replies and EEG frames)
//!
//! Devices are picked by advertised name, since the service UUID is not
//! always present in the advertisement.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use btleplug::api::{
    Central, Characteristic, Manager as _, Peripheral as _, ScanFilter, Service, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use bytes::Bytes;
use futures::StreamExt;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::{BoxFuture, Transport};
use crate::config::BleConfig;
use crate::error::{NeocoreError, Result};

/// A matching device found during a scan.
#[derive(Clone, Debug)]
pub struct BleDevice {
    /// Advertised name.
    pub name: String,
    /// Platform address (MAC on Linux, UUID on macOS).
    pub address: String,
    /// Signal strength in dBm, if reported.
    pub rssi: Option<i16>,
    peripheral: Peripheral,
}

/// Connected BLE link.
pub struct BleTransport {
    peripheral: Peripheral,
    write_char: Characteristic,
    notify_char: Characteristic,
    connected: Arc<AtomicBool>,
    address: String,
}

fn parse_uuid(value: &str) -> Result<Uuid> {
    Uuid::parse_str(value).map_err(|e| NeocoreError::Transport(format!("bad UUID {value}: {e}")))
}

async fn first_adapter() -> Result<Adapter> {
    let manager = Manager::new().await?;
    manager
        .adapters()
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| NeocoreError::Transport("No Bluetooth adapter found".to_string()))
}

/// Locate the write and notify characteristics inside the UART service.
fn find_characteristics(
    services: &BTreeSet<Service>,
    service_uuid: Uuid,
    write_uuid: Uuid,
    notify_uuid: Uuid,
) -> Result<(Characteristic, Characteristic)> {
    let service = services
        .iter()
        .find(|service| service.uuid == service_uuid)
        .ok_or_else(|| NeocoreError::Transport(format!("service {service_uuid} not found")))?;

    let mut write_char = None;
    let mut notify_char = None;
    for characteristic in &service.characteristics {
        match characteristic.uuid {
            uuid if uuid == write_uuid => write_char = Some(characteristic.clone()),
            uuid if uuid == notify_uuid => notify_char = Some(characteristic.clone()),
            _ => {}
        }
    }
    let missing = |what: &str| NeocoreError::Transport(format!("{what} characteristic not found"));
    Ok((
        write_char.ok_or_else(|| missing("write"))?,
        notify_char.ok_or_else(|| missing("notify"))?,
    ))
}

/// Scan for devices whose advertised name contains one of the target names.
pub async fn scan(config: &BleConfig) -> Result<Vec<BleDevice>> {
    let adapter = first_adapter().await?;

    tracing::info!("Scanning for devices ({} ms)...", config.scan_duration_ms);
    adapter.start_scan(ScanFilter::default()).await?;
    tokio::time::sleep(Duration::from_millis(config.scan_duration_ms)).await;
    adapter.stop_scan().await?;

    let mut devices = Vec::new();
    for peripheral in adapter.peripherals().await? {
        let Some(properties) = peripheral.properties().await? else {
            continue;
        };
        let name = properties.local_name.unwrap_or_default();
        if !config.matches_name(&name) {
            continue;
        }
        devices.push(BleDevice {
            name,
            address: peripheral.address().to_string(),
            rssi: properties.rssi,
            peripheral,
        });
    }

    tracing::info!("Scan complete: found {} matching devices", devices.len());
    Ok(devices)
}

/// Scan, then connect to the first matching device.
pub async fn scan_and_connect(
    config: &BleConfig,
    capacity: usize,
) -> Result<(BleTransport, mpsc::Receiver<Bytes>)> {
    let device = scan(config)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| NeocoreError::Transport("Neocore device not found".to_string()))?;
    BleTransport::connect(&device, config, capacity).await
}

impl BleTransport {
    /// Connect, locate the write/notify characteristics and subscribe.
    ///
    /// Returns the transport and the notification channel for the client.
    pub async fn connect(
        device: &BleDevice,
        config: &BleConfig,
        capacity: usize,
    ) -> Result<(Self, mpsc::Receiver<Bytes>)> {
        let service_uuid = parse_uuid(&config.service_uuid)?;
        let write_uuid = parse_uuid(&config.write_uuid)?;
        let notify_uuid = parse_uuid(&config.notify_uuid)?;

        tracing::info!("Connecting to {} ({})", device.name, device.address);
        let peripheral = device.peripheral.clone();
        peripheral.connect().await?;
        peripheral.discover_services().await?;

        let (write_char, notify_char) =
            find_characteristics(&peripheral.services(), service_uuid, write_uuid, notify_uuid)?;

        let mut stream = peripheral.notifications().await?;
        peripheral.subscribe(&notify_char).await?;
        tracing::debug!("Subscribed to {}", notify_uuid);

        let connected = Arc::new(AtomicBool::new(true));
        let (tx, rx) = mpsc::channel(capacity);
        let flag = connected.clone();
        let address = device.address.clone();
        tokio::spawn(async move {
            while let Some(notification) = stream.next().await {
                if notification.uuid != notify_uuid {
                    continue;
                }
                if tx.send(Bytes::from(notification.value)).await.is_err() {
                    break;
                }
            }
            flag.store(false, Ordering::Release);
            tracing::info!("Notification stream from {} ended", address);
        });

        Ok((
            Self {
                peripheral,
                write_char,
                notify_char,
                connected,
                address: device.address.clone(),
            },
            rx,
        ))
    }

    /// Device address.
    pub fn address(&self) -> &str {
        &self.address
    }
}

impl Transport for BleTransport {
    fn write(&self, data: Bytes) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            if !self.is_connected() {
                return Err(NeocoreError::NotConnected);
            }
            self.peripheral
                .write(&self.write_char, &data, WriteType::WithResponse)
                .await?;
            Ok(())
        })
    }

    fn disconnect(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            if self.connected.swap(false, Ordering::AcqRel) {
                if let Err(e) = self.peripheral.unsubscribe(&self.notify_char).await {
                    tracing::warn!("Unsubscribe failed: {}", e);
                }
                self.peripheral.disconnect().await?;
                tracing::info!("Disconnected from {}", self.address);
            }
            Ok(())
        })
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }
}
