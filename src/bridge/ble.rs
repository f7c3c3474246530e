//! Bluetooth LE implementation of [`RadioLink`] on top of `btleplug`.

use super::error::BridgeError;
use super::link::{Advertisement, NUS_RX_CHAR_UUID, RadioLink, SCAN_TIMEOUT, TargetFilter, select_target};
use async_trait::async_trait;
use btleplug::api::{Central, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType};
use btleplug::platform::{Adapter, Manager, Peripheral};
use std::time::Duration;
use tokio::time::{Instant, sleep, timeout};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(12);
const SCAN_POLL: Duration = Duration::from_millis(250);

fn link_err(context: &str, err: btleplug::Error) -> BridgeError {
    BridgeError::Link(format!("{context}: {err}"))
}

/// Nordic UART link over the first Bluetooth adapter.
///
/// Peripherals are keyed by their platform id. macOS reports every MAC as
/// [`UNKNOWN_ADDRESS`](super::link::UNKNOWN_ADDRESS), so the address alone
/// cannot tell two devices apart there.
pub struct BleLink {
    adapter: Adapter,
    /// Peripheral picked by the last discovery, with its id.
    discovered: Option<(String, Peripheral)>,
    peripheral: Option<Peripheral>,
    rx: Option<Characteristic>,
}

impl BleLink {
    /// Opens the first available adapter.
    pub async fn new() -> Result<Self, BridgeError> {
        let manager = Manager::new()
            .await
            .map_err(|e| link_err("bluetooth manager", e))?;
        let adapter = manager
            .adapters()
            .await
            .map_err(|e| link_err("list adapters", e))?
            .into_iter()
            .next()
            .ok_or_else(|| BridgeError::Link("no Bluetooth adapter found".to_owned()))?;
        Ok(Self {
            adapter,
            discovered: None,
            peripheral: None,
            rx: None,
        })
    }

    async fn advertisements(&self) -> Result<Vec<(Peripheral, Advertisement)>, BridgeError> {
        let peripherals = self
            .adapter
            .peripherals()
            .await
            .map_err(|e| link_err("list peripherals", e))?;

        let mut seen = Vec::with_capacity(peripherals.len());
        for peripheral in peripherals {
            let Ok(Some(props)) = peripheral.properties().await else {
                continue;
            };
            let adv = Advertisement {
                id: peripheral.id().to_string(),
                address: props.address.to_string(),
                local_name: props.local_name,
                services: props.services,
            };
            seen.push((peripheral, adv));
        }
        Ok(seen)
    }

    /// Scans until `pick` selects an advertisement or `budget` runs out.
    async fn scan_until<F>(
        &self,
        budget: Duration,
        pick: F,
    ) -> Result<Option<(String, Peripheral)>, BridgeError>
    where
        F: Fn(&[Advertisement]) -> Option<&Advertisement>,
    {
        self.adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(|e| link_err("start scan", e))?;

        let deadline = Instant::now() + budget;
        let found = loop {
            let (peripherals, ads): (Vec<Peripheral>, Vec<Advertisement>) =
                self.advertisements().await?.into_iter().unzip();
            let picked = pick(&ads)
                .and_then(|adv| ads.iter().position(|seen| seen.id == adv.id));
            if let Some(index) = picked {
                break peripherals
                    .into_iter()
                    .nth(index)
                    .map(|p| (ads[index].id.clone(), p));
            }
            if Instant::now() >= deadline {
                break None;
            }
            sleep(SCAN_POLL).await;
        };

        if let Err(e) = self.adapter.stop_scan().await {
            tracing::debug!(error = %e, "stop scan failed");
        }
        Ok(found)
    }

    /// The discovered peripheral if it is `target`, else a lookup by id or
    /// address, scanning if it has not been seen yet.
    async fn find(&mut self, target: &str) -> Result<Peripheral, BridgeError> {
        let discovered = self.discovered.take();
        if let Some((_, peripheral)) = discovered.filter(|(id, _)| id.eq_ignore_ascii_case(target)) {
            return Ok(peripheral);
        }
        let known = self.advertisements().await?;
        if let Some((peripheral, _)) = known.into_iter().find(|(_, adv)| adv.is_target(target)) {
            return Ok(peripheral);
        }
        self.scan_until(SCAN_TIMEOUT, |ads| ads.iter().find(|adv| adv.is_target(target)))
            .await?
            .map(|(_, p)| p)
            .ok_or_else(|| BridgeError::Link(format!("peripheral {target} not seen")))
    }
}

#[async_trait]
impl RadioLink for BleLink {
    async fn discover(
        &mut self,
        filter: &TargetFilter,
        scan: Duration,
    ) -> Result<String, BridgeError> {
        tracing::info!(name = ?filter.name, scan_secs = scan.as_secs(), "scanning for peripheral");
        let (id, peripheral) = self
            .scan_until(scan, |ads| select_target(filter, ads))
            .await?
            .ok_or_else(|| filter.not_found())?;
        self.discovered = Some((id.clone(), peripheral));
        Ok(id)
    }

    async fn connect(&mut self, target: &str) -> Result<(), BridgeError> {
        let peripheral = self.find(target).await?;

        timeout(CONNECT_TIMEOUT, peripheral.connect())
            .await
            .map_err(|_| BridgeError::Link(format!("connect to {target} timed out")))?
            .map_err(|e| link_err("connect", e))?;
        peripheral
            .discover_services()
            .await
            .map_err(|e| link_err("discover services", e))?;

        let rx = peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == NUS_RX_CHAR_UUID)
            .ok_or_else(|| BridgeError::Link("UART RX characteristic not found".to_owned()))?;

        self.peripheral = Some(peripheral);
        self.rx = Some(rx);
        Ok(())
    }

    async fn is_connected(&mut self) -> bool {
        match (&self.peripheral, &self.rx) {
            (Some(p), Some(_)) => p.is_connected().await.unwrap_or(false),
            _ => false,
        }
    }

    async fn write(&mut self, data: &[u8]) -> Result<(), BridgeError> {
        let (Some(peripheral), Some(rx)) = (&self.peripheral, &self.rx) else {
            return Err(BridgeError::Link("not connected".to_owned()));
        };
        peripheral
            .write(rx, data, WriteType::WithResponse)
            .await
            .map_err(|e| link_err("write", e))
    }

    async fn disconnect(&mut self) {
        self.rx = None;
        if let Some(peripheral) = self.peripheral.take() {
            if let Err(e) = peripheral.disconnect().await {
                tracing::debug!(error = %e, "disconnect failed");
            }
        }
    }
}
