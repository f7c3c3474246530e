//! Radio link seam used by the bridge helper.
//!
//! The helper's command loop only needs discovery, connection and
//! acknowledged writes, so the radio stack sits behind [`RadioLink`]. The BLE
//! implementation lives in `ble.rs`; tests drive the loop with a scripted
//! link.

use super::error::BridgeError;
use async_trait::async_trait;
use std::time::Duration;
use uuid::Uuid;

/// Nordic UART service.
pub const NUS_SERVICE_UUID: Uuid = Uuid::from_u128(0x6e400001_b5a3_f393_e0a9_e50e24dcca9e);

/// UART RX characteristic (central writes here).
pub const NUS_RX_CHAR_UUID: Uuid = Uuid::from_u128(0x6e400002_b5a3_f393_e0a9_e50e24dcca9e);

/// UART TX characteristic (peripheral notifies here). Not consumed.
pub const NUS_TX_CHAR_UUID: Uuid = Uuid::from_u128(0x6e400003_b5a3_f393_e0a9_e50e24dcca9e);

/// Scan budget for one discovery pass.
pub const SCAN_TIMEOUT: Duration = Duration::from_secs(8);

/// Address reported for every peripheral on platforms that hide MAC addresses.
pub const UNKNOWN_ADDRESS: &str = "00:00:00:00:00:00";

/// Which peripheral the helper should talk to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetFilter {
    /// Advertised name; matches exactly or as a prefix.
    pub name: Option<String>,
    /// Explicit platform identifier or MAC address; used without scanning.
    pub address: Option<String>,
}

impl TargetFilter {
    fn matches_name(&self, local_name: Option<&str>) -> bool {
        self.name
            .as_deref()
            .zip(local_name)
            .is_some_and(|(wanted, seen)| seen == wanted || seen.starts_with(wanted))
    }

    /// Name match, or the UART service UUID in the advertisement.
    pub fn matches(&self, adv: &Advertisement) -> bool {
        self.matches_name(adv.local_name.as_deref()) || adv.services.contains(&NUS_SERVICE_UUID)
    }

    /// Error naming the filter criteria.
    pub fn not_found(&self) -> BridgeError {
        BridgeError::TargetNotFound {
            name: self.name.clone(),
            address: self.address.clone(),
        }
    }
}

/// A peripheral seen during a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    /// Platform identifier: the MAC on Linux and Windows, a per-host UUID on
    /// macOS.
    pub id: String,
    /// MAC address; [`UNKNOWN_ADDRESS`] where the platform hides it.
    pub address: String,
    pub local_name: Option<String>,
    pub services: Vec<Uuid>,
}

impl Advertisement {
    /// Whether `target` names this peripheral by id or by a real address.
    pub fn is_target(&self, target: &str) -> bool {
        self.id.eq_ignore_ascii_case(target)
            || (self.address != UNKNOWN_ADDRESS && self.address.eq_ignore_ascii_case(target))
    }
}

/// Picks the best scan result: a name match wins over a service match.
pub fn select_target<'a>(
    filter: &TargetFilter,
    seen: &'a [Advertisement],
) -> Option<&'a Advertisement> {
    seen.iter()
        .find(|adv| filter.matches_name(adv.local_name.as_deref()))
        .or_else(|| seen.iter().find(|adv| filter.matches(adv)))
}

/// Radio operations the bridge helper relies on.
#[async_trait]
pub trait RadioLink: Send {
    /// Scans for up to `scan` and returns the platform id of a matching
    /// peripheral.
    async fn discover(
        &mut self,
        filter: &TargetFilter,
        scan: Duration,
    ) -> Result<String, BridgeError>;

    /// Connects to `target` (platform id or address) and resolves the RX
    /// characteristic.
    async fn connect(&mut self, target: &str) -> Result<(), BridgeError>;

    /// Whether the current connection is still up.
    async fn is_connected(&mut self) -> bool;

    /// Acknowledged write to the RX characteristic.
    async fn write(&mut self, data: &[u8]) -> Result<(), BridgeError>;

    /// Drops the connection and any cached characteristic handle.
    async fn disconnect(&mut self);
}
