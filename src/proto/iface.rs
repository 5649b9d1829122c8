//! # Interface collaborator seam.
//!
//! A protocol instance never touches addresses, routes or devices itself.
//! Every effect is one call on the [`Interface`] that owns the instance; the
//! interface manager implements the trait.

use serde_json::{Map, Value};

/// Protocol-level event delivered to the owning interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtoEvent {
    /// The link is up and configured.
    Up,
    /// Teardown completed.
    Down,
    /// The link went away while the interface was up or coming up.
    LinkLost,
}

/// How a layer-3 device is claimed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimMode {
    /// The device is created on demand and owned by this interface.
    Create,
    /// The device is managed externally; only a reference is taken.
    External,
}

/// Claimed reference to a layer-3 device.
///
/// Not `Clone`: each claim is handed back to [`Interface::release_device`]
/// exactly once.
#[derive(Debug, PartialEq, Eq)]
pub struct DeviceUser {
    ifname: String,
}

impl DeviceUser {
    /// Creates a claim token for `ifname`. Called by [`Interface::claim_device`] implementations.
    pub fn new(ifname: impl Into<String>) -> Self {
        Self {
            ifname: ifname.into(),
        }
    }

    /// Name of the claimed device.
    pub fn ifname(&self) -> &str {
        &self.ifname
    }
}

/// Interface-management operations a protocol instance depends on.
pub trait Interface: Send + 'static {
    /// Interface name (e.g. `"wan"`).
    fn name(&self) -> &str;

    /// Name of the interface's main device, if it has one.
    fn main_device(&self) -> Option<&str>;

    /// Delivers a protocol event.
    fn proto_event(&mut self, event: ProtoEvent);

    /// Claims `ifname` as the interface's layer-3 device.
    fn claim_device(&mut self, ifname: &str, mode: ClaimMode) -> DeviceUser;

    /// Releases a claim obtained from [`claim_device`](Interface::claim_device).
    fn release_device(&mut self, device: DeviceUser);

    /// Starts a configuration update.
    fn update_start(&mut self);

    /// Applies address settings carried by an `update-link` payload.
    fn apply_ip_settings(&mut self, data: &Map<String, Value>, external: bool);

    /// Installs one route.
    fn add_route(&mut self, route: &Map<String, Value>, v6: bool);

    /// Completes the configuration update.
    fn update_complete(&mut self);

    /// Records a structured error tagged with the protocol name.
    fn add_error(&mut self, proto: &str, code: &str, details: &[String]);

    /// Updates the availability flag.
    fn set_available(&mut self, available: bool);

    /// Updates eligibility for automatic restart.
    fn set_autostart(&mut self, autostart: bool);
}
