//! Outbound (Driven) ports for the chain assembler.

use shared_types::{DeviceId, PeerRole};

/// Read access to device roles and trust, backed by the peer registry.
pub trait AuthorityDirectory: Send + Sync {
    /// Role of a device, `None` if unknown.
    fn role(&self, device_id: &DeviceId) -> Option<PeerRole>;

    /// Trust of a device in [0, 1]; unknown devices have 0.
    fn trust_level(&self, device_id: &DeviceId) -> f64;
}

/// Fixed directory for tests.
#[cfg(test)]
pub struct MockAuthorities {
    entries: std::collections::HashMap<DeviceId, (PeerRole, f64)>,
}

#[cfg(test)]
impl MockAuthorities {
    pub fn new() -> Self {
        Self {
            entries: std::collections::HashMap::new(),
        }
    }

    pub fn with(mut self, device: &str, role: PeerRole, trust: f64) -> Self {
        self.entries.insert(DeviceId::new(device), (role, trust));
        self
    }
}

#[cfg(test)]
impl AuthorityDirectory for MockAuthorities {
    fn role(&self, device_id: &DeviceId) -> Option<PeerRole> {
        self.entries.get(device_id).map(|(role, _)| *role)
    }

    fn trust_level(&self, device_id: &DeviceId) -> f64 {
        self.entries.get(device_id).map(|(_, t)| *t).unwrap_or(0.0)
    }
}
