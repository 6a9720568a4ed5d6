use crate::inventory::Inventory;
use crate::models::{HostStatus, NewHost};
use crate::store::StoreError;
use tracing::info;

const DEMO_HOSTS: [(&str, &str, &str, &str, HostStatus); 5] = [
    ("8.8.8.8", "Google", "32 GB", "VM-Tooling", HostStatus::Down),
    ("192.168.1.155", "Kali Linux", "16 GB", "Personal PC", HostStatus::Down),
    ("192.168.1.154", "Ubuntu Linux", "8 GB", "Dell Tower", HostStatus::Down),
    ("192.168.1.153", "Red Hat Enterprise Linux", "16 GB", "Web Server", HostStatus::Down),
    ("192.168.1.152", "Debian", "32 GB", "Ultra PC", HostStatus::Up),
];

/// Populates an empty inventory with the demo hosts. Returns how many were added.
pub fn seed_demo_hosts(inventory: &Inventory) -> Result<usize, StoreError> {
    if inventory.len()? > 0 {
        return Ok(0);
    }
    for (address, name, memory, class, status) in DEMO_HOSTS {
        inventory.create(NewHost {
            address: Some(address.into()),
            name: name.into(),
            memory: memory.into(),
            class: class.into(),
            status: Some(status),
        })?;
    }
    info!(count = DEMO_HOSTS.len(), "seeded demo hosts");
    Ok(DEMO_HOSTS.len())
}
