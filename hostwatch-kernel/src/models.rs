use serde::{Deserialize, Serialize};

pub type HostId = u64;

/// Reachability of a host as last observed by a ping.
/// Serialized with the names the dashboard frontend expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum HostStatus {
    #[serde(rename = "SERVER_UP")]
    Up,
    #[default]
    #[serde(rename = "SERVER_DOWN")]
    Down,
}

impl HostStatus {
    pub fn from_reachable(reachable: bool) -> Self {
        if reachable { HostStatus::Up } else { HostStatus::Down }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HostStatus::Up => "SERVER_UP",
            HostStatus::Down => "SERVER_DOWN",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostRecord {
    pub id: HostId,
    #[serde(rename = "ipAddr")]
    pub address: String,
    pub name: String,
    pub memory: String,
    #[serde(rename = "type")]
    pub class: String,
    #[serde(rename = "imageUrl")]
    pub image_ref: String,
    pub status: HostStatus,
}

/// Body of `POST /server/save`. Any `id` or `imageUrl` sent by the client is ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewHost {
    #[serde(rename = "ipAddr", default)]
    pub address: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub memory: String,
    #[serde(rename = "type", default)]
    pub class: String,
    #[serde(default)]
    pub status: Option<HostStatus>,
}

/// Body of `PUT /server/update`: the full record, keyed by `id`.
#[derive(Debug, Clone, Deserialize)]
pub struct HostUpdate {
    pub id: HostId,
    #[serde(rename = "ipAddr", default)]
    pub address: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub memory: String,
    #[serde(rename = "type", default)]
    pub class: String,
    #[serde(default)]
    pub status: Option<HostStatus>,
}
