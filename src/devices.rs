//! Device registry
//!
//! Registering a device binds an owner-only entitlement and a metadata
//! record to its root subject, then starts its producer task. Fields the
//! device later emits inherit both through first-sight promotion in the
//! pipeline.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, mpsc};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::entitlements::{AccessLevel, Entitlement, EntitlementStore, Status};
use crate::metadata::{Metadata, MetadataStore};
use crate::sensors::{DeviceKind, SensorMessage, spawn_producer};
use crate::subject::Subject;
use crate::Result;

const ADJECTIVES: &[&str] = &[
    "Amber", "Brave", "Brisk", "Calm", "Clever", "Dapper", "Eager", "Fuzzy", "Gentle", "Jolly",
    "Lucky", "Mellow", "Nimble", "Plucky", "Quiet", "Rusty", "Sunny", "Swift", "Tidy", "Witty",
];

const NOUNS: &[&str] = &[
    "Badger", "Beacon", "Comet", "Falcon", "Ferret", "Gecko", "Heron", "Kettle", "Lantern", "Marmot",
    "Otter", "Pebble", "Puffin", "Quokka", "Sparrow", "Teapot", "Thistle", "Walrus", "Willow", "Yak",
];

/// A registered device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub uid: String,
    #[serde(rename = "type")]
    pub kind: DeviceKind,
    pub name: String,
    pub description: String,
}

/// Registers simulated devices and runs their producers
pub struct DeviceRegistry {
    entitlements: Arc<EntitlementStore>,
    metadata: Arc<MetadataStore>,
    tx: mpsc::Sender<SensorMessage>,
    interval: Duration,
    cancel: CancellationToken,
    devices: RwLock<HashMap<String, Device>>,
}

impl DeviceRegistry {
    /// Create a registry whose devices send into `tx` every `interval`
    #[must_use]
    pub fn new(
        entitlements: Arc<EntitlementStore>,
        metadata: Arc<MetadataStore>,
        tx: mpsc::Sender<SensorMessage>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            entitlements,
            metadata,
            tx,
            interval,
            cancel,
            devices: RwLock::new(HashMap::new()),
        }
    }

    /// Register a device of the named type and start its producer
    ///
    /// # Errors
    ///
    /// Returns `Validation` if the type is unknown, in which case nothing is
    /// registered
    pub async fn register(&self, kind: &str) -> Result<Device> {
        let kind: DeviceKind = kind.parse()?;

        let uid = Uuid::new_v4().to_string();
        let subject = Subject::root_of(uid.as_str())?;

        self.entitlements
            .accepted
            .add(Entitlement::new(
                subject.clone(),
                AccessLevel::OwnerOnly,
                Status::Accepted,
            ))
            .await;

        let device = Device {
            uid: uid.clone(),
            kind,
            name: silly_name(),
            description: kind.description().to_string(),
        };

        self.metadata
            .add(Metadata {
                path: subject.to_string(),
                subject,
                name: device.name.clone(),
                description: device.description.clone(),
            })
            .await;

        spawn_producer(
            kind.sensor(),
            uid.clone(),
            self.interval,
            self.tx.clone(),
            self.cancel.child_token(),
        );

        self.devices.write().await.insert(uid, device.clone());

        tracing::info!(uid = %device.uid, kind = %kind, name = %device.name, "device registered");
        Ok(device)
    }

    /// Every registered device, ordered by name
    pub async fn all(&self) -> Vec<Device> {
        let mut list: Vec<Device> = self.devices.read().await.values().cloned().collect();
        list.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.uid.cmp(&b.uid)));
        list
    }
}

/// Two-word display name such as "Plucky Otter"
fn silly_name() -> String {
    let mut rng = rand::thread_rng();
    let adjective = ADJECTIVES.choose(&mut rng).copied().unwrap_or("Nameless");
    let noun = NOUNS.choose(&mut rng).copied().unwrap_or("Device");
    format!("{adjective} {noun}")
}
