use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

use crate::config::Config;
use crate::engine::yard::YardRequest;
use crate::models::event::LiveEvent;
use crate::models::gps::GpsPoint;
use crate::models::order::Order;
use crate::models::registry::{City, Country, Location, Region};
use crate::models::user::User;
use crate::models::warehouse::{Gate, QueueItem};
use crate::observability::metrics::Metrics;

pub struct AppState {
    pub config: Config,

    pub users: DashMap<Uuid, User>,
    /// Lower-cased email -> user id.
    pub user_emails: DashMap<String, Uuid>,
    /// Device id -> user id.
    pub device_bindings: DashMap<String, Uuid>,

    pub countries: DashMap<Uuid, Country>,
    /// Upper-cased ISO code -> country id.
    pub country_codes: DashMap<String, Uuid>,
    pub regions: DashMap<Uuid, Region>,
    pub cities: DashMap<Uuid, City>,
    pub locations: DashMap<Uuid, Location>,

    pub orders: DashMap<Uuid, Order>,
    /// Order reference -> order id.
    pub order_references: DashMap<String, Uuid>,

    pub gps_by_driver: DashMap<Uuid, Vec<GpsPoint>>,
    pub gps_by_order: DashMap<Uuid, Vec<GpsPoint>>,
    pub latest_positions: DashMap<Uuid, GpsPoint>,
    gps_sequence: AtomicU64,

    /// Written only by the yard engine.
    pub gates: DashMap<Uuid, Gate>,
    /// Written only by the yard engine.
    pub queue_items: DashMap<Uuid, QueueItem>,
    queue_sequence: AtomicU64,

    pub yard_tx: mpsc::Sender<YardRequest>,
    pub events_tx: broadcast::Sender<LiveEvent>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(config: Config) -> (Self, mpsc::Receiver<YardRequest>) {
        let (yard_tx, yard_rx) = mpsc::channel(config.yard_queue_size);
        let (events_tx, _unused_rx) = broadcast::channel(config.event_buffer_size);

        (
            Self {
                config,
                users: DashMap::new(),
                user_emails: DashMap::new(),
                device_bindings: DashMap::new(),
                countries: DashMap::new(),
                country_codes: DashMap::new(),
                regions: DashMap::new(),
                cities: DashMap::new(),
                locations: DashMap::new(),
                orders: DashMap::new(),
                order_references: DashMap::new(),
                gps_by_driver: DashMap::new(),
                gps_by_order: DashMap::new(),
                latest_positions: DashMap::new(),
                gps_sequence: AtomicU64::new(1),
                gates: DashMap::new(),
                queue_items: DashMap::new(),
                queue_sequence: AtomicU64::new(1),
                yard_tx,
                events_tx,
                metrics: Metrics::new(),
            },
            yard_rx,
        )
    }

    pub fn next_gps_sequence(&self) -> u64 {
        self.gps_sequence.fetch_add(1, Ordering::Relaxed)
    }

    pub fn next_queue_sequence(&self) -> u64 {
        self.queue_sequence.fetch_add(1, Ordering::Relaxed)
    }

    /// Fan out to live feed subscribers. Having no subscribers is fine.
    pub fn publish(&self, event: LiveEvent) {
        let _ = self.events_tx.send(event);
    }
}
