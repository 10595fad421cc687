use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::engine::lifecycle;
use crate::error::AppError;
use crate::models::event::LiveEvent;
use crate::models::order::OrderStatus;
use crate::models::warehouse::{Gate, QueueItem, VisitStage};
use crate::state::AppState;

#[derive(Debug, Clone)]
pub enum YardCommand {
    CreateGate {
        location_id: Uuid,
        gate_number: String,
    },
    Arrive {
        order_id: Uuid,
    },
    AssignGate {
        item_id: Uuid,
        gate_id: Uuid,
        instructions: Option<String>,
    },
    StartLoading {
        item_id: Uuid,
    },
    CompleteLoading {
        item_id: Uuid,
    },
}

impl YardCommand {
    fn label(&self) -> &'static str {
        match self {
            YardCommand::CreateGate { .. } => "create_gate",
            YardCommand::Arrive { .. } => "arrive",
            YardCommand::AssignGate { .. } => "assign_gate",
            YardCommand::StartLoading { .. } => "start_loading",
            YardCommand::CompleteLoading { .. } => "complete_loading",
        }
    }
}

#[derive(Debug, Clone)]
pub enum YardOutcome {
    Gate(Gate),
    Item(QueueItem),
}

pub struct YardRequest {
    pub command: YardCommand,
    pub reply: oneshot::Sender<Result<YardOutcome, AppError>>,
}

/// Single writer for gates and queue items. Commands are applied one at a
/// time, so a gate can never be handed to two visits.
pub async fn run_yard_engine(state: Arc<AppState>, mut yard_rx: mpsc::Receiver<YardRequest>) {
    info!("yard engine started");

    while let Some(YardRequest { command, reply }) = yard_rx.recv().await {
        let label = command.label();
        let start = Instant::now();
        let result = apply(&state, command);

        state
            .metrics
            .yard_command_latency_seconds
            .with_label_values(&[label])
            .observe(start.elapsed().as_secs_f64());

        let outcome = match &result {
            Ok(_) => "success",
            Err(AppError::Internal(msg)) => {
                error!(command = label, error = %msg, "yard command failed");
                "error"
            }
            Err(_) => "rejected",
        };
        state
            .metrics
            .yard_commands_total
            .with_label_values(&[label, outcome])
            .inc();

        if reply.send(result).is_err() {
            warn!(command = label, "yard caller went away before reply");
        }
    }

    warn!("yard engine stopped: command channel closed");
}

pub async fn submit(state: &AppState, command: YardCommand) -> Result<YardOutcome, AppError> {
    let (reply, reply_rx) = oneshot::channel();

    state.yard_tx.send(YardRequest { command, reply }).await?;
    reply_rx.await?
}

pub async fn submit_for_item(
    state: &AppState,
    command: YardCommand,
) -> Result<QueueItem, AppError> {
    match submit(state, command).await? {
        YardOutcome::Item(item) => Ok(item),
        YardOutcome::Gate(_) => Err(AppError::Internal("expected queue item outcome".to_string())),
    }
}

pub async fn submit_for_gate(state: &AppState, command: YardCommand) -> Result<Gate, AppError> {
    match submit(state, command).await? {
        YardOutcome::Gate(gate) => Ok(gate),
        YardOutcome::Item(_) => Err(AppError::Internal("expected gate outcome".to_string())),
    }
}

/// Preconditions are checked before the order transition, and item and gate
/// writes only happen after it succeeds.
pub fn apply(state: &AppState, command: YardCommand) -> Result<YardOutcome, AppError> {
    match command {
        YardCommand::CreateGate {
            location_id,
            gate_number,
        } => create_gate(state, location_id, gate_number).map(YardOutcome::Gate),
        YardCommand::Arrive { order_id } => arrive(state, order_id).map(YardOutcome::Item),
        YardCommand::AssignGate {
            item_id,
            gate_id,
            instructions,
        } => assign_gate(state, item_id, gate_id, instructions).map(YardOutcome::Item),
        YardCommand::StartLoading { item_id } => {
            start_loading(state, item_id).map(YardOutcome::Item)
        }
        YardCommand::CompleteLoading { item_id } => {
            complete_loading(state, item_id).map(YardOutcome::Item)
        }
    }
}

fn create_gate(state: &AppState, location_id: Uuid, gate_number: String) -> Result<Gate, AppError> {
    if !state.locations.contains_key(&location_id) {
        return Err(AppError::NotFound(format!("location {} not found", location_id)));
    }

    let gate_number = gate_number.trim().to_string();
    if gate_number.is_empty() {
        return Err(AppError::BadRequest("gate_number cannot be empty".to_string()));
    }

    let duplicate = state.gates.iter().any(|entry| {
        let gate = entry.value();
        gate.location_id == location_id && gate.gate_number.eq_ignore_ascii_case(&gate_number)
    });
    if duplicate {
        return Err(AppError::Conflict(format!(
            "gate {gate_number} already exists at location {location_id}"
        )));
    }

    let gate = Gate {
        id: Uuid::new_v4(),
        location_id,
        gate_number,
        is_available: true,
        occupied_by: None,
        created_at: Utc::now(),
    };

    state.gates.insert(gate.id, gate.clone());
    if !state.locations.contains_key(&location_id) {
        state.gates.remove(&gate.id);
        return Err(AppError::NotFound(format!("location {} not found", location_id)));
    }
    state.publish(LiveEvent::GateUpdated(gate.clone()));
    info!(
        gate_id = %gate.id,
        location_id = %location_id,
        gate_number = %gate.gate_number,
        "gate created"
    );

    Ok(gate)
}

fn arrive(state: &AppState, order_id: Uuid) -> Result<QueueItem, AppError> {
    lifecycle::get_order(state, order_id)?;

    let already_queued = state
        .queue_items
        .iter()
        .any(|entry| entry.value().order_id == order_id && entry.value().is_open());
    if already_queued {
        return Err(AppError::Conflict(format!(
            "order {} already has an open warehouse visit",
            order_id
        )));
    }

    let order = lifecycle::transition(state, order_id, OrderStatus::AtWarehouse)?;

    let item = QueueItem {
        id: Uuid::new_v4(),
        sequence: state.next_queue_sequence(),
        order_id,
        location_id: order.pickup_location_id,
        driver_id: order.driver_id,
        gate_id: None,
        arrived_at: Utc::now(),
        assigned_at: None,
        started_at: None,
        completed_at: None,
        instructions: None,
    };

    state.queue_items.insert(item.id, item.clone());
    state.metrics.queue_items_open.inc();
    state.publish(LiveEvent::QueueItemUpdated(item.clone()));
    info!(
        item_id = %item.id,
        order_id = %order_id,
        location_id = %item.location_id,
        "driver arrived at warehouse"
    );

    Ok(item)
}

fn assign_gate(
    state: &AppState,
    item_id: Uuid,
    gate_id: Uuid,
    instructions: Option<String>,
) -> Result<QueueItem, AppError> {
    let item = find_item(state, item_id)?;
    match item.stage() {
        VisitStage::Waiting | VisitStage::Assigned => {}
        stage => {
            return Err(AppError::Conflict(format!(
                "queue item {} is {:?}; gate can no longer change",
                item_id, stage
            )));
        }
    }

    let gate = state
        .gates
        .get(&gate_id)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| AppError::NotFound(format!("gate {} not found", gate_id)))?;

    if gate.location_id != item.location_id {
        return Err(AppError::BadRequest(format!(
            "gate {} is not at the visit's location",
            gate_id
        )));
    }

    if let Some(holder) = gate.occupied_by {
        if holder != item_id {
            return Err(AppError::Conflict(format!(
                "gate {} is occupied by queue item {}",
                gate.gate_number, holder
            )));
        }
    }

    if let Some(previous) = item.gate_id.filter(|previous| *previous != gate_id) {
        release_gate(state, previous, item_id);
    }

    if gate.occupied_by.is_none() {
        if let Some(mut gate) = state.gates.get_mut(&gate_id) {
            gate.occupy(item_id);
        }
        state.metrics.gates_occupied.inc();
        publish_gate(state, gate_id);
    }

    let now = stamp_after(&item);
    let updated = update_item(state, item_id, |item| {
        item.gate_id = Some(gate_id);
        item.assigned_at = Some(now);
        if instructions.is_some() {
            item.instructions = instructions;
        }
    })?;

    info!(item_id = %item_id, gate_id = %gate_id, "gate assigned");
    Ok(updated)
}

fn start_loading(state: &AppState, item_id: Uuid) -> Result<QueueItem, AppError> {
    let item = find_item(state, item_id)?;
    if item.stage() != VisitStage::Assigned {
        return Err(AppError::Conflict(format!(
            "queue item {} is {:?}; loading requires an assigned gate",
            item_id,
            item.stage()
        )));
    }

    lifecycle::transition(state, item.order_id, OrderStatus::Loading)?;

    let now = stamp_after(&item);
    let updated = update_item(state, item_id, |item| item.started_at = Some(now))?;

    info!(item_id = %item_id, order_id = %item.order_id, "loading started");
    Ok(updated)
}

fn complete_loading(state: &AppState, item_id: Uuid) -> Result<QueueItem, AppError> {
    let item = find_item(state, item_id)?;
    if !item.is_open() {
        return Err(AppError::Conflict(format!(
            "queue item {} is already completed",
            item_id
        )));
    }

    // A cancelled order still has to leave the yard.
    lifecycle::finish_visit(state, item.order_id, item.started_at.is_some())?;

    let now = stamp_after(&item);
    let updated = update_item(state, item_id, |item| item.completed_at = Some(now))?;

    if let Some(gate_id) = item.gate_id {
        release_gate(state, gate_id, item_id);
    }

    state.metrics.queue_items_open.dec();
    if let Some(started_at) = item.started_at {
        let seconds = (now - started_at).num_milliseconds() as f64 / 1000.0;
        state.metrics.loading_duration_seconds.observe(seconds.max(0.0));
    }

    info!(item_id = %item_id, order_id = %item.order_id, "loading completed");
    Ok(updated)
}

fn find_item(state: &AppState, item_id: Uuid) -> Result<QueueItem, AppError> {
    state
        .queue_items
        .get(&item_id)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| AppError::NotFound(format!("queue item {} not found", item_id)))
}

fn update_item<F>(state: &AppState, item_id: Uuid, change: F) -> Result<QueueItem, AppError>
where
    F: FnOnce(&mut QueueItem),
{
    let updated = {
        let mut item = state
            .queue_items
            .get_mut(&item_id)
            .ok_or_else(|| AppError::Internal(format!("queue item {} vanished", item_id)))?;
        change(item.value_mut());
        item.clone()
    };

    state.publish(LiveEvent::QueueItemUpdated(updated.clone()));
    Ok(updated)
}

/// Frees the gate only if `item_id` still holds it.
fn release_gate(state: &AppState, gate_id: Uuid, item_id: Uuid) {
    let released = match state.gates.get_mut(&gate_id) {
        Some(mut gate) if gate.is_held_by(item_id) => {
            gate.release();
            true
        }
        _ => false,
    };

    if released {
        state.metrics.gates_occupied.dec();
        publish_gate(state, gate_id);
        info!(gate_id = %gate_id, item_id = %item_id, "gate released");
    } else {
        warn!(gate_id = %gate_id, item_id = %item_id, "gate not held by item; left untouched");
    }
}

fn publish_gate(state: &AppState, gate_id: Uuid) {
    if let Some(gate) = state.gates.get(&gate_id).map(|entry| entry.value().clone()) {
        state.publish(LiveEvent::GateUpdated(gate));
    }
}

/// Keeps the visit's timestamps non-decreasing even if the wall clock steps back.
fn stamp_after(item: &QueueItem) -> DateTime<Utc> {
    Utc::now().max(item.last_stamp())
}

pub fn queue_for_location(
    state: &AppState,
    location_id: Uuid,
    include_completed: bool,
) -> Result<Vec<QueueItem>, AppError> {
    if !state.locations.contains_key(&location_id) {
        return Err(AppError::NotFound(format!("location {} not found", location_id)));
    }

    let mut items: Vec<QueueItem> = state
        .queue_items
        .iter()
        .filter(|entry| entry.value().location_id == location_id)
        .filter(|entry| include_completed || entry.value().is_open())
        .map(|entry| entry.value().clone())
        .collect();

    items.sort_by_key(|item| (item.arrived_at, item.sequence));
    Ok(items)
}

pub fn gates_for_location(state: &AppState, location_id: Uuid) -> Result<Vec<Gate>, AppError> {
    if !state.locations.contains_key(&location_id) {
        return Err(AppError::NotFound(format!("location {} not found", location_id)));
    }

    let mut gates: Vec<Gate> = state
        .gates
        .iter()
        .filter(|entry| entry.value().location_id == location_id)
        .map(|entry| entry.value().clone())
        .collect();

    gates.sort_by(|a, b| a.gate_number.cmp(&b.gate_number));
    Ok(gates)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::{apply, queue_for_location, YardCommand, YardOutcome};
    use crate::config::Config;
    use crate::engine::lifecycle::{self, NewOrder};
    use crate::error::AppError;
    use crate::models::order::OrderStatus;
    use crate::models::registry::Location;
    use crate::models::warehouse::{Gate, QueueItem};
    use crate::state::AppState;

    struct Yard {
        state: AppState,
        location_id: Uuid,
    }

    impl Yard {
        fn new() -> Self {
            let (state, _rx) = AppState::new(Config::default());
            let location = Location {
                id: Uuid::new_v4(),
                city_id: Uuid::new_v4(),
                name: "north depot".to_string(),
                address: None,
                latitude: None,
                longitude: None,
            };
            let location_id = location.id;
            state.locations.insert(location_id, location);
            Self { state, location_id }
        }

        fn order(&self) -> Uuid {
            lifecycle::create_order(
                &self.state,
                NewOrder {
                    reference: Uuid::new_v4().to_string(),
                    pickup_location_id: self.location_id,
                    delivery_location_ids: Vec::new(),
                },
            )
            .unwrap()
            .id
        }

        fn gate(&self, number: &str) -> Gate {
            match apply(
                &self.state,
                YardCommand::CreateGate {
                    location_id: self.location_id,
                    gate_number: number.to_string(),
                },
            ) {
                Ok(YardOutcome::Gate(gate)) => gate,
                other => panic!("unexpected outcome: {other:?}"),
            }
        }

        fn item(&self, command: YardCommand) -> Result<QueueItem, AppError> {
            apply(&self.state, command).map(|outcome| match outcome {
                YardOutcome::Item(item) => item,
                YardOutcome::Gate(gate) => panic!("unexpected gate: {gate:?}"),
            })
        }

        fn arrive(&self, order_id: Uuid) -> QueueItem {
            self.item(YardCommand::Arrive { order_id }).unwrap()
        }

        fn assign(&self, item_id: Uuid, gate_id: Uuid) -> Result<QueueItem, AppError> {
            self.item(YardCommand::AssignGate {
                item_id,
                gate_id,
                instructions: None,
            })
        }

        fn gate_state(&self, gate_id: Uuid) -> Gate {
            self.state.gates.get(&gate_id).unwrap().clone()
        }

        fn order_status(&self, order_id: Uuid) -> OrderStatus {
            self.state.orders.get(&order_id).unwrap().status
        }
    }

    #[test]
    fn full_visit_releases_gate() {
        let yard = Yard::new();
        let order_id = yard.order();
        let gate = yard.gate("G1");

        let item = yard.arrive(order_id);
        assert_eq!(yard.order_status(order_id), OrderStatus::AtWarehouse);

        yard.assign(item.id, gate.id).unwrap();
        assert!(!yard.gate_state(gate.id).is_available);

        yard.item(YardCommand::StartLoading { item_id: item.id }).unwrap();
        assert_eq!(yard.order_status(order_id), OrderStatus::Loading);

        let done = yard
            .item(YardCommand::CompleteLoading { item_id: item.id })
            .unwrap();
        let assigned_at = done.assigned_at.unwrap();
        let started_at = done.started_at.unwrap();
        let completed_at = done.completed_at.unwrap();
        assert!(done.arrived_at <= assigned_at);
        assert!(assigned_at <= started_at);
        assert!(started_at <= completed_at);

        let gate = yard.gate_state(gate.id);
        assert!(gate.is_available);
        assert!(gate.occupied_by.is_none());
        assert_eq!(yard.order_status(order_id), OrderStatus::Loaded);
    }

    #[test]
    fn occupied_gate_cannot_be_double_booked() {
        let yard = Yard::new();
        let gate = yard.gate("G1");
        let first = yard.arrive(yard.order());
        let second = yard.arrive(yard.order());

        yard.assign(first.id, gate.id).unwrap();
        let result = yard.assign(second.id, gate.id);

        assert!(matches!(result, Err(AppError::Conflict(_))));
        assert_eq!(yard.gate_state(gate.id).occupied_by, Some(first.id));
        assert!(yard.state.queue_items.get(&second.id).unwrap().gate_id.is_none());
    }

    #[test]
    fn reassignment_frees_previous_gate() {
        let yard = Yard::new();
        let g1 = yard.gate("G1");
        let g2 = yard.gate("G2");
        let item = yard.arrive(yard.order());

        yard.assign(item.id, g1.id).unwrap();
        yard.assign(item.id, g2.id).unwrap();

        assert!(yard.gate_state(g1.id).is_available);
        assert_eq!(yard.gate_state(g2.id).occupied_by, Some(item.id));
        assert_eq!(yard.state.metrics.gates_occupied.get(), 1);
    }

    #[test]
    fn completing_without_gate_touches_no_gate() {
        let yard = Yard::new();
        let gate = yard.gate("G1");
        let holder = yard.arrive(yard.order());
        yard.assign(holder.id, gate.id).unwrap();

        let turned_away = yard.arrive(yard.order());
        let done = yard
            .item(YardCommand::CompleteLoading {
                item_id: turned_away.id,
            })
            .unwrap();

        assert!(done.completed_at.is_some());
        assert_eq!(yard.gate_state(gate.id).occupied_by, Some(holder.id));
    }

    #[test]
    fn turned_away_order_can_arrive_again() {
        let yard = Yard::new();
        let gate = yard.gate("G1");
        let order_id = yard.order();

        let first = yard.arrive(order_id);
        yard.assign(first.id, gate.id).unwrap();
        yard.item(YardCommand::CompleteLoading { item_id: first.id })
            .unwrap();
        assert_eq!(yard.order_status(order_id), OrderStatus::Pending);
        assert!(yard.gate_state(gate.id).is_available);

        let transit = lifecycle::update_status(&yard.state, order_id, OrderStatus::InTransit);
        assert!(matches!(transit, Err(AppError::Conflict(_))));

        let second = yard.arrive(order_id);
        assert_ne!(second.id, first.id);
        assert_eq!(yard.order_status(order_id), OrderStatus::AtWarehouse);
    }

    #[test]
    fn cancelled_order_still_leaves_the_yard() {
        let yard = Yard::new();
        let gate = yard.gate("G1");
        let order_id = yard.order();
        let item = yard.arrive(order_id);
        yard.assign(item.id, gate.id).unwrap();

        lifecycle::update_status(&yard.state, order_id, OrderStatus::Cancelled).unwrap();
        let done = yard
            .item(YardCommand::CompleteLoading { item_id: item.id })
            .unwrap();

        assert!(done.completed_at.is_some());
        assert_eq!(yard.order_status(order_id), OrderStatus::Cancelled);
        assert!(yard.gate_state(gate.id).is_available);
        assert_eq!(yard.state.metrics.gates_occupied.get(), 0);
        assert_eq!(yard.state.metrics.queue_items_open.get(), 0);
    }

    #[test]
    fn completed_item_stays_completed() {
        let yard = Yard::new();
        let item = yard.arrive(yard.order());
        let done = yard
            .item(YardCommand::CompleteLoading { item_id: item.id })
            .unwrap();

        let again = yard.item(YardCommand::CompleteLoading { item_id: item.id });
        assert!(matches!(again, Err(AppError::Conflict(_))));
        assert_eq!(
            yard.state.queue_items.get(&item.id).unwrap().completed_at,
            done.completed_at
        );
    }

    #[test]
    fn loading_requires_assigned_gate() {
        let yard = Yard::new();
        let item = yard.arrive(yard.order());
        let result = yard.item(YardCommand::StartLoading { item_id: item.id });
        assert!(matches!(result, Err(AppError::Conflict(_))));
    }

    #[test]
    fn second_open_visit_for_order_conflicts() {
        let yard = Yard::new();
        let order_id = yard.order();
        yard.arrive(order_id);
        let result = yard.item(YardCommand::Arrive { order_id });
        assert!(matches!(result, Err(AppError::Conflict(_))));
    }

    #[test]
    fn gate_numbers_are_unique_per_location() {
        let yard = Yard::new();
        yard.gate("G1");
        let result = apply(
            &yard.state,
            YardCommand::CreateGate {
                location_id: yard.location_id,
                gate_number: "g1".to_string(),
            },
        );
        assert!(matches!(result, Err(AppError::Conflict(_))));
    }

    #[test]
    fn queue_lists_open_items_in_arrival_order() {
        let yard = Yard::new();
        let first = yard.arrive(yard.order());
        let second = yard.arrive(yard.order());
        yard.item(YardCommand::CompleteLoading { item_id: first.id })
            .unwrap();

        let open = queue_for_location(&yard.state, yard.location_id, false).unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].id, second.id);

        let all = queue_for_location(&yard.state, yard.location_id, true).unwrap();
        assert_eq!(all.iter().map(|item| item.id).collect::<Vec<_>>(), vec![first.id, second.id]);
        assert!(all[0].arrived_at <= Utc::now());
    }
}
