use chrono::Utc;
use dashmap::mapref::entry::Entry;
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::event::LiveEvent;
use crate::models::order::{DeliveryPoint, Order, OrderStatus};
use crate::models::user::Role;
use crate::state::AppState;

pub struct NewOrder {
    pub reference: String,
    pub pickup_location_id: Uuid,
    pub delivery_location_ids: Vec<Uuid>,
}

pub fn create_order(state: &AppState, new_order: NewOrder) -> Result<Order, AppError> {
    let reference = new_order.reference.trim().to_string();
    if reference.is_empty() {
        return Err(AppError::BadRequest("reference cannot be empty".to_string()));
    }

    ensure_location(state, new_order.pickup_location_id)?;
    for location_id in &new_order.delivery_location_ids {
        ensure_location(state, *location_id)?;
    }

    let now = Utc::now();
    let order = Order {
        id: Uuid::new_v4(),
        reference: reference.clone(),
        status: OrderStatus::Pending,
        pickup_location_id: new_order.pickup_location_id,
        delivery_points: sequence_points(&new_order.delivery_location_ids),
        driver_id: None,
        created_at: now,
        updated_at: now,
    };

    match state.order_references.entry(reference) {
        Entry::Occupied(entry) => {
            return Err(AppError::Conflict(format!(
                "order reference {} already exists",
                entry.key()
            )));
        }
        Entry::Vacant(entry) => {
            entry.insert(order.id);
        }
    }

    state.orders.insert(order.id, order.clone());

    // delete_location removes first and scans orders second, so one side
    // always sees the other.
    if let Err(err) = ensure_order_locations(state, &order) {
        state.orders.remove(&order.id);
        state.order_references.remove(&order.reference);
        return Err(err);
    }
    info!(order_id = %order.id, reference = %order.reference, "order created");

    Ok(order)
}

pub fn list_orders(state: &AppState, status: Option<OrderStatus>) -> Vec<Order> {
    let mut orders: Vec<Order> = state
        .orders
        .iter()
        .filter(|entry| status.is_none_or(|status| entry.value().status == status))
        .map(|entry| entry.value().clone())
        .collect();

    orders.sort_by_key(|order| order.created_at);
    orders
}

pub fn get_order(state: &AppState, order_id: Uuid) -> Result<Order, AppError> {
    state
        .orders
        .get(&order_id)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| AppError::NotFound(format!("order {} not found", order_id)))
}

/// Moves an order to `next` if the lifecycle allows it. The check and the
/// write happen under the order's entry lock.
pub fn transition(state: &AppState, order_id: Uuid, next: OrderStatus) -> Result<Order, AppError> {
    transition_with(state, order_id, next, |_| Ok(()))
}

/// `edit` runs after the lifecycle check and before the status is written.
/// It may reject the move, in which case nothing is changed.
fn transition_with<F>(
    state: &AppState,
    order_id: Uuid,
    next: OrderStatus,
    edit: F,
) -> Result<Order, AppError>
where
    F: FnOnce(&mut Order) -> Result<(), AppError>,
{
    let (order, from) = {
        let mut order = state
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| AppError::NotFound(format!("order {} not found", order_id)))?;

        let from = order.status;
        if !from.can_transition_to(next) {
            return Err(AppError::Conflict(format!(
                "order {} cannot move from {} to {}",
                order_id,
                from.as_str(),
                next.as_str()
            )));
        }

        edit(order.value_mut())?;
        order.status = next;
        order.updated_at = Utc::now();
        (order.clone(), from)
    };

    record_transition(state, order_id, from, next);
    Ok(order)
}

/// Status change requested by a dispatcher. Warehouse stages are driven by
/// the yard engine and driver assignment has its own operation.
pub fn update_status(
    state: &AppState,
    order_id: Uuid,
    next: OrderStatus,
) -> Result<Order, AppError> {
    match next {
        OrderStatus::Assigned => Err(AppError::BadRequest(
            "assign a driver to move an order to Assigned".to_string(),
        )),
        OrderStatus::AtWarehouse | OrderStatus::Loading | OrderStatus::Loaded => {
            Err(AppError::BadRequest(format!(
                "{} is set by warehouse operations",
                next.as_str()
            )))
        }
        OrderStatus::Pending => transition_with(state, order_id, next, |order| {
            if order.status != OrderStatus::Assigned {
                return Err(AppError::BadRequest(format!(
                    "only an Assigned order can be unassigned, order is {}",
                    order.status.as_str()
                )));
            }
            order.driver_id = None;
            Ok(())
        }),
        _ => transition(state, order_id, next),
    }
}

/// Settles the order once its warehouse visit completes. A visit that never
/// started loading hands the order back to its pre-arrival status so it can
/// return later. A cancelled order keeps its status.
pub fn finish_visit(state: &AppState, order_id: Uuid, loaded: bool) -> Result<Order, AppError> {
    let (order, change) = {
        let mut order = state
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| AppError::NotFound(format!("order {} not found", order_id)))?;

        let from = order.status;
        if from == OrderStatus::Cancelled {
            (order.clone(), None)
        } else {
            let next = match (loaded, order.driver_id) {
                (true, _) => OrderStatus::Loaded,
                (false, Some(_)) => OrderStatus::Assigned,
                (false, None) => OrderStatus::Pending,
            };
            if !from.can_transition_to(next) {
                return Err(AppError::Conflict(format!(
                    "order {} cannot move from {} to {}",
                    order_id,
                    from.as_str(),
                    next.as_str()
                )));
            }

            order.status = next;
            order.updated_at = Utc::now();
            (order.clone(), Some((from, next)))
        }
    };

    if let Some((from, to)) = change {
        record_transition(state, order_id, from, to);
    }
    Ok(order)
}

pub fn assign_driver(state: &AppState, order_id: Uuid, driver_id: Uuid) -> Result<Order, AppError> {
    {
        let driver = state
            .users
            .get(&driver_id)
            .ok_or_else(|| AppError::NotFound(format!("user {} not found", driver_id)))?;

        if driver.role != Role::Driver {
            return Err(AppError::BadRequest(format!("user {} is not a driver", driver_id)));
        }
        if !driver.active {
            return Err(AppError::Conflict(format!("driver {} is inactive", driver_id)));
        }
    }

    let (order, from) = {
        let mut order = state
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| AppError::NotFound(format!("order {} not found", order_id)))?;

        let from = order.status;
        if !matches!(from, OrderStatus::Pending | OrderStatus::Assigned) {
            return Err(AppError::Conflict(format!(
                "driver cannot be changed while order is {}",
                from.as_str()
            )));
        }

        order.driver_id = Some(driver_id);
        order.status = OrderStatus::Assigned;
        order.updated_at = Utc::now();
        (order.clone(), from)
    };

    if from != OrderStatus::Assigned {
        record_transition(state, order_id, from, OrderStatus::Assigned);
    }
    info!(order_id = %order_id, driver_id = %driver_id, "driver assigned to order");

    Ok(order)
}

/// Reorders the drop-off route. `location_ids` must be a permutation of the
/// current delivery locations.
pub fn resequence_delivery_points(
    state: &AppState,
    order_id: Uuid,
    location_ids: Vec<Uuid>,
) -> Result<Order, AppError> {
    let mut order = state
        .orders
        .get_mut(&order_id)
        .ok_or_else(|| AppError::NotFound(format!("order {} not found", order_id)))?;

    if matches!(
        order.status,
        OrderStatus::InTransit | OrderStatus::Delivered | OrderStatus::Cancelled
    ) {
        return Err(AppError::Conflict(format!(
            "delivery points are fixed once order is {}",
            order.status.as_str()
        )));
    }

    let mut current: Vec<Uuid> = order
        .delivery_points
        .iter()
        .map(|point| point.location_id)
        .collect();
    let mut requested = location_ids.clone();
    current.sort();
    requested.sort();
    if current != requested {
        return Err(AppError::BadRequest(
            "location_ids must list exactly the current delivery locations".to_string(),
        ));
    }

    order.delivery_points = sequence_points(&location_ids);
    order.updated_at = Utc::now();

    Ok(order.clone())
}

/// Stamps one delivery point. The order becomes Delivered once every point
/// has been stamped.
pub fn mark_delivered(state: &AppState, order_id: Uuid, sequence: u32) -> Result<Order, AppError> {
    let (order, completed) = {
        let mut order = state
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| AppError::NotFound(format!("order {} not found", order_id)))?;

        if order.status != OrderStatus::InTransit {
            return Err(AppError::Conflict(format!(
                "order {} is {}, not InTransit",
                order_id,
                order.status.as_str()
            )));
        }

        let now = Utc::now();
        let point = order
            .delivery_points
            .iter_mut()
            .find(|point| point.sequence == sequence)
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "delivery point {sequence} not found on order {order_id}"
                ))
            })?;

        if point.delivered_at.is_some() {
            return Err(AppError::Conflict(format!(
                "delivery point {sequence} already delivered"
            )));
        }
        point.delivered_at = Some(now);

        let completed = order
            .delivery_points
            .iter()
            .all(|point| point.delivered_at.is_some());
        if completed {
            order.status = OrderStatus::Delivered;
        }
        order.updated_at = now;

        (order.clone(), completed)
    };

    if completed {
        record_transition(state, order_id, OrderStatus::InTransit, OrderStatus::Delivered);
    }

    Ok(order)
}

fn record_transition(state: &AppState, order_id: Uuid, from: OrderStatus, to: OrderStatus) {
    state
        .metrics
        .order_transitions_total
        .with_label_values(&[to.as_str()])
        .inc();
    state.publish(LiveEvent::OrderStatusChanged { order_id, from, to });

    info!(
        order_id = %order_id,
        from = from.as_str(),
        to = to.as_str(),
        "order status changed"
    );
}

fn sequence_points(location_ids: &[Uuid]) -> Vec<DeliveryPoint> {
    location_ids
        .iter()
        .zip(1u32..)
        .map(|(location_id, sequence)| DeliveryPoint {
            location_id: *location_id,
            sequence,
            delivered_at: None,
        })
        .collect()
}

fn ensure_order_locations(state: &AppState, order: &Order) -> Result<(), AppError> {
    ensure_location(state, order.pickup_location_id)?;
    order
        .delivery_points
        .iter()
        .try_for_each(|point| ensure_location(state, point.location_id))
}

fn ensure_location(state: &AppState, location_id: Uuid) -> Result<(), AppError> {
    if state.locations.contains_key(&location_id) {
        Ok(())
    } else {
        Err(AppError::NotFound(format!("location {} not found", location_id)))
    }
}
