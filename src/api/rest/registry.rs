use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use dashmap::mapref::entry::Entry;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::registry::{City, Country, Location, Region};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/countries", post(create_country).get(list_countries))
        .route("/countries/:id", get(get_country).delete(delete_country))
        .route("/regions", post(create_region).get(list_regions))
        .route("/regions/:id", get(get_region).delete(delete_region))
        .route("/cities", post(create_city).get(list_cities))
        .route("/cities/:id", get(get_city).delete(delete_city))
        .route("/locations", post(create_location).get(list_locations))
        .route("/locations/:id", get(get_location).delete(delete_location))
}

#[derive(Deserialize)]
pub struct CreateCountryRequest {
    pub code: String,
    pub name: String,
}

#[derive(Deserialize)]
pub struct CreateRegionRequest {
    pub country_id: Uuid,
    pub name: String,
}

#[derive(Deserialize)]
pub struct CreateCityRequest {
    pub region_id: Uuid,
    pub name: String,
}

#[derive(Deserialize)]
pub struct CreateLocationRequest {
    pub city_id: Uuid,
    pub name: String,
    pub address: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Deserialize)]
pub struct RegionFilter {
    pub country_id: Option<Uuid>,
}

#[derive(Deserialize)]
pub struct CityFilter {
    pub region_id: Option<Uuid>,
}

#[derive(Deserialize)]
pub struct LocationFilter {
    pub city_id: Option<Uuid>,
}

fn required_name(name: &str) -> Result<String, AppError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::BadRequest("name cannot be empty".to_string()));
    }
    Ok(name.to_string())
}

fn conflict_if(referenced: bool, what: &str, id: Uuid, by: &str) -> Result<(), AppError> {
    if referenced {
        return Err(AppError::Conflict(format!(
            "{what} {id} is still referenced by {by}"
        )));
    }
    Ok(())
}

async fn create_country(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateCountryRequest>,
) -> Result<Json<Country>, AppError> {
    let code = payload.code.trim().to_ascii_uppercase();
    if code.len() != 2 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(AppError::BadRequest(format!(
            "country code must be two letters, got {}",
            payload.code
        )));
    }

    let country = Country {
        id: Uuid::new_v4(),
        code,
        name: required_name(&payload.name)?,
    };

    match state.country_codes.entry(country.code.clone()) {
        Entry::Occupied(entry) => {
            return Err(AppError::Conflict(format!(
                "country {} already exists",
                entry.key()
            )));
        }
        Entry::Vacant(entry) => {
            entry.insert(country.id);
        }
    }

    state.countries.insert(country.id, country.clone());
    info!(country_id = %country.id, code = %country.code, "country created");
    Ok(Json(country))
}

async fn list_countries(State(state): State<Arc<AppState>>) -> Json<Vec<Country>> {
    let mut countries: Vec<Country> = state
        .countries
        .iter()
        .map(|entry| entry.value().clone())
        .collect();

    countries.sort_by(|a, b| a.code.cmp(&b.code));
    Json(countries)
}

async fn get_country(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Country>, AppError> {
    let country = state
        .countries
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("country {} not found", id)))?;

    Ok(Json(country.value().clone()))
}

async fn delete_country(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Country>, AppError> {
    let referenced = state
        .regions
        .iter()
        .any(|entry| entry.value().country_id == id);
    conflict_if(referenced, "country", id, "a region")?;

    let (_, country) = state
        .countries
        .remove(&id)
        .ok_or_else(|| AppError::NotFound(format!("country {} not found", id)))?;
    state.country_codes.remove(&country.code);

    info!(country_id = %id, "country deleted");
    Ok(Json(country))
}

async fn create_region(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateRegionRequest>,
) -> Result<Json<Region>, AppError> {
    if !state.countries.contains_key(&payload.country_id) {
        return Err(AppError::NotFound(format!(
            "country {} not found",
            payload.country_id
        )));
    }

    let region = Region {
        id: Uuid::new_v4(),
        country_id: payload.country_id,
        name: required_name(&payload.name)?,
    };

    state.regions.insert(region.id, region.clone());
    Ok(Json(region))
}

async fn list_regions(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<RegionFilter>,
) -> Json<Vec<Region>> {
    let mut regions: Vec<Region> = state
        .regions
        .iter()
        .filter(|entry| filter.country_id.is_none_or(|id| entry.value().country_id == id))
        .map(|entry| entry.value().clone())
        .collect();

    regions.sort_by(|a, b| a.name.cmp(&b.name));
    Json(regions)
}

async fn get_region(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Region>, AppError> {
    let region = state
        .regions
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("region {} not found", id)))?;

    Ok(Json(region.value().clone()))
}

async fn delete_region(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Region>, AppError> {
    let referenced = state.cities.iter().any(|entry| entry.value().region_id == id);
    conflict_if(referenced, "region", id, "a city")?;

    let (_, region) = state
        .regions
        .remove(&id)
        .ok_or_else(|| AppError::NotFound(format!("region {} not found", id)))?;

    info!(region_id = %id, "region deleted");
    Ok(Json(region))
}

async fn create_city(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateCityRequest>,
) -> Result<Json<City>, AppError> {
    if !state.regions.contains_key(&payload.region_id) {
        return Err(AppError::NotFound(format!(
            "region {} not found",
            payload.region_id
        )));
    }

    let city = City {
        id: Uuid::new_v4(),
        region_id: payload.region_id,
        name: required_name(&payload.name)?,
    };

    state.cities.insert(city.id, city.clone());
    Ok(Json(city))
}

async fn list_cities(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<CityFilter>,
) -> Json<Vec<City>> {
    let mut cities: Vec<City> = state
        .cities
        .iter()
        .filter(|entry| filter.region_id.is_none_or(|id| entry.value().region_id == id))
        .map(|entry| entry.value().clone())
        .collect();

    cities.sort_by(|a, b| a.name.cmp(&b.name));
    Json(cities)
}

async fn get_city(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<City>, AppError> {
    let city = state
        .cities
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("city {} not found", id)))?;

    Ok(Json(city.value().clone()))
}

async fn delete_city(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<City>, AppError> {
    let referenced = state.locations.iter().any(|entry| entry.value().city_id == id);
    conflict_if(referenced, "city", id, "a location")?;

    let (_, city) = state
        .cities
        .remove(&id)
        .ok_or_else(|| AppError::NotFound(format!("city {} not found", id)))?;

    info!(city_id = %id, "city deleted");
    Ok(Json(city))
}

async fn create_location(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateLocationRequest>,
) -> Result<Json<Location>, AppError> {
    if !state.cities.contains_key(&payload.city_id) {
        return Err(AppError::NotFound(format!(
            "city {} not found",
            payload.city_id
        )));
    }

    match (payload.latitude, payload.longitude) {
        (Some(lat), Some(lng)) if !crate::geo::is_valid_coordinate(lat, lng) => {
            return Err(AppError::BadRequest(format!("invalid coordinate ({lat}, {lng})")));
        }
        (Some(_), None) | (None, Some(_)) => {
            return Err(AppError::BadRequest(
                "latitude and longitude must be given together".to_string(),
            ));
        }
        _ => {}
    }

    let location = Location {
        id: Uuid::new_v4(),
        city_id: payload.city_id,
        name: required_name(&payload.name)?,
        address: payload
            .address
            .map(|address| address.trim().to_string())
            .filter(|address| !address.is_empty()),
        latitude: payload.latitude,
        longitude: payload.longitude,
    };

    state.locations.insert(location.id, location.clone());
    Ok(Json(location))
}

async fn list_locations(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<LocationFilter>,
) -> Json<Vec<Location>> {
    let mut locations: Vec<Location> = state
        .locations
        .iter()
        .filter(|entry| filter.city_id.is_none_or(|id| entry.value().city_id == id))
        .map(|entry| entry.value().clone())
        .collect();

    locations.sort_by(|a, b| a.name.cmp(&b.name));
    Json(locations)
}

async fn get_location(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Location>, AppError> {
    let location = state
        .locations
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("location {} not found", id)))?;

    Ok(Json(location.value().clone()))
}

async fn delete_location(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Location>, AppError> {
    // Remove before scanning: an order or gate created concurrently re-checks
    // its locations after inserting, so one of the two sides backs out.
    let (_, location) = state
        .locations
        .remove(&id)
        .ok_or_else(|| AppError::NotFound(format!("location {} not found", id)))?;

    if let Err(err) = ensure_location_unreferenced(&state, id) {
        state.locations.insert(id, location);
        return Err(err);
    }

    info!(location_id = %id, "location deleted");
    Ok(Json(location))
}

fn ensure_location_unreferenced(state: &AppState, id: Uuid) -> Result<(), AppError> {
    let by_order = state
        .orders
        .iter()
        .any(|entry| entry.value().references_location(id));
    conflict_if(by_order, "location", id, "an order pickup or delivery point")?;

    let by_gate = state.gates.iter().any(|entry| entry.value().location_id == id);
    conflict_if(by_gate, "location", id, "a warehouse gate")?;

    let by_visit = state
        .queue_items
        .iter()
        .any(|entry| entry.value().location_id == id);
    conflict_if(by_visit, "location", id, "a warehouse queue item")
}
