//! The HTTP boundary of the evaluation service.
//!
//! Axum serves `POST /api/{command}` on a tokio runtime thread and forwards
//! every request over an mpsc channel to the engine loop, which owns the
//! parcel and feature data and runs on the caller's thread. Each request
//! carries a oneshot sender for its response, so the engine needs no shared
//! state and no locks.

use axum::extract::{Json, Path, State};
use axum::{http::StatusCode, routing::post, Router};
use serde_derive::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::thread;
use tokio::sync::mpsc;
use tokio::sync::oneshot;

use crate::client::{EvaluateClient, InProcessClient};
use crate::error::MilehighError;
use crate::geometry::representative_point;
use crate::log::{error, info};
use crate::policy::EvaluationConfig;

type ApiHandler =
    dyn Fn(&InProcessClient, serde_json::Value) -> Result<serde_json::Value, MilehighError>;

// Input to the engine loop.
struct ApiRequest {
    cmd: String,
    arguments: serde_json::Value,
    rx: oneshot::Sender<ApiResponse>,
}

// Output of the engine loop.
struct ApiResponse {
    success: bool,
    response: serde_json::Value,
}

#[derive(Clone)]
struct ApiEndpointServer {
    sender: mpsc::Sender<ApiRequest>,
}

async fn process_cmd(
    State(state): State<ApiEndpointServer>,
    Path(path): Path<String>,
    Json(payload): Json<serde_json::Value>,
) -> (StatusCode, Json<serde_json::Value>) {
    let (tx, rx) = oneshot::channel::<ApiResponse>();

    let _ = state
        .sender
        .send(ApiRequest {
            cmd: path,
            arguments: payload,
            rx: tx,
        })
        .await;

    match rx.await {
        Ok(ApiResponse {
            success: true,
            response,
        }) => (StatusCode::OK, Json(response)),
        Ok(ApiResponse {
            success: false,
            response,
        }) => (StatusCode::BAD_REQUEST, Json(response)),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({}))),
    }
}

#[tokio::main]
async fn serve(
    sender: mpsc::Sender<ApiRequest>,
    port: u16,
    ready: std::sync::mpsc::Sender<Result<u16, MilehighError>>,
) {
    let state = ApiEndpointServer { sender };

    let listener = match tokio::net::TcpListener::bind(format!("127.0.0.1:{port}")).await {
        Ok(listener) => listener,
        Err(e) => {
            let _ = ready.send(Err(MilehighError::MilehighError(format!(
                "could not bind to port {port}: {e}"
            ))));
            return;
        }
    };
    // Port 0 asks the OS for a free port; report the one we actually got.
    let bound_port = match listener.local_addr() {
        Ok(addr) => addr.port(),
        Err(e) => {
            let _ = ready.send(Err(MilehighError::IoError(e)));
            return;
        }
    };

    let app = Router::new()
        .route("/api/{command}", post(process_cmd))
        .with_state(state);

    let _ = ready.send(Ok(bound_port));
    if let Err(e) = axum::serve(listener, app).await {
        error!("server terminated: {e}");
    }
}

#[derive(Deserialize)]
struct ParcelArgs {
    parcel_id: String,
}

#[derive(Deserialize)]
struct FeatureArgs {
    class: String,
}

fn geo_feature(
    geo: &geo::Geometry<f64>,
    properties: serde_json::Map<String, serde_json::Value>,
) -> geojson::Feature {
    geojson::Feature {
        bbox: None,
        geometry: Some(geojson::Geometry::new(geojson::Value::from(geo))),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

fn feature_collection(features: Vec<geojson::Feature>) -> Result<serde_json::Value, MilehighError> {
    Ok(serde_json::to_value(geojson::FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    })?)
}

fn build_handlers() -> HashMap<String, Box<ApiHandler>> {
    let mut handlers: HashMap<String, Box<ApiHandler>> = HashMap::new();

    handlers.insert(
        "evaluate".to_string(),
        Box::new(|client, args| {
            let config: EvaluationConfig = serde_json::from_value(args)?;
            let result = client.evaluate(&config)?;
            Ok(serde_json::to_value(result)?)
        }),
    );

    handlers.insert(
        "stations".to_string(),
        Box::new(|client, _args| {
            let features: Vec<geojson::Feature> = client
                .catalog()
                .stations
                .iter()
                .map(|station| {
                    let mut properties = serde_json::Map::new();
                    properties.insert("name".to_string(), station.name.clone().into());
                    properties.insert(
                        "rail_line".to_string(),
                        station
                            .rail_line
                            .clone()
                            .map_or(serde_json::Value::Null, Into::into),
                    );
                    geojson::Feature {
                        bbox: None,
                        geometry: representative_point(&station.geo)
                            .map(|p| geojson::Geometry::new(geojson::Value::from(&p))),
                        id: None,
                        properties: Some(properties),
                        foreign_members: None,
                    }
                })
                .collect();
            feature_collection(features)
        }),
    );

    handlers.insert(
        "features".to_string(),
        Box::new(|client, args| {
            let args: FeatureArgs = serde_json::from_value(args)?;
            let catalog = client.catalog();
            let features: Vec<geojson::Feature> = match args.class.as_str() {
                "parks" => catalog
                    .parks
                    .iter()
                    .map(|park| {
                        let mut properties = serde_json::Map::new();
                        properties.insert("name".to_string(), park.name.clone().into());
                        properties
                            .insert("park_type".to_string(), park.park_type.name().into());
                        properties.insert(
                            "land_area_acres".to_string(),
                            park.land_area_acres.into(),
                        );
                        geo_feature(&park.geo, properties)
                    })
                    .collect(),
                "bus_stops" => catalog
                    .bus_stops
                    .iter()
                    .map(|stop| {
                        let mut properties = serde_json::Map::new();
                        properties.insert("stop_id".to_string(), stop.stop_id.clone().into());
                        properties.insert(
                            "stop_name".to_string(),
                            stop.name.clone().map_or(serde_json::Value::Null, Into::into),
                        );
                        properties.insert(
                            "am_trips_per_hour".to_string(),
                            stop.am_trips_per_hour.into(),
                        );
                        properties.insert(
                            "pm_trips_per_hour".to_string(),
                            stop.pm_trips_per_hour.into(),
                        );
                        geo_feature(&stop.geo, properties)
                    })
                    .collect(),
                "brt_lines" => catalog
                    .brt_lines
                    .iter()
                    .map(|line| {
                        let mut properties = serde_json::Map::new();
                        properties.insert("name".to_string(), line.name.clone().into());
                        geo_feature(&line.geo, properties)
                    })
                    .collect(),
                "rail_lines" => catalog
                    .rail_lines
                    .iter()
                    .map(|line| {
                        let mut properties = serde_json::Map::new();
                        properties.insert("route".to_string(), line.route.clone().into());
                        geo_feature(&line.geo, properties)
                    })
                    .collect(),
                other => {
                    return Err(MilehighError::MilehighError(format!(
                        "no feature class {other}"
                    )))
                }
            };
            feature_collection(features)
        }),
    );

    handlers.insert(
        "stats".to_string(),
        Box::new(|client, _args| {
            let catalog = client.catalog();
            Ok(json!({
                "parcels": client.parcels().len(),
                "skipped_invalid": client.parcels().skipped_invalid,
                "stations": catalog.stations.len(),
                "rail_lines": catalog.rail_lines.len(),
                "parks": catalog.parks.len(),
                "bus_stops": catalog.bus_stops.len(),
                "brt_lines": catalog.brt_lines.len(),
            }))
        }),
    );

    handlers.insert(
        "parcel".to_string(),
        Box::new(|client, args| {
            let args: ParcelArgs = serde_json::from_value(args)?;
            let parcel = client
                .parcels()
                .parcels
                .iter()
                .find(|p| p.parcel_id == args.parcel_id)
                .ok_or_else(|| {
                    MilehighError::MilehighError(format!("no parcel {}", args.parcel_id))
                })?;
            let mut properties = serde_json::Map::new();
            properties.insert("parcel_id".to_string(), parcel.parcel_id.clone().into());
            properties.insert(
                "address".to_string(),
                parcel
                    .address
                    .clone()
                    .map_or(serde_json::Value::Null, Into::into),
            );
            properties.insert(
                "zone_district".to_string(),
                parcel.zone_district.clone().into(),
            );
            properties.insert(
                "land_area_acres".to_string(),
                parcel.land_area_acres.into(),
            );
            Ok(serde_json::to_value(geojson::Feature {
                bbox: None,
                geometry: Some(parcel.geometry.clone()),
                id: Some(geojson::feature::Id::String(parcel.parcel_id.clone())),
                properties: Some(properties),
                foreign_members: None,
            })?)
        }),
    );

    handlers
}

fn run_engine(
    client: &InProcessClient,
    mut receiver: mpsc::Receiver<ApiRequest>,
    handlers: &HashMap<String, Box<ApiHandler>>,
) {
    while let Some(req) = receiver.blocking_recv() {
        let Some(handler) = handlers.get(&req.cmd) else {
            let _ = req.rx.send(ApiResponse {
                success: false,
                response: json!({
                    "error": format!("no command {}", req.cmd)
                }),
            });
            continue;
        };
        match handler(client, req.arguments) {
            Err(err) => {
                let _ = req.rx.send(ApiResponse {
                    success: false,
                    response: json!({
                        "error": err.to_string()
                    }),
                });
            }
            Ok(response) => {
                let _ = req.rx.send(ApiResponse {
                    success: true,
                    response,
                });
            }
        }
    }
}

/// Binds the HTTP listener, then runs the engine loop on the calling thread
/// until the server side shuts down. Returns early only on bind failure.
pub fn serve_forever(client: &InProcessClient, port: u16) -> Result<(), MilehighError> {
    let (ready, _unread) = std::sync::mpsc::channel();
    serve_and_report(client, port, &ready)
}

/// Like [`serve_forever`], but sends the bound port on `ready` once the
/// listener is accepting connections. Port 0 picks a free ephemeral port.
pub fn serve_and_report(
    client: &InProcessClient,
    port: u16,
    ready: &std::sync::mpsc::Sender<u16>,
) -> Result<(), MilehighError> {
    let (api_send, api_recv) = mpsc::channel::<ApiRequest>(32);

    let (bound_tx, bound_rx) = std::sync::mpsc::channel::<Result<u16, MilehighError>>();
    thread::spawn(move || serve(api_send, port, bound_tx));
    let bound_port = bound_rx
        .recv()
        .map_err(|_| MilehighError::MilehighError("server thread exited during startup".to_string()))??;

    info!("listening on 127.0.0.1:{bound_port}");
    let _ = ready.send(bound_port);
    run_engine(client, api_recv, &build_handlers());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{FeatureCatalog, Park, ParkType};
    use crate::parcel::ParcelSet;
    use geo::Point;

    // Port 0 so parallel test runs never collide; the ready channel carries
    // the port the OS picked.
    fn spawn_server_with(catalog: FeatureCatalog) -> u16 {
        let (ready_tx, ready_rx) = std::sync::mpsc::channel();
        thread::spawn(move || {
            let client = InProcessClient::new(ParcelSet::default(), catalog);
            serve_and_report(&client, 0, &ready_tx)
        });
        ready_rx.recv().expect("server did not start")
    }

    fn spawn_server() -> u16 {
        spawn_server_with(FeatureCatalog::default())
    }

    #[test]
    fn evaluate_round_trip() {
        let port = spawn_server();
        let http = reqwest::blocking::Client::new();
        let response = http
            .post(format!("http://127.0.0.1:{port}/api/evaluate"))
            .json(&EvaluationConfig::ballot_measure())
            .send()
            .unwrap();
        assert!(response.status().is_success());
        let body: serde_json::Value = response.json().unwrap();
        assert_eq!(body["summary"]["total_parcels"], 0);
        assert!(body["geojson"]["features"].as_array().unwrap().is_empty());
    }

    #[test]
    fn unknown_command_is_a_client_error() {
        let port = spawn_server();
        let http = reqwest::blocking::Client::new();
        let response = http
            .post(format!("http://127.0.0.1:{port}/api/nonsense"))
            .json(&json!({}))
            .send()
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
        let body: serde_json::Value = response.json().unwrap();
        assert!(body["error"].as_str().unwrap().contains("nonsense"));
    }

    #[test]
    fn missing_parcel_is_a_client_error() {
        let port = spawn_server();
        let http = reqwest::blocking::Client::new();
        let response = http
            .post(format!("http://127.0.0.1:{port}/api/parcel"))
            .json(&json!({"parcel_id": "nope"}))
            .send()
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    }

    #[test]
    fn features_endpoint_serves_reference_classes() {
        let catalog = FeatureCatalog {
            parks: vec![Park {
                name: "Big Park".to_string(),
                park_type: ParkType::Regional,
                land_area_acres: 120.0,
                geo: Point::new(-104.95, 39.79).into(),
            }],
            ..Default::default()
        };
        let port = spawn_server_with(catalog);
        let http = reqwest::blocking::Client::new();

        let response = http
            .post(format!("http://127.0.0.1:{port}/api/features"))
            .json(&json!({"class": "parks"}))
            .send()
            .unwrap();
        assert!(response.status().is_success());
        let body: serde_json::Value = response.json().unwrap();
        let features = body["features"].as_array().unwrap();
        assert_eq!(features.len(), 1);
        assert_eq!(features[0]["properties"]["name"], "Big Park");
        assert_eq!(features[0]["properties"]["park_type"], "regional");
        assert!(features[0]["geometry"].is_object());

        let response = http
            .post(format!("http://127.0.0.1:{port}/api/features"))
            .json(&json!({"class": "bus_stops"}))
            .send()
            .unwrap();
        let body: serde_json::Value = response.json().unwrap();
        assert!(body["features"].as_array().unwrap().is_empty());

        let response = http
            .post(format!("http://127.0.0.1:{port}/api/features"))
            .json(&json!({"class": "schools"}))
            .send()
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    }
}
