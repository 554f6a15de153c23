//! Multi-policy parcel evaluation for housing-capacity mapping
//!
//! `milehigh` overlays a city's real-estate parcels with transit-, park-,
//! and bus-oriented development policies and estimates the housing units
//! that upzoning around those features could produce. Each policy defines
//! concentric distance rings around a feature class (light-rail stations,
//! parks by size, frequent bus stops); parcels inside a ring get a height
//! assignment, an assigned zone code, and a unit estimate from a
//! stories-to-density table.
//!
//! The crate splits along a compute boundary:
//! * The evaluation service (`evaluator`, plus `parcel`, `features`,
//!   `zoning`, `density` and the spatial plumbing in `geometry` and
//!   `index`) turns a policy configuration into classified parcels and
//!   summary totals. It can run in-process or behind the HTTP API in
//!   `server`.
//! * The map side (`controller`, `presenter`, `buffer`, `timer`) owns the
//!   interactive session: policy toggles, overlay drawing, result display,
//!   and failure notifications, talking to the service through the
//!   `client` seam.
//!
//! The `runner` module provides the CLI for one-shot evaluations with CSV
//! reports (`report`) or for serving the API.
pub mod buffer;
pub mod client;
pub mod controller;
pub mod density;
pub mod error;
pub mod evaluator;
pub mod features;
pub mod geometry;
pub mod index;
pub mod log;
pub mod parcel;
pub mod policy;
pub mod presenter;
pub mod report;
pub mod runner;
pub mod server;
pub mod timer;
pub mod zoning;

pub use error::MilehighError;
