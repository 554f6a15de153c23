//! Policy configuration: named rule sets (TOD/POD/BOD) with nested
//! distance/height rings, plus the default "ballot measure" preset.
//!
//! The serialized shape of [`EvaluationConfig`] is the wire contract of the
//! evaluation service.

use serde_derive::{Deserialize, Serialize};

use crate::error::MilehighError;

/// Qualitative density tier for map styling and legends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Density {
    High,
    Medium,
    Low,
}

impl Density {
    #[must_use]
    pub fn from_height(height: u32) -> Self {
        match height {
            8.. => Density::High,
            5..=7 => Density::Medium,
            _ => Density::Low,
        }
    }

    /// The lowercase wire name, matching the serde representation.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Density::High => "high",
            Density::Medium => "medium",
            Density::Low => "low",
        }
    }
}

/// A distance threshold paired with an allowed building height.
///
/// `distance` is in feet. Rings within one policy are expected ascending by
/// distance but unordered input is tolerated; assignment always sorts first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ring {
    pub distance: f64,
    pub height: u32,
    #[serde(default)]
    pub zone: String,
    #[serde(default)]
    pub density: Option<Density>,
}

impl Ring {
    #[must_use]
    pub fn new(distance: f64, height: u32) -> Self {
        Self {
            distance,
            height,
            zone: String::new(),
            density: None,
        }
    }

    /// The ring's density label, derived from height when not set explicitly.
    #[must_use]
    pub fn density(&self) -> Density {
        self.density.unwrap_or_else(|| Density::from_height(self.height))
    }
}

/// Returns the rings sorted ascending by distance threshold (stable).
#[must_use]
pub fn sorted_rings(rings: &[Ring]) -> Vec<Ring> {
    let mut sorted = rings.to_vec();
    sorted.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    sorted
}

/// Picks the innermost ring whose threshold covers `distance_ft`: the first
/// ring, ascending by distance, with `threshold >= distance_ft`. `None` when
/// the parcel is farther than every ring.
#[must_use]
pub fn assign_ring(sorted: &[Ring], distance_ft: f64) -> Option<(usize, &Ring)> {
    sorted
        .iter()
        .enumerate()
        .find(|(_, ring)| distance_ft <= ring.distance)
}

/// The named policies, in combined-view precedence order. When a parcel
/// qualifies under several enabled policies at once, the first enabled
/// policy in this order is its `policy_source`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PolicyKind {
    Tod,
    Pod,
    Bod,
}

impl PolicyKind {
    pub const ALL: [PolicyKind; 3] = [PolicyKind::Tod, PolicyKind::Pod, PolicyKind::Bod];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            PolicyKind::Tod => "TOD",
            PolicyKind::Pod => "POD",
            PolicyKind::Bod => "BOD",
        }
    }
}

/// Transit-Oriented Development: rings measured to light-rail stations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TodConfig {
    pub enabled: bool,
    pub rings: Vec<Ring>,
}

/// Park-Oriented Development: independent ring lists for regional and
/// community parks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodConfig {
    pub enabled: bool,
    pub regional_parks: Vec<Ring>,
    pub community_parks: Vec<Ring>,
}

/// Bus-Oriented Development: independently toggleable BRT-line and
/// frequent-bus-stop sub-classes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BodConfig {
    pub enabled: bool,
    pub brt_enabled: bool,
    pub brt_rings: Vec<Ring>,
    pub bus_enabled: bool,
    pub bus_rings: Vec<Ring>,
}

/// The full evaluation request: which policies are on and their rings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationConfig {
    #[serde(default = "default_exclude_unlikely")]
    pub exclude_unlikely: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tod: Option<TodConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod: Option<PodConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bod: Option<BodConfig>,
}

fn default_exclude_unlikely() -> bool {
    true
}

impl EvaluationConfig {
    /// The documented default preset, mirroring the ballot measure: three
    /// TOD rings at 500/1000/1500 ft (8/5/3 stories), POD regional rings at
    /// 250/750 ft (5/3), a community ring at 250 ft (3), and a BOD bus ring
    /// at 250 ft (3) with BRT disabled.
    #[must_use]
    pub fn ballot_measure() -> Self {
        Self {
            exclude_unlikely: true,
            tod: Some(TodConfig {
                enabled: true,
                rings: vec![
                    Ring::new(500.0, 8),
                    Ring::new(1000.0, 5),
                    Ring::new(1500.0, 3),
                ],
            }),
            pod: Some(PodConfig {
                enabled: true,
                regional_parks: vec![Ring::new(250.0, 5), Ring::new(750.0, 3)],
                community_parks: vec![Ring::new(250.0, 3)],
            }),
            bod: Some(BodConfig {
                enabled: true,
                brt_enabled: false,
                brt_rings: vec![Ring::new(250.0, 3)],
                bus_enabled: true,
                bus_rings: vec![Ring::new(250.0, 3)],
            }),
        }
    }

    #[must_use]
    pub fn is_enabled(&self, kind: PolicyKind) -> bool {
        match kind {
            PolicyKind::Tod => self.tod.as_ref().is_some_and(|p| p.enabled),
            PolicyKind::Pod => self.pod.as_ref().is_some_and(|p| p.enabled),
            PolicyKind::Bod => self.bod.as_ref().is_some_and(|p| p.enabled),
        }
    }

    pub fn set_enabled(&mut self, kind: PolicyKind, enabled: bool) {
        match kind {
            PolicyKind::Tod => {
                if let Some(p) = self.tod.as_mut() {
                    p.enabled = enabled;
                }
            }
            PolicyKind::Pod => {
                if let Some(p) = self.pod.as_mut() {
                    p.enabled = enabled;
                }
            }
            PolicyKind::Bod => {
                if let Some(p) = self.bod.as_mut() {
                    p.enabled = enabled;
                }
            }
        }
    }

    /// Enabled policies in precedence order.
    #[must_use]
    pub fn enabled_policies(&self) -> Vec<PolicyKind> {
        PolicyKind::ALL
            .into_iter()
            .filter(|kind| self.is_enabled(*kind))
            .collect()
    }

    /// The ring distances a policy currently draws buffers at, innermost
    /// first. Used for immediate visual feedback on toggles.
    #[must_use]
    pub fn ring_distances(&self, kind: PolicyKind) -> Vec<f64> {
        let mut rings: Vec<f64> = match kind {
            PolicyKind::Tod => self
                .tod
                .iter()
                .flat_map(|p| p.rings.iter().map(|r| r.distance))
                .collect(),
            PolicyKind::Pod => self
                .pod
                .iter()
                .flat_map(|p| {
                    p.regional_parks
                        .iter()
                        .chain(p.community_parks.iter())
                        .map(|r| r.distance)
                })
                .collect(),
            PolicyKind::Bod => self
                .bod
                .iter()
                .flat_map(|p| {
                    let brt = p.brt_enabled.then_some(&p.brt_rings);
                    let bus = p.bus_enabled.then_some(&p.bus_rings);
                    brt.into_iter()
                        .chain(bus)
                        .flatten()
                        .map(|r| r.distance)
                        .collect::<Vec<_>>()
                })
                .collect(),
        };
        rings.sort_by(f64::total_cmp);
        rings.dedup();
        rings
    }

    /// Rejects out-of-range thresholds before they reach the evaluator.
    pub fn validate(&self) -> Result<(), MilehighError> {
        let mut all_rings: Vec<&Ring> = Vec::new();
        if let Some(p) = &self.tod {
            all_rings.extend(p.rings.iter());
        }
        if let Some(p) = &self.pod {
            all_rings.extend(p.regional_parks.iter());
            all_rings.extend(p.community_parks.iter());
        }
        if let Some(p) = &self.bod {
            all_rings.extend(p.brt_rings.iter());
            all_rings.extend(p.bus_rings.iter());
        }
        for ring in all_rings {
            if !ring.distance.is_finite() || ring.distance <= 0.0 {
                return Err(MilehighError::ConfigError(format!(
                    "ring distance must be a positive number of feet, got {}",
                    ring.distance
                )));
            }
            if ring.height == 0 {
                return Err(MilehighError::ConfigError(
                    "ring height must be at least one story".to_string(),
                ));
            }
        }
        Ok(())
    }
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self::ballot_measure()
    }
}
