//! Orchestrates the UI side of an evaluation session: configuration edits,
//! request lifecycle, overlay and layer visibility, and notifications.
//!
//! The controller is single-threaded and clock-agnostic. Callers drive it
//! with three kinds of input: user actions (toggles, resets, dismissals),
//! request completions from an [`crate::client::EvaluateClient`], and time
//! via [`Controller::tick`]. Completions carry the generation of the request
//! that produced them; only the latest generation can change what is shown.

use rustc_hash::FxHashMap;

use crate::buffer::{OverlayManager, Viewport};
use crate::error::MilehighError;
use crate::evaluator::EvaluationResult;
use crate::log::{debug, warn};
use crate::policy::{EvaluationConfig, PolicyKind};
use crate::presenter::Presenter;
use crate::timer::TimerQueue;

/// Seconds a failure notification stays up before expiring on its own.
pub const NOTIFICATION_TTL: f64 = 8.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    Evaluating { generation: u64 },
    Applied { generation: u64 },
    Failed { generation: u64 },
}

/// A request the caller should run against a client and complete with
/// [`Controller::complete`].
#[derive(Debug, Clone, PartialEq)]
pub struct PendingRequest {
    pub generation: u64,
    pub config: EvaluationConfig,
}

/// Emitted on every visibility toggle, before the re-evaluation resolves.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyToggled {
    pub policy: &'static str,
    pub enabled: bool,
    /// Current ring distances for the policy, innermost first.
    pub ring_distances: Vec<f64>,
}

/// A dismissible message with a deadline on the controller's clock.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub id: u64,
    pub message: String,
    pub expires_at: f64,
}

pub struct Controller {
    config: EvaluationConfig,
    state: ControllerState,
    generation: u64,
    presenter: Presenter,
    overlays: OverlayManager,
    notifications: FxHashMap<u64, Notification>,
    notification_counter: u64,
    expiry: TimerQueue<u64>,
    now: f64,
}

impl Controller {
    #[must_use]
    pub fn new(overlays: OverlayManager) -> Self {
        Controller {
            config: EvaluationConfig::ballot_measure(),
            state: ControllerState::Idle,
            generation: 0,
            presenter: Presenter::new(),
            overlays,
            notifications: FxHashMap::default(),
            notification_counter: 0,
            expiry: TimerQueue::new(),
            now: 0.0,
        }
    }

    #[must_use]
    pub fn state(&self) -> ControllerState {
        self.state
    }

    #[must_use]
    pub fn config(&self) -> &EvaluationConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut EvaluationConfig {
        &mut self.config
    }

    #[must_use]
    pub fn presenter(&self) -> &Presenter {
        &self.presenter
    }

    #[must_use]
    pub fn overlays(&self) -> &OverlayManager {
        &self.overlays
    }

    /// Registers a policy's overlay stamp features, loaded once per session.
    pub fn register_overlay_source(&mut self, policy: PolicyKind, geometries: &[geo::Geometry<f64>]) {
        self.overlays.set_source(policy.name(), geometries);
    }

    /// Starts a new evaluation of the current configuration. Any in-flight
    /// request is superseded: its completion will arrive with an older
    /// generation and be discarded.
    pub fn request_evaluation(&mut self) -> PendingRequest {
        self.generation += 1;
        self.state = ControllerState::Evaluating {
            generation: self.generation,
        };
        PendingRequest {
            generation: self.generation,
            config: self.config.clone(),
        }
    }

    /// Delivers the outcome of a request. Stale completions (an older
    /// generation than the latest issued) are discarded whatever their
    /// outcome. On success the parcel layer swaps atomically; on failure
    /// the previous applied state stays untouched and a dismissible
    /// notification is posted.
    pub fn complete(
        &mut self,
        generation: u64,
        outcome: Result<EvaluationResult, MilehighError>,
    ) {
        if generation < self.generation {
            debug!(
                "discarding stale completion (generation {generation} < {})",
                self.generation
            );
            return;
        }
        match outcome {
            Ok(result) => {
                self.presenter.apply(generation, result);
                self.state = ControllerState::Applied { generation };
            }
            Err(e) => {
                warn!("evaluation {generation} failed: {e}");
                self.state = ControllerState::Failed { generation };
                self.notify(format!("Evaluation failed: {e}"));
            }
        }
    }

    /// Enables or disables a policy. Overlay and parcel visibility update
    /// immediately; the returned request re-evaluates in the background.
    pub fn toggle_policy(
        &mut self,
        policy: PolicyKind,
        enabled: bool,
        viewport: &Viewport,
    ) -> (PolicyToggled, PendingRequest) {
        self.config.set_enabled(policy, enabled);
        self.presenter.set_policy_visible(policy.name(), enabled);
        self.sync_overlay(policy, viewport);
        let event = PolicyToggled {
            policy: policy.name(),
            enabled,
            ring_distances: self.config.ring_distances(policy),
        };
        let request = self.request_evaluation();
        (event, request)
    }

    /// Updates a policy's overlay to its current outermost ring distance, or
    /// removes it when the policy is off or has no rings.
    fn sync_overlay(&mut self, policy: PolicyKind, viewport: &Viewport) {
        let distances = self.config.ring_distances(policy);
        match distances.last() {
            Some(outermost) if self.config.is_enabled(policy) => {
                self.overlays.render(policy.name(), *outermost, viewport);
            }
            _ => self.overlays.hide(policy.name()),
        }
    }

    /// Changes a ring distance in place and redraws the affected overlay
    /// without reloading its features.
    pub fn update_overlay_distances(&mut self, policy: PolicyKind, viewport: &Viewport) {
        self.sync_overlay(policy, viewport);
    }

    /// Restores the ballot-measure preset, resets visibility, redraws every
    /// overlay, and re-evaluates.
    pub fn reset(&mut self, viewport: &Viewport) -> PendingRequest {
        self.config = EvaluationConfig::ballot_measure();
        for policy in PolicyKind::ALL {
            self.presenter
                .set_policy_visible(policy.name(), self.config.is_enabled(policy));
            self.sync_overlay(policy, viewport);
        }
        self.request_evaluation()
    }

    fn notify(&mut self, message: String) {
        let id = self.notification_counter;
        self.notification_counter += 1;
        let expires_at = self.now + NOTIFICATION_TTL;
        self.notifications.insert(
            id,
            Notification {
                id,
                message,
                expires_at,
            },
        );
        self.expiry.schedule(expires_at, id);
    }

    /// Active notifications, oldest first.
    #[must_use]
    pub fn notifications(&self) -> Vec<&Notification> {
        let mut active: Vec<&Notification> = self.notifications.values().collect();
        active.sort_by_key(|n| n.id);
        active
    }

    /// Dismisses a notification before its deadline. Unknown ids are a
    /// no-op.
    pub fn dismiss_notification(&mut self, id: u64) {
        self.notifications.remove(&id);
    }

    /// Advances the controller clock and expires due notifications.
    pub fn tick(&mut self, now: f64) {
        self.now = now;
        for id in self.expiry.pop_due(now) {
            // Already-dismissed ids fall through harmlessly.
            self.notifications.remove(&id);
        }
    }
}
