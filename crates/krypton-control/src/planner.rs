//! Turns positional [`MotionRequest`]s into per-actuator encoder targets.
//!
//! Travel is computed in the robot frame first (positive = that wheel moves
//! the robot forward), then mapped into each encoder's raw frame through its
//! [`Polarity`][krypton_types::Polarity]:
//!
//! ```text
//! target[i] = start[i] + polarity[i] · travel[i]
//! ```
//!
//! For a curve of `degrees` around a centre `radius` inches away, the left
//! track follows an arc of `radius + W` and the right track `radius − W`,
//! where `W` is the track half-width.  When `radius < W` the inner track
//! reverses; when `radius == W` it does not move at all (pivot).

use krypton_types::{ActuatorState, ControlError, MotionPlan, MotionRequest, TrackConfig, require_finite};
use tracing::debug;

use crate::units::{DriveGeometry, curve_arc_length};

/// Plans drivetrain moves for a fixed actuator layout.
///
/// # Example
///
/// ```
/// use krypton_control::planner::PositionTargetPlanner;
/// use krypton_control::units::DriveGeometry;
/// use krypton_types::{ActuatorState, Mount, MotionRequest, Polarity, TrackConfig};
///
/// let planner = PositionTargetPlanner::new(
///     DriveGeometry::default(),
///     vec![
///         TrackConfig::new("drive_left", Mount::Left, Polarity::Inverted),
///         TrackConfig::new("drive_right", Mount::Right, Polarity::Normal),
///     ],
/// )
/// .unwrap();
///
/// let start = |id: &str| ActuatorState {
///     id: id.to_string(),
///     position: 1_000,
///     velocity: 0.0,
///     encoder_trusted: true,
/// };
/// let plan = planner
///     .plan(
///         &MotionRequest::RelativeRotation { degrees: 90.0, radius_inches: 12.0 },
///         &[start("drive_left"), start("drive_right")],
///     )
///     .unwrap();
///
/// // Pivot around the right track: only the left track moves.
/// assert_eq!(plan.speed_ratio, vec![1.0, 0.0]);
/// assert_eq!(plan.targets[1], 1_000);
/// assert!(plan.targets[0] < 1_000);
/// ```
#[derive(Debug, Clone)]
pub struct PositionTargetPlanner {
    geometry: DriveGeometry,
    layout: Vec<TrackConfig>,
}

impl PositionTargetPlanner {
    /// # Errors
    ///
    /// [`ControlError::InvalidArgument`] for invalid geometry, an empty
    /// layout, or duplicate actuator ids.
    pub fn new(geometry: DriveGeometry, layout: Vec<TrackConfig>) -> Result<Self, ControlError> {
        geometry.validate()?;
        validate_layout(&layout)?;
        Ok(Self { geometry, layout })
    }

    pub fn geometry(&self) -> &DriveGeometry {
        &self.geometry
    }

    pub fn layout(&self) -> &[TrackConfig] {
        &self.layout
    }

    /// Signed travel in ticks for every actuator, in the robot frame.
    ///
    /// # Errors
    ///
    /// [`ControlError::InvalidArgument`] for non-positional requests or
    /// non-finite parameters.
    pub fn travel(&self, request: &MotionRequest) -> Result<Vec<f64>, ControlError> {
        match *request {
            MotionRequest::RelativeDistance { inches } => {
                let ticks = self.geometry.inches_to_ticks(inches)?;
                Ok(vec![ticks; self.layout.len()])
            }
            MotionRequest::RelativeRotation {
                degrees,
                radius_inches,
            } => {
                let degrees = require_finite("degrees", degrees)?;
                let radius = require_finite("radius_inches", radius_inches)?;
                self.layout
                    .iter()
                    .map(|track| {
                        let r = self.geometry.effective_radius(track.mount.side(), radius);
                        self.geometry.inches_to_ticks(curve_arc_length(degrees, r)?)
                    })
                    .collect()
            }
            MotionRequest::AbsoluteVelocity { .. } | MotionRequest::AngularError { .. } => {
                Err(ControlError::invalid(
                    "request",
                    "only distance and rotation requests have position targets",
                ))
            }
        }
    }

    /// Build a [`MotionPlan`] from `start_states`, which must list the
    /// layout's actuators in layout order.
    ///
    /// # Errors
    ///
    /// - [`ControlError::InvalidArgument`] for non-positional requests,
    ///   non-finite parameters, or start states that do not match the layout.
    /// - [`ControlError::DegenerateRequest`] when every actuator's travel
    ///   rounds to zero ticks.
    pub fn plan(
        &self,
        request: &MotionRequest,
        start_states: &[ActuatorState],
    ) -> Result<MotionPlan, ControlError> {
        if start_states.len() != self.layout.len() {
            return Err(ControlError::invalid(
                "start_states",
                format!(
                    "expected {} actuator states, got {}",
                    self.layout.len(),
                    start_states.len()
                ),
            ));
        }
        if let Some((track, state)) = self
            .layout
            .iter()
            .zip(start_states)
            .find(|(track, state)| track.id != state.id)
        {
            return Err(ControlError::invalid(
                "start_states",
                format!("expected state for `{}`, got `{}`", track.id, state.id),
            ));
        }

        let travel = self.travel(request)?;
        if travel.iter().all(|t| t.round() == 0.0) {
            return Err(ControlError::DegenerateRequest(format!(
                "{request:?} moves no actuator by a whole tick"
            )));
        }

        let targets = self
            .layout
            .iter()
            .zip(start_states)
            .zip(&travel)
            .map(|((track, state), t)| {
                let delta = (track.polarity.sign() * t).round() as i64;
                state.position.saturating_add(delta)
            })
            .collect();

        let dominant = travel
            .iter()
            .copied()
            .fold(0.0_f64, |peak, t| if t.abs() > peak.abs() { t } else { peak });
        let speed_ratio = travel.iter().map(|t| t / dominant).collect();

        let plan = MotionPlan {
            targets,
            travel_ticks: travel,
            speed_ratio,
        };
        debug!(?request, targets = ?plan.targets, ratio = ?plan.speed_ratio, "planned move");
        Ok(plan)
    }
}

pub(crate) fn validate_layout(layout: &[TrackConfig]) -> Result<(), ControlError> {
    if layout.is_empty() {
        return Err(ControlError::invalid("layout", "at least one actuator is required"));
    }
    for (i, track) in layout.iter().enumerate() {
        if layout[..i].iter().any(|other| other.id == track.id) {
            return Err(ControlError::invalid(
                "layout",
                format!("actuator `{}` listed twice", track.id),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::f64::consts::PI;

    use super::*;
    use krypton_types::{Mount, Polarity};

    const W: f64 = 12.0;

    fn tank() -> PositionTargetPlanner {
        PositionTargetPlanner::new(
            DriveGeometry::default(),
            vec![
                TrackConfig::new("drive_left", Mount::Left, Polarity::Inverted),
                TrackConfig::new("drive_right", Mount::Right, Polarity::Normal),
            ],
        )
        .unwrap()
    }

    fn states(planner: &PositionTargetPlanner, positions: &[i64]) -> Vec<ActuatorState> {
        planner
            .layout()
            .iter()
            .zip(positions)
            .map(|(t, &p)| ActuatorState {
                id: t.id.clone(),
                position: p,
                velocity: 0.0,
                encoder_trusted: true,
            })
            .collect()
    }

    fn ticks(inches: f64) -> f64 {
        DriveGeometry::default().inches_to_ticks(inches).unwrap()
    }

    #[test]
    fn straight_move_is_symmetric() {
        let planner = tank();
        let plan = planner
            .plan(
                &MotionRequest::RelativeDistance { inches: 24.0 },
                &states(&planner, &[500, -500]),
            )
            .unwrap();
        let expected = ticks(24.0);
        assert_eq!(plan.travel_ticks[0], plan.travel_ticks[1]);
        assert!((plan.travel_ticks[0] - expected).abs() < 1e-9);
        assert_eq!(plan.speed_ratio, vec![1.0, 1.0]);
        // Inverted left counts down, normal right counts up.
        assert_eq!(plan.targets[0], 500 - expected.round() as i64);
        assert_eq!(plan.targets[1], -500 + expected.round() as i64);
    }

    #[test]
    fn quarter_pivot_matches_worked_example() {
        let planner = tank();
        let plan = planner
            .plan(
                &MotionRequest::RelativeRotation {
                    degrees: 90.0,
                    radius_inches: W,
                },
                &states(&planner, &[0, 0]),
            )
            .unwrap();
        let outer = ticks(2.0 * PI * 24.0 / 4.0);
        assert!((plan.travel_ticks[0] - outer).abs() < 1e-6);
        assert_eq!(plan.travel_ticks[1], 0.0);
        assert_eq!(plan.speed_ratio, vec![1.0, 0.0]);
        assert_eq!(plan.targets, vec![-(outer.round() as i64), 0]);
    }

    #[test]
    fn curve_ratio_matches_radii() {
        let planner = tank();
        let radius = 40.0;
        let plan = planner
            .plan(
                &MotionRequest::RelativeRotation {
                    degrees: 45.0,
                    radius_inches: radius,
                },
                &states(&planner, &[0, 0]),
            )
            .unwrap();
        let ratio = plan.travel_ticks[0] / plan.travel_ticks[1];
        assert!((ratio - (radius + W) / (radius - W)).abs() < 1e-9);
        assert_eq!(plan.speed_ratio[0], 1.0);
        assert!((plan.speed_ratio[1] - (radius - W) / (radius + W)).abs() < 1e-9);
    }

    #[test]
    fn tight_curve_reverses_inner_track() {
        let planner = tank();
        let plan = planner
            .plan(
                &MotionRequest::RelativeRotation {
                    degrees: 90.0,
                    radius_inches: 0.0,
                },
                &states(&planner, &[0, 0]),
            )
            .unwrap();
        // Spin in place: equal and opposite travel.
        assert!((plan.travel_ticks[0] + plan.travel_ticks[1]).abs() < 1e-9);
        assert!((plan.speed_ratio[1] + 1.0).abs() < 1e-12);
    }

    #[test]
    fn negative_dominant_gives_positive_self_ratio() {
        let planner = tank();
        let plan = planner
            .plan(
                &MotionRequest::RelativeDistance { inches: -10.0 },
                &states(&planner, &[0, 0]),
            )
            .unwrap();
        assert_eq!(plan.speed_ratio, vec![1.0, 1.0]);
        assert!(plan.targets[0] > 0);
        assert!(plan.targets[1] < 0);
    }

    #[test]
    fn zero_move_is_degenerate() {
        let planner = tank();
        let start = states(&planner, &[0, 0]);
        assert!(matches!(
            planner.plan(&MotionRequest::RelativeDistance { inches: 0.0 }, &start),
            Err(ControlError::DegenerateRequest(_))
        ));
        assert!(matches!(
            planner.plan(
                &MotionRequest::RelativeRotation {
                    degrees: 0.0,
                    radius_inches: 30.0
                },
                &start
            ),
            Err(ControlError::DegenerateRequest(_))
        ));
        // Less than half a tick also rounds to nothing.
        assert!(matches!(
            planner.plan(&MotionRequest::RelativeDistance { inches: 1e-6 }, &start),
            Err(ControlError::DegenerateRequest(_))
        ));
    }

    #[test]
    fn non_positional_requests_rejected() {
        let planner = tank();
        let start = states(&planner, &[0, 0]);
        let velocity = MotionRequest::AbsoluteVelocity {
            strafe: 0.0,
            forward: 1.0,
            rotate: 0.0,
        };
        assert!(matches!(
            planner.plan(&velocity, &start),
            Err(ControlError::InvalidArgument { .. })
        ));
        let aim = MotionRequest::AngularError {
            degrees: 3.0,
            distance_inches: None,
        };
        assert!(planner.plan(&aim, &start).is_err());
    }

    #[test]
    fn mismatched_states_rejected() {
        let planner = tank();
        let one = states(&planner, &[0]);
        assert!(matches!(
            planner.plan(&MotionRequest::RelativeDistance { inches: 5.0 }, &one),
            Err(ControlError::InvalidArgument { .. })
        ));
        let mut swapped = states(&planner, &[0, 0]);
        swapped.reverse();
        assert!(planner
            .plan(&MotionRequest::RelativeDistance { inches: 5.0 }, &swapped)
            .is_err());
    }

    #[test]
    fn non_finite_parameters_rejected() {
        let planner = tank();
        let start = states(&planner, &[0, 0]);
        assert!(matches!(
            planner.plan(
                &MotionRequest::RelativeRotation {
                    degrees: f64::NAN,
                    radius_inches: 12.0
                },
                &start
            ),
            Err(ControlError::InvalidArgument { .. })
        ));
        assert!(planner
            .plan(&MotionRequest::RelativeDistance { inches: f64::INFINITY }, &start)
            .is_err());
    }

    #[test]
    fn four_wheel_layout_groups_by_side() {
        let planner = PositionTargetPlanner::new(
            DriveGeometry::default(),
            vec![
                TrackConfig::new("fl", Mount::FrontLeft, Polarity::Inverted),
                TrackConfig::new("fr", Mount::FrontRight, Polarity::Normal),
                TrackConfig::new("bl", Mount::BackLeft, Polarity::Inverted),
                TrackConfig::new("br", Mount::BackRight, Polarity::Normal),
            ],
        )
        .unwrap();
        let travel = planner
            .travel(&MotionRequest::RelativeRotation {
                degrees: 30.0,
                radius_inches: 36.0,
            })
            .unwrap();
        assert_eq!(travel[0], travel[2]);
        assert_eq!(travel[1], travel[3]);
        assert!(travel[0] > travel[1]);
    }

    #[test]
    fn invalid_layouts_rejected() {
        assert!(PositionTargetPlanner::new(DriveGeometry::default(), vec![]).is_err());
        let dup = vec![
            TrackConfig::new("a", Mount::Left, Polarity::Normal),
            TrackConfig::new("a", Mount::Right, Polarity::Normal),
        ];
        assert!(PositionTargetPlanner::new(DriveGeometry::default(), dup).is_err());
    }
}
