//! Per-placement hooks run by the caller after generation.

use scree_geom::Vec3;
use scree_instancing::Placement;
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq)]
pub enum CallbackError {
    #[error("callback failed at {position:?}: {reason}")]
    Failed { position: Vec3, reason: String },
}

impl CallbackError {
    pub fn failed(position: Vec3, reason: impl Into<String>) -> Self {
        CallbackError::Failed {
            position,
            reason: reason.into(),
        }
    }
}

/// Something to run for each placement, e.g. a scripted spawn hook.
/// `position` is in the parent frame.
pub trait PlacementCallback {
    fn call(&mut self, position: Vec3, placement: &Placement) -> Result<(), CallbackError>;
}

impl<F> PlacementCallback for F
where
    F: FnMut(Vec3, &Placement) -> Result<(), CallbackError>,
{
    fn call(&mut self, position: Vec3, placement: &Placement) -> Result<(), CallbackError> {
        self(position, placement)
    }
}

/// Calls `callback` for each placement in order. Stops at the first failure
/// and returns it; otherwise returns how many calls were made.
pub fn dispatch_callback(
    callback: &mut dyn PlacementCallback,
    block_origin: Vec3,
    placements: &[Placement],
) -> Result<usize, CallbackError> {
    for (n, placement) in placements.iter().enumerate() {
        let position = block_origin + placement.position;
        if let Err(err) = callback.call(position, placement) {
            log::warn!("placement callback stopped after {} calls: {}", n, err);
            return Err(err);
        }
    }
    Ok(placements.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use scree_geom::Basis;

    fn placement(x: f32, index: u32) -> Placement {
        Placement {
            position: Vec3::new(x, 0.0, 0.0),
            basis: Basis::IDENTITY,
            scale: 1.0,
            octant: 0,
            candidate_index: index,
        }
    }

    #[test]
    fn visits_all_in_parent_frame() {
        let ps = [placement(1.0, 0), placement(2.0, 1)];
        let mut seen = Vec::new();
        let mut cb = |p: Vec3, _: &Placement| {
            seen.push(p);
            Ok::<(), CallbackError>(())
        };
        let n = dispatch_callback(&mut cb, Vec3::new(10.0, 0.0, 0.0), &ps).unwrap();
        assert_eq!(n, 2);
        assert_eq!(seen, vec![Vec3::new(11.0, 0.0, 0.0), Vec3::new(12.0, 0.0, 0.0)]);
    }

    #[test]
    fn stops_at_first_failure() {
        let ps = [placement(1.0, 0), placement(2.0, 1), placement(3.0, 2)];
        let mut calls = 0;
        let mut cb = |p: Vec3, pl: &Placement| {
            calls += 1;
            if pl.candidate_index == 1 {
                Err(CallbackError::failed(p, "script error"))
            } else {
                Ok(())
            }
        };
        let err = dispatch_callback(&mut cb, Vec3::ZERO, &ps).unwrap_err();
        assert_eq!(err, CallbackError::failed(Vec3::new(2.0, 0.0, 0.0), "script error"));
        assert_eq!(calls, 2);
    }
}
