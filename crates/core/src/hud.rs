//! Text projections shown on the player's HUD.

#![allow(missing_docs)]

use std::fmt::Write as _;

use crate::{models::ItemId, shipping::ItemLoadState};

/// Seconds added to every arrival estimate to cover the final unload.
const ARRIVAL_SLACK_SECONDS: u64 = 5;

/// Position on or above a planet surface, planet-centred.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn distance(self, other: Vec3) -> f32 {
        let (dx, dy, dz) = (self.x - other.x, self.y - other.y, self.z - other.z);
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    fn length(self) -> f32 {
        self.distance(Vec3::default())
    }
}

/// A construction ghost waiting for its item.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ghost {
    pub position: Vec3,
    pub item_id: ItemId,
}

/// Everything needed to locate the nearest ghost on the local planet.
#[derive(Debug, Clone, Default)]
pub struct GhostScene {
    pub ghosts: Vec<Ghost>,
    pub player: Vec3,
    pub build_range: f32,
    pub gas_planet: bool,
}

/// Closest ghost the player cannot reach from where they stand.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NearestGhost {
    pub ghost: Ghost,
    pub distance: f32,
    /// Every ghost on the planet, reachable or not.
    pub total: usize,
}

/// One line per inbound item, or `None` when nothing is on its way.
pub fn incoming_items_text(states: &[ItemLoadState]) -> Option<String> {
    if states.is_empty() {
        return None;
    }
    let mut text = String::new();
    for state in states {
        let _ = writeln!(
            text,
            "{} arriving in {} seconds",
            state.item_name,
            state.seconds_remaining + ARRIVAL_SLACK_SECONDS
        );
    }
    Some(text)
}

/// Nearest ghost outside build range. Gas planets never report one.
pub fn nearest_ghost(scene: &GhostScene) -> Option<NearestGhost> {
    if scene.gas_planet {
        return None;
    }
    scene
        .ghosts
        .iter()
        .map(|ghost| (ghost, ghost.position.distance(scene.player)))
        .filter(|(_, distance)| *distance > scene.build_range)
        .min_by(|(_, a), (_, b)| a.total_cmp(b))
        .map(|(ghost, distance)| NearestGhost {
            ghost: *ghost,
            distance,
            total: scene.ghosts.len(),
        })
}

/// `available` tells whether the player holds or expects the ghost's item.
pub fn ghost_status_line(nearest: &NearestGhost, item_name: &str, available: bool) -> String {
    let suffix = if available {
        format!("(total: {})", nearest.total)
    } else {
        "(Not available)".to_string()
    };
    format!(
        "Nearest ghost at {}, {item_name} {suffix}",
        position_to_lat_lon_string(nearest.ghost.position)
    )
}

/// Render a planet-centred position as degrees and minutes.
pub fn position_to_lat_lon_string(position: Vec3) -> String {
    let radius = position.length();
    if radius <= f32::EPSILON {
        return "0° 0' N, 0° 0' E".to_string();
    }
    let latitude = (position.y / radius).clamp(-1.0, 1.0).asin().to_degrees();
    let longitude = position.x.atan2(-position.z).to_degrees();

    let (lat_deg, lat_min) = degrees_minutes(latitude);
    let (lon_deg, lon_min) = degrees_minutes(longitude);
    let north = if latitude >= 0.0 { "N" } else { "S" };
    let east = if longitude >= 0.0 { "E" } else { "W" };
    format!("{lat_deg}° {lat_min}' {north}, {lon_deg}° {lon_min}' {east}")
}

fn degrees_minutes(angle: f32) -> (u32, u32) {
    let minutes = (angle.abs() * 60.0).round() as u32;
    (minutes / 60, minutes % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ghost(x: f32, y: f32, z: f32, item: u32) -> Ghost {
        Ghost {
            position: Vec3::new(x, y, z),
            item_id: ItemId(item),
        }
    }

    #[test]
    fn incoming_text_pads_arrival_estimate() {
        let states = vec![ItemLoadState {
            item_id: ItemId(42),
            item_name: "Iron ingot".to_string(),
            quantity: 60,
            percent_loaded: 50,
            seconds_remaining: 5,
        }];
        assert_eq!(
            incoming_items_text(&states).as_deref(),
            Some("Iron ingot arriving in 10 seconds\n")
        );
        assert!(incoming_items_text(&[]).is_none());
    }

    #[test]
    fn nearest_ghost_skips_reachable_ones() {
        let scene = GhostScene {
            ghosts: vec![ghost(0.0, 0.0, 5.0, 1), ghost(0.0, 0.0, 40.0, 2), ghost(0.0, 0.0, 90.0, 3)],
            player: Vec3::default(),
            build_range: 10.0,
            gas_planet: false,
        };
        let nearest = nearest_ghost(&scene).expect("ghost out of range");
        assert_eq!(nearest.ghost.item_id, ItemId(2));
        assert_eq!(nearest.total, 3);

        let gas = GhostScene {
            gas_planet: true,
            ..scene
        };
        assert!(nearest_ghost(&gas).is_none());
    }

    #[test]
    fn status_line_reports_availability() {
        let nearest = NearestGhost {
            ghost: ghost(1.0, 0.0, 0.0, 7),
            distance: 20.0,
            total: 4,
        };
        assert_eq!(
            ghost_status_line(&nearest, "Conveyor belt", true),
            "Nearest ghost at 0° 0' N, 90° 0' E, Conveyor belt (total: 4)"
        );
        assert_eq!(
            ghost_status_line(&nearest, "Conveyor belt", false),
            "Nearest ghost at 0° 0' N, 90° 0' E, Conveyor belt (Not available)"
        );
    }

    #[test]
    fn lat_lon_uses_hemisphere_letters() {
        let south_west = Vec3::new(-1.0, -1.0, 0.0);
        assert_eq!(position_to_lat_lon_string(south_west), "45° 0' S, 90° 0' W");

        let tilt = 12.5f32.to_radians();
        let position = Vec3::new(0.0, tilt.sin() * 200.0, -tilt.cos() * 200.0);
        assert_eq!(position_to_lat_lon_string(position), "12° 30' N, 0° 0' E");
    }
}
