use plog_core::{
    hud::{Ghost, GhostScene, Vec3},
    models::{ItemId, StationId},
    world::{InMemoryWorld, SharedWorld},
};

pub const IRON_INGOT: ItemId = ItemId(1101);
pub const COPPER_INGOT: ItemId = ItemId(1104);
pub const GEAR: ItemId = ItemId(1201);
pub const CONVEYOR_BELT: ItemId = ItemId(2001);

pub const SMELTER_DEPOT: StationId = StationId(1);
pub const ASSEMBLY_DEPOT: StationId = StationId(2);

const PLANET_RADIUS: f32 = 200.0;

/// Two stations, a few named items and room in every inventory.
pub fn build_world() -> SharedWorld {
    let mut world = InMemoryWorld::new();
    for (item, name) in [
        (IRON_INGOT, "Iron ingot"),
        (COPPER_INGOT, "Copper ingot"),
        (GEAR, "Gear"),
        (CONVEYOR_BELT, "Conveyor belt"),
    ] {
        world.name_item(item, name);
    }

    world.set_station_stock(SMELTER_DEPOT, IRON_INGOT, 60);
    world.set_station_stock(SMELTER_DEPOT, COPPER_INGOT, 400);
    world.set_station_stock(ASSEMBLY_DEPOT, GEAR, 35);
    world.set_station_stock(ASSEMBLY_DEPOT, IRON_INGOT, 0);
    SharedWorld::new(world)
}

/// Player standing on the surface with a handful of belt ghosts nearby.
pub fn ghost_scene() -> GhostScene {
    let surface = |lat: f32, lon: f32| {
        let (lat, lon) = (lat.to_radians(), lon.to_radians());
        Vec3::new(
            PLANET_RADIUS * lat.cos() * lon.sin(),
            PLANET_RADIUS * lat.sin(),
            -PLANET_RADIUS * lat.cos() * lon.cos(),
        )
    };
    GhostScene {
        ghosts: [(12.5, 45.0), (13.0, 46.0), (0.5, 0.5)]
            .into_iter()
            .map(|(lat, lon)| Ghost {
                position: surface(lat, lon),
                item_id: CONVEYOR_BELT,
            })
            .collect(),
        player: surface(0.0, 0.0),
        build_range: 10.0,
        gas_planet: false,
    }
}
