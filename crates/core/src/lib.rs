#![warn(clippy::all, missing_docs)]

//! Core of the personal logistics subsystem.
//!
//! This crate tracks the inventory each player wants to carry, requests
//! missing items from the logistics network, ships surplus back into
//! storage, and keeps that state in sync across a multiplayer session.
//! Host integration happens through the [`world`], [`sync::Transport`]
//! and [`persist::BlobStore`] seams.

pub mod config;
pub mod cross_seed;
pub mod desired;
pub mod error;
pub mod hud;
pub mod logistics;
pub mod manager;
pub mod models;
pub mod network;
pub mod persist;
pub mod shipping;
pub mod sync;
pub mod trash;
pub mod world;

pub use config::AppConfig;
pub use cross_seed::CrossSeedInventoryState;
pub use desired::{DesiredInventoryStore, DesiredItemEntry};
pub use error::{LogisticsError, WorldError};
pub use logistics::{LogisticsSession, TickReport};
pub use manager::PersonalLogisticsManager;
pub use models::{ItemId, PlayerId, StationId};
pub use network::LogisticsNetwork;
pub use shipping::{ItemLoadState, ShipmentTask, ShippingManager};
pub use sync::{SyncLayer, SyncMessage, SyncRole};
pub use trash::TrashHandler;
pub use world::{NetworkScanner, World};
