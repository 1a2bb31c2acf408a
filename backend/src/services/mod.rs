//! Business logic services for the Warehouse Management Platform

pub mod allocation;
pub mod archival;
pub mod master;
pub mod picking;
pub mod shortage;
pub mod stock;
pub mod wave;

pub use allocation::AllocationService;
pub use archival::ArchivalService;
pub use master::MasterDataService;
pub use picking::PickingService;
pub use shortage::ShortageService;
pub use stock::StockService;
pub use wave::WaveService;
