//! HTTP handlers for the Warehouse Management Platform

mod archival;
mod master;
mod picking;
mod shortage;
mod stock;
mod wave;

pub use archival::*;
pub use master::*;
pub use picking::*;
pub use shortage::*;
pub use stock::*;
pub use wave::*;
