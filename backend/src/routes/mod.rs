//! Route definitions for the Warehouse Management Platform

use axum::{
    routing::{get, post},
    Router,
};

use crate::{handlers, AppState};

/// Create API routes
pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Master data (administered by external tooling; minimal surface here)
        .nest("/master", master_routes())
        // Stock ledger: receipts, positions, lots, reservation cancellation
        .nest("/stock", stock_routes())
        // Wave generation and inspection
        .nest("/waves", wave_routes())
        // Picking: confirmation, completion, force-ship
        .nest("/picking", picking_routes())
        // Shortages and proxy shipments
        .nest("/shortages", shortage_routes())
        // Lot archival job trigger
        .nest("/archival", archival_routes())
}

/// Master data routes
fn master_routes() -> Router<AppState> {
    Router::new()
        .route("/warehouses", post(handlers::create_warehouse))
        .route("/items", post(handlers::create_item))
        .route("/locations", post(handlers::create_location))
        .route("/routes", post(handlers::create_route))
        .route(
            "/outbound-lines",
            get(handlers::list_outbound_lines).post(handlers::create_outbound_line),
        )
}

/// Stock ledger routes
fn stock_routes() -> Router<AppState> {
    Router::new()
        .route("/receipts", post(handlers::confirm_receipt))
        .route("/positions/:warehouse_id", get(handlers::list_positions))
        .route(
            "/positions/:warehouse_id/:item_id",
            get(handlers::get_position),
        )
        .route("/lots/:warehouse_id/:item_id", get(handlers::list_lots))
        .route(
            "/lots/:lot_id/reservations",
            get(handlers::list_lot_reservations),
        )
        .route(
            "/reservations/:reservation_id/cancel",
            post(handlers::cancel_reservation),
        )
}

/// Wave orchestration routes
fn wave_routes() -> Router<AppState> {
    Router::new()
        .route("/generate", post(handlers::generate_waves))
        .route("/generate/manual", post(handlers::generate_waves_manual))
        .route("/:wave_id", get(handlers::get_wave))
        .route("/:wave_id/tasks", get(handlers::list_wave_tasks))
}

/// Picking and delivery confirmation routes
fn picking_routes() -> Router<AppState> {
    Router::new()
        .route("/results/:result_id/confirm", post(handlers::confirm_pick))
        .route("/tasks/:task_id", get(handlers::get_task))
        .route("/tasks/:task_id/assign", post(handlers::assign_picker))
        .route("/tasks/:task_id/complete", post(handlers::complete_task))
        .route("/tasks/:task_id/force-ship", post(handlers::force_ship))
}

/// Shortage and proxy-shipment routes
fn shortage_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(handlers::list_shortages).post(handlers::create_shortage),
        )
        .route("/:shortage_id", get(handlers::get_shortage))
        .route("/:shortage_id/cancel", post(handlers::cancel_shortage))
        .route("/:shortage_id/proxy", post(handlers::propose_proxy_shipment))
        .route(
            "/allocations/:allocation_id/confirm",
            post(handlers::confirm_proxy_shipment),
        )
        .route(
            "/allocations/:allocation_id/cancel",
            post(handlers::cancel_proxy_allocation),
        )
}

/// Archival job routes
fn archival_routes() -> Router<AppState> {
    Router::new().route("/run", post(handlers::run_archival))
}
