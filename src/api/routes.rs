// src/api/routes.rs
use actix_web::web;
use super::handlers;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .route("/health", web::get().to(handlers::health_check))
            .route("/ws", web::get().to(handlers::ws_handler))
            .service(
                web::scope("/rubrics")
                    .route("", web::post().to(handlers::create_rubric))
                    .route("/{id}", web::get().to(handlers::get_rubric))
            )
            .service(
                web::scope("/batches")
                    .route("", web::post().to(handlers::start_batch))
                    .route("/{id}", web::get().to(handlers::get_batch))
            )
            .service(
                web::scope("/grades")
                    .route("/essay", web::post().to(handlers::grade_essay))
                    .route("/{id}", web::get().to(handlers::get_grade))
            )
    );
}
