use actix_web::{web, App, HttpServer, middleware};
use actix_cors::Cors;
use essay_grader::api::handlers::WsBroker;
use essay_grader::api::{configure_routes, AppState};
use essay_grader::{banner, config};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    banner::print_banner();

    if let Err(e) = dotenvy::dotenv() {
        eprintln!("⚠️  Warning: Could not load .env file: {}", e);
        eprintln!("   Falling back to the process environment");
    }

    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let app_config = match config::AppConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            log::error!("❌ Invalid configuration: {}", e);
            return Err(std::io::Error::other(e.to_string()));
        }
    };

    let state = AppState::new(&app_config)
        .await
        .map_err(|e| std::io::Error::other(e.to_string()))?;
    let broker = WsBroker::new();

    log::info!(
        "🚀 Grading with '{}' backend, poll every {}ms, job timeout {}s",
        state.backend,
        app_config.grading.poll_interval_ms,
        app_config.grading.job_timeout_secs
    );
    println!("📊 API listening on http://{}", app_config.bind_addr);

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .app_data(web::Data::new(state.clone()))
            .app_data(web::Data::new(broker.clone()))
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .configure(configure_routes)
    })
    .bind(app_config.bind_addr.as_str())?
    .run()
    .await
}
