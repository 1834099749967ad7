use actix_web::{App, HttpServer, middleware::Logger, web};
use cache::FileStore;
use futures_util::future::ok;
use sim::JobRegistry;
use sim_server::{
    Config,
    api::{self, prelude::Success},
};
use std::{convert::Infallible, sync::Arc};

#[actix_web::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = Config::get_config();

    tracing::info!("allow CORS origins: {:?}", config.cors_origins);
    tracing::info!(
        "simulation command: {} {}",
        config.simulation.program,
        config.simulation.args.join(" ")
    );

    let store = match FileStore::session(&config.cache_root, chrono::Utc::now()) {
        Ok(store) => store,
        Err(e) => {
            tracing::error!(
                "failed to open cache store {}: {}",
                config.cache_root.display(),
                e
            );
            return;
        }
    };

    let jobs = web::Data::new(JobRegistry::new(
        config.simulation.param_spec(),
        config.simulation.runner(),
        Arc::new(store),
    ));

    let host = config.host.clone();
    let port = config.port;

    tracing::info!("listening on {:?} port {:?}", host, port);

    HttpServer::new(move || {
        let healthcheck = web::resource("/healthcheck")
            .route(web::get().to(|()| ok::<_, Infallible>(web::Json(Success))));
        App::new()
            .wrap(Logger::new(r#""%r" %s %b %Dms"#).exclude("/healthcheck"))
            .app_data(jobs.clone())
            .service(api::run_simulation::service(&config))
            .service(healthcheck)
    })
    .bind((host, port))
    .unwrap()
    .run()
    .await
    .unwrap();
}
