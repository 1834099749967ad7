use super::prelude::*;
use actix_web::{HttpResponse, web::Either};
use sim::ParamMap;

pub fn service(config: &Config) -> impl HttpServiceFactory + 'static {
    web::resource("/cadcad")
        .wrap(config.cors())
        .route(web::post().to(run_simulation))
}

async fn run_simulation(
    params: Either<web::Json<ParamMap>, web::Form<hashbrown::HashMap<String, String>>>,
    jobs: web::Data<JobRegistry>,
) -> Result<HttpResponse, Error> {
    let body = match params {
        Either::Left(web::Json(map)) => map,
        Either::Right(web::Form(form)) => form
            .into_iter()
            .map(|(key, value)| (key, serde_json::Value::String(value)))
            .collect(),
    };
    tracing::debug!("/cadcad {:?}", body);

    let result = jobs.submit(body).await?;
    Ok(HttpResponse::Ok().json(&*result))
}
