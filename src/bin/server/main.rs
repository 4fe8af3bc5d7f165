use actix_web::http::header;
use actix_web::middleware::{DefaultHeaders, Logger};
use actix_web::web::Data;
use actix_web::{App, HttpServer};
use bonsai_storage::app_config;
use bonsai_storage::storage::{ProviderKind, Storage};
use env_logger::Env;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    init_lib_mods();
    app_config::init();

    let config = app_config::get_config();

    // Pick and build the backend before any request can race on it.
    let storage = Data::new(Storage::from_app_config());
    let kind = storage.provider().kind();
    let limits = Data::new(config.limits.clone());

    let local = config.storage.local.clone();
    if kind == ProviderKind::Local {
        std::fs::create_dir_all(&local.base_dir)?;
        log::info!(
            "Serving local uploads from {:?} at {}",
            local.base_dir,
            local.normalized_url_prefix()
        );
    }

    log::info!(
        "Starting storage service ({} backend) on {}",
        kind,
        config.server.bind_address
    );

    HttpServer::new(move || {
        // Order of middleware IS IMPORTANT and is in REVERSE EXECUTION ORDER.
        App::new()
            .app_data(storage.clone())
            .app_data(limits.clone())
            .wrap(
                DefaultHeaders::new()
                    .add((header::X_CONTENT_TYPE_OPTIONS, "nosniff"))
                    .add(("Referrer-Policy", "strict-origin-when-cross-origin")),
            )
            .wrap(Logger::new("%a %r %s %{User-Agent}i"))
            .configure(bonsai_storage::web::configure)
            .configure(|conf| {
                if kind == ProviderKind::Local {
                    bonsai_storage::web::configure_local_files(conf, &local);
                }
            })
    })
    .bind(config.server.bind_address.as_str())?
    .run()
    .await
}

/// Initialize third party crates we rely on but don't have control over.
pub fn init_lib_mods() {
    // A .env file is optional; real deployments set the environment directly.
    if let Err(e) = dotenv::dotenv() {
        eprintln!("No .env file loaded: {}", e);
    }
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
}
