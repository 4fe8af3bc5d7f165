pub mod uploads;

use crate::app_config::LocalStorageConfig;

/// Configures the web app by adding services from each web file.
///
/// @see https://docs.rs/actix-web/4.0.1/actix_web/struct.App.html#method.configure
pub fn configure(conf: &mut actix_web::web::ServiceConfig) {
    uploads::configure(conf);
}

/// Serve locally stored uploads under their URL prefix.
///
/// Only mounted for the local backend; remote backends hand out absolute URLs.
pub fn configure_local_files(conf: &mut actix_web::web::ServiceConfig, local: &LocalStorageConfig) {
    conf.service(actix_files::Files::new(
        &local.normalized_url_prefix(),
        &local.base_dir,
    ));
}
