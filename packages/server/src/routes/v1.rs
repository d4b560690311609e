use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;

use crate::config::AppConfig;
use crate::handlers;
use crate::state::AppState;

pub fn routes(config: &AppConfig) -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .merge(upload_routes(config))
        .routes(routes!(handlers::assets::list_staged_assets))
        .routes(routes!(handlers::assets::get_asset))
        .routes(routes!(handlers::assets::confirm_assets))
        .merge(content_routes())
        .routes(routes!(handlers::admin::sweep_assets))
}

fn upload_routes(config: &AppConfig) -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(handlers::assets::upload_assets))
        .routes(routes!(handlers::assets::replace_avatar))
        .layer(handlers::assets::upload_body_limit(&config.upload))
}

fn content_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(handlers::content::content_saved))
        .routes(routes!(handlers::content::content_deleted))
}
