use std::sync::Arc;

use crate::config::AppConfig;
use crate::lifecycle::AssetLifecycle;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub lifecycle: Arc<AssetLifecycle>,
}
