#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

mod bootstrap;
mod config;
mod error;
mod model_download;
mod pipeline;
mod status;
mod submission;
mod types;
mod ui;

use anyhow::Result;
use gpui::Application;

use crate::{
    config::AppConfig,
    model_download::{ModelFiles, base_url_locator, spawn_model_fetch},
};

fn main() -> Result<()> {
    env_logger::init();

    let config = AppConfig::load()?;
    let models = ModelFiles::in_dir(&config.runtime.model_dir);
    // The bootstrap waits for these files; fetching runs alongside it.
    let _fetch = spawn_model_fetch(
        models.clone(),
        base_url_locator(&config.runtime.model_base_url),
    );

    Application::new()
        .with_assets(gpui_component_assets::Assets)
        .run(move |app| {
            gpui_component::init(app);

            if let Err(err) = ui::launch_ui(app, config, models) {
                log::error!("failed to launch ui: {err:?}");
            }
        });

    Ok(())
}
