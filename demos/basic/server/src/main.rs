mod app;

use app::App;

#[tokio::main]
async fn main() {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let mut app = App::default();
    if let Err(error) = app.run().await {
        log::warn!("Demo stopped: {}", error);
    }
}
