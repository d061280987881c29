#[macro_use] extern crate log;
extern crate env_logger;

use async_std::task;

use pitwall::config::Config;
use pitwall::console::Console;
use pitwall::feed::client::SyncClient;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config_path = std::env::args().nth(1);
    let config = match Config::load(config_path.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            error!["{}", err];
            std::process::exit(2);
        }
    };
    info!["Using gateway {}", config.url];

    task::block_on(async {
        let (client, updates) = SyncClient::start(&config);

        let console = Console::new(&config, client.clone());
        console.run(updates).await;

        client.shutdown().await;
    });
}
