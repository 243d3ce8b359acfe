use minerlink::{Client, Config, Sinks, Topic};
use serde_json::Value;

#[tokio::main]
async fn main() {
    pretty_env_logger::init();

    let config = Config::from_env()
        .map_err(|err| {
            println!("Invalid MINERLINK_* env var: {}", err);
            std::process::exit(1);
        })
        .unwrap();

    let sinks = Sinks::new()
        .miners(|data: &Value| {
            let count = data.as_array().map_or(0, |miners| miners.len());
            log::info!("Miners update, {} devices", count);
        })
        .alerts(|data: &Value| log::info!("Alerts update: {}", data))
        .system(|data: &Value| log::info!("System update: {}", data));

    let client = Client::start(config, sinks).unwrap();
    client.connect();
    client.update_subscriptions(Topic::ALL.map(|topic| (topic, true)));

    let mut status = client.watch_status();

    loop {
        tokio::select! {
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = status.borrow().clone();
                match current.error {
                    Some(err) => println!(
                        "{} ({}), attempts {}",
                        current.state, err, current.reconnect_attempts
                    ),
                    None => println!("{}", current.state),
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    client.shutdown().await.unwrap();
}
