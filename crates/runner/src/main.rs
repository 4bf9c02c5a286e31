use aegis_runner::{ConfigError, Session, load_config, load_default_config};
use log::info;

#[tokio::main]
async fn main() -> Result<(), ConfigError> {
    let config = match std::env::args().nth(1) {
        Some(path) => load_config(path)?,
        None => load_default_config()?,
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.log_level))
        .init();

    config.validate()?;
    info!("[SESSION] configuration loaded");

    let report = Session::new(config).run().await;
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
