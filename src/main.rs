use env_logger::Env;

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let config = pitches::PitchesConfig::from_env();
    log::info!("starting pitches on {}", config.bind_addr);

    if let Err(e) = pitches::run(config) {
        log::error!("fatal: {e}");
        std::process::exit(1);
    }
}
