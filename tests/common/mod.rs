use std::time::Duration;

pub fn init_logging() {
    let _ = dotenv::dotenv();
    let _ = pretty_env_logger::try_init();
}

pub fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}
