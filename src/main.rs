use std::io;

use hogwatch::{Monitor, MonitorConfig, Result, SystemSource};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    log::info!("starting hogwatch v{}", env!("CARGO_PKG_VERSION"));

    let mut monitor = Monitor::new(SystemSource::new(), MonitorConfig::default())?;
    monitor.cancel_token().install_signal_handlers()?;

    let stdout = io::stdout();
    monitor.run(&mut stdout.lock())
}
