//! `deskhand config` — show the effective configuration.

use deskhand_config::AppConfig;

pub fn run() -> anyhow::Result<()> {
    match AppConfig::load() {
        Ok(config) => {
            println!("{config:#?}");
            println!();
            println!(
                "config file: {}",
                AppConfig::config_dir().join("config.toml").display()
            );
            Ok(())
        }
        Err(e) => {
            eprintln!("Configuration is invalid: {e}");
            eprintln!();
            eprintln!("A default config looks like:");
            eprintln!("{}", AppConfig::default_toml());
            Err(e.into())
        }
    }
}
