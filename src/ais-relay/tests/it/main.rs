#![deny(warnings)]
#![deny(rust_2018_idioms)]

use ais_relay::settings::Settings;
use config::{Config, File};

pub mod helper;
pub mod relay;
pub mod shared;

#[test]
fn test_local_settings_are_valid() {
    Settings::from_config(
        Config::builder()
            .add_source(File::with_name("config/local.yml").required(true))
            .set_override("environment", "Local")
            .unwrap()
            .set_override("feed.api_key", "test")
            .unwrap()
            .build()
            .unwrap(),
    )
    .unwrap();
}

#[test]
fn test_development_settings_are_valid() {
    Settings::from_config(
        Config::builder()
            .add_source(File::with_name("config/development.yml").required(true))
            .set_override("environment", "Development")
            .unwrap()
            .set_override("feed.api_key", "test")
            .unwrap()
            .build()
            .unwrap(),
    )
    .unwrap();
}

#[test]
fn test_production_settings_are_valid() {
    Settings::from_config(
        Config::builder()
            .add_source(File::with_name("config/production.yml").required(true))
            .set_override("environment", "Production")
            .unwrap()
            .set_override("feed.api_key", "test")
            .unwrap()
            .build()
            .unwrap(),
    )
    .unwrap();
}

#[test]
fn test_settings_without_api_key_are_rejected() {
    let result = Settings::from_config(
        Config::builder()
            .add_source(File::with_name("config/local.yml").required(true))
            .set_override("environment", "Local")
            .unwrap()
            .build()
            .unwrap(),
    );

    assert!(result.is_err());
}
