//! Terminal output.

use std::collections::BTreeMap;

use anyhow::Result;
use owo_colors::OwoColorize;
use paramconf::{ConfigSources, ParamsConfig};
use paramproto::{Client, Param, ParamType, ParamValue, ValueChange};

fn display_value(param: &Param) -> String {
    match param.ty() {
        ParamType::Image => match param.image_len() {
            Some(len) => format!("<image, {} bytes>", len),
            None => "<image, undecodable>".to_string(),
        },
        ParamType::Void => "<trigger>".to_string(),
        _ => param.get_value().to_string(),
    }
}

fn display_range(param: &Param) -> String {
    match param.opts().range() {
        Some((min, max)) => format!("[{} .. {}]", min, max),
        None => String::new(),
    }
}

/// Schema overview after connecting.
pub fn print_params(client: &dyn Client) {
    let params = client.params();
    println!(
        "{} {} ({} params)",
        client.id().to_string().bright_green().bold(),
        client.state().dimmed(),
        params.len()
    );
    for param in params.params() {
        println!(
            "  {:<32} {} {:<24} {}",
            param.path().bright_cyan(),
            param.ty().tag().dimmed(),
            display_value(&param),
            display_range(&param).dimmed()
        );
    }
}

/// `path = value` lines; triggers never, images on request.
pub fn print_values(client: &dyn Client, images: bool) {
    for param in client.params().params() {
        if param.ty().is_trigger() || (param.ty() == ParamType::Image && !images) {
            continue;
        }
        println!("{} = {}", param.path().bright_cyan(), display_value(&param));
    }
}

pub fn print_values_json(values: &BTreeMap<String, ParamValue>) -> Result<()> {
    let json: serde_json::Map<String, serde_json::Value> = values
        .iter()
        .map(|(path, value)| (path.clone(), value.to_json()))
        .collect();
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

pub fn print_change(id: &str, change: &ValueChange) {
    println!("{} {} = {}", id.dimmed(), change.path.bright_cyan(), change.value);
}

pub fn print_config(config: &ParamsConfig, sources: &ConfigSources) {
    if sources.files.is_empty() {
        println!("# no config files found, using defaults");
    }
    for file in &sources.files {
        println!("# loaded {}", file.display());
    }
    for var in &sources.env_overrides {
        println!("# overridden by ${}", var);
    }
    println!("{}", config.to_toml());
}
