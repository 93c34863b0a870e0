use clap::Subcommand;
use quizscreen_core::Config;

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print a configuration value by dot-separated key
    Get { key: String },
    /// Set a configuration value by dot-separated key
    Set { key: String, value: String },
    /// Print the full configuration as JSON
    List,
}

pub fn run(action: ConfigAction) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = Config::load_or_default();

    match action {
        ConfigAction::Get { key } => match config.get(&key) {
            Some(value) => println!("{value}"),
            None => return Err(format!("unknown config key: {key}").into()),
        },
        ConfigAction::Set { key, value } => {
            config.set(&key, &value)?;
            println!("{key} = {value}");
        }
        ConfigAction::List => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
