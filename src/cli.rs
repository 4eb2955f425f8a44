//! Command line interface for the `thingwire` binary.
//!
//! Connects to a broker, subscribes to topics and registers thing shadows,
//! then logs everything the broker sends until interrupted.

use std::path::PathBuf;

use clap::Parser;

/// Command line arguments for the `thingwire` binary.
#[derive(Debug, Parser)]
#[command(name = "thingwire", version, about = "Watch topics and thing shadows on an IoT broker")]
pub struct Cli {
    /// TOML file with connection overrides.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Broker host name; takes precedence over the configuration file.
    #[arg(long)]
    pub host: Option<String>,

    /// Service region.
    #[arg(long)]
    pub region: Option<String>,

    /// Client identifier; generated when absent.
    #[arg(long)]
    pub client_id: Option<String>,

    /// Topic filter to subscribe to. May be repeated.
    #[arg(short = 't', long = "topic", value_name = "FILTER")]
    pub topics: Vec<String>,

    /// Thing whose shadow to register and fetch. May be repeated.
    #[arg(long = "thing", value_name = "NAME")]
    pub things: Vec<String>,

    /// Run in shadow mode; `--thing` is ignored without it.
    #[arg(long)]
    pub shadow: bool,
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::Cli;

    #[test]
    fn parses_repeated_topics_and_things() {
        let cli = Cli::parse_from([
            "thingwire",
            "--host",
            "broker.example",
            "-t",
            "a/b",
            "--topic",
            "c/#",
            "--thing",
            "lamp",
            "--shadow",
        ]);
        assert_eq!(cli.host.as_deref(), Some("broker.example"));
        assert_eq!(cli.topics, ["a/b", "c/#"]);
        assert_eq!(cli.things, ["lamp"]);
        assert!(cli.shadow);
    }

    #[test]
    fn defaults_to_device_mode() {
        let cli = Cli::parse_from(["thingwire"]);
        assert!(!cli.shadow);
        assert!(cli.config.is_none());
    }
}
