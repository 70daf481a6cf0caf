use std::path::PathBuf;

use clap::Parser;

use vigil_core::Config;

/// Fall and vital-sign monitor that escalates by phone call.
///
/// Reads fall detections as JSON lines, polls vital signs from the data
/// store, and calls every contact over the serial modem when a danger
/// condition appears. Everything not given here comes from the environment
/// (and `.env`), see `VIGIL_PROFILE`.
#[derive(Parser, Debug)]
#[command(name = "vigil", version, about)]
pub struct CliArgs {
    /// Config profile; keys are looked up as `{PROFILE}_{KEY}` first
    #[arg(long, env = "VIGIL_PROFILE")]
    pub profile: Option<String>,

    /// Contact file, one phone number per line (overrides CONTACTS_FILE)
    #[arg(long)]
    pub contacts: Option<PathBuf>,

    /// Modem device node (overrides MODEM_DEVICE)
    #[arg(long)]
    pub modem: Option<PathBuf>,

    /// Fall-event feed path, `-` for stdin (overrides FALL_FEED)
    #[arg(long)]
    pub fall_feed: Option<String>,

    /// Vital data store endpoint (overrides VITALS_URL)
    #[arg(long)]
    pub vitals_url: Option<String>,

    /// Exit once the fall feed ends, after queued calls finish
    #[arg(long, env = "VIGIL_EXIT_ON_FEED_END")]
    pub exit_on_feed_end: bool,

    /// Print the effective configuration as JSON and exit
    #[arg(long)]
    pub print_config: bool,
}

impl CliArgs {
    /// Apply flag overrides on top of the environment config.
    pub fn apply(&self, config: &mut Config) {
        if let Some(path) = &self.contacts {
            config.contacts.path = path.clone();
        }
        if let Some(device) = &self.modem {
            config.modem.device = device.clone();
        }
        if let Some(feed) = &self.fall_feed {
            config.fall_feed.source = feed.clone();
        }
        if let Some(url) = &self.vitals_url {
            config.vitals.url = Some(url.clone());
        }
    }

    /// `--print-config` output: the effective config as pretty JSON, with
    /// credentials redacted.
    pub fn render_config(config: &Config) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&config.redacted_summary())
    }

    pub fn config(&self) -> Config {
        let mut config = match &self.profile {
            Some(profile) => Config::for_profile(profile),
            None => Config::from_env(),
        };
        self.apply(&mut config);
        config
    }
}
