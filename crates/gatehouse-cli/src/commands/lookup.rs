use clap::Args;
use colored::Colorize;
use gatehouse_geo::{LookupOutcome, ReputationLookup, ReputationService};
use gatehouse_proxy::{AccessDecision, DebugSnapshot, PolicyEngine};
use std::path::PathBuf;
use tracing::debug;

use super::load_settings;

#[derive(Args)]
pub struct LookupCommand {
    /// Client address to look up
    pub ip: String,

    /// YAML settings file
    #[arg(long, env = "GATEHOUSE_SETTINGS")]
    pub settings: Option<PathBuf>,

    /// Override the reputation API base URL
    #[arg(long, env = "VPNAPI_BASE_URL")]
    pub reputation_base_url: Option<String>,

    /// Print the raw diagnostic snapshot as JSON
    #[arg(long)]
    pub json: bool,
}

impl LookupCommand {
    pub fn execute(self) -> anyhow::Result<()> {
        let settings = load_settings(self.settings.as_deref())?;
        let service = ReputationService::from_env(
            self.reputation_base_url.as_deref(),
            settings.guard.lookup_timeout(),
            &settings.guard.allowed_country,
        )?;

        let rt = tokio::runtime::Runtime::new()?;
        let outcome = rt.block_on(service.lookup(&self.ip));
        debug!("Lookup outcome for {}: {:?}", self.ip, outcome);

        let snapshot = DebugSnapshot::new(self.ip.clone(), &outcome);
        if self.json {
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
            return Ok(());
        }

        let policy = PolicyEngine::new(&settings.guard);
        let decision = policy.decide(&outcome, &mut rand::thread_rng());

        println!("{} {}", "Address:".bold(), self.ip);
        match &outcome {
            LookupOutcome::Detected(record) => {
                println!("{} {}", "Country:".bold(), record.country_code);
                println!("{} {}", "Organization:".bold(), record.organization);
                println!(
                    "{} vpn={} proxy={} tor={} relay={}",
                    "Flags:".bold(),
                    record.is_vpn,
                    record.is_proxy,
                    record.is_tor,
                    record.is_relay
                );
                if record.is_anonymized() && !record.is_vpn {
                    println!(
                        "{} only the VPN flag affects the decision",
                        "Note:".bold()
                    );
                }
                if record.is_vpn
                    && record
                        .country_code
                        .eq_ignore_ascii_case(&settings.guard.allowed_country)
                {
                    println!(
                        "{} {:.0}% of requests from this address are challenged",
                        "Note:".bold(),
                        settings.guard.captcha_probability * 100.0
                    );
                }
            }
            LookupOutcome::Undetermined { note } => {
                println!("{} {}", "Undetermined:".bold(), note.yellow());
            }
        }
        println!("{} {}", "Decision:".bold(), paint(decision));

        Ok(())
    }
}

fn paint(decision: AccessDecision) -> colored::ColoredString {
    match decision {
        AccessDecision::Allow => decision.as_str().green(),
        AccessDecision::Deny => decision.as_str().red(),
        AccessDecision::AllowWithVpnWarning | AccessDecision::AllowWithCaptchaChallenge => {
            decision.as_str().yellow()
        }
    }
}
