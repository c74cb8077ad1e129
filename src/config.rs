use aws_config::meta::region::RegionProviderChain;
use aws_config::BehaviorVersion;
use aws_types::region::Region;
use std::time::Duration;

/// Load the shared AWS SDK config. Credentials come from the default
/// provider chain; an explicit region flag wins over the environment.
pub async fn load_aws_config(region: Option<String>) -> aws_types::SdkConfig {
    let region_provider =
        RegionProviderChain::first_try(region.map(Region::new)).or_default_provider();

    aws_config::defaults(BehaviorVersion::v2024_03_28())
        .region(region_provider)
        .load()
        .await
}

/// Parameters for the state-transition poll loop.
///
/// The loop re-describes the affected instances every `interval` and gives
/// up after `max_attempts` rounds instead of blocking forever.
#[derive(Debug, Clone, Copy)]
pub struct PollSettings {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            max_attempts: 60,
        }
    }
}
