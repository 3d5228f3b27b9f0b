use crate::clock::CampaignDeadline;
use crate::encoder::OctetLayout;
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const CAMPAIGN_MINUTES_ENV: &str = "FUZZ_CAMPAIGN_MINUTES";
pub const CONFIG_PATH_ENV: &str = "MESHPROBE_CONFIG";

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct CampaignSettings {
    #[serde(default)]
    pub minutes: u64,
    #[serde(default = "default_iterations")]
    pub iterations: u64,
    #[serde(default)]
    pub rng_seed: u64,
    #[serde(default = "default_artifacts_dir")]
    pub artifacts_dir: PathBuf,
}

pub fn default_iterations() -> u64 {
    1_000_000
}

pub fn default_artifacts_dir() -> PathBuf {
    PathBuf::from("./.meshprobe_artifacts")
}

impl Default for CampaignSettings {
    fn default() -> Self {
        Self {
            minutes: 0,
            iterations: default_iterations(),
            rng_seed: 0,
            artifacts_dir: default_artifacts_dir(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct EncoderSettings {
    #[serde(default)]
    pub octet_layout: OctetLayout,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct StackSettings {
    #[serde(default = "default_true")]
    pub inject_session: bool,
    #[serde(default)]
    pub log_inputs: bool,
    #[serde(default)]
    pub canary: bool,
    #[serde(default = "default_setup_passcode")]
    pub setup_passcode: u32,
    #[serde(default = "default_discriminator")]
    pub discriminator: u16,
}

fn default_true() -> bool {
    true
}

pub fn default_setup_passcode() -> u32 {
    20202021
}

pub fn default_discriminator() -> u16 {
    3840
}

impl Default for StackSettings {
    fn default() -> Self {
        Self {
            inject_session: true,
            log_inputs: false,
            canary: false,
            setup_passcode: default_setup_passcode(),
            discriminator: default_discriminator(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct CorpusSettings {
    #[serde(default)]
    pub seed_paths: Vec<PathBuf>,
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
    #[serde(default = "default_true")]
    pub builtin_seeds: bool,
}

pub fn default_max_entries() -> usize {
    4096
}

impl Default for CorpusSettings {
    fn default() -> Self {
        Self {
            seed_paths: Vec::new(),
            max_entries: default_max_entries(),
            builtin_seeds: true,
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct MeshprobeConfig {
    #[serde(default)]
    pub campaign: CampaignSettings,
    #[serde(default)]
    pub encoder: EncoderSettings,
    #[serde(default)]
    pub stack: StackSettings,
    #[serde(default)]
    pub corpus: CorpusSettings,
}

impl MeshprobeConfig {
    pub fn load_from_file(path: &Path) -> Result<Self, anyhow::Error> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file at {:?}: {}", path, e))?;

        let config: MeshprobeConfig = toml::from_str(&content).map_err(|e| {
            anyhow::anyhow!("Failed to parse TOML from config file {:?}: {}", path, e)
        })?;

        Ok(config)
    }

    /// Builds the process configuration from `MESHPROBE_CONFIG` (if set) and the
    /// campaign-minutes override. Called once at startup.
    pub fn from_env() -> Result<Self, anyhow::Error> {
        let mut config = match std::env::var_os(CONFIG_PATH_ENV) {
            Some(path) => Self::load_from_file(Path::new(&path))?,
            None => Self::default(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(CAMPAIGN_MINUTES_ENV) {
            let minutes = parse_campaign_minutes(&raw);
            if minutes > 0 {
                tracing::info!("{}: {}", CAMPAIGN_MINUTES_ENV, minutes);
            }
            self.campaign.minutes = minutes;
        }
    }

    pub fn deadline(&self) -> CampaignDeadline {
        CampaignDeadline::from_minutes(self.campaign.minutes)
    }
}

/// Leading-integer parse: optional whitespace and sign, then digits. Anything
/// unparsable or negative yields 0.
pub fn parse_campaign_minutes(raw: &str) -> u64 {
    let trimmed = raw.trim_start();
    let (negative, digits) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    if negative || end == 0 {
        return 0;
    }
    digits[..end].parse::<u64>().unwrap_or(u64::MAX)
}
