//! Configuration: settings files, constants, the static domain table and
//! the German response template pools.

pub mod constants;
pub mod domain;
pub mod responses;
pub mod settings;
pub mod vocab;

pub use domain::{
    all_domains, detect_domain, domain_config, DeviceWords, DomainConfig, StepConfig,
};
pub use settings::{
    CacheSettings, CloudSettings, ConfigError, EmbeddingSettings, LlmSettings, PendingSettings,
    RerankerSettings, Settings,
};
