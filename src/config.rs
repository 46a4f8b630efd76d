// Runtime configuration (spec section 6, "Configuration (recognised
// options)"). A plain builder struct, validated once at `create` time;
// nothing here is reloaded at runtime.

use crate::error::{MdnsError, Result};

// Timing constants named directly in spec 4.5/4.6. These are the
// defaults `MdnsConfig` ships with; the announcing family is also
// independently tunable per-instance.
pub const PROBE_WAIT_MAX_MS: u64 = 250;
pub const PROBE_COUNT: u32 = 3;
pub const PROBE_RETRANSMIT_COUNT: u32 = 3;
pub const CONFLICT_COUNT_MAX: u32 = 15;
pub const GOODBYE_RETRANSMIT_COUNT: u32 = 3;
pub const GOODBYE_TIMER_COUNT: u32 = 1;
pub const RESPONSE_INTERVAL_SECS: u32 = 1;
pub const QUERY_FIRST_DELAY_MIN_MS: u64 = 20;
pub const QUERY_FIRST_DELAY_MAX_MS: u64 = 120;
pub const QUERY_MAX_TIMER_COUNT_SECS: u32 = 60 * 60;
pub const POOF_MIN_COUNT: u32 = 2;
pub const POOF_TIMER_COUNT_SECS: u32 = 10;
pub const TIMER_COUNT_RANGE: u32 = 1;
pub const DEFAULT_PERIODIC_RATE: u32 = 10;

// Conventional mDNS defaults (not spec-mandated numbers, but the values the
// wider ecosystem -- Avahi, Bonjour -- and RFC 6762 S10 recommend): host
// address records get a short TTL so stale entries age out quickly after a
// host disappears ungracefully; service records get a much longer one since
// PTR/SRV/TXT churn is expected to be rare.
pub const DEFAULT_HOST_TTL_SECS: u32 = 120;
pub const DEFAULT_SERVICE_TTL_SECS: u32 = 4500;

const MIN_CACHE_SIZE: u32 = 8;

#[derive(Clone, Debug)]
pub struct MdnsConfig {
    pub host_name: String,
    pub domain_name: String,
    pub local_cache_size: u32,
    pub peer_cache_size: u32,

    pub announcing_count: u32,
    pub announcing_factor: u32,
    pub announcing_retrans_interval_ms: u64,
    pub announcing_period_interval_secs: u32,
    pub announcing_max_time_secs: u32,
    pub announcing_forever: bool,

    // Bitmasks over the well-known service-type list (spec 6); a service
    // whose type bit is set in `service_ignore_mask` is dropped silently
    // on ingestion. When both masks reference the same type, ignore wins.
    pub service_ignore_mask: u32,
    pub service_notify_mask: u32,

    pub periodic_rate: u32,
}

impl Default for MdnsConfig {
    fn default() -> MdnsConfig {
        MdnsConfig {
            host_name: String::new(),
            domain_name: "local".to_owned(),
            local_cache_size: 4096,
            peer_cache_size: 8192,

            announcing_count: 2,
            announcing_factor: 2,
            announcing_retrans_interval_ms: 1000,
            announcing_period_interval_secs: 60,
            announcing_max_time_secs: 0,
            announcing_forever: false,

            service_ignore_mask: 0,
            service_notify_mask: !0,

            periodic_rate: DEFAULT_PERIODIC_RATE,
        }
    }
}

impl MdnsConfig {
    pub fn with_host_name(mut self, host_name: impl Into<String>) -> MdnsConfig {
        self.host_name = host_name.into();
        self
    }

    pub fn with_domain_name(mut self, domain_name: impl Into<String>) -> MdnsConfig {
        self.domain_name = domain_name.into();
        self
    }

    pub fn with_local_cache_size(mut self, size: u32) -> MdnsConfig {
        self.local_cache_size = size;
        self
    }

    pub fn with_peer_cache_size(mut self, size: u32) -> MdnsConfig {
        self.peer_cache_size = size;
        self
    }

    pub fn with_announcing_schedule(
        mut self,
        count: u32,
        factor: u32,
        retrans_interval_ms: u64,
        period_interval_secs: u32,
        max_time_secs: u32,
    ) -> MdnsConfig {
        self.announcing_count = count;
        self.announcing_factor = factor;
        self.announcing_retrans_interval_ms = retrans_interval_ms;
        self.announcing_period_interval_secs = period_interval_secs;
        self.announcing_max_time_secs = max_time_secs;
        self
    }

    pub fn with_announcing_forever(mut self, forever: bool) -> MdnsConfig {
        self.announcing_forever = forever;
        self
    }

    pub fn with_service_ignore_mask(mut self, mask: u32) -> MdnsConfig {
        self.service_ignore_mask = mask;
        self
    }

    pub fn with_service_notify_mask(mut self, mask: u32) -> MdnsConfig {
        self.service_notify_mask = mask;
        self
    }

    pub fn with_periodic_rate(mut self, periodic_rate: u32) -> MdnsConfig {
        self.periodic_rate = periodic_rate;
        self
    }

    // host_name must be [A-Za-z0-9-]+ (spec 6); cache sizes must be
    // multiples of 4 and at least 8 words (spec 6, "Persisted state
    // layout").
    pub fn validate(&self) -> Result<()> {
        if self.host_name.is_empty()
            || !self
                .host_name
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-')
        {
            return Err(MdnsError::HostName);
        }
        if self.domain_name.is_empty() {
            return Err(MdnsError::Param);
        }
        if self.local_cache_size < MIN_CACHE_SIZE || self.local_cache_size % 4 != 0 {
            return Err(MdnsError::Param);
        }
        if self.peer_cache_size < MIN_CACHE_SIZE || self.peer_cache_size % 4 != 0 {
            return Err(MdnsError::Param);
        }
        if self.periodic_rate == 0 {
            return Err(MdnsError::Param);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_fails_validation_without_host_name() {
        let config = MdnsConfig::default();
        assert!(config.validate().is_err());
    }

    #[test]
    fn builder_produces_valid_config() {
        let config = MdnsConfig::default().with_host_name("printer-1");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_illegal_host_name_characters() {
        let config = MdnsConfig::default().with_host_name("printer_1!");
        assert!(matches!(config.validate(), Err(MdnsError::HostName)));
    }

    #[test]
    fn rejects_cache_size_not_multiple_of_four() {
        let config = MdnsConfig::default()
            .with_host_name("printer-1")
            .with_local_cache_size(10);
        assert!(matches!(config.validate(), Err(MdnsError::Param)));
    }
}
