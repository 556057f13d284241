//! CIDR set membership with trusted-proxy-aware client-IP extraction
//! and an LRU+TTL decision cache.

use ipnet::IpNet;
use lru::LruCache;
use std::net::IpAddr;
use std::num::NonZeroUsize;
use std::str::FromStr;
use std::sync::RwLock;
use std::time::{Duration, Instant};

fn parse_range(input: &str) -> Result<IpNet, String> {
    if let Ok(net) = IpNet::from_str(input) {
        return Ok(net);
    }
    if let Ok(addr) = IpAddr::from_str(input) {
        return Ok(IpNet::new(addr, if addr.is_ipv4() { 32 } else { 128 }).expect("host bits always valid"));
    }
    Err(format!(
        "invalid CIDR or IP '{input}'; expected formats like '10.0.0.0/24', '2001:db8::/32', or a bare IP address"
    ))
}

struct CacheEntry {
    bypass: bool,
    recorded_at: Instant,
}

pub struct IpClassifier {
    ranges: RwLock<Vec<IpNet>>,
    cache: RwLock<LruCache<String, CacheEntry>>,
    cache_enabled: RwLock<bool>,
    ttl: Duration,
}

impl IpClassifier {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            ranges: RwLock::new(Vec::new()),
            cache: RwLock::new(LruCache::new(NonZeroUsize::new(capacity.max(1)).unwrap())),
            cache_enabled: RwLock::new(true),
            ttl,
        }
    }

    pub fn from_ranges(ranges: &[String], capacity: usize, ttl: Duration) -> Result<Self, String> {
        let classifier = Self::new(capacity, ttl);
        for r in ranges {
            classifier.add(r)?;
        }
        Ok(classifier)
    }

    pub fn add(&self, cidr: &str) -> Result<(), String> {
        let net = parse_range(cidr)?;
        self.ranges.write().unwrap().push(net);
        self.cache.write().unwrap().clear();
        Ok(())
    }

    pub fn remove(&self, cidr: &str) -> Result<(), String> {
        let net = parse_range(cidr)?;
        self.ranges.write().unwrap().retain(|r| *r != net);
        self.cache.write().unwrap().clear();
        Ok(())
    }

    pub fn list(&self) -> Vec<String> {
        self.ranges.read().unwrap().iter().map(|r| r.to_string()).collect()
    }

    pub fn set_cache_enabled(&self, enabled: bool) {
        *self.cache_enabled.write().unwrap() = enabled;
        if !enabled {
            self.cache.write().unwrap().clear();
        }
    }

    pub fn clear_cache(&self) {
        self.cache.write().unwrap().clear();
    }

    /// Linear scan of the configured ranges, ignoring the cache. Used
    /// both by `should_bypass` and directly by tests verifying cache
    /// observational equivalence.
    fn linear_scan(&self, ip: &str) -> bool {
        let Ok(addr) = IpAddr::from_str(ip) else {
            return false;
        };
        self.ranges.read().unwrap().iter().any(|r| r.contains(&addr))
    }

    pub fn should_bypass(&self, ip: &str) -> bool {
        if !*self.cache_enabled.read().unwrap() {
            return self.linear_scan(ip);
        }
        {
            let mut cache = self.cache.write().unwrap();
            if let Some(entry) = cache.get(ip) {
                if entry.recorded_at.elapsed() < self.ttl {
                    return entry.bypass;
                }
            }
        }
        let result = self.linear_scan(ip);
        self.cache.write().unwrap().put(
            ip.to_string(),
            CacheEntry {
                bypass: result,
                recorded_at: Instant::now(),
            },
        );
        result
    }
}

/// Extract the effective client IP given the raw connection address,
/// the `X-Forwarded-For` header value, an optional `X-Real-IP` value,
/// and the set of trusted-proxy CIDRs.
///
/// If `remote_addr` is not itself a trusted proxy, it is authoritative.
/// Otherwise, honor the right-most entry in `X-Forwarded-For` that is
/// not itself a trusted proxy; `X-Real-IP` is only honored when the
/// direct connection is trusted and no usable XFF entry exists.
pub fn extract_client_ip(
    remote_addr: &str,
    forwarded_for: Option<&str>,
    real_ip: Option<&str>,
    trusted_proxies: &IpClassifier,
) -> String {
    let remote_ip = strip_port(remote_addr);

    if !trusted_proxies.linear_scan(&remote_ip) {
        return remote_ip;
    }

    if let Some(xff) = forwarded_for {
        for hop in xff.split(',').rev().map(|s| s.trim()) {
            if hop.is_empty() {
                continue;
            }
            if !trusted_proxies.linear_scan(hop) {
                return hop.to_string();
            }
        }
    }

    if let Some(real) = real_ip {
        return real.to_string();
    }

    remote_ip
}

fn strip_port(addr: &str) -> String {
    if addr.starts_with('[') {
        // IPv6 with brackets, e.g. [::1]:8080
        if let Some(end) = addr.find(']') {
            return addr[1..end].to_string();
        }
    }
    if addr.matches(':').count() == 1 {
        if let Some((host, _port)) = addr.rsplit_once(':') {
            return host.to_string();
        }
    }
    addr.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_cidr_and_bare_ips() {
        assert!(parse_range("10.0.0.0/24").is_ok());
        assert!(parse_range("2001:db8::/32").is_ok());
        assert!(parse_range("192.168.1.5").is_ok());
        assert!(parse_range("not an ip").is_err());
    }

    #[test]
    fn bare_ipv4_promotes_to_slash_32() {
        let net = parse_range("192.168.1.5").unwrap();
        assert_eq!(net.prefix_len(), 32);
    }

    #[test]
    fn should_bypass_matches_configured_range() {
        let classifier = IpClassifier::from_ranges(&["10.0.0.0/24".to_string()], 1000, Duration::from_secs(300)).unwrap();
        assert!(classifier.should_bypass("10.0.0.50"));
        assert!(!classifier.should_bypass("192.168.1.1"));
    }

    #[test]
    fn cache_is_observationally_equivalent_to_linear_scan() {
        let classifier = IpClassifier::from_ranges(&["10.0.0.0/24".to_string()], 1000, Duration::from_secs(300)).unwrap();
        for ip in ["10.0.0.1", "10.0.1.1", "8.8.8.8"] {
            assert_eq!(classifier.should_bypass(ip), classifier.linear_scan(ip));
        }
    }

    #[test]
    fn add_then_remove_restores_prior_range_list() {
        let classifier = IpClassifier::new(1000, Duration::from_secs(300));
        let before = classifier.list();
        classifier.add("10.0.0.0/24").unwrap();
        classifier.remove("10.0.0.0/24").unwrap();
        assert_eq!(classifier.list(), before);
    }

    #[test]
    fn add_invalidates_cache() {
        let classifier = IpClassifier::new(1000, Duration::from_secs(300));
        assert!(!classifier.should_bypass("10.0.0.1"));
        classifier.add("10.0.0.0/24").unwrap();
        assert!(classifier.should_bypass("10.0.0.1"));
    }

    #[test]
    fn extract_ip_ignores_forwarded_headers_from_untrusted_proxy() {
        let trusted = IpClassifier::from_ranges(&["192.168.1.1".to_string()], 100, Duration::from_secs(60)).unwrap();
        let ip = extract_client_ip("127.0.0.1:1234", Some("10.0.0.50"), None, &trusted);
        assert_eq!(ip, "127.0.0.1");
    }

    #[test]
    fn extract_ip_honors_rightmost_untrusted_xff_hop_from_trusted_proxy() {
        let trusted = IpClassifier::from_ranges(&["127.0.0.1".to_string()], 100, Duration::from_secs(60)).unwrap();
        let ip = extract_client_ip("127.0.0.1:1234", Some("10.0.0.50"), None, &trusted);
        assert_eq!(ip, "10.0.0.50");
    }

    #[test]
    fn extract_ip_skips_trusted_proxy_hops_in_xff() {
        let trusted = IpClassifier::from_ranges(
            &["127.0.0.1".to_string(), "10.0.0.1".to_string()],
            100,
            Duration::from_secs(60),
        )
        .unwrap();
        let ip = extract_client_ip("127.0.0.1:1234", Some("203.0.113.9, 10.0.0.1", ), None, &trusted);
        assert_eq!(ip, "203.0.113.9");
    }
}
