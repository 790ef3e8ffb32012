use bronto_proto::name::{canonical_name, reverse_ipv4, reverse_ipv6};
use bronto_proto::packet::header::{Header, ResponseCode};
use bronto_proto::packet::question::Question;
use bronto_proto::packet::record::Record;
use bronto_proto::packet::{DnsPacket, QueryType};
use bronto_proto::zone::{parse_record, ZoneError};
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, SystemTime};

/// Upper bound on how long a forwarded response may be cached, whatever
/// its records claim.
const MAX_TTL: u32 = 86_400;

#[derive(Debug, serde::Deserialize)]
pub struct Config {
    /// Seconds between expired-entry sweeps.
    #[serde(default = "Config::default_flush_interval")]
    pub flush_interval: u64,
    /// Operator supplied records, zone-file format, loaded as permanent
    /// entries.
    #[serde(default)]
    pub local: Vec<String>,
    /// Synthesize reverse PTR entries for local A/AAAA records.
    #[serde(default = "Config::default_local_ptr")]
    pub local_ptr: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            flush_interval: Self::default_flush_interval(),
            local: Vec::new(),
            local_ptr: Self::default_local_ptr(),
        }
    }
}

impl Config {
    pub fn default_flush_interval() -> u64 {
        30
    }

    pub fn default_local_ptr() -> bool {
        true
    }

    pub fn build(&self) -> Result<MessageCache, ZoneError> {
        let cache = MessageCache::default();
        for entry in &self.local {
            cache.add_rr(entry, true, self.local_ptr)?;
        }
        Ok(cache)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    name: String,
    qtype: QueryType,
}

#[derive(Debug, Clone)]
struct CachedMessage {
    message: DnsPacket,
    inserted: SystemTime,
    expires: SystemTime,
    permanent: bool,
}

/// TTL-aware store of full response messages, keyed by canonical name and
/// query type. Permanent entries back operator configuration and never
/// expire; forwarded responses expire after the smallest record TTL.
#[derive(Debug, Default)]
pub struct MessageCache {
    inner: RwLock<HashMap<CacheKey, CachedMessage>>,
}

impl MessageCache {
    /// Insert one zone-file record as a synthetic response. With
    /// `ptr_also`, an A or AAAA record also gets the matching reverse PTR
    /// entry under its own key.
    pub fn add_rr(&self, entry: &str, permanent: bool, ptr_also: bool) -> Result<(), ZoneError> {
        let record = parse_record(entry)?;

        if ptr_also {
            let pointer = match &record {
                Record::A { domain, addr, ttl } => Some(Record::PTR {
                    domain: reverse_ipv4(*addr),
                    host: domain.clone(),
                    ttl: *ttl,
                }),
                Record::AAAA { domain, addr, ttl } => Some(Record::PTR {
                    domain: reverse_ipv6(*addr),
                    host: domain.clone(),
                    ttl: *ttl,
                }),
                _ => None,
            };
            if let Some(pointer) = pointer {
                self.add_record(pointer, permanent);
            }
        }

        self.add_record(record, permanent);
        Ok(())
    }

    fn add_record(&self, record: Record, permanent: bool) {
        let name = canonical_name(record.domain());
        let qtype = record.qtype();
        let ttl = record.ttl();

        let header = Header {
            response: true,
            authoritative_answer: permanent,
            recursion_available: false,
            response_code: ResponseCode::NoError,
            ..Default::default()
        };

        let message = DnsPacket::new(header)
            .with_question(Question::new(name.clone(), qtype))
            .with_answer(record);

        let now = SystemTime::now();
        let value = CachedMessage {
            message,
            inserted: now,
            expires: now + Duration::from_secs(ttl as u64),
            permanent,
        };

        let mut inner = self.inner.write().expect("cache lock");
        inner.insert(CacheKey { name, qtype }, value);
    }

    /// Cache a forwarded response. Errors, truncated messages, responses
    /// without records and responses whose smallest TTL is zero are not
    /// cached.
    pub fn add_message(&self, message: &DnsPacket) {
        if message.header.response_code != ResponseCode::NoError
            || message.header.truncated_message
            || message.records().next().is_none()
        {
            return;
        }
        let question = match message.questions.first() {
            Some(found) => found,
            None => return,
        };

        let min_ttl = message
            .records()
            .filter(|record| !record.is_opt())
            .map(Record::ttl)
            .min()
            .unwrap_or(MAX_TTL)
            .min(MAX_TTL);
        if min_ttl == 0 {
            return;
        }

        let mut copy = message.clone();
        copy.header.id = 0;

        let now = SystemTime::now();
        let key = CacheKey {
            name: canonical_name(&question.name),
            qtype: question.qtype,
        };
        let value = CachedMessage {
            message: copy,
            inserted: now,
            expires: now + Duration::from_secs(min_ttl as u64),
            permanent: false,
        };

        let mut inner = self.inner.write().expect("cache lock");
        inner.insert(key, value);
    }

    /// Look up the response for a query. Expired entries are purged as a
    /// side effect; hits come back with the query id and, for
    /// non-permanent entries, TTLs decremented by the time spent in the
    /// cache.
    pub fn get(&self, query: &DnsPacket) -> Option<DnsPacket> {
        let question = query.questions.first()?;
        let key = CacheKey {
            name: canonical_name(&question.name),
            qtype: question.qtype,
        };

        // The write lock even for lookups: a hit on an expired entry purges.
        let mut inner = self.inner.write().expect("cache lock");
        let now = SystemTime::now();

        let reply = match inner.get(&key) {
            None => return None,
            Some(entry) if !entry.permanent && now > entry.expires => None,
            Some(entry) => {
                let mut reply = entry.message.clone();
                reply.header.id = query.header.id;

                if !entry.permanent {
                    let delta = now
                        .duration_since(entry.inserted)
                        .unwrap_or_default()
                        .as_secs() as u32;
                    for record in reply.records_mut() {
                        if !record.is_opt() {
                            let ttl = record.ttl();
                            record.set_ttl(ttl.saturating_sub(delta));
                        }
                    }
                }
                Some(reply)
            }
        };

        if reply.is_none() {
            // Expired entry, flush the key.
            inner.remove(&key);
        }
        reply
    }

    /// Convenience lookup by name and type.
    pub fn get_name(&self, qname: &str, qtype: QueryType) -> Option<DnsPacket> {
        let query = DnsPacket::new(Header::question(0))
            .with_question(Question::new(qname.to_string(), qtype));
        self.get(&query)
    }

    /// Remove an entry. With `ptr_also`, the reverse PTR entry synthesized
    /// from the stored A/AAAA record is removed as well.
    pub fn delete(&self, name: &str, qtype: QueryType, ptr_also: bool) -> bool {
        let key = CacheKey {
            name: canonical_name(name),
            qtype,
        };

        let mut inner = self.inner.write().expect("cache lock");

        if ptr_also {
            let pointer = inner.get(&key).and_then(|entry| {
                entry
                    .message
                    .answers
                    .first()
                    .and_then(|record| match record {
                        Record::A { addr, .. } => Some(reverse_ipv4(*addr)),
                        Record::AAAA { addr, .. } => Some(reverse_ipv6(*addr)),
                        _ => None,
                    })
            });
            if let Some(reverse) = pointer {
                inner.remove(&CacheKey {
                    name: reverse,
                    qtype: QueryType::PTR,
                });
            }
        }

        inner.remove(&key).is_some()
    }

    /// Purge expired non-permanent entries; returns (total, expired)
    /// counts.
    pub fn sweep(&self) -> (usize, usize) {
        let mut inner = self.inner.write().expect("cache lock");
        let now = SystemTime::now();
        let total = inner.len();
        inner.retain(|_, entry| entry.permanent || now <= entry.expires);
        (total, total - inner.len())
    }

    /// Debug listing of cache entries.
    pub fn entries(&self) -> Vec<String> {
        let inner = self.inner.read().expect("cache lock");
        let now = SystemTime::now();
        inner
            .iter()
            .map(|(key, entry)| {
                if entry.permanent {
                    format!("<{} {}> permanent", key.name, key.qtype)
                } else {
                    let remaining = entry
                        .expires
                        .duration_since(now)
                        .unwrap_or_default()
                        .as_secs_f32();
                    format!("<{} {}> {remaining:.1}s", key.name, key.qtype)
                }
            })
            .collect()
    }
}
