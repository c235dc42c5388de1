use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Local};

use super::domain::LoanId;

/// Source of loan identifiers. Implementations must not rely on a shared counter.
pub trait LoanIdGenerator: Send + Sync {
    fn next_id(&self) -> LoanId;
}

/// `YYMMDD` in local time followed by five hex characters hashed from a random
/// and clock seed, e.g. `240108a3f9c`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DatePrefixedIdGenerator;

impl DatePrefixedIdGenerator {
    pub const SUFFIX_LEN: usize = 5;

    pub fn id_at(&self, now: DateTime<Local>) -> LoanId {
        let mut hasher = DefaultHasher::new();
        rand::random::<u64>().hash(&mut hasher);
        now.timestamp_nanos_opt().unwrap_or_default().hash(&mut hasher);
        let suffix = hasher.finish() & 0xF_FFFF;
        LoanId(format!("{}{suffix:05x}", now.format("%y%m%d")))
    }
}

impl LoanIdGenerator for DatePrefixedIdGenerator {
    fn next_id(&self) -> LoanId {
        self.id_at(Local::now())
    }
}
