use serde::{Deserialize, Serialize};

const MAX_LIMIT: i64 = 200;

/// `limit`/`offset` window, as the admin back-office pages through results.
#[derive(Debug, Clone, Deserialize)]
pub struct OffsetParams {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 { 50 }

impl OffsetParams {
    pub fn new(limit: i64, offset: i64) -> Self {
        Self { limit, offset }
    }

    pub fn limit(&self) -> i64 {
        self.limit.clamp(1, MAX_LIMIT)
    }

    pub fn offset(&self) -> i64 {
        self.offset.max(0)
    }
}

impl Default for OffsetParams {
    fn default() -> Self {
        Self { limit: default_limit(), offset: 0 }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct PageInfo {
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
    pub has_next: bool,
}

impl PageInfo {
    pub fn new(total: i64, params: &OffsetParams) -> Self {
        let limit = params.limit();
        let offset = params.offset();
        Self {
            total,
            limit,
            offset,
            has_next: offset.saturating_add(limit) < total,
        }
    }
}
