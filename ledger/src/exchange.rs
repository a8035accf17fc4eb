//! Currency exchange events.

use cashdesk_common::{CompanyId, ExchangeId, Money, Timestamp, UserId};
use serde::{Deserialize, Serialize};

/// One currency conversion: `sold` left the user's balance, `received` entered it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exchange {
    pub id: ExchangeId,
    pub user_id: UserId,
    pub company_id: CompanyId,
    pub received: Money,
    pub sold: Money,
    pub details: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Exchange {
    pub fn new(
        user_id: UserId,
        company_id: CompanyId,
        received: Money,
        sold: Money,
        details: Option<String>,
    ) -> Self {
        let now = cashdesk_common::now();
        Self {
            id: ExchangeId::new(),
            user_id,
            company_id,
            received,
            sold,
            details,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Request to create an exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewExchange {
    pub user_id: UserId,
    pub received: Money,
    pub sold: Money,
    pub details: Option<String>,
}

/// New amounts for an existing exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeAmounts {
    pub received: Money,
    pub sold: Money,
}
