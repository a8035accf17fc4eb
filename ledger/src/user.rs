//! Users as seen by the ledger.

use cashdesk_common::{CompanyId, UserId};
use serde::{Deserialize, Serialize};

/// A cashier owning balances. Only company ownership matters to the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub company_id: CompanyId,
}

impl User {
    pub fn new(company_id: CompanyId) -> Self {
        Self {
            id: UserId::new(),
            company_id,
        }
    }
}
