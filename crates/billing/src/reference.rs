//! Payment references
//!
//! A reference is minted per payment attempt and is the idempotency key for
//! reconciliation. It embeds the subject so a confirmation can be routed
//! without a lookup: `ord_<order id>_<nonce>` or `sub_<account id>_<nonce>`.

use rand::{distributions::Alphanumeric, Rng};
use shopledger_shared::SubjectType;
use uuid::Uuid;

use crate::error::{BillingError, BillingResult};

const NONCE_LEN: usize = 12;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentReference {
    pub subject_type: SubjectType,
    pub subject_id: Uuid,
    value: String,
}

impl PaymentReference {
    /// Mint a fresh reference for a subject
    pub fn mint(subject_type: SubjectType, subject_id: Uuid) -> Self {
        let nonce: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(NONCE_LEN)
            .map(char::from)
            .collect();

        let value = format!(
            "{}_{}_{}",
            prefix(subject_type),
            subject_id.simple(),
            nonce
        );

        Self {
            subject_type,
            subject_id,
            value,
        }
    }

    /// Recover the subject from a reference string
    pub fn parse(value: &str) -> BillingResult<Self> {
        let mut parts = value.splitn(3, '_');
        let (Some(kind), Some(id), Some(nonce)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(BillingError::InvalidMetadata(format!(
                "Unrecognised payment reference: {}",
                value
            )));
        };

        let subject_type = match kind {
            "ord" => SubjectType::Order,
            "sub" => SubjectType::Subscription,
            _ => {
                return Err(BillingError::InvalidMetadata(format!(
                    "Unknown reference prefix: {}",
                    value
                )))
            }
        };

        if nonce.is_empty() || !nonce.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(BillingError::InvalidMetadata(format!(
                "Reference has invalid nonce: {}",
                value
            )));
        }

        let subject_id = Uuid::parse_str(id).map_err(|_| {
            BillingError::InvalidMetadata(format!("Reference has invalid subject id: {}", value))
        })?;

        Ok(Self {
            subject_type,
            subject_id,
            value: value.to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }
}

impl std::fmt::Display for PaymentReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.value)
    }
}

fn prefix(subject_type: SubjectType) -> &'static str {
    match subject_type {
        SubjectType::Order => "ord",
        SubjectType::Subscription => "sub",
    }
}
