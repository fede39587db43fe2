pub mod auditdb;
pub mod commissiondb;
pub mod db;
pub mod escrowdb;
#[cfg(test)]
pub mod memory;
pub mod reputationdb;
pub mod verificationdb;

use self::{
    auditdb::AuditExt, commissiondb::CommissionExt, escrowdb::EscrowExt,
    reputationdb::ReputationExt, verificationdb::VerificationExt,
};

/// Everything the trust & settlement services need from storage. Implemented
/// by the Postgres client and by the in-memory store.
pub trait TrustStore:
    VerificationExt + ReputationExt + EscrowExt + CommissionExt + AuditExt + std::fmt::Debug
{
}

impl<T> TrustStore for T where
    T: VerificationExt + ReputationExt + EscrowExt + CommissionExt + AuditExt + std::fmt::Debug
{
}
