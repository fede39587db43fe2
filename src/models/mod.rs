pub mod auditmodels;
pub mod escrowmodels;
pub mod reputationmodels;
pub mod verificationmodels;
