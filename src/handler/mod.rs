pub mod admin;
pub mod escrow;
pub mod reputation;
pub mod verification;
