pub mod domain;
pub mod presence_ledger;
